//! Investigation orchestrator: the round-based plan/dispatch/collect loop.
//!
//! One `orchestrate` call owns one alert's investigation from entity
//! extraction through synthesis and persistence. Task-level failures are
//! absorbed into findings; only fatal errors (synthesis or persistence)
//! escape, after a best-effort `failed` record has been written.

use super::planner::{TaskPlanner, fallback_tasks};
use super::routing::{AgentRouter, ROUTER_AGENT, unroutable};
use crate::config::InvestigationConfig;
use crate::context::ContextRetriever;
use crate::entities::extract_entities;
use crate::error::Result;
use crate::notify::{NoOpNotifier, Phase, StatusNotifier, StatusUpdate};
use crate::store::AlertStore;
use crate::types::{
    AgentResult, AgentTask, Alert, Entities, InvestigationReport, InvestigationStatus, TokenUsage,
    task_types,
};
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Keys written into the alert's analysis blob.
pub mod fields {
    pub const REPORT: &str = "investigationReport";
    pub const FINDINGS: &str = "swarmFindings";
    pub const LOG: &str = "investigationLog";
    pub const ROUNDS: &str = "investigationRounds";
    pub const STATUS: &str = "investigationStatus";
    pub const INVESTIGATED_AT: &str = "investigatedAt";
    pub const ERROR: &str = "investigationError";
}

/// Mutable state of one investigation. Never shared between investigations.
#[derive(Debug, Default)]
struct InvestigationState {
    round: u32,
    findings: Vec<AgentResult>,
    log: Vec<String>,
    usage: TokenUsage,
    /// Set when the planner declared the investigation complete.
    concluded: bool,
}

/// How one dispatched task settled.
enum Settled {
    Done(AgentResult),
    TimedOut { agent: String, after: Duration },
    Panicked { agent: String, message: String },
}

/// Round-based investigation engine.
pub struct Orchestrator {
    router: AgentRouter,
    planner: TaskPlanner,
    context: ContextRetriever,
    alerts: Arc<dyn AlertStore>,
    notifier: Arc<dyn StatusNotifier>,
    config: InvestigationConfig,
}

impl Orchestrator {
    pub fn new(
        router: AgentRouter,
        planner: TaskPlanner,
        context: ContextRetriever,
        alerts: Arc<dyn AlertStore>,
        config: InvestigationConfig,
    ) -> Self {
        Self {
            router,
            planner,
            context,
            alerts,
            notifier: Arc::new(NoOpNotifier),
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn StatusNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn router(&self) -> &AgentRouter {
        &self.router
    }

    /// Investigate `alert` with the configured round cap.
    pub async fn orchestrate(&self, alert: &Alert) -> Result<InvestigationReport> {
        self.orchestrate_with_rounds(alert, self.config.max_rounds)
            .await
    }

    /// Investigate `alert` running at most `max_rounds` rounds (minimum 1).
    pub async fn orchestrate_with_rounds(
        &self,
        alert: &Alert,
        max_rounds: u32,
    ) -> Result<InvestigationReport> {
        let max_rounds = max_rounds.max(1);
        info!(alert_id = %alert.id, max_rounds, "Starting investigation");
        self.notify(
            alert,
            StatusUpdate::new(Phase::Started, format!("Investigating {}", alert.headline())),
        )
        .await;

        let mut state = InvestigationState::default();
        match self.run(alert, max_rounds, &mut state).await {
            Ok(report) => {
                info!(
                    alert_id = %alert.id,
                    rounds = report.rounds,
                    findings = report.findings.len(),
                    "Investigation completed"
                );
                self.notify(
                    alert,
                    StatusUpdate::new(Phase::Completed, "Investigation completed")
                        .with_round(report.rounds, max_rounds),
                )
                .await;
                Ok(report)
            }
            Err(e) => {
                error!(alert_id = %alert.id, error = %e, "Investigation failed");
                state.log.push(format!("[ERROR] Investigation failed: {}", e));
                let record = self.record(&state, None, InvestigationStatus::Failed, Some(&e.to_string()));
                if let Err(persist_err) = self.persist(&alert.id, record).await {
                    warn!(alert_id = %alert.id, error = %persist_err, "Failed to persist failure state");
                }
                self.notify(
                    alert,
                    StatusUpdate::new(Phase::Failed, format!("Investigation failed: {}", e))
                        .with_round(state.round, max_rounds),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        alert: &Alert,
        max_rounds: u32,
        state: &mut InvestigationState,
    ) -> Result<InvestigationReport> {
        let entities = extract_entities(alert);
        debug!(alert_id = %alert.id, ?entities, "Extracted entities");

        let historical = self
            .context
            .find_historical_context(&entities, &alert.tenant_id)
            .await;
        state.log.push(format!(
            "Found {} historical case(s) with matching entities",
            historical.len()
        ));
        self.notify(
            alert,
            StatusUpdate::new(
                Phase::Context,
                format!("{} historical case(s) retrieved", historical.len()),
            ),
        )
        .await;

        for round in 1..=max_rounds {
            state.round = round;
            self.notify(
                alert,
                StatusUpdate::new(Phase::Planning, format!("Planning round {}", round))
                    .with_round(round, max_rounds),
            )
            .await;

            let tasks = if round == 1 {
                self.initial_tasks(alert, &entities, state).await
            } else {
                self.follow_up_tasks(alert, &entities, state).await
            };

            if state.concluded {
                break;
            }
            if tasks.is_empty() {
                state
                    .log
                    .push(format!("Round {}: no tasks to dispatch, stopping", round));
                break;
            }
            let tasks: Vec<AgentTask> = tasks
                .into_iter()
                .map(|t| scope_to_tenant(t, &alert.tenant_id))
                .collect();

            self.notify(
                alert,
                StatusUpdate::new(
                    Phase::Dispatching,
                    format!("Dispatching {} task(s)", tasks.len()),
                )
                .with_round(round, max_rounds),
            )
            .await;

            for result in self.dispatch_round(round, tasks, state).await {
                self.notify(
                    alert,
                    StatusUpdate::new(Phase::Finding, result.summary.clone())
                        .with_round(round, max_rounds)
                        .with_finding(result),
                )
                .await;
            }
        }

        self.notify(
            alert,
            StatusUpdate::new(Phase::Synthesizing, "Synthesizing report")
                .with_round(state.round, max_rounds),
        )
        .await;
        let (report_text, usage) = self
            .planner
            .synthesize(alert, &entities, &state.findings, &historical, &state.log)
            .await?;
        state.usage.accumulate(&usage);

        let record = self.record(state, Some(&report_text), InvestigationStatus::Completed, None);
        self.persist(&alert.id, record).await?;

        Ok(InvestigationReport {
            alert_id: alert.id.clone(),
            report: report_text,
            findings: state.findings.clone(),
            log: state.log.clone(),
            historical_context: historical,
            rounds: state.round,
            status: InvestigationStatus::Completed,
            usage: state.usage,
            investigated_at: Utc::now(),
        })
    }

    /// Round 1: planner output if non-empty, otherwise the deterministic fallback.
    async fn initial_tasks(
        &self,
        alert: &Alert,
        entities: &Entities,
        state: &mut InvestigationState,
    ) -> Vec<AgentTask> {
        match self
            .planner
            .initial_plan(alert, entities, self.router.task_types())
            .await
        {
            Ok(plan) => {
                state.usage.accumulate(&plan.usage);
                if let Some(reasoning) = &plan.reasoning {
                    state.log.push(format!("Round 1 planner: {}", reasoning));
                }
                if !plan.is_empty() {
                    state
                        .log
                        .push(format!("Round 1: planner proposed {} task(s)", plan.tasks.len()));
                    return plan.tasks;
                }
                state
                    .log
                    .push("Round 1: planner proposed no tasks, using entity-based fallback".into());
            }
            Err(e) => {
                warn!(alert_id = %alert.id, error = %e, "Initial planning failed");
                state.log.push(format!(
                    "Round 1: planner unavailable ({}), using entity-based fallback",
                    e
                ));
            }
        }
        fallback_tasks(entities)
    }

    /// Round >= 2: an empty plan, or no planner at all, concludes the investigation.
    async fn follow_up_tasks(
        &self,
        alert: &Alert,
        entities: &Entities,
        state: &mut InvestigationState,
    ) -> Vec<AgentTask> {
        let round = state.round;
        match self
            .planner
            .follow_up_plan(
                alert,
                entities,
                &state.findings,
                &state.log,
                self.router.task_types(),
            )
            .await
        {
            Ok(plan) => {
                state.usage.accumulate(&plan.usage);
                if let Some(reasoning) = &plan.reasoning {
                    state.log.push(format!("Round {} planner: {}", round, reasoning));
                }
                if plan.is_empty() {
                    state.log.push(format!(
                        "Round {}: no further investigation needed",
                        round
                    ));
                    state.concluded = true;
                }
                plan.tasks
            }
            Err(e) => {
                warn!(alert_id = %alert.id, round, error = %e, "Follow-up planning failed");
                state.log.push(format!(
                    "Round {}: planner unavailable ({}), concluding investigation",
                    round, e
                ));
                state.concluded = true;
                Vec::new()
            }
        }
    }

    /// Run every task concurrently and wait for all of them to settle.
    ///
    /// Returns this round's findings in dispatch order.
    async fn dispatch_round(
        &self,
        round: u32,
        tasks: Vec<AgentTask>,
        state: &mut InvestigationState,
    ) -> Vec<AgentResult> {
        let timeout = self.config.task_timeout();
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let agent = self.router.route(&task.task_type);
                let agent_name = agent
                    .as_ref()
                    .map(|a| a.name().to_string())
                    .unwrap_or_else(|| ROUTER_AGENT.to_string());
                let handle = tokio::spawn(async move {
                    let Some(agent) = agent else {
                        return Settled::Done(unroutable(&task));
                    };
                    match tokio::time::timeout(timeout, agent.process(&task)).await {
                        Ok(result) => Settled::Done(result),
                        Err(_) => Settled::TimedOut {
                            agent: agent.name().to_string(),
                            after: timeout,
                        },
                    }
                });
                (agent_name, handle)
            })
            .collect();

        let (names, handles): (Vec<String>, Vec<_>) = handles.into_iter().unzip();
        let joined = futures::future::join_all(handles).await;

        let mut round_findings = Vec::with_capacity(joined.len());
        for (agent, outcome) in names.into_iter().zip(joined) {
            let settled = outcome.unwrap_or_else(|join_err| Settled::Panicked {
                agent,
                message: join_err.to_string(),
            });
            let result = match settled {
                Settled::Done(result) => {
                    state
                        .log
                        .push(format!("Round {} [{}] {}", round, result.agent, result.summary));
                    result
                }
                Settled::TimedOut { agent, after } => {
                    let message = format!("task timed out after {}s", after.as_secs());
                    warn!(round, agent = %agent, "Task timed out");
                    state
                        .log
                        .push(format!("Round {} [ERROR] [{}] {}", round, agent, message));
                    AgentResult::failed(agent, message)
                }
                Settled::Panicked { agent, message } => {
                    error!(round, agent = %agent, error = %message, "Task aborted");
                    state.log.push(format!(
                        "Round {} [ERROR] [{}] task aborted: {}",
                        round, agent, message
                    ));
                    AgentResult::failed(agent, format!("task aborted: {}", message))
                }
            };
            state.findings.push(result.clone());
            round_findings.push(result);
        }
        round_findings
    }

    fn record(
        &self,
        state: &InvestigationState,
        report: Option<&str>,
        status: InvestigationStatus,
        error: Option<&str>,
    ) -> Map<String, Value> {
        let mut record = Map::new();
        if let Some(report) = report {
            record.insert(fields::REPORT.into(), Value::from(report));
        }
        record.insert(
            fields::FINDINGS.into(),
            serde_json::to_value(&state.findings).unwrap_or_else(|_| Value::Array(Vec::new())),
        );
        record.insert(fields::LOG.into(), Value::from(state.log.clone()));
        record.insert(fields::ROUNDS.into(), Value::from(state.round));
        record.insert(fields::STATUS.into(), Value::from(status.to_string()));
        record.insert(
            fields::INVESTIGATED_AT.into(),
            Value::from(Utc::now().to_rfc3339()),
        );
        if let Some(error) = error {
            record.insert(fields::ERROR.into(), Value::from(error));
        }
        record
    }

    /// Merge `record` into the alert's stored analysis blob.
    ///
    /// Read-modify-write without locking: concurrent investigations of the
    /// same alert can lose each other's fields.
    async fn persist(&self, alert_id: &str, record: Map<String, Value>) -> Result<()> {
        let mut blob = self.alerts.load_analysis(alert_id).await?.unwrap_or_default();
        let failed = record.get(fields::STATUS).and_then(Value::as_str)
            == Some(InvestigationStatus::Failed.to_string().as_str());
        if failed {
            blob.remove(fields::REPORT);
        } else {
            blob.remove(fields::ERROR);
        }
        blob.extend(record);
        self.alerts.save_analysis(alert_id, blob).await?;
        Ok(())
    }

    /// Deliver one update, bounded by `notify_timeout`. Never fails.
    async fn notify(&self, alert: &Alert, update: StatusUpdate) {
        let timeout = self.config.notify_timeout();
        let delivery = self.notifier.notify(&alert.tenant_id, &alert.id, &update);
        match tokio::time::timeout(timeout, delivery).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(alert_id = %alert.id, phase = %update.phase, error = %e, "Status notification failed");
            }
            Err(_) => {
                warn!(
                    alert_id = %alert.id,
                    phase = %update.phase,
                    timeout_secs = timeout.as_secs(),
                    "Status notification timed out"
                );
            }
        }
    }
}

/// Pin a task to the alert's tenant, replacing any tenant the planner named.
fn scope_to_tenant(task: AgentTask, tenant_id: &str) -> AgentTask {
    if let Some(requested) = task.param_str(task_types::TENANT_PARAM)
        && requested != tenant_id
    {
        warn!(
            task_type = %task.task_type,
            requested,
            tenant_id,
            "Discarding planner-supplied tenant"
        );
    }
    task.with_param(task_types::TENANT_PARAM, tenant_id)
}
