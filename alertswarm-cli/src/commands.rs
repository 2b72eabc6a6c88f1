//! Subcommand handlers.

use crate::dataset::LoadedDataset;
use crate::{Commands, ConfigAction};
use alertswarm_core::config::SwarmConfig;
use alertswarm_core::providers::create_provider;
use alertswarm_core::{
    Alert, ContextRetriever, InvestigationReport, LlmProvider, Orchestrator, TaskPlanner,
    TracingNotifier, extract_entities,
};
use alertswarm_security::{IntelClients, build_router};
use anyhow::Context;
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options for `alertswarm investigate`.
#[derive(Debug, Clone, Default)]
pub struct InvestigateOptions {
    pub alert: PathBuf,
    pub dataset: Option<PathBuf>,
    pub max_rounds: Option<u32>,
    pub tenant: Option<String>,
    pub json: bool,
}

pub async fn handle_command(
    command: Commands,
    config: SwarmConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match command {
        Commands::Investigate {
            alert,
            dataset,
            max_rounds,
            tenant,
            json,
        } => {
            let options = InvestigateOptions {
                alert,
                dataset,
                max_rounds,
                tenant,
                json,
            };
            let output = investigate(&options, &config).await?;
            println!("{}", output);
            Ok(())
        }
        Commands::Extract { alert } => {
            let alert = read_alert(&alert)?;
            let entities = extract_entities(&alert);
            println!("{}", serde_json::to_string_pretty(&entities)?);
            Ok(())
        }
        Commands::Config { action } => handle_config(action, &config, workspace),
    }
}

fn handle_config(action: ConfigAction, config: &SwarmConfig, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
        ConfigAction::Init => {
            let config_dir = workspace.join(".alertswarm");
            std::fs::create_dir_all(&config_dir)?;
            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            std::fs::write(&config_path, toml::to_string_pretty(&SwarmConfig::default())?)?;
            println!("Created default configuration at: {}", config_path.display());
            Ok(())
        }
    }
}

/// Read an alert from a JSON file, or stdin when the path is `-`.
pub fn read_alert(path: &Path) -> anyhow::Result<Alert> {
    let raw = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read alert from stdin")?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read alert {}", path.display()))?
    };
    serde_json::from_str(&raw).context("Alert is not valid JSON")
}

/// Run one investigation and render the output.
pub async fn investigate(options: &InvestigateOptions, config: &SwarmConfig) -> anyhow::Result<String> {
    let mut alert = read_alert(&options.alert)?;
    if let Some(tenant) = &options.tenant {
        alert.tenant_id = tenant.clone();
    }
    let dataset = match &options.dataset {
        Some(path) => LoadedDataset::load(path)?,
        None => LoadedDataset::empty(),
    };

    let report = run_investigation(&alert, &dataset, options.max_rounds, config).await?;
    if options.json {
        let record = dataset
            .store
            .analysis(&alert.id)
            .unwrap_or_else(Map::new);
        Ok(serde_json::to_string_pretty(&Value::Object(record))?)
    } else {
        Ok(render_report(&report))
    }
}

pub async fn run_investigation(
    alert: &Alert,
    dataset: &LoadedDataset,
    max_rounds: Option<u32>,
    config: &SwarmConfig,
) -> anyhow::Result<InvestigationReport> {
    let llm = create_provider(&config.llm).context(
        "Failed to create LLM provider (configure an API key, or set llm.provider = \"mock\" to run offline)",
    )?;
    let intel = IntelClients::from_config(&config.enrichment)
        .context("Failed to create enrichment clients")?;
    for client in [intel.abuseipdb.client(), intel.virustotal.client()] {
        if client.is_mock() {
            tracing::info!(provider = client.provider(), "No API key configured; using mock results");
        }
    }

    let router = build_router(
        &intel,
        &config.agents,
        dataset.store.clone(),
        dataset.store.clone(),
    );
    let orchestrator = Orchestrator::new(
        router,
        planner(llm, config),
        ContextRetriever::new(
            dataset.store.clone(),
            dataset.index.clone(),
            config.context.clone(),
        ),
        dataset.store.clone(),
        config.investigation.clone(),
    )
    .with_notifier(Arc::new(TracingNotifier));

    let report = match max_rounds {
        Some(rounds) => orchestrator.orchestrate_with_rounds(alert, rounds).await,
        None => orchestrator.orchestrate(alert).await,
    };
    report.map_err(|e| anyhow::anyhow!("Investigation of {} failed: {}", alert.id, e))
}

/// Planner with the configured sampling settings.
fn planner(llm: Arc<dyn LlmProvider>, config: &SwarmConfig) -> TaskPlanner {
    TaskPlanner::new(llm, &config.investigation)
        .with_sampling(config.llm.temperature, config.llm.max_tokens)
}

/// Human-readable report for the terminal.
pub fn render_report(report: &InvestigationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Investigation {} ({}, {} round{})",
        report.alert_id,
        report.status,
        report.rounds,
        if report.rounds == 1 { "" } else { "s" }
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", report.report.trim());

    let _ = writeln!(
        out,
        "\nFindings ({} total, {} failed):",
        report.findings.len(),
        report.failed_findings()
    );
    for finding in &report.findings {
        let marker = if finding.is_success() { "+" } else { "!" };
        let _ = writeln!(out, "  {} [{}] {}", marker, finding.agent, finding.summary);
    }

    if !report.historical_context.is_empty() {
        let _ = writeln!(out, "\nHistorical context:");
        for item in &report.historical_context {
            let _ = writeln!(out, "  - {} => {}", item.title, item.resolution);
        }
    }

    let _ = writeln!(out, "\nLog:");
    for line in &report.log {
        let _ = writeln!(out, "  {}", line);
    }
    let _ = write!(out, "\nTokens used: {}", report.usage.total());
    out
}
