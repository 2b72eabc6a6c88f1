//! Task routing: directs each `AgentTask` to the specialist that handles its type.
//!
//! Specialists declare the task types they recognise when registered. The
//! router keeps registration order so the planner sees a stable list of
//! available task types.

use crate::types::{AgentResult, AgentTask};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Agent name used on results the router produces itself.
pub const ROUTER_AGENT: &str = "router";

/// A specialist investigative capability.
///
/// `process` must always return a well-formed result: expected failures
/// (provider down, record not found, bad parameters) become a failed
/// `AgentResult` instead of an error.
#[async_trait]
pub trait SpecialistAgent: Send + Sync {
    /// Agent name recorded on every result it produces.
    fn name(&self) -> &str;

    /// Task types this agent recognises.
    fn task_types(&self) -> &[&'static str];

    async fn process(&self, task: &AgentTask) -> AgentResult;
}

/// Maps task types to registered specialists.
#[derive(Default, Clone)]
pub struct AgentRouter {
    routes: HashMap<String, Arc<dyn SpecialistAgent>>,
    /// Task types in registration order.
    order: Vec<String>,
}

impl AgentRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent for every task type it declares.
    ///
    /// A type already claimed by an earlier agent is reassigned to this one.
    pub fn register(&mut self, agent: Arc<dyn SpecialistAgent>) {
        for task_type in agent.task_types() {
            let key = task_type.to_string();
            if let Some(previous) = self.routes.insert(key.clone(), agent.clone()) {
                warn!(
                    task_type = %key,
                    previous = previous.name(),
                    agent = agent.name(),
                    "Task type re-registered"
                );
            } else {
                self.order.push(key);
            }
        }
    }

    /// Builder-style registration.
    pub fn with_agent(mut self, agent: Arc<dyn SpecialistAgent>) -> Self {
        self.register(agent);
        self
    }

    pub fn route(&self, task_type: &str) -> Option<Arc<dyn SpecialistAgent>> {
        self.routes.get(task_type).cloned()
    }

    /// All routable task types, in registration order.
    pub fn task_types(&self) -> &[String] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route and run one task. An unroutable task yields a failed result.
    pub async fn dispatch(&self, task: &AgentTask) -> AgentResult {
        match self.route(&task.task_type) {
            Some(agent) => agent.process(task).await,
            None => unroutable(task),
        }
    }
}

/// Failed result for a task type no agent handles.
pub fn unroutable(task: &AgentTask) -> AgentResult {
    AgentResult::failed(
        ROUTER_AGENT,
        format!("No agent handles task type '{}'", task.task_type),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskPriority;
    use serde_json::json;

    struct EchoAgent {
        name: &'static str,
        types: &'static [&'static str],
    }

    #[async_trait]
    impl SpecialistAgent for EchoAgent {
        fn name(&self) -> &str {
            self.name
        }

        fn task_types(&self) -> &[&'static str] {
            self.types
        }

        async fn process(&self, task: &AgentTask) -> AgentResult {
            AgentResult::success(self.name, json!({ "type": task.task_type }), "ok")
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_type() {
        let router = AgentRouter::new()
            .with_agent(Arc::new(EchoAgent {
                name: "network",
                types: &["check_ip", "query_logs"],
            }))
            .with_agent(Arc::new(EchoAgent {
                name: "file",
                types: &["check_hash"],
            }));

        let result = router
            .dispatch(&AgentTask::new("check_hash", TaskPriority::High))
            .await;
        assert_eq!(result.agent, "file");
        assert!(result.is_success());
        assert_eq!(router.task_types(), ["check_ip", "query_logs", "check_hash"]);
    }

    #[tokio::test]
    async fn test_unknown_type_fails_without_panicking() {
        let router = AgentRouter::new();
        let result = router
            .dispatch(&AgentTask::new("detonate", TaskPriority::Low))
            .await;
        assert_eq!(result.agent, ROUTER_AGENT);
        assert!(!result.is_success());
        assert!(result.error.unwrap().contains("detonate"));
    }

    #[test]
    fn test_reregistration_keeps_single_entry() {
        let mut router = AgentRouter::new();
        router.register(Arc::new(EchoAgent {
            name: "a",
            types: &["check_ip"],
        }));
        router.register(Arc::new(EchoAgent {
            name: "b",
            types: &["check_ip"],
        }));
        assert_eq!(router.task_types().len(), 1);
        assert_eq!(router.route("check_ip").unwrap().name(), "b");
    }
}
