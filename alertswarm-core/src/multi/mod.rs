//! Multi-agent investigation: task routing, planning, and the round loop.

pub mod orchestrator;
pub mod planner;
pub mod routing;

pub use orchestrator::Orchestrator;
pub use planner::{Plan, TaskPlanner, fallback_tasks, parse_plan};
pub use routing::{AgentRouter, ROUTER_AGENT, SpecialistAgent};
