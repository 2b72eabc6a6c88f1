//! # Alertswarm Core
//!
//! Core library for Alertswarm, a round-based multi-agent investigation
//! engine for security alerts. Provides the orchestrator loop, task planner,
//! task routing, historical context retrieval, entity extraction, the shared
//! enrichment rate window, the LLM interface (brain), configuration, and the
//! collaborator contracts for stores and notifications.

pub mod brain;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod entities;
pub mod error;
pub mod multi;
pub mod notify;
pub mod providers;
pub mod similarity;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{LlmProvider, MockLlmProvider, extract_json_block};
pub use config::{SwarmConfig, load_config};
pub use context::ContextRetriever;
pub use entities::extract_entities;
pub use error::{EnrichmentError, LlmError, Result, StoreError, SwarmError};
pub use multi::{AgentRouter, Orchestrator, SpecialistAgent, TaskPlanner};
pub use notify::{NoOpNotifier, Phase, RecordingNotifier, StatusNotifier, StatusUpdate, TracingNotifier};
pub use providers::RateWindow;
pub use similarity::{LocalSimilarityIndex, SimilarAlert, SimilaritySearch};
pub use store::{AlertStore, AnalyticsStore, CaseStore, InMemoryStore, UserDirectory};
pub use types::{
    AgentResult, AgentTask, Alert, Entities, HistoricalContextItem, InvestigationReport,
    InvestigationStatus, Observable, ResultStatus, TaskPriority, TokenUsage,
};
