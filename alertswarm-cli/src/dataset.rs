//! Local investigation dataset: seed records for the in-memory stores.

use alertswarm_core::similarity::{LocalSimilarityIndex, SimilarAlert};
use alertswarm_core::store::{Dataset, InMemoryStore};
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// On-disk dataset layout. Everything is optional.
///
/// ```json
/// { "cases": [...], "users": [...], "sessions": [...], "logins": [...],
///   "events": [...], "similarAlerts": [...] }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatasetFile {
    #[serde(flatten)]
    pub records: Dataset,
    pub similar_alerts: Vec<SimilarAlert>,
}

/// Stores backing one CLI run.
pub struct LoadedDataset {
    pub store: Arc<InMemoryStore>,
    pub index: Arc<LocalSimilarityIndex>,
}

impl LoadedDataset {
    pub fn empty() -> Self {
        Self::from_file(DatasetFile::default())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;
        let file: DatasetFile = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid dataset {}", path.display()))?;
        Ok(Self::from_file(file))
    }

    /// Resolved cases are indexed for similarity search alongside any
    /// explicitly listed similar alerts.
    pub fn from_file(file: DatasetFile) -> Self {
        let index = LocalSimilarityIndex::new();
        for case in file.records.cases.iter().filter(|c| c.resolved) {
            index.index(SimilarAlert {
                alert_id: case.id.clone(),
                tenant_id: case.tenant_id.clone(),
                title: case.title.clone(),
                description: case.description.clone(),
                resolution: case.resolution.clone(),
                tags: case.tags.clone(),
                date: case.resolved_at.or(case.created_at),
                score: 0.0,
            });
        }
        for alert in file.similar_alerts {
            index.index(alert);
        }
        tracing::debug!(
            cases = file.records.cases.len(),
            users = file.records.users.len(),
            events = file.records.events.len(),
            indexed = index.len(),
            "Dataset loaded"
        );

        Self {
            store: Arc::new(InMemoryStore::from_dataset(file.records)),
            index: Arc::new(index),
        }
    }
}
