//! Semantic similarity search over previously resolved alerts.

use crate::embeddings::{Embedder, LocalEmbedder, cosine_similarity};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// An alert-like record returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarAlert {
    pub alert_id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    /// Similarity to the query in [0, 1]. Filled in by the search.
    #[serde(default)]
    pub score: f32,
}

/// Nearest-neighbour search collaborator.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Up to `k` alerts most similar to `query`, best first.
    async fn search_similar(
        &self,
        tenant_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SimilarAlert>, StoreError>;
}

struct IndexedAlert {
    alert: SimilarAlert,
    vector: Vec<f32>,
}

/// In-process vector index using [`LocalEmbedder`].
pub struct LocalSimilarityIndex {
    embedder: Box<dyn Embedder>,
    entries: RwLock<Vec<IndexedAlert>>,
}

impl LocalSimilarityIndex {
    pub fn new() -> Self {
        Self::with_embedder(Box::new(LocalEmbedder::default()))
    }

    pub fn with_embedder(embedder: Box<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Embed and store one alert. Title, description, and tags are indexed.
    pub fn index(&self, alert: SimilarAlert) {
        let text = format!(
            "{} {} {}",
            alert.title,
            alert.description,
            alert.tags.join(" ")
        );
        let vector = self.embedder.embed(&text);
        self.entries
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(IndexedAlert { alert, vector });
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LocalSimilarityIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimilaritySearch for LocalSimilarityIndex {
    async fn search_similar(
        &self,
        tenant_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SimilarAlert>, StoreError> {
        let query_vec = self.embedder.embed(query);
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());

        let mut hits: Vec<SimilarAlert> = entries
            .iter()
            .filter(|e| {
                e.alert.tenant_id.is_empty() || tenant_id.is_empty() || e.alert.tenant_id == tenant_id
            })
            .map(|e| {
                let mut alert = e.alert.clone();
                alert.score = cosine_similarity(&query_vec, &e.vector);
                alert
            })
            // Zero similarity shares no terms with the query.
            .filter(|a| a.score > 0.0)
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(id: &str, title: &str, description: &str) -> SimilarAlert {
        SimilarAlert {
            alert_id: id.into(),
            tenant_id: "t1".into(),
            title: title.into(),
            description: description.into(),
            resolution: Some("false positive".into()),
            tags: vec![],
            date: None,
            score: 0.0,
        }
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let index = LocalSimilarityIndex::new();
        index.index(alert("a1", "SSH brute force", "many failures from 203.0.113.7"));
        index.index(alert("a2", "Printer offline", "toner low on floor three"));
        index.index(alert("a3", "Port scan", "scan from 203.0.113.7 against dmz"));

        let hits = index
            .search_similar("t1", "IP address 203.0.113.7", 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.alert_id != "a2"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_search_respects_tenant_and_k() {
        let index = LocalSimilarityIndex::new();
        let mut other = alert("x", "SSH brute force", "203.0.113.7");
        other.tenant_id = "t2".into();
        index.index(other);
        index.index(alert("a1", "SSH brute force", "203.0.113.7"));

        let hits = index.search_similar("t1", "203.0.113.7", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].alert_id, "a1");

        let none = index.search_similar("t1", "203.0.113.7", 0).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_empty_index() {
        let index = LocalSimilarityIndex::default();
        assert!(index.is_empty());
        assert!(index.search_similar("t1", "anything", 3).await.unwrap().is_empty());
    }
}
