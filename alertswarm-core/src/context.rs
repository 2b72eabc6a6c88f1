//! Historical context retrieval.
//!
//! Two independent strategies look for previously resolved cases that match
//! the alert's entities: a keyword lookup through case cross-references and a
//! semantic nearest-neighbour search. Either may fail on its own; failures are
//! logged and produce an empty list.

use crate::config::ContextConfig;
use crate::similarity::SimilaritySearch;
use crate::store::{Case, CaseStore};
use crate::types::{ContextSource, Entities, HistoricalContextItem};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Finds resolved cases related to an alert's entities.
pub struct ContextRetriever {
    cases: Arc<dyn CaseStore>,
    similarity: Arc<dyn SimilaritySearch>,
    config: ContextConfig,
}

impl ContextRetriever {
    pub fn new(
        cases: Arc<dyn CaseStore>,
        similarity: Arc<dyn SimilaritySearch>,
        config: ContextConfig,
    ) -> Self {
        Self {
            cases,
            similarity,
            config,
        }
    }

    /// Merged keyword and semantic matches, at most `max_items`. Never fails.
    pub async fn find_historical_context(
        &self,
        entities: &Entities,
        tenant_id: &str,
    ) -> Vec<HistoricalContextItem> {
        let (keyword, semantic) = futures::join!(
            self.keyword_matches(entities, tenant_id),
            self.semantic_matches(entities, tenant_id)
        );
        debug!(
            keyword = keyword.len(),
            semantic = semantic.len(),
            "Historical context candidates"
        );
        merge_context(keyword, semantic, self.config.max_items)
    }

    async fn keyword_matches(
        &self,
        entities: &Entities,
        tenant_id: &str,
    ) -> Vec<HistoricalContextItem> {
        let values: Vec<String> = entities.values().into_iter().map(String::from).collect();
        if values.is_empty() {
            return Vec::new();
        }

        let refs = match self
            .cases
            .case_references(tenant_id, &values, self.config.keyword_reference_limit)
            .await
        {
            Ok(refs) => refs,
            Err(e) => {
                warn!(error = %e, "Keyword context lookup failed");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let ids: Vec<String> = refs
            .into_iter()
            .filter(|r| seen.insert(r.case_id.clone()))
            .map(|r| r.case_id)
            .collect();
        if ids.is_empty() {
            return Vec::new();
        }

        match self
            .cases
            .resolved_cases(tenant_id, &ids, self.config.keyword_case_limit)
            .await
        {
            Ok(cases) => cases.into_iter().map(keyword_item).collect(),
            Err(e) => {
                warn!(error = %e, "Resolved case lookup failed");
                Vec::new()
            }
        }
    }

    async fn semantic_matches(
        &self,
        entities: &Entities,
        tenant_id: &str,
    ) -> Vec<HistoricalContextItem> {
        let Some(query) = semantic_query(entities) else {
            return Vec::new();
        };

        match self
            .similarity
            .search_similar(tenant_id, &query, self.config.semantic_k)
            .await
        {
            Ok(hits) => hits
                .into_iter()
                .map(|hit| HistoricalContextItem {
                    title: hit.title,
                    description: hit.description,
                    resolution: hit.resolution.unwrap_or_default(),
                    tags: hit.tags,
                    date: hit.date,
                    source: ContextSource::Semantic,
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "Semantic context search failed");
                Vec::new()
            }
        }
    }
}

fn keyword_item(case: Case) -> HistoricalContextItem {
    HistoricalContextItem {
        title: case.title,
        description: case.description,
        resolution: case.resolution.unwrap_or_default(),
        tags: case.tags,
        date: case.resolved_at.or(case.created_at),
        source: ContextSource::Keyword,
    }
}

/// Natural-language query built from whichever entities are present.
pub fn semantic_query(entities: &Entities) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(ip) = &entities.ip {
        parts.push(format!("IP address {}", ip));
    }
    if let Some(user) = &entities.username {
        parts.push(format!("user {}", user));
    }
    if let Some(hash) = &entities.hash {
        parts.push(format!("file hash {}", hash));
    }
    if parts.is_empty() {
        return None;
    }
    Some(format!("Security alert involving {}", parts.join(", ")))
}

/// Concatenate keyword then semantic items, drop repeated titles, truncate.
pub fn merge_context(
    keyword: Vec<HistoricalContextItem>,
    semantic: Vec<HistoricalContextItem>,
    max_items: usize,
) -> Vec<HistoricalContextItem> {
    let mut seen = HashSet::new();
    let mut merged: Vec<HistoricalContextItem> = keyword
        .into_iter()
        .chain(semantic)
        .filter(|item| seen.insert(item.title.clone()))
        .collect();
    merged.truncate(max_items);
    merged
}
