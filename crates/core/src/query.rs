use crate::coordinator::IndexCoordinator;
use crate::error::QueryError;
use crate::models::{EngineHit, IndexHandle, QueryHit};
use crate::progress::ProgressSink;
use crate::traits::IndexEngine;
use std::sync::Arc;
use tracing::{debug, warn};

/// Validates queries against the current index and normalizes engine hits.
/// Ranking is left entirely to the engine.
pub struct QueryEngine {
    engine: Arc<dyn IndexEngine>,
    coordinator: Arc<IndexCoordinator>,
    max_top_k: usize,
}

impl QueryEngine {
    pub fn new(
        engine: Arc<dyn IndexEngine>,
        coordinator: Arc<IndexCoordinator>,
        max_top_k: usize,
    ) -> Self {
        Self {
            engine,
            coordinator,
            max_top_k: max_top_k.max(1),
        }
    }

    pub fn max_top_k(&self) -> usize {
        self.max_top_k
    }

    pub fn clamp_top_k(&self, k: usize) -> usize {
        k.min(self.max_top_k)
    }

    pub async fn query(
        &self,
        handle: &IndexHandle,
        text: &str,
        k: usize,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<QueryHit>, QueryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(QueryError::InvalidQuery("query is empty".to_string()));
        }
        if k == 0 {
            return Err(QueryError::InvalidQuery("k must be positive".to_string()));
        }
        if !self.coordinator.is_current(handle) {
            return Err(QueryError::StaleIndex {
                used: handle.generation,
                current: self.coordinator.current_generation(),
            });
        }

        let k = self.clamp_top_k(k);
        progress.report(0, 1, text);
        let raw = self.engine.search(&handle.engine_index, text, k).await?;
        progress.report(1, 1, text);

        debug!(query = text, k, returned = raw.len(), "engine search finished");
        Ok(normalize_hits(handle, raw, k))
    }
}

fn normalize_hits(handle: &IndexHandle, raw: Vec<EngineHit>, limit: usize) -> Vec<QueryHit> {
    raw.into_iter()
        .filter_map(|hit| {
            let Some(indexed) = handle.lookup(&hit.document_ref) else {
                warn!(document_ref = %hit.document_ref, "dropping hit for unknown document");
                return None;
            };

            let page_in_range = usize::try_from(hit.page_number)
                .is_ok_and(|page| page >= 1 && page <= indexed.page_count);
            if !page_in_range {
                warn!(
                    document_ref = %hit.document_ref,
                    page = hit.page_number,
                    pages = indexed.page_count,
                    "dropping hit with out-of-range page"
                );
                return None;
            }

            Some(QueryHit {
                document_id: indexed.document_id,
                page_number: hit.page_number,
                score: hit.score,
                thumbnail: hit.page_image,
                catalog_version: handle.catalog_version,
            })
        })
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use crate::testing::{catalog, engine_hit, FakeEngine, RecordingProgress};
    use std::sync::atomic::Ordering;

    async fn ready(engine: &Arc<FakeEngine>, max_top_k: usize) -> (QueryEngine, Arc<IndexHandle>) {
        let engine_dyn = Arc::clone(engine) as Arc<dyn IndexEngine>;
        let coordinator = Arc::new(IndexCoordinator::new(Arc::clone(&engine_dyn), "image_index"));
        let handle = coordinator
            .build(catalog(1, &[("D1", 3), ("D2", 1)]), &NoopProgress)
            .await
            .expect("build should succeed");
        (QueryEngine::new(engine_dyn, coordinator, max_top_k), handle)
    }

    #[tokio::test]
    async fn hits_keep_engine_order() {
        let engine = Arc::new(FakeEngine::with_hits(vec![
            engine_hit("1", 1, 0.4),
            engine_hit("0", 2, 0.9),
        ]));
        let (queries, handle) = ready(&engine, 10).await;
        let progress = RecordingProgress::default();

        let hits = queries
            .query(&handle, "  pump curve  ", 5, &progress)
            .await
            .expect("query should succeed");

        let pages: Vec<u32> = hits.iter().map(|hit| hit.page_number).collect();
        assert_eq!(pages, vec![1, 2]);
        assert_eq!(hits[0].thumbnail.as_deref(), Some("thumb-1-1"));
        assert_eq!(hits[1].catalog_version, 1);
        assert_eq!(
            engine.last_search(),
            Some(("image_index".to_string(), "pump curve".to_string(), 5))
        );
        assert_eq!(progress.events().len(), 2);
    }

    #[tokio::test]
    async fn k_above_maximum_is_clamped() {
        let engine = Arc::new(FakeEngine::with_hits(
            (0..6).map(|rank| engine_hit("0", 1, 1.0 - rank as f64 / 10.0)).collect(),
        ));
        let (queries, handle) = ready(&engine, 3).await;

        let hits = queries
            .query(&handle, "valve", 100, &NoopProgress)
            .await
            .expect("query should succeed");

        assert_eq!(hits.len(), 3);
        assert_eq!(engine.last_search().map(|(_, _, k)| k), Some(3));
    }

    #[tokio::test]
    async fn stale_handle_is_rejected_before_searching() {
        let engine = Arc::new(FakeEngine::with_hits(vec![engine_hit("0", 1, 0.5)]));
        let (queries, stale) = ready(&engine, 10).await;
        queries
            .coordinator
            .build(catalog(2, &[("D3", 1)]), &NoopProgress)
            .await
            .expect("rebuild");

        let error = queries
            .query(&stale, "valve", 5, &NoopProgress)
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            QueryError::StaleIndex {
                used: 1,
                current: Some(2)
            }
        ));
        assert!(engine.last_search().is_none());
    }

    #[tokio::test]
    async fn empty_query_and_zero_k_are_invalid() {
        let engine = Arc::new(FakeEngine::default());
        let (queries, handle) = ready(&engine, 10).await;

        let empty = queries.query(&handle, "   ", 5, &NoopProgress).await;
        assert!(matches!(empty, Err(QueryError::InvalidQuery(_))));

        let zero = queries.query(&handle, "valve", 0, &NoopProgress).await;
        assert!(matches!(zero, Err(QueryError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn unresolvable_hits_are_dropped() {
        let engine = Arc::new(FakeEngine::with_hits(vec![
            engine_hit("7", 1, 0.9),
            engine_hit("0", 0, 0.8),
            engine_hit("0", 4, 0.7),
            engine_hit("1", 1, 0.6),
        ]));
        let (queries, handle) = ready(&engine, 10).await;

        let hits = queries
            .query(&handle, "valve", 5, &NoopProgress)
            .await
            .expect("query should succeed");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 0.6);
    }

    #[tokio::test]
    async fn engine_failures_pass_through() {
        let engine = Arc::new(FakeEngine::default());
        engine.fail_search.store(true, Ordering::SeqCst);
        let (queries, handle) = ready(&engine, 10).await;

        let error = queries
            .query(&handle, "valve", 5, &NoopProgress)
            .await
            .unwrap_err();
        assert!(matches!(error, QueryError::Engine(_)));
    }
}
