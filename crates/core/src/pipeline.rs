use crate::catalog::DocumentCatalog;
use crate::coordinator::{IndexCoordinator, IndexStatus};
use crate::error::{BuildError, IngestionError, QueryError};
use crate::models::{Catalog, IndexHandle, PipelineOptions, QueryHit, UploadedFile};
use crate::progress::ProgressSink;
use crate::query::QueryEngine;
use crate::resolver::{Resolution, ResultResolver};
use crate::traits::{IndexEngine, PageRasterizer};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub query: String,
    pub top_k: usize,
    pub handle: Arc<IndexHandle>,
    pub hits: Vec<QueryHit>,
    pub resolution: Resolution,
}

/// Upload → build → query in one place. Each stage keeps its own state; the
/// pipeline only wires them together.
pub struct SearchPipeline {
    catalog: DocumentCatalog,
    coordinator: Arc<IndexCoordinator>,
    queries: QueryEngine,
    resolver: ResultResolver,
    options: PipelineOptions,
}

impl SearchPipeline {
    pub fn new(
        rasterizer: Arc<dyn PageRasterizer>,
        engine: Arc<dyn IndexEngine>,
        options: PipelineOptions,
    ) -> Self {
        let coordinator = Arc::new(IndexCoordinator::new(
            Arc::clone(&engine),
            options.index_name.clone(),
        ));
        let queries = QueryEngine::new(engine, Arc::clone(&coordinator), options.max_top_k);

        Self {
            catalog: DocumentCatalog::new(rasterizer),
            coordinator,
            queries,
            resolver: ResultResolver,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub async fn ingest(
        &self,
        files: &[UploadedFile],
        progress: &dyn ProgressSink,
    ) -> Result<Arc<Catalog>, IngestionError> {
        self.catalog.ingest(files, progress).await
    }

    /// Builds the index from whatever catalog is current right now.
    pub async fn build(&self, progress: &dyn ProgressSink) -> Result<Arc<IndexHandle>, BuildError> {
        self.coordinator.build(self.catalog.current(), progress).await
    }

    /// Queries the current index and resolves the hits against the current
    /// catalog. `top_k` falls back to the configured default.
    pub async fn search(
        &self,
        text: &str,
        top_k: Option<usize>,
        progress: &dyn ProgressSink,
    ) -> Result<SearchOutcome, QueryError> {
        let handle = self.coordinator.current_handle()?;
        let top_k = self
            .queries
            .clamp_top_k(top_k.unwrap_or(self.options.default_top_k));
        let hits = self.queries.query(&handle, text, top_k, progress).await?;
        let resolution = self.resolver.resolve(&hits, &self.catalog.current());

        Ok(SearchOutcome {
            query: text.trim().to_string(),
            top_k,
            handle,
            hits,
            resolution,
        })
    }

    pub fn status(&self) -> IndexStatus {
        self.coordinator.status()
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.current()
    }

    pub fn coordinator(&self) -> &Arc<IndexCoordinator> {
        &self.coordinator
    }

    pub fn queries(&self) -> &QueryEngine {
        &self.queries
    }
}
