use crate::error::{EngineError, RasterizeError};
use crate::models::{EngineDocument, EngineHit, EngineIndex, PageImage, UploadedFile};
use crate::progress::ProgressSink;
use async_trait::async_trait;

/// Turns one uploaded file into its pages, first page first.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, file: &UploadedFile) -> Result<Vec<PageImage>, RasterizeError>;
}

/// The multimodal engine that embeds page images and answers queries.
#[async_trait]
pub trait IndexEngine: Send + Sync {
    /// Builds `name` from scratch when `overwrite` is set. Progress is
    /// reported once per submitted document.
    async fn build_index(
        &self,
        name: &str,
        documents: &[EngineDocument],
        overwrite: bool,
        progress: &dyn ProgressSink,
    ) -> Result<EngineIndex, EngineError>;

    async fn search(
        &self,
        index: &EngineIndex,
        query: &str,
        k: usize,
    ) -> Result<Vec<EngineHit>, EngineError>;
}
