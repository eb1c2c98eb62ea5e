pub mod catalog;
pub mod coordinator;
pub mod engines;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod query;
pub mod rasterizer;
pub mod resolver;
pub mod traits;

#[cfg(test)]
mod testing;

pub use catalog::{digest_pages, DocumentCatalog};
pub use coordinator::{IndexCoordinator, IndexStatus};
pub use engines::HttpIndexEngine;
pub use error::{
    BuildError, EngineError, IngestionError, NotFoundError, NotReadyError,
    PartialResolutionWarning, QueryError, RasterizeError, UnresolvedHit, UnresolvedReason,
};
pub use models::{
    Catalog, Document, DocumentId, DocumentSummary, EngineDocument, EngineHit, EngineIndex,
    IndexHandle, IndexedDocument, PageImage, PipelineOptions, PresentableResult, QueryHit,
    RasterOptions, UploadedFile, DEFAULT_THUMBNAIL_SIZE,
};
pub use pipeline::{SearchOutcome, SearchPipeline};
pub use progress::{NoopProgress, ProgressSink, TracingProgress};
pub use query::QueryEngine;
pub use rasterizer::{count_pdf_pages, discover_pdf_files, PdftoppmRasterizer};
pub use resolver::{Resolution, ResultResolver};
pub use traits::{IndexEngine, PageRasterizer};
