use crate::models::DocumentId;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RasterizeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("document produced no pages: {}", .0.display())]
    NoPages(PathBuf),

    #[error("expected {expected} rendered pages, found {found}")]
    PageCountMismatch { expected: usize, found: usize },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("engine request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("upload batch is empty")]
    EmptyBatch,

    #[error("failed to rasterize {file}: {cause}")]
    File {
        file: String,
        #[source]
        cause: RasterizeError,
    },

    #[error("batch {ticket} was superseded by a later upload")]
    Superseded { ticket: u64 },
}

impl IngestionError {
    /// Name of the file that aborted the batch, if a single file is to blame.
    pub fn file(&self) -> Option<&str> {
        match self {
            Self::File { file, .. } => Some(file),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error("catalog has no pages to index")]
    EmptyCatalog,

    #[error("an index build is already in progress")]
    AlreadyBuilding,

    #[error("index engine failed: {cause}")]
    EngineFailure {
        #[source]
        cause: Arc<EngineError>,
    },
}

impl From<EngineError> for BuildError {
    fn from(cause: EngineError) -> Self {
        Self::EngineFailure {
            cause: Arc::new(cause),
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("index generation {used} is stale (current is {current:?})")]
    StaleIndex { used: u64, current: Option<u64> },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    NotReady(#[from] NotReadyError),

    #[error("search failed: {0}")]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, Error)]
#[error("no index has been built yet")]
pub struct NotReadyError;

#[derive(Debug, Clone, Error)]
#[error("document {document_id} is not in catalog version {catalog_version}")]
pub struct NotFoundError {
    pub document_id: DocumentId,
    pub catalog_version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    MissingDocument,
    MissingPage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedHit {
    pub document_id: DocumentId,
    pub page_number: u32,
    pub reason: UnresolvedReason,
}

/// Non-fatal: some hits point at documents or pages the catalog no longer
/// has, usually because files were re-uploaded without rebuilding the index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{} of {} hits could not be resolved against catalog version {}",
    .unresolved.len(),
    .total,
    .catalog_version
)]
pub struct PartialResolutionWarning {
    pub catalog_version: u64,
    pub total: usize,
    pub unresolved: Vec<UnresolvedHit>,
}
