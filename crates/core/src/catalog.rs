use crate::error::{IngestionError, NotFoundError, RasterizeError};
use crate::models::{Catalog, Document, DocumentId, PageImage, UploadedFile};
use crate::progress::ProgressSink;
use crate::traits::PageRasterizer;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

struct CatalogState {
    current: Arc<Catalog>,
    applied_ticket: u64,
}

/// Holds the current catalog and replaces it wholesale on every successful
/// upload batch. Readers always see either the old or the new snapshot.
pub struct DocumentCatalog {
    rasterizer: Arc<dyn PageRasterizer>,
    state: RwLock<CatalogState>,
    next_ticket: AtomicU64,
}

impl DocumentCatalog {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>) -> Self {
        Self {
            rasterizer,
            state: RwLock::new(CatalogState {
                current: Arc::new(Catalog::default()),
                applied_ticket: 0,
            }),
            next_ticket: AtomicU64::new(0),
        }
    }

    /// Rasterizes every file of the batch and swaps in a new catalog.
    ///
    /// The batch is all-or-nothing: the first file that fails aborts it and
    /// the previous catalog stays current. Overlapping batches apply in the
    /// order they were received, so a batch that finishes after a newer one
    /// was applied is discarded with [`IngestionError::Superseded`].
    pub async fn ingest(
        &self,
        files: &[UploadedFile],
        progress: &dyn ProgressSink,
    ) -> Result<Arc<Catalog>, IngestionError> {
        if files.is_empty() {
            return Err(IngestionError::EmptyBatch);
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let total = files.len();
        let mut documents = Vec::with_capacity(total);

        for (index, file) in files.iter().enumerate() {
            progress.report(index + 1, total, &file.name);
            let document = self
                .ingest_file(file)
                .await
                .map_err(|cause| IngestionError::File {
                    file: file.name.clone(),
                    cause,
                })?;
            documents.push(Arc::new(document));
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.applied_ticket > ticket {
            warn!(
                ticket,
                applied = state.applied_ticket,
                "discarding superseded upload batch"
            );
            return Err(IngestionError::Superseded { ticket });
        }

        let catalog = Arc::new(Catalog::new(state.current.version() + 1, documents));
        state.current = Arc::clone(&catalog);
        state.applied_ticket = ticket;

        info!(
            version = catalog.version(),
            documents = catalog.len(),
            pages = catalog.total_pages(),
            "catalog replaced"
        );
        Ok(catalog)
    }

    pub fn current(&self) -> Arc<Catalog> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&state.current)
    }

    pub fn resolve(&self, document_id: &DocumentId) -> Result<Arc<Document>, NotFoundError> {
        self.current().resolve(document_id)
    }

    async fn ingest_file(&self, file: &UploadedFile) -> Result<Document, RasterizeError> {
        let pages = self.rasterizer.rasterize(file).await?;
        if pages.is_empty() {
            return Err(RasterizeError::NoPages(file.path.clone()));
        }

        Ok(Document {
            id: DocumentId::new(),
            name: file.name.clone(),
            source_path: file.path.clone(),
            checksum: digest_pages(&pages),
            pages,
            ingested_at: Utc::now(),
        })
    }
}

/// SHA-256 over the rendered pages, in order.
pub fn digest_pages(pages: &[PageImage]) -> String {
    let mut hasher = Sha256::new();
    for page in pages {
        hasher.update(page.bytes());
    }
    format!("{:x}", hasher.finalize())
}
