//! Fakes and fixtures shared by the unit tests.

use crate::error::{EngineError, RasterizeError};
use crate::models::{
    Catalog, Document, DocumentId, EngineDocument, EngineHit, EngineIndex, PageImage, UploadedFile,
};
use crate::progress::ProgressSink;
use crate::traits::{IndexEngine, PageRasterizer};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<(usize, usize, String)>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<(usize, usize, String)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, current: usize, total: usize, label: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push((current, total, label.to_string()));
        }
    }
}

pub fn page_image(name: &str, page: usize) -> PageImage {
    PageImage::png(format!("{name}#{page}").into_bytes())
}

pub fn document(name: &str, pages: usize) -> Arc<Document> {
    Arc::new(Document {
        id: DocumentId::new(),
        name: name.to_string(),
        source_path: PathBuf::from(format!("/uploads/{name}")),
        pages: (1..=pages).map(|page| page_image(name, page)).collect(),
        checksum: String::new(),
        ingested_at: Utc::now(),
    })
}

pub fn catalog(version: u64, documents: &[(&str, usize)]) -> Arc<Catalog> {
    Arc::new(Catalog::new(
        version,
        documents
            .iter()
            .map(|(name, pages)| document(name, *pages))
            .collect(),
    ))
}

#[derive(Default)]
pub struct FakeRasterizer {
    pub pages: HashMap<String, usize>,
    pub gated: Option<String>,
    pub started: Notify,
    pub release: Notify,
}

impl FakeRasterizer {
    pub fn with_pages(pages: &[(&str, usize)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(name, count)| (name.to_string(), *count))
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PageRasterizer for FakeRasterizer {
    async fn rasterize(&self, file: &UploadedFile) -> Result<Vec<PageImage>, RasterizeError> {
        if self.gated.as_deref() == Some(file.name.as_str()) {
            self.started.notify_one();
            self.release.notified().await;
        }

        let count = self
            .pages
            .get(&file.name)
            .ok_or_else(|| RasterizeError::PdfParse(format!("cannot open {}", file.name)))?;
        Ok((1..=*count).map(|page| page_image(&file.name, page)).collect())
    }
}

pub fn uploads(names: &[&str]) -> Vec<UploadedFile> {
    names
        .iter()
        .map(|name| UploadedFile::new(*name, format!("/uploads/{name}")))
        .collect()
}

pub fn engine_hit(document_ref: &str, page_number: u32, score: f64) -> EngineHit {
    EngineHit {
        document_ref: document_ref.to_string(),
        page_number,
        score,
        page_image: Some(format!("thumb-{document_ref}-{page_number}")),
    }
}

/// Engine that hands out positional document refs ("0", "1", ...) and
/// answers every search with a canned hit list.
#[derive(Default)]
pub struct FakeEngine {
    pub hits: Mutex<Vec<EngineHit>>,
    pub fail_build: AtomicBool,
    pub fail_search: AtomicBool,
    pub gate_build: AtomicBool,
    pub build_started: Notify,
    pub release_build: Notify,
    pub builds: Mutex<Vec<(String, usize, bool)>>,
    pub searches: Mutex<Vec<(String, String, usize)>>,
}

impl FakeEngine {
    pub fn with_hits(hits: Vec<EngineHit>) -> Self {
        Self {
            hits: Mutex::new(hits),
            ..Default::default()
        }
    }

    pub fn build_count(&self) -> usize {
        self.builds.lock().map(|builds| builds.len()).unwrap_or_default()
    }

    pub fn last_search(&self) -> Option<(String, String, usize)> {
        self.searches
            .lock()
            .ok()
            .and_then(|searches| searches.last().cloned())
    }
}

#[async_trait]
impl IndexEngine for FakeEngine {
    async fn build_index(
        &self,
        name: &str,
        documents: &[EngineDocument],
        overwrite: bool,
        progress: &dyn ProgressSink,
    ) -> Result<EngineIndex, EngineError> {
        if let Ok(mut builds) = self.builds.lock() {
            builds.push((name.to_string(), documents.len(), overwrite));
        }

        if self.gate_build.load(Ordering::SeqCst) {
            self.build_started.notify_one();
            self.release_build.notified().await;
        }

        for (index, document) in documents.iter().enumerate() {
            progress.report(index + 1, documents.len(), &document.path.display().to_string());
        }

        if self.fail_build.load(Ordering::SeqCst) {
            return Err(EngineError::Request("engine crashed".to_string()));
        }

        Ok(EngineIndex {
            id: name.to_string(),
            document_refs: (0..documents.len()).map(|index| index.to_string()).collect(),
        })
    }

    async fn search(
        &self,
        index: &EngineIndex,
        query: &str,
        k: usize,
    ) -> Result<Vec<EngineHit>, EngineError> {
        if let Ok(mut searches) = self.searches.lock() {
            searches.push((index.id.clone(), query.to_string(), k));
        }

        if self.fail_search.load(Ordering::SeqCst) {
            return Err(EngineError::BackendResponse {
                backend: "fake".to_string(),
                details: "503 Service Unavailable".to_string(),
            });
        }

        Ok(self.hits.lock().map(|hits| hits.clone()).unwrap_or_default())
    }
}
