use crate::error::NotFoundError;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Identifier minted for a document when its batch is ingested.
///
/// Ids are random, so a re-ingested file gets a fresh id and hits produced
/// against an older catalog never silently resolve to a different document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Longer side of the preview shown next to a search result.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 800;

/// One rendered page. The bytes are passed through to the index engine and
/// the presentation layer unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    media_type: String,
    data: Arc<[u8]>,
}

impl PageImage {
    pub fn new(media_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    pub fn png(data: impl Into<Arc<[u8]>>) -> Self {
        Self::new("image/png", data)
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.to_base64())
    }

    /// Downscales the page so its longer side is at most `max_side` pixels,
    /// keeping the aspect ratio. Pages already that small are returned as-is.
    pub fn thumbnail(&self, max_side: u32) -> Result<PageImage, image::ImageError> {
        let decoded = image::load_from_memory(&self.data)?;
        if decoded.width().max(decoded.height()) <= max_side {
            return Ok(self.clone());
        }

        let mut encoded = Vec::new();
        decoded
            .thumbnail(max_side, max_side)
            .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)?;
        Ok(PageImage::png(encoded))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub path: PathBuf,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Uses the file name as display name, falling back to the whole path.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self::new(name, path)
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    pub source_path: PathBuf,
    pub pages: Vec<PageImage>,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Looks up a page by its 1-indexed number.
    pub fn page(&self, number: u32) -> Option<&PageImage> {
        let index = usize::try_from(number).ok()?.checked_sub(1)?;
        self.pages.get(index)
    }
}

/// Immutable snapshot of everything ingested by one upload batch.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    version: u64,
    documents: Vec<Arc<Document>>,
}

impl Catalog {
    pub(crate) fn new(version: u64, documents: Vec<Arc<Document>>) -> Self {
        Self { version, documents }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn documents(&self) -> &[Arc<Document>] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn total_pages(&self) -> usize {
        self.documents.iter().map(|document| document.page_count()).sum()
    }

    pub fn get(&self, id: &DocumentId) -> Option<&Arc<Document>> {
        self.documents.iter().find(|document| &document.id == id)
    }

    pub fn resolve(&self, id: &DocumentId) -> Result<Arc<Document>, NotFoundError> {
        self.get(id).cloned().ok_or(NotFoundError {
            document_id: *id,
            catalog_version: self.version,
        })
    }

    pub fn summary(&self) -> Vec<DocumentSummary> {
        self.documents
            .iter()
            .map(|document| DocumentSummary {
                name: document.name.clone(),
                pages: document.page_count(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub name: String,
    pub pages: usize,
}

/// What the engine accepts for one document during a build.
#[derive(Debug, Clone)]
pub struct EngineDocument {
    pub path: PathBuf,
    pub pages: Vec<PageImage>,
}

/// Engine-side result of a build. `document_refs` lines up with the
/// documents submitted, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineIndex {
    pub id: String,
    pub document_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineHit {
    pub document_ref: String,
    pub page_number: u32,
    pub score: f64,
    pub page_image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedDocument {
    pub document_id: DocumentId,
    pub page_count: usize,
}

#[derive(Debug, Clone)]
pub struct IndexHandle {
    pub name: String,
    pub engine_index: EngineIndex,
    pub generation: u64,
    pub catalog_version: u64,
    pub built_at: DateTime<Utc>,
    pub(crate) documents: HashMap<String, IndexedDocument>,
}

impl IndexHandle {
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn lookup(&self, document_ref: &str) -> Option<&IndexedDocument> {
        self.documents.get(document_ref)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    pub document_id: DocumentId,
    pub page_number: u32,
    pub score: f64,
    pub thumbnail: Option<String>,
    pub catalog_version: u64,
}

#[derive(Debug, Clone)]
pub struct PresentableResult {
    pub document: Arc<Document>,
    pub page_number: u32,
    pub score: f64,
    pub page_image: PageImage,
    pub thumbnail: Option<String>,
}

impl PresentableResult {
    pub fn label(&self) -> String {
        format!(
            "{} - page {} - score {:.2}",
            self.document.name, self.page_number, self.score
        )
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub index_name: String,
    pub default_top_k: usize,
    pub max_top_k: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            index_name: "image_index".to_string(),
            default_top_k: 5,
            max_top_k: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RasterOptions {
    pub dpi: u32,
    pub pdftoppm_bin: PathBuf,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            dpi: 150,
            pdftoppm_bin: PathBuf::from("pdftoppm"),
        }
    }
}
