use crate::error::RasterizeError;
use crate::models::{PageImage, RasterOptions, UploadedFile};
use crate::traits::PageRasterizer;
use async_trait::async_trait;
use lopdf::Document;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if entry.file_type().is_file() && is_pdf(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

pub fn count_pdf_pages(path: &Path) -> Result<usize, RasterizeError> {
    let document =
        Document::load(path).map_err(|error| RasterizeError::PdfParse(error.to_string()))?;
    Ok(document.get_pages().len())
}

/// Renders PDFs with poppler's `pdftoppm`, one PNG per page.
pub struct PdftoppmRasterizer {
    options: RasterOptions,
}

impl PdftoppmRasterizer {
    pub fn new(options: RasterOptions) -> Self {
        Self { options }
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new(RasterOptions::default())
    }
}

#[async_trait]
impl PageRasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, file: &UploadedFile) -> Result<Vec<PageImage>, RasterizeError> {
        if !is_pdf(&file.path) {
            return Err(RasterizeError::UnsupportedFormat(file.name.clone()));
        }

        let path = file.path.clone();
        let expected = tokio::task::spawn_blocking(move || count_pdf_pages(&path))
            .await
            .map_err(|error| RasterizeError::PdfParse(format!("page count task failed: {error}")))??;

        if expected == 0 {
            return Err(RasterizeError::NoPages(file.path.clone()));
        }

        let workdir = tempfile::tempdir()?;
        let output = Command::new(&self.options.pdftoppm_bin)
            .arg("-png")
            .arg("-r")
            .arg(self.options.dpi.to_string())
            .arg(&file.path)
            .arg(workdir.path().join("page"))
            .output()
            .await?;

        if !output.status.success() {
            return Err(RasterizeError::ToolFailed {
                tool: self.options.pdftoppm_bin.display().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let pages = read_rendered_pages(workdir.path()).await?;
        if pages.len() != expected {
            return Err(RasterizeError::PageCountMismatch {
                expected,
                found: pages.len(),
            });
        }

        debug!(file = %file.name, pages = pages.len(), "rasterized");
        Ok(pages)
    }
}

/// Reads `page-N.png` files back in page order. pdftoppm zero-pads `N` to
/// the width of the page count, so lexical order is not enough.
async fn read_rendered_pages(dir: &Path) -> Result<Vec<PageImage>, RasterizeError> {
    let mut numbered = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some(number) = page_number_from_file_name(&name.to_string_lossy()) {
            numbered.push((number, entry.path()));
        }
    }

    numbered.sort_unstable_by_key(|(number, _)| *number);

    let mut pages = Vec::with_capacity(numbered.len());
    for (_, path) in numbered {
        let bytes = tokio::fs::read(&path).await?;
        pages.push(PageImage::png(bytes));
    }
    Ok(pages)
}

fn page_number_from_file_name(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(".png")?;
    let (_, number) = stem.rsplit_once('-')?;
    number.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        fs::write(base.join("notes.txt"), b"skip me")?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn page_numbers_ignore_zero_padding() {
        assert_eq!(page_number_from_file_name("page-1.png"), Some(1));
        assert_eq!(page_number_from_file_name("page-010.png"), Some(10));
        assert_eq!(page_number_from_file_name("page-1.ppm"), None);
        assert_eq!(page_number_from_file_name("cover.png"), None);
    }

    #[tokio::test]
    async fn rendered_pages_come_back_in_page_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("page-10.png"), b"ten")?;
        fs::write(dir.path().join("page-02.png"), b"two")?;
        fs::write(dir.path().join("page-01.png"), b"one")?;

        let pages = read_rendered_pages(dir.path()).await?;
        let bytes: Vec<&[u8]> = pages.iter().map(PageImage::bytes).collect();
        assert_eq!(bytes, vec![&b"one"[..], &b"two"[..], &b"ten"[..]]);
        Ok(())
    }

    #[tokio::test]
    async fn non_pdf_uploads_are_rejected() {
        let rasterizer = PdftoppmRasterizer::default();
        let file = UploadedFile::new("sheet.xlsx", "/tmp/sheet.xlsx");
        let error = rasterizer.rasterize(&file).await.unwrap_err();
        assert!(matches!(error, RasterizeError::UnsupportedFormat(name) if name == "sheet.xlsx"));
    }

    #[tokio::test]
    async fn unreadable_pdf_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let rasterizer = PdftoppmRasterizer::default();
        let error = rasterizer
            .rasterize(&UploadedFile::from_path(&path))
            .await
            .unwrap_err();
        assert!(matches!(error, RasterizeError::PdfParse(_)));
        Ok(())
    }
}
