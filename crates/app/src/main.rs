use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use page_search_core::{
    discover_pdf_files, Catalog, HttpIndexEngine, IndexStatus, PdftoppmRasterizer,
    PipelineOptions, RasterOptions, SearchOutcome, SearchPipeline, TracingProgress, UploadedFile,
    DEFAULT_THUMBNAIL_SIZE,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "page-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Multimodal index service base URL
    #[arg(long, env = "PAGE_SEARCH_ENGINE_URL", default_value = "http://localhost:8000")]
    engine_url: String,

    /// Logical index name, overwritten on every build
    #[arg(long, env = "PAGE_SEARCH_INDEX", default_value = "image_index")]
    index_name: String,

    /// Upper bound for the number of hits per query
    #[arg(long, env = "PAGE_SEARCH_MAX_K", default_value = "50")]
    max_top_k: usize,

    /// Rendering resolution for page images
    #[arg(long, env = "PAGE_SEARCH_DPI", default_value = "150")]
    dpi: u32,

    /// pdftoppm executable
    #[arg(long, env = "PDFTOPPM_BIN", default_value = "pdftoppm")]
    pdftoppm_bin: PathBuf,
}

#[derive(Args)]
struct Inputs {
    /// Folder that contains PDFs recursively.
    #[arg(long)]
    folder: Option<PathBuf>,

    /// PDF files, in upload order.
    files: Vec<PathBuf>,
}

impl Inputs {
    fn uploads(&self) -> Vec<UploadedFile> {
        let mut paths = self.files.clone();
        if let Some(folder) = &self.folder {
            paths.extend(discover_pdf_files(folder));
        }
        paths
            .iter()
            .map(|path| UploadedFile::from_path(path))
            .collect()
    }
}

#[derive(Subcommand)]
enum Command {
    /// Rasterize the uploads and list their pages.
    Pages {
        /// Print a downscaled preview of every page as a data URI.
        #[arg(long, default_value_t = false)]
        previews: bool,
        /// Longer side of each preview, in pixels.
        #[arg(long, default_value_t = DEFAULT_THUMBNAIL_SIZE)]
        thumbnail_size: u32,
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Upload, build the index and run a single query.
    Search {
        /// Search query
        #[arg(long)]
        query: String,
        /// Number of pages to return.
        #[arg(long)]
        top_k: Option<usize>,
        /// Print each result page as a data URI.
        #[arg(long, default_value_t = false)]
        data_uri: bool,
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Upload and build once, then answer queries read from stdin.
    Interactive {
        /// Number of pages to return.
        #[arg(long)]
        top_k: Option<usize>,
        #[command(flatten)]
        inputs: Inputs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let rasterizer = PdftoppmRasterizer::new(RasterOptions {
        dpi: cli.dpi,
        pdftoppm_bin: cli.pdftoppm_bin.clone(),
    });
    let engine = HttpIndexEngine::new(&cli.engine_url)
        .with_context(|| format!("invalid engine url {}", cli.engine_url))?;
    let pipeline = SearchPipeline::new(
        Arc::new(rasterizer),
        Arc::new(engine),
        PipelineOptions {
            index_name: cli.index_name.clone(),
            max_top_k: cli.max_top_k,
            ..PipelineOptions::default()
        },
    );

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "page-search boot"
    );

    match cli.command {
        Command::Pages {
            previews,
            thumbnail_size,
            inputs,
        } => {
            let catalog = ingest(&pipeline, &inputs).await?;
            print_catalog(&catalog);
            if previews {
                print_previews(&catalog, thumbnail_size)?;
            }
        }
        Command::Search {
            query,
            top_k,
            data_uri,
            inputs,
        } => {
            ingest(&pipeline, &inputs).await?;
            build(&pipeline).await?;
            let outcome = pipeline
                .search(&query, top_k, &TracingProgress::new("query"))
                .await?;
            print_outcome(&outcome, data_uri);
        }
        Command::Interactive { top_k, inputs } => {
            ingest(&pipeline, &inputs).await?;
            build(&pipeline).await?;
            interactive(&pipeline, top_k).await?;
        }
    }

    Ok(())
}

async fn ingest(pipeline: &SearchPipeline, inputs: &Inputs) -> anyhow::Result<Arc<Catalog>> {
    let uploads = inputs.uploads();
    info!(files = uploads.len(), "extracting images");
    let catalog = pipeline
        .ingest(&uploads, &TracingProgress::new("rasterize"))
        .await?;
    println!("{} pdfs loaded...", catalog.len());
    Ok(catalog)
}

async fn build(pipeline: &SearchPipeline) -> anyhow::Result<()> {
    let handle = pipeline.build(&TracingProgress::new("index")).await?;
    println!(
        "Index created! name={} documents={} built_at={}",
        handle.name,
        handle.document_count(),
        handle.built_at.to_rfc3339()
    );
    Ok(())
}

async fn interactive(pipeline: &SearchPipeline, top_k: Option<usize>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            ":status" => print_status(&pipeline.status()),
            ":rebuild" => {
                if let Err(error) = build(pipeline).await {
                    warn!(error = %error, "rebuild failed");
                    println!("rebuild failed: {error}");
                }
            }
            query => match pipeline
                .search(query, top_k, &TracingProgress::new("query"))
                .await
            {
                Ok(outcome) => print_outcome(&outcome, false),
                Err(error) => println!("query failed: {error}"),
            },
        }
    }
    Ok(())
}

fn print_catalog(catalog: &Catalog) {
    println!("{:<48} {:>6}", "document", "pages");
    for row in catalog.summary() {
        println!("{:<48} {:>6}", row.name, row.pages);
    }
    println!("{:<48} {:>6}", "total", catalog.total_pages());
}

fn print_previews(catalog: &Catalog, max_side: u32) -> anyhow::Result<()> {
    for document in catalog.documents() {
        for (index, page) in document.pages.iter().enumerate() {
            let preview = page
                .thumbnail(max_side)
                .with_context(|| format!("cannot preview {} page {}", document.name, index + 1))?;
            println!("{} page {}: {}", document.name, index + 1, preview.to_data_uri());
        }
    }
    Ok(())
}

fn print_status(status: &IndexStatus) {
    match status {
        IndexStatus::Idle => println!("Please build index first..."),
        IndexStatus::Building => println!("Indexing files..."),
        IndexStatus::Ready(handle) => println!(
            "Index loaded... generation={} catalog_version={}",
            handle.generation, handle.catalog_version
        ),
        IndexStatus::Failed(error) => println!("Last build failed: {error}"),
    }
}

fn print_outcome(outcome: &SearchOutcome, data_uri: bool) {
    println!("query: {} (top_k={})", outcome.query, outcome.top_k);
    for result in &outcome.resolution.results {
        println!("{}", result.label());
        println!("  source={}", result.document.source_path.display());
        if data_uri {
            println!("  image={}", result.page_image.to_data_uri());
        }
    }

    if let Some(warning) = &outcome.resolution.warning {
        warn!(%warning, "some hits could not be shown");
        println!("warning: {warning}; rebuild the index after uploading new files");
    }
}
