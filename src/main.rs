//! # Easel CLI
//!
//! Command-line access to the composition engine for inspecting and
//! batch-processing documents.
//!
//! ## Usage
//!
//! ```bash
//! # Normalize a document and print it with the current schema version
//! easel normalize overlay.json
//!
//! # Regenerate every series from a JSON array of records
//! easel generate overlay.json standings.json
//!
//! # Regenerate one series only
//! easel generate overlay.json standings.json --series top-10
//!
//! # Where would this element land if dropped at (317, 92)?
//! easel snap overlay.json title 317 92
//!
//! # Fill series from the live ranking service
//! easel preview overlay.json --url https://scores.example/api
//! ```
//!
//! Logging goes to stderr and follows `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use easel::{
    CanvasDocument, EaselError, EngineConfig,
    collab::{HttpProvider, PreviewDataProvider},
    document::edit::{Edit, EditContext},
    error::EditError,
    series::Record,
    snap::snap,
};

/// Easel - broadcast graphic composition engine
#[derive(Parser, Debug)]
#[command(name = "easel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Grid size in canvas pixels
    #[arg(long, global = true)]
    grid_size: Option<f64>,

    /// Disable grid snapping
    #[arg(long, global = true)]
    no_grid: bool,

    /// Disable element-to-element snapping
    #[arg(long, global = true)]
    no_element_snap: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Normalize a document and print it
    Normalize {
        /// Document JSON file
        file: PathBuf,
    },

    /// Regenerate series elements from a records file
    Generate {
        /// Document JSON file
        document: PathBuf,

        /// JSON array of ranked records
        records: PathBuf,

        /// Only regenerate this series
        #[arg(long, value_name = "ID")]
        series: Option<String>,
    },

    /// Snap an element to a raw position and print the result
    Snap {
        /// Document JSON file
        document: PathBuf,

        /// Element to move
        element: String,

        x: f64,
        y: f64,
    },

    /// Fetch preview records over HTTP and regenerate every series
    Preview {
        /// Document JSON file
        document: PathBuf,

        /// Ranking service base URL
        #[arg(long)]
        url: String,

        /// Source id (defaults to the document's preview config)
        #[arg(long)]
        source: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig, EaselError> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(size) = cli.grid_size {
        config.grid_size = size;
    }
    if cli.no_grid {
        config.grid_enabled = false;
    }
    if cli.no_element_snap {
        config.element_snap_enabled = false;
    }
    Ok(config.validated())
}

fn read_document(path: &Path) -> Result<CanvasDocument, EaselError> {
    let text = std::fs::read_to_string(path)?;
    Ok(CanvasDocument::from_json(&text)?)
}

fn read_records(path: &Path) -> Result<Vec<Record>, EaselError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn report(edit: &Edit) {
    for failure in &edit.failures {
        warn!(series_id = %failure.series_id, error = %failure.error, "series skipped");
    }
}

fn run() -> Result<(), EaselError> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let ctx = EditContext {
        snap: config.snap_options(),
        grid_columns: config.grid_columns,
    };

    match cli.command {
        Commands::Normalize { file } => {
            let doc = read_document(&file)?;
            println!("{}", doc.to_json_pretty()?);
        }

        Commands::Generate {
            document,
            records,
            series,
        } => {
            let doc = read_document(&document)?;
            let records = read_records(&records)?;
            let edit = match series {
                Some(id) => {
                    let spec = doc
                        .series(&id)
                        .cloned()
                        .ok_or(EditError::SeriesNotFound(id))?;
                    doc.upsert_series(spec, &records, &ctx)
                }
                None => doc.apply_records(&records, &ctx),
            };
            report(&edit);
            info!(elements = edit.document.elements.len(), "series regenerated");
            println!("{}", edit.document.to_json_pretty()?);
        }

        Commands::Snap {
            document,
            element,
            x,
            y,
        } => {
            let doc = read_document(&document)?;
            let mut target = doc
                .element(&element)
                .cloned()
                .ok_or(EditError::ElementNotFound(element))?;
            target.x = x;
            target.y = y;
            let result = snap(&target, &doc.elements, &ctx.snap);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Preview {
            document,
            url,
            source,
        } => {
            let doc = read_document(&document)?;
            let source = source
                .or_else(|| doc.preview_config.source_id.clone())
                .ok_or_else(|| EaselError::Config("no preview source id".to_string()))?;
            let provider = HttpProvider::new(&url)?;

            let runtime = tokio::runtime::Runtime::new()?;
            let mut records = runtime.block_on(provider.fetch_ranked(
                &source,
                doc.preview_config.sort_by,
                doc.preview_config.sort_order,
            ))?;
            if let Some(max) = doc.preview_config.max_records {
                records.truncate(max as usize);
            }
            info!(source = %source, records = records.len(), "fetched preview records");

            let edit = doc.apply_records(&records, &ctx);
            report(&edit);
            println!("{}", edit.document.to_json_pretty()?);
        }
    }

    Ok(())
}
