// src/main.rs
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use fs_extractor::dart::{enhance_with_remote, OpenDartClient};
use fs_extractor::document::{load_archive, load_markup};
use fs_extractor::storage::{JsonFileStore, StatementStore};
use fs_extractor::utils::error::ExtractError;
use fs_extractor::utils::{self, html_debug, AppError, EngineConfig};
use fs_extractor::{ConsolidationType, DocumentMetadata, ExtractionRequest, Pipeline, RunContext};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Consolidation {
    /// Separate first, consolidated if nothing resolves
    Auto,
    Separate,
    Consolidated,
}

/// Command Line Interface for the DART financial statement extractor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Filing archive (.zip) or a bare markup document
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Filer (stock) code of the company
    #[arg(short, long)]
    filer_code: String,

    /// Receipt id of the filing (defaults to the file stem)
    #[arg(short, long)]
    receipt_id: Option<String>,

    /// Report title, e.g. "사업보고서 (2023.12)"
    #[arg(long)]
    title: Option<String>,

    /// Submission date (YYYY-MM-DD)
    #[arg(long)]
    submitted: Option<NaiveDate>,

    /// Fiscal year to extract (defaults to the document's current year)
    #[arg(short, long)]
    year: Option<i32>,

    #[arg(short, long, value_enum, default_value = "auto")]
    consolidation: Consolidation,

    /// Preferred document-type code inside the archive
    #[arg(long)]
    type_code: Option<String>,

    /// Account dictionary JSON (defaults to the built-in one)
    #[arg(long)]
    dictionary: Option<PathBuf>,

    /// Company list JSON mapping filer codes to registry codes
    #[arg(long)]
    companies: Option<PathBuf>,

    /// Engine configuration JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Upsert the record into this store directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Query the remote key-accounts API when nothing is extracted locally
    #[arg(long)]
    remote: bool,

    /// Minimum byte size of a statement table in audit-report documents
    #[arg(long)]
    min_table_bytes: Option<usize>,

    /// Debug mode - save the document with located statements highlighted
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments
    let args = Args::parse();
    tracing::info!("Starting processing for args: {:?}", args);

    // 3. Configuration: file, then env, then flags
    let mut config = EngineConfig::load(args.config.as_deref())?;
    if let Some(size) = args.min_table_bytes {
        tracing::debug!("Setting min_table_bytes to {} from command-line argument", size);
        config.min_table_bytes = size;
    }
    let ctx = RunContext::load(args.dictionary.as_deref(), args.companies.as_deref(), config)?;

    // 4. Load the document
    let bytes = std::fs::read(&args.input)?;
    let receipt_id = args.receipt_id.clone().unwrap_or_else(|| {
        args.input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let metadata = DocumentMetadata {
        filer_code: args.filer_code.clone(),
        receipt_id,
        report_title: args.title.clone(),
        submission_date: args.submitted,
        type_code_hint: args.type_code.clone(),
    };
    let is_archive = bytes.starts_with(b"PK\x03\x04");
    let doc = if is_archive {
        load_archive(&bytes, metadata, &ctx.config)
    } else {
        load_markup(&bytes, metadata, &ctx.config)
    }
    .map_err(ExtractError::Load)?;
    tracing::info!("Loaded {} ({} bytes, {})", doc.entry_name, doc.raw_bytes.len(), doc.encoding);

    // 5. Extract
    let pipeline = Pipeline::new(&ctx);
    let mut record = match args.consolidation {
        Consolidation::Auto => pipeline.extract_preferred(&doc, args.year)?,
        Consolidation::Separate => {
            pipeline.extract_document(&doc, &ExtractionRequest::new(args.year, ConsolidationType::Separate))?
        }
        Consolidation::Consolidated => {
            pipeline.extract_document(&doc, &ExtractionRequest::new(args.year, ConsolidationType::Consolidated))?
        }
    };

    if args.debug {
        let debug_dir = args.output_dir.clone().unwrap_or_else(|| PathBuf::from("./output")).join("debug");
        std::fs::create_dir_all(&debug_dir)?;
        let debug_path = debug_dir.join(format!("{}_annotated.html", doc.metadata.receipt_id));
        let sections = pipeline.locate_sections(&doc, record.consolidation);
        if let Err(e) = html_debug::save_debug_html(&doc.text, &debug_path, &sections) {
            tracing::warn!("Failed to create debug HTML: {}", e);
        }
    }

    // 6. Remote fallback
    if args.remote && record.is_empty() {
        match OpenDartClient::new(&ctx.config) {
            Ok(client) => {
                enhance_with_remote(&mut record, &client, &ctx).await;
            }
            Err(e) => tracing::warn!("Remote fallback disabled: {}", e),
        }
    }

    // 7. Persist and print
    if let Some(dir) = &args.output_dir {
        let store = JsonFileStore::new(dir)?;
        let outcome = store.upsert(&record)?;
        tracing::info!("Stored record at {}", outcome.path.display());
    }

    let json = serde_json::to_string_pretty(&record)
        .map_err(|e| AppError::Config(format!("Failed to serialize record: {}", e)))?;
    println!("{}", json);

    tracing::info!(
        "Processing finished: {} fields, {} diagnostics",
        record.fields.len(),
        record.diagnostics.len()
    );
    Ok(())
}
