//! CLI entry point for the fax list ingestion pipeline.

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use faxcast_ingest::mapping::HeaderField;
use faxcast_ingest::{
    BlockListInfo, BlockListStage, ClosureJobReporter, IngestConfig, IngestError, IngestSession,
    JobEvent, JobEventKind, JobRegistry, LedgerSummary, ListInfo, MappingField, TabularFile,
    classify, classify_block_list, estimate_record_count, extract_headers,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Fax broadcast recipient list ingestion",
    long_about = "Reads recipient and block lists (csv, txt, xls, xlsx), detects the fax \
                  and \"to\" columns, and reports the reconciled totals.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  FAXCAST_MAX_FILE_SIZE_BYTES   Upload limit (default 10 MiB)\n  \
                  FAXCAST_BATCH_SIZE            Records per batch (default 1000)\n  \
                  FAXCAST_BATCH_PAUSE_MS        Pause between batches (default 100)\n  \
                  FAXCAST_TOLL_FREE_BASELINE    Toll-free opt-out count\n  \
                  FAXCAST_STORED_BASELINE       Stored block count\n\n\
                  EXAMPLES:\n  \
                  # Show the header row\n  \
                  faxcast-ingest headers clinics.csv\n\n  \
                  # Show the detected mapping\n  \
                  faxcast-ingest inspect clinics.xlsx\n\n  \
                  # Ingest two lists and a block list\n  \
                  faxcast-ingest ingest -l clinics.csv -l labs.xlsx -b optout.csv"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info", global = true)]
    log_level: String,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output JSON to stdout instead of a human-readable summary
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header row of a file
    Headers { file: PathBuf },

    /// Print headers, estimated record count and the detected mapping
    Inspect { file: PathBuf },

    /// Ingest recipient lists and block lists and print the totals
    Ingest {
        /// Recipient list (repeatable)
        #[arg(short, long = "list", required = true)]
        lists: Vec<PathBuf>,

        /// Block list (repeatable)
        #[arg(short, long = "block-list")]
        block_lists: Vec<PathBuf>,

        /// Fax column to use instead of the detected one
        #[arg(long)]
        fax_column: Option<String>,

        /// "To" column to use instead of the detected one
        #[arg(long)]
        to_column: Option<String>,

        /// Fax column for block lists whose column is not detected
        #[arg(long)]
        block_fax_column: Option<String>,

        /// Mark the recipient lists as containing international numbers
        #[arg(long)]
        international: bool,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is disabled so stdout only carries JSON.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.quiet, args.json);

    // Load environment variables from .env file
    dotenv().ok();
    let config = IngestConfig::from_env()?;
    debug!("Using configuration: {:?}", config);

    match &args.command {
        Command::Headers { file } => run_headers(file, args.json),
        Command::Inspect { file } => run_inspect(file, args.json),
        Command::Ingest {
            lists,
            block_lists,
            fax_column,
            to_column,
            block_fax_column,
            international,
        } => {
            let options = IngestOptions {
                fax_column: fax_column.as_deref(),
                to_column: to_column.as_deref(),
                block_fax_column: block_fax_column.as_deref(),
                international: *international,
            };
            run_ingest(config, lists, block_lists, options, args.json).await
        }
    }
}

fn load(path: &Path) -> Result<TabularFile> {
    if !path.exists() {
        return Err(anyhow!("Input file not found: {}", path.display()));
    }
    Ok(TabularFile::from_path(path)?)
}

fn run_headers(path: &Path, json: bool) -> Result<()> {
    let file = load(path)?;
    let headers = extract_headers(&file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&headers)?);
        return Ok(());
    }
    for (idx, header) in headers.iter().enumerate() {
        println!("{:>3}  {}", idx, display_header(header));
    }
    Ok(())
}

#[derive(Serialize)]
struct InspectReport {
    file_name: String,
    headers: Vec<String>,
    estimated_records: usize,
    fax_number: Option<String>,
    to_header: Option<String>,
    block_list_fax_column: Option<String>,
}

/// Uses `println!` for the report itself; logging stays on stderr.
fn run_inspect(path: &Path, json: bool) -> Result<()> {
    let file = load(path)?;
    let headers = extract_headers(&file)?;
    let estimated_records = estimate_record_count(&file)?;
    let mapping = classify(&headers);
    let block_column = classify_block_list(&headers);

    if json {
        let report = InspectReport {
            file_name: file.file_name().to_string(),
            headers: headers.as_slice().to_vec(),
            estimated_records,
            fax_number: mapping.has_fax_number().then(|| mapping.fax_number.clone()),
            to_header: mapping.to_header.clone(),
            block_list_fax_column: block_column,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n{}", "=".repeat(60));
    println!("{}", file.file_name());
    println!("{}\n", "=".repeat(60));
    println!("  Estimated records: {}", estimated_records);
    println!();
    println!("{:<4} {:<32} {:<14} {:<14}", "#", "Header", "Fax pattern", "To pattern");
    println!("{}", "-".repeat(60));
    for (idx, header) in headers.iter().enumerate() {
        println!(
            "{:<4} {:<32} {:<14} {:<14}",
            idx,
            truncate_str(&display_header(header), 31),
            HeaderField::FaxNumber.matching_pattern(header).unwrap_or("-"),
            HeaderField::ToHeader.matching_pattern(header).unwrap_or("-"),
        );
    }
    println!();
    println!(
        "  Fax number column:  {}",
        if mapping.has_fax_number() {
            mapping.fax_number.as_str()
        } else {
            "(not detected)"
        }
    );
    println!(
        "  To header column:   {}",
        mapping.to_header.as_deref().unwrap_or("(not detected)")
    );
    println!(
        "  As a block list:    {}",
        block_column.as_deref().unwrap_or("(needs mapping)")
    );
    Ok(())
}

struct IngestOptions<'a> {
    fax_column: Option<&'a str>,
    to_column: Option<&'a str>,
    block_fax_column: Option<&'a str>,
    international: bool,
}

#[derive(Serialize)]
struct Failure {
    file: String,
    error: IngestError,
}

#[derive(Serialize)]
struct IngestReport {
    lists: Vec<ListInfo>,
    block_lists: Vec<BlockListInfo>,
    summary: LedgerSummary,
    failures: Vec<Failure>,
}

async fn run_ingest(
    config: IngestConfig,
    lists: &[PathBuf],
    block_lists: &[PathBuf],
    options: IngestOptions<'_>,
    json: bool,
) -> Result<()> {
    let registry = JobRegistry::new();
    registry.add_reporter(Arc::new(ClosureJobReporter::new(|event: &JobEvent| {
        log_job_event(event)
    })));
    let session = IngestSession::new(config, registry);
    let mut failures = Vec::new();

    for path in lists {
        if let Err(e) = ingest_recipient_list(&session, path, &options).await {
            report_failure(path, &e);
            failures.push(Failure {
                file: path.display().to_string(),
                error: e,
            });
        }
    }

    for path in block_lists {
        if let Err(e) = ingest_block_list(&session, path, &options).await {
            report_failure(path, &e);
            failures.push(Failure {
                file: path.display().to_string(),
                error: e,
            });
        }
    }

    let report = IngestReport {
        lists: session.lists(),
        block_lists: session.block_lists(),
        summary: session.summary(),
        failures,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    if report.failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("{} file(s) could not be ingested", report.failures.len()))
    }
}

async fn ingest_recipient_list(
    session: &IngestSession,
    path: &Path,
    options: &IngestOptions<'_>,
) -> faxcast_ingest::IngestResult<()> {
    let staged = session.stage_recipient_list(TabularFile::from_path(path)?)?;
    let mut form = staged.form.clone();
    if let Some(column) = options.fax_column {
        form.set_column(MappingField::FaxNumber, Some(column))?;
    }
    if let Some(column) = options.to_column {
        form.set_column(MappingField::ToHeader, Some(column))?;
    }
    form.toggle_international(options.international);

    let list = session.confirm_recipient_list(&staged.id, &form)?.wait().await?;
    info!(
        "Accepted '{}' with {} recipients",
        list.file_name, list.recipient_count
    );
    Ok(())
}

async fn ingest_block_list(
    session: &IngestSession,
    path: &Path,
    options: &IngestOptions<'_>,
) -> faxcast_ingest::IngestResult<()> {
    let job = match session.stage_block_list(TabularFile::from_path(path)?)? {
        BlockListStage::AutoMapped(job) => job,
        BlockListStage::NeedsMapping(staged) => {
            let mut form = staged.form.clone();
            form.set_fax_column(options.block_fax_column)?;
            session.confirm_block_list(&staged.id, &form)?
        }
    };

    let info = job.wait().await?;
    info!(
        "Accepted block list '{}' with {} numbers",
        info.file_name, info.number_count
    );
    Ok(())
}

fn log_job_event(event: &JobEvent) {
    let job = &event.job;
    match event.kind {
        JobEventKind::Progress => debug!(
            "[{:>3}%] {}: {}/{} records",
            job.progress,
            job.file_name,
            job.processed_records.unwrap_or(0),
            job.total_records.unwrap_or(0)
        ),
        JobEventKind::Failed => error!(
            "{} failed: {}",
            job.file_name,
            job.error.as_deref().unwrap_or("unknown error")
        ),
        kind => debug!("Job {} ({}): {:?}", job.id, job.file_name, kind),
    }
}

fn report_failure(path: &Path, err: &IngestError) {
    if err.is_warning() {
        warn!("Skipped {}: {}", path.display(), err);
    } else {
        error!("Failed to ingest {}: {}", path.display(), err);
    }
}

fn print_summary(report: &IngestReport) {
    println!("\n{}", "=".repeat(60));
    println!("INGEST SUMMARY");
    println!("{}\n", "=".repeat(60));

    println!("RECIPIENT LISTS");
    println!("{}", "-".repeat(40));
    for list in &report.lists {
        println!(
            "  {:<32} {:>8} recipients  (fax: {})",
            truncate_str(&list.file_name, 31),
            list.recipient_count,
            list.mapping.fax_number
        );
    }
    println!();

    if !report.block_lists.is_empty() {
        println!("BLOCK LISTS");
        println!("{}", "-".repeat(40));
        for list in &report.block_lists {
            println!(
                "  {:<32} {:>8} numbers",
                truncate_str(&list.file_name, 31),
                list.number_count
            );
        }
        println!();
    }

    let summary = &report.summary;
    println!("TOTALS");
    println!("{}", "-".repeat(40));
    println!("  Recipients:        {}", summary.total_recipients);
    println!("  International:     {}", if summary.has_international { "yes" } else { "no" });
    println!("  Toll-free blocked: {}", summary.toll_free_blocked);
    println!("  Stored blocked:    {}", summary.stored_blocked);
    println!("  Total blocked:     {}", summary.total_blocked);

    if !report.failures.is_empty() {
        println!();
        println!("FAILURES");
        println!("{}", "-".repeat(40));
        for failure in &report.failures {
            println!("  {}: {}", failure.file, failure.error);
        }
    }
}

fn display_header(header: &str) -> String {
    if header.is_empty() {
        "(empty)".to_string()
    } else {
        header.to_string()
    }
}

fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
