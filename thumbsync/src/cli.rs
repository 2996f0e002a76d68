///
/// This module implements the CLI interface for thumbsync: command parsing, the async entrypoint
/// and the user-visible output.
///
/// All matching and upload logic lives in the [`thumbsync-core`] crate. This module wires the
/// loaded config, the Airtable client and the pipeline together.
///
/// ## Commands
/// - `upload`: match thumbnails of an export archive to records and upload them (or preview with `--dry-run`)
/// - `inspect`: offline listing of candidate thumbnails and how their names parse
///
/// [`thumbsync-core`]: ../../thumbsync-core/
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use thumbsync_core::archive::{filter_entries, ArchiveReader, ZipImageArchive};
use thumbsync_core::filename::parse_filename;
use thumbsync_core::{Pipeline, PipelineReport, ProgressState};
use tokio_util::sync::CancellationToken;

use crate::load_config::load_config;
use crate::upload::AirtableClient;

/// CLI for thumbsync: attach CAD export thumbnails to table records by part number.
#[derive(Parser)]
#[clap(
    name = "thumbsync",
    version,
    about = "Attach CAD export thumbnails to Airtable records matched by part number"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Match thumbnails in an export archive to records and upload them
    Upload {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Zip archive exported from the CAD system
        #[clap(long)]
        archive: PathBuf,
        /// Look up matches but upload nothing
        #[clap(long)]
        dry_run: bool,
        /// Write the full per-file report as JSON to this path
        #[clap(long)]
        report: Option<PathBuf>,
    },
    /// List candidate thumbnails in an archive and their parsed part numbers (no network)
    Inspect {
        /// Zip archive exported from the CAD system
        #[clap(long)]
        archive: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Upload {
            config,
            archive,
            dry_run,
            report,
        } => upload(&config, &archive, dry_run, report.as_deref()).await,
        Commands::Inspect { archive } => inspect(&archive),
    }
}

fn read_archive(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read archive {}", path.display()))
}

async fn upload(
    config_path: &Path,
    archive_path: &Path,
    dry_run: bool,
    report_path: Option<&Path>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if dry_run {
        config.pipeline.dry_run = true;
    }
    config.pipeline.trace_loaded();

    let bytes = read_archive(archive_path)?;
    let client = AirtableClient::new(&config.airtable)?;

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling the run");
                cancel.cancel();
            }
        })
    };

    tracing::info!(
        command = "upload",
        archive = %archive_path.display(),
        "Starting thumbnail upload"
    );
    let pipeline = Pipeline::new(client, config.pipeline).with_cancellation(cancel);
    let result = pipeline.run_bytes(bytes, log_progress).await;
    interrupt.abort();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(command = "upload", error = %e, "Upload run failed");
            return Err(anyhow::Error::new(e).context("Upload run failed"));
        }
    };
    tracing::info!(command = "upload", summary = ?report.summary, "Upload run finished");

    print_report(&report, pipeline.config().dry_run);
    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn log_progress(state: &ProgressState) {
    tracing::info!(
        phase = ?state.phase,
        processed = state.processed,
        total = state.total,
        uploaded = state.uploaded,
        skipped = state.skipped,
        no_match = state.no_match,
        errors = state.errors,
        current_file = state.current_file.as_deref().unwrap_or(""),
        "Progress"
    );
}

fn print_report(report: &PipelineReport, dry_run: bool) {
    let heading = match (report.cancelled, dry_run) {
        (true, _) => "Upload cancelled.",
        (false, true) => "Dry run complete.",
        (false, false) => "Upload complete.",
    };
    println!("{heading}");
    for outcome in &report.outcomes {
        let status = serde_json::to_value(outcome.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        println!(
            "  {:<40} {:<16} {:<9} {}",
            outcome.filename,
            outcome.part_number,
            status,
            outcome
                .error
                .as_deref()
                .or(outcome.record_id.as_deref())
                .unwrap_or("")
        );
    }
    let s = &report.summary;
    println!(
        "Total: {}  uploaded: {}  skipped: {}  no match: {}  errors: {}",
        s.total, s.uploaded, s.skipped, s.no_match, s.errors
    );
}

fn inspect(archive_path: &Path) -> Result<()> {
    let archive = ZipImageArchive::from_bytes(read_archive(archive_path)?)
        .with_context(|| format!("Failed to open archive {}", archive_path.display()))?;
    let candidates = filter_entries(archive.entries());
    tracing::info!(
        command = "inspect",
        entries = archive.entries().len(),
        candidates = candidates.len(),
        "Archive inspected"
    );

    println!(
        "{} candidate thumbnail(s) out of {} entries",
        candidates.len(),
        archive.entries().len()
    );
    for entry in &candidates {
        match parse_filename(entry.file_name()) {
            Some(parsed) => println!(
                "  {:<48} part {:<16} item {}",
                entry.path, parsed.part_number, parsed.item_name
            ),
            None => println!("  {:<48} pattern mismatch", entry.path),
        }
    }
    Ok(())
}
