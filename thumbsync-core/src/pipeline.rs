//! High-level pipeline: orchestrates archive → filename match → record lookup → upload.
//!
//! This module provides the top-level orchestration for pushing CAD export thumbnails into a
//! remote table. For one archive it:
//!   - Lists the archive and keeps candidate images (see [`crate::archive::filter_entries`])
//!   - Resolves the thumbnail field id once, before the first entry
//!   - For each candidate, in archive order: parses the filename, looks up the record by part
//!     number, then uploads the image (or only reports the match in dry-run mode)
//!   - Aggregates one [`UploadOutcome`] per candidate and reports progress after each one
//!
//! # Error Handling
//! Only an unreadable archive and an unusable table schema abort a run ([`PipelineError`]).
//! Everything that goes wrong for a single entry is recorded as an outcome and the run continues.
//!
//! # Cancellation
//! A [`CancellationToken`] is checked before each entry and before every remote call, and it
//! interrupts rate-limit and retry waits. The entry in progress is dropped; the run returns the
//! outcomes recorded so far with `cancelled = true`.
//!
//! # Navigation
//! - Main entrypoints: [`Pipeline::run_bytes`], [`Pipeline::run`]
//! - Supporting types: [`PipelineConfig`], [`PipelineReport`], [`ProgressState`].

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::archive::{filter_entries, ArchiveEntry, ArchiveError, ArchiveReader, ZipImageArchive};
use crate::config::PipelineConfig;
use crate::contract::{RecordStore, StoreError};
use crate::filename::parse_filename;
use crate::matcher::RecordMatcher;
use crate::progress::{PipelineReport, ProgressState, ProgressTracker, UploadOutcome};
use crate::schema::FieldSchemaResolver;
use crate::throttle::RateLimiter;
use crate::uploader::AttachmentUploader;

/// Failures that abort a whole run before any outcome is produced.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("record store error: {0}")]
    Store(#[source] StoreError),
}

/// A thumbnail upload job runner bound to one store client and one target table.
///
/// Holds no per-run state apart from the memoized field id, so one instance can run many archives.
pub struct Pipeline<S: RecordStore> {
    store: S,
    config: PipelineConfig,
    limiter: RateLimiter,
    schema: FieldSchemaResolver,
    cancel: CancellationToken,
}

impl<S: RecordStore> Pipeline<S> {
    pub fn new(store: S, config: PipelineConfig) -> Self {
        let limiter = RateLimiter::new(config.min_call_interval);
        Self {
            store,
            config,
            limiter,
            schema: FieldSchemaResolver::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Open a zip archive held in memory and run it.
    pub async fn run_bytes<F>(
        &self,
        archive_bytes: Vec<u8>,
        on_progress: F,
    ) -> Result<PipelineReport, PipelineError>
    where
        F: FnMut(&ProgressState),
    {
        let mut archive = ZipImageArchive::from_bytes(archive_bytes).map_err(|e| {
            warn!(error = %e, "Archive could not be opened");
            PipelineError::from(e)
        })?;
        self.run(&mut archive, on_progress).await
    }

    /// Process every candidate entry of `archive`, strictly one after another.
    pub async fn run<A, F>(
        &self,
        archive: &mut A,
        on_progress: F,
    ) -> Result<PipelineReport, PipelineError>
    where
        A: ArchiveReader,
        F: FnMut(&ProgressState),
    {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "pipeline_run",
            %run_id,
            table = %self.config.table,
            dry_run = self.config.dry_run
        );
        self.run_inner(run_id, archive, on_progress)
            .instrument(span)
            .await
    }

    async fn run_inner<A, F>(
        &self,
        run_id: Uuid,
        archive: &mut A,
        on_progress: F,
    ) -> Result<PipelineReport, PipelineError>
    where
        A: ArchiveReader,
        F: FnMut(&ProgressState),
    {
        let mut tracker = ProgressTracker::new(on_progress);
        tracker.extracting();

        let candidates = filter_entries(archive.entries());
        info!(
            entries = archive.entries().len(),
            candidates = candidates.len(),
            "Archive listed"
        );

        // Resolved lazily: an archive without candidates never touches the schema.
        let field_id = if candidates.is_empty() {
            String::new()
        } else {
            let resolved = self
                .schema
                .resolve(
                    &self.store,
                    &self.limiter,
                    &self.config.retry,
                    &self.cancel,
                    &self.config.table,
                    &self.config.thumbnail_field,
                )
                .await;
            match resolved {
                Ok(field_id) => field_id,
                Err(PipelineError::Store(StoreError::Cancelled)) => {
                    warn!("Run cancelled while resolving the thumbnail field");
                    let report = tracker.finish(run_id, true);
                    return Ok(report);
                }
                Err(e) => return Err(e),
            }
        };

        tracker.processing(candidates.len());

        let mut cancelled = false;
        for entry in &candidates {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            tracker.begin_entry(entry.file_name());
            match self.process_entry(archive, entry, &field_id).await {
                Some(outcome) => tracker.record(outcome),
                None => {
                    cancelled = true;
                    break;
                }
            }
        }

        if cancelled {
            warn!(
                processed = tracker.state().processed,
                total = tracker.state().total,
                "Run cancelled, keeping outcomes recorded so far"
            );
        }
        let report = tracker.finish(run_id, cancelled);
        info!(summary = ?report.summary, cancelled, "Run finished");
        Ok(report)
    }

    /// Resolve one entry to an outcome. `None` means the run was cancelled before the entry
    /// could be settled.
    async fn process_entry<A: ArchiveReader>(
        &self,
        archive: &mut A,
        entry: &ArchiveEntry,
        field_id: &str,
    ) -> Option<UploadOutcome> {
        let filename = entry.file_name();
        let Some(parsed) = parse_filename(filename) else {
            info!(filename, "Filename does not follow the thumbnail convention, skipping");
            return Some(UploadOutcome::pattern_mismatch(filename));
        };
        let part_number = parsed.part_number.as_str();

        let matcher = RecordMatcher::new(
            &self.store,
            &self.limiter,
            &self.config.retry,
            &self.cancel,
        );
        let record = match matcher
            .find_by_key(&self.config.table, &self.config.key_field, part_number)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!(filename, part_number, "No record with this part number");
                return Some(UploadOutcome::no_match(part_number, filename));
            }
            Err(StoreError::Cancelled) => return None,
            Err(e) => {
                warn!(filename, part_number, error = %e, "Record lookup failed");
                return Some(UploadOutcome::failed(part_number, filename, None, e));
            }
        };

        if self.config.dry_run {
            info!(filename, part_number, record_id = %record.id, "Dry run: matched, not uploading");
            return Some(UploadOutcome::preview_match(
                part_number,
                filename,
                &record.id,
            ));
        }

        let bytes = match archive.read_entry(entry, self.config.max_entry_bytes) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(filename, error = %e, "Could not extract entry");
                return Some(UploadOutcome::failed(
                    part_number,
                    filename,
                    Some(&record.id),
                    e,
                ));
            }
        };

        let uploader = AttachmentUploader::new(
            &self.store,
            &self.limiter,
            &self.config.retry,
            &self.cancel,
        );
        match uploader.upload(&record.id, field_id, bytes, filename).await {
            Ok(_) => Some(UploadOutcome::uploaded(part_number, filename, &record.id)),
            Err(StoreError::Cancelled) => {
                info!(filename, record_id = %record.id, "Upload abandoned, run cancelled");
                None
            }
            Err(e) => {
                warn!(filename, record_id = %record.id, error = %e, "Upload failed");
                Some(UploadOutcome::failed(
                    part_number,
                    filename,
                    Some(&record.id),
                    e,
                ))
            }
        }
    }
}
