//! Per-entry outcomes, job progress and the final report.

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Extracting,
    Processing,
    Complete,
    /// Stopped early by a cancellation request; outcomes recorded so far are kept.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Uploaded,
    Skipped,
    NoMatch,
    Error,
}

/// Why an entry ended up `Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The filename does not follow the thumbnail naming convention.
    PatternMismatch,
    /// Preview run: a record matched but nothing was uploaded.
    DryRun,
}

/// The recorded result of one archive entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub part_number: String,
    pub filename: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn pattern_mismatch(filename: &str) -> Self {
        Self {
            part_number: String::new(),
            filename: filename.to_string(),
            status: OutcomeStatus::Skipped,
            reason: Some(SkipReason::PatternMismatch),
            record_id: None,
            error: None,
        }
    }

    pub fn no_match(part_number: &str, filename: &str) -> Self {
        Self {
            part_number: part_number.to_string(),
            filename: filename.to_string(),
            status: OutcomeStatus::NoMatch,
            reason: None,
            record_id: None,
            error: None,
        }
    }

    pub fn preview_match(part_number: &str, filename: &str, record_id: &str) -> Self {
        Self {
            part_number: part_number.to_string(),
            filename: filename.to_string(),
            status: OutcomeStatus::Skipped,
            reason: Some(SkipReason::DryRun),
            record_id: Some(record_id.to_string()),
            error: None,
        }
    }

    pub fn uploaded(part_number: &str, filename: &str, record_id: &str) -> Self {
        Self {
            part_number: part_number.to_string(),
            filename: filename.to_string(),
            status: OutcomeStatus::Uploaded,
            reason: None,
            record_id: Some(record_id.to_string()),
            error: None,
        }
    }

    pub fn failed(
        part_number: &str,
        filename: &str,
        record_id: Option<&str>,
        error: impl ToString,
    ) -> Self {
        Self {
            part_number: part_number.to_string(),
            filename: filename.to_string(),
            status: OutcomeStatus::Error,
            reason: None,
            record_id: record_id.map(str::to_string),
            error: Some(error.to_string()),
        }
    }
}

/// Live counters for one job, handed to the progress callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressState {
    pub total: usize,
    pub processed: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub errors: usize,
    pub no_match: usize,
    pub current_file: Option<String>,
    pub phase: Phase,
}

impl ProgressState {
    fn new() -> Self {
        Self {
            total: 0,
            processed: 0,
            uploaded: 0,
            skipped: 0,
            errors: 0,
            no_match: 0,
            current_file: None,
            phase: Phase::Extracting,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub errors: usize,
    pub no_match: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub outcomes: Vec<UploadOutcome>,
    pub summary: Summary,
    pub cancelled: bool,
}

/// Append-only outcome log plus the counters derived from it.
pub struct ProgressTracker<F: FnMut(&ProgressState)> {
    state: ProgressState,
    outcomes: Vec<UploadOutcome>,
    on_progress: F,
}

impl<F: FnMut(&ProgressState)> ProgressTracker<F> {
    pub fn new(on_progress: F) -> Self {
        Self {
            state: ProgressState::new(),
            outcomes: Vec::new(),
            on_progress,
        }
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    fn emit(&mut self) {
        (self.on_progress)(&self.state);
    }

    pub fn extracting(&mut self) {
        self.state.phase = Phase::Extracting;
        self.emit();
    }

    pub fn processing(&mut self, total: usize) {
        self.state.total = total;
        self.state.phase = Phase::Processing;
        self.emit();
    }

    pub fn begin_entry(&mut self, filename: &str) {
        self.state.current_file = Some(filename.to_string());
    }

    pub fn record(&mut self, outcome: UploadOutcome) {
        match outcome.status {
            OutcomeStatus::Uploaded => self.state.uploaded += 1,
            OutcomeStatus::Skipped => self.state.skipped += 1,
            OutcomeStatus::NoMatch => self.state.no_match += 1,
            OutcomeStatus::Error => self.state.errors += 1,
        }
        self.state.processed += 1;
        debug_assert!(self.state.processed <= self.state.total);
        self.outcomes.push(outcome);
        self.emit();
    }

    /// Enter the terminal phase, emit it once and produce the report.
    pub fn finish(mut self, run_id: Uuid, cancelled: bool) -> PipelineReport {
        self.state.phase = if cancelled {
            Phase::Cancelled
        } else {
            Phase::Complete
        };
        self.state.current_file = None;
        self.emit();

        let summary = Summary {
            total: self.state.total,
            uploaded: self.state.uploaded,
            skipped: self.state.skipped,
            errors: self.state.errors,
            no_match: self.state.no_match,
        };
        PipelineReport {
            run_id,
            outcomes: self.outcomes,
            summary,
            cancelled,
        }
    }
}
