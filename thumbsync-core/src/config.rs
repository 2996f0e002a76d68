use std::time::Duration;

use tracing::{debug, info};

use crate::archive::DEFAULT_MAX_ENTRY_BYTES;
use crate::throttle::{RetryPolicy, DEFAULT_MIN_CALL_INTERVAL};

/// Everything one pipeline run needs to know about its target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Table name or id in the remote base.
    pub table: String,
    /// Field whose value equals the part number parsed from a filename.
    pub key_field: String,
    /// Attachment field receiving the thumbnails.
    pub thumbnail_field: String,
    pub dry_run: bool,
    pub min_call_interval: Duration,
    pub retry: RetryPolicy,
    /// Entries decompressing to more than this are recorded as errors without being uploaded.
    pub max_entry_bytes: u64,
}

impl PipelineConfig {
    pub fn new(
        table: impl Into<String>,
        key_field: impl Into<String>,
        thumbnail_field: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            key_field: key_field.into(),
            thumbnail_field: thumbnail_field.into(),
            dry_run: false,
            min_call_interval: DEFAULT_MIN_CALL_INTERVAL,
            retry: RetryPolicy::default(),
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            table = %self.table,
            key_field = %self.key_field,
            thumbnail_field = %self.thumbnail_field,
            dry_run = self.dry_run,
            min_call_interval_ms = self.min_call_interval.as_millis() as u64,
            max_retries = self.retry.max_retries,
            max_entry_bytes = self.max_entry_bytes,
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}
