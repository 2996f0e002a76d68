//! # contract: the remote record store as seen by the pipeline
//!
//! This module defines a single trait ([`RecordStore`]) and the plain data types that flow
//! across it. A record store is a spreadsheet-like remote database: tables of records, each
//! record a map of named fields, some of which hold binary attachments.
//!
//! ## Interface & Extensibility
//! - Implement [`RecordStore`] to connect the pipeline to a concrete backend (HTTP API, test double).
//! - All methods are async and return [`StoreError`], whose variants tell the retry layer what
//!   is worth retrying.
//! - Authentication is the implementor's concern: the pipeline only ever sees an already
//!   authenticated client.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall` so consumers can generate deterministic mocks for unit/integration tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// A record as returned by the remote store. The pipeline only reads `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    #[serde(default)]
    pub fields: HashMap<String, serde_json::Value>,
}

impl RemoteRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: HashMap::new(),
        }
    }
}

/// One column of a remote table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableField {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
}

/// Raw bytes and metadata for a single attachment upload.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// What the store reports back about a stored attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentMetadata {
    pub id: Option<String>,
    pub url: Option<String>,
    pub filename: String,
    pub size: Option<u64>,
    pub content_type: String,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("remote rate limit exceeded")]
    RateLimited,
    #[error("remote server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("not authorized for this base or table")]
    Unauthorized,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("cancelled before the call completed")]
    Cancelled,
}

impl StoreError {
    /// Rate limiting, server-side failures and transport hiccups may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::RateLimited | StoreError::Server { .. } | StoreError::Transport(_)
        )
    }
}

/// Trait for querying records and attaching files in a remote table.
///
/// Implementors own the transport and the bearer token lifecycle. `table` is whatever the
/// backend accepts as a table reference (name or id).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Return at most `max_records` records matching a server-side filter formula,
    /// in the order the store returns them.
    async fn query_records(
        &self,
        table: &str,
        filter_formula: &str,
        max_records: usize,
    ) -> Result<Vec<RemoteRecord>, StoreError>;

    /// Return the field schema of one table.
    async fn table_fields(&self, table: &str) -> Result<Vec<TableField>, StoreError>;

    /// Attach `upload` to the attachment field `field_id` of record `record_id`.
    async fn upload_attachment(
        &self,
        record_id: &str,
        field_id: &str,
        upload: &AttachmentUpload,
    ) -> Result<AttachmentMetadata, StoreError>;
}
