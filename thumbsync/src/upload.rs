//! # Airtable client: implementation of the core `RecordStore` contract
//!
//! Bridges the [`RecordStore`] trait of `thumbsync-core` to the Airtable REST API:
//!
//! - record queries: `GET {api_url}/v0/{base}/{table}?filterByFormula=…`
//! - table schema: `GET {api_url}/v0/meta/bases/{base}/tables`
//! - attachment upload: `POST {content_url}/v0/{base}/{record}/{field}/uploadAttachment`
//!
//! The client only carries a bearer token. Obtaining and refreshing it happens elsewhere.
//! HTTP statuses are mapped to [`StoreError`] variants so the core retry layer can tell
//! transient failures (429, 5xx, transport) from terminal ones.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thumbsync_core::contract::{
    AttachmentMetadata, AttachmentUpload, RecordStore, RemoteRecord, StoreError, TableField,
};

use crate::load_config::AirtableSettings;

/// Largest file the content upload endpoint accepts.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct AirtableClient {
    http: reqwest::Client,
    base_id: String,
    api_url: String,
    content_url: String,
    token: String,
}

impl AirtableClient {
    pub fn new(settings: &AirtableSettings) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(transport)?;
        tracing::info!(
            base_id = %settings.base_id,
            api_url = %settings.api_url,
            token_set = !settings.token.is_empty(),
            "Initialized AirtableClient"
        );
        Ok(Self {
            http,
            base_id: settings.base_id.clone(),
            api_url: settings.api_url.clone(),
            content_url: settings.content_url.clone(),
            token: settings.token.clone(),
        })
    }
}

#[derive(Deserialize)]
struct ListRecordsResponse {
    #[serde(default)]
    records: Vec<RemoteRecord>,
}

#[derive(Deserialize)]
struct TablesResponse {
    tables: Vec<TableSchema>,
}

#[derive(Deserialize)]
struct TableSchema {
    id: String,
    name: String,
    #[serde(default)]
    fields: Vec<TableField>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadAttachmentBody<'a> {
    content_type: &'a str,
    file: String,
    filename: &'a str,
}

#[derive(Deserialize)]
struct UploadAttachmentResponse {
    #[serde(default)]
    fields: HashMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct StoredAttachment {
    id: Option<String>,
    url: Option<String>,
    filename: Option<String>,
    size: Option<u64>,
    #[serde(rename = "type")]
    content_type: Option<String>,
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Transport(e.to_string())
}

fn decode(e: reqwest::Error) -> StoreError {
    StoreError::Decode(e.to_string())
}

/// Map non-success statuses onto the store error taxonomy.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        401 | 403 => StoreError::Unauthorized,
        404 => StoreError::NotFound(message),
        429 => StoreError::RateLimited,
        code if code >= 500 => StoreError::Server {
            status: code,
            message,
        },
        code => StoreError::Rejected {
            status: code,
            message,
        },
    })
}

#[async_trait]
impl RecordStore for AirtableClient {
    async fn query_records(
        &self,
        table: &str,
        filter_formula: &str,
        max_records: usize,
    ) -> Result<Vec<RemoteRecord>, StoreError> {
        let url = format!(
            "{}/v0/{}/{}",
            self.api_url,
            self.base_id,
            urlencoding::encode(table)
        );
        let max_records = max_records.to_string();
        tracing::debug!(table, filter_formula, "Querying records");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("filterByFormula", filter_formula),
                ("maxRecords", max_records.as_str()),
            ])
            .send()
            .await
            .map_err(transport)?;
        let body: ListRecordsResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(decode)?;

        tracing::debug!(table, count = body.records.len(), "Records fetched");
        Ok(body.records)
    }

    async fn table_fields(&self, table: &str) -> Result<Vec<TableField>, StoreError> {
        let url = format!("{}/v0/meta/bases/{}/tables", self.api_url, self.base_id);
        tracing::info!(base_id = %self.base_id, table, "Fetching table schema");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        let body: TablesResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(decode)?;

        body.tables
            .into_iter()
            .find(|t| t.id == table || t.name == table)
            .map(|t| t.fields)
            .ok_or_else(|| {
                tracing::error!(base_id = %self.base_id, table, "Table not found in base schema");
                StoreError::NotFound(format!("table '{table}' in base '{}'", self.base_id))
            })
    }

    async fn upload_attachment(
        &self,
        record_id: &str,
        field_id: &str,
        upload: &AttachmentUpload,
    ) -> Result<AttachmentMetadata, StoreError> {
        if upload.bytes.len() > MAX_UPLOAD_BYTES {
            return Err(StoreError::Rejected {
                status: 413,
                message: format!(
                    "{} is {} bytes, the upload limit is {MAX_UPLOAD_BYTES}",
                    upload.filename,
                    upload.bytes.len()
                ),
            });
        }

        let url = format!(
            "{}/v0/{}/{}/{}/uploadAttachment",
            self.content_url, self.base_id, record_id, field_id
        );
        let body = UploadAttachmentBody {
            content_type: &upload.content_type,
            file: STANDARD.encode(&upload.bytes),
            filename: &upload.filename,
        };
        tracing::info!(
            record_id,
            field_id,
            filename = %upload.filename,
            bytes = upload.bytes.len(),
            "Uploading attachment"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let body: UploadAttachmentResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(decode)?;

        // The field holds every attachment of the record; ours is the newest with this name.
        let stored: Vec<StoredAttachment> = body
            .fields
            .get(field_id)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();
        let newest = stored
            .into_iter()
            .rev()
            .find(|a| a.filename.as_deref() == Some(upload.filename.as_str()));

        Ok(match newest {
            Some(a) => AttachmentMetadata {
                id: a.id,
                url: a.url,
                filename: a.filename.unwrap_or_else(|| upload.filename.clone()),
                size: a.size,
                content_type: a.content_type.unwrap_or_else(|| upload.content_type.clone()),
            },
            None => AttachmentMetadata {
                id: None,
                url: None,
                filename: upload.filename.clone(),
                size: Some(upload.bytes.len() as u64),
                content_type: upload.content_type.clone(),
            },
        })
    }
}
