//! Attachment upload for one record/field pair.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::contract::{AttachmentMetadata, AttachmentUpload, RecordStore, StoreError};
use crate::filename::content_type_for;
use crate::throttle::{call_with_retry, RateLimiter, RetryPolicy};

/// Sends image bytes to the store's attachment endpoint, paced and retried like every other call.
pub struct AttachmentUploader<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    limiter: &'a RateLimiter,
    retry: &'a RetryPolicy,
    cancel: &'a CancellationToken,
}

impl<'a, S: RecordStore + ?Sized> AttachmentUploader<'a, S> {
    pub fn new(
        store: &'a S,
        limiter: &'a RateLimiter,
        retry: &'a RetryPolicy,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            store,
            limiter,
            retry,
            cancel,
        }
    }

    /// Failures are returned unchanged; deciding whether they abort anything is the caller's job.
    pub async fn upload(
        &self,
        record_id: &str,
        field_id: &str,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<AttachmentMetadata, StoreError> {
        let upload = AttachmentUpload {
            filename: filename.to_string(),
            content_type: content_type_for(filename).to_string(),
            bytes,
        };
        let store = self.store;
        let upload_ref = &upload;

        let metadata = call_with_retry(
            self.limiter,
            self.retry,
            self.cancel,
            "upload_attachment",
            move || store.upload_attachment(record_id, field_id, upload_ref),
        )
        .await?;

        info!(
            record_id,
            filename,
            content_type = %upload.content_type,
            bytes = upload.bytes.len(),
            "Uploaded attachment"
        );
        Ok(metadata)
    }
}
