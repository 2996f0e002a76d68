//! Field name → field id resolution against the remote table schema.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::contract::RecordStore;
use crate::pipeline::PipelineError;
use crate::throttle::{call_with_retry, RateLimiter, RetryPolicy};

/// Resolves human field names to field ids, remembering each answer for its own lifetime.
#[derive(Debug, Default)]
pub struct FieldSchemaResolver {
    resolved: Mutex<HashMap<(String, String), String>>,
}

impl FieldSchemaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn cached(&self, key: &(String, String)) -> Option<String> {
        self.resolved
            .lock()
            .ok()
            .and_then(|resolved| resolved.get(key).cloned())
    }

    /// Look up `field_name` (or an id passed as-is) in `table`'s schema.
    ///
    /// An unknown field is a [`PipelineError::Configuration`]; a failing schema request is a
    /// [`PipelineError::Store`]. Both are fatal for the job. A cancelled request surfaces as
    /// `PipelineError::Store(StoreError::Cancelled)`.
    pub async fn resolve<S>(
        &self,
        store: &S,
        limiter: &RateLimiter,
        retry: &RetryPolicy,
        cancel: &CancellationToken,
        table: &str,
        field_name: &str,
    ) -> Result<String, PipelineError>
    where
        S: RecordStore + ?Sized,
    {
        let key = (table.to_string(), field_name.to_string());
        if let Some(field_id) = self.cached(&key) {
            return Ok(field_id);
        }

        let fields = call_with_retry(limiter, retry, cancel, "table_fields", move || {
            store.table_fields(table)
        })
        .await
        .map_err(|e| {
            error!(table, error = %e, "Failed to fetch table schema");
            PipelineError::Store(e)
        })?;

        let field = fields
            .iter()
            .find(|f| f.name == field_name)
            .or_else(|| fields.iter().find(|f| f.id == field_name))
            .ok_or_else(|| {
                error!(table, field = field_name, "Field not present in table schema");
                PipelineError::Configuration(format!(
                    "field '{field_name}' does not exist in table '{table}'"
                ))
            })?;

        info!(table, field = field_name, field_id = %field.id, "Resolved field id");
        if let Ok(mut resolved) = self.resolved.lock() {
            resolved.insert(key, field.id.clone());
        }
        Ok(field.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockRecordStore, StoreError, TableField};
    use std::time::Duration;

    fn thumbnail_schema() -> Vec<TableField> {
        vec![
            TableField {
                id: "fldKey".into(),
                name: "Part Number".into(),
                field_type: "singleLineText".into(),
            },
            TableField {
                id: "fldThumb".into(),
                name: "Thumbnail".into(),
                field_type: "multipleAttachments".into(),
            },
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_once_and_memoizes() {
        let mut store = MockRecordStore::new();
        store
            .expect_table_fields()
            .times(1)
            .returning(|_| Ok(thumbnail_schema()));
        let limiter = RateLimiter::new(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let resolver = FieldSchemaResolver::new();

        for _ in 0..3 {
            let id = resolver
                .resolve(&store, &limiter, &RetryPolicy::none(), &cancel, "Parts", "Thumbnail")
                .await
                .unwrap();
            assert_eq!(id, "fldThumb");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn accepts_field_id_directly() {
        let mut store = MockRecordStore::new();
        store
            .expect_table_fields()
            .returning(|_| Ok(thumbnail_schema()));
        let limiter = RateLimiter::new(Duration::from_millis(1));
        let cancel = CancellationToken::new();

        let id = FieldSchemaResolver::new()
            .resolve(&store, &limiter, &RetryPolicy::none(), &cancel, "Parts", "fldThumb")
            .await
            .unwrap();
        assert_eq!(id, "fldThumb");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_field_is_configuration_error() {
        let mut store = MockRecordStore::new();
        store
            .expect_table_fields()
            .returning(|_| Ok(thumbnail_schema()));
        let limiter = RateLimiter::new(Duration::from_millis(1));
        let cancel = CancellationToken::new();

        let err = FieldSchemaResolver::new()
            .resolve(&store, &limiter, &RetryPolicy::none(), &cancel, "Parts", "Picture")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(msg) if msg.contains("Picture")));
    }

    #[tokio::test(start_paused = true)]
    async fn schema_fetch_failure_is_store_error() {
        let mut store = MockRecordStore::new();
        store
            .expect_table_fields()
            .returning(|_| Err(StoreError::Unauthorized));
        let limiter = RateLimiter::new(Duration::from_millis(1));
        let cancel = CancellationToken::new();

        let err = FieldSchemaResolver::new()
            .resolve(&store, &limiter, &RetryPolicy::none(), &cancel, "Parts", "Thumbnail")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Store(StoreError::Unauthorized)));
    }
}
