//! Record lookup by key field, using the store's formula filter syntax.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::contract::{RecordStore, RemoteRecord, StoreError};
use crate::throttle::{call_with_retry, RateLimiter, RetryPolicy};

/// Quote `value` as a single-quoted formula string literal.
pub fn formula_string_literal(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// `{field} = 'value'`: exact equality on one field.
pub fn key_equals_formula(field: &str, value: &str) -> String {
    let field = field.replace('}', "\\}");
    format!("{{{field}}} = {}", formula_string_literal(value))
}

/// Finds the record whose key field equals a given value.
pub struct RecordMatcher<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    limiter: &'a RateLimiter,
    retry: &'a RetryPolicy,
    cancel: &'a CancellationToken,
}

impl<'a, S: RecordStore + ?Sized> RecordMatcher<'a, S> {
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

    /// The first record the store returns for `key_field = value`, if any.
    ///
    /// Duplicate keys are not an error: the first record wins and a warning is logged.
    pub async fn find_by_key(
        &self,
        table: &str,
        key_field: &str,
        value: &str,
    ) -> Result<Option<RemoteRecord>, StoreError> {
        let formula = key_equals_formula(key_field, value);
        let store = self.store;
        let formula_ref = formula.as_str();

        let records = call_with_retry(
            self.limiter,
            self.retry,
            self.cancel,
            "query_records",
            move || store.query_records(table, formula_ref, 2),
        )
        .await?;

        if records.len() > 1 {
            warn!(
                table,
                key_field,
                value,
                "Multiple records share this key; using the first"
            );
        }
        let found = records.into_iter().next();
        debug!(
            table,
            value,
            record_id = found.as_ref().map(|r| r.id.as_str()),
            "Key lookup finished"
        );
        Ok(found)
    }
}
