//! Failure ledger: bookkeeping for lookups that did not succeed first time.
//!
//! The transition rules live here as pure functions so every store backend
//! applies exactly the same state machine:
//!
//! - a first non-200 response opens an entry; it stays active only while the
//!   status is in [`RETRYABLE_STATUSES`]
//! - each retry bumps `retry_count`, records the latest status and time, and
//!   recomputes `retry_complete` from the same rule
//! - `retry_complete` never reverts to false

use crate::errors::AppError;
use crate::models::{FailureEntry, LookupResult};
use crate::store::{FailureFilter, RecordStore};
use chrono::{DateTime, Utc};

/// Status codes that leave an entry eligible for another attempt.
pub const RETRYABLE_STATUSES: [u16; 5] = [202, 403, 500, 400, 422];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Any status outside the retryable set is terminal.
pub fn is_retry_complete(status: u16) -> bool {
    !is_retryable_status(status)
}

/// Builds the entry recorded on a first failure. The store assigns `failure_id`.
pub fn open_entry(email: &str, result: &LookupResult, now: DateTime<Utc>) -> FailureEntry {
    FailureEntry {
        failure_id: 0,
        email: email.to_string(),
        initial_status: result.status(),
        message: result.message().to_string(),
        request_id: result.request_id().to_string(),
        create_dt: now,
        retry_count: 0,
        most_recent_retry_status: None,
        most_recent_retry_dt: None,
        retry_complete: is_retry_complete(result.status()),
    }
}

/// Applies one retry outcome to an existing entry.
pub fn apply_retry(entry: &mut FailureEntry, result: &LookupResult, now: DateTime<Utc>) {
    entry.retry_count += 1;
    entry.most_recent_retry_status = Some(result.status());
    entry.most_recent_retry_dt = Some(now);
    entry.retry_complete = entry.retry_complete || is_retry_complete(result.status());
}

/// True while the entry should be part of the next retry pass.
pub fn is_pending(entry: &FailureEntry) -> bool {
    is_retryable_status(entry.initial_status) && !entry.retry_complete
}

/// Ledger operations over any [`RecordStore`] backend.
pub struct FailureLedger<'a> {
    store: &'a dyn RecordStore,
}

impl<'a> FailureLedger<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self { store }
    }

    /// Inserts a new entry for a first failure.
    pub async fn record_failure(
        &self,
        email: &str,
        result: &LookupResult,
    ) -> Result<FailureEntry, AppError> {
        let entry = self.store.record_failure(email, result).await?;
        tracing::debug!(
            "Ledger entry {} opened for {} (status {}, retry_complete: {})",
            entry.failure_id,
            entry.email,
            entry.initial_status,
            entry.retry_complete
        );
        Ok(entry)
    }

    /// Updates the entry matching `entry.request_id` with a retry outcome.
    ///
    /// Fails with [`AppError::NotFound`] when no entry carries that request id.
    pub async fn record_retry(
        &self,
        entry: &FailureEntry,
        result: &LookupResult,
    ) -> Result<FailureEntry, AppError> {
        let updated = self.store.record_retry(&entry.request_id, result).await?;
        if updated.retry_complete {
            tracing::info!(
                "Retry complete for {} after {} attempt(s) (last status {})",
                updated.email,
                updated.retry_count,
                result.status()
            );
        } else {
            tracing::debug!(
                "Retry {} for {} still pending (status {})",
                updated.retry_count,
                updated.email,
                result.status()
            );
        }
        Ok(updated)
    }

    /// Active entries in insertion order.
    pub async fn pending_entries(&self) -> Result<Vec<FailureEntry>, AppError> {
        self.store.pending_entries().await
    }

    /// Every entry, or only the active ones.
    pub async fn entries(&self, filter: FailureFilter) -> Result<Vec<FailureEntry>, AppError> {
        self.store.export_failures(filter).await
    }
}
