//! Storage capability shared by the relational and document backends.

use crate::errors::AppError;
use crate::models::{FailureEntry, LookupResult, RecordBundle, UserExportRow};
use async_trait::async_trait;
use std::str::FromStr;

/// What to do when a bundle arrives for an email that already has an identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Reject with [`AppError::Integrity`].
    #[default]
    Fail,
    /// Keep the stored identity untouched.
    Skip,
    /// Overwrite the identity and replace all of its child records.
    Update,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(DuplicatePolicy::Fail),
            "skip" => Ok(DuplicatePolicy::Skip),
            "update" => Ok(DuplicatePolicy::Update),
            other => Err(format!(
                "unknown duplicate policy '{}' (expected fail, skip or update)",
                other
            )),
        }
    }
}

/// Result of [`RecordStore::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted { user_id: i64 },
    Updated { user_id: i64 },
    Skipped { user_id: i64 },
}

impl SaveOutcome {
    pub fn user_id(&self) -> i64 {
        match self {
            SaveOutcome::Inserted { user_id }
            | SaveOutcome::Updated { user_id }
            | SaveOutcome::Skipped { user_id } => *user_id,
        }
    }
}

/// Which ledger rows to export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailureFilter {
    #[default]
    All,
    /// Only rows with `retry_complete == false`.
    Active,
}

/// Persistence for record bundles and the failure ledger.
///
/// Every backend applies the transition rules from [`crate::ledger`], keeps
/// ledger rows in insertion order and never deletes them.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists a bundle under its identity email, honouring the duplicate policy.
    async fn save(&self, bundle: &RecordBundle) -> Result<SaveOutcome, AppError>;

    /// Opens a new ledger entry for a first failure.
    async fn record_failure(
        &self,
        email: &str,
        result: &LookupResult,
    ) -> Result<FailureEntry, AppError>;

    /// Applies a retry outcome to the entry with `request_id`.
    async fn record_retry(
        &self,
        request_id: &str,
        result: &LookupResult,
    ) -> Result<FailureEntry, AppError>;

    /// Active entries whose initial status was retryable, in insertion order.
    async fn pending_entries(&self) -> Result<Vec<FailureEntry>, AppError>;

    /// Denormalized identity view, ordered by user id.
    async fn export_users(&self) -> Result<Vec<UserExportRow>, AppError>;

    async fn export_failures(&self, filter: FailureFilter) -> Result<Vec<FailureEntry>, AppError>;

    /// Flushes and releases the backend.
    async fn close(&self) -> Result<(), AppError>;
}
