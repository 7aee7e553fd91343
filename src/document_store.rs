//! Document-oriented [`RecordStore`]: each identity is kept as one JSON
//! document holding its whole bundle, next to a list of ledger documents.
//!
//! State lives in memory and is written to a JSON file on [`RecordStore::close`]
//! when the store was opened with a path.

use crate::errors::{AppError, ResultExt};
use crate::ledger;
use crate::models::{FailureEntry, LookupResult, RecordBundle, UserExportRow};
use crate::store::{DuplicatePolicy, FailureFilter, RecordStore, SaveOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserDocument {
    user_id: i64,
    create_dt: DateTime<Utc>,
    update_dt: Option<DateTime<Utc>>,
    bundle: RecordBundle,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Documents {
    users: Vec<UserDocument>,
    failures: Vec<FailureEntry>,
    next_user_id: i64,
    next_failure_id: i64,
}

pub struct DocumentStore {
    path: Option<PathBuf>,
    duplicate_policy: DuplicatePolicy,
    documents: Mutex<Documents>,
}

impl DocumentStore {
    /// Store that is never persisted.
    pub fn in_memory(duplicate_policy: DuplicatePolicy) -> Self {
        Self {
            path: None,
            duplicate_policy,
            documents: Mutex::new(Documents::default()),
        }
    }

    /// Loads `path` if it exists; the file is (re)written on close.
    pub async fn open(
        path: impl AsRef<Path>,
        duplicate_policy: DuplicatePolicy,
    ) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();
        let documents = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Documents>(&bytes)
                .map_err(AppError::from)
                .with_context(|| format!("parsing document store {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Documents::default(),
            Err(e) => return Err(AppError::Io(e)),
        };

        tracing::info!(
            "Opened document store {} ({} identities, {} ledger entries)",
            path.display(),
            documents.users.len(),
            documents.failures.len()
        );

        Ok(Self {
            path: Some(path),
            duplicate_policy,
            documents: Mutex::new(documents),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Documents>, AppError> {
        self.documents
            .lock()
            .map_err(|_| AppError::InternalError("document store lock poisoned".to_string()))
    }

    /// Stored bundle for `email`, if any.
    pub fn bundle_for(&self, email: &str) -> Result<Option<RecordBundle>, AppError> {
        Ok(self
            .lock()?
            .users
            .iter()
            .find(|doc| doc.bundle.email() == email)
            .map(|doc| doc.bundle.clone()))
    }
}

#[async_trait]
impl RecordStore for DocumentStore {
    async fn save(&self, bundle: &RecordBundle) -> Result<SaveOutcome, AppError> {
        let now = Utc::now();
        let mut docs = self.lock()?;

        if let Some(existing) = docs
            .users
            .iter_mut()
            .find(|doc| doc.bundle.email() == bundle.email())
        {
            let user_id = existing.user_id;
            return match self.duplicate_policy {
                DuplicatePolicy::Fail => Err(AppError::Integrity(format!(
                    "identity already stored for {}",
                    bundle.email()
                ))),
                DuplicatePolicy::Skip => {
                    tracing::info!(
                        "Identity for {} already stored (user_id: {}), skipping",
                        bundle.email(),
                        user_id
                    );
                    Ok(SaveOutcome::Skipped { user_id })
                }
                DuplicatePolicy::Update => {
                    existing.bundle = bundle.clone();
                    existing.update_dt = Some(now);
                    Ok(SaveOutcome::Updated { user_id })
                }
            };
        }

        docs.next_user_id += 1;
        let user_id = docs.next_user_id;
        docs.users.push(UserDocument {
            user_id,
            create_dt: now,
            update_dt: None,
            bundle: bundle.clone(),
        });

        tracing::info!(
            "✓ Stored document for {} (user_id: {})",
            bundle.email(),
            user_id
        );
        Ok(SaveOutcome::Inserted { user_id })
    }

    async fn record_failure(
        &self,
        email: &str,
        result: &LookupResult,
    ) -> Result<FailureEntry, AppError> {
        let mut entry = ledger::open_entry(email, result, Utc::now());
        let mut docs = self.lock()?;
        docs.next_failure_id += 1;
        entry.failure_id = docs.next_failure_id;
        docs.failures.push(entry.clone());
        Ok(entry)
    }

    async fn record_retry(
        &self,
        request_id: &str,
        result: &LookupResult,
    ) -> Result<FailureEntry, AppError> {
        let now = Utc::now();
        let mut docs = self.lock()?;

        let mut latest = None;
        for entry in docs
            .failures
            .iter_mut()
            .filter(|entry| entry.request_id == request_id)
        {
            ledger::apply_retry(entry, result, now);
            latest = Some(entry.clone());
        }

        latest.ok_or_else(|| {
            AppError::NotFound(format!("no ledger entry with request id '{}'", request_id))
        })
    }

    async fn pending_entries(&self) -> Result<Vec<FailureEntry>, AppError> {
        Ok(self
            .lock()?
            .failures
            .iter()
            .filter(|entry| ledger::is_pending(entry))
            .cloned()
            .collect())
    }

    async fn export_users(&self) -> Result<Vec<UserExportRow>, AppError> {
        Ok(self
            .lock()?
            .users
            .iter()
            .map(|doc| UserExportRow::from_bundle(doc.user_id, &doc.bundle, doc.create_dt))
            .collect())
    }

    async fn export_failures(&self, filter: FailureFilter) -> Result<Vec<FailureEntry>, AppError> {
        Ok(self
            .lock()?
            .failures
            .iter()
            .filter(|entry| filter == FailureFilter::All || !entry.retry_complete)
            .cloned()
            .collect())
    }

    async fn close(&self) -> Result<(), AppError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = {
            let docs = self.lock()?;
            serde_json::to_vec_pretty(&*docs)?
        };
        tokio::fs::write(path, bytes).await?;

        tracing::info!("Flushed document store to {}", path.display());
        Ok(())
    }
}
