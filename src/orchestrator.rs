//! Drives lookups through classification, mapping, storage and the ledger.
//!
//! Every call is awaited in sequence; one email is fully handled before the
//! next lookup is issued.

use crate::errors::{AppError, ResultExt};
use crate::ledger::FailureLedger;
use crate::mapper::RecordMapper;
use crate::models::{status_description, FailureEntry, LookupOutcome, LookupResult};
use crate::person_client::PersonLookupClient;
use crate::store::{RecordStore, SaveOutcome};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Status recorded for lookups that never produced an HTTP response.
pub const TRANSPORT_FAILURE_STATUS: u16 = 0;

/// Per-run tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub stored: usize,
    pub skipped_duplicates: usize,
    pub integrity_failures: usize,
    pub pending: usize,
    pub failed: usize,
    pub transport_errors: usize,
}

impl BatchSummary {
    fn tally(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Stored(SaveOutcome::Skipped { .. }) => self.skipped_duplicates += 1,
            Disposition::Stored(_) => self.stored += 1,
            Disposition::IntegrityFailure => self.integrity_failures += 1,
            Disposition::Pending => self.pending += 1,
            Disposition::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.stored
            + self.skipped_duplicates
            + self.integrity_failures
            + self.pending
            + self.failed
            + self.transport_errors
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed: {} stored, {} skipped (duplicate), {} integrity failures, \
             {} pending retry, {} failed, {} transport errors",
            self.total(),
            self.stored,
            self.skipped_duplicates,
            self.integrity_failures,
            self.pending,
            self.failed,
            self.transport_errors
        )
    }
}

/// What happened to one lookup after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Stored(SaveOutcome),
    IntegrityFailure,
    Pending,
    Failed,
}

impl Disposition {
    fn for_failure(result: &LookupResult) -> Self {
        if result.outcome().is_retryable() {
            Disposition::Pending
        } else {
            Disposition::Failed
        }
    }
}

pub struct LookupOrchestrator {
    client: Arc<dyn PersonLookupClient>,
    store: Arc<dyn RecordStore>,
    mapper: RecordMapper,
}

impl LookupOrchestrator {
    pub fn new(client: Arc<dyn PersonLookupClient>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            client,
            store,
            mapper: RecordMapper::new(),
        }
    }

    fn ledger(&self) -> FailureLedger<'_> {
        FailureLedger::new(self.store.as_ref())
    }

    /// Looks up one email, then stores the mapped bundle or opens a ledger entry.
    ///
    /// Returns the lookup result, carrying a `local-` request id when the API
    /// sent none. A transport failure is recorded in the ledger as a terminal
    /// entry and then returned as the error.
    pub async fn process(&self, email: &str) -> Result<LookupResult, AppError> {
        self.process_one(email).await.map(|(result, _)| result)
    }

    /// Re-issues the lookup for every pending ledger entry.
    ///
    /// Results are classified against the existing entry. Transport failures
    /// leave the entry untouched and are skipped.
    pub async fn retry_pending(&self) -> Result<Vec<LookupResult>, AppError> {
        let (outcomes, _) = self.retry_all().await?;
        Ok(outcomes.into_iter().map(|(result, _)| result).collect())
    }

    /// Runs [`process`](Self::process) for each email in order.
    ///
    /// Only storage faults abort the batch.
    pub async fn run_batch<S: AsRef<str>>(&self, emails: &[S]) -> Result<BatchSummary, AppError> {
        let mut summary = BatchSummary::default();

        for email in emails {
            let email = email.as_ref();
            match self.process_one(email).await {
                Ok((_, disposition)) => summary.tally(disposition),
                Err(e) if e.is_transport() => {
                    tracing::error!("Lookup for {} aborted: {}", email, e);
                    summary.transport_errors += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!("Lookup batch finished: {}", summary);
        Ok(summary)
    }

    /// Same as [`retry_pending`](Self::retry_pending), tallied.
    pub async fn retry_batch(&self) -> Result<BatchSummary, AppError> {
        let (outcomes, transport_errors) = self.retry_all().await?;

        let mut summary = BatchSummary {
            transport_errors,
            ..BatchSummary::default()
        };
        for (_, disposition) in outcomes {
            summary.tally(disposition);
        }

        tracing::info!("Retry pass finished: {}", summary);
        Ok(summary)
    }

    async fn process_one(&self, email: &str) -> Result<(LookupResult, Disposition), AppError> {
        let result = match self.client.get_person(email).await {
            Ok(result) => result,
            Err(e) if e.is_transport() => {
                self.record_transport_failure(email, &e).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        log_outcome(email, &result);

        if result.outcome() == LookupOutcome::Success {
            let disposition = self.store_payload(email, &result).await?;
            return Ok((result, disposition));
        }

        let result = with_correlation_id(result);
        self.ledger().record_failure(email, &result).await?;
        let disposition = Disposition::for_failure(&result);
        Ok((result, disposition))
    }

    async fn retry_all(&self) -> Result<(Vec<(LookupResult, Disposition)>, usize), AppError> {
        let mut pending = self.ledger().pending_entries().await?;
        // One lookup per request id; record_retry updates every row sharing it.
        let mut seen = HashSet::new();
        pending.retain(|entry| seen.insert(entry.request_id.clone()));
        tracing::info!("Retrying {} pending lookup(s)", pending.len());

        let mut outcomes = Vec::with_capacity(pending.len());
        let mut transport_errors = 0;

        for entry in pending {
            match self.retry_entry(&entry).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) if e.is_transport() => {
                    tracing::warn!(
                        "Retry for {} could not reach the API, leaving entry {} pending: {}",
                        entry.email,
                        entry.failure_id,
                        e
                    );
                    transport_errors += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok((outcomes, transport_errors))
    }

    async fn retry_entry(
        &self,
        entry: &FailureEntry,
    ) -> Result<(LookupResult, Disposition), AppError> {
        let result = self.client.get_person(&entry.email).await?;
        log_outcome(&entry.email, &result);

        let updated = self.ledger().record_retry(entry, &result).await?;

        let disposition = if result.outcome() == LookupOutcome::Success {
            self.store_payload(&entry.email, &result).await?
        } else if updated.retry_complete {
            Disposition::Failed
        } else {
            Disposition::Pending
        };

        Ok((result, disposition))
    }

    async fn store_payload(
        &self,
        email: &str,
        result: &LookupResult,
    ) -> Result<Disposition, AppError> {
        let bundle = match result.payload() {
            Some(payload) => self.mapper.map(email, payload),
            None => {
                return Err(AppError::InternalError(format!(
                    "successful lookup for {} carried no payload",
                    email
                )))
            }
        };

        match self.store.save(&bundle).await {
            Ok(outcome) => Ok(Disposition::Stored(outcome)),
            Err(e) if e.is_integrity() => {
                tracing::error!("Skipping {}: {}", email, e);
                Ok(Disposition::IntegrityFailure)
            }
            Err(e) => Err(e),
        }
    }

    async fn record_transport_failure(
        &self,
        email: &str,
        error: &AppError,
    ) -> Result<(), AppError> {
        let result = LookupResult::new(
            TRANSPORT_FAILURE_STATUS,
            None,
            local_request_id(),
            error.to_string(),
        );

        self.ledger()
            .record_failure(email, &result)
            .await
            .with_context(|| format!("recording transport failure for {}", email))?;
        Ok(())
    }
}

fn local_request_id() -> String {
    format!("local-{}", Uuid::new_v4())
}

/// Ledger rows are found again by request id, so an empty one gets a local id.
fn with_correlation_id(result: LookupResult) -> LookupResult {
    if !result.request_id().is_empty() {
        return result;
    }
    LookupResult::new(
        result.status(),
        None,
        local_request_id(),
        result.message(),
    )
}

fn log_outcome(email: &str, result: &LookupResult) {
    match result.outcome() {
        LookupOutcome::Success => {
            tracing::info!("✓ 200 OK: lookup successful for {}", email)
        }
        LookupOutcome::Pending => {
            tracing::warn!("202 ACCEPTED: will need to retry lookup for {}", email)
        }
        LookupOutcome::RateLimited => tracing::warn!(
            "403 RATE LIMITED: either sending too many requests per second or exceeded quota"
        ),
        LookupOutcome::ServerError | LookupOutcome::InvalidRequest => tracing::warn!(
            "{} {}: failed to return a result for {}",
            result.status(),
            status_description(result.status()),
            email
        ),
        LookupOutcome::TerminalFailure => tracing::error!(
            "{} {}: failed to return a result for {}",
            result.status(),
            status_description(result.status()),
            email
        ),
    }
}
