/// Failure ledger state machine, exercised through every store backend
use std::sync::Arc;

use busybody::db::Database;
use busybody::db_storage::SqliteStore;
use busybody::document_store::DocumentStore;
use busybody::ledger::{FailureLedger, RETRYABLE_STATUSES};
use busybody::models::LookupResult;
use busybody::store::{DuplicatePolicy, FailureFilter, RecordStore};

async fn backends() -> Vec<(&'static str, Arc<dyn RecordStore>)> {
    let db = Database::in_memory().await.expect("in-memory sqlite");
    vec![
        (
            "sqlite",
            Arc::new(SqliteStore::new(db.pool, DuplicatePolicy::Fail)) as Arc<dyn RecordStore>,
        ),
        (
            "document",
            Arc::new(DocumentStore::in_memory(DuplicatePolicy::Fail)) as Arc<dyn RecordStore>,
        ),
    ]
}

#[tokio::test]
async fn retryable_failure_completes_on_terminal_retry() {
    for (backend, store) in backends().await {
        let ledger = FailureLedger::new(store.as_ref());

        let entry = ledger
            .record_failure("a@example.com", &LookupResult::failure(403, "req-a"))
            .await
            .unwrap();
        assert_eq!(entry.initial_status, 403, "{}", backend);
        assert_eq!(entry.retry_count, 0, "{}", backend);
        assert!(!entry.retry_complete, "{}", backend);

        let updated = ledger
            .record_retry(&entry, &LookupResult::failure(404, "req-a"))
            .await
            .unwrap();
        assert_eq!(updated.failure_id, entry.failure_id, "{}", backend);
        assert_eq!(updated.retry_count, 1, "{}", backend);
        assert_eq!(updated.most_recent_retry_status, Some(404), "{}", backend);
        assert!(updated.most_recent_retry_dt.is_some(), "{}", backend);
        assert!(updated.retry_complete, "{}", backend);

        assert!(ledger.pending_entries().await.unwrap().is_empty(), "{}", backend);
    }
}

#[tokio::test]
async fn terminal_failure_is_never_pending() {
    for (backend, store) in backends().await {
        let ledger = FailureLedger::new(store.as_ref());

        for (i, status) in [404u16, 405, 410, 418].into_iter().enumerate() {
            let entry = ledger
                .record_failure(
                    "b@example.com",
                    &LookupResult::failure(status, format!("req-{}", i)),
                )
                .await
                .unwrap();
            assert!(entry.retry_complete, "{} status {}", backend, status);
        }

        assert!(ledger.pending_entries().await.unwrap().is_empty(), "{}", backend);
        assert!(ledger
            .entries(FailureFilter::Active)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(ledger.entries(FailureFilter::All).await.unwrap().len(), 4);
    }
}

#[tokio::test]
async fn every_retryable_status_stays_pending_until_terminal() {
    for (backend, store) in backends().await {
        let ledger = FailureLedger::new(store.as_ref());

        let mut entries = Vec::new();
        for status in RETRYABLE_STATUSES {
            let entry = ledger
                .record_failure(
                    &format!("s{}@example.com", status),
                    &LookupResult::failure(status, format!("req-{}", status)),
                )
                .await
                .unwrap();
            entries.push(entry);
        }

        let pending = ledger.pending_entries().await.unwrap();
        let statuses: Vec<u16> = pending.iter().map(|e| e.initial_status).collect();
        assert_eq!(statuses, RETRYABLE_STATUSES.to_vec(), "{}", backend);

        // Retrying with another retryable status keeps the entry active.
        for entry in &entries {
            let updated = ledger
                .record_retry(entry, &LookupResult::failure(202, entry.request_id.clone()))
                .await
                .unwrap();
            assert!(!updated.retry_complete, "{}", backend);
        }
        assert_eq!(ledger.pending_entries().await.unwrap().len(), 5, "{}", backend);

        // Flip the first one; it drops out while the rest keep their order.
        ledger
            .record_retry(&entries[0], &LookupResult::success(serde_json::json!({}), "x"))
            .await
            .unwrap();
        let pending = ledger.pending_entries().await.unwrap();
        assert_eq!(pending.len(), 4, "{}", backend);
        assert_eq!(pending[0].request_id, entries[1].request_id, "{}", backend);
        assert_eq!(pending[0].retry_count, 1, "{}", backend);
    }
}

#[tokio::test]
async fn retry_complete_never_reverts() {
    for (backend, store) in backends().await {
        let ledger = FailureLedger::new(store.as_ref());

        let entry = ledger
            .record_failure("c@example.com", &LookupResult::failure(500, "req-c"))
            .await
            .unwrap();
        ledger
            .record_retry(&entry, &LookupResult::failure(410, "req-c"))
            .await
            .unwrap();
        let updated = ledger
            .record_retry(&entry, &LookupResult::failure(202, "req-c"))
            .await
            .unwrap();

        assert_eq!(updated.retry_count, 2, "{}", backend);
        assert_eq!(updated.most_recent_retry_status, Some(202), "{}", backend);
        assert!(updated.retry_complete, "{}", backend);
    }
}

#[tokio::test]
async fn retry_for_unknown_request_id_is_not_found() {
    for (backend, store) in backends().await {
        let ledger = FailureLedger::new(store.as_ref());

        let mut entry = ledger
            .record_failure("d@example.com", &LookupResult::failure(202, "req-d"))
            .await
            .unwrap();
        entry.request_id = "req-unknown".to_string();

        let err = ledger
            .record_retry(&entry, &LookupResult::failure(404, "req-unknown"))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{}: {}", backend, err);

        // The real entry is untouched.
        let pending = ledger.pending_entries().await.unwrap();
        assert_eq!(pending.len(), 1, "{}", backend);
        assert_eq!(pending[0].retry_count, 0, "{}", backend);
    }
}

#[tokio::test]
async fn same_email_may_have_independent_entries() {
    for (backend, store) in backends().await {
        let ledger = FailureLedger::new(store.as_ref());

        let first = ledger
            .record_failure("e@example.com", &LookupResult::failure(202, "run-1"))
            .await
            .unwrap();
        let second = ledger
            .record_failure("e@example.com", &LookupResult::failure(202, "run-2"))
            .await
            .unwrap();
        assert_ne!(first.failure_id, second.failure_id, "{}", backend);

        ledger
            .record_retry(&first, &LookupResult::failure(404, "run-1"))
            .await
            .unwrap();

        let pending = ledger.pending_entries().await.unwrap();
        assert_eq!(pending.len(), 1, "{}", backend);
        assert_eq!(pending[0].request_id, "run-2", "{}", backend);
    }
}
