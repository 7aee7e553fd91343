//! CSV projections of the stored identities and the failure ledger.

use crate::errors::{AppError, ResultExt};
use crate::models::{FailureEntry, UserExportRow};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

pub const USER_COLUMNS: [&str; 18] = [
    "user_id",
    "first_name",
    "last_name",
    "email",
    "location",
    "age",
    "age_range_min",
    "age_range_max",
    "klout_score",
    "facebook_id",
    "facebook_username",
    "facebook_profile",
    "twitter_id",
    "twitter_screen_name",
    "twitter_followers",
    "twitter_following",
    "website",
    "scraped_on",
];

pub const FAILURE_COLUMNS: [&str; 10] = [
    "failure_id",
    "email",
    "initial_status",
    "message",
    "request_id",
    "create_dt",
    "retry_count",
    "most_recent_retry_status",
    "most_recent_retry_dt",
    "retry_complete",
];

// Header is written up front so an empty export still has one.
fn write_rows<W: Write, T: Serialize>(
    writer: W,
    columns: &[&str],
    rows: &[T],
) -> Result<(), AppError> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    csv.write_record(columns)?;
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_users_csv<W: Write>(writer: W, rows: &[UserExportRow]) -> Result<(), AppError> {
    write_rows(writer, &USER_COLUMNS, rows)
}

pub fn write_failures_csv<W: Write>(writer: W, rows: &[FailureEntry]) -> Result<(), AppError> {
    write_rows(writer, &FAILURE_COLUMNS, rows)
}

pub fn export_users_to(path: impl AsRef<Path>, rows: &[UserExportRow]) -> Result<(), AppError> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)
        .map_err(AppError::from)
        .with_context(|| format!("creating {}", path.display()))?;
    write_users_csv(file, rows)?;
    tracing::info!("✓ Exported {} user row(s) to {}", rows.len(), path.display());
    Ok(())
}

pub fn export_failures_to(path: impl AsRef<Path>, rows: &[FailureEntry]) -> Result<(), AppError> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)
        .map_err(AppError::from)
        .with_context(|| format!("creating {}", path.display()))?;
    write_failures_csv(file, rows)?;
    tracing::info!(
        "✓ Exported {} ledger row(s) to {}",
        rows.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger;
    use crate::models::{LookupResult, RecordBundle};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_empty_exports_still_have_headers() {
        let mut out = Vec::new();
        write_users_csv(&mut out, &[]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.trim_end(), USER_COLUMNS.join(","));

        let mut out = Vec::new();
        write_failures_csv(&mut out, &[]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.trim_end(), FAILURE_COLUMNS.join(","));
    }

    #[test]
    fn test_user_row_serialization() {
        let mut bundle = RecordBundle::default();
        bundle.identity.email = "bart@example.com".to_string();
        bundle.identity.first_name = Some("Bart".to_string());
        bundle.demography.age_range_min = Some(25);
        bundle.demography.age_range_max = Some(34);
        let scraped_on = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let row = UserExportRow::from_bundle(1, &bundle, scraped_on);

        let mut out = Vec::new();
        write_users_csv(&mut out, &[row]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let line = text.lines().nth(1).unwrap();

        assert!(line.starts_with("1,Bart,,bart@example.com,,,25,34,"));
        assert!(line.ends_with("2024-03-01T12:00:00Z"));
    }

    #[test]
    fn test_failure_row_serialization() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut entry = ledger::open_entry(
            "a@example.com",
            &LookupResult::failure(403, "req-a"),
            created,
        );
        entry.failure_id = 3;

        let mut out = Vec::new();
        write_failures_csv(&mut out, &[entry]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text.lines().nth(1).unwrap(),
            "3,a@example.com,403,FORBIDDEN,req-a,2024-03-01T12:00:00Z,0,,,false"
        );
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failures.csv");
        export_failures_to(&path, &[]).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("failure_id,"));
    }
}
