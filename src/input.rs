use crate::errors::{AppError, ResultExt};
use regex::Regex;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.+_-]+@[A-Za-z0-9._-]+\.[a-zA-Z]*$").expect("email regex is valid")
});

/// Column that carries the addresses to look up.
pub const EMAIL_COLUMN: &str = "email";

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Reads the `email` column of a CSV file, in file order.
pub fn read_emails(path: impl AsRef<Path>) -> Result<Vec<String>, AppError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(AppError::from)
        .with_context(|| format!("opening input file {}", path.display()))?;
    read_emails_from_reader(file)
}

/// Reads emails from any CSV source with a header row.
///
/// Rows with an invalid address are skipped with a warning.
pub fn read_emails_from_reader<R: Read>(source: R) -> Result<Vec<String>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source);

    let headers = reader.headers()?.clone();
    let column = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(EMAIL_COLUMN))
        .ok_or_else(|| {
            AppError::InvalidInput(format!("input has no '{}' column", EMAIL_COLUMN))
        })?;

    let mut emails = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let email = record.get(column).unwrap_or_default();

        if !is_valid_email(email) {
            // idx + 2: header row plus 1-based numbering.
            tracing::warn!("❌ Skipping row {}: invalid email '{}'", idx + 2, email);
            continue;
        }
        emails.push(email.to_string());
    }

    tracing::info!("Read {} email(s) from input", emails.len());
    Ok(emails)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("bart@example.com"));
        assert!(is_valid_email("first.last+tag@mail.example.co"));
        assert!(!is_valid_email("no-at-sign.example.com"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("space in@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_reads_email_column_and_skips_invalid_rows() {
        let csv = "id,Email,name\n1, a@example.com ,Ann\n2,not-an-email,Bob\n3,b@example.com,Bea\n";
        let emails = read_emails_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(emails, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_missing_email_column_is_invalid_input() {
        let err = read_emails_from_reader("id,name\n1,Ann\n".as_bytes()).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emails.csv");
        std::fs::write(&path, "email\nbart@example.com\n").unwrap();

        assert_eq!(read_emails(&path).unwrap(), vec!["bart@example.com"]);
        assert!(read_emails(dir.path().join("missing.csv")).is_err());
    }
}
