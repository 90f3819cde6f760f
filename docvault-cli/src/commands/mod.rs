pub mod changes;
pub mod diff;
pub mod init;
pub mod link;
pub mod log;
pub mod record;
pub mod revert;
pub mod rollback;
pub mod status;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use docvault_core::Vault;
use std::path::Path;

pub fn open_vault(repo: &Path) -> Result<Vault> {
    Vault::open(repo).with_context(|| {
        format!(
            "No repository found at {}. Run 'docvault init' first.",
            repo.display()
        )
    })
}

/// RFC 3339, or a bare `YYYY-MM-DD` taken as the start (or end) of that day.
pub fn parse_time(value: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}': expected YYYY-MM-DD or RFC 3339", value))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    match time {
        Some(time) => Ok(time.and_utc()),
        None => bail!("Invalid date '{}'", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time() {
        let start = parse_time("2024-03-01", false).unwrap();
        let end = parse_time("2024-03-01", true).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2024-03-01T23:59:59+00:00");
        assert_eq!(
            parse_time("2024-03-01T12:30:00+02:00", false)
                .unwrap()
                .to_rfc3339(),
            "2024-03-01T10:30:00+00:00"
        );
        assert!(parse_time("yesterday", false).is_err());
    }
}
