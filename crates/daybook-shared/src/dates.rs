//! Entry-date parsing and timestamp formatting.
//!
//! The entry date is the day a memory is *about*, supplied by the user. It is
//! kept apart from the creation timestamp, which is system time.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::error::ValidationError;

/// Parse a user-supplied entry date.
///
/// Accepts a calendar date (`2024-03-01`, read as UTC midnight) or a full
/// RFC 3339 timestamp with any offset.
pub fn parse_entry_date(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    let raw = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ValidationError::InvalidEntryDate(raw.to_string()))
}

/// Format a timestamp the way the web client expects it:
/// millisecond precision with a `Z` suffix.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_calendar_date_is_utc_midnight() {
        let parsed = parse_entry_date("2024-03-01").unwrap();
        assert_eq!(format_timestamp(&parsed), "2024-03-01T00:00:00.000Z");
    }

    #[test]
    fn test_rfc3339_with_offset_is_normalised() {
        let parsed = parse_entry_date("2024-03-01T10:30:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = parse_entry_date("last tuesday").unwrap_err();
        assert_eq!(err, ValidationError::InvalidEntryDate("last tuesday".into()));
    }

    #[test]
    fn test_impossible_calendar_date_is_rejected() {
        assert!(parse_entry_date("2024-02-30").is_err());
    }
}
