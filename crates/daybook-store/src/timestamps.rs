//! Column encoding helpers.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so that SQLite's text ordering is chronological.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use uuid::Uuid;

pub(crate) fn encode(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn decode_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn encoding_is_fixed_width_and_sortable() {
        let early = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let late = early + chrono::Duration::milliseconds(1500);

        let a = encode(&early);
        let b = encode(&late);
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(decode(0, &b).unwrap(), late);
    }
}
