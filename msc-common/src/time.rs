//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Format used for run identifiers (sortable as plain strings)
pub const RUN_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Build a run identifier from a timestamp
///
/// Identifiers sort lexicographically in chronological order.
pub fn run_id_at(timestamp: DateTime<Utc>) -> String {
    timestamp.format(RUN_ID_FORMAT).to_string()
}

/// Build a run identifier for the current instant
pub fn new_run_id() -> String {
    run_id_at(now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01
    }

    #[test]
    fn test_run_id_format() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(run_id_at(ts), "20250307_090502");
    }

    #[test]
    fn test_run_ids_sort_chronologically() {
        let earlier = run_id_at(Utc.with_ymd_and_hms(2025, 9, 30, 23, 59, 59).unwrap());
        let later = run_id_at(Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap());
        assert!(earlier < later);
    }
}
