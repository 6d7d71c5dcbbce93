//! Time utility functions

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time as an atproto datetime string (RFC 3339, milliseconds, Z).
pub fn datetime_now() -> (String, DateTime<Utc>) {
    let now = Utc::now();
    (now.to_rfc3339_opts(SecondsFormat::Millis, true), now)
}

/// Parse an RFC 3339 timestamp, falling back to now on malformed input.
pub fn parse_datetime_lossy(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            tracing::debug!(ts, "invalid datetime in record, substituting now");
            Utc::now()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn datetime_now_round_trips() {
        let (s, t) = datetime_now();
        let parsed = parse_datetime_lossy(&s);
        assert_eq!(parsed.timestamp_millis(), t.timestamp_millis());
    }

    #[test]
    fn malformed_input_falls_back_to_now() {
        let parsed = parse_datetime_lossy("not-a-date");
        assert!(parsed.year() >= 2024);
    }
}
