//! Server-assigned timestamps.
//!
//! Timestamps are persisted and echoed as `YYYY-MM-DD HH:MM:SS.ffffff`.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Output format, always six fractional digits.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Accepted input format; the fraction is optional on parse.
const PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A UTC instant with microsecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The current time, truncated to microseconds.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Wrap an existing instant, truncating it to microseconds.
    #[must_use]
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime.trunc_subsecs(6))
    }

    /// The instant without a zone, as stored in `DATETIME(6)` columns.
    #[must_use]
    pub fn naive_utc(&self) -> NaiveDateTime {
        self.0.naive_utc()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let naive = NaiveDateTime::parse_from_str(s, PARSE_FORMAT)?;
        Ok(Self::from_datetime(naive.and_utc()))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::from_datetime(datetime)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_display_has_six_fractional_digits() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let ts = Timestamp::from_datetime(dt);
        assert_eq!(ts.to_string(), "2024-03-09 07:05:01.000000");
    }

    #[test]
    fn test_truncates_to_microseconds() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let ts = Timestamp::from_datetime(dt);
        assert_eq!(ts.to_string(), "2024-03-09 07:05:01.123456");
    }

    #[test]
    fn test_parse() {
        let ts: Timestamp = "2024-03-09 07:05:01.123456".parse().unwrap();
        assert_eq!(ts.to_string(), "2024-03-09 07:05:01.123456");

        let whole: Timestamp = "2024-03-09 07:05:01".parse().unwrap();
        assert_eq!(whole.to_string(), "2024-03-09 07:05:01.000000");

        assert!("yesterday".parse::<Timestamp>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let ts: Timestamp = "2024-03-09 07:05:01.000042".parse().unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2024-03-09 07:05:01.000042\"");

        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
