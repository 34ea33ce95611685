//! Time granularities, calendar keys and timestamp normalisation.

use crate::error::{CorrectionError, Result};
use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed timestamp layout accepted besides RFC 3339.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Calendar period used for instant grouping and aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Intraday instants; the cyclic key is the minute of the day.
    Hour,
    /// Days; the cyclic key is the weekday (Monday = 0).
    #[default]
    Day,
    /// ISO weeks; the cyclic key is the ISO week number.
    Week,
    /// Months; the cyclic key is the month of the year.
    Month,
    /// Years. Has no cycle and cannot be used as an instant key.
    Year,
}

impl Granularity {
    /// Start of the period containing `timestamp`.
    pub fn period_start(&self, timestamp: &DateTime<Utc>) -> DateTime<Utc> {
        let date = timestamp.date_naive();
        let midnight = |d: NaiveDate| Utc.from_utc_datetime(&d.and_time(NaiveTime::default()));
        match self {
            Granularity::Hour => midnight(date) + Duration::hours(timestamp.hour() as i64),
            Granularity::Day => midnight(date),
            Granularity::Week => midnight(
                date - Duration::days(date.weekday().num_days_from_monday() as i64),
            ),
            Granularity::Month => midnight(date - Duration::days(date.day0() as i64)),
            Granularity::Year => midnight(date - Duration::days(date.ordinal0() as i64)),
        }
    }

    /// Cyclic "instant" key of `timestamp` for this granularity.
    pub fn instant_key(&self, timestamp: &DateTime<Utc>) -> Result<i64> {
        match self {
            Granularity::Hour => Ok((timestamp.hour() * 60 + timestamp.minute()) as i64),
            Granularity::Day => Ok(timestamp.weekday().num_days_from_monday() as i64),
            Granularity::Week => Ok(timestamp.iso_week().week() as i64),
            Granularity::Month => Ok(timestamp.month() as i64),
            Granularity::Year => Err(CorrectionError::Configuration(
                "granularity 'year' has no cycle and cannot define instants".into(),
            )),
        }
    }

    /// Fails for granularities that cannot key instant groups.
    pub fn validate_for_instants(&self) -> Result<()> {
        if *self == Granularity::Year {
            return Err(CorrectionError::Configuration(
                "granularity 'year' has no cycle and cannot define instants".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Year => "year",
        };
        f.write_str(name)
    }
}

impl FromStr for Granularity {
    type Err = CorrectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" => Ok(Granularity::Hour),
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            "year" => Ok(Granularity::Year),
            other => Err(CorrectionError::Configuration(format!(
                "unsupported granularity '{}'",
                other
            ))),
        }
    }
}

/// Unit used to express the spacing between consecutive rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    #[default]
    Hour,
}

impl TimeUnit {
    /// Length of one unit in seconds.
    pub fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Second => 1.0,
            TimeUnit::Minute => 60.0,
            TimeUnit::Hour => 3600.0,
        }
    }
}

/// Parse a timestamp into UTC.
///
/// Accepts RFC 3339 (offsets are converted), `"%Y-%m-%d %H:%M:%S"` and bare
/// dates, the latter two interpreted as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::default())));
    }
    Err(CorrectionError::TimestampError(format!(
        "invalid timestamp '{}'",
        s
    )))
}

/// Position of `timestamp` within its year, in `[0, 1)`.
pub fn position_in_year(timestamp: &DateTime<Utc>) -> f64 {
    let year_length = if NaiveDate::from_ymd_opt(timestamp.year(), 2, 29).is_some() {
        366.0
    } else {
        365.0
    };
    let seconds_of_day = timestamp.num_seconds_from_midnight() as f64;
    (timestamp.ordinal0() as f64 + seconds_of_day / 86_400.0) / year_length
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn period_start_truncates() {
        // 2024-03-14 is a Thursday
        let t = ts(2024, 3, 14, 17, 45);
        assert_eq!(Granularity::Hour.period_start(&t), ts(2024, 3, 14, 17, 0));
        assert_eq!(Granularity::Day.period_start(&t), ts(2024, 3, 14, 0, 0));
        assert_eq!(Granularity::Week.period_start(&t), ts(2024, 3, 11, 0, 0));
        assert_eq!(Granularity::Month.period_start(&t), ts(2024, 3, 1, 0, 0));
        assert_eq!(Granularity::Year.period_start(&t), ts(2024, 1, 1, 0, 0));
    }

    #[test]
    fn instant_keys_are_cyclic() {
        let t = ts(2024, 3, 14, 17, 30);
        assert_eq!(Granularity::Hour.instant_key(&t).unwrap(), 17 * 60 + 30);
        assert_eq!(Granularity::Day.instant_key(&t).unwrap(), 3);
        assert_eq!(Granularity::Month.instant_key(&t).unwrap(), 3);
        assert!(matches!(
            Granularity::Year.instant_key(&t),
            Err(CorrectionError::Configuration(_))
        ));
    }

    #[test]
    fn granularity_from_str() {
        assert_eq!("Hour".parse::<Granularity>().unwrap(), Granularity::Hour);
        assert_eq!(" month ".parse::<Granularity>().unwrap(), Granularity::Month);
        assert!("fortnight".parse::<Granularity>().is_err());
    }

    #[test]
    fn parse_timestamp_formats() {
        let expected = ts(2023, 6, 1, 12, 0);
        assert_eq!(parse_timestamp("2023-06-01 12:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2023-06-01T14:00:00+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2023-06-01").unwrap(), ts(2023, 6, 1, 0, 0));
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(CorrectionError::TimestampError(_))
        ));
    }

    #[test]
    fn position_in_year_bounds() {
        assert_relative_eq!(position_in_year(&ts(2023, 1, 1, 0, 0)), 0.0);
        assert_relative_eq!(position_in_year(&ts(2023, 7, 2, 12, 0)), 182.5 / 365.0);
        assert!(position_in_year(&ts(2024, 12, 31, 23, 59)) < 1.0);
    }
}
