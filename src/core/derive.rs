//! Covariate derivation: calendar features, degree days and lagged variables.

use crate::core::calendar::{position_in_year, Granularity};
use crate::core::formula::{is_shifted, shifted_base};
use crate::core::frame::{TimeseriesFrame, INSTANT_COLUMN};
use crate::error::{CorrectionError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Synthesises covariates a model needs but the input frame lacks.
pub trait CovariateDeriver: Send + Sync + fmt::Debug {
    /// Return `frame` extended with every name of `required` this deriver can
    /// build. Columns already present are left untouched and names it cannot
    /// build are skipped.
    ///
    /// `is_fitting` tells whether the frame carries the response.
    fn derive(
        &self,
        frame: &TimeseriesFrame,
        required: &[&str],
        is_fitting: bool,
    ) -> Result<TimeseriesFrame>;

    /// Clone into a boxed trait object.
    fn box_clone(&self) -> Box<dyn CovariateDeriver>;

    /// Like [`derive`](Self::derive) but fails with `UnderivableVariable`
    /// naming whatever is still absent.
    fn derive_strict(
        &self,
        frame: &TimeseriesFrame,
        required: &[&str],
        is_fitting: bool,
    ) -> Result<TimeseriesFrame> {
        let derived = self.derive(frame, required, is_fitting)?;
        let missing: Vec<String> = required
            .iter()
            .filter(|name| !derived.has_column(name))
            .map(|name| name.to_string())
            .collect();
        if missing.is_empty() {
            Ok(derived)
        } else {
            Err(CorrectionError::UnderivableVariable(missing))
        }
    }
}

impl Clone for Box<dyn CovariateDeriver> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Add the `instant` key column for `granularity`.
pub fn compute_instant(
    frame: &TimeseriesFrame,
    granularity: Granularity,
) -> Result<TimeseriesFrame> {
    let keys = frame
        .timestamps()
        .iter()
        .map(|t| granularity.instant_key(t).map(|k| k as f64))
        .collect::<Result<Vec<_>>>()?;
    frame.clone().with_column(INSTANT_COLUMN, keys)
}

/// Default deriver for calendar features, degree days and lags.
///
/// Recognised names: `hour`, `minute_of_day`, `weekday` (Monday = 0),
/// `month`, `day_of_year`, `year`, `posan`, `is_weekend`, `holiday`, `hdd`,
/// `cdd` and `<var>_shifted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarDeriver {
    /// Lag applied to `<var>_shifted` variables, in hours.
    shift_hours: f64,
    /// Column degree days are computed from.
    temperature_column: String,
    /// Heating degree days threshold.
    heating_threshold: f64,
    /// Cooling degree days threshold.
    cooling_threshold: f64,
    #[serde(default)]
    holidays: Vec<NaiveDate>,
}

impl Default for CalendarDeriver {
    fn default() -> Self {
        Self {
            shift_hours: 168.0,
            temperature_column: "temperature".to_string(),
            heating_threshold: 15.0,
            cooling_threshold: 18.0,
            holidays: Vec::new(),
        }
    }
}

impl CalendarDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lag of shifted variables. Must be positive and finite.
    pub fn with_shift_hours(mut self, hours: f64) -> Result<Self> {
        if !(hours.is_finite() && hours > 0.0) {
            return Err(CorrectionError::Configuration(format!(
                "shift must be a positive number of hours, got {}",
                hours
            )));
        }
        self.shift_hours = hours;
        Ok(self)
    }

    /// Configure degree days computation.
    pub fn with_degree_days(
        mut self,
        temperature_column: impl Into<String>,
        heating_threshold: f64,
        cooling_threshold: f64,
    ) -> Self {
        self.temperature_column = temperature_column.into();
        self.heating_threshold = heating_threshold;
        self.cooling_threshold = cooling_threshold;
        self
    }

    pub fn with_holidays(mut self, holidays: Vec<NaiveDate>) -> Self {
        self.holidays = holidays;
        self
    }

    pub fn shift_hours(&self) -> f64 {
        self.shift_hours
    }

    fn calendar_feature(&self, name: &str, t: &DateTime<Utc>) -> Option<f64> {
        let value = match name {
            "hour" => t.hour() as f64,
            "minute_of_day" => (t.hour() * 60 + t.minute()) as f64,
            "weekday" => t.weekday().num_days_from_monday() as f64,
            "month" => t.month() as f64,
            "day_of_year" => t.ordinal() as f64,
            "year" => t.year() as f64,
            "posan" => position_in_year(t),
            "is_weekend" => indicator(matches!(t.weekday(), Weekday::Sat | Weekday::Sun)),
            "holiday" => indicator(self.holidays.contains(&t.date_naive())),
            _ => return None,
        };
        Some(value)
    }

    fn degree_days(&self, name: &str, frame: &TimeseriesFrame) -> Option<Vec<f64>> {
        let temperature = frame.get_column(&self.temperature_column)?;
        let values = match name {
            "hdd" => temperature
                .iter()
                .map(|t| (self.heating_threshold - t).max(0.0))
                .collect(),
            "cdd" => temperature
                .iter()
                .map(|t| (t - self.cooling_threshold).max(0.0))
                .collect(),
            _ => return None,
        };
        Some(values)
    }

    /// Value of `base` one shift earlier, looked up by timestamp.
    fn shifted(&self, base: &str, frame: &TimeseriesFrame) -> Option<Vec<f64>> {
        let values = frame.get_column(base)?;
        let mut by_time: HashMap<DateTime<Utc>, f64> = HashMap::with_capacity(frame.len());
        for (t, v) in frame.timestamps().iter().zip(values) {
            by_time.entry(*t).or_insert(*v);
        }
        let lag = Duration::seconds((self.shift_hours * 3600.0).round() as i64);
        Some(
            frame
                .timestamps()
                .iter()
                .map(|t| by_time.get(&(*t - lag)).copied().unwrap_or(f64::NAN))
                .collect(),
        )
    }
}

impl CovariateDeriver for CalendarDeriver {
    fn derive(
        &self,
        frame: &TimeseriesFrame,
        required: &[&str],
        is_fitting: bool,
    ) -> Result<TimeseriesFrame> {
        let mut derived = frame.clone();
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|name| !frame.has_column(name))
            .collect();

        // Lags read the frame as extended by this pass.
        let (lagged, direct): (Vec<&str>, Vec<&str>) =
            missing.into_iter().partition(|name| is_shifted(name));

        for name in direct {
            if let Some(values) = self.degree_days(name, &derived) {
                derived.set_column(name, values)?;
                continue;
            }
            if name_is_calendar(name) {
                let values = derived
                    .timestamps()
                    .iter()
                    .filter_map(|t| self.calendar_feature(name, t))
                    .collect();
                derived.set_column(name, values)?;
            } else {
                tracing::debug!(variable = name, is_fitting, "no derivation rule");
            }
        }

        for name in lagged {
            let Some(base) = shifted_base(name) else {
                continue;
            };
            match self.shifted(base, &derived) {
                Some(values) => derived.set_column(name, values)?,
                None => tracing::debug!(variable = name, base, is_fitting, "lag base absent"),
            }
        }

        Ok(derived)
    }

    fn box_clone(&self) -> Box<dyn CovariateDeriver> {
        Box::new(self.clone())
    }
}

fn name_is_calendar(name: &str) -> bool {
    matches!(
        name,
        "hour"
            | "minute_of_day"
            | "weekday"
            | "month"
            | "day_of_year"
            | "year"
            | "posan"
            | "is_weekend"
            | "holiday"
    )
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn hourly(n: usize) -> TimeseriesFrame {
        let base = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(); // Friday
        let timestamps = (0..n).map(|i| base + Duration::hours(i as i64)).collect();
        TimeseriesFrame::new(timestamps)
            .with_column("temperature", (0..n).map(|i| i as f64).collect())
            .unwrap()
    }

    #[test]
    fn derives_calendar_features() {
        let frame = hourly(48);
        let holiday = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        let deriver = CalendarDeriver::new().with_holidays(vec![holiday]);
        let derived = deriver
            .derive(&frame, &["hour", "weekday", "is_weekend", "holiday", "month"], true)
            .unwrap();

        assert_eq!(derived.column("hour").unwrap()[25], 1.0);
        assert_eq!(derived.column("weekday").unwrap()[0], 4.0);
        assert_eq!(derived.column("weekday").unwrap()[24], 5.0);
        assert_eq!(derived.column("is_weekend").unwrap()[0], 0.0);
        assert_eq!(derived.column("is_weekend").unwrap()[30], 1.0);
        assert_eq!(derived.column("holiday").unwrap()[30], 1.0);
        assert_eq!(derived.column("holiday").unwrap()[3], 0.0);
        assert_eq!(derived.column("month").unwrap()[0], 1.0);
    }

    #[test]
    fn derives_degree_days() {
        let frame = hourly(25);
        let derived = CalendarDeriver::new()
            .derive(&frame, &["hdd", "cdd"], false)
            .unwrap();
        assert_relative_eq!(derived.column("hdd").unwrap()[10], 5.0);
        assert_relative_eq!(derived.column("hdd").unwrap()[20], 0.0);
        assert_relative_eq!(derived.column("cdd").unwrap()[20], 2.0);
        assert_relative_eq!(derived.column("cdd").unwrap()[10], 0.0);
    }

    #[test]
    fn derives_lags_by_timestamp() {
        let frame = hourly(30);
        let deriver = CalendarDeriver::new().with_shift_hours(24.0).unwrap();
        let derived = deriver
            .derive(&frame, &["temperature_shifted"], true)
            .unwrap();
        let lagged = derived.column("temperature_shifted").unwrap();
        assert!(lagged[..24].iter().all(|v| v.is_nan()));
        assert_relative_eq!(lagged[24], 0.0);
        assert_relative_eq!(lagged[29], 5.0);
    }

    #[test]
    fn lags_of_derived_variables_in_one_pass() {
        let frame = hourly(30);
        let deriver = CalendarDeriver::new().with_shift_hours(1.0).unwrap();
        let derived = deriver.derive(&frame, &["hour", "hour_shifted"], true).unwrap();
        assert_relative_eq!(derived.column("hour_shifted").unwrap()[5], 4.0);
    }

    #[test]
    fn lag_without_base_is_skipped() {
        let frame = hourly(30);
        let derived = CalendarDeriver::new()
            .derive(&frame, &["hdd_shifted"], true)
            .unwrap();
        assert!(!derived.has_column("hdd_shifted"));
    }

    #[test]
    fn existing_columns_are_untouched() {
        let frame = hourly(3).with_column("hour", vec![9.0, 9.0, 9.0]).unwrap();
        let derived = CalendarDeriver::new().derive(&frame, &["hour"], true).unwrap();
        assert_eq!(derived.column("hour").unwrap(), &[9.0, 9.0, 9.0]);
    }

    #[test]
    fn strict_derivation_names_failures() {
        let frame = hourly(3);
        let err = CalendarDeriver::new()
            .derive_strict(&frame, &["hour", "pressure"], true)
            .unwrap_err();
        assert_eq!(err, CorrectionError::UnderivableVariable(vec!["pressure".into()]));
    }

    #[test]
    fn instant_column() {
        let frame = compute_instant(&hourly(26), Granularity::Hour).unwrap();
        assert_eq!(frame.column(INSTANT_COLUMN).unwrap()[25], 60.0);
        assert!(compute_instant(&hourly(2), Granularity::Year).is_err());
    }

    #[test]
    fn invalid_shift_is_rejected() {
        assert!(CalendarDeriver::new().with_shift_hours(0.0).is_err());
        assert!(CalendarDeriver::new().with_shift_hours(f64::NAN).is_err());
    }
}
