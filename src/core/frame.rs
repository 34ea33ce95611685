//! TimeseriesFrame: timestamped rows with named numeric columns.

use crate::core::calendar::{Granularity, TimeUnit};
use crate::error::{CorrectionError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Name of the response column in every outputs frame.
pub const RESPONSE_COLUMN: &str = "y";
/// Name of the derived instant-group key column.
pub const INSTANT_COLUMN: &str = "instant";
/// Name of the column added by correction operators.
pub const CORRECTED_COLUMN: &str = "y_climate_corrected";

/// How rows without a matching timestamp are treated by [`TimeseriesFrame::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// Keep only timestamps present on both sides.
    #[default]
    Inner,
    /// Keep every left row; unmatched right columns are NaN.
    Left,
}

/// A table of timestamped rows with named `f64` columns.
///
/// Timestamps are stored in UTC. Rows keep insertion order and timestamps
/// may repeat until [`deduplicated`](Self::deduplicated) is called.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeseriesFrame {
    timestamps: Vec<DateTime<Utc>>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl TimeseriesFrame {
    /// Create a frame with timestamps and no value columns.
    pub fn new(timestamps: Vec<DateTime<Utc>>) -> Self {
        Self {
            timestamps,
            columns: BTreeMap::new(),
        }
    }

    /// Create a frame from timestamps in any timezone, normalised to UTC.
    pub fn from_local<Tz: TimeZone>(timestamps: Vec<DateTime<Tz>>) -> Self {
        Self::new(
            timestamps
                .into_iter()
                .map(|t| t.with_timezone(&Utc))
                .collect(),
        )
    }

    /// Create an outputs frame holding the response column.
    pub fn outputs(timestamps: Vec<DateTime<Utc>>, values: Vec<f64>) -> Result<Self> {
        Self::new(timestamps).with_column(RESPONSE_COLUMN, values)
    }

    /// Add or replace a column, builder style.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.set_column(name, values)?;
        Ok(self)
    }

    /// Add or replace a column.
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        if values.len() != self.len() {
            return Err(CorrectionError::DimensionMismatch {
                expected: self.len(),
                got: values.len(),
            });
        }
        self.columns.insert(name.into(), values);
        Ok(())
    }

    /// Remove a column, returning its values if it existed.
    pub fn remove_column(&mut self, name: &str) -> Option<Vec<f64>> {
        self.columns.remove(name)
    }

    /// Turn a single-value-column frame into an outputs frame by renaming
    /// that column to `y`.
    pub fn into_outputs(mut self) -> Result<Self> {
        if self.columns.len() != 1 {
            return Err(CorrectionError::Configuration(format!(
                "an output series needs exactly one value column, got {}",
                self.columns.len()
            )));
        }
        if let Some((name, values)) = self.columns.pop_first() {
            if name != RESPONSE_COLUMN {
                tracing::debug!(from = %name, "renaming output column to '{}'", RESPONSE_COLUMN);
            }
            self.columns.insert(RESPONSE_COLUMN.to_string(), values);
        }
        Ok(self)
    }

    /// Check the outputs schema: exactly one value column named `y`.
    pub fn validate_outputs(&self) -> Result<()> {
        if !self.has_column(RESPONSE_COLUMN) {
            return Err(CorrectionError::MissingColumn(RESPONSE_COLUMN.to_string()));
        }
        if self.columns.len() != 1 {
            return Err(CorrectionError::Configuration(format!(
                "an output series needs exactly one value column, got {}",
                self.columns.len()
            )));
        }
        Ok(())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if the frame has no rows.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Row timestamps.
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Values of a column, or `MissingColumn`.
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.get_column(name)
            .ok_or_else(|| CorrectionError::MissingColumn(name.to_string()))
    }

    /// Values of a column if present.
    pub fn get_column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Column names in sorted order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    /// Keep only the listed columns.
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        let mut columns = BTreeMap::new();
        for &name in names {
            columns.insert(name.to_string(), self.column(name)?.to_vec());
        }
        Ok(Self {
            timestamps: self.timestamps.clone(),
            columns,
        })
    }

    /// Drop the listed columns; absent names are ignored.
    pub fn without(&self, names: &[&str]) -> Self {
        let columns = self
            .columns
            .iter()
            .filter(|(k, _)| !names.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            timestamps: self.timestamps.clone(),
            columns,
        }
    }

    /// Build a frame from the given row indices, in the given order.
    pub fn take(&self, indices: &[usize]) -> Self {
        let timestamps = indices.iter().map(|&i| self.timestamps[i]).collect();
        let columns = self
            .columns
            .iter()
            .map(|(k, v)| (k.clone(), indices.iter().map(|&i| v[i]).collect()))
            .collect();
        Self {
            timestamps,
            columns,
        }
    }

    /// Keep the rows whose index satisfies `keep`.
    pub fn filter_rows<F>(&self, keep: F) -> Self
    where
        F: Fn(usize) -> bool,
    {
        let indices: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        self.take(&indices)
    }

    /// Rows sorted by timestamp (stable).
    pub fn sorted(&self) -> Self {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.sort_by_key(|&i| self.timestamps[i]);
        self.take(&indices)
    }

    /// Check whether timestamps are non-decreasing.
    pub fn is_sorted(&self) -> bool {
        self.timestamps.windows(2).all(|w| w[0] <= w[1])
    }

    /// Keep the first row of each timestamp.
    pub fn deduplicated(&self) -> Self {
        let mut seen = HashSet::with_capacity(self.len());
        let indices: Vec<usize> = (0..self.len())
            .filter(|&i| seen.insert(self.timestamps[i]))
            .collect();
        self.take(&indices)
    }

    /// Drop rows with NaN/Inf in any of the listed columns.
    ///
    /// Returns the filtered frame and the number of dropped rows.
    pub fn drop_non_finite(&self, names: &[&str]) -> Result<(Self, usize)> {
        let cols = names
            .iter()
            .map(|name| self.column(name))
            .collect::<Result<Vec<_>>>()?;
        let kept = self.filter_rows(|i| cols.iter().all(|c| c[i].is_finite()));
        let dropped = self.len() - kept.len();
        Ok((kept, dropped))
    }

    /// Join with `other` on timestamps.
    ///
    /// Rows keep the left order; a left timestamp matching several right rows
    /// yields one row per match. Value columns present on both sides get the
    /// suffixes `.x` (left) and `.y` (right).
    pub fn merge(&self, other: &TimeseriesFrame, how: JoinKind) -> Self {
        let mut index: HashMap<DateTime<Utc>, Vec<usize>> = HashMap::new();
        for (j, t) in other.timestamps.iter().enumerate() {
            index.entry(*t).or_default().push(j);
        }

        let mut left_rows = Vec::with_capacity(self.len());
        let mut right_rows = Vec::with_capacity(self.len());
        for (i, t) in self.timestamps.iter().enumerate() {
            match index.get(t) {
                Some(matches) => {
                    for &j in matches {
                        left_rows.push(i);
                        right_rows.push(Some(j));
                    }
                }
                None if how == JoinKind::Left => {
                    left_rows.push(i);
                    right_rows.push(None);
                }
                None => {}
            }
        }

        let timestamps = left_rows.iter().map(|&i| self.timestamps[i]).collect();
        let mut columns = BTreeMap::new();
        for (name, values) in &self.columns {
            let key = if other.columns.contains_key(name) {
                format!("{}.x", name)
            } else {
                name.clone()
            };
            columns.insert(key, left_rows.iter().map(|&i| values[i]).collect());
        }
        for (name, values) in &other.columns {
            let key = if self.columns.contains_key(name) {
                format!("{}.y", name)
            } else {
                name.clone()
            };
            let merged = right_rows
                .iter()
                .map(|r| r.map_or(f64::NAN, |j| values[j]))
                .collect();
            columns.insert(key, merged);
        }

        Self {
            timestamps,
            columns,
        }
    }

    /// Restrict `self` and every frame of `others` to their common timestamps.
    ///
    /// The returned frames are row-aligned: row `i` of each has the timestamp
    /// of row `i` of the returned receiver, in the receiver's order. When a
    /// timestamp repeats inside one of `others`, its first row is used.
    pub fn align(&self, others: &[&TimeseriesFrame]) -> Result<(Self, Vec<Self>)> {
        let lookups: Vec<HashMap<DateTime<Utc>, usize>> = others
            .iter()
            .map(|frame| {
                let mut first = HashMap::with_capacity(frame.len());
                for (j, t) in frame.timestamps.iter().enumerate() {
                    first.entry(*t).or_insert(j);
                }
                first
            })
            .collect();

        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| {
                lookups
                    .iter()
                    .all(|lookup| lookup.contains_key(&self.timestamps[i]))
            })
            .collect();
        if keep.is_empty() {
            return Err(CorrectionError::EmptyData);
        }
        if keep.len() < self.len() {
            tracing::warn!(
                dropped = self.len() - keep.len(),
                "rows without a match in every scenario were dropped during alignment"
            );
        }

        let aligned = others
            .iter()
            .zip(&lookups)
            .map(|(frame, lookup)| {
                let rows: Vec<usize> = keep
                    .iter()
                    .map(|&i| lookup[&self.timestamps[i]])
                    .collect();
                frame.take(&rows)
            })
            .collect();

        Ok((self.take(&keep), aligned))
    }

    /// Spacing between the first two rows, expressed in `unit`.
    pub fn granularity(&self, unit: TimeUnit) -> Result<f64> {
        if self.len() < 2 {
            return Err(CorrectionError::InsufficientData {
                needed: 2,
                got: self.len(),
            });
        }
        let delta = self.timestamps[1] - self.timestamps[0];
        let seconds = delta.num_milliseconds() as f64 / 1000.0;
        if seconds <= 0.0 {
            return Err(CorrectionError::TimestampError(
                "cannot infer granularity from non-increasing timestamps".into(),
            ));
        }
        Ok(seconds / unit.seconds())
    }

    /// Average every column per period, one row per period start.
    ///
    /// Non-finite values are ignored; a period without finite values is NaN.
    pub fn aggregate(&self, granularity: Granularity) -> Self {
        let mut groups: BTreeMap<DateTime<Utc>, Vec<usize>> = BTreeMap::new();
        for (i, t) in self.timestamps.iter().enumerate() {
            groups.entry(granularity.period_start(t)).or_default().push(i);
        }

        let timestamps = groups.keys().copied().collect();
        let columns = self
            .columns
            .iter()
            .map(|(name, values)| {
                let means = groups
                    .values()
                    .map(|rows| {
                        let finite: Vec<f64> = rows
                            .iter()
                            .map(|&i| values[i])
                            .filter(|v| v.is_finite())
                            .collect();
                        if finite.is_empty() {
                            f64::NAN
                        } else {
                            finite.iter().sum::<f64>() / finite.len() as f64
                        }
                    })
                    .collect();
                (name.clone(), means)
            })
            .collect();

        Self {
            timestamps,
            columns,
        }
    }
}
