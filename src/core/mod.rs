//! Core data structures: frames, formulas, calendars and covariate derivation.

pub mod calendar;
pub mod derive;
mod filter;
mod formula;
mod frame;

pub use calendar::{parse_timestamp, Granularity, TimeUnit};
pub use derive::{compute_instant, CalendarDeriver, CovariateDeriver};
pub(crate) use filter::quantile_sorted;
pub use filter::{OutlierFilter, ThresholdSide};
pub use formula::{is_shifted, shifted_base, Formula, Term, SHIFTED_SUFFIX};
pub use frame::{JoinKind, TimeseriesFrame, CORRECTED_COLUMN, INSTANT_COLUMN, RESPONSE_COLUMN};
