//! Soft conditions returned next to featurized output.

use std::fmt;

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FeaturizeWarning {
    ColumnOverwrite { column: String },
    UnseenCategories { column: String, values: Vec<String> },
    StlPadded { series: String, observed: usize, padded_to: usize },
    StlFallback { series: String, reason: String },
    LagModeSelected { mode: String, imputed_fraction: f64 },
    CacheBackfill { series: String, filled: usize },
    TooSeasonal { series: String },
    SeriesDropped { series: Vec<String>, required: usize },
    SeriesPadded { series: String, added: usize },
    RowsOutOfPhase { dropped: usize },
    ReservedColumnNotDropped { column: String },
    HorizonBeyondMax { rows: usize, max_horizon: usize },
    UnsupportedCountry { country: String },
    UnknownSeries { series: String },
}

impl FeaturizeWarning {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ColumnOverwrite { .. } => "column_overwrite",
            Self::UnseenCategories { .. } => "unseen_categories",
            Self::StlPadded { .. } => "stl_padded",
            Self::StlFallback { .. } => "stl_fallback",
            Self::LagModeSelected { .. } => "lag_mode_selected",
            Self::CacheBackfill { .. } => "cache_backfill",
            Self::TooSeasonal { .. } => "too_seasonal",
            Self::SeriesDropped { .. } => "series_dropped",
            Self::SeriesPadded { .. } => "series_padded",
            Self::RowsOutOfPhase { .. } => "rows_out_of_phase",
            Self::ReservedColumnNotDropped { .. } => "reserved_column_not_dropped",
            Self::HorizonBeyondMax { .. } => "horizon_beyond_max",
            Self::UnsupportedCountry { .. } => "unsupported_country",
            Self::UnknownSeries { .. } => "unknown_series",
        }
    }
}

impl fmt::Display for FeaturizeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColumnOverwrite { column } => write!(f, "column {column} was overwritten"),
            Self::UnseenCategories { column, values } => write!(
                f,
                "column {column} has categories unseen at fit, treated as missing: {values:?}"
            ),
            Self::StlPadded {
                series,
                observed,
                padded_to,
            } => write!(
                f,
                "series {series} has {observed} points; padded to {padded_to} by seasonal repetition"
            ),
            Self::StlFallback { series, reason } => {
                write!(f, "series {series} skipped STL decomposition: {reason}")
            }
            Self::LagModeSelected {
                mode,
                imputed_fraction,
            } => write!(
                f,
                "lookback features built {mode} (imputed target fraction {imputed_fraction:.4})"
            ),
            Self::CacheBackfill { series, filled } => {
                write!(f, "lookback cache for {series} backfilled {filled} values")
            }
            Self::TooSeasonal { series } => write!(
                f,
                "series {series} is too seasonal for PACF lag selection; lags disabled"
            ),
            Self::SeriesDropped { series, required } => write!(
                f,
                "{} series dropped for having fewer than {required} points",
                series.len()
            ),
            Self::SeriesPadded { series, added } => {
                write!(f, "series {series} padded with {added} rows")
            }
            Self::RowsOutOfPhase { dropped } => {
                write!(f, "{dropped} rows off the training grid were dropped")
            }
            Self::ReservedColumnNotDropped { column } => {
                write!(f, "reserved column {column} cannot be dropped")
            }
            Self::HorizonBeyondMax { rows, max_horizon } => write!(
                f,
                "{rows} scoring rows lie beyond the max horizon {max_horizon}"
            ),
            Self::UnsupportedCountry { country } => write!(
                f,
                "no holiday calendar for {country}; holiday features skipped"
            ),
            Self::UnknownSeries { series } => {
                write!(f, "series {series} was not seen during fit")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WarningSet {
    items: Vec<FeaturizeWarning>,
}

impl WarningSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: FeaturizeWarning) {
        debug!(
            component = "warnings",
            event = "warning.raised",
            code = warning.code(),
            message = %warning
        );
        self.items.push(warning);
    }

    pub fn extend(&mut self, other: WarningSet) {
        self.items.extend(other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeaturizeWarning> {
        self.items.iter()
    }

    pub fn contains_code(&self, code: &str) -> bool {
        self.items.iter().any(|w| w.code() == code)
    }
}

impl IntoIterator for WarningSet {
    type Item = FeaturizeWarning;
    type IntoIter = std::vec::IntoIter<FeaturizeWarning>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
