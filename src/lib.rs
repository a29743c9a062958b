//! Time-series featurization for multi-series forecasting.
//!
//! A `TimeSeriesTransformer` is fit on a training panel and then reapplied to
//! scoring panels, producing the same locked column schema each time:
//! - frequency inference, gap filling and target imputation
//! - calendar, holiday, series-id and categorical features
//! - horizon expansion with explicit origin times
//! - lag, lead, rolling-window and STL features without future leakage

mod calendar;
mod categorical;
mod config;
mod datetime_features;
mod drop_columns;
mod error;
mod frame;
mod frequency;
mod gap_fill;
mod grain_features;
mod heuristics;
mod holidays;
mod holt_winters;
mod io;
mod lag_lead;
mod lookback;
mod max_horizon;
mod numeric_imputer;
mod observability;
mod offset;
mod optimize;
mod pipeline;
mod restore_dtypes;
mod rolling_window;
mod schema;
mod short_series;
mod stats;
mod stl;
mod stl_featurizer;
mod time_index;
mod transformer;
mod warnings;

pub use calendar::{has_intraday_component, CalendarFeature};
pub use categorical::{
    CategoricalFeaturizer, CategoryBinarizer, Numericalizer, MAX_ONE_HOT_CATEGORIES, NAN_CATEGORY,
    UNSEEN_CODE,
};
pub use config::{
    ColumnOverride, ColumnPurpose, ImputeStrategy, LagMode, RollingFunction, Setting,
    ShortSeriesHandling, StlMode, TimeSeriesConfig, DUMMY_GRAIN_COLUMN, HORIZON_COLUMN,
    OCCURRENCE_ORIGIN_COLUMN, ORIGIN_COLUMN, RESERVED_COLUMNS, ROW_IMPUTED_COLUMN,
    TARGET_IMPUTED_COLUMN,
};
pub use datetime_features::DatetimeColumnFeaturizer;
pub use drop_columns::DropColumns;
pub use error::{ErrorKind, FeaturizeError, Result};
pub use frame::{Column, DType, Panel, SeriesKey, Table};
pub use frequency::{
    grid_coverage, infer_series, FrequencyInferencer, FrequencyReport, SeriesFrequency,
    MIN_COVERAGE,
};
pub use gap_fill::{DatetimeGapFiller, SeriesBounds};
pub use grain_features::{GrainIndexFeaturizer, GRAIN_PREFIX, GRAIN_SEPARATOR};
pub use heuristics::{pacf_orders, AutoSettings, HeuristicAdvisor, PacfSelection};
pub use holidays::{easter_sunday, Country, Holiday};
pub use holt_winters::{SmoothingFit, SmoothingSpec, TrendKind};
pub use io::{parse_datetime, read_table, read_table_csv, ColumnTypes};
pub use lag_lead::LagLeadOperator;
pub use lookback::LookbackMode;
pub use max_horizon::{expand_horizons, MaxHorizonFeaturizer};
pub use numeric_imputer::{NumericImputer, WASNULL_SUFFIX};
pub use observability::{init_logging, log_warnings, LogFormat, LoggingConfig, LoggingInitError};
pub use offset::{Offset, OffsetUnit};
pub use pipeline::{Pipeline, StepName, Transformer};
pub use restore_dtypes::RestoreDtypes;
pub use rolling_window::{Aggregation, RollingWindow, Window};
pub use schema::{assert_schema_compatible, schema_fingerprint, FeatureSchema, SchemaColumn};
pub use short_series::{min_points, ShortSeriesDropper};
pub use stl::{pad_seasonal_naive, Stl, StlResult};
pub use stl_featurizer::StlFeaturizer;
pub use time_index::{TimeIndexFeaturizer, HOLIDAY_COLUMN, PAID_TIME_OFF_COLUMN};
pub use transformer::{
    FeatureSummary, FitState, PipelineKind, ResolvedSettings, TimeSeriesTransformer, Transformed,
    OCCURRENCE_MODE_THRESHOLD,
};
pub use warnings::{FeaturizeWarning, WarningSet};
