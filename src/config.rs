//! Featurization configuration.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{FeaturizeError, Result};
use crate::offset::Offset;

pub const DUMMY_GRAIN_COLUMN: &str = "_automl_dummy_grain_col";
pub const ORIGIN_COLUMN: &str = "origin";
pub const HORIZON_COLUMN: &str = "horizon_origin";
pub const ROW_IMPUTED_COLUMN: &str = "row_imputed";
pub const TARGET_IMPUTED_COLUMN: &str = "target_imputed";
pub const OCCURRENCE_ORIGIN_COLUMN: &str = "origin_occurrence";

pub const RESERVED_COLUMNS: [&str; 6] = [
    DUMMY_GRAIN_COLUMN,
    ORIGIN_COLUMN,
    HORIZON_COLUMN,
    ROW_IMPUTED_COLUMN,
    TARGET_IMPUTED_COLUMN,
    OCCURRENCE_ORIGIN_COLUMN,
];

/// A value or the keyword `auto`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting<T> {
    Auto,
    Value(T),
}

impl<T> Setting<T> {
    pub fn is_auto(&self) -> bool {
        matches!(self, Setting::Auto)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Setting::Auto => None,
            Setting::Value(v) => Some(v),
        }
    }
}

impl<T: Serialize> Serialize for Setting<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Setting::Auto => serializer.serialize_str("auto"),
            Setting::Value(v) => v.serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SettingRepr<T> {
    Keyword(String),
    Value(T),
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Setting<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match SettingRepr::<T>::deserialize(deserializer)? {
            SettingRepr::Keyword(word) if word.eq_ignore_ascii_case("auto") => Ok(Setting::Auto),
            SettingRepr::Keyword(word) => Err(D::Error::custom(format!(
                "expected a value or \"auto\", got {word:?}"
            ))),
            SettingRepr::Value(v) => Ok(Setting::Value(v)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StlMode {
    #[default]
    None,
    Season,
    SeasonTrend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortSeriesHandling {
    #[default]
    Drop,
    Pad,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LagMode {
    #[default]
    Auto,
    ByTime,
    ByOccurrence,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    #[default]
    Ffill,
    Mean,
    Median,
    Mode,
    Constant(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnPurpose {
    Numeric,
    Categorical,
    Datetime,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnOverride {
    Numeric,
    Categorical,
    Datetime,
    Drop,
    Impute(ImputeStrategy),
}

impl ColumnOverride {
    pub fn purpose(&self) -> Option<ColumnPurpose> {
        match self {
            ColumnOverride::Numeric | ColumnOverride::Impute(_) => Some(ColumnPurpose::Numeric),
            ColumnOverride::Categorical => Some(ColumnPurpose::Categorical),
            ColumnOverride::Datetime => Some(ColumnPurpose::Datetime),
            ColumnOverride::Drop => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollingFunction {
    Sum,
    Mean,
    Min,
    Max,
    Std,
    Median,
    Quantile(f64),
}

impl RollingFunction {
    pub fn label(&self) -> String {
        match self {
            RollingFunction::Sum => "sum".to_string(),
            RollingFunction::Mean => "mean".to_string(),
            RollingFunction::Min => "min".to_string(),
            RollingFunction::Max => "max".to_string(),
            RollingFunction::Std => "std".to_string(),
            RollingFunction::Median => "median".to_string(),
            RollingFunction::Quantile(q) => format!("quantile{}", (q * 100.0).round() as i64),
        }
    }
}

fn default_max_horizon() -> Setting<usize> {
    Setting::Value(1)
}

fn default_window() -> Setting<usize> {
    Setting::Value(0)
}

fn default_seasonality() -> Setting<usize> {
    Setting::Auto
}

fn default_rolling_functions() -> Vec<RollingFunction> {
    vec![
        RollingFunction::Min,
        RollingFunction::Max,
        RollingFunction::Mean,
    ]
}

fn default_true() -> bool {
    true
}

fn default_seed() -> u64 {
    42
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeSeriesConfig {
    pub time_column_name: String,
    #[serde(default)]
    pub time_series_id_column_names: Vec<String>,
    pub target_column_name: String,
    #[serde(default = "default_max_horizon")]
    pub max_horizon: Setting<usize>,
    #[serde(default)]
    pub target_lags: Option<Setting<Vec<usize>>>,
    #[serde(default = "default_window")]
    pub target_rolling_window_size: Setting<usize>,
    #[serde(default = "default_rolling_functions")]
    pub target_rolling_window_functions: Vec<RollingFunction>,
    #[serde(default = "default_seasonality")]
    pub seasonality: Setting<usize>,
    #[serde(default)]
    pub use_stl: StlMode,
    #[serde(default)]
    pub country_or_region: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub drop_column_names: Vec<String>,
    #[serde(default)]
    pub featurization_overrides: BTreeMap<String, ColumnOverride>,
    #[serde(default)]
    pub short_series_handling: ShortSeriesHandling,
    #[serde(default)]
    pub target_imputation: ImputeStrategy,
    #[serde(default)]
    pub cv_folds: usize,
    #[serde(default)]
    pub lag_mode: LagMode,
    #[serde(default = "default_true")]
    pub keep_target_imputation_marker: bool,
    #[serde(default)]
    pub allow_column_overwrite: bool,
    #[serde(default = "default_seed")]
    pub random_seed: u64,
}

impl TimeSeriesConfig {
    pub fn new(time_column_name: impl Into<String>, target_column_name: impl Into<String>) -> Self {
        Self {
            time_column_name: time_column_name.into(),
            time_series_id_column_names: Vec::new(),
            target_column_name: target_column_name.into(),
            max_horizon: default_max_horizon(),
            target_lags: None,
            target_rolling_window_size: default_window(),
            target_rolling_window_functions: default_rolling_functions(),
            seasonality: default_seasonality(),
            use_stl: StlMode::None,
            country_or_region: None,
            frequency: None,
            drop_column_names: Vec::new(),
            featurization_overrides: BTreeMap::new(),
            short_series_handling: ShortSeriesHandling::Drop,
            target_imputation: ImputeStrategy::Ffill,
            cv_folds: 0,
            lag_mode: LagMode::Auto,
            keep_target_imputation_marker: true,
            allow_column_overwrite: false,
            random_seed: default_seed(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parsed_frequency(&self) -> Result<Option<Offset>> {
        self.frequency.as_deref().map(Offset::from_str).transpose()
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(FeaturizeError::InvalidConfig(msg));
        if self.time_column_name.trim().is_empty() {
            return invalid("time_column_name must not be empty".to_string());
        }
        if self.target_column_name.trim().is_empty() {
            return invalid("target_column_name must not be empty".to_string());
        }
        if self.time_column_name == self.target_column_name {
            return invalid("time and target columns must differ".to_string());
        }

        let mut seen = HashSet::new();
        for id in &self.time_series_id_column_names {
            if !seen.insert(id.as_str()) {
                return invalid(format!("duplicate series-id column {id}"));
            }
            if RESERVED_COLUMNS.contains(&id.as_str()) {
                return invalid(format!("series-id column {id} uses a reserved name"));
            }
            if id == &self.time_column_name || id == &self.target_column_name {
                return invalid(format!(
                    "series-id column {id} duplicates the time or target column"
                ));
            }
            if self.drop_column_names.contains(id) {
                return invalid(format!("series-id column {id} cannot be dropped"));
            }
        }

        if self.max_horizon == Setting::Value(0) {
            return invalid("max_horizon must be positive".to_string());
        }
        if self.seasonality == Setting::Value(0) {
            return invalid("seasonality must be positive".to_string());
        }
        for f in &self.target_rolling_window_functions {
            if let RollingFunction::Quantile(q) = f {
                if !(0.0..=1.0).contains(q) {
                    return invalid(format!("rolling quantile {q} is outside [0, 1]"));
                }
            }
        }
        self.parsed_frequency()?;

        for column in self.featurization_overrides.keys() {
            if column == &self.time_column_name {
                return invalid(format!(
                    "featurization override on the time column {column} is not allowed"
                ));
            }
            if column == &self.target_column_name {
                return invalid(format!(
                    "featurization override on the target column {column} is not allowed"
                ));
            }
        }
        Ok(())
    }

    /// Explicit lag list, empty when lags are disabled or automatic.
    pub fn fixed_lags(&self) -> Vec<usize> {
        match &self.target_lags {
            Some(Setting::Value(lags)) => lags.clone(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_auto_and_values() {
        let cfg = TimeSeriesConfig::from_json(
            r#"{
                "time_column_name": "date",
                "target_column_name": "sales",
                "time_series_id_column_names": ["store"],
                "max_horizon": "auto",
                "target_lags": [1, 7],
                "target_rolling_window_functions": ["mean", {"quantile": 0.9}],
                "use_stl": "season_trend",
                "featurization_overrides": {"promo": "categorical", "price": {"impute": "median"}}
            }"#,
        )
        .expect("valid config");

        assert!(cfg.max_horizon.is_auto());
        assert_eq!(cfg.fixed_lags(), vec![1, 7]);
        assert_eq!(cfg.use_stl, StlMode::SeasonTrend);
        assert_eq!(
            cfg.featurization_overrides.get("price"),
            Some(&ColumnOverride::Impute(ImputeStrategy::Median))
        );
        assert_eq!(cfg.target_rolling_window_functions[1].label(), "quantile90");
        assert_eq!(cfg.random_seed, 42);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = TimeSeriesConfig::from_json(
            r#"{"time_column_name": "date", "target_column_name": "y", "lags": [1]}"#,
        )
        .expect_err("unknown key");
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn validation_rules() {
        let mut cfg = TimeSeriesConfig::new("date", "y");
        cfg.max_horizon = Setting::Value(0);
        assert!(cfg.validate().is_err());

        let mut cfg = TimeSeriesConfig::new("date", "y");
        cfg.time_series_id_column_names = vec!["origin".to_string()];
        assert!(cfg.validate().is_err());

        let mut cfg = TimeSeriesConfig::new("date", "y");
        cfg.frequency = Some("fortnightly".to_string());
        assert!(cfg.validate().is_err());

        let mut cfg = TimeSeriesConfig::new("date", "y");
        cfg.featurization_overrides
            .insert("date".to_string(), ColumnOverride::Categorical);
        assert!(cfg.validate().is_err());

        assert!(TimeSeriesConfig::new("date", "y").validate().is_ok());
    }

    #[test]
    fn auto_keyword_is_case_insensitive_and_strict() {
        let parsed: Setting<usize> = serde_json::from_str("\"AUTO\"").expect("auto");
        assert_eq!(parsed, Setting::Auto);
        assert!(serde_json::from_str::<Setting<usize>>("\"sometimes\"").is_err());
        assert_eq!(serde_json::to_string(&Setting::Value(3usize)).expect("json"), "3");
    }
}
