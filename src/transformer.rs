//! Top-level time-series featurizer: pipeline composition and the fit/transform contract.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{
    ColumnOverride, ColumnPurpose, ImputeStrategy, LagMode, Setting, ShortSeriesHandling, StlMode,
    TimeSeriesConfig, DUMMY_GRAIN_COLUMN, OCCURRENCE_ORIGIN_COLUMN, ROW_IMPUTED_COLUMN,
    TARGET_IMPUTED_COLUMN,
};
use crate::categorical::CategoricalFeaturizer;
use crate::datetime_features::DatetimeColumnFeaturizer;
use crate::drop_columns::DropColumns;
use crate::error::{FeaturizeError, Result};
use crate::frame::{Column, DType, Panel, SeriesKey, Table};
use crate::frequency::{FrequencyInferencer, FrequencyReport};
use crate::gap_fill::DatetimeGapFiller;
use crate::grain_features::GrainIndexFeaturizer;
use crate::heuristics::HeuristicAdvisor;
use crate::lag_lead::LagLeadOperator;
use crate::lookback::LookbackMode;
use crate::max_horizon::MaxHorizonFeaturizer;
use crate::numeric_imputer::NumericImputer;
use crate::offset::Offset;
use crate::pipeline::{Pipeline, StepName, Transformer};
use crate::restore_dtypes::RestoreDtypes;
use crate::rolling_window::{Aggregation, RollingWindow, Window};
use crate::schema::FeatureSchema;
use crate::short_series::{min_points, ShortSeriesDropper};
use crate::stl_featurizer::StlFeaturizer;
use crate::time_index::{TimeIndexFeaturizer, HOLIDAY_COLUMN, PAID_TIME_OFF_COLUMN};
use crate::warnings::{FeaturizeWarning, WarningSet};

/// Imputed-target share above which lookbacks switch to counting occurrences.
pub const OCCURRENCE_MODE_THRESHOLD: f64 = 0.02;

const DUMMY_GRAIN_VALUE: &str = "_automl_dummy_grain";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitState {
    Unfit,
    Fitting,
    Fit,
    Transformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineKind {
    /// Every step, from dtype restoration to rolling windows.
    #[default]
    Full,
    /// Only the steps whose output depends on the training split.
    CvReduced,
}

/// Settings after `auto` values have been resolved against the training data.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    pub offset: Offset,
    pub max_horizon: usize,
    pub lags: Vec<usize>,
    pub rolling_window: usize,
    pub seasonality: usize,
    pub lookback_mode: LookbackMode,
}

/// Featurized panel and the soft conditions raised while producing it.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub panel: Panel,
    pub warnings: WarningSet,
}

impl Transformed {
    pub fn to_table(&self) -> Result<Table> {
        self.panel.to_table()
    }
}

/// Engineered columns one step derived from one source column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSummary {
    pub step: StepName,
    pub source_column: String,
    /// `None` for the time, target and series-id columns.
    pub purpose: Option<ColumnPurpose>,
    pub features: Vec<String>,
}

#[derive(Debug)]
struct Fitted {
    grain_columns: Vec<String>,
    input_columns: Vec<String>,
    purposes: BTreeMap<String, ColumnPurpose>,
    frequency: FrequencyReport,
    settings: ResolvedSettings,
    gap_filler: DatetimeGapFiller,
    pipeline: Pipeline,
    schema: FeatureSchema,
}

#[derive(Debug)]
pub struct TimeSeriesTransformer {
    config: TimeSeriesConfig,
    kind: PipelineKind,
    state: FitState,
    fitted: Option<Fitted>,
}

impl TimeSeriesTransformer {
    pub fn new(config: TimeSeriesConfig) -> Result<Self> {
        Self::with_pipeline(config, PipelineKind::Full)
    }

    pub fn with_pipeline(config: TimeSeriesConfig, kind: PipelineKind) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            kind,
            state: FitState::Unfit,
            fitted: None,
        })
    }

    pub fn config(&self) -> &TimeSeriesConfig {
        &self.config
    }

    pub fn pipeline_kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn state(&self) -> FitState {
        self.state
    }

    fn fitted(&self) -> Result<&Fitted> {
        self.fitted.as_ref().ok_or_else(|| {
            FeaturizeError::Internal("the featurizer has not been fit".to_string())
        })
    }

    pub fn settings(&self) -> Result<&ResolvedSettings> {
        Ok(&self.fitted()?.settings)
    }

    pub fn frequency(&self) -> Result<&FrequencyReport> {
        Ok(&self.fitted()?.frequency)
    }

    pub fn schema(&self) -> Result<&FeatureSchema> {
        Ok(&self.fitted()?.schema)
    }

    pub fn grain_columns(&self) -> Result<&[String]> {
        Ok(&self.fitted()?.grain_columns)
    }

    pub fn step_names(&self) -> Result<Vec<StepName>> {
        Ok(self.fitted()?.pipeline.step_names())
    }

    pub fn detected_column_purposes(&self) -> Result<&BTreeMap<String, ColumnPurpose>> {
        Ok(&self.fitted()?.purposes)
    }

    /// Output columns that were not present in the training input.
    pub fn engineered_feature_names(&self) -> Result<Vec<String>> {
        let fitted = self.fitted()?;
        Ok(fitted
            .schema
            .names()
            .into_iter()
            .filter(|name| !fitted.input_columns.contains(name))
            .collect())
    }

    pub fn features_by_step(&self) -> Result<Vec<(StepName, Vec<String>)>> {
        Ok(self.fitted()?.pipeline.features_by_step())
    }

    /// Locked engineered columns grouped by producing step and source column, in pipeline order.
    pub fn featurization_summary(&self) -> Result<Vec<FeatureSummary>> {
        let fitted = self.fitted()?;
        let cfg = &self.config;
        let locked: BTreeSet<String> = fitted.schema.names().into_iter().collect();

        // (name prefix, source column, purpose)
        let mut sources: Vec<(String, String, Option<ColumnPurpose>)> = fitted
            .purposes
            .iter()
            .map(|(name, purpose)| (name.clone(), name.clone(), Some(*purpose)))
            .collect();
        sources.push((
            cfg.target_column_name.clone(),
            cfg.target_column_name.clone(),
            None,
        ));
        for grain in fitted
            .grain_columns
            .iter()
            .filter(|g| g.as_str() != DUMMY_GRAIN_COLUMN)
        {
            sources.push((GrainIndexFeaturizer::feature_name(grain), grain.clone(), None));
        }
        for calendar in [HOLIDAY_COLUMN, PAID_TIME_OFF_COLUMN] {
            sources.push((calendar.to_string(), cfg.time_column_name.clone(), None));
        }

        let mut summary: Vec<FeatureSummary> = Vec::new();
        for (step, features) in fitted.pipeline.features_by_step() {
            for feature in features
                .into_iter()
                .filter(|f| locked.contains(f) && !fitted.input_columns.contains(f))
            {
                let (source, purpose) = match step {
                    StepName::TimeIndex | StepName::MaxHorizon => {
                        (cfg.time_column_name.clone(), None)
                    }
                    _ => sources
                        .iter()
                        .filter(|(prefix, _, _)| {
                            feature == *prefix
                                || feature
                                    .strip_prefix(prefix.as_str())
                                    .is_some_and(|rest| rest.starts_with('_'))
                        })
                        .max_by_key(|(prefix, _, _)| prefix.len())
                        .map(|(_, source, purpose)| (source.clone(), *purpose))
                        .unwrap_or_else(|| (feature.clone(), None)),
                };
                match summary
                    .iter_mut()
                    .find(|s| s.step == step && s.source_column == source)
                {
                    Some(entry) => entry.features.push(feature),
                    None => summary.push(FeatureSummary {
                        step,
                        source_column: source,
                        purpose,
                        features: vec![feature],
                    }),
                }
            }
        }
        Ok(summary)
    }

    pub fn fit(&mut self, table: &Table) -> Result<()> {
        self.fit_transform(table).map(|_| ())
    }

    pub fn fit_transform(&mut self, table: &Table) -> Result<Transformed> {
        self.state = FitState::Fitting;
        self.fitted = None;
        match self.fit_inner(table) {
            Ok((fitted, transformed)) => {
                self.fitted = Some(fitted);
                self.state = FitState::Fit;
                Ok(transformed)
            }
            Err(err) => {
                self.state = FitState::Unfit;
                warn!(
                    component = "featurizer",
                    event = "featurizer.fit.failed",
                    error = %err
                );
                Err(err)
            }
        }
    }

    fn fit_inner(&self, table: &Table) -> Result<(Fitted, Transformed)> {
        let cfg = &self.config;
        let mut warnings = WarningSet::new();
        info!(
            component = "featurizer",
            event = "featurizer.fit.start",
            rows = table.nrows(),
            columns = table.ncols(),
            pipeline = ?self.kind
        );

        table.require(&cfg.time_column_name)?;
        table.require(&cfg.target_column_name)?;
        let input_columns = table.names().to_vec();
        let (table, grain_columns) = self.with_grains(table)?;
        let purposes = self.resolve_purposes(&table)?;
        let table = self.apply_purposes(&table, &purposes)?;

        let mut panel = Panel::from_table(&table, &cfg.time_column_name, &grain_columns)?;
        self.cast_target(&mut panel)?;
        panel.check_unique_index()?;

        let frequency = FrequencyInferencer::new(cfg.parsed_frequency()?).infer(&panel)?;
        let offset = frequency.offset;

        let starts: BTreeMap<SeriesKey, NaiveDateTime> = panel
            .groups()
            .into_iter()
            .filter_map(|(key, rows)| {
                rows.iter()
                    .map(|&r| panel.times()[r])
                    .min()
                    .map(|start| (key, start))
            })
            .collect();
        let (panel, dropped) = phase_filter(&panel, offset, &starts);
        if dropped > 0 {
            warnings.push(FeaturizeWarning::RowsOutOfPhase { dropped });
        }

        let mut gap_filler =
            DatetimeGapFiller::new(cfg.target_column_name.clone(), offset, cfg.target_imputation);
        let panel = gap_filler.fit_transform(&panel)?;

        let settings = self.resolve_settings(&panel, offset, &mut warnings)?;
        let mut pipeline = self.build_pipeline(&purposes, &grain_columns, &settings)?;
        let panel = pipeline.fit_transform(panel, &mut warnings)?;
        let panel = self.finalize(panel, self.kind == PipelineKind::Full)?;
        let schema = FeatureSchema::lock(panel.data());

        info!(
            component = "featurizer",
            event = "featurizer.fit.finish",
            rows = panel.nrows(),
            columns = panel.data().ncols(),
            frequency = %offset,
            max_horizon = settings.max_horizon,
            lags = ?settings.lags,
            rolling_window = settings.rolling_window,
            lookback_mode = settings.lookback_mode.as_str(),
            warnings = warnings.len()
        );
        let fitted = Fitted {
            grain_columns,
            input_columns,
            purposes,
            frequency,
            settings,
            gap_filler,
            pipeline,
            schema,
        };
        Ok((fitted, Transformed { panel, warnings }))
    }

    pub fn transform(&mut self, table: &Table) -> Result<Transformed> {
        if !matches!(self.state, FitState::Fit | FitState::Transformed) {
            return Err(FeaturizeError::Internal(
                "transform called before fit".to_string(),
            ));
        }
        let out = self.transform_inner(table)?;
        self.state = FitState::Transformed;
        Ok(out)
    }

    fn transform_inner(&self, table: &Table) -> Result<Transformed> {
        let cfg = &self.config;
        let fitted = self.fitted()?;
        let mut warnings = WarningSet::new();

        let missing: Vec<String> = fitted
            .input_columns
            .iter()
            .filter(|c| **c != cfg.target_column_name && !table.contains(c))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(FeaturizeError::SchemaMismatch { missing });
        }
        let has_labels = table
            .column(&cfg.target_column_name)
            .map(|c| !c.is_all_null())
            .unwrap_or(false);

        let (table, _) = self.with_grains(table)?;
        let table = self.apply_purposes(&table, &fitted.purposes)?;
        let mut panel = Panel::from_table(&table, &cfg.time_column_name, &fitted.grain_columns)?;
        if has_labels {
            self.cast_target(&mut panel)?;
        } else {
            let n = panel.nrows();
            panel
                .data_mut()
                .insert(cfg.target_column_name.clone(), Column::Float(vec![f64::NAN; n]))?;
        }
        panel.check_unique_index()?;

        let offset = fitted.settings.offset;
        let mut starts: BTreeMap<SeriesKey, NaiveDateTime> = fitted
            .gap_filler
            .bounds()
            .into_iter()
            .map(|(key, b)| (key, b.start))
            .collect();
        for (key, rows) in panel.groups() {
            if let Some(first) = rows.iter().map(|&r| panel.times()[r]).min() {
                starts.entry(key).or_insert(first);
            }
        }
        let input_rows = panel.nrows();
        let (panel, dropped) = phase_filter(&panel, offset, &starts);
        if input_rows > 0 && panel.is_empty() {
            return Err(FeaturizeError::OutOfPhase {
                freq: offset.to_string(),
            });
        }
        if dropped > 0 {
            warn!(
                component = "featurizer",
                event = "featurizer.out_of_phase",
                dropped,
                frequency = %offset
            );
            warnings.push(FeaturizeWarning::RowsOutOfPhase { dropped });
        }

        let panel = if has_labels {
            fitted.gap_filler.transform(&panel)?
        } else {
            let mut panel = panel;
            let zeros = Column::Int(vec![Some(0); panel.nrows()]);
            panel.data_mut().insert(ROW_IMPUTED_COLUMN, zeros.clone())?;
            panel.data_mut().insert(TARGET_IMPUTED_COLUMN, zeros)?;
            panel
        };

        let panel = fitted.pipeline.transform(panel, &mut warnings)?;
        let mut panel = self.finalize(panel, false)?;
        let except: Vec<&str> = if has_labels {
            Vec::new()
        } else {
            vec![cfg.target_column_name.as_str()]
        };
        let reordered = fitted.schema.apply(panel.data(), &except)?;
        *panel.data_mut() = reordered;

        info!(
            component = "featurizer",
            event = "featurizer.transform.finish",
            rows = panel.nrows(),
            columns = panel.data().ncols(),
            labelled = has_labels,
            warnings = warnings.len()
        );
        Ok(Transformed { panel, warnings })
    }

    /// Adds the dummy series id when none is configured.
    fn with_grains(&self, table: &Table) -> Result<(Table, Vec<String>)> {
        let ids = &self.config.time_series_id_column_names;
        if !ids.is_empty() {
            for id in ids {
                table.require(id)?;
            }
            return Ok((table.clone(), ids.clone()));
        }
        if table.contains(DUMMY_GRAIN_COLUMN) {
            return Err(FeaturizeError::InvalidInput(format!(
                "column {DUMMY_GRAIN_COLUMN} is reserved"
            )));
        }
        let mut out = table.clone();
        out.insert(
            DUMMY_GRAIN_COLUMN,
            Column::Text(vec![Some(DUMMY_GRAIN_VALUE.to_string()); table.nrows()]),
        )?;
        Ok((out, vec![DUMMY_GRAIN_COLUMN.to_string()]))
    }

    fn is_index_or_target(&self, name: &str) -> bool {
        let cfg = &self.config;
        name == cfg.time_column_name
            || name == cfg.target_column_name
            || name == DUMMY_GRAIN_COLUMN
            || cfg.time_series_id_column_names.iter().any(|g| g == name)
    }

    /// Purpose per feature column: the override when given, otherwise the dtype.
    fn resolve_purposes(&self, table: &Table) -> Result<BTreeMap<String, ColumnPurpose>> {
        let mut purposes = BTreeMap::new();
        for (name, column) in table.iter() {
            if self.is_index_or_target(name) {
                continue;
            }
            let purpose = match self.config.featurization_overrides.get(name) {
                Some(ColumnOverride::Drop) => continue,
                Some(o) => o.purpose(),
                None => None,
            };
            let purpose = purpose.unwrap_or(match column.dtype() {
                DType::Float | DType::Int | DType::Bool => ColumnPurpose::Numeric,
                DType::Text if column.parse_bool().is_some() => ColumnPurpose::Numeric,
                DType::Text => ColumnPurpose::Categorical,
                DType::Datetime => ColumnPurpose::Datetime,
            });
            purposes.insert(name.to_string(), purpose);
        }
        debug!(
            component = "featurizer",
            event = "featurizer.purposes",
            purposes = ?purposes
        );
        Ok(purposes)
    }

    fn apply_purposes(
        &self,
        table: &Table,
        purposes: &BTreeMap<String, ColumnPurpose>,
    ) -> Result<Table> {
        let mut out = table.clone();
        for (name, purpose) in purposes {
            let Some(column) = table.column(name) else {
                continue;
            };
            let cast = match (purpose, column.dtype()) {
                (ColumnPurpose::Numeric, DType::Bool) => column.cast(DType::Float)?,
                (ColumnPurpose::Numeric, DType::Text) => match column.parse_bool() {
                    Some(flags) => flags.cast(DType::Float)?,
                    None => column.cast(DType::Float)?,
                },
                (ColumnPurpose::Categorical, dtype) if dtype != DType::Text => {
                    column.cast(DType::Text)?
                }
                (ColumnPurpose::Datetime, dtype) if dtype != DType::Datetime => {
                    return Err(FeaturizeError::InvalidInput(format!(
                        "column {name} is declared datetime but holds {dtype:?} values"
                    )))
                }
                _ => continue,
            };
            out.insert(name.clone(), cast)?;
        }
        Ok(out)
    }

    fn cast_target(&self, panel: &mut Panel) -> Result<()> {
        let name = &self.config.target_column_name;
        let target = panel.data().require(name)?;
        if target.dtype() == DType::Float {
            return Ok(());
        }
        let cast = target.cast(DType::Float).map_err(|err| {
            FeaturizeError::InvalidInput(format!("target column {name} is not numeric: {err}"))
        })?;
        panel.data_mut().insert(name.clone(), cast)
    }

    fn resolve_settings(
        &self,
        panel: &Panel,
        offset: Offset,
        warnings: &mut WarningSet,
    ) -> Result<ResolvedSettings> {
        let cfg = &self.config;
        let seasonality = cfg
            .seasonality
            .value()
            .copied()
            .unwrap_or_else(|| offset.seasonality());
        let wants_auto = cfg.max_horizon.is_auto()
            || cfg.target_rolling_window_size.is_auto()
            || matches!(cfg.target_lags, Some(Setting::Auto));
        let auto = if wants_auto {
            Some(HeuristicAdvisor::new(cfg.random_seed).advise(
                panel,
                &cfg.target_column_name,
                &offset,
                seasonality,
                warnings,
            )?)
        } else {
            None
        };

        let max_horizon = match (&cfg.max_horizon, &auto) {
            (Setting::Value(h), _) => *h,
            (Setting::Auto, Some(a)) => a.max_horizon,
            (Setting::Auto, None) => HeuristicAdvisor::max_horizon(&offset),
        };
        let mut lags: Vec<usize> = match (&cfg.target_lags, &auto) {
            (Some(Setting::Value(lags)), _) => lags.clone(),
            (Some(Setting::Auto), Some(a)) => a.lags(),
            _ => Vec::new(),
        };
        lags.retain(|l| *l > 0);
        lags.sort_unstable();
        lags.dedup();
        let rolling_window = match (&cfg.target_rolling_window_size, &auto) {
            (Setting::Value(w), _) => *w,
            (Setting::Auto, Some(a)) => a.rolling_window,
            (Setting::Auto, None) => 0,
        };

        let lookback_mode = match cfg.lag_mode {
            LagMode::ByTime => LookbackMode::ByTime,
            LagMode::ByOccurrence => LookbackMode::ByOccurrence,
            LagMode::Auto => {
                let fraction = imputed_fraction(panel);
                if fraction > OCCURRENCE_MODE_THRESHOLD && (!lags.is_empty() || rolling_window > 0)
                {
                    warnings.push(FeaturizeWarning::LagModeSelected {
                        mode: LookbackMode::ByOccurrence.as_str().to_string(),
                        imputed_fraction: fraction,
                    });
                    LookbackMode::ByOccurrence
                } else {
                    LookbackMode::ByTime
                }
            }
        };

        Ok(ResolvedSettings {
            offset,
            max_horizon,
            lags,
            rolling_window,
            seasonality,
            lookback_mode,
        })
    }

    fn build_pipeline(
        &self,
        purposes: &BTreeMap<String, ColumnPurpose>,
        grain_columns: &[String],
        settings: &ResolvedSettings,
    ) -> Result<Pipeline> {
        let cfg = &self.config;
        let target = cfg.target_column_name.clone();
        let offset = settings.offset;
        let mut steps: Vec<Box<dyn Transformer>> = vec![Box::new(RestoreDtypes::new(&target))];

        if self.kind == PipelineKind::Full {
            if cfg.short_series_handling != ShortSeriesHandling::None {
                steps.push(Box::new(ShortSeriesDropper::new(
                    &target,
                    offset,
                    cfg.short_series_handling,
                    min_points(
                        settings.rolling_window,
                        &settings.lags,
                        settings.max_horizon,
                        cfg.cv_folds,
                    ),
                )));
            }

            let mut drop: Vec<String> = cfg.drop_column_names.clone();
            drop.extend(
                cfg.featurization_overrides
                    .iter()
                    .filter(|(_, o)| **o == ColumnOverride::Drop)
                    .map(|(name, _)| name.clone()),
            );
            let mut protected = vec![cfg.time_column_name.clone(), target.clone()];
            protected.extend(grain_columns.iter().cloned());
            let dropped: BTreeSet<String> = drop.iter().cloned().collect();
            if !drop.is_empty() {
                steps.push(Box::new(DropColumns::new(drop, protected)));
            }

            let with_purpose = |wanted: ColumnPurpose| -> Vec<String> {
                purposes
                    .iter()
                    .filter(|(name, p)| **p == wanted && !dropped.contains(*name))
                    .map(|(name, _)| name.clone())
                    .collect()
            };
            let strategies: BTreeMap<String, ImputeStrategy> = cfg
                .featurization_overrides
                .iter()
                .filter_map(|(name, o)| match o {
                    ColumnOverride::Impute(strategy) => Some((name.clone(), *strategy)),
                    _ => None,
                })
                .collect();
            let numeric = with_purpose(ColumnPurpose::Numeric);
            if !numeric.is_empty() {
                steps.push(Box::new(NumericImputer::new(numeric, strategies)));
            }

            steps.push(Box::new(TimeIndexFeaturizer::new(
                offset,
                cfg.country_or_region.clone(),
            )));
            let datetimes = with_purpose(ColumnPurpose::Datetime);
            if !datetimes.is_empty() {
                steps.push(Box::new(DatetimeColumnFeaturizer::new(datetimes)));
            }

            let real_grains: Vec<&String> = grain_columns
                .iter()
                .filter(|g| g.as_str() != DUMMY_GRAIN_COLUMN)
                .collect();
            let mut categoricals =
                CategoricalFeaturizer::new(with_purpose(ColumnPurpose::Categorical), false)
                    .with_column(HOLIDAY_COLUMN);
            if !real_grains.is_empty() {
                steps.push(Box::new(GrainIndexFeaturizer::new(cfg.allow_column_overwrite)));
                for grain in real_grains {
                    categoricals =
                        categoricals.with_column(GrainIndexFeaturizer::feature_name(grain));
                }
            }
            steps.push(Box::new(categoricals));
        }

        if cfg.use_stl != StlMode::None {
            steps.push(Box::new(StlFeaturizer::new(
                &target,
                cfg.use_stl,
                settings.seasonality,
                offset,
            )));
        }
        steps.push(Box::new(MaxHorizonFeaturizer::new(
            settings.max_horizon,
            offset,
        )));
        if !settings.lags.is_empty() {
            let orders = BTreeMap::from([(
                target.clone(),
                settings.lags.iter().map(|l| *l as i64).collect(),
            )]);
            steps.push(Box::new(LagLeadOperator::new(
                orders,
                offset,
                settings.lookback_mode,
                settings.max_horizon,
            )));
        }
        if settings.rolling_window > 0 {
            let aggregations = cfg
                .target_rolling_window_functions
                .iter()
                .copied()
                .map(Aggregation::from)
                .collect();
            steps.push(Box::new(RollingWindow::new(
                vec![target],
                Window::Count(settings.rolling_window),
                aggregations,
                offset,
                settings.lookback_mode,
                settings.max_horizon,
            )?));
        }

        let pipeline = Pipeline::new(steps);
        info!(
            component = "featurizer",
            event = "featurizer.pipeline.composed",
            steps = ?pipeline.step_names()
        );
        Ok(pipeline)
    }

    /// Drops warm-up rows (training only), swaps in occurrence origins and removes helper columns.
    /// Only the full pipeline swaps origins; a reduced panel keeps its horizon origins for `cv_join`.
    fn finalize(&self, mut panel: Panel, drop_incomplete: bool) -> Result<Panel> {
        let target = &self.config.target_column_name;
        if drop_incomplete {
            let checked: Vec<&Column> = panel
                .data()
                .iter()
                .filter(|(name, _)| *name != target.as_str() && *name != OCCURRENCE_ORIGIN_COLUMN)
                .map(|(_, col)| col)
                .collect();
            let keep: Vec<usize> = (0..panel.nrows())
                .filter(|&r| checked.iter().all(|c| !c.is_null(r)))
                .collect();
            if keep.len() < panel.nrows() {
                debug!(
                    component = "featurizer",
                    event = "featurizer.incomplete_rows_dropped",
                    dropped = panel.nrows() - keep.len()
                );
                panel = panel.take(&keep);
            }
        }

        let occurrence = panel.data_mut().remove(OCCURRENCE_ORIGIN_COLUMN);
        if let (PipelineKind::Full, Some(Column::Datetime(occurrence))) = (self.kind, occurrence) {
            if let Some(origins) = panel.origins() {
                let replaced = origins
                    .iter()
                    .zip(&occurrence)
                    .map(|(o, occ)| occ.unwrap_or(*o))
                    .collect();
                panel.set_origins(Some(replaced))?;
            }
        }

        panel.data_mut().remove(ROW_IMPUTED_COLUMN);
        if !self.config.keep_target_imputation_marker {
            panel.data_mut().remove(TARGET_IMPUTED_COLUMN);
        }
        Ok(panel)
    }

    /// Rows whose target was imputed are excluded from training.
    pub fn remove_rows_with_imputed_target(&self, panel: &Panel) -> Result<Panel> {
        let marker = panel
            .column(TARGET_IMPUTED_COLUMN)
            .and_then(Column::as_int)
            .ok_or_else(|| {
                FeaturizeError::InvalidInput(format!(
                    "column {TARGET_IMPUTED_COLUMN} is not present; keep the target imputation marker to filter on it"
                ))
            })?;
        Ok(panel.filter(|r| marker[r] != Some(1)))
    }

    /// Replaces the split-sensitive columns of `full` with those recomputed by `cv`.
    pub fn cv_join(
        &self,
        cv: &TimeSeriesTransformer,
        full: &Panel,
        recomputed: &Panel,
    ) -> Result<Panel> {
        let own = self.fitted()?;
        let other = cv.fitted()?;
        let disagreements: Vec<String> = own
            .purposes
            .iter()
            .filter_map(|(name, purpose)| match other.purposes.get(name) {
                Some(p) if p != purpose => Some(format!("{name}: {purpose:?} vs {p:?}")),
                _ => None,
            })
            .collect();
        if !disagreements.is_empty() {
            return Err(FeaturizeError::InvalidInput(format!(
                "column purposes differ between the full and CV featurizers: {}",
                disagreements.join(", ")
            )));
        }

        let own_steps: BTreeSet<StepName> = own.pipeline.step_names().into_iter().collect();
        let shared: Vec<String> = other
            .pipeline
            .features_by_step()
            .into_iter()
            .filter(|(step, _)| own_steps.contains(step))
            .flat_map(|(_, columns)| columns)
            .filter(|c| full.data().contains(c) && recomputed.data().contains(c))
            .collect();

        let mut index: HashMap<(&SeriesKey, NaiveDateTime, Option<NaiveDateTime>), usize> =
            HashMap::with_capacity(recomputed.nrows());
        for row in 0..recomputed.nrows() {
            let origin = recomputed.origins().map(|o| o[row]);
            index.insert((&recomputed.series()[row], recomputed.times()[row], origin), row);
        }
        let rows: Vec<Option<usize>> = (0..full.nrows())
            .map(|row| {
                let origin = full.origins().map(|o| o[row]);
                index
                    .get(&(&full.series()[row], full.times()[row], origin))
                    .copied()
            })
            .collect();

        let mut out = full.clone();
        for name in &shared {
            if let Some(column) = recomputed.column(name) {
                out.data_mut().insert(name.clone(), column.take_opt(&rows))?;
            }
        }
        info!(
            component = "featurizer",
            event = "featurizer.cv_join",
            replaced_columns = shared.len(),
            matched_rows = rows.iter().filter(|r| r.is_some()).count(),
            rows = full.nrows()
        );
        Ok(out)
    }
}

/// Keeps rows on the grid anchored at their series start; returns the drop count.
fn phase_filter(
    panel: &Panel,
    offset: Offset,
    starts: &BTreeMap<SeriesKey, NaiveDateTime>,
) -> (Panel, usize) {
    let on_grid: Vec<bool> = (0..panel.nrows())
        .map(|row| {
            starts
                .get(&panel.series()[row])
                .map(|&start| offset.steps_between(start, panel.times()[row]).is_some())
                .unwrap_or(true)
        })
        .collect();
    let dropped = on_grid.iter().filter(|keep| !**keep).count();
    if dropped == 0 {
        return (panel.clone(), 0);
    }
    (panel.filter(|r| on_grid[r]), dropped)
}

fn imputed_fraction(panel: &Panel) -> f64 {
    let Some(marker) = panel.column(TARGET_IMPUTED_COLUMN).and_then(Column::as_int) else {
        return 0.0;
    };
    if marker.is_empty() {
        return 0.0;
    }
    marker.iter().filter(|m| **m == Some(1)).count() as f64 / marker.len() as f64
}
