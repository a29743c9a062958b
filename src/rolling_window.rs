//! Rolling aggregates of lookback columns, right-aligned at the origin.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::RollingFunction;
use crate::error::{FeaturizeError, Result};
use crate::frame::{Column, Panel};
use crate::lookback::{histories, LookbackCache, LookbackFrame, LookbackMode, Retention};
use crate::max_horizon::expand_horizons;
use crate::offset::Offset;
use crate::pipeline::{StepName, Transformer};
use crate::stats;
use crate::warnings::WarningSet;

/// Window extent: a fixed number of observations or a calendar span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Window {
    Count(usize),
    Span(Offset),
}

#[derive(Clone)]
pub enum Aggregation {
    Builtin(RollingFunction),
    Custom {
        name: String,
        func: Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>,
    },
}

impl fmt::Debug for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Builtin(func) => f.debug_tuple("Builtin").field(func).finish(),
            Aggregation::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}

impl From<RollingFunction> for Aggregation {
    fn from(func: RollingFunction) -> Self {
        Aggregation::Builtin(func)
    }
}

impl Aggregation {
    pub fn custom(
        name: impl Into<String>,
        func: impl Fn(&[f64]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Aggregation::Custom {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Aggregation::Builtin(func) => func.label(),
            Aggregation::Custom { name, .. } => name.clone(),
        }
    }

    pub fn apply(&self, values: &[f64]) -> f64 {
        match self {
            Aggregation::Builtin(func) => match func {
                RollingFunction::Sum => stats::sum(values),
                RollingFunction::Mean => stats::mean(values),
                RollingFunction::Min => stats::min(values),
                RollingFunction::Max => stats::max(values),
                RollingFunction::Std => stats::std(values),
                RollingFunction::Median => stats::median(values),
                RollingFunction::Quantile(q) => stats::quantile(values, *q),
            },
            Aggregation::Custom { func, .. } => func(values),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RollingWindow {
    columns: Vec<String>,
    window: Window,
    aggregations: Vec<Aggregation>,
    offset: Offset,
    mode: LookbackMode,
    max_horizon: usize,
    cache: LookbackCache,
}

impl RollingWindow {
    pub fn new(
        columns: Vec<String>,
        window: Window,
        aggregations: Vec<Aggregation>,
        offset: Offset,
        mode: LookbackMode,
        max_horizon: usize,
    ) -> Result<Self> {
        if window == Window::Count(0) {
            return Err(FeaturizeError::InvalidConfig(
                "rolling window size must be positive".to_string(),
            ));
        }
        if aggregations.is_empty() {
            return Err(FeaturizeError::InvalidConfig(
                "rolling window needs at least one aggregation".to_string(),
            ));
        }
        Ok(Self {
            columns,
            window,
            aggregations,
            offset,
            mode,
            max_horizon: max_horizon.max(1),
            cache: LookbackCache::default(),
        })
    }

    pub fn feature_name(&self, column: &str, aggregation: &Aggregation) -> String {
        let agg = aggregation.label();
        let window = match self.window {
            Window::Count(w) => format!("window{w}"),
            Window::Span(span) => format!("window_{}", span.alias()),
        };
        match self.mode {
            LookbackMode::ByTime => format!("{column}_{agg}_{window}"),
            LookbackMode::ByOccurrence => format!("{column}_occurrence_{agg}_{window}"),
        }
    }

    fn retention(&self) -> Retention {
        match self.window {
            Window::Count(w) => Retention::Last(w + self.max_horizon - 1),
            Window::Span(span) => Retention::Span {
                window: span,
                offset: self.offset,
                steps: self.max_horizon as i64 - 1,
            },
        }
    }

    /// Window contents for one row, or `None` when the window is incomplete.
    fn window_for(
        &self,
        frame: &LookbackFrame,
        panel: &Panel,
        row: usize,
        column: &str,
    ) -> Option<Vec<f64>> {
        match (self.mode, self.window) {
            (LookbackMode::ByTime, Window::Count(w)) => {
                let history = frame.histories.get(&panel.series()[row])?;
                let origin = frame.origins[row];
                let values: Vec<f64> = (0..w as i64)
                    .rev()
                    .map(|k| history.value_at(column, self.offset.shift(origin, -k)))
                    .collect();
                values.iter().all(|v| !v.is_nan()).then_some(values)
            }
            (LookbackMode::ByTime, Window::Span(span)) => {
                let history = frame.histories.get(&panel.series()[row])?;
                let origin = frame.origins[row];
                let values = history.window_values(column, span.shift(origin, -1), origin);
                values.iter().any(|v| !v.is_nan()).then_some(values)
            }
            (LookbackMode::ByOccurrence, Window::Count(w)) => {
                let (seq, anchor) = frame.occurrence_anchor(panel, row)?;
                let start = anchor - w as i64;
                if start < 0 || anchor as usize > seq.len() {
                    return None;
                }
                let values: Vec<f64> = (start..anchor).map(|i| seq.value(column, i as usize)).collect();
                values.iter().all(|v| !v.is_nan()).then_some(values)
            }
            (LookbackMode::ByOccurrence, Window::Span(span)) => {
                let (seq, anchor) = frame.occurrence_anchor(panel, row)?;
                if anchor < 1 || anchor as usize > seq.len() {
                    return None;
                }
                let until = seq.times[anchor as usize - 1];
                let values = seq.window_values(column, span.shift(until, -1), until);
                values.iter().any(|v| !v.is_nan()).then_some(values)
            }
        }
    }
}

impl Transformer for RollingWindow {
    fn name(&self) -> StepName {
        StepName::RollingWindow
    }

    fn fit(&mut self, panel: &Panel, warnings: &mut WarningSet) -> Result<()> {
        let history = histories(panel, &self.columns, StepName::RollingWindow)?;
        self.cache = LookbackCache::build(&history, self.retention(), self.mode, warnings);
        info!(
            component = "rolling_window",
            event = "rolling_window.fit",
            mode = self.mode.as_str(),
            window = ?self.window,
            features = self.columns.len() * self.aggregations.len()
        );
        Ok(())
    }

    fn transform(&self, panel: Panel, _warnings: &mut WarningSet) -> Result<Panel> {
        let mut panel = if panel.has_origin() {
            panel
        } else {
            expand_horizons(&panel, 1, self.offset)?
        };
        let frame = LookbackFrame::new(&panel, &self.columns, &self.cache, StepName::RollingWindow)?;
        let mut features = Vec::new();
        for column in &self.columns {
            let windows: Vec<Option<Vec<f64>>> = (0..panel.nrows())
                .map(|row| self.window_for(&frame, &panel, row, column))
                .collect();
            for aggregation in &self.aggregations {
                let values = windows
                    .iter()
                    .map(|w| w.as_deref().map(|w| aggregation.apply(w)).unwrap_or(f64::NAN))
                    .collect();
                features.push((self.feature_name(column, aggregation), Column::Float(values)));
            }
        }
        for (name, column) in features {
            panel.data_mut().insert(name, column)?;
        }
        Ok(panel)
    }

    fn preview_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .flat_map(|c| self.aggregations.iter().map(move |a| self.feature_name(c, a)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TARGET_IMPUTED_COLUMN;
    use crate::frame::Table;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("date")
    }

    fn panel(values: &[f64], imputed: &[i64]) -> Panel {
        let n = values.len();
        let table = Table::new()
            .with_column(
                "date",
                Column::Datetime((0..n).map(|i| Some(start() + Duration::days(i as i64))).collect()),
            )
            .and_then(|t| t.with_column("y", Column::Float(values.to_vec())))
            .and_then(|t| {
                t.with_column(
                    TARGET_IMPUTED_COLUMN,
                    Column::Int(imputed.iter().map(|v| Some(*v)).collect()),
                )
            })
            .expect("table");
        Panel::from_table(&table, "date", &[]).expect("panel")
    }

    fn window(window: Window, mode: LookbackMode) -> RollingWindow {
        RollingWindow::new(
            vec!["y".to_string()],
            window,
            vec![
                RollingFunction::Mean.into(),
                RollingFunction::Max.into(),
                Aggregation::custom("range", |w| stats::max(w) - stats::min(w)),
            ],
            Offset::days(1),
            mode,
            1,
        )
        .expect("window")
    }

    #[test]
    fn count_window_ends_at_origin() {
        let mut step = window(Window::Count(2), LookbackMode::ByTime);
        let out = step
            .fit_transform(panel(&[1.0, 2.0, 4.0, 8.0], &[0; 4]), &mut WarningSet::new())
            .expect("rolling");
        let mean = out.float_column("y_mean_window2").expect("mean");
        assert!(mean[0].is_nan() && mean[1].is_nan());
        assert_eq!(&mean[2..], &[1.5, 3.0]);
        assert_eq!(out.float_column("y_range_window2").expect("range")[3], 2.0);
    }

    #[test]
    fn span_window_needs_one_value() {
        let mut step = window(Window::Span(Offset::days(3)), LookbackMode::ByTime);
        let out = step
            .fit_transform(panel(&[1.0, 2.0, 4.0, 8.0], &[0; 4]), &mut WarningSet::new())
            .expect("rolling");
        let max = out.float_column("y_max_window_3D").expect("max");
        assert!(max[0].is_nan());
        assert_eq!(&max[1..], &[1.0, 2.0, 4.0]);
    }

    #[test]
    fn occurrence_window_skips_imputed_rows() {
        let mut step = window(Window::Count(2), LookbackMode::ByOccurrence);
        let out = step
            .fit_transform(
                panel(&[1.0, 2.0, 100.0, 4.0, 6.0], &[0, 0, 1, 0, 0]),
                &mut WarningSet::new(),
            )
            .expect("rolling");
        let mean = out.float_column("y_occurrence_mean_window2").expect("mean");
        assert!(mean[2].is_nan());
        assert_eq!(mean[3], 1.5);
        assert_eq!(mean[4], 3.0);
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(RollingWindow::new(
            vec!["y".to_string()],
            Window::Count(0),
            vec![RollingFunction::Sum.into()],
            Offset::days(1),
            LookbackMode::ByTime,
            1
        )
        .is_err());
    }
}
