//! Seasonal and trend features from a per-series STL decomposition.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::config::StlMode;
use crate::error::Result;
use crate::frame::{Column, Panel, SeriesKey};
use crate::holt_winters::{self, SmoothingFit};
use crate::offset::Offset;
use crate::pipeline::{StepName, Transformer};
use crate::stl::{pad_seasonal_naive, Stl};
use crate::warnings::{FeaturizeWarning, WarningSet};

pub const SEASONAL_SUFFIX: &str = "_seasonal";
pub const TREND_SUFFIX: &str = "_trend";

#[derive(Debug, Clone, PartialEq)]
struct SeriesComponents {
    first: NaiveDateTime,
    period: usize,
    seasonal: Vec<f64>,
    trend: Vec<f64>,
    forecaster: Option<SmoothingFit>,
}

impl SeriesComponents {
    /// Seasonal value at grid position `idx`, continuing the training cycle periodically.
    fn seasonal_at(&self, idx: i64) -> f64 {
        let n = self.seasonal.len() as i64;
        let p = self.period.max(1) as i64;
        if n == 0 {
            return f64::NAN;
        }
        if (0..n).contains(&idx) {
            return self.seasonal[idx as usize];
        }
        let p = p.min(n);
        let phase = if idx >= n {
            n - p + (idx - n).rem_euclid(p)
        } else {
            idx.rem_euclid(p)
        };
        self.seasonal[phase as usize]
    }

    fn trend_at(&self, idx: i64) -> f64 {
        let n = self.trend.len() as i64;
        if (0..n).contains(&idx) {
            return self.trend[idx as usize];
        }
        if idx < 0 {
            return f64::NAN;
        }
        let steps = (idx - n + 1) as usize;
        match &self.forecaster {
            Some(fit) => fit.forecast(steps),
            None => self.trend.last().copied().unwrap_or(f64::NAN),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StlFeaturizer {
    target: String,
    mode: StlMode,
    period: usize,
    offset: Offset,
    series: BTreeMap<SeriesKey, SeriesComponents>,
}

impl StlFeaturizer {
    pub fn new(target: impl Into<String>, mode: StlMode, period: usize, offset: Offset) -> Self {
        Self {
            target: target.into(),
            mode,
            period,
            offset,
            series: BTreeMap::new(),
        }
    }

    pub fn seasonal_column(&self) -> String {
        format!("{}{SEASONAL_SUFFIX}", self.target)
    }

    pub fn trend_column(&self) -> String {
        format!("{}{TREND_SUFFIX}", self.target)
    }

    fn decompose_series(
        &self,
        key: &SeriesKey,
        values: Vec<f64>,
        warnings: &mut WarningSet,
    ) -> (Vec<f64>, Vec<f64>, usize) {
        let n = values.len();
        let period = self.period;
        let fallback = |reason: String, warnings: &mut WarningSet| {
            warnings.push(FeaturizeWarning::StlFallback {
                series: key.to_string(),
                reason,
            });
            (vec![0.0; values.len()], values.clone(), 1)
        };
        if period < 2 {
            return fallback(format!("seasonal period {period} is below 2"), warnings);
        }
        if n < period {
            return fallback(
                format!("{n} points is less than one period of {period}"),
                warnings,
            );
        }
        let padded = pad_seasonal_naive(&values, period, 2 * period);
        let added = padded.len() - n;
        if added > 0 {
            warnings.push(FeaturizeWarning::StlPadded {
                series: key.to_string(),
                observed: n,
                padded_to: padded.len(),
            });
        }
        match Stl::new(period).decompose(&padded) {
            Some(result) => (
                result.seasonal[added..].to_vec(),
                result.trend[added..].to_vec(),
                period,
            ),
            None => fallback("decomposition failed".to_string(), warnings),
        }
    }
}

/// Forward fill, then zero for anything still missing.
fn impute_for_stl(values: &mut [f64]) {
    let mut carry = None;
    for v in values.iter_mut() {
        if v.is_nan() {
            *v = carry.unwrap_or(0.0);
        } else {
            carry = Some(*v);
        }
    }
}

impl Transformer for StlFeaturizer {
    fn name(&self) -> StepName {
        StepName::Stl
    }

    fn fit(&mut self, panel: &Panel, warnings: &mut WarningSet) -> Result<()> {
        self.series.clear();
        let target = panel.float_column(&self.target)?;
        for (key, mut rows) in panel.groups() {
            rows.sort_by_key(|&r| panel.times()[r]);
            rows.dedup_by_key(|r| panel.times()[*r]);
            let Some(&first_row) = rows.first() else {
                continue;
            };
            let mut values: Vec<f64> = rows.iter().map(|&r| target[r]).collect();
            impute_for_stl(&mut values);
            let (seasonal, trend, period) = self.decompose_series(&key, values, warnings);
            let forecaster = holt_winters::select(&trend);
            debug!(
                component = "stl",
                event = "stl.series.fit",
                series = %key,
                points = trend.len(),
                smoothing = ?forecaster.as_ref().map(|f| &f.spec)
            );
            self.series.insert(
                key,
                SeriesComponents {
                    first: panel.times()[first_row],
                    period,
                    seasonal,
                    trend,
                    forecaster,
                },
            );
        }
        info!(
            component = "stl",
            event = "stl.fit",
            series = self.series.len(),
            period = self.period,
            mode = ?self.mode
        );
        Ok(())
    }

    fn transform(&self, mut panel: Panel, warnings: &mut WarningSet) -> Result<Panel> {
        let mut seasonal = Vec::with_capacity(panel.nrows());
        let mut trend = Vec::with_capacity(panel.nrows());
        let mut unknown: Vec<&SeriesKey> = Vec::new();
        for row in 0..panel.nrows() {
            let key = &panel.series()[row];
            let Some(components) = self.series.get(key) else {
                if !unknown.contains(&key) {
                    unknown.push(key);
                }
                seasonal.push(f64::NAN);
                trend.push(f64::NAN);
                continue;
            };
            let t = panel.times()[row];
            let idx = if t >= components.first {
                self.offset.steps_between(components.first, t)
            } else {
                self.offset.steps_between(t, components.first).map(|k| -k)
            };
            match idx {
                Some(idx) => {
                    seasonal.push(components.seasonal_at(idx));
                    trend.push(components.trend_at(idx));
                }
                None => {
                    seasonal.push(f64::NAN);
                    trend.push(f64::NAN);
                }
            }
        }
        for key in unknown {
            warnings.push(FeaturizeWarning::UnknownSeries {
                series: key.to_string(),
            });
        }
        let seasonal_name = self.seasonal_column();
        let trend_name = self.trend_column();
        panel.data_mut().insert(seasonal_name, Column::Float(seasonal))?;
        if self.mode == StlMode::SeasonTrend {
            panel.data_mut().insert(trend_name, Column::Float(trend))?;
        }
        Ok(panel)
    }

    fn preview_columns(&self) -> Vec<String> {
        match self.mode {
            StlMode::SeasonTrend => vec![self.seasonal_column(), self.trend_column()],
            _ => vec![self.seasonal_column()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Table;
    use crate::offset::OffsetUnit;
    use chrono::{Duration, NaiveDate};
    use std::f64::consts::PI;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() <= tol, "{a} != {b} (tolerance {tol})");
    }

    fn monthly_panel(values: &[f64]) -> Panel {
        let offset = Offset::new(1, OffsetUnit::MonthStart).expect("offset");
        let start = NaiveDate::from_ymd_opt(2018, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("date");
        let times = (0..values.len() as i64)
            .map(|k| Some(offset.shift(start, k)))
            .collect();
        let table = Table::new()
            .with_column("date", Column::Datetime(times))
            .and_then(|t| t.with_column("y", Column::Float(values.to_vec())))
            .expect("table");
        Panel::from_table(&table, "date", &[]).expect("panel")
    }

    #[test]
    fn pure_monthly_seasonality_is_reproduced() {
        let values: Vec<f64> = (1..=24).map(|m| (2.0 * PI * m as f64 / 12.0).sin()).collect();
        let offset = Offset::new(1, OffsetUnit::MonthStart).expect("offset");
        let mut step = StlFeaturizer::new("y", StlMode::SeasonTrend, 12, offset);
        let out = step
            .fit_transform(monthly_panel(&values), &mut WarningSet::new())
            .expect("stl");
        let seasonal = out.float_column("y_seasonal").expect("seasonal");
        let trend = out.float_column("y_trend").expect("trend");
        for i in 0..values.len() {
            assert_close(seasonal[i], values[i], 1e-6);
            assert_close(trend[i], 0.0, 1e-6);
        }
    }

    #[test]
    fn future_rows_repeat_the_last_cycle() {
        let values: Vec<f64> = (1..=24).map(|m| (2.0 * PI * m as f64 / 12.0).sin()).collect();
        let offset = Offset::new(1, OffsetUnit::MonthStart).expect("offset");
        let mut step = StlFeaturizer::new("y", StlMode::Season, 12, offset);
        step.fit(&monthly_panel(&values), &mut WarningSet::new())
            .expect("fit");

        let extended: Vec<f64> = (1..=27).map(|m| (2.0 * PI * m as f64 / 12.0).sin()).collect();
        let out = step
            .transform(monthly_panel(&extended), &mut WarningSet::new())
            .expect("transform");
        let seasonal = out.float_column("y_seasonal").expect("seasonal");
        assert_close(seasonal[25], extended[25], 1e-6);
        assert!(!out.data().contains("y_trend"));
    }

    #[test]
    fn short_series_are_padded_or_fall_back() {
        let offset = Offset::days(1);
        let mut warnings = WarningSet::new();
        let mut step = StlFeaturizer::new("y", StlMode::SeasonTrend, 7, offset);
        let start = NaiveDate::from_ymd_opt(2020, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("date");
        let make = |n: i64| {
            let table = Table::new()
                .with_column(
                    "date",
                    Column::Datetime((0..n).map(|i| Some(start + Duration::days(i))).collect()),
                )
                .and_then(|t| t.with_column("y", Column::Float((0..n).map(|i| i as f64).collect())))
                .expect("table");
            Panel::from_table(&table, "date", &[]).expect("panel")
        };
        step.fit(&make(10), &mut warnings).expect("padded fit");
        assert!(warnings.contains_code("stl_padded"));

        let mut warnings = WarningSet::new();
        let out = step.fit_transform(make(4), &mut warnings).expect("fallback");
        assert!(warnings.contains_code("stl_fallback"));
        assert_eq!(out.float_column("y_seasonal").expect("seasonal"), vec![0.0; 4]);
        assert_eq!(
            out.float_column("y_trend").expect("trend"),
            vec![0.0, 1.0, 2.0, 3.0]
        );
    }
}
