//! Datetime gap filling on the canonical grid and target imputation.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::info;

use crate::config::{ImputeStrategy, ROW_IMPUTED_COLUMN, TARGET_IMPUTED_COLUMN};
use crate::error::{FeaturizeError, Result};
use crate::frame::{Column, Panel, SeriesKey};
use crate::offset::Offset;
use crate::stats;

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesBounds {
    pub start: NaiveDateTime,
    pub last: NaiveDateTime,
}

#[derive(Debug, Clone)]
struct SeriesState {
    bounds: SeriesBounds,
    /// Last observed target value at fit.
    known_tail: Option<f64>,
    fill_value: f64,
}

#[derive(Debug, Clone)]
pub struct DatetimeGapFiller {
    target: String,
    offset: Offset,
    strategy: ImputeStrategy,
    series: BTreeMap<SeriesKey, SeriesState>,
    global_fill: f64,
}

impl DatetimeGapFiller {
    pub fn new(target: impl Into<String>, offset: Offset, strategy: ImputeStrategy) -> Self {
        Self {
            target: target.into(),
            offset,
            strategy,
            series: BTreeMap::new(),
            global_fill: f64::NAN,
        }
    }

    pub fn bounds(&self) -> BTreeMap<SeriesKey, SeriesBounds> {
        self.series
            .iter()
            .map(|(k, s)| (k.clone(), s.bounds.clone()))
            .collect()
    }

    pub fn fit(&mut self, panel: &Panel) -> Result<()> {
        let target = panel.float_column(&self.target)?;
        self.series.clear();
        let mut all = Vec::new();
        for (key, rows) in panel.groups() {
            let mut ordered: Vec<usize> = rows;
            ordered.sort_by_key(|&r| panel.times()[r]);
            let values: Vec<f64> = ordered.iter().map(|&r| target[r]).collect();
            all.extend_from_slice(&values);
            let (Some(&first), Some(&last)) = (ordered.first(), ordered.last()) else {
                continue;
            };
            let known_tail = values.iter().rev().copied().find(|v| !v.is_nan());
            self.series.insert(
                key,
                SeriesState {
                    bounds: SeriesBounds {
                        start: panel.times()[first],
                        last: panel.times()[last],
                    },
                    known_tail,
                    fill_value: summary(self.strategy, &values),
                },
            );
        }
        self.global_fill = summary(self.strategy, &all);
        Ok(())
    }

    pub fn fit_transform(&mut self, panel: &Panel) -> Result<Panel> {
        self.fit(panel)?;
        self.fill(panel, false)
    }

    /// Scoring-time filling; leading gaps continue from the training tail.
    pub fn transform(&self, panel: &Panel) -> Result<Panel> {
        self.fill(panel, true)
    }

    /// Inserts missing grid rows per series, imputes the target and adds both markers.
    fn fill(&self, panel: &Panel, use_known_tail: bool) -> Result<Panel> {
        let target = panel.float_column(&self.target)?;
        let mut plan: Vec<Option<usize>> = Vec::with_capacity(panel.nrows());
        let mut times = Vec::with_capacity(panel.nrows());
        let mut keys = Vec::with_capacity(panel.nrows());
        let mut filled_target = Vec::with_capacity(panel.nrows());
        let mut target_marker = Vec::with_capacity(panel.nrows());
        let mut inserted = 0usize;

        for (key, mut rows) in panel.groups() {
            rows.sort_by_key(|&r| panel.times()[r]);
            let (Some(&first), Some(&last)) = (rows.first(), rows.last()) else {
                continue;
            };
            let start = panel.times()[first];
            let end = panel.times()[last];
            let steps = self.offset.steps_between(start, end).ok_or_else(|| {
                FeaturizeError::Internal(format!(
                    "series {key} spans {start}..{end}, which is off the {} grid",
                    self.offset
                ))
            })?;
            let by_time: BTreeMap<NaiveDateTime, usize> =
                rows.iter().map(|&r| (panel.times()[r], r)).collect();

            let mut series_values = Vec::with_capacity(steps as usize + 1);
            for k in 0..=steps {
                let t = self.offset.shift(start, k);
                let source = by_time.get(&t).copied();
                if source.is_none() {
                    inserted += 1;
                }
                plan.push(source);
                times.push(t);
                keys.push(key.clone());
                series_values.push(source.map(|r| target[r]).unwrap_or(f64::NAN));
            }
            target_marker.extend(series_values.iter().map(|v| Some(v.is_nan() as i64)));
            filled_target.extend(self.impute(&key, series_values, use_known_tail));
        }

        let mut data = panel.data().take_opt(&plan);
        data.insert(self.target.clone(), Column::Float(filled_target))?;
        data.insert(
            ROW_IMPUTED_COLUMN,
            Column::Int(plan.iter().map(|p| Some(p.is_none() as i64)).collect()),
        )?;
        data.insert(TARGET_IMPUTED_COLUMN, Column::Int(target_marker))?;

        info!(
            component = "gap_fill",
            event = "gap_fill.transform",
            input_rows = panel.nrows(),
            output_rows = times.len(),
            inserted_rows = inserted
        );
        Panel::new(
            panel.time_column(),
            panel.grain_columns().to_vec(),
            times,
            keys,
            data,
        )
    }

    fn impute(&self, key: &SeriesKey, mut values: Vec<f64>, use_known_tail: bool) -> Vec<f64> {
        let state = self.series.get(key);
        match self.strategy {
            ImputeStrategy::Ffill => {
                let mut carry = state.and_then(|s| s.known_tail).filter(|_| use_known_tail);
                let mut leading_missing = Vec::new();
                for (i, v) in values.iter_mut().enumerate() {
                    if v.is_nan() {
                        match carry {
                            Some(c) => *v = c,
                            None => leading_missing.push(i),
                        }
                    } else {
                        carry = Some(*v);
                    }
                }
                if let Some(first) = values.iter().copied().find(|v| !v.is_nan()) {
                    for i in leading_missing {
                        values[i] = first;
                    }
                }
            }
            _ => {
                let fill = state
                    .map(|s| s.fill_value)
                    .filter(|f| !f.is_nan())
                    .unwrap_or(self.global_fill);
                for v in values.iter_mut().filter(|v| v.is_nan()) {
                    *v = fill;
                }
            }
        }
        values
    }
}

fn summary(strategy: ImputeStrategy, values: &[f64]) -> f64 {
    match strategy {
        ImputeStrategy::Ffill | ImputeStrategy::Mean => stats::mean(values),
        ImputeStrategy::Median => stats::median(values),
        ImputeStrategy::Mode => stats::mode(values),
        ImputeStrategy::Constant(c) => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Table;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, d)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date")
    }

    fn panel(days: &[u32], values: &[f64]) -> Panel {
        let table = Table::new()
            .with_column(
                "date",
                Column::Datetime(days.iter().map(|d| Some(day(*d))).collect()),
            )
            .and_then(|t| t.with_column("y", Column::Float(values.to_vec())))
            .expect("table");
        Panel::from_table(&table, "date", &[]).expect("panel")
    }

    #[test]
    fn missing_day_is_inserted_and_forward_filled() {
        let input = panel(&[1, 3], &[1.0, 3.0]);
        let mut filler = DatetimeGapFiller::new("y", Offset::days(1), ImputeStrategy::Ffill);
        let out = filler.fit_transform(&input).expect("fit_transform");

        assert_eq!(out.times(), &[day(1), day(2), day(3)]);
        assert_eq!(out.float_column("y").expect("y"), vec![1.0, 1.0, 3.0]);
        assert_eq!(
            out.column(ROW_IMPUTED_COLUMN),
            Some(&Column::Int(vec![Some(0), Some(1), Some(0)]))
        );
        assert_eq!(
            out.column(TARGET_IMPUTED_COLUMN),
            Some(&Column::Int(vec![Some(0), Some(1), Some(0)]))
        );
    }

    #[test]
    fn leading_gap_uses_training_tail() {
        let train = panel(&[1, 2], &[5.0, 6.0]);
        let mut filler = DatetimeGapFiller::new("y", Offset::days(1), ImputeStrategy::Ffill);
        filler.fit(&train).expect("fit");

        let score = panel(&[3, 4], &[f64::NAN, 8.0]);
        let out = filler.transform(&score).expect("transform");
        assert_eq!(out.float_column("y").expect("y"), vec![6.0, 8.0]);
    }

    #[test]
    fn leading_gap_without_history_is_backfilled() {
        let train = panel(&[1, 2, 3], &[f64::NAN, 2.0, 4.0]);
        let mut filler = DatetimeGapFiller::new("y", Offset::days(1), ImputeStrategy::Ffill);
        let out = filler.fit_transform(&train).expect("fit_transform");
        assert_eq!(out.float_column("y").expect("y"), vec![2.0, 2.0, 4.0]);
    }

    #[test]
    fn median_strategy_uses_series_statistic() {
        let input = panel(&[1, 2, 4, 5], &[1.0, 2.0, 10.0, 20.0]);
        let mut filler = DatetimeGapFiller::new("y", Offset::days(1), ImputeStrategy::Median);
        let out = filler.fit_transform(&input).expect("fit_transform");
        assert_eq!(out.float_column("y").expect("y")[2], 6.0);
    }
}
