//! Dropping or padding series too short for the requested lookbacks.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use crate::config::{ShortSeriesHandling, ROW_IMPUTED_COLUMN, TARGET_IMPUTED_COLUMN};
use crate::error::{FeaturizeError, Result};
use crate::frame::{Column, Panel, SeriesKey, Table};
use crate::offset::Offset;
use crate::pipeline::{StepName, Transformer};
use crate::warnings::{FeaturizeWarning, WarningSet};

/// `window + max(lags) + horizon * (cv_folds + 1)`.
pub fn min_points(window: usize, lags: &[usize], max_horizon: usize, cv_folds: usize) -> usize {
    window + lags.iter().copied().max().unwrap_or(0) + max_horizon * (cv_folds + 1)
}

#[derive(Debug, Clone)]
pub struct ShortSeriesDropper {
    target: String,
    offset: Offset,
    handling: ShortSeriesHandling,
    min_points: usize,
    short: BTreeSet<SeriesKey>,
    padding: BTreeMap<SeriesKey, usize>,
}

impl ShortSeriesDropper {
    pub fn new(
        target: impl Into<String>,
        offset: Offset,
        handling: ShortSeriesHandling,
        min_points: usize,
    ) -> Self {
        Self {
            target: target.into(),
            offset,
            handling,
            min_points,
            short: BTreeSet::new(),
            padding: BTreeMap::new(),
        }
    }

    pub fn min_points(&self) -> usize {
        self.min_points
    }

    pub fn dropped_series(&self) -> Vec<SeriesKey> {
        match self.handling {
            ShortSeriesHandling::Drop => self.short.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn observed_counts(&self, panel: &Panel) -> Result<BTreeMap<SeriesKey, usize>> {
        let target = panel.float_column(&self.target)?;
        let marker = panel.column(TARGET_IMPUTED_COLUMN).and_then(Column::as_int);
        let mut counts = BTreeMap::new();
        for (key, rows) in panel.groups() {
            let observed = rows
                .iter()
                .filter(|&&r| match marker {
                    Some(m) => m[r] != Some(1),
                    None => !target[r].is_nan(),
                })
                .count();
            counts.insert(key, observed);
        }
        Ok(counts)
    }

    /// Prepends imputed rows so every short series reaches the minimum length.
    fn pad(&self, panel: Panel) -> Result<Panel> {
        if self.padding.is_empty() {
            return Ok(panel);
        }
        let groups = panel.groups();
        let mut plan: Vec<Option<usize>> = Vec::new();
        let mut times = Vec::new();
        let mut keys = Vec::new();
        for (key, mut rows) in groups {
            rows.sort_by_key(|&r| panel.times()[r]);
            if let (Some(&count), Some(&first)) = (self.padding.get(&key), rows.first()) {
                let start = panel.times()[first];
                for k in (1..=count as i64).rev() {
                    plan.push(None);
                    times.push(self.offset.shift(start, -k));
                    keys.push(key.clone());
                }
            }
            for r in rows {
                plan.push(Some(r));
                times.push(panel.times()[r]);
                keys.push(key.clone());
            }
        }

        let source = panel.data();
        let mut data = Table::new();
        for (name, col) in source.iter() {
            let mut padded = col.take_opt(&plan);
            if name == self.target {
                if let Column::Float(values) = &mut padded {
                    for (v, p) in values.iter_mut().zip(&plan) {
                        if p.is_none() {
                            *v = 0.0;
                        }
                    }
                }
            } else if name == ROW_IMPUTED_COLUMN || name == TARGET_IMPUTED_COLUMN {
                if let Column::Int(values) = &mut padded {
                    for (v, p) in values.iter_mut().zip(&plan) {
                        if p.is_none() {
                            *v = Some(1);
                        }
                    }
                }
            }
            data.insert(name, padded)?;
        }
        let mut out = Panel::new(
            panel.time_column(),
            panel.grain_columns().to_vec(),
            times,
            keys,
            data,
        )?;
        if let Some(origins) = panel.origins() {
            let padded: Vec<_> = plan
                .iter()
                .zip(out.times())
                .map(|(p, t)| p.map(|r| origins[r]).unwrap_or(*t))
                .collect();
            out.set_origins(Some(padded))?;
        }
        Ok(out)
    }
}

impl Transformer for ShortSeriesDropper {
    fn name(&self) -> StepName {
        StepName::ShortSeries
    }

    fn fit(&mut self, panel: &Panel, warnings: &mut WarningSet) -> Result<()> {
        self.short.clear();
        self.padding.clear();
        let counts = self.observed_counts(panel)?;
        for (key, count) in &counts {
            if *count < self.min_points {
                self.short.insert(key.clone());
                if self.handling == ShortSeriesHandling::Pad {
                    self.padding.insert(key.clone(), self.min_points - count);
                }
            }
        }

        match self.handling {
            ShortSeriesHandling::Drop if !self.short.is_empty() => {
                if self.short.len() == counts.len() {
                    return Err(FeaturizeError::InsufficientData {
                        required: self.min_points,
                        observed: counts.iter().map(|(k, c)| (k.to_string(), *c)).collect(),
                    });
                }
                warn!(
                    component = "short_series",
                    event = "short_series.dropped",
                    dropped = self.short.len(),
                    required = self.min_points
                );
                warnings.push(FeaturizeWarning::SeriesDropped {
                    series: self.short.iter().map(|k| k.to_string()).collect(),
                    required: self.min_points,
                });
            }
            ShortSeriesHandling::Pad => {
                for (key, added) in &self.padding {
                    warnings.push(FeaturizeWarning::SeriesPadded {
                        series: key.to_string(),
                        added: *added,
                    });
                }
            }
            _ => {}
        }
        info!(
            component = "short_series",
            event = "short_series.fit",
            series = counts.len(),
            short = self.short.len(),
            min_points = self.min_points,
            handling = ?self.handling
        );
        Ok(())
    }

    fn transform(&self, panel: Panel, _warnings: &mut WarningSet) -> Result<Panel> {
        if self.handling != ShortSeriesHandling::Drop || self.short.is_empty() {
            return Ok(panel);
        }
        Ok(panel.filter(|r| !self.short.contains(&panel.series()[r])))
    }

    fn fit_transform(&mut self, panel: Panel, warnings: &mut WarningSet) -> Result<Panel> {
        self.fit(&panel, warnings)?;
        let panel = self.transform(panel, warnings)?;
        self.pad(panel)
    }

    fn preview_columns(&self) -> Vec<String> {
        Vec::new()
    }
}
