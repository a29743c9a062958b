//! Expansion of rows into (origin, horizon) pairs.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::config::HORIZON_COLUMN;
use crate::error::{FeaturizeError, Result};
use crate::frame::{Column, Panel, SeriesKey};
use crate::offset::Offset;
use crate::pipeline::{StepName, Transformer};
use crate::warnings::{FeaturizeWarning, WarningSet};

/// Repeats every row `max_horizon` times with origin `t - k*F` and horizon `k`.
pub fn expand_horizons(panel: &Panel, max_horizon: usize, offset: Offset) -> Result<Panel> {
    if panel.has_origin() {
        return Err(FeaturizeError::step(
            StepName::MaxHorizon.as_str(),
            "input already carries an origin time",
        ));
    }
    let h = max_horizon.max(1);
    let rows: Vec<usize> = (0..panel.nrows())
        .flat_map(|r| std::iter::repeat(r).take(h))
        .collect();
    let mut out = panel.take(&rows);
    let mut origins = Vec::with_capacity(rows.len());
    let mut horizons = Vec::with_capacity(rows.len());
    for r in 0..panel.nrows() {
        for k in 1..=h as i64 {
            origins.push(offset.shift(panel.times()[r], -k));
            horizons.push(Some(k));
        }
    }
    out.set_origins(Some(origins))?;
    out.data_mut().insert(HORIZON_COLUMN, Column::Int(horizons))?;
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct MaxHorizonFeaturizer {
    max_horizon: usize,
    offset: Offset,
    last_times: BTreeMap<SeriesKey, NaiveDateTime>,
}

impl MaxHorizonFeaturizer {
    pub fn new(max_horizon: usize, offset: Offset) -> Self {
        Self {
            max_horizon: max_horizon.max(1),
            offset,
            last_times: BTreeMap::new(),
        }
    }

    pub fn max_horizon(&self) -> usize {
        self.max_horizon
    }

    /// Scoring origin: the step before `t`, capped at the last training time.
    pub fn scoring_origin(&self, series: &SeriesKey, t: NaiveDateTime) -> NaiveDateTime {
        let previous = self.offset.shift(t, -1);
        match self.last_times.get(series) {
            Some(&last) if last < previous => last,
            _ => previous,
        }
    }
}

impl Transformer for MaxHorizonFeaturizer {
    fn name(&self) -> StepName {
        StepName::MaxHorizon
    }

    fn fit(&mut self, panel: &Panel, _warnings: &mut WarningSet) -> Result<()> {
        self.last_times.clear();
        for (key, rows) in panel.groups() {
            if let Some(last) = rows.iter().map(|&r| panel.times()[r]).max() {
                self.last_times.insert(key, last);
            }
        }
        Ok(())
    }

    fn fit_transform(&mut self, panel: Panel, warnings: &mut WarningSet) -> Result<Panel> {
        self.fit(&panel, warnings)?;
        let out = expand_horizons(&panel, self.max_horizon, self.offset)?;
        debug!(
            component = "max_horizon",
            event = "max_horizon.expanded",
            input_rows = panel.nrows(),
            output_rows = out.nrows(),
            max_horizon = self.max_horizon
        );
        Ok(out)
    }

    fn transform(&self, mut panel: Panel, warnings: &mut WarningSet) -> Result<Panel> {
        if panel.has_origin() {
            return Err(FeaturizeError::step(
                StepName::MaxHorizon.as_str(),
                "input already carries an origin time",
            ));
        }
        let mut origins = Vec::with_capacity(panel.nrows());
        let mut horizons = Vec::with_capacity(panel.nrows());
        let mut beyond = 0usize;
        for row in 0..panel.nrows() {
            let t = panel.times()[row];
            let origin = self.scoring_origin(&panel.series()[row], t);
            let horizon = self.offset.steps_between(origin, t).ok_or_else(|| {
                FeaturizeError::Internal(format!(
                    "row at {t} is not on the {} grid of its origin {origin}",
                    self.offset
                ))
            })?;
            if horizon as usize > self.max_horizon {
                beyond += 1;
            }
            origins.push(origin);
            horizons.push(Some(horizon));
        }
        if beyond > 0 {
            warn!(
                component = "max_horizon",
                event = "max_horizon.beyond",
                rows = beyond,
                max_horizon = self.max_horizon
            );
            warnings.push(FeaturizeWarning::HorizonBeyondMax {
                rows: beyond,
                max_horizon: self.max_horizon,
            });
        }
        panel.set_origins(Some(origins))?;
        panel.data_mut().insert(HORIZON_COLUMN, Column::Int(horizons))?;
        Ok(panel)
    }

    fn preview_columns(&self) -> Vec<String> {
        vec![HORIZON_COLUMN.to_string()]
    }
}
