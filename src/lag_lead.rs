//! Lag and lead features, by time or by occurrence.

use std::collections::BTreeMap;

use tracing::info;

use crate::config::OCCURRENCE_ORIGIN_COLUMN;
use crate::error::Result;
use crate::frame::{Column, Panel};
use crate::lookback::{histories, LookbackCache, LookbackFrame, LookbackMode, Retention};
use crate::max_horizon::expand_horizons;
use crate::offset::Offset;
use crate::pipeline::{StepName, Transformer};
use crate::warnings::WarningSet;

/// Builds `{col}_lag{k}_{alias}` (positive orders) and `{col}_lead{k}_{alias}` (negative orders).
#[derive(Debug, Clone)]
pub struct LagLeadOperator {
    orders: BTreeMap<String, Vec<i64>>,
    offset: Offset,
    mode: LookbackMode,
    max_horizon: usize,
    cache: LookbackCache,
}

impl LagLeadOperator {
    pub fn new(
        orders: BTreeMap<String, Vec<i64>>,
        offset: Offset,
        mode: LookbackMode,
        max_horizon: usize,
    ) -> Self {
        Self {
            orders,
            offset,
            mode,
            max_horizon: max_horizon.max(1),
            cache: LookbackCache::default(),
        }
    }

    pub fn mode(&self) -> LookbackMode {
        self.mode
    }

    pub fn max_lag(&self) -> usize {
        self.orders
            .values()
            .flatten()
            .filter(|o| **o > 0)
            .max()
            .copied()
            .unwrap_or(0) as usize
    }

    /// Rows kept per series between fit and transform.
    pub fn cache_size(&self) -> usize {
        self.max_lag() + self.max_horizon - 1
    }

    pub fn feature_name(&self, column: &str, order: i64) -> String {
        let alias = self.offset.alias();
        match (order > 0, self.mode) {
            (true, LookbackMode::ByTime) => format!("{column}_lag{order}_{alias}"),
            (true, LookbackMode::ByOccurrence) => {
                format!("{column}_occurrence_lag{order}_{alias}")
            }
            (false, LookbackMode::ByTime) => format!("{column}_lead{}_{alias}", -order),
            (false, LookbackMode::ByOccurrence) => {
                format!("{column}_occurrence_lead{}_{alias}", -order)
            }
        }
    }

    fn columns(&self) -> Vec<String> {
        self.orders.keys().cloned().collect()
    }

    /// Lag `k` reads `origin - (k - 1)·F`, so lag 1 is the value at the origin itself.
    /// Lead `k` (order `-k`) reads `origin + k·F`, counted from the origin rather than the row time.
    fn lag_by_time(
        &self,
        frame: &LookbackFrame,
        panel: &Panel,
        column: &str,
        order: i64,
    ) -> Vec<f64> {
        (0..panel.nrows())
            .map(|row| {
                let Some(history) = frame.histories.get(&panel.series()[row]) else {
                    return f64::NAN;
                };
                let origin = frame.origins[row];
                let at = if order > 0 {
                    self.offset.shift(origin, -(order - 1))
                } else {
                    self.offset.shift(origin, -order)
                };
                history.value_at(column, at)
            })
            .collect()
    }

    fn lag_by_occurrence(
        &self,
        frame: &LookbackFrame,
        panel: &Panel,
        column: &str,
        order: i64,
    ) -> Vec<f64> {
        (0..panel.nrows())
            .map(|row| {
                let Some((seq, anchor)) = frame.occurrence_anchor(panel, row) else {
                    return f64::NAN;
                };
                let idx = anchor - order;
                if idx < 0 || idx as usize >= seq.len() {
                    f64::NAN
                } else {
                    seq.value(column, idx as usize)
                }
            })
            .collect()
    }

    fn occurrence_origins(&self, frame: &LookbackFrame, panel: &Panel) -> Column {
        Column::Datetime(
            (0..panel.nrows())
                .map(|row| {
                    let (seq, anchor) = frame.occurrence_anchor(panel, row)?;
                    let idx = anchor - 1;
                    (idx >= 0).then(|| seq.times.get(idx as usize).copied()).flatten()
                })
                .collect(),
        )
    }
}

impl Transformer for LagLeadOperator {
    fn name(&self) -> StepName {
        StepName::LagLead
    }

    fn fit(&mut self, panel: &Panel, warnings: &mut WarningSet) -> Result<()> {
        let history = histories(panel, &self.columns(), StepName::LagLead)?;
        self.cache = LookbackCache::build(
            &history,
            Retention::Last(self.cache_size()),
            self.mode,
            warnings,
        );
        info!(
            component = "lag_lead",
            event = "lag_lead.mode_selected",
            mode = self.mode.as_str(),
            cache_size = self.cache_size(),
            features = self.preview_columns().len()
        );
        Ok(())
    }

    fn transform(&self, panel: Panel, _warnings: &mut WarningSet) -> Result<Panel> {
        let mut panel = if panel.has_origin() {
            panel
        } else {
            expand_horizons(&panel, 1, self.offset)?
        };
        let frame = LookbackFrame::new(&panel, &self.columns(), &self.cache, StepName::LagLead)?;
        let mut features = Vec::new();
        for (column, orders) in &self.orders {
            for &order in orders.iter().filter(|o| **o != 0) {
                let values = match self.mode {
                    LookbackMode::ByTime => self.lag_by_time(&frame, &panel, column, order),
                    LookbackMode::ByOccurrence => {
                        self.lag_by_occurrence(&frame, &panel, column, order)
                    }
                };
                features.push((self.feature_name(column, order), Column::Float(values)));
            }
        }
        if self.mode == LookbackMode::ByOccurrence {
            features.push((
                OCCURRENCE_ORIGIN_COLUMN.to_string(),
                self.occurrence_origins(&frame, &panel),
            ));
        }
        for (name, column) in features {
            panel.data_mut().insert(name, column)?;
        }
        Ok(panel)
    }

    fn preview_columns(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .orders
            .iter()
            .flat_map(|(column, orders)| {
                orders
                    .iter()
                    .filter(|o| **o != 0)
                    .map(move |o| self.feature_name(column, *o))
            })
            .collect();
        if self.mode == LookbackMode::ByOccurrence {
            names.push(OCCURRENCE_ORIGIN_COLUMN.to_string());
        }
        names
    }
}
