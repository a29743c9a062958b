//! Automatic max horizon, lag order and rolling window selection.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::error::Result;
use crate::frame::{Panel, SeriesKey};
use crate::offset::Offset;
use crate::stats;
use crate::stl::{pad_seasonal_naive, Stl};
use crate::warnings::{FeaturizeWarning, WarningSet};

pub const MAX_SAMPLED_SERIES: usize = 100;
const PACF_Z: f64 = 1.96;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoSettings {
    pub max_horizon: usize,
    pub lag_order: usize,
    pub rolling_window: usize,
}

impl AutoSettings {
    /// Lag list implied by the detected order.
    pub fn lags(&self) -> Vec<usize> {
        if self.lag_order > 0 {
            vec![self.lag_order]
        } else {
            Vec::new()
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeuristicAdvisor {
    seed: u64,
}

impl HeuristicAdvisor {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn max_horizon(offset: &Offset) -> usize {
        offset.seasonality().max(1)
    }

    pub fn advise(
        &self,
        panel: &Panel,
        target: &str,
        offset: &Offset,
        period: usize,
        warnings: &mut WarningSet,
    ) -> Result<AutoSettings> {
        let values = panel.float_column(target)?;
        let groups = panel.groups();
        let keys: Vec<&SeriesKey> = groups.keys().collect();
        let sampled: Vec<&SeriesKey> = if keys.len() > MAX_SAMPLED_SERIES {
            let mut rng = StdRng::seed_from_u64(self.seed);
            let mut picked =
                rand::seq::index::sample(&mut rng, keys.len(), MAX_SAMPLED_SERIES).into_vec();
            picked.sort_unstable();
            picked.into_iter().map(|i| keys[i]).collect()
        } else {
            keys
        };

        let mut votes: BTreeMap<(usize, usize), usize> = BTreeMap::new();
        for key in &sampled {
            let rows = &groups[*key];
            let mut series: Vec<(chrono::NaiveDateTime, f64)> =
                rows.iter().map(|&r| (panel.times()[r], values[r])).collect();
            series.sort_by_key(|(t, _)| *t);
            let clean: Vec<f64> = series
                .into_iter()
                .map(|(_, v)| v)
                .filter(|v| !v.is_nan())
                .collect();
            let selection = pacf_orders(&clean, period);
            if selection.too_seasonal {
                warnings.push(FeaturizeWarning::TooSeasonal {
                    series: key.to_string(),
                });
            }
            *votes.entry((selection.p, selection.k)).or_default() += 1;
        }

        let (lag_order, rolling_window) = votes
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(pair, _)| *pair)
            .unwrap_or((0, 0));
        let settings = AutoSettings {
            max_horizon: Self::max_horizon(offset),
            lag_order,
            rolling_window,
        };
        info!(
            component = "heuristics",
            event = "heuristics.auto",
            max_horizon = settings.max_horizon,
            lag_order,
            rolling_window,
            sampled_series = sampled.len()
        );
        Ok(settings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacfSelection {
    pub p: usize,
    pub k: usize,
    pub too_seasonal: bool,
}

/// Lag order `p` and window `k` from significant partial autocorrelations.
pub fn pacf_orders(series: &[f64], period: usize) -> PacfSelection {
    let none = PacfSelection {
        p: 0,
        k: 0,
        too_seasonal: false,
    };
    let n = series.len();
    let period = period.max(1);
    let deseasoned = if period >= 2 {
        let padded = pad_seasonal_naive(series, period, 2 * period);
        Stl::new(period)
            .decompose(&padded)
            .map(|r| r.deseasonalized())
            .unwrap_or_else(|| series.to_vec())
    } else {
        series.to_vec()
    };
    let max_lag = (2 * period).min(n / 2);
    if max_lag < 1 || !(stats::std(&deseasoned) > 1e-9) {
        return none;
    }
    let coefficients = stats::pacf(&deseasoned, max_lag);
    let threshold = PACF_Z / (n as f64).sqrt();
    let significant: Vec<bool> = (1..=max_lag)
        .map(|lag| coefficients[lag].abs() > threshold)
        .collect();
    orders_from_significance(&significant)
}

/// `significant[i]` flags lag `i + 1`.
fn orders_from_significance(significant: &[bool]) -> PacfSelection {
    if !significant.is_empty() && significant.iter().all(|s| *s) {
        return PacfSelection {
            p: 0,
            k: 0,
            too_seasonal: true,
        };
    }
    let p = significant.iter().take_while(|s| **s).count();
    let k = significant
        .iter()
        .enumerate()
        .skip(p + 1)
        .find(|(_, s)| **s)
        .map(|(idx, _)| idx + 1)
        .unwrap_or(0);
    PacfSelection {
        p,
        k,
        too_seasonal: false,
    }
}
