//! Non-seasonal exponential smoothing used to extrapolate STL trends.

use crate::optimize::{nelder_mead, NelderMeadConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendKind {
    None,
    Additive,
    Multiplicative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmoothingSpec {
    pub trend: TrendKind,
    pub damped: bool,
}

impl SmoothingSpec {
    pub const CANDIDATES: [SmoothingSpec; 5] = [
        SmoothingSpec {
            trend: TrendKind::None,
            damped: false,
        },
        SmoothingSpec {
            trend: TrendKind::Additive,
            damped: false,
        },
        SmoothingSpec {
            trend: TrendKind::Additive,
            damped: true,
        },
        SmoothingSpec {
            trend: TrendKind::Multiplicative,
            damped: false,
        },
        SmoothingSpec {
            trend: TrendKind::Multiplicative,
            damped: true,
        },
    ];

    /// Smoothing parameters plus initial states.
    pub fn n_params(&self) -> usize {
        match (self.trend, self.damped) {
            (TrendKind::None, _) => 2,
            (_, false) => 4,
            (_, true) => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingFit {
    pub spec: SmoothingSpec,
    pub alpha: f64,
    pub beta: f64,
    pub phi: f64,
    pub level: f64,
    pub slope: f64,
    pub sse: f64,
    pub aic: f64,
}

impl SmoothingFit {
    /// Forecast `h` steps past the last observation; `h = 0` is the final level.
    pub fn forecast(&self, h: usize) -> f64 {
        let damp: f64 = (1..=h).map(|i| self.phi.powi(i as i32)).sum();
        match self.spec.trend {
            TrendKind::None => self.level,
            TrendKind::Additive => self.level + damp * self.slope,
            TrendKind::Multiplicative => self.level * self.slope.powf(damp),
        }
    }
}

struct Run {
    sse: f64,
    level: f64,
    slope: f64,
}

fn run(values: &[f64], spec: SmoothingSpec, alpha: f64, beta: f64, phi: f64) -> Option<Run> {
    let mut level = values[0];
    let mut slope = match spec.trend {
        TrendKind::None => 0.0,
        TrendKind::Additive => values[1] - values[0],
        TrendKind::Multiplicative => values[1] / values[0],
    };
    let mut sse = 0.0;
    for &y in &values[1..] {
        let (predicted, carried) = match spec.trend {
            TrendKind::None => (level, level),
            TrendKind::Additive => (level + phi * slope, level + phi * slope),
            TrendKind::Multiplicative => {
                let step = slope.powf(phi);
                (level * step, level * step)
            }
        };
        sse += (y - predicted).powi(2);
        let new_level = alpha * y + (1.0 - alpha) * carried;
        slope = match spec.trend {
            TrendKind::None => 0.0,
            TrendKind::Additive => beta * (new_level - level) + (1.0 - beta) * phi * slope,
            TrendKind::Multiplicative => {
                if level == 0.0 {
                    return None;
                }
                beta * (new_level / level) + (1.0 - beta) * slope.powf(phi)
            }
        };
        level = new_level;
    }
    (sse.is_finite() && level.is_finite() && slope.is_finite()).then_some(Run {
        sse,
        level,
        slope,
    })
}

/// Fits `spec` by minimizing in-sample squared error.
pub fn fit(series: &[f64], spec: SmoothingSpec) -> Option<SmoothingFit> {
    if series.len() < 2 || series.iter().any(|v| !v.is_finite()) {
        return None;
    }
    if spec.trend == TrendKind::Multiplicative && series.iter().any(|v| *v <= 0.0) {
        return None;
    }
    let k = spec.n_params();
    let mut values = series.to_vec();
    // parameter-count edge case: lengthen by carrying the last observation once
    if values.len() == k + 3 {
        values.push(values[values.len() - 1]);
    }

    let (initial, bounds): (Vec<f64>, Vec<(f64, f64)>) = match (spec.trend, spec.damped) {
        (TrendKind::None, _) => (vec![0.5], vec![(0.0, 1.0)]),
        (_, false) => (vec![0.5, 0.1], vec![(0.0, 1.0), (0.0, 1.0)]),
        (_, true) => (
            vec![0.5, 0.1, 0.95],
            vec![(0.0, 1.0), (0.0, 1.0), (0.8, 0.995)],
        ),
    };
    let unpack = |p: &[f64]| -> (f64, f64, f64) {
        (
            p[0],
            p.get(1).copied().unwrap_or(0.0),
            p.get(2).copied().unwrap_or(1.0),
        )
    };
    let result = nelder_mead(
        |p| {
            let (a, b, phi) = unpack(p);
            run(&values, spec, a, b, phi)
                .map(|r| r.sse)
                .unwrap_or(f64::INFINITY)
        },
        &initial,
        &bounds,
        &NelderMeadConfig::default(),
    );
    let (alpha, beta, phi) = unpack(&result.point);
    let state = run(&values, spec, alpha, beta, phi)?;
    let n = (values.len() - 1) as f64;
    let aic = n * (state.sse / n).max(f64::MIN_POSITIVE).ln() + 2.0 * k as f64;
    Some(SmoothingFit {
        spec,
        alpha,
        beta,
        phi,
        level: state.level,
        slope: state.slope,
        sse: state.sse,
        aic,
    })
}

/// Lowest-AIC fit among the candidate trend forms.
pub fn select(series: &[f64]) -> Option<SmoothingFit> {
    let mut best: Option<SmoothingFit> = None;
    for spec in SmoothingSpec::CANDIDATES {
        if let Some(candidate) = fit(series, spec) {
            if candidate.aic.is_nan() {
                continue;
            }
            if best.as_ref().map(|b| candidate.aic < b.aic).unwrap_or(true) {
                best = Some(candidate);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additive_trend_extrapolates_lines() {
        let series: Vec<f64> = (0..30).map(|i| 10.0 + 2.0 * i as f64).collect();
        let fitted = fit(
            &series,
            SmoothingSpec {
                trend: TrendKind::Additive,
                damped: false,
            },
        )
        .expect("fit");
        assert!(fitted.sse < 1e-9);
        assert!((fitted.forecast(1) - 70.0).abs() < 1e-6);
        assert!((fitted.forecast(5) - 78.0).abs() < 1e-6);
    }

    #[test]
    fn multiplicative_requires_positive_data() {
        let spec = SmoothingSpec {
            trend: TrendKind::Multiplicative,
            damped: false,
        };
        assert!(fit(&[1.0, 0.0, 2.0, 3.0], spec).is_none());
    }

    #[test]
    fn selection_prefers_fewer_parameters_on_flat_series() {
        let chosen = select(&[5.0; 20]).expect("selected");
        assert_eq!(chosen.spec.trend, TrendKind::None);
        assert!((chosen.forecast(3) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn edge_length_is_extended() {
        let spec = SmoothingSpec {
            trend: TrendKind::None,
            damped: false,
        };
        let fitted = fit(&[1.0, 2.0, 3.0, 4.0, 5.0], spec).expect("fit");
        assert!(fitted.level > 1.0);
    }
}
