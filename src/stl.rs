//! Seasonal-trend decomposition by LOESS (Cleveland et al., 1990).

#[derive(Debug, Clone, PartialEq)]
pub struct StlResult {
    pub seasonal: Vec<f64>,
    pub trend: Vec<f64>,
    pub remainder: Vec<f64>,
}

impl StlResult {
    /// Trend plus remainder: the series with seasonality removed.
    pub fn deseasonalized(&self) -> Vec<f64> {
        self.trend
            .iter()
            .zip(&self.remainder)
            .map(|(t, r)| t + r)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Stl {
    period: usize,
    seasonal_span: usize,
    trend_span: usize,
    low_pass_span: usize,
    inner_iterations: usize,
}

fn next_odd(x: usize) -> usize {
    if x % 2 == 0 {
        x + 1
    } else {
        x
    }
}

impl Stl {
    pub fn new(period: usize) -> Self {
        let period = period.max(2);
        let seasonal_span = 7;
        let trend = (1.5 * period as f64 / (1.0 - 1.5 / seasonal_span as f64)).ceil() as usize;
        Self {
            period,
            seasonal_span,
            trend_span: next_odd(trend),
            low_pass_span: next_odd(period),
            inner_iterations: 2,
        }
    }

    pub fn with_seasonal_span(mut self, span: usize) -> Self {
        self.seasonal_span = next_odd(span.max(3));
        self
    }

    pub fn with_trend_span(mut self, span: usize) -> Self {
        self.trend_span = next_odd(span.max(3));
        self
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// `None` when the series holds fewer than two full periods or missing values.
    pub fn decompose(&self, series: &[f64]) -> Option<StlResult> {
        let n = series.len();
        let np = self.period;
        if n < 2 * np || series.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let mut trend = vec![0.0; n];
        let mut seasonal = vec![0.0; n];
        for _ in 0..self.inner_iterations {
            let detrended: Vec<f64> = series.iter().zip(&trend).map(|(y, t)| y - t).collect();
            let cycle = self.cycle_subseries(&detrended);
            let low_pass = {
                let ma1 = moving_average(&cycle, np);
                let ma2 = moving_average(&ma1, np);
                let ma3 = moving_average(&ma2, 3);
                loess_fit(&ma3, self.low_pass_span)
            };
            for i in 0..n {
                seasonal[i] = cycle[np + i] - low_pass[i];
            }
            let deseasonalized: Vec<f64> =
                series.iter().zip(&seasonal).map(|(y, s)| y - s).collect();
            trend = loess_fit(&deseasonalized, self.trend_span);
        }

        let remainder = series
            .iter()
            .zip(&seasonal)
            .zip(&trend)
            .map(|((y, s), t)| y - s - t)
            .collect();
        Some(StlResult {
            seasonal,
            trend,
            remainder,
        })
    }

    /// Smooths each cycle-subseries and extends it one period on both ends.
    fn cycle_subseries(&self, detrended: &[f64]) -> Vec<f64> {
        let n = detrended.len();
        let np = self.period;
        let mut out = vec![0.0; n + 2 * np];
        for phase in 0..np {
            let sub: Vec<f64> = detrended.iter().skip(phase).step_by(np).copied().collect();
            let m = sub.len();
            for k in 0..m + 2 {
                let x = k as f64 - 1.0;
                let value = loess_at(&sub, self.seasonal_span, x).unwrap_or(0.0);
                out[k * np + phase] = value;
            }
        }
        out
    }
}

/// Prepends seasonal-naive values (`x[i] = x[i + period]`) until `series` has `len` points.
pub fn pad_seasonal_naive(series: &[f64], period: usize, len: usize) -> Vec<f64> {
    let missing = len.saturating_sub(series.len());
    if missing == 0 || period == 0 || series.len() < period {
        return series.to_vec();
    }
    let mut out = vec![0.0; missing];
    out.extend_from_slice(series);
    for i in (0..missing).rev() {
        out[i] = out[i + period];
    }
    out
}

fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if values.len() < window || window == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len() - window + 1);
    let mut acc: f64 = values[..window].iter().sum();
    out.push(acc / window as f64);
    for i in window..values.len() {
        acc += values[i] - values[i - window];
        out.push(acc / window as f64);
    }
    out
}

fn loess_fit(values: &[f64], span: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| loess_at(values, span, i as f64).unwrap_or(values[i]))
        .collect()
}

/// Local-linear tricube regression of `values` (at x = 0..n) evaluated at `x`.
fn loess_at(values: &[f64], span: usize, x: f64) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    if n == 1 {
        return Some(values[0]);
    }
    let q = span.max(2);
    let (left, right) = if q >= n {
        (0, n - 1)
    } else {
        let half = (q / 2) as f64;
        let start = (x - half).round().max(0.0) as usize;
        let start = start.min(n - q);
        (start, start + q - 1)
    };
    let mut h = (x - left as f64).max(right as f64 - x);
    if q > n {
        h += ((q - n) / 2) as f64;
    }
    let h_hi = 0.999 * h;
    let h_lo = 0.001 * h;

    let mut weights = vec![0.0; right - left + 1];
    let mut total = 0.0;
    for (slot, j) in (left..=right).enumerate() {
        let r = (j as f64 - x).abs();
        if r <= h_hi {
            let w = if r <= h_lo {
                1.0
            } else {
                (1.0 - (r / h).powi(3)).powi(3)
            };
            weights[slot] = w;
            total += w;
        }
    }
    if total <= 0.0 {
        return None;
    }
    for w in &mut weights {
        *w /= total;
    }

    if h > 0.0 {
        let centre: f64 = (left..=right)
            .zip(&weights)
            .map(|(j, w)| w * j as f64)
            .sum();
        let spread: f64 = (left..=right)
            .zip(&weights)
            .map(|(j, w)| w * (j as f64 - centre).powi(2))
            .sum();
        let range = (n - 1) as f64;
        if spread.sqrt() > 0.001 * range {
            let slope = (x - centre) / spread;
            for (j, w) in (left..=right).zip(weights.iter_mut()) {
                *w *= slope * (j as f64 - centre) + 1.0;
            }
        }
    }

    Some(
        (left..=right)
            .zip(&weights)
            .map(|(j, w)| w * values[j])
            .sum(),
    )
}
