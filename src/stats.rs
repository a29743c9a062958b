//! NaN-aware summary statistics, autocorrelation and correlation.

fn present(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| !v.is_nan())
}

pub fn mean(values: &[f64]) -> f64 {
    let (sum, count) = present(values).fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

pub fn sum(values: &[f64]) -> f64 {
    present(values).sum()
}

pub fn min(values: &[f64]) -> f64 {
    present(values).fold(f64::NAN, f64::min)
}

pub fn max(values: &[f64]) -> f64 {
    present(values).fold(f64::NAN, f64::max)
}

/// Sample standard deviation (ddof = 1).
pub fn std(values: &[f64]) -> f64 {
    let data: Vec<f64> = present(values).collect();
    if data.len() < 2 {
        return f64::NAN;
    }
    let m = data.iter().sum::<f64>() / data.len() as f64;
    let ss: f64 = data.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (data.len() - 1) as f64).sqrt()
}

/// Linear-interpolated quantile, `q` in [0, 1].
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut data: Vec<f64> = present(values).collect();
    if data.is_empty() || !(0.0..=1.0).contains(&q) {
        return f64::NAN;
    }
    data.sort_by(f64::total_cmp);
    let pos = q * (data.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    data[lo] + (data[hi] - data[lo]) * (pos - lo as f64)
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Most frequent value; ties resolve to the smallest.
pub fn mode(values: &[f64]) -> f64 {
    let mut data: Vec<f64> = present(values).collect();
    if data.is_empty() {
        return f64::NAN;
    }
    data.sort_by(f64::total_cmp);
    let mut best = data[0];
    let mut best_count = 0;
    let mut run_start = 0;
    for i in 1..=data.len() {
        if i == data.len() || data[i] != data[run_start] {
            if i - run_start > best_count {
                best_count = i - run_start;
                best = data[run_start];
            }
            run_start = i;
        }
    }
    best
}

pub fn variance_is_zero(values: &[f64]) -> bool {
    let mut it = present(values);
    match it.next() {
        None => true,
        Some(first) => it.all(|v| v == first),
    }
}

/// Pearson correlation over rows where both sides are present.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
        .map(|(x, y)| (*x, *y))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let ma = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mb = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut va, mut vb) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    if va == 0.0 || vb == 0.0 {
        return f64::NAN;
    }
    cov / (va.sqrt() * vb.sqrt())
}

/// Sample autocorrelations for lags `0..=max_lag`.
pub fn acf(series: &[f64], max_lag: usize) -> Vec<f64> {
    let n = series.len();
    let m = mean(series);
    let denom: f64 = series.iter().map(|v| (v - m).powi(2)).sum();
    (0..=max_lag)
        .map(|lag| {
            if lag == 0 {
                return 1.0;
            }
            if lag >= n || denom == 0.0 {
                return f64::NAN;
            }
            let num: f64 = (0..n - lag)
                .map(|t| (series[t] - m) * (series[t + lag] - m))
                .sum();
            num / denom
        })
        .collect()
}

/// Partial autocorrelations for lags `0..=max_lag` via Durbin-Levinson.
pub fn pacf(series: &[f64], max_lag: usize) -> Vec<f64> {
    let rho = acf(series, max_lag);
    let mut out = vec![f64::NAN; max_lag + 1];
    out[0] = 1.0;
    if max_lag == 0 || rho.iter().any(|r| r.is_nan()) {
        return out;
    }
    let mut phi_prev = vec![0.0; max_lag + 1];
    let mut phi = vec![0.0; max_lag + 1];
    phi_prev[1] = rho[1];
    out[1] = rho[1];
    for k in 2..=max_lag {
        let mut num = rho[k];
        let mut denom = 1.0;
        for j in 1..k {
            num -= phi_prev[j] * rho[k - j];
            denom -= phi_prev[j] * rho[j];
        }
        if denom.abs() < 1e-10 {
            break;
        }
        phi[k] = num / denom;
        for j in 1..k {
            phi[j] = phi_prev[j] - phi[k] * phi_prev[k - j];
        }
        out[k] = phi[k];
        phi_prev[..=k].copy_from_slice(&phi[..=k]);
    }
    out
}
