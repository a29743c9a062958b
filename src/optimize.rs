//! Bounded Nelder-Mead simplex minimization.

#[derive(Debug, Clone)]
pub struct NelderMeadConfig {
    pub max_iter: usize,
    pub tolerance: f64,
    pub initial_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iter: 500,
            tolerance: 1e-9,
            initial_step: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NelderMeadResult {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

const ALPHA: f64 = 1.0;
const GAMMA: f64 = 2.0;
const RHO: f64 = 0.5;
const SIGMA: f64 = 0.5;

pub fn nelder_mead<F>(
    objective: F,
    initial: &[f64],
    bounds: &[(f64, f64)],
    config: &NelderMeadConfig,
) -> NelderMeadResult
where
    F: Fn(&[f64]) -> f64,
{
    let n = initial.len();
    let eval = |x: &[f64]| {
        let v = objective(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };
    if n == 0 {
        return NelderMeadResult {
            point: Vec::new(),
            value: eval(initial),
            iterations: 0,
            converged: true,
        };
    }

    let start = clamp(initial, bounds);
    let mut simplex = vec![start.clone()];
    for i in 0..n {
        let mut vertex = start.clone();
        vertex[i] += config.initial_step;
        if let Some((lo, hi)) = bounds.get(i) {
            if vertex[i] > *hi {
                vertex[i] = start[i] - config.initial_step;
            }
            vertex[i] = vertex[i].clamp(*lo, *hi);
        }
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < config.max_iter {
        iterations += 1;
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let best = order[0];
        let worst = order[n];
        let second = order[n - 1];

        if (values[worst] - values[best]).abs() < config.tolerance {
            converged = true;
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|d| {
                simplex
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != worst)
                    .map(|(_, v)| v[d])
                    .sum::<f64>()
                    / n as f64
            })
            .collect();
        let towards = |from: &[f64], coef: f64| -> Vec<f64> {
            let p: Vec<f64> = centroid
                .iter()
                .zip(from)
                .map(|(c, x)| c + coef * (x - c))
                .collect();
            clamp(&p, bounds)
        };

        let reflected = towards(&simplex[worst], -ALPHA);
        let reflected_value = eval(&reflected);
        if reflected_value < values[best] {
            let expanded = towards(&simplex[worst], -GAMMA);
            let expanded_value = eval(&expanded);
            if expanded_value < reflected_value {
                simplex[worst] = expanded;
                values[worst] = expanded_value;
            } else {
                simplex[worst] = reflected;
                values[worst] = reflected_value;
            }
            continue;
        }
        if reflected_value < values[second] {
            simplex[worst] = reflected;
            values[worst] = reflected_value;
            continue;
        }

        let contracted = if reflected_value < values[worst] {
            towards(&reflected, RHO)
        } else {
            towards(&simplex[worst], RHO)
        };
        let contracted_value = eval(&contracted);
        if contracted_value < values[worst].min(reflected_value) {
            simplex[worst] = contracted;
            values[worst] = contracted_value;
            continue;
        }

        let anchor = simplex[best].clone();
        for i in 0..=n {
            if i == best {
                continue;
            }
            let shrunk: Vec<f64> = anchor
                .iter()
                .zip(&simplex[i])
                .map(|(a, x)| a + SIGMA * (x - a))
                .collect();
            simplex[i] = clamp(&shrunk, bounds);
            values[i] = eval(&simplex[i]);
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);
    NelderMeadResult {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}

fn clamp(point: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    point
        .iter()
        .enumerate()
        .map(|(i, x)| match bounds.get(i) {
            Some((lo, hi)) => x.clamp(*lo, *hi),
            None => *x,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_quadratic_minimum() {
        let result = nelder_mead(
            |x| (x[0] - 2.0).powi(2) + (x[1] + 1.0).powi(2),
            &[0.0, 0.0],
            &[],
            &NelderMeadConfig::default(),
        );
        assert!(result.converged);
        assert!((result.point[0] - 2.0).abs() < 1e-3);
        assert!((result.point[1] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn respects_bounds() {
        let result = nelder_mead(
            |x| (x[0] - 5.0).powi(2),
            &[0.5],
            &[(0.0, 1.0)],
            &NelderMeadConfig::default(),
        );
        assert!((result.point[0] - 1.0).abs() < 1e-6);
    }
}
