//! Per-series and global frequency inference.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDateTime};
use tracing::{debug, info};

use crate::error::{FeaturizeError, Result};
use crate::frame::{Panel, SeriesKey};
use crate::offset::{is_weekend, Offset, OffsetUnit};

pub const MIN_COVERAGE: f64 = 0.9;

const DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFrequency {
    pub offset: Offset,
    pub coverage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyReport {
    pub offset: Offset,
    pub coverage: f64,
    pub per_series: BTreeMap<SeriesKey, SeriesFrequency>,
    pub user_supplied: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FrequencyInferencer {
    user_frequency: Option<Offset>,
}

impl FrequencyInferencer {
    pub fn new(user_frequency: Option<Offset>) -> Self {
        Self { user_frequency }
    }

    pub fn infer(&self, panel: &Panel) -> Result<FrequencyReport> {
        let per_series_times = sorted_times(panel)?;

        if let Some(offset) = self.user_frequency {
            let coverage = aggregate_coverage(&per_series_times, offset);
            info!(
                component = "frequency",
                event = "frequency.user_supplied",
                freq = %offset,
                coverage
            );
            return Ok(FrequencyReport {
                offset,
                coverage,
                per_series: BTreeMap::new(),
                user_supplied: true,
            });
        }

        let mut per_series = BTreeMap::new();
        for (key, times) in &per_series_times {
            if let Some(found) = infer_series(times) {
                debug!(
                    component = "frequency",
                    event = "frequency.series",
                    series = %key,
                    freq = %found.offset,
                    coverage = found.coverage
                );
                per_series.insert(key.clone(), found);
            }
        }

        let Some(first) = per_series.values().next() else {
            return Err(FeaturizeError::InferenceFailure {
                coverage: 0.0,
                reason: "no series has two or more distinct timestamps".to_string(),
            });
        };
        let offset = first.offset;
        if let Some(other) = per_series.values().find(|f| f.offset != offset) {
            return Err(FeaturizeError::InferenceFailure {
                coverage: 0.0,
                reason: format!(
                    "series disagree on frequency ({} vs {})",
                    offset, other.offset
                ),
            });
        }

        let coverage = aggregate_coverage(&per_series_times, offset);
        if coverage < MIN_COVERAGE {
            return Err(FeaturizeError::InferenceFailure {
                coverage,
                reason: format!("grid {offset} covers too few observations"),
            });
        }
        info!(
            component = "frequency",
            event = "frequency.inferred",
            freq = %offset,
            coverage,
            series = per_series.len()
        );
        Ok(FrequencyReport {
            offset,
            coverage,
            per_series,
            user_supplied: false,
        })
    }
}

fn sorted_times(panel: &Panel) -> Result<BTreeMap<SeriesKey, Vec<NaiveDateTime>>> {
    let mut out = BTreeMap::new();
    for (key, rows) in panel.groups() {
        let mut times: Vec<NaiveDateTime> = rows.iter().map(|&r| panel.times()[r]).collect();
        times.sort();
        if times.windows(2).any(|w| w[0] == w[1]) {
            return Err(FeaturizeError::InvalidInput(format!(
                "series {key} has duplicated timestamps (zero-width step)"
            )));
        }
        out.insert(key, times);
    }
    Ok(out)
}

/// First candidate whose grid covers the series, else the mode-derived offset.
pub fn infer_series(times: &[NaiveDateTime]) -> Option<SeriesFrequency> {
    let deltas: Vec<i64> = times
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds())
        .filter(|d| *d > 0)
        .collect();
    let mode = mode_delta(&deltas)?;
    let candidates = candidates(mode, times);
    for offset in &candidates {
        let coverage = grid_coverage(times, *offset);
        if coverage >= MIN_COVERAGE {
            return Some(SeriesFrequency {
                offset: *offset,
                coverage,
            });
        }
    }
    let offset = fallback(mode);
    Some(SeriesFrequency {
        offset,
        coverage: grid_coverage(times, offset),
    })
}

fn mode_delta(deltas: &[i64]) -> Option<i64> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for d in deltas {
        *counts.entry(*d).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(d, _)| d)
}

fn candidates(mode: i64, times: &[NaiveDateTime]) -> Vec<Offset> {
    let first = times[0].date();
    let mut out = Vec::new();
    if mode % DAY != 0 {
        out.push(fallback(mode));
        return out;
    }
    let days = mode / DAY;
    match days {
        1 => {
            let weekdays_only = times.iter().all(|t| !is_weekend(t.date().weekday()));
            let day = Offset::days(1);
            let business = Offset::unit_of(1, OffsetUnit::BusinessDay);
            if weekdays_only {
                out.extend([business, day]);
            } else {
                out.extend([day, business]);
            }
        }
        d if d % 7 == 0 => {
            out.push(Offset::unit_of(d / 7, OffsetUnit::Week(first.weekday())));
        }
        28..=31 => out.extend([
            Offset::unit_of(1, OffsetUnit::MonthStart),
            Offset::unit_of(1, OffsetUnit::MonthEnd),
        ]),
        59..=62 => out.extend([
            Offset::unit_of(2, OffsetUnit::MonthStart),
            Offset::unit_of(2, OffsetUnit::MonthEnd),
        ]),
        89..=92 => {
            let phase = first.month0() % 3;
            out.extend([
                Offset::unit_of(1, OffsetUnit::QuarterStart(phase + 1)),
                Offset::unit_of(1, OffsetUnit::QuarterEnd(phase + 10)),
            ]);
        }
        365 | 366 => out.extend([
            Offset::unit_of(1, OffsetUnit::YearStart(first.month())),
            Offset::unit_of(1, OffsetUnit::YearEnd(first.month())),
        ]),
        _ => {}
    }
    out.push(fallback(mode));
    out
}

/// Offset built directly from the mode delta.
fn fallback(mode: i64) -> Offset {
    if mode % DAY == 0 {
        let days = mode / DAY;
        let months = match days {
            28..=31 => Some(1),
            59..=62 => Some(2),
            89..=92 => Some(3),
            181..=184 => Some(6),
            365 | 366 => Some(12),
            _ => None,
        };
        return match months {
            Some(m) => Offset::unit_of(m, OffsetUnit::Months),
            None => Offset::days(days),
        };
    }
    if mode % 3_600 == 0 {
        Offset::hours(mode / 3_600)
    } else if mode % 60 == 0 {
        Offset::minutes(mode / 60)
    } else {
        Offset::seconds(mode)
    }
}

/// Share of the points that fall on the grid anchored at the first on-offset point.
pub fn grid_coverage(times: &[NaiveDateTime], offset: Offset) -> f64 {
    if times.is_empty() {
        0.0
    } else {
        on_grid(times, offset) as f64 / times.len() as f64
    }
}

fn on_grid(times: &[NaiveDateTime], offset: Offset) -> usize {
    let Some(anchor) = times.iter().copied().find(|t| offset.on_offset(*t)) else {
        return 0;
    };
    times
        .iter()
        .filter(|t| **t >= anchor && offset.steps_between(anchor, **t).is_some())
        .count()
}

/// Pooled on-grid share over every series' points.
pub(crate) fn aggregate_coverage(
    per_series: &BTreeMap<SeriesKey, Vec<NaiveDateTime>>,
    offset: Offset,
) -> f64 {
    let (hit, points) = per_series
        .values()
        .fold((0usize, 0usize), |(hit, points), times| {
            (hit + on_grid(times, offset), points + times.len())
        });
    if points == 0 {
        0.0
    } else {
        hit as f64 / points as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Column, Table};
    use chrono::{Duration, NaiveDate};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date")
    }

    fn panel_of(times: Vec<NaiveDateTime>) -> Panel {
        let n = times.len();
        let table = Table::new()
            .with_column("t", Column::Datetime(times.into_iter().map(Some).collect()))
            .and_then(|t| t.with_column("y", Column::Float(vec![1.0; n])))
            .expect("table");
        Panel::from_table(&table, "t", &[]).expect("panel")
    }

    #[test]
    fn hourly_series_with_a_gap_is_hourly() {
        let times: Vec<_> = (0..48)
            .filter(|h| *h != 10)
            .map(|h| start() + Duration::hours(h))
            .collect();
        let report = FrequencyInferencer::default()
            .infer(&panel_of(times))
            .expect("inferred");
        assert_eq!(report.offset.alias(), "H");
        assert!(report.coverage > 0.97);
    }

    #[test]
    fn weekday_only_data_is_business_daily() {
        let times: Vec<_> = (0..40)
            .map(|d| start() + Duration::days(d))
            .filter(|t| !is_weekend(t.date().weekday()))
            .collect();
        let report = FrequencyInferencer::default()
            .infer(&panel_of(times))
            .expect("inferred");
        assert_eq!(report.offset.alias(), "B");
    }

    #[test]
    fn month_start_data_is_detected() {
        let times: Vec<_> = (0..24)
            .map(|m| Offset::unit_of(1, OffsetUnit::MonthStart).shift(start(), m))
            .collect();
        let report = FrequencyInferencer::default()
            .infer(&panel_of(times))
            .expect("inferred");
        assert_eq!(report.offset.alias(), "MS");
    }

    #[test]
    fn missing_days_do_not_lower_coverage() {
        let times: Vec<_> = (0..30)
            .filter(|d| ![3, 9, 15, 21].contains(d))
            .map(|d| start() + Duration::days(d))
            .collect();
        let found = infer_series(&times).expect("two or more points");
        assert_eq!(found.offset, Offset::days(1));
        assert_eq!(found.coverage, 1.0);

        let sparse = vec![
            start(),
            start() + Duration::days(1),
            start() + Duration::days(4),
            start() + Duration::days(13),
            start() + Duration::days(20),
        ];
        let report = FrequencyInferencer::default()
            .infer(&panel_of(sparse))
            .expect("every point sits on the daily grid");
        assert_eq!(report.offset, Offset::days(1));
        assert_eq!(report.coverage, 1.0);
    }

    #[test]
    fn off_grid_points_report_coverage() {
        let mut times: Vec<_> = (0..10).map(|d| start() + Duration::days(d)).collect();
        times.extend([
            start() + Duration::hours(20 * 24 + 7),
            start() + Duration::hours(30 * 24 + 17),
            start() + Duration::hours(40 * 24 + 3),
        ]);
        let err = FrequencyInferencer::default()
            .infer(&panel_of(times))
            .expect_err("coverage too low");
        match err {
            FeaturizeError::InferenceFailure { coverage, .. } => {
                assert!((coverage - 10.0 / 13.0).abs() < 1e-12)
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn user_frequency_bypasses_detection() {
        let times = vec![start(), start() + Duration::days(31)];
        let report = FrequencyInferencer::new(Some(Offset::days(1)))
            .infer(&panel_of(times))
            .expect("user frequency accepted");
        assert!(report.user_supplied);
        assert_eq!(report.offset, Offset::days(1));
        assert_eq!(report.coverage, 1.0);
    }
}
