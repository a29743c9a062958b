//! Shared history, cache and indexing for lag and rolling features.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::config::{HORIZON_COLUMN, TARGET_IMPUTED_COLUMN};
use crate::error::{FeaturizeError, Result};
use crate::frame::{Column, Panel, SeriesKey};
use crate::offset::Offset;
use crate::pipeline::StepName;
use crate::warnings::{FeaturizeWarning, WarningSet};

/// How lookbacks index into history: the regular grid, or the sequence of observed rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookbackMode {
    ByTime,
    ByOccurrence,
}

impl LookbackMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookbackMode::ByTime => "by_time",
            LookbackMode::ByOccurrence => "by_occurrence",
        }
    }
}

/// One series' de-origined values, ascending by time.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SeriesHistory {
    pub times: Vec<NaiveDateTime>,
    pub imputed: Vec<bool>,
    pub values: BTreeMap<String, Vec<f64>>,
}

impl SeriesHistory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn position(&self, t: NaiveDateTime) -> Option<usize> {
        self.times.binary_search(&t).ok()
    }

    pub fn value(&self, column: &str, idx: usize) -> f64 {
        self.values
            .get(column)
            .and_then(|v| v.get(idx))
            .copied()
            .unwrap_or(f64::NAN)
    }

    pub fn value_at(&self, column: &str, t: NaiveDateTime) -> f64 {
        self.position(t)
            .map(|i| self.value(column, i))
            .unwrap_or(f64::NAN)
    }

    fn select(&self, keep: impl Fn(usize) -> bool) -> SeriesHistory {
        let idx: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        SeriesHistory {
            times: idx.iter().map(|&i| self.times[i]).collect(),
            imputed: idx.iter().map(|&i| self.imputed[i]).collect(),
            values: self
                .values
                .iter()
                .map(|(k, v)| (k.clone(), idx.iter().map(|&i| v[i]).collect()))
                .collect(),
        }
    }

    pub fn observed(&self) -> SeriesHistory {
        self.select(|i| !self.imputed[i])
    }

    /// Values in `column` with time in `(after, until]`.
    pub fn window_values(
        &self,
        column: &str,
        after: NaiveDateTime,
        until: NaiveDateTime,
    ) -> Vec<f64> {
        let start = self.times.partition_point(|t| *t <= after);
        let end = self.times.partition_point(|t| *t <= until);
        (start..end.max(start)).map(|i| self.value(column, i)).collect()
    }

    /// Cache values override panel values only where the panel is missing.
    fn merge(cache: &SeriesHistory, current: &SeriesHistory) -> SeriesHistory {
        let mut rows: BTreeMap<NaiveDateTime, (bool, BTreeMap<&str, f64>)> = BTreeMap::new();
        for (source, history) in [(0, cache), (1, current)] {
            for i in 0..history.len() {
                let entry = rows
                    .entry(history.times[i])
                    .or_insert_with(|| (history.imputed[i], BTreeMap::new()));
                if source == 1 {
                    entry.0 = history.imputed[i];
                }
                for (name, values) in &history.values {
                    let v = values[i];
                    let slot = entry.1.entry(name.as_str()).or_insert(f64::NAN);
                    if !v.is_nan() || source == 0 {
                        *slot = v;
                    }
                }
            }
        }
        let columns: Vec<&String> = current.values.keys().chain(cache.values.keys()).collect();
        let mut merged = SeriesHistory::default();
        for name in columns {
            merged.values.entry(name.clone()).or_default();
        }
        for (t, (imputed, values)) in rows {
            merged.times.push(t);
            merged.imputed.push(imputed);
            for (name, column) in merged.values.iter_mut() {
                column.push(values.get(name.as_str()).copied().unwrap_or(f64::NAN));
            }
        }
        merged
    }
}

/// Unique (series, time) rows of `panel` for the requested columns.
pub(crate) fn histories(
    panel: &Panel,
    columns: &[String],
    step: StepName,
) -> Result<BTreeMap<SeriesKey, SeriesHistory>> {
    let mut sources = Vec::with_capacity(columns.len());
    for name in columns {
        let values = panel
            .column(name)
            .and_then(Column::to_f64)
            .ok_or_else(|| {
                FeaturizeError::step(step.as_str(), format!("column {name} is missing or not numeric"))
            })?;
        sources.push((name, values));
    }
    let imputed_marker = panel.column(TARGET_IMPUTED_COLUMN).and_then(Column::as_int);

    let mut out = BTreeMap::new();
    for (key, mut rows) in panel.groups() {
        rows.sort_by_key(|&r| panel.times()[r]);
        rows.dedup_by_key(|r| panel.times()[*r]);
        let history = SeriesHistory {
            times: rows.iter().map(|&r| panel.times()[r]).collect(),
            imputed: rows
                .iter()
                .map(|&r| imputed_marker.is_some_and(|m| m[r] == Some(1)))
                .collect(),
            values: sources
                .iter()
                .map(|(name, values)| (name.to_string(), rows.iter().map(|&r| values[r]).collect()))
                .collect(),
        };
        out.insert(key, history);
    }
    Ok(out)
}

/// How much trailing history the cache keeps per series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Retention {
    Last(usize),
    /// Rows newer than `last - steps*offset - window`.
    Span {
        window: Offset,
        offset: Offset,
        steps: i64,
    },
}

/// Trailing training history per series, written at fit and read at transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct LookbackCache {
    series: BTreeMap<SeriesKey, SeriesHistory>,
}

impl LookbackCache {
    pub fn build(
        histories: &BTreeMap<SeriesKey, SeriesHistory>,
        retention: Retention,
        mode: LookbackMode,
        warnings: &mut WarningSet,
    ) -> Self {
        let mut series = BTreeMap::new();
        for (key, history) in histories {
            let source = match mode {
                LookbackMode::ByTime => history.clone(),
                LookbackMode::ByOccurrence => history.observed(),
            };
            let n = source.len();
            let mut tail = match retention {
                Retention::Last(k) => source.select(|i| i + k >= n),
                Retention::Span {
                    window,
                    offset,
                    steps,
                } => match source.times.last().copied() {
                    Some(last) => {
                        let cutoff = window.shift(offset.shift(last, -steps), -1);
                        source.select(|i| source.times[i] > cutoff)
                    }
                    None => source,
                },
            };
            let filled = backfill(&mut tail);
            if filled > 0 {
                warnings.push(FeaturizeWarning::CacheBackfill {
                    series: key.to_string(),
                    filled,
                });
            }
            series.insert(key.clone(), tail);
        }
        debug!(
            component = "lookback",
            event = "lookback.cache.built",
            series = series.len(),
            rows = series.values().map(SeriesHistory::len).sum::<usize>(),
            mode = mode.as_str()
        );
        Self { series }
    }

    pub fn get(&self, key: &SeriesKey) -> Option<&SeriesHistory> {
        self.series.get(key)
    }

    /// Cache rows followed by `histories`, with panel values taking precedence.
    pub fn extend(
        &self,
        histories: BTreeMap<SeriesKey, SeriesHistory>,
    ) -> BTreeMap<SeriesKey, SeriesHistory> {
        histories
            .into_iter()
            .map(|(key, current)| {
                let merged = match self.series.get(&key) {
                    Some(cache) => SeriesHistory::merge(cache, &current),
                    None => current,
                };
                (key, merged)
            })
            .collect()
    }
}

/// Forward then backward fill of every cached column; returns the count filled.
fn backfill(history: &mut SeriesHistory) -> usize {
    let mut filled = 0;
    for values in history.values.values_mut() {
        let mut carry = None;
        for v in values.iter_mut() {
            match (v.is_nan(), carry) {
                (true, Some(c)) => {
                    *v = c;
                    filled += 1;
                }
                (false, _) => carry = Some(*v),
                _ => {}
            }
        }
        if let Some(first) = values.iter().copied().find(|v| !v.is_nan()) {
            for v in values.iter_mut().take_while(|v| v.is_nan()) {
                *v = first;
                filled += 1;
            }
        }
    }
    filled
}

/// Per-row lookup state shared by the lag and rolling operators.
#[derive(Debug)]
pub(crate) struct LookbackFrame {
    pub histories: BTreeMap<SeriesKey, SeriesHistory>,
    pub sequences: BTreeMap<SeriesKey, SeriesHistory>,
    pub origins: Vec<NaiveDateTime>,
    pub horizons: Vec<i64>,
    pub imputed: Vec<bool>,
}

impl LookbackFrame {
    pub fn new(
        panel: &Panel,
        columns: &[String],
        cache: &LookbackCache,
        step: StepName,
    ) -> Result<Self> {
        let origins = panel
            .origins()
            .ok_or_else(|| FeaturizeError::step(step.as_str(), "input has no origin time"))?
            .to_vec();
        let histories = cache.extend(histories(panel, columns, step)?);
        let sequences = histories
            .iter()
            .map(|(k, h)| (k.clone(), h.observed()))
            .collect();
        let horizons = match panel.column(HORIZON_COLUMN).and_then(Column::as_int) {
            Some(h) => h.iter().map(|h| h.unwrap_or(1)).collect(),
            None => vec![1; panel.nrows()],
        };
        let marker = panel.column(TARGET_IMPUTED_COLUMN).and_then(Column::as_int);
        let imputed = (0..panel.nrows())
            .map(|r| marker.is_some_and(|m| m[r] == Some(1)))
            .collect();
        Ok(Self {
            histories,
            sequences,
            origins,
            horizons,
            imputed,
        })
    }

    /// Index in the observed sequence just past the row's origin, `i - (h - 1)`.
    pub fn occurrence_anchor(&self, panel: &Panel, row: usize) -> Option<(&SeriesHistory, i64)> {
        if self.imputed[row] {
            return None;
        }
        let seq = self.sequences.get(&panel.series()[row])?;
        let i = seq.position(panel.times()[row])? as i64;
        Some((seq, i - (self.horizons[row] - 1)))
    }
}
