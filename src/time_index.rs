//! Calendar and holiday features of the time index.

use tracing::info;

use crate::calendar::{has_intraday_component, CalendarFeature};
use crate::error::Result;
use crate::frame::{Column, Panel};
use crate::holidays::Country;
use crate::offset::Offset;
use crate::pipeline::{StepName, Transformer};
use crate::stats;
use crate::warnings::{FeaturizeWarning, WarningSet};

pub const HOLIDAY_COLUMN: &str = "_holiday";
pub const PAID_TIME_OFF_COLUMN: &str = "_is_paid_time_off";
pub const CORRELATION_CUTOFF: f64 = 0.99;

#[derive(Debug, Clone)]
pub struct TimeIndexFeaturizer {
    offset: Offset,
    country: Option<String>,
    retained: Vec<CalendarFeature>,
    holidays: Option<Country>,
}

impl TimeIndexFeaturizer {
    pub fn new(offset: Offset, country: Option<String>) -> Self {
        Self {
            offset,
            country,
            retained: Vec::new(),
            holidays: None,
        }
    }

    pub fn retained(&self) -> &[CalendarFeature] {
        &self.retained
    }

    fn feature_values(panel: &Panel, feature: CalendarFeature) -> Vec<f64> {
        panel
            .times()
            .iter()
            .map(|&t| feature.numeric(t).unwrap_or(f64::NAN))
            .collect()
    }
}

/// Keeps features in order, dropping any that is nearly collinear with one already kept.
pub(crate) fn prune_correlated<K: Clone>(candidates: Vec<(K, Vec<f64>)>) -> Vec<K> {
    let mut kept: Vec<(K, Vec<f64>)> = Vec::new();
    for (key, values) in candidates {
        let collinear = kept
            .iter()
            .any(|(_, other)| stats::pearson(&values, other).abs() >= CORRELATION_CUTOFF);
        if !collinear {
            kept.push((key, values));
        }
    }
    kept.into_iter().map(|(k, _)| k).collect()
}

impl Transformer for TimeIndexFeaturizer {
    fn name(&self) -> StepName {
        StepName::TimeIndex
    }

    fn fit(&mut self, panel: &Panel, warnings: &mut WarningSet) -> Result<()> {
        let intraday = has_intraday_component(panel.times());
        let candidates: Vec<(CalendarFeature, Vec<f64>)> = CalendarFeature::ALL
            .iter()
            .copied()
            .filter(|f| !f.is_label())
            .filter(|f| intraday || !f.is_intraday())
            .map(|f| (f, Self::feature_values(panel, f)))
            .filter(|(_, values)| !stats::variance_is_zero(values))
            .collect();
        self.retained = prune_correlated(candidates);

        self.holidays = None;
        if let Some(raw) = self.country.as_deref().filter(|_| self.offset.is_daily()) {
            match Country::parse(raw) {
                Some(country) => self.holidays = Some(country),
                None => warnings.push(FeaturizeWarning::UnsupportedCountry {
                    country: raw.to_string(),
                }),
            }
        }
        info!(
            component = "time_index",
            event = "time_index.fit",
            retained = ?self.retained.iter().map(|f| f.name()).collect::<Vec<_>>(),
            holidays = self.holidays.is_some()
        );
        Ok(())
    }

    fn transform(&self, mut panel: Panel, warnings: &mut WarningSet) -> Result<Panel> {
        let mut columns: Vec<(String, Column)> = self
            .retained
            .iter()
            .map(|&f| (f.name().to_string(), Column::Float(Self::feature_values(&panel, f))))
            .collect();
        if let Some(country) = self.holidays {
            let found: Vec<_> = panel
                .times()
                .iter()
                .map(|t| country.holiday(t.date()))
                .collect();
            columns.push((
                HOLIDAY_COLUMN.to_string(),
                Column::Text(found.iter().map(|h| h.map(|h| h.name.to_string())).collect()),
            ));
            columns.push((
                PAID_TIME_OFF_COLUMN.to_string(),
                Column::Float(
                    found
                        .iter()
                        .map(|h| h.map(|h| h.paid_time_off as u8 as f64).unwrap_or(0.0))
                        .collect(),
                ),
            ));
        }
        for (name, column) in columns {
            if panel.data().contains(&name) {
                warnings.push(FeaturizeWarning::ColumnOverwrite {
                    column: name.clone(),
                });
            }
            panel.data_mut().insert(name, column)?;
        }
        Ok(panel)
    }

    fn preview_columns(&self) -> Vec<String> {
        let mut names: Vec<String> = self.retained.iter().map(|f| f.name().to_string()).collect();
        if self.holidays.is_some() {
            names.push(HOLIDAY_COLUMN.to_string());
            names.push(PAID_TIME_OFF_COLUMN.to_string());
        }
        names
    }
}
