//! Expands user datetime columns (other than the time index) into calendar features.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::calendar::{has_intraday_component, CalendarFeature};
use crate::error::Result;
use crate::frame::{Column, Panel};
use crate::pipeline::{StepName, Transformer};
use crate::stats;
use crate::warnings::WarningSet;

#[derive(Debug, Clone)]
pub struct DatetimeColumnFeaturizer {
    columns: Vec<String>,
    retained: BTreeMap<String, Vec<CalendarFeature>>,
}

impl DatetimeColumnFeaturizer {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            retained: BTreeMap::new(),
        }
    }

    fn feature_name(column: &str, feature: CalendarFeature) -> String {
        format!("{column}_{}", feature.name())
    }

    fn values(panel: &Panel, column: &str) -> Option<Vec<Option<NaiveDateTime>>> {
        panel
            .column(column)
            .and_then(Column::as_datetime)
            .map(<[_]>::to_vec)
    }
}

impl Transformer for DatetimeColumnFeaturizer {
    fn name(&self) -> StepName {
        StepName::DatetimeColumns
    }

    fn fit(&mut self, panel: &Panel, _warnings: &mut WarningSet) -> Result<()> {
        self.retained.clear();
        for name in &self.columns {
            let Some(values) = Self::values(panel, name) else {
                continue;
            };
            let present: Vec<NaiveDateTime> = values.iter().flatten().copied().collect();
            let intraday = has_intraday_component(&present);
            let features: Vec<CalendarFeature> = CalendarFeature::ALL
                .iter()
                .copied()
                .filter(|f| !f.is_label() && (intraday || !f.is_intraday()))
                .filter(|f| {
                    let col = f.column(&values);
                    col.as_float().is_some_and(|v| !stats::variance_is_zero(v))
                })
                .collect();
            self.retained.insert(name.clone(), features);
        }
        debug!(
            component = "datetime_features",
            event = "datetime_features.fit",
            columns = self.retained.len()
        );
        Ok(())
    }

    fn transform(&self, mut panel: Panel, _warnings: &mut WarningSet) -> Result<Panel> {
        for (name, features) in &self.retained {
            let Some(values) = Self::values(&panel, name) else {
                continue;
            };
            for feature in features {
                panel
                    .data_mut()
                    .insert(Self::feature_name(name, *feature), feature.column(&values))?;
            }
            panel.data_mut().remove(name);
        }
        Ok(panel)
    }

    fn preview_columns(&self) -> Vec<String> {
        self.retained
            .iter()
            .flat_map(|(name, features)| features.iter().map(|f| Self::feature_name(name, *f)))
            .collect()
    }
}
