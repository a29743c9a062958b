//! Removes user-listed columns, refusing to drop index and marker columns.

use tracing::debug;

use crate::config::RESERVED_COLUMNS;
use crate::error::Result;
use crate::frame::Panel;
use crate::pipeline::{StepName, Transformer};
use crate::warnings::{FeaturizeWarning, WarningSet};

#[derive(Debug, Clone)]
pub struct DropColumns {
    requested: Vec<String>,
    protected: Vec<String>,
    dropped: Vec<String>,
}

impl DropColumns {
    /// `protected` names (target, time, series ids) are never dropped.
    pub fn new(requested: Vec<String>, protected: Vec<String>) -> Self {
        Self {
            requested,
            protected,
            dropped: Vec::new(),
        }
    }

    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }

    fn is_protected(&self, name: &str) -> bool {
        RESERVED_COLUMNS.contains(&name) || self.protected.iter().any(|p| p == name)
    }
}

impl Transformer for DropColumns {
    fn name(&self) -> StepName {
        StepName::DropColumns
    }

    fn fit(&mut self, panel: &Panel, warnings: &mut WarningSet) -> Result<()> {
        self.dropped.clear();
        for name in &self.requested {
            if self.is_protected(name) {
                warnings.push(FeaturizeWarning::ReservedColumnNotDropped {
                    column: name.clone(),
                });
            } else if panel.data().contains(name) {
                self.dropped.push(name.clone());
            }
        }
        debug!(
            component = "drop_columns",
            event = "drop_columns.fit",
            dropped = ?self.dropped
        );
        Ok(())
    }

    fn transform(&self, mut panel: Panel, _warnings: &mut WarningSet) -> Result<Panel> {
        for name in &self.dropped {
            panel.data_mut().remove(name);
        }
        Ok(panel)
    }

    fn preview_columns(&self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TARGET_IMPUTED_COLUMN;
    use crate::frame::{Column, Table};
    use chrono::NaiveDate;

    #[test]
    fn reserved_and_protected_columns_survive() {
        let t = NaiveDate::from_ymd_opt(2021, 3, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("date");
        let table = Table::new()
            .with_column("date", Column::Datetime(vec![Some(t)]))
            .and_then(|x| x.with_column("y", Column::Float(vec![1.0])))
            .and_then(|x| x.with_column("noise", Column::Float(vec![0.5])))
            .and_then(|x| x.with_column(TARGET_IMPUTED_COLUMN, Column::Int(vec![Some(0)])))
            .expect("table");
        let panel = Panel::from_table(&table, "date", &[]).expect("panel");

        let mut step = DropColumns::new(
            vec![
                "noise".to_string(),
                "y".to_string(),
                TARGET_IMPUTED_COLUMN.to_string(),
                "absent".to_string(),
            ],
            vec!["y".to_string()],
        );
        let mut warnings = WarningSet::new();
        let out = step.fit_transform(panel, &mut warnings).expect("drop");
        assert_eq!(
            out.data().names(),
            &["y".to_string(), TARGET_IMPUTED_COLUMN.to_string()]
        );
        assert_eq!(warnings.len(), 2);
        assert!(warnings.contains_code("reserved_column_not_dropped"));
    }
}
