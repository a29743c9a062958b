//! Stateful transformer contract and the ordered step pipeline.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::frame::Panel;
use crate::warnings::WarningSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    RestoreDtypes,
    ShortSeries,
    DropColumns,
    NumericImputer,
    TimeIndex,
    DatetimeColumns,
    GrainFeatures,
    Categoricals,
    Stl,
    MaxHorizon,
    LagLead,
    RollingWindow,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::RestoreDtypes => "restore_dtypes",
            StepName::ShortSeries => "short_series",
            StepName::DropColumns => "drop_columns",
            StepName::NumericImputer => "numeric_imputer",
            StepName::TimeIndex => "time_index",
            StepName::DatetimeColumns => "datetime_columns",
            StepName::GrainFeatures => "grain_features",
            StepName::Categoricals => "categoricals",
            StepName::Stl => "stl",
            StepName::MaxHorizon => "max_horizon",
            StepName::LagLead => "lag_lead",
            StepName::RollingWindow => "rolling_window",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fit on training panels, then reapply the fitted state to new panels.
pub trait Transformer: fmt::Debug + Send + Sync {
    fn name(&self) -> StepName;

    fn fit(&mut self, panel: &Panel, warnings: &mut WarningSet) -> Result<()>;

    fn transform(&self, panel: Panel, warnings: &mut WarningSet) -> Result<Panel>;

    fn fit_transform(&mut self, panel: Panel, warnings: &mut WarningSet) -> Result<Panel> {
        self.fit(&panel, warnings)?;
        self.transform(panel, warnings)
    }

    /// Columns added by this step, known after fit.
    fn preview_columns(&self) -> Vec<String>;
}

#[derive(Debug, Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn Transformer>>,
}

impl Pipeline {
    pub fn new(steps: Vec<Box<dyn Transformer>>) -> Self {
        Self { steps }
    }

    pub fn step_names(&self) -> Vec<StepName> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn step(&self, name: StepName) -> Option<&dyn Transformer> {
        self.steps
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn fit_transform(&mut self, mut panel: Panel, warnings: &mut WarningSet) -> Result<Panel> {
        for step in &mut self.steps {
            debug!(
                component = "pipeline",
                event = "pipeline.step.start",
                step = %step.name(),
                rows = panel.nrows()
            );
            panel = step.fit_transform(panel, warnings)?;
            info!(
                component = "pipeline",
                event = "pipeline.step.finish",
                step = %step.name(),
                phase = "fit",
                rows = panel.nrows(),
                columns = panel.data().ncols()
            );
        }
        Ok(panel)
    }

    pub fn transform(&self, mut panel: Panel, warnings: &mut WarningSet) -> Result<Panel> {
        for step in &self.steps {
            panel = step.transform(panel, warnings)?;
            debug!(
                component = "pipeline",
                event = "pipeline.step.finish",
                step = %step.name(),
                phase = "transform",
                rows = panel.nrows(),
                columns = panel.data().ncols()
            );
        }
        Ok(panel)
    }

    /// Columns contributed by each step, in pipeline order.
    pub fn features_by_step(&self) -> Vec<(StepName, Vec<String>)> {
        self.steps
            .iter()
            .map(|s| (s.name(), s.preview_columns()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Column, Table};
    use chrono::NaiveDate;

    #[derive(Debug)]
    struct AddConstant {
        column: &'static str,
        fitted: bool,
    }

    impl Transformer for AddConstant {
        fn name(&self) -> StepName {
            StepName::DropColumns
        }

        fn fit(&mut self, _panel: &Panel, _warnings: &mut WarningSet) -> Result<()> {
            self.fitted = true;
            Ok(())
        }

        fn transform(&self, mut panel: Panel, _warnings: &mut WarningSet) -> Result<Panel> {
            let n = panel.nrows();
            panel
                .data_mut()
                .insert(self.column, Column::Float(vec![1.0; n]))?;
            Ok(panel)
        }

        fn preview_columns(&self) -> Vec<String> {
            vec![self.column.to_string()]
        }
    }

    #[test]
    fn steps_run_in_order_and_report_columns() {
        let t = NaiveDate::from_ymd_opt(2020, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("date");
        let table = Table::new()
            .with_column("t", Column::Datetime(vec![Some(t)]))
            .expect("table");
        let panel = Panel::from_table(&table, "t", &[]).expect("panel");

        let mut pipeline = Pipeline::new(vec![
            Box::new(AddConstant {
                column: "a",
                fitted: false,
            }),
            Box::new(AddConstant {
                column: "b",
                fitted: false,
            }),
        ]);
        let mut warnings = WarningSet::new();
        let out = pipeline
            .fit_transform(panel, &mut warnings)
            .expect("pipeline runs");
        assert_eq!(out.data().names(), &["a".to_string(), "b".to_string()]);
        assert_eq!(pipeline.features_by_step().len(), 2);
    }
}
