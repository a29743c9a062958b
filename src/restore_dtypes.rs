//! Casting scoring columns back to the dtypes seen at fit.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::RESERVED_COLUMNS;
use crate::error::{FeaturizeError, Result};
use crate::frame::{DType, Panel};
use crate::pipeline::{StepName, Transformer};
use crate::warnings::WarningSet;

#[derive(Debug, Clone)]
pub struct RestoreDtypes {
    target: String,
    dtypes: BTreeMap<String, DType>,
}

impl RestoreDtypes {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            dtypes: BTreeMap::new(),
        }
    }

    pub fn dtypes(&self) -> &BTreeMap<String, DType> {
        &self.dtypes
    }
}

impl Transformer for RestoreDtypes {
    fn name(&self) -> StepName {
        StepName::RestoreDtypes
    }

    fn fit(&mut self, panel: &Panel, _warnings: &mut WarningSet) -> Result<()> {
        self.dtypes = panel
            .data()
            .iter()
            .filter(|(name, col)| {
                *name != self.target && !RESERVED_COLUMNS.contains(name) && !col.is_all_null()
            })
            .map(|(name, col)| (name.to_string(), col.dtype()))
            .collect();
        debug!(
            component = "restore_dtypes",
            event = "restore_dtypes.snapshot",
            columns = self.dtypes.len()
        );
        Ok(())
    }

    fn transform(&self, mut panel: Panel, _warnings: &mut WarningSet) -> Result<Panel> {
        for (name, &dtype) in &self.dtypes {
            let Some(column) = panel.column(name) else {
                continue;
            };
            // Scoring sets may carry NaN in columns that were integral at fit.
            let wanted = if dtype.is_numeric() { DType::Float } else { dtype };
            if column.dtype() == wanted {
                continue;
            }
            let cast = column.cast(wanted).map_err(|err| {
                FeaturizeError::step(
                    StepName::RestoreDtypes.as_str(),
                    format!("column {name}: {err}"),
                )
            })?;
            panel.data_mut().insert(name.clone(), cast)?;
        }
        Ok(panel)
    }

    fn preview_columns(&self) -> Vec<String> {
        Vec::new()
    }
}
