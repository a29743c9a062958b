//! One feature column per series-id level.

use crate::config::DUMMY_GRAIN_COLUMN;
use crate::error::{FeaturizeError, Result};
use crate::frame::{Column, Panel};
use crate::pipeline::{StepName, Transformer};
use crate::warnings::{FeaturizeWarning, WarningSet};

pub const GRAIN_PREFIX: &str = "grain";
pub const GRAIN_SEPARATOR: &str = "_";

#[derive(Debug, Clone)]
pub struct GrainIndexFeaturizer {
    allow_overwrite: bool,
    levels: Vec<(usize, String)>,
}

impl GrainIndexFeaturizer {
    pub fn new(allow_overwrite: bool) -> Self {
        Self {
            allow_overwrite,
            levels: Vec::new(),
        }
    }

    pub fn feature_name(id_column: &str) -> String {
        format!("{GRAIN_PREFIX}{GRAIN_SEPARATOR}{id_column}")
    }
}

impl Transformer for GrainIndexFeaturizer {
    fn name(&self) -> StepName {
        StepName::GrainFeatures
    }

    fn fit(&mut self, panel: &Panel, _warnings: &mut WarningSet) -> Result<()> {
        self.levels = panel
            .grain_columns()
            .iter()
            .enumerate()
            .filter(|(_, name)| name.as_str() != DUMMY_GRAIN_COLUMN)
            .map(|(level, name)| (level, Self::feature_name(name)))
            .collect();
        for (_, name) in &self.levels {
            if panel.data().contains(name) && !self.allow_overwrite {
                return Err(FeaturizeError::step(
                    StepName::GrainFeatures.as_str(),
                    format!("column {name} already exists; enable column overwrite to replace it"),
                ));
            }
        }
        Ok(())
    }

    fn transform(&self, mut panel: Panel, warnings: &mut WarningSet) -> Result<Panel> {
        for (level, name) in &self.levels {
            if panel.data().contains(name) {
                if !self.allow_overwrite {
                    return Err(FeaturizeError::step(
                        StepName::GrainFeatures.as_str(),
                        format!("column {name} already exists"),
                    ));
                }
                warnings.push(FeaturizeWarning::ColumnOverwrite {
                    column: name.clone(),
                });
            }
            let values = panel
                .series()
                .iter()
                .map(|key| key.0.get(*level).cloned())
                .collect();
            panel.data_mut().insert(name.clone(), Column::Text(values))?;
        }
        Ok(panel)
    }

    fn preview_columns(&self) -> Vec<String> {
        self.levels.iter().map(|(_, name)| name.clone()).collect()
    }
}
