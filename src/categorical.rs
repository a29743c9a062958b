//! Category encoders: one-hot binarizer and integer numericalizer.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::Result;
use crate::frame::{Column, DType, Panel};
use crate::pipeline::{StepName, Transformer};
use crate::warnings::{FeaturizeWarning, WarningSet};

/// Columns with more distinct values than this are numericalized instead of one-hot encoded.
pub const MAX_ONE_HOT_CATEGORIES: usize = 20;
pub const UNSEEN_CODE: i64 = -1;
pub const NAN_CATEGORY: &str = "nan";

#[derive(Debug, Clone, PartialEq)]
struct Vocabulary {
    categories: Vec<String>,
    saw_null: bool,
}

impl Vocabulary {
    fn learn(values: &[Option<String>]) -> Self {
        let categories: BTreeSet<&str> = values.iter().flatten().map(String::as_str).collect();
        Self {
            categories: categories.into_iter().map(str::to_string).collect(),
            saw_null: values.iter().any(Option::is_none),
        }
    }

    fn position(&self, value: &str) -> Option<usize> {
        self.categories.binary_search_by(|c| c.as_str().cmp(value)).ok()
    }

    fn unseen(&self, values: &[Option<String>]) -> Vec<String> {
        let unseen: BTreeSet<&str> = values
            .iter()
            .flatten()
            .filter(|v| self.position(v).is_none())
            .map(String::as_str)
            .collect();
        unseen.into_iter().map(str::to_string).collect()
    }
}

fn text_values(panel: &Panel, column: &str) -> Option<Vec<Option<String>>> {
    panel.column(column).and_then(|c| match c {
        Column::Text(v) => Some(v.clone()),
        other => other.cast(DType::Text).ok().and_then(|c| match c {
            Column::Text(v) => Some(v),
            _ => None,
        }),
    })
}

/// One indicator column per training category, plus `<col>_nan` when nulls were seen.
#[derive(Debug, Clone, Default)]
pub struct CategoryBinarizer {
    drop_first: bool,
    vocabularies: BTreeMap<String, Vocabulary>,
}

impl CategoryBinarizer {
    pub fn new(drop_first: bool) -> Self {
        Self {
            drop_first,
            vocabularies: BTreeMap::new(),
        }
    }

    pub fn fit_column(&mut self, panel: &Panel, column: &str) {
        if let Some(values) = text_values(panel, column) {
            self.vocabularies
                .insert(column.to_string(), Vocabulary::learn(&values));
        }
    }

    fn output_names(&self, column: &str, vocab: &Vocabulary) -> Vec<String> {
        let skip = usize::from(self.drop_first);
        let mut names: Vec<String> = vocab
            .categories
            .iter()
            .skip(skip)
            .map(|c| format!("{column}_{c}"))
            .collect();
        if vocab.saw_null {
            names.push(format!("{column}_{NAN_CATEGORY}"));
        }
        names
    }

    pub fn columns(&self) -> Vec<String> {
        self.vocabularies
            .iter()
            .flat_map(|(col, vocab)| self.output_names(col, vocab))
            .collect()
    }

    pub fn apply(&self, panel: &mut Panel, warnings: &mut WarningSet) -> Result<()> {
        for (column, vocab) in &self.vocabularies {
            let Some(values) = text_values(panel, column) else {
                continue;
            };
            let unseen = vocab.unseen(&values);
            if !unseen.is_empty() {
                warnings.push(FeaturizeWarning::UnseenCategories {
                    column: column.clone(),
                    values: unseen,
                });
            }
            let codes: Vec<Option<usize>> =
                values.iter().map(|v| v.as_deref().and_then(|v| vocab.position(v))).collect();

            panel.data_mut().remove(column);
            let skip = usize::from(self.drop_first);
            for (idx, category) in vocab.categories.iter().enumerate().skip(skip) {
                let indicator = codes.iter().map(|c| Some((*c == Some(idx)) as i64)).collect();
                panel
                    .data_mut()
                    .insert(format!("{column}_{category}"), Column::Int(indicator))?;
            }
            if vocab.saw_null {
                let indicator = codes.iter().map(|c| Some(c.is_none() as i64)).collect();
                panel
                    .data_mut()
                    .insert(format!("{column}_{NAN_CATEGORY}"), Column::Int(indicator))?;
            }
        }
        Ok(())
    }
}

/// Integer codes `0..k` in sorted category order; unseen and missing map to `-1`.
#[derive(Debug, Clone, Default)]
pub struct Numericalizer {
    vocabularies: BTreeMap<String, Vocabulary>,
}

impl Numericalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit_column(&mut self, panel: &Panel, column: &str) {
        if let Some(values) = text_values(panel, column) {
            self.vocabularies
                .insert(column.to_string(), Vocabulary::learn(&values));
        }
    }

    pub fn columns(&self) -> Vec<String> {
        self.vocabularies.keys().cloned().collect()
    }

    pub fn apply(&self, panel: &mut Panel, warnings: &mut WarningSet) -> Result<()> {
        for (column, vocab) in &self.vocabularies {
            let Some(values) = text_values(panel, column) else {
                continue;
            };
            let unseen = vocab.unseen(&values);
            if !unseen.is_empty() {
                warnings.push(FeaturizeWarning::UnseenCategories {
                    column: column.clone(),
                    values: unseen,
                });
            }
            let codes = values
                .iter()
                .map(|v| {
                    Some(
                        v.as_deref()
                            .and_then(|v| vocab.position(v))
                            .map(|p| p as i64)
                            .unwrap_or(UNSEEN_CODE),
                    )
                })
                .collect();
            panel.data_mut().insert(column.clone(), Column::Int(codes))?;
        }
        Ok(())
    }
}

/// Encodes every categorical column, choosing the encoder by cardinality at fit.
#[derive(Debug, Clone)]
pub struct CategoricalFeaturizer {
    columns: Vec<String>,
    binarizer: CategoryBinarizer,
    numericalizer: Numericalizer,
}

impl CategoricalFeaturizer {
    pub fn new(columns: Vec<String>, drop_first: bool) -> Self {
        Self {
            columns,
            binarizer: CategoryBinarizer::new(drop_first),
            numericalizer: Numericalizer::new(),
        }
    }

    /// Adds columns created by earlier steps, such as grain features.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
        self
    }

    pub fn binarized_columns(&self) -> Vec<String> {
        self.binarizer.vocabularies.keys().cloned().collect()
    }

    pub fn numericalized_columns(&self) -> Vec<String> {
        self.numericalizer.columns()
    }
}

impl Transformer for CategoricalFeaturizer {
    fn name(&self) -> StepName {
        StepName::Categoricals
    }

    fn fit(&mut self, panel: &Panel, _warnings: &mut WarningSet) -> Result<()> {
        self.binarizer = CategoryBinarizer::new(self.binarizer.drop_first);
        self.numericalizer = Numericalizer::new();
        for column in &self.columns {
            let Some(values) = text_values(panel, column) else {
                continue;
            };
            let cardinality = Vocabulary::learn(&values).categories.len();
            if cardinality <= MAX_ONE_HOT_CATEGORIES {
                self.binarizer.fit_column(panel, column);
            } else {
                self.numericalizer.fit_column(panel, column);
            }
        }
        debug!(
            component = "categorical",
            event = "categorical.fit",
            one_hot = ?self.binarized_columns(),
            numericalized = ?self.numericalized_columns()
        );
        Ok(())
    }

    fn transform(&self, mut panel: Panel, warnings: &mut WarningSet) -> Result<Panel> {
        self.binarizer.apply(&mut panel, warnings)?;
        self.numericalizer.apply(&mut panel, warnings)?;
        Ok(panel)
    }

    fn preview_columns(&self) -> Vec<String> {
        let mut names = self.binarizer.columns();
        names.extend(self.numericalizer.columns());
        names
    }
}
