//! Imputation of numeric feature columns with `<col>_WASNULL` markers.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::ImputeStrategy;
use crate::error::Result;
use crate::frame::{Column, Panel};
use crate::pipeline::{StepName, Transformer};
use crate::stats;
use crate::warnings::WarningSet;

pub const WASNULL_SUFFIX: &str = "_WASNULL";

#[derive(Debug, Clone, PartialEq)]
struct ColumnFill {
    strategy: ImputeStrategy,
    value: f64,
    marker: bool,
}

#[derive(Debug, Clone)]
pub struct NumericImputer {
    columns: Vec<String>,
    strategies: BTreeMap<String, ImputeStrategy>,
    fills: BTreeMap<String, ColumnFill>,
}

impl NumericImputer {
    /// Columns without an explicit strategy are filled with their training mean.
    pub fn new(columns: Vec<String>, strategies: BTreeMap<String, ImputeStrategy>) -> Self {
        Self {
            columns,
            strategies,
            fills: BTreeMap::new(),
        }
    }

    pub fn marker_name(column: &str) -> String {
        format!("{column}{WASNULL_SUFFIX}")
    }

    fn fill_series(fill: &ColumnFill, values: &mut [f64], rows: &[usize]) {
        let mut carry = None;
        for &r in rows {
            if values[r].is_nan() {
                values[r] = match fill.strategy {
                    ImputeStrategy::Ffill => carry.unwrap_or(fill.value),
                    _ => fill.value,
                };
            } else {
                carry = Some(values[r]);
            }
        }
    }
}

impl Transformer for NumericImputer {
    fn name(&self) -> StepName {
        StepName::NumericImputer
    }

    fn fit(&mut self, panel: &Panel, _warnings: &mut WarningSet) -> Result<()> {
        self.fills.clear();
        for name in &self.columns {
            let Some(values) = panel.column(name).and_then(Column::to_f64) else {
                continue;
            };
            let strategy = self
                .strategies
                .get(name)
                .copied()
                .unwrap_or(ImputeStrategy::Mean);
            let value = match strategy {
                ImputeStrategy::Ffill | ImputeStrategy::Mean => stats::mean(&values),
                ImputeStrategy::Median => stats::median(&values),
                ImputeStrategy::Mode => stats::mode(&values),
                ImputeStrategy::Constant(c) => c,
            };
            let marker = values.iter().any(|v| v.is_nan());
            self.fills.insert(
                name.clone(),
                ColumnFill {
                    strategy,
                    value: if value.is_nan() { 0.0 } else { value },
                    marker,
                },
            );
        }
        debug!(
            component = "numeric_imputer",
            event = "numeric_imputer.fit",
            columns = self.fills.len(),
            markers = self.fills.values().filter(|f| f.marker).count()
        );
        Ok(())
    }

    fn transform(&self, mut panel: Panel, _warnings: &mut WarningSet) -> Result<Panel> {
        let mut ordered: Vec<usize> = (0..panel.nrows()).collect();
        ordered.sort_by(|&a, &b| {
            panel.series()[a]
                .cmp(&panel.series()[b])
                .then(panel.times()[a].cmp(&panel.times()[b]))
        });
        let groups: Vec<Vec<usize>> = {
            let mut out: Vec<Vec<usize>> = Vec::new();
            for &r in &ordered {
                match out.last_mut() {
                    Some(g) if panel.series()[g[0]] == panel.series()[r] => g.push(r),
                    _ => out.push(vec![r]),
                }
            }
            out
        };

        for (name, fill) in &self.fills {
            let Some(mut values) = panel.column(name).and_then(Column::to_f64) else {
                continue;
            };
            let marker: Vec<Option<i64>> =
                values.iter().map(|v| Some(v.is_nan() as i64)).collect();
            for rows in &groups {
                Self::fill_series(fill, &mut values, rows);
            }
            panel.data_mut().insert(name.clone(), Column::Float(values))?;
            if fill.marker {
                panel
                    .data_mut()
                    .insert(Self::marker_name(name), Column::Int(marker))?;
            }
        }
        Ok(panel)
    }

    fn preview_columns(&self) -> Vec<String> {
        self.fills
            .iter()
            .filter(|(_, f)| f.marker)
            .map(|(name, _)| Self::marker_name(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Table;
    use chrono::{Duration, NaiveDate};

    fn panel(price: Vec<f64>, promo: Vec<Option<i64>>) -> Panel {
        let start = NaiveDate::from_ymd_opt(2022, 5, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("date");
        let n = price.len();
        let table = Table::new()
            .with_column(
                "date",
                Column::Datetime((0..n).map(|i| Some(start + Duration::days(i as i64))).collect()),
            )
            .and_then(|t| t.with_column("price", Column::Float(price)))
            .and_then(|t| t.with_column("promo", Column::Int(promo)))
            .expect("table");
        Panel::from_table(&table, "date", &[]).expect("panel")
    }

    #[test]
    fn missing_values_get_mean_and_marker() {
        let train = panel(
            vec![1.0, f64::NAN, 3.0],
            vec![Some(1), Some(0), Some(1)],
        );
        let mut imputer = NumericImputer::new(
            vec!["price".to_string(), "promo".to_string()],
            BTreeMap::new(),
        );
        let out = imputer
            .fit_transform(train, &mut WarningSet::new())
            .expect("impute");
        assert_eq!(out.float_column("price").expect("price"), vec![1.0, 2.0, 3.0]);
        assert_eq!(
            out.column("price_WASNULL"),
            Some(&Column::Int(vec![Some(0), Some(1), Some(0)]))
        );
        assert!(out.column("promo_WASNULL").is_none());
        assert_eq!(imputer.preview_columns(), vec!["price_WASNULL".to_string()]);
    }

    #[test]
    fn override_strategy_is_used_at_transform() {
        let train = panel(vec![1.0, 1.0, 7.0], vec![Some(0); 3]);
        let mut strategies = BTreeMap::new();
        strategies.insert("price".to_string(), ImputeStrategy::Median);
        let mut imputer = NumericImputer::new(vec!["price".to_string()], strategies);
        imputer.fit(&train, &mut WarningSet::new()).expect("fit");

        let score = panel(vec![f64::NAN, 4.0], vec![Some(0); 2]);
        let out = imputer
            .transform(score, &mut WarningSet::new())
            .expect("transform");
        assert_eq!(out.float_column("price").expect("price"), vec![1.0, 4.0]);
        assert!(out.column("price_WASNULL").is_none());
    }
}
