//! Locked output schema and its fingerprint.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{FeaturizeError, Result};
use crate::frame::{DType, Table};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    pub dtype: DType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<SchemaColumn>,
}

impl FeatureSchema {
    pub fn lock(table: &Table) -> Self {
        let columns: Vec<SchemaColumn> = table
            .iter()
            .map(|(name, col)| SchemaColumn {
                name: name.to_string(),
                dtype: col.dtype(),
            })
            .collect();
        let fingerprint = schema_fingerprint(&columns);
        info!(
            component = "schema",
            event = "schema.locked",
            version = SCHEMA_VERSION,
            column_count = columns.len(),
            fingerprint = fingerprint
        );
        Self {
            version: SCHEMA_VERSION,
            fingerprint,
            columns,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Reorders `table` to the locked column order, skipping `except`.
    pub fn apply(&self, table: &Table, except: &[&str]) -> Result<Table> {
        let names: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !except.contains(&c.name.as_str()))
            .map(|c| c.name.clone())
            .collect();
        table.select(&names)
    }
}

pub fn schema_fingerprint(columns: &[SchemaColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{SCHEMA_VERSION};columns:"));
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(format!(":{:?};", column.dtype));
    }
    hex::encode(hasher.finalize())
}

pub fn assert_schema_compatible(expected_fingerprint: &str, actual: &FeatureSchema) -> Result<()> {
    if expected_fingerprint != actual.fingerprint {
        return Err(FeaturizeError::FingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Column;

    fn table(names: &[&str]) -> Table {
        let mut t = Table::new();
        for name in names {
            t.insert(*name, Column::Float(vec![0.0])).expect("insert");
        }
        t
    }

    #[test]
    fn fingerprint_depends_on_order() {
        let a = FeatureSchema::lock(&table(&["x", "y"]));
        let b = FeatureSchema::lock(&table(&["y", "x"]));
        assert_eq!(a.fingerprint.len(), 64);
        assert_ne!(a.fingerprint, b.fingerprint);
        assert!(assert_schema_compatible(&a.fingerprint, &a).is_ok());
        assert!(matches!(
            assert_schema_compatible(&a.fingerprint, &b),
            Err(FeaturizeError::FingerprintMismatch { .. })
        ));
    }

    #[test]
    fn apply_reorders_and_reports_missing() {
        let schema = FeatureSchema::lock(&table(&["x", "y", "z"]));
        let reordered = schema
            .apply(&table(&["z", "x", "y"]), &[])
            .expect("reorder");
        assert_eq!(reordered.names(), schema.names().as_slice());

        let err = schema.apply(&table(&["x"]), &["z"]).expect_err("missing y");
        assert!(matches!(err, FeaturizeError::SchemaMismatch { missing } if missing == vec!["y".to_string()]));
    }
}
