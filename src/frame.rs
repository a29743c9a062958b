//! Columnar table and the series-indexed panel the featurizers operate on.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{FeaturizeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Float,
    Int,
    Text,
    Datetime,
    Bool,
}

impl DType {
    pub fn is_numeric(self) -> bool {
        matches!(self, DType::Float | DType::Int)
    }
}

/// A single typed column. Missing floats are NaN; other types use `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Vec<f64>),
    Int(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
    Datetime(Vec<Option<NaiveDateTime>>),
    Bool(Vec<Option<bool>>),
}

impl Column {
    pub fn nulls(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::Float => Column::Float(vec![f64::NAN; len]),
            DType::Int => Column::Int(vec![None; len]),
            DType::Text => Column::Text(vec![None; len]),
            DType::Datetime => Column::Datetime(vec![None; len]),
            DType::Bool => Column::Bool(vec![None; len]),
        }
    }

    pub fn text<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Column::Text(values.into_iter().map(|v| Some(v.into())).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::Datetime(v) => v.len(),
            Column::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            Column::Float(_) => DType::Float,
            Column::Int(_) => DType::Int,
            Column::Text(_) => DType::Text,
            Column::Datetime(_) => DType::Datetime,
            Column::Bool(_) => DType::Bool,
        }
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            Column::Float(v) => v[row].is_nan(),
            Column::Int(v) => v[row].is_none(),
            Column::Text(v) => v[row].is_none(),
            Column::Datetime(v) => v[row].is_none(),
            Column::Bool(v) => v[row].is_none(),
        }
    }

    pub fn null_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_null(i)).count()
    }

    pub fn is_all_null(&self) -> bool {
        self.null_count() == self.len()
    }

    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            Column::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&[Option<i64>]> {
        match self {
            Column::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&[Option<String>]> {
        match self {
            Column::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&[Option<NaiveDateTime>]> {
        match self {
            Column::Datetime(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<&[Option<bool>]> {
        match self {
            Column::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Reads a text column as booleans when every present cell is `true` or `false`
    /// (any case) and at least one cell is present.
    pub fn parse_bool(&self) -> Option<Column> {
        let Column::Text(v) = self else {
            return None;
        };
        let mut seen = false;
        let mut out = Vec::with_capacity(v.len());
        for cell in v {
            match cell.as_deref().map(str::trim) {
                None | Some("") => out.push(None),
                Some(s) if s.eq_ignore_ascii_case("true") => {
                    seen = true;
                    out.push(Some(true));
                }
                Some(s) if s.eq_ignore_ascii_case("false") => {
                    seen = true;
                    out.push(Some(false));
                }
                Some(_) => return None,
            }
        }
        seen.then_some(Column::Bool(out))
    }

    /// Numeric view with missing values as NaN; booleans read as 0/1.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Column::Float(v) => Some(v.clone()),
            Column::Int(v) => Some(
                v.iter()
                    .map(|x| x.map(|x| x as f64).unwrap_or(f64::NAN))
                    .collect(),
            ),
            Column::Bool(v) => Some(
                v.iter()
                    .map(|x| x.map(|b| b as u8 as f64).unwrap_or(f64::NAN))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// String rendering of a cell, used for category labels and series keys.
    pub fn cell_label(&self, row: usize) -> Option<String> {
        match self {
            Column::Float(v) => {
                let x = v[row];
                if x.is_nan() {
                    None
                } else if x.fract() == 0.0 && x.abs() < 1e15 {
                    Some(format!("{}", x as i64))
                } else {
                    Some(x.to_string())
                }
            }
            Column::Int(v) => v[row].map(|x| x.to_string()),
            Column::Text(v) => v[row].clone(),
            Column::Datetime(v) => v[row].map(|x| x.format("%Y-%m-%d %H:%M:%S").to_string()),
            Column::Bool(v) => v[row].map(|b| b.to_string()),
        }
    }

    pub fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Float(v) => Column::Float(rows.iter().map(|&i| v[i]).collect()),
            Column::Int(v) => Column::Int(rows.iter().map(|&i| v[i]).collect()),
            Column::Text(v) => Column::Text(rows.iter().map(|&i| v[i].clone()).collect()),
            Column::Datetime(v) => Column::Datetime(rows.iter().map(|&i| v[i]).collect()),
            Column::Bool(v) => Column::Bool(rows.iter().map(|&i| v[i]).collect()),
        }
    }

    /// Like `take`, with `None` producing a missing cell.
    pub fn take_opt(&self, rows: &[Option<usize>]) -> Column {
        match self {
            Column::Float(v) => Column::Float(
                rows.iter()
                    .map(|r| r.map(|i| v[i]).unwrap_or(f64::NAN))
                    .collect(),
            ),
            Column::Int(v) => Column::Int(rows.iter().map(|r| r.and_then(|i| v[i])).collect()),
            Column::Text(v) => {
                Column::Text(rows.iter().map(|r| r.and_then(|i| v[i].clone())).collect())
            }
            Column::Datetime(v) => {
                Column::Datetime(rows.iter().map(|r| r.and_then(|i| v[i])).collect())
            }
            Column::Bool(v) => Column::Bool(rows.iter().map(|r| r.and_then(|i| v[i])).collect()),
        }
    }

    pub fn append(&mut self, other: &Column) -> Result<()> {
        match (self, other) {
            (Column::Float(a), Column::Float(b)) => a.extend_from_slice(b),
            (Column::Int(a), Column::Int(b)) => a.extend_from_slice(b),
            (Column::Text(a), Column::Text(b)) => a.extend(b.iter().cloned()),
            (Column::Datetime(a), Column::Datetime(b)) => a.extend_from_slice(b),
            (Column::Bool(a), Column::Bool(b)) => a.extend_from_slice(b),
            (Column::Float(a), Column::Int(b)) => {
                a.extend(b.iter().map(|x| x.map(|x| x as f64).unwrap_or(f64::NAN)))
            }
            (a, b) => {
                return Err(FeaturizeError::Internal(format!(
                    "cannot append {:?} column to {:?} column",
                    b.dtype(),
                    a.dtype()
                )))
            }
        }
        Ok(())
    }

    /// Casts to `dtype` where the conversion is lossless for present values.
    pub fn cast(&self, dtype: DType) -> Result<Column> {
        if self.dtype() == dtype {
            return Ok(self.clone());
        }
        match (self, dtype) {
            (Column::Int(_) | Column::Bool(_), DType::Float) => {
                Ok(Column::Float(self.to_f64().unwrap_or_default()))
            }
            (Column::Bool(v), DType::Int) => {
                Ok(Column::Int(v.iter().map(|x| x.map(i64::from)).collect()))
            }
            (Column::Text(_), DType::Bool) => {
                if self.is_all_null() {
                    return Ok(Column::Bool(vec![None; self.len()]));
                }
                self.parse_bool().ok_or_else(|| {
                    FeaturizeError::InvalidInput(
                        "text column holds values other than true/false".to_string(),
                    )
                })
            }
            (Column::Float(v), DType::Int) => {
                let mut out = Vec::with_capacity(v.len());
                for &x in v {
                    if x.is_nan() {
                        out.push(None);
                    } else if x.fract() == 0.0 {
                        out.push(Some(x as i64));
                    } else {
                        return Err(FeaturizeError::InvalidInput(format!(
                            "value {x} cannot be cast to an integer column"
                        )));
                    }
                }
                Ok(Column::Int(out))
            }
            (_, DType::Text) => Ok(Column::Text(
                (0..self.len()).map(|i| self.cell_label(i)).collect(),
            )),
            (Column::Text(v), DType::Float) => {
                let mut out = Vec::with_capacity(v.len());
                for cell in v {
                    out.push(match cell.as_deref().map(str::trim) {
                        None | Some("") => f64::NAN,
                        Some(s) => s.parse::<f64>().map_err(|_| {
                            FeaturizeError::InvalidInput(format!(
                                "value {s:?} cannot be cast to a numeric column"
                            ))
                        })?,
                    });
                }
                Ok(Column::Float(out))
            }
            (Column::Text(_), DType::Int) => self.cast(DType::Float)?.cast(DType::Int),
            (from, to) => Err(FeaturizeError::InvalidInput(format!(
                "cannot cast {:?} column to {:?}",
                from.dtype(),
                to
            ))),
        }
    }
}

/// Ordered set of equally long named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        let name = name.into();
        if self.contains(&name) {
            return Err(FeaturizeError::InvalidInput(format!(
                "duplicate column name {name}"
            )));
        }
        self.insert(name, column)?;
        Ok(self)
    }

    /// Replaces a column in place or appends it at the end.
    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if !self.columns.is_empty() && column.len() != self.nrows() {
            return Err(FeaturizeError::Internal(format!(
                "column {name} has {} rows, table has {}",
                column.len(),
                self.nrows()
            )));
        }
        match self.position(&name) {
            Some(idx) => self.columns[idx] = column,
            None => {
                self.names.push(name);
                self.columns.push(column);
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Column> {
        let idx = self.position(name)?;
        self.names.remove(idx);
        Some(self.columns.remove(idx))
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        if self.contains(to) {
            return Err(FeaturizeError::Internal(format!(
                "cannot rename {from} to existing column {to}"
            )));
        }
        let idx = self
            .position(from)
            .ok_or_else(|| FeaturizeError::Internal(format!("no column named {from}")))?;
        self.names[idx] = to.to_string();
        Ok(())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|idx| &self.columns[idx])
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        let idx = self.position(name)?;
        Some(&mut self.columns[idx])
    }

    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| FeaturizeError::InvalidInput(format!("missing required column {name}")))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    pub fn nrows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn take(&self, rows: &[usize]) -> Table {
        Table {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
        }
    }

    pub fn take_opt(&self, rows: &[Option<usize>]) -> Table {
        Table {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take_opt(rows)).collect(),
        }
    }

    /// Reorders to `names`, failing with the list of absent columns.
    pub fn select(&self, names: &[String]) -> Result<Table> {
        let missing: Vec<String> = names
            .iter()
            .filter(|n| !self.contains(n))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(FeaturizeError::SchemaMismatch { missing });
        }
        let mut out = Table::new();
        for name in names {
            if let Some(col) = self.column(name) {
                out.names.push(name.clone());
                out.columns.push(col.clone());
            }
        }
        Ok(out)
    }
}

/// Values of the series-id columns for one series.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesKey(pub Vec<String>);

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("|"))
    }
}

/// Rows indexed by (series, time, optional origin) with feature columns in `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    time_column: String,
    grain_columns: Vec<String>,
    origin_column: String,
    times: Vec<NaiveDateTime>,
    origins: Option<Vec<NaiveDateTime>>,
    series: Vec<SeriesKey>,
    data: Table,
}

pub const DEFAULT_ORIGIN_COLUMN: &str = "origin";

impl Panel {
    pub fn new(
        time_column: impl Into<String>,
        grain_columns: Vec<String>,
        times: Vec<NaiveDateTime>,
        series: Vec<SeriesKey>,
        data: Table,
    ) -> Result<Self> {
        if times.len() != series.len() || (data.ncols() > 0 && data.nrows() != times.len()) {
            return Err(FeaturizeError::Internal(format!(
                "panel index has {} times and {} series keys for {} data rows",
                times.len(),
                series.len(),
                data.nrows()
            )));
        }
        Ok(Self {
            time_column: time_column.into(),
            grain_columns,
            origin_column: DEFAULT_ORIGIN_COLUMN.to_string(),
            times,
            origins: None,
            series,
            data,
        })
    }

    /// Splits `table` into index and data columns.
    pub fn from_table(table: &Table, time_column: &str, grain_columns: &[String]) -> Result<Self> {
        let times = match table.require(time_column)? {
            Column::Datetime(values) => values
                .iter()
                .enumerate()
                .map(|(row, v)| {
                    v.ok_or_else(|| {
                        FeaturizeError::InvalidInput(format!(
                            "time column {time_column} has a missing value at row {row}"
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(FeaturizeError::InvalidInput(format!(
                    "time column {time_column} must hold datetimes, found {:?}",
                    other.dtype()
                )))
            }
        };

        let mut grain_values = Vec::with_capacity(grain_columns.len());
        for name in grain_columns {
            grain_values.push(table.require(name)?);
        }
        let mut series = Vec::with_capacity(times.len());
        for row in 0..times.len() {
            let mut key = Vec::with_capacity(grain_values.len());
            for (name, col) in grain_columns.iter().zip(&grain_values) {
                key.push(col.cell_label(row).ok_or_else(|| {
                    FeaturizeError::InvalidInput(format!(
                        "series-id column {name} has a missing value at row {row}"
                    ))
                })?);
            }
            series.push(SeriesKey(key));
        }

        let mut data = Table::new();
        for (name, col) in table.iter() {
            if name == time_column || grain_columns.iter().any(|g| g == name) {
                continue;
            }
            data.insert(name, col.clone())?;
        }

        Panel::new(time_column, grain_columns.to_vec(), times, series, data)
    }

    pub fn time_column(&self) -> &str {
        &self.time_column
    }

    pub fn grain_columns(&self) -> &[String] {
        &self.grain_columns
    }

    pub fn origin_column(&self) -> &str {
        &self.origin_column
    }

    pub fn set_origin_column(&mut self, name: impl Into<String>) {
        self.origin_column = name.into();
    }

    pub fn nrows(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn origins(&self) -> Option<&[NaiveDateTime]> {
        self.origins.as_deref()
    }

    pub fn has_origin(&self) -> bool {
        self.origins.is_some()
    }

    pub fn set_origins(&mut self, origins: Option<Vec<NaiveDateTime>>) -> Result<()> {
        if let Some(o) = &origins {
            if o.len() != self.nrows() {
                return Err(FeaturizeError::Internal(format!(
                    "{} origins supplied for {} rows",
                    o.len(),
                    self.nrows()
                )));
            }
        }
        self.origins = origins;
        Ok(())
    }

    pub fn series(&self) -> &[SeriesKey] {
        &self.series
    }

    pub fn data(&self) -> &Table {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Table {
        &mut self.data
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.data.column(name)
    }

    pub fn float_column(&self, name: &str) -> Result<Vec<f64>> {
        self.data
            .require(name)?
            .to_f64()
            .ok_or_else(|| FeaturizeError::InvalidInput(format!("column {name} is not numeric")))
    }

    /// Row positions grouped per series, keys ascending, rows in current order.
    pub fn groups(&self) -> BTreeMap<SeriesKey, Vec<usize>> {
        let mut out: BTreeMap<SeriesKey, Vec<usize>> = BTreeMap::new();
        for (row, key) in self.series.iter().enumerate() {
            out.entry(key.clone()).or_default().push(row);
        }
        out
    }

    pub fn series_keys(&self) -> Vec<SeriesKey> {
        self.groups().into_keys().collect()
    }

    pub fn take(&self, rows: &[usize]) -> Panel {
        Panel {
            time_column: self.time_column.clone(),
            grain_columns: self.grain_columns.clone(),
            origin_column: self.origin_column.clone(),
            times: rows.iter().map(|&i| self.times[i]).collect(),
            origins: self
                .origins
                .as_ref()
                .map(|o| rows.iter().map(|&i| o[i]).collect()),
            series: rows.iter().map(|&i| self.series[i].clone()).collect(),
            data: self.data.take(rows),
        }
    }

    pub fn filter(&self, keep: impl Fn(usize) -> bool) -> Panel {
        let rows: Vec<usize> = (0..self.nrows()).filter(|&i| keep(i)).collect();
        self.take(&rows)
    }

    /// Sorts rows by (series, time, origin).
    pub fn sorted(&self) -> Panel {
        let mut rows: Vec<usize> = (0..self.nrows()).collect();
        rows.sort_by(|&a, &b| {
            self.series[a]
                .cmp(&self.series[b])
                .then(self.times[a].cmp(&self.times[b]))
                .then_with(|| match &self.origins {
                    Some(o) => o[a].cmp(&o[b]),
                    None => std::cmp::Ordering::Equal,
                })
        });
        self.take(&rows)
    }

    /// Fails when (series, time[, origin]) is not unique.
    pub fn check_unique_index(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.nrows());
        for row in 0..self.nrows() {
            let origin = self.origins.as_ref().map(|o| o[row]);
            if !seen.insert((&self.series[row], self.times[row], origin)) {
                return Err(FeaturizeError::InvalidInput(format!(
                    "duplicate row for series {} at {}",
                    self.series[row], self.times[row]
                )));
            }
        }
        Ok(())
    }

    /// Flat table: time, series-id columns, origin (if any), then data columns.
    pub fn to_table(&self) -> Result<Table> {
        let mut out = Table::new();
        out.insert(
            self.time_column.clone(),
            Column::Datetime(self.times.iter().copied().map(Some).collect()),
        )?;
        for (level, name) in self.grain_columns.iter().enumerate() {
            out.insert(
                name.clone(),
                Column::Text(self.series.iter().map(|k| k.0.get(level).cloned()).collect()),
            )?;
        }
        if let Some(origins) = &self.origins {
            out.insert(
                self.origin_column.clone(),
                Column::Datetime(origins.iter().copied().map(Some).collect()),
            )?;
        }
        for (name, col) in self.data.iter() {
            out.insert(name, col.clone())?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, d)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date")
    }

    #[test]
    fn panel_splits_index_and_data_columns() {
        let table = Table::new()
            .with_column("date", Column::Datetime(vec![Some(day(2)), Some(day(1))]))
            .and_then(|t| t.with_column("store", Column::Int(vec![Some(7), Some(7)])))
            .and_then(|t| t.with_column("y", Column::Float(vec![2.0, 1.0])))
            .expect("table builds");

        let panel = Panel::from_table(&table, "date", &["store".to_string()]).expect("panel");
        assert_eq!(panel.data().names(), &["y".to_string()]);
        assert_eq!(panel.series()[0], SeriesKey(vec!["7".to_string()]));

        let sorted = panel.sorted();
        assert_eq!(sorted.times(), &[day(1), day(2)]);
        assert_eq!(sorted.float_column("y").expect("y"), vec![1.0, 2.0]);

        let flat = sorted.to_table().expect("flat");
        assert_eq!(
            flat.names(),
            &["date".to_string(), "store".to_string(), "y".to_string()]
        );
    }

    #[test]
    fn duplicate_index_is_rejected() {
        let table = Table::new()
            .with_column("date", Column::Datetime(vec![Some(day(1)), Some(day(1))]))
            .and_then(|t| t.with_column("y", Column::Float(vec![1.0, 2.0])))
            .expect("table builds");
        let panel = Panel::from_table(&table, "date", &[]).expect("panel");
        let err = panel.check_unique_index().expect_err("duplicate key");
        assert!(matches!(err, FeaturizeError::InvalidInput(_)));
    }

    #[test]
    fn select_reports_every_missing_column() {
        let table = Table::new()
            .with_column("a", Column::Float(vec![1.0]))
            .expect("table builds");
        let err = table
            .select(&["a".to_string(), "b".to_string(), "c".to_string()])
            .expect_err("missing columns");
        match err {
            FeaturizeError::SchemaMismatch { missing } => {
                assert_eq!(missing, vec!["b".to_string(), "c".to_string()])
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn take_opt_fills_missing_cells() {
        let col = Column::Int(vec![Some(1), Some(2)]);
        assert_eq!(
            col.take_opt(&[Some(1), None, Some(0)]),
            Column::Int(vec![Some(2), None, Some(1)])
        );
    }

    #[test]
    fn boolean_text_reads_as_zero_one() {
        let text = Column::Text(vec![
            Some("True".to_string()),
            None,
            Some(" false ".to_string()),
        ]);
        let flags = text.parse_bool().expect("boolean literals");
        assert_eq!(flags, Column::Bool(vec![Some(true), None, Some(false)]));
        let numeric = flags.cast(DType::Float).expect("cast");
        let values = numeric.as_float().expect("floats");
        assert_eq!(values[0], 1.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 0.0);

        assert!(Column::text(["yes", "no"]).parse_bool().is_none());
        assert!(Column::Text(vec![None, None]).parse_bool().is_none());
    }
}
