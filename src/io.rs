//! CSV ingestion into a typed `Table`.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use tracing::info;

use crate::error::{FeaturizeError, Result};
use crate::frame::{Column, DType, Table};

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Declared column types; undeclared columns are read as text, or as booleans when
/// every present cell is `true`/`false`.
pub type ColumnTypes = BTreeMap<String, DType>;

pub fn read_table_csv(path: &Path, types: &ColumnTypes) -> Result<Table> {
    let file = std::fs::File::open(path)?;
    let table = read_table(file, types)?;
    info!(
        component = "io",
        event = "io.csv.loaded",
        path = %path.display(),
        rows = table.nrows(),
        columns = table.ncols()
    );
    Ok(table)
}

pub fn read_table<R: Read>(reader: R, types: &ColumnTypes) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    for declared in types.keys() {
        if !headers.iter().any(|h| h == declared) {
            return Err(FeaturizeError::InvalidInput(format!(
                "declared column {declared} is not in the CSV header"
            )));
        }
    }

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record: StringRecord = record?;
        for (idx, column) in cells.iter_mut().enumerate() {
            column.push(record.get(idx).unwrap_or_default().to_string());
        }
    }

    let mut table = Table::new();
    for (name, raw) in headers.iter().zip(cells) {
        let column = match types.get(name) {
            Some(dtype) => parse_column(name, &raw, *dtype)?,
            None => {
                let text = parse_column(name, &raw, DType::Text)?;
                text.parse_bool().unwrap_or(text)
            }
        };
        table = table.with_column(name, column)?;
    }
    Ok(table)
}

fn parse_column(name: &str, raw: &[String], dtype: DType) -> Result<Column> {
    let bad = |value: &str| {
        FeaturizeError::InvalidInput(format!(
            "column {name}: cannot parse {value:?} as {dtype:?}"
        ))
    };
    let column = match dtype {
        DType::Text => Column::Text(
            raw.iter()
                .map(|v| (!v.is_empty()).then(|| v.clone()))
                .collect(),
        ),
        DType::Float => Column::Float(
            raw.iter()
                .map(|v| {
                    if is_missing(v) {
                        Ok(f64::NAN)
                    } else {
                        v.parse::<f64>().map_err(|_| bad(v))
                    }
                })
                .collect::<Result<_>>()?,
        ),
        DType::Int => Column::Int(
            raw.iter()
                .map(|v| {
                    if is_missing(v) {
                        Ok(None)
                    } else {
                        v.parse::<i64>().map(Some).map_err(|_| bad(v))
                    }
                })
                .collect::<Result<_>>()?,
        ),
        DType::Bool => Column::Bool(
            raw.iter()
                .map(|v| {
                    if is_missing(v) {
                        Ok(None)
                    } else if v.eq_ignore_ascii_case("true") {
                        Ok(Some(true))
                    } else if v.eq_ignore_ascii_case("false") {
                        Ok(Some(false))
                    } else {
                        Err(bad(v))
                    }
                })
                .collect::<Result<_>>()?,
        ),
        DType::Datetime => Column::Datetime(
            raw.iter()
                .map(|v| {
                    if is_missing(v) {
                        Ok(None)
                    } else {
                        parse_datetime(v).map(Some).ok_or_else(|| bad(v))
                    }
                })
                .collect::<Result<_>>()?,
        ),
    };
    Ok(column)
}

fn is_missing(raw: &str) -> bool {
    raw.is_empty() || raw.eq_ignore_ascii_case("nan") || raw.eq_ignore_ascii_case("null")
}

pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
