//! CSV filtering.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Number, Value};

use super::{write_output, DecodedArgs, Param, TaskContext, TaskError, Tool};

pub struct FilterCsv;

#[derive(Deserialize)]
struct FilterCsvArgs {
    csv_path: PathBuf,
    output_file: PathBuf,
    #[serde(default)]
    filters: BTreeMap<String, String>,
}

#[async_trait]
impl Tool for FilterCsv {
    fn name(&self) -> &str {
        "filter_csv"
    }

    fn description(&self) -> &str {
        "Filters the rows of a CSV file (with a header row) to those where every given column equals the given value, and writes the matching rows as a JSON array of records."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::path("csv_path", "CSV file to filter.").pattern(r"(?i)\.csv$"),
            Param::path("output_file", "File the JSON records are written to."),
            Param::string_map(
                "filters",
                "Object mapping column names to the value the column must equal.",
            ),
        ]
    }

    async fn execute(&self, args: DecodedArgs, _ctx: &TaskContext) -> Result<String, TaskError> {
        let args: FilterCsvArgs = args.into_typed()?;

        let path = args.csv_path.clone();
        let filters = args.filters.clone();
        let records =
            tokio::task::spawn_blocking(move || filter_rows(&path, &filters)).await??;

        let json = serde_json::to_string(&records).map_err(|e| TaskError::Internal(e.to_string()))?;
        write_output(&args.output_file, json).await?;

        Ok(format!("{} rows matched", records.len()))
    }
}

fn filter_rows(
    path: &Path,
    filters: &BTreeMap<String, String>,
) -> Result<Vec<Map<String, Value>>, TaskError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();

    let mut columns = Vec::with_capacity(filters.len());
    for (column, expected) in filters {
        let index = headers.iter().position(|h| h == column).ok_or_else(|| {
            TaskError::InvalidArguments(format!(
                "column `{}` is not in {}",
                column,
                path.display()
            ))
        })?;
        columns.push((index, expected.trim()));
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| csv_error(path, e))?;
        let matches = columns
            .iter()
            .all(|(index, expected)| cell_matches(row.get(*index).unwrap_or(""), expected));
        if !matches {
            continue;
        }

        let record = headers
            .iter()
            .zip(row.iter())
            .map(|(name, cell)| (name.to_string(), infer_value(cell)))
            .collect();
        records.push(record);
    }

    Ok(records)
}

/// Textual equality, or numeric equality when both sides are numbers.
fn cell_matches(cell: &str, expected: &str) -> bool {
    if cell == expected {
        return true;
    }
    match (cell.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn infer_value(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Some(n) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(cell.to_string())
}

fn csv_error(path: &Path, e: csv::Error) -> TaskError {
    if e.is_io_error() {
        if let csv::ErrorKind::Io(source) = e.into_kind() {
            return TaskError::io(format!("Failed to read {}", path.display()), source);
        }
        return TaskError::Internal(format!("Failed to read {}", path.display()));
    }
    TaskError::InvalidData(format!("{}: {}", path.display(), e))
}
