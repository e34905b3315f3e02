//! Spreadsheet Loader - reads one flat sheet into a raw polars DataFrame

use crate::error::{ReportError, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};
use polars::prelude::*;
use std::path::Path;

/// Spreadsheet formats the loader understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Workbook,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SourceFormat::Workbook),
            other => Err(ReportError::Load(format!(
                "Unsupported spreadsheet extension '{}' for {}",
                other,
                path.display()
            ))),
        }
    }
}

/// Load the first sheet of a spreadsheet file with trimmed headers
pub fn load_table(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(ReportError::SourceNotFound(path.to_path_buf()));
    }

    let df = match SourceFormat::from_path(path)? {
        SourceFormat::Csv => read_csv(path)?,
        SourceFormat::Workbook => read_workbook(path)?,
    };

    trim_headers(df)
}

/// Every CSV column is read as text; numeric fields are cast during
/// normalization so identifiers such as `00123` keep their leading zeros.
fn read_csv(path: &Path) -> Result<DataFrame> {
    LazyCsvReader::new(path)
        .with_infer_schema_length(Some(0))
        .finish()
        .map_err(|e| ReportError::Load(format!("Failed to scan CSV {}: {}", path.display(), e)))?
        .collect()
        .map_err(|e| ReportError::Load(format!("Failed to read CSV {}: {}", path.display(), e)))
}

fn read_workbook(path: &Path) -> Result<DataFrame> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| ReportError::Load(format!("Failed to open {}: {}", path.display(), e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ReportError::Load(format!("No sheets in {}", path.display())))?
        .map_err(|e| ReportError::Load(format!("Failed to read sheet of {}: {}", path.display(), e)))?;

    sheet_to_frame(path, &range)
}

/// First row is the header row; a sheet without named columns is unreadable
fn sheet_to_frame(path: &Path, range: &Range<Data>) -> Result<DataFrame> {
    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row.iter().map(cell_to_string).collect(),
        None => return Err(ReportError::Load(format!("First sheet of {} is empty", path.display()))),
    };
    let body: Vec<&[Data]> = rows.collect();

    let mut columns = Vec::with_capacity(headers.len());
    for (idx, header) in headers.iter().enumerate() {
        if header.trim().is_empty() {
            continue;
        }
        let cells: Vec<Option<&Data>> = body.iter().map(|row| row.get(idx)).collect();
        columns.push(workbook_column(header, &cells));
    }

    if columns.is_empty() {
        return Err(ReportError::Load(format!("No column headers in first sheet of {}", path.display())));
    }

    DataFrame::new(columns)
        .map_err(|e| ReportError::Load(format!("Malformed sheet in {}: {}", path.display(), e)))
}

/// A column is numeric when every non-empty cell is a number
fn workbook_column(header: &str, cells: &[Option<&Data>]) -> Series {
    let numeric = cells.iter().all(|cell| {
        matches!(cell, None | Some(Data::Empty) | Some(Data::Float(_)) | Some(Data::Int(_)))
    });

    if numeric {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|cell| match cell {
                Some(Data::Float(v)) => Some(*v),
                Some(Data::Int(v)) => Some(*v as f64),
                _ => None,
            })
            .collect();
        Series::new(header, values)
    } else {
        let values: Vec<Option<String>> = cells
            .iter()
            .map(|cell| match cell {
                None | Some(Data::Empty) => None,
                Some(data) => Some(cell_to_string(data)),
            })
            .collect();
        Series::new(header, values)
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(v) => v.to_string(),
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        Data::Bool(v) => v.to_string(),
        Data::DateTime(v) => v.to_string(),
        Data::DateTimeIso(v) => v.to_string(),
        Data::DurationIso(v) => v.to_string(),
        Data::Error(v) => format!("{v:?}"),
        Data::Empty => String::new(),
    }
}

/// Columns are addressed by exact, whitespace-trimmed name
fn trim_headers(df: DataFrame) -> Result<DataFrame> {
    let renames: Vec<(String, String)> = df
        .get_column_names()
        .iter()
        .filter(|name| name.trim() != **name)
        .map(|name| (name.to_string(), name.trim().to_string()))
        .collect();

    let mut result = df;
    for (old_name, new_name) in renames {
        result.rename(&old_name, &new_name).map_err(|e| {
            ReportError::Load(format!("Failed to rename column '{}' to '{}': {}", old_name, new_name, e))
        })?;
    }

    Ok(result)
}
