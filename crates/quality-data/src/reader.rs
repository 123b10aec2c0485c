//! Workbook loading for the quality study.
//!
//! Opens `.xlsx`/`.xls`/`.ods` exports with `calamine`, picks one sheet and
//! projects it onto the caller's column list.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use quality_core::error::{Result, StudyError};
use quality_core::models::{CellValue, RawTable};
use tracing::debug;

// ── Public API ────────────────────────────────────────────────────────────────

/// Load `columns` (in that order) from sheet `sheet` of the workbook at `path`.
///
/// The first row of the sheet is the header; header names must match exactly.
/// The workbook is closed before this function returns, on every path.
pub fn load_sheet(path: &Path, sheet: &str, columns: &[&str]) -> Result<RawTable> {
    if columns.is_empty() {
        return Err(StudyError::SchemaMismatch {
            column: String::new(),
            context: format!("empty column list for sheet \"{}\"", sheet),
        });
    }

    if !path.is_file() {
        return Err(StudyError::ResourceNotFound {
            path: path.to_path_buf(),
            sheet: None,
        });
    }

    let mut workbook = open_workbook_auto(path).map_err(|e| StudyError::Workbook {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if !workbook.sheet_names().iter().any(|name| name == sheet) {
        return Err(StudyError::ResourceNotFound {
            path: path.to_path_buf(),
            sheet: Some(sheet.to_string()),
        });
    }

    let range = workbook
        .worksheet_range(sheet)
        .map_err(|e| StudyError::Workbook {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let context = format!("sheet \"{}\" of {}", sheet, path.display());
    let table = project_range(&range, columns, &context)?;

    debug!(
        "Loaded {} rows x {} columns from {}",
        table.len(),
        columns.len(),
        context
    );

    Ok(table)
}

/// Project a decoded sheet onto `columns`. The first row is the header.
pub fn project_range(range: &Range<Data>, columns: &[&str], context: &str) -> Result<RawTable> {
    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .map(|cells| cells.iter().map(header_name).collect())
        .unwrap_or_default();

    let indices = columns
        .iter()
        .map(|col| {
            header
                .iter()
                .position(|h| h == col)
                .ok_or_else(|| StudyError::SchemaMismatch {
                    column: col.to_string(),
                    context: context.to_string(),
                })
        })
        .collect::<Result<Vec<usize>>>()?;

    let data: Vec<Vec<CellValue>> = rows
        .map(|cells| {
            indices
                .iter()
                .map(|&i| cells.get(i).map(convert_cell).unwrap_or(CellValue::Empty))
                .collect()
        })
        .collect();

    Ok(RawTable::new(
        columns.iter().map(|c| c.to_string()).collect(),
        data,
    ))
}

/// Map one decoded cell onto the study's cell model.
pub fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) => CellValue::Timestamp(ts),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) | Data::Empty => CellValue::Empty,
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn header_name(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
