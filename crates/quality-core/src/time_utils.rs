use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, StudyError};
use crate::models::{CellValue, RawTable};

// ── DateFormat ────────────────────────────────────────────────────────────────

/// The two text layouts timestamps arrive in. Always chosen by the caller;
/// there is no detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateFormat {
    /// `2024-09-01 06:30:00.000000`
    IsoFractional,
    /// `01.09.24 06:30:00`
    DottedShortYear,
}

impl DateFormat {
    /// The chrono pattern used both for parsing and formatting.
    pub fn pattern(self) -> &'static str {
        match self {
            DateFormat::IsoFractional => "%Y-%m-%d %H:%M:%S%.6f",
            DateFormat::DottedShortYear => "%d.%m.%y %H:%M:%S",
        }
    }

    /// Parse `text`, accepting it only if formatting the result gives the
    /// same text back. chrono treats `%.6f` as optional and tolerates
    /// unpadded fields, so a bare parse would let both through.
    pub fn parse(self, text: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(text, self.pattern())
            .ok()
            .filter(|ts| self.format(ts) == text)
    }

    pub fn format(self, ts: &NaiveDateTime) -> String {
        ts.format(self.pattern()).to_string()
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pattern())
    }
}

// ── Normalizer ────────────────────────────────────────────────────────────────

/// Convert every cell of `column` to a [`CellValue::Timestamp`].
///
/// Text cells are parsed with `format`; cells the workbook already stored as
/// dates are kept. Anything else fails the whole call with
/// [`StudyError::ParseError`] naming the 1-based data row.
pub fn normalize_timestamps(
    mut table: RawTable,
    column: &str,
    format: DateFormat,
) -> Result<RawTable> {
    let idx = table.column_index(column)?;

    for (i, row) in table.rows_mut().iter_mut().enumerate() {
        let parsed = match &row[idx] {
            CellValue::Timestamp(ts) => Some(*ts),
            CellValue::Text(text) => format.parse(text),
            _ => None,
        };
        match parsed {
            Some(ts) => row[idx] = CellValue::Timestamp(ts),
            None => {
                return Err(StudyError::ParseError {
                    column: column.to_string(),
                    row: i + 1,
                    value: row[idx].to_string(),
                    pattern: format.pattern(),
                })
            }
        }
    }

    Ok(table)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
