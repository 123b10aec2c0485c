use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the quality study.
#[derive(Error, Debug)]
pub enum StudyError {
    /// A workbook file or one of its sheets does not exist.
    #[error("Resource not found: {path}{}", sheet_suffix(.sheet))]
    ResourceNotFound {
        path: PathBuf,
        sheet: Option<String>,
    },

    /// A requested column is absent from a sheet or table.
    #[error("Column \"{column}\" not found in {context}")]
    SchemaMismatch { column: String, context: String },

    /// A timestamp cell did not match the format supplied for its column.
    #[error("Cannot parse \"{value}\" in column \"{column}\" (row {row}) with format {pattern}")]
    ParseError {
        column: String,
        row: usize,
        value: String,
        pattern: &'static str,
    },

    /// An inner join left no common days to work with.
    #[error("Join of [{}] produced no rows", .columns.join(", "))]
    EmptyJoinResult { columns: Vec<String> },

    /// A cell held a value of the wrong kind for the requested operation.
    #[error("Column \"{column}\" (row {row}) holds {found}, expected {expected}")]
    TypeMismatch {
        column: String,
        row: usize,
        expected: &'static str,
        found: String,
    },

    /// Two joined tables both carry a metric with the same name.
    #[error("Duplicate metric column: {0}")]
    DuplicateColumn(String),

    /// The workbook exists but could not be decoded.
    #[error("Failed to read workbook {path}: {message}")]
    Workbook { path: PathBuf, message: String },

    /// The charting backend failed to draw or write a chart.
    #[error("Render error: {0}")]
    Render(String),

    /// An error annotated with the study step that produced it.
    #[error("Step {step} failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<StudyError>,
    },

    /// The report could not be serialised.
    #[error("Failed to serialise JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn sheet_suffix(sheet: &Option<String>) -> String {
    match sheet {
        Some(name) => format!(" (sheet \"{}\")", name),
        None => String::new(),
    }
}

/// Convenience alias used throughout the quality crates.
pub type Result<T> = std::result::Result<T, StudyError>;

/// Attach a study step name to an error result.
pub trait StepContext<T> {
    fn in_step(self, step: &str) -> Result<T>;
}

impl<T> StepContext<T> for Result<T> {
    fn in_step(self, step: &str) -> Result<T> {
        self.map_err(|source| StudyError::Step {
            step: step.to_string(),
            source: Box::new(source),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_resource_not_found_file() {
        let err = StudyError::ResourceNotFound {
            path: PathBuf::from("data/missing.xlsx"),
            sheet: None,
        };
        assert_eq!(err.to_string(), "Resource not found: data/missing.xlsx");
    }

    #[test]
    fn test_error_display_resource_not_found_sheet() {
        let err = StudyError::ResourceNotFound {
            path: PathBuf::from("data/w.xlsx"),
            sheet: Some("9000_E06".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Resource not found: data/w.xlsx (sheet \"9000_E06\")"
        );
    }

    #[test]
    fn test_error_display_schema_mismatch() {
        let err = StudyError::SchemaMismatch {
            column: "Quantity".to_string(),
            context: "sheet \"9000_E06\"".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Column \"Quantity\" not found in sheet \"9000_E06\""
        );
    }

    #[test]
    fn test_error_display_parse_error() {
        let err = StudyError::ParseError {
            column: "Date".to_string(),
            row: 3,
            value: "yesterday".to_string(),
            pattern: "%d.%m.%y %H:%M:%S",
        };
        let msg = err.to_string();
        assert!(msg.contains("\"yesterday\""));
        assert!(msg.contains("row 3"));
        assert!(msg.contains("%d.%m.%y %H:%M:%S"));
    }

    #[test]
    fn test_error_display_empty_join() {
        let err = StudyError::EmptyJoinResult {
            columns: vec!["Waste".to_string(), "Temp".to_string()],
        };
        assert_eq!(err.to_string(), "Join of [Waste, Temp] produced no rows");
    }

    #[test]
    fn test_in_step_wraps_error() {
        let result: Result<()> = Err(StudyError::DuplicateColumn("Waste".to_string()));
        let err = result.in_step("03-waste-defects").unwrap_err();
        let msg = err.to_string();
        assert_eq!(
            msg,
            "Step 03-waste-defects failed: Duplicate metric column: Waste"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_in_step_passes_ok_through() {
        let result: Result<u32> = Ok(7);
        assert_eq!(result.in_step("01").unwrap(), 7);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StudyError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: StudyError = json_err.into();
        assert!(err.to_string().contains("Failed to serialise JSON"));
    }
}
