use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, StudyError};

/// Name of the date key column in daily series and joined tables.
pub const DATE_COLUMN: &str = "Date";

// ── CellValue ─────────────────────────────────────────────────────────────────

/// A single spreadsheet cell after loading.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Either stored as a date by the workbook or produced by the normalizer.
    Timestamp(NaiveDateTime),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// The numeric value, if this cell holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Short description of the cell kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            CellValue::Empty => "an empty cell",
            CellValue::Text(_) => "text",
            CellValue::Number(_) => "a number",
            CellValue::Bool(_) => "a boolean",
            CellValue::Timestamp(_) => "a timestamp",
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(v) => write!(f, "{}", v),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Timestamp(ts) => write!(f, "{}", ts),
        }
    }
}

// ── RawTable ──────────────────────────────────────────────────────────────────

/// Rows of heterogeneous cells as loaded from one sheet, restricted to a
/// caller-chosen list of columns.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    /// Build a table from column names and rows.
    ///
    /// Short rows are padded with [`CellValue::Empty`]; longer rows are
    /// truncated to the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Empty);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` among the columns, or `SchemaMismatch`.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| StudyError::SchemaMismatch {
                column: name.to_string(),
                context: format!("table [{}]", self.columns.join(", ")),
            })
    }

    /// Iterate the cells of one column.
    pub fn column(&self, name: &str) -> Result<impl Iterator<Item = &CellValue> + '_> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(move |row| &row[idx]))
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Vec<CellValue>] {
        &mut self.rows
    }

    /// Keep only the rows matching `predicate`.
    pub fn filter(&self, predicate: &Predicate) -> Result<RawTable> {
        let bound = predicate.bind(self)?;
        let rows = self
            .rows
            .iter()
            .filter(|row| bound.matches(row))
            .cloned()
            .collect();
        Ok(Self {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Rename one column in place. Fails when `from` does not exist or `to`
    /// is already taken by another column.
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        let idx = self.column_index(from)?;
        if self.columns.iter().enumerate().any(|(i, c)| i != idx && c == to) {
            return Err(StudyError::DuplicateColumn(to.to_string()));
        }
        self.columns[idx] = to.to_string();
        Ok(())
    }
}

// ── Predicate ─────────────────────────────────────────────────────────────────

/// Row filter evaluated before grouping.
///
/// Comparisons against empty or differently typed cells are false.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// The column holds exactly this text.
    Equals { column: String, value: String },
    /// The column holds a number strictly below `threshold`.
    LessThan { column: String, threshold: f64 },
    /// Every inner predicate matches.
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn equals(column: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::Equals {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn less_than(column: impl Into<String>, threshold: f64) -> Self {
        Predicate::LessThan {
            column: column.into(),
            threshold,
        }
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s.
    pub fn and(self, other: Predicate) -> Self {
        let mut parts = match self {
            Predicate::And(parts) => parts,
            single => vec![single],
        };
        match other {
            Predicate::And(more) => parts.extend(more),
            single => parts.push(single),
        }
        Predicate::And(parts)
    }

    /// Resolve column names against `table` once so rows can be tested by index.
    pub fn bind(&self, table: &RawTable) -> Result<BoundPredicate> {
        Ok(match self {
            Predicate::Equals { column, value } => BoundPredicate::Equals {
                idx: table.column_index(column)?,
                value: value.clone(),
            },
            Predicate::LessThan { column, threshold } => BoundPredicate::LessThan {
                idx: table.column_index(column)?,
                threshold: *threshold,
            },
            Predicate::And(parts) => BoundPredicate::And(
                parts
                    .iter()
                    .map(|p| p.bind(table))
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Equals { column, value } => write!(f, "{} = '{}'", column, value),
            Predicate::LessThan { column, threshold } => write!(f, "{} < {}", column, threshold),
            Predicate::And(parts) => {
                let joined: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                f.write_str(&joined.join(" and "))
            }
        }
    }
}

/// A [`Predicate`] with column names resolved to indices.
#[derive(Debug, Clone)]
pub enum BoundPredicate {
    Equals { idx: usize, value: String },
    LessThan { idx: usize, threshold: f64 },
    And(Vec<BoundPredicate>),
}

impl BoundPredicate {
    pub fn matches(&self, row: &[CellValue]) -> bool {
        match self {
            BoundPredicate::Equals { idx, value } => {
                row[*idx].as_text().map(|s| s == value).unwrap_or(false)
            }
            BoundPredicate::LessThan { idx, threshold } => row[*idx]
                .as_f64()
                .map(|v| v < *threshold)
                .unwrap_or(false),
            BoundPredicate::And(parts) => parts.iter().all(|p| p.matches(row)),
        }
    }
}

// ── DailySeries ───────────────────────────────────────────────────────────────

/// One labelled metric with one value per calendar day, ascending by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySeries {
    pub label: String,
    pub points: Vec<(NaiveDate, f64)>,
}

impl DailySeries {
    /// Build a series, sorting by date. Callers guarantee unique dates.
    pub fn new(label: impl Into<String>, mut points: Vec<(NaiveDate, f64)>) -> Self {
        points.sort_by_key(|(date, _)| *date);
        Self {
            label: label.into(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|(d, _)| *d)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(_, v)| *v)
    }
}

// ── JoinedTable ───────────────────────────────────────────────────────────────

/// One named numeric column of a [`JoinedTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// Date-keyed table with one value per date in every metric column.
///
/// Only built through [`JoinedTable::from_parts`] or from a [`DailySeries`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedTable {
    dates: Vec<NaiveDate>,
    metrics: Vec<MetricColumn>,
}

impl JoinedTable {
    /// Assemble a table from parts built by the joiner. Dates must be unique
    /// and ascending and every column as long as `dates`.
    pub fn from_parts(dates: Vec<NaiveDate>, metrics: Vec<MetricColumn>) -> Self {
        debug_assert!(dates.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(metrics.iter().all(|m| m.values.len() == dates.len()));
        Self { dates, metrics }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn metrics(&self) -> &[MetricColumn] {
        &self.metrics
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Values of one metric column, or `SchemaMismatch`.
    pub fn metric(&self, name: &str) -> Result<&[f64]> {
        self.metrics
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.values.as_slice())
            .ok_or_else(|| StudyError::SchemaMismatch {
                column: name.to_string(),
                context: format!("joined table [{}]", self.metric_names().join(", ")),
            })
    }
}

impl From<DailySeries> for JoinedTable {
    fn from(series: DailySeries) -> Self {
        let (dates, values) = series.points.into_iter().unzip();
        Self {
            dates,
            metrics: vec![MetricColumn {
                name: series.label,
                values,
            }],
        }
    }
}

impl From<&DailySeries> for JoinedTable {
    fn from(series: &DailySeries) -> Self {
        series.clone().into()
    }
}

// ── Plottable ─────────────────────────────────────────────────────────────────

/// Anything that can hand a renderer a time axis and numeric columns.
pub trait Plottable {
    /// Timestamps of column `x`, one per row.
    fn x_values(&self, x: &str) -> Result<Vec<NaiveDateTime>>;
    /// Numeric values of column `y`, one per row; non-numeric cells are NaN.
    fn y_values(&self, y: &str) -> Result<Vec<f64>>;
    /// Every numeric column other than the time axis, in table order.
    fn value_columns(&self) -> Vec<String>;
    fn row_count(&self) -> usize;
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

impl Plottable for JoinedTable {
    fn x_values(&self, x: &str) -> Result<Vec<NaiveDateTime>> {
        if x != DATE_COLUMN {
            return Err(StudyError::SchemaMismatch {
                column: x.to_string(),
                context: "joined table date key".to_string(),
            });
        }
        Ok(self.dates.iter().copied().map(midnight).collect())
    }

    fn y_values(&self, y: &str) -> Result<Vec<f64>> {
        self.metric(y).map(|v| v.to_vec())
    }

    fn value_columns(&self) -> Vec<String> {
        self.metric_names()
    }

    fn row_count(&self) -> usize {
        self.len()
    }
}

impl Plottable for DailySeries {
    fn x_values(&self, x: &str) -> Result<Vec<NaiveDateTime>> {
        if x != DATE_COLUMN {
            return Err(StudyError::SchemaMismatch {
                column: x.to_string(),
                context: format!("daily series \"{}\"", self.label),
            });
        }
        Ok(self.dates().map(midnight).collect())
    }

    fn y_values(&self, y: &str) -> Result<Vec<f64>> {
        if y != self.label {
            return Err(StudyError::SchemaMismatch {
                column: y.to_string(),
                context: format!("daily series \"{}\"", self.label),
            });
        }
        Ok(self.values().collect())
    }

    fn value_columns(&self) -> Vec<String> {
        vec![self.label.clone()]
    }

    fn row_count(&self) -> usize {
        self.len()
    }
}

impl Plottable for RawTable {
    fn x_values(&self, x: &str) -> Result<Vec<NaiveDateTime>> {
        self.column(x)?
            .enumerate()
            .map(|(i, cell)| {
                cell.as_timestamp().ok_or_else(|| StudyError::TypeMismatch {
                    column: x.to_string(),
                    row: i + 1,
                    expected: "a timestamp",
                    found: cell.kind().to_string(),
                })
            })
            .collect()
    }

    fn y_values(&self, y: &str) -> Result<Vec<f64>> {
        Ok(self
            .column(y)?
            .map(|cell| cell.as_f64().unwrap_or(f64::NAN))
            .collect())
    }

    fn value_columns(&self) -> Vec<String> {
        let numeric: Vec<bool> = (0..self.columns.len())
            .map(|i| self.rows.iter().any(|r| r[i].as_f64().is_some()))
            .collect();
        self.columns
            .iter()
            .zip(numeric)
            .filter(|(_, is_numeric)| *is_numeric)
            .map(|(c, _)| c.clone())
            .collect()
    }

    fn row_count(&self) -> usize {
        self.len()
    }
}

// ── ChartSink ─────────────────────────────────────────────────────────────────

/// Terminal sink that draws `ys` against `x` and writes the chart to
/// `destination`.
pub trait ChartSink {
    fn render(
        &mut self,
        table: &dyn Plottable,
        x: &str,
        ys: &[&str],
        destination: &std::path::Path,
    ) -> Result<()>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
