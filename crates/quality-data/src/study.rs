//! The waste / defects / revisions / temperature study.
//!
//! Loads the three source sheets, builds the daily series, joins them step
//! by step, correlates the metrics and hands every chart to a [`ChartSink`].
//! Steps run strictly in order; the first failure stops the study so no later
//! chart is written.

use std::path::{Path, PathBuf};

use chrono::Utc;
use quality_core::calculations::{correlate, Correlation, UndefinedReason};
use quality_core::error::{Result, StepContext};
use quality_core::formatting::artifact_file_name;
use quality_core::models::{
    ChartSink, DailySeries, JoinedTable, Plottable, Predicate, RawTable, DATE_COLUMN,
};
use quality_core::time_utils::{normalize_timestamps, DateFormat};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregator::{AggregateSpec, DailyAggregator, Reducer};
use crate::joiner::join;
use crate::reader::load_sheet;

// ── Source contract ───────────────────────────────────────────────────────────

pub const WASTE_WORKBOOK: &str = "Wastes_August_september_m.xlsx";
pub const WASTE_SHEET: &str = "9000_E06";
pub const WASTE_COLUMNS: &[&str] = &["Date", "Quantity"];

pub const INSPECTION_WORKBOOK: &str = "inspection_results_and_defects_August_september.xlsx";
pub const DEFECTS_SHEET: &str = "Defects";
pub const DEFECTS_COLUMNS: &[&str] = &["Date", "NUM_DEFECTOS"];
pub const RESULTS_SHEET: &str = "Inspection results";
pub const RESULTS_COLUMNS: &[&str] = &["Date_Time", "Date", "Val", "Feature", "Media"];

/// Inspection result code marking a revision.
const REVISION_CODE: &str = "R";
const ROOM_TEMPERATURE: &str = "TEMPERATURA SALA";
/// Readings at or above this are sensor sentinels, not temperatures.
const TEMPERATURE_CEILING: f64 = 100.0;

/// Sampled waste quantities cover one part in five.
const WASTE_SCALE: f64 = 5.0;
const REVISION_SCALE: f64 = 100.0;
const TEMPERATURE_SCALE: f64 = 200.0;

const CHART_EXTENSION: &str = "svg";

// ── StudySources ──────────────────────────────────────────────────────────────

/// The three raw sheets the study reads.
#[derive(Debug, Clone)]
pub struct StudySources {
    pub waste: RawTable,
    pub defects: RawTable,
    pub inspection: RawTable,
}

impl StudySources {
    /// Load every source sheet from `data_dir`. Fails before any chart is
    /// drawn if a workbook, sheet or column is missing.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let waste_path = data_dir.join(WASTE_WORKBOOK);
        let inspection_path = data_dir.join(INSPECTION_WORKBOOK);

        info!("Loading {}", waste_path.display());
        let waste = load_sheet(&waste_path, WASTE_SHEET, WASTE_COLUMNS).in_step("load-waste")?;

        info!("Loading {}", inspection_path.display());
        let defects = load_sheet(&inspection_path, DEFECTS_SHEET, DEFECTS_COLUMNS)
            .in_step("load-defects")?;
        let inspection = load_sheet(&inspection_path, RESULTS_SHEET, RESULTS_COLUMNS)
            .in_step("load-inspection-results")?;

        Ok(Self {
            waste,
            defects,
            inspection,
        })
    }
}

// ── StudyReport ───────────────────────────────────────────────────────────────

/// One chart written by the study.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartRecord {
    pub step: u32,
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub rows: usize,
}

/// One correlation computed by the study.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorrelationRecord {
    pub step: u32,
    pub column_a: String,
    pub column_b: String,
    /// Paired days in the joined table.
    pub rows: usize,
    pub coefficient: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undefined_reason: Option<UndefinedReason>,
    pub strength: String,
}

impl CorrelationRecord {
    fn new(step: u32, a: &str, b: &str, rows: usize, correlation: Correlation) -> Self {
        let undefined_reason = match correlation {
            Correlation::Undefined(reason) => Some(reason),
            Correlation::Coefficient(_) => None,
        };
        Self {
            step,
            column_a: a.to_string(),
            column_b: b.to_string(),
            rows,
            coefficient: correlation.value(),
            undefined_reason,
            strength: correlation.strength().to_string(),
        }
    }
}

/// Everything the study produced, serialised to `correlations.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyReport {
    /// RFC 3339 timestamp of the run.
    pub generated_at: String,
    pub charts: Vec<ChartRecord>,
    pub correlations: Vec<CorrelationRecord>,
}

impl StudyReport {
    fn new() -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            charts: Vec::new(),
            correlations: Vec::new(),
        }
    }

    /// Atomically write the report as pretty JSON, creating parent
    /// directories if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;

        // Write to a temp file then rename for atomicity.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

// ── Study ─────────────────────────────────────────────────────────────────────

struct Study<'a> {
    output_dir: PathBuf,
    sink: &'a mut dyn ChartSink,
    report: StudyReport,
}

impl<'a> Study<'a> {
    fn chart(
        &mut self,
        step: u32,
        slug: &str,
        table: &dyn Plottable,
        x: &str,
        ys: &[&str],
    ) -> Result<()> {
        let path = self
            .output_dir
            .join(artifact_file_name(step, slug, CHART_EXTENSION));
        info!("Step {:02}: plotting [{}] to {}", step, ys.join(", "), path.display());
        self.sink.render(table, x, ys, &path)?;
        self.report.charts.push(ChartRecord {
            step,
            path,
            columns: ys.iter().map(|y| y.to_string()).collect(),
            rows: table.row_count(),
        });
        Ok(())
    }

    /// Chart every numeric column of `table`.
    fn chart_all(&mut self, step: u32, slug: &str, table: &dyn Plottable) -> Result<()> {
        let names = table.value_columns();
        let ys: Vec<&str> = names.iter().map(String::as_str).collect();
        self.chart(step, slug, table, DATE_COLUMN, &ys)
    }

    fn correlate(&mut self, step: u32, table: &JoinedTable, a: &str, b: &str) -> Result<Correlation> {
        let correlation = correlate(table, a, b)?;
        match correlation {
            Correlation::Coefficient(_) => {
                info!("Step {:02}: {} vs {} = {}", step, a, b, correlation)
            }
            Correlation::Undefined(_) => {
                warn!("Step {:02}: {} vs {} is {}", step, a, b, correlation)
            }
        }
        self.report
            .correlations
            .push(CorrelationRecord::new(step, a, b, table.len(), correlation));
        Ok(correlation)
    }

    /// Chart two columns and record their correlation.
    fn compare(&mut self, step: u32, slug: &str, table: &JoinedTable, a: &str, b: &str) -> Result<()> {
        self.correlate(step, table, a, b)?;
        self.chart(step, slug, table, DATE_COLUMN, &[a, b])
    }
}

fn daily(table: &RawTable, spec: AggregateSpec) -> Result<DailySeries> {
    DailyAggregator::aggregate(table, &spec)
}

/// Run every study step in order, drawing through `sink` into `output_dir`.
pub fn run_study(
    sources: StudySources,
    output_dir: &Path,
    sink: &mut dyn ChartSink,
) -> Result<StudyReport> {
    let mut study = Study {
        output_dir: output_dir.to_path_buf(),
        sink,
        report: StudyReport::new(),
    };

    // ── Waste, defects, revisions ─────────────────────────────────────────────

    let waste = normalize_timestamps(sources.waste, "Date", DateFormat::IsoFractional)
        .and_then(|t| {
            daily(
                &t,
                AggregateSpec::new("Date", "Quantity", Reducer::Sum, "Waste")
                    .with_scale(WASTE_SCALE),
            )
        })
        .and_then(|s| study.chart(1, "waste-time", &s, DATE_COLUMN, &["Waste"]).map(|_| s))
        .in_step("01-waste-time")?;

    let defects = normalize_timestamps(sources.defects, "Date", DateFormat::IsoFractional)
        .and_then(|t| {
            daily(
                &t,
                AggregateSpec::new("Date", "NUM_DEFECTOS", Reducer::Sum, "DefectCount"),
            )
        })
        .and_then(|s| {
            study
                .chart(2, "defects-time", &s, DATE_COLUMN, &["DefectCount"])
                .map(|_| s)
        })
        .in_step("02-defects-time")?;

    let waste_defects = join(&JoinedTable::from(waste), &JoinedTable::from(defects))
        .and_then(|t| study.correlate(3, &t, "Waste", "DefectCount").map(|_| t))
        .and_then(|t| study.chart_all(3, "waste-defects", &t).map(|_| t))
        .in_step("03-waste-defects")?;

    let inspection = normalize_timestamps(sources.inspection, "Date", DateFormat::IsoFractional)
        .in_step("04-revisions-time")?;

    let revisions = daily(
        &inspection,
        AggregateSpec::new("Date", "Val", Reducer::Count, "Revisions")
            .with_filter(Predicate::equals("Val", REVISION_CODE))
            .with_scale(REVISION_SCALE),
    )
    .and_then(|s| {
        study
            .chart(4, "revisions-time", &s, DATE_COLUMN, &["Revisions"])
            .map(|_| s)
    })
    .in_step("04-revisions-time")?;

    let merged = join(&waste_defects, &JoinedTable::from(revisions))
        .and_then(|t| {
            study
                .compare(5, "defects-revisions-time", &t, "DefectCount", "Revisions")
                .map(|_| t)
        })
        .in_step("05-defects-revisions-time")?;

    study
        .compare(6, "defects-waste-time", &merged, "Waste", "DefectCount")
        .in_step("06-defects-waste-time")?;
    study
        .compare(7, "waste-revisions-time", &merged, "Waste", "Revisions")
        .in_step("07-waste-revisions-time")?;

    // ── Room temperature ──────────────────────────────────────────────────────

    let room_temperature = Predicate::equals("Feature", ROOM_TEMPERATURE)
        .and(Predicate::less_than("Media", TEMPERATURE_CEILING));
    let temperature_spec = AggregateSpec::new("Date", "Media", Reducer::Average, "Temp")
        .with_filter(room_temperature.clone());

    daily(&inspection, temperature_spec.clone())
        .and_then(|s| study.chart(10, "temp-time", &s, DATE_COLUMN, &["Temp"]))
        .in_step("10-temp-time")?;

    inspection
        .filter(&room_temperature)
        .and_then(|t| normalize_timestamps(t, "Date_Time", DateFormat::DottedShortYear))
        .and_then(|mut t| {
            t.rename_column("Media", "Temp")?;
            study.chart(11, "temp-time", &t, "Date_Time", &["Temp"])
        })
        .in_step("11-temp-time")?;

    let merged = daily(&inspection, temperature_spec.with_scale(TEMPERATURE_SCALE))
        .and_then(|s| join(&merged, &JoinedTable::from(s)))
        .and_then(|t| {
            study
                .compare(12, "temp-defects-time", &t, "Temp", "DefectCount")
                .map(|_| t)
        })
        .in_step("12-temp-defects-time")?;

    study
        .compare(13, "temp-waste-time", &merged, "Temp", "Waste")
        .in_step("13-temp-waste-time")?;
    study
        .compare(14, "temp-revisions-time", &merged, "Temp", "Revisions")
        .in_step("14-temp-revisions-time")?;

    info!(
        "Study complete: {} charts, {} correlations",
        study.report.charts.len(),
        study.report.correlations.len()
    );
    Ok(study.report)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
