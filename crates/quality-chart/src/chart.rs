//! Line charts of study tables, written as SVG with `plotters`.

use std::fmt::Display;
use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use plotters::prelude::*;
use quality_core::error::{Result, StudyError};
use quality_core::models::{ChartSink, Plottable};
use tracing::debug;

pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 640;

const DATE_LABEL_FORMAT: &str = "%Y-%m-%d";

// ── Series data ───────────────────────────────────────────────────────────────

/// One y column, reduced to its finite points.
struct Line {
    name: String,
    points: Vec<(NaiveDateTime, f64)>,
}

/// Everything needed to draw, collected before the output file is created.
struct ChartData {
    lines: Vec<Line>,
    x_range: (NaiveDateTime, NaiveDateTime),
    y_range: (f64, f64),
}

impl ChartData {
    fn collect(table: &dyn Plottable, x: &str, ys: &[&str]) -> Result<Self> {
        let xs = table.x_values(x)?;
        let lines = ys
            .iter()
            .map(|y| {
                let values = table.y_values(y)?;
                Ok(Line {
                    name: y.to_string(),
                    points: xs
                        .iter()
                        .copied()
                        .zip(values)
                        .filter(|(_, v)| v.is_finite())
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let x_range = pad_time_range(&xs).ok_or_else(|| StudyError::EmptyJoinResult {
            columns: ys.iter().map(|y| y.to_string()).collect(),
        })?;
        let y_range = pad_value_range(lines.iter().flat_map(|l| l.points.iter().map(|p| p.1)));

        Ok(Self {
            lines,
            x_range,
            y_range,
        })
    }
}

/// Min and max of `xs`, widened by a day on each side when they coincide.
fn pad_time_range(xs: &[NaiveDateTime]) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let min = xs.iter().copied().min()?;
    let max = xs.iter().copied().max()?;
    if min == max {
        Some((min - Duration::days(1), max + Duration::days(1)))
    } else {
        Some((min, max))
    }
}

/// Value range with a 5% margin. An empty or flat range still has height.
fn pad_value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if min == max {
        let pad = if min == 0.0 { 1.0 } else { min.abs() * 0.1 };
        return (min - pad, max + pad);
    }
    let margin = (max - min) * 0.05;
    (min - margin, max + margin)
}

fn render_error(e: impl Display) -> StudyError {
    StudyError::Render(e.to_string())
}

// ── SvgRenderer ───────────────────────────────────────────────────────────────

/// [`ChartSink`] drawing a multi-series line chart against a time axis.
#[derive(Debug, Clone, Copy)]
pub struct SvgRenderer {
    width: u32,
    height: u32,
}

impl Default for SvgRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl SvgRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Draw the chart into an SVG document held in memory.
    fn draw(&self, data: &ChartData, caption: &str) -> Result<String> {
        let mut svg = String::new();
        {
            let root =
                SVGBackend::with_string(&mut svg, (self.width, self.height)).into_drawing_area();
            root.fill(&WHITE).map_err(render_error)?;

            let (x_min, x_max) = data.x_range;
            let (y_min, y_max) = data.y_range;

            let mut chart = ChartBuilder::on(&root)
                .caption(caption, ("sans-serif", 24))
                .margin(12)
                .x_label_area_size(48)
                .y_label_area_size(64)
                .build_cartesian_2d(RangedDateTime::from(x_min..x_max), y_min..y_max)
                .map_err(render_error)?;

            chart
                .configure_mesh()
                .x_labels(8)
                .x_label_formatter(&|x: &NaiveDateTime| x.format(DATE_LABEL_FORMAT).to_string())
                .x_desc("Date")
                .draw()
                .map_err(render_error)?;

            for (i, line) in data.lines.iter().enumerate() {
                let color = Palette99::pick(i).to_rgba();
                chart
                    .draw_series(LineSeries::new(
                        line.points.iter().copied(),
                        color.stroke_width(2),
                    ))
                    .map_err(render_error)?
                    .label(line.name.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
            }

            chart
                .configure_series_labels()
                .background_style(&WHITE.mix(0.8))
                .border_style(&BLACK)
                .draw()
                .map_err(render_error)?;

            root.present().map_err(render_error)?;
        }
        Ok(svg)
    }
}

impl ChartSink for SvgRenderer {
    fn render(
        &mut self,
        table: &dyn Plottable,
        x: &str,
        ys: &[&str],
        destination: &Path,
    ) -> Result<()> {
        let data = ChartData::collect(table, x, ys)?;
        let caption = format!("{} over {}", ys.join(", "), x);

        debug!(
            "Rendering {} series over {} rows to {}",
            data.lines.len(),
            table.row_count(),
            destination.display()
        );

        // Nothing touches `destination` until the whole document is drawn.
        let svg = self.draw(&data, &caption)?;
        std::fs::write(destination, svg).map_err(|e| {
            StudyError::Render(format!("cannot write {}: {}", destination.display(), e))
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use quality_core::models::{CellValue, DailySeries, JoinedTable, RawTable, DATE_COLUMN};
    use tempfile::TempDir;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, day).unwrap()
    }

    fn joined() -> JoinedTable {
        let waste = DailySeries::new("Waste", vec![(d(1), 75.0), (d(2), 35.0), (d(3), 20.0)]);
        let defects = DailySeries::new("DefectCount", vec![(d(1), 3.0), (d(2), f64::NAN), (d(3), 2.0)]);
        let mut metrics = JoinedTable::from(waste).metrics().to_vec();
        metrics.extend(JoinedTable::from(defects).metrics().to_vec());
        JoinedTable::from_parts(vec![d(1), d(2), d(3)], metrics)
    }

    #[test]
    fn test_render_joined_table_writes_svg() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("03-waste-defects.svg");

        SvgRenderer::default()
            .render(&joined(), DATE_COLUMN, &["Waste", "DefectCount"], &path)
            .unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Waste"));
    }

    #[test]
    fn test_render_single_day_series() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("01-waste-time.svg");
        let series = DailySeries::new("Waste", vec![(d(1), 75.0)]);

        SvgRenderer::new(640, 400)
            .render(&series, DATE_COLUMN, &["Waste"], &path)
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_render_raw_table_against_timestamps() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("11-temp-time.svg");
        let table = RawTable::new(
            vec!["Date_Time".into(), "Temp".into()],
            vec![
                vec![
                    CellValue::Timestamp(d(1).and_hms_opt(6, 0, 0).unwrap()),
                    CellValue::Number(21.0),
                ],
                vec![
                    CellValue::Timestamp(d(1).and_hms_opt(18, 30, 0).unwrap()),
                    CellValue::Number(23.5),
                ],
            ],
        );

        SvgRenderer::default()
            .render(&table, "Date_Time", &["Temp"], &path)
            .unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("<svg"));
    }

    #[test]
    fn test_render_unknown_column_creates_no_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("bad.svg");

        let err = SvgRenderer::default()
            .render(&joined(), DATE_COLUMN, &["Temp"], &path)
            .unwrap_err();

        assert!(matches!(err, StudyError::SchemaMismatch { ref column, .. } if column == "Temp"));
        assert!(!path.exists());
    }

    #[test]
    fn test_render_empty_table_is_empty_join() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("empty.svg");
        let empty = JoinedTable::from(DailySeries::new("Waste", vec![]));

        let err = SvgRenderer::default()
            .render(&empty, DATE_COLUMN, &["Waste"], &path)
            .unwrap_err();
        assert!(matches!(err, StudyError::EmptyJoinResult { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_render_missing_directory_is_render_error() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("missing").join("chart.svg");

        let err = SvgRenderer::default()
            .render(&joined(), DATE_COLUMN, &["Waste"], &path)
            .unwrap_err();
        assert!(matches!(err, StudyError::Render(_)));
    }

    #[test]
    fn test_draw_keeps_document_in_memory() {
        let tmp = TempDir::new().expect("tempdir");
        let data = ChartData::collect(&joined(), DATE_COLUMN, &["Waste"]).unwrap();

        let svg = SvgRenderer::default().draw(&data, "Waste over Date").unwrap();

        assert!(svg.contains("<svg"));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_render_failure_leaves_no_file() {
        let tmp = TempDir::new().expect("tempdir");
        let blocked = tmp.path().join("03-waste-defects.svg");
        std::fs::create_dir(&blocked).unwrap();

        let err = SvgRenderer::default()
            .render(&joined(), DATE_COLUMN, &["Waste"], &blocked)
            .unwrap_err();

        assert!(matches!(err, StudyError::Render(_)));
        assert!(blocked.is_dir());
        assert_eq!(std::fs::read_dir(&blocked).unwrap().count(), 0);
    }

    #[test]
    fn test_value_range_padding() {
        assert_eq!(pad_value_range([].into_iter()), (0.0, 1.0));
        assert_eq!(pad_value_range([0.0, 0.0].into_iter()), (-1.0, 1.0));
        let (lo, hi) = pad_value_range([10.0, 10.0].into_iter());
        assert!((lo - 9.0).abs() < 1e-12 && (hi - 11.0).abs() < 1e-12);
        let (lo, hi) = pad_value_range([0.0, 100.0].into_iter());
        assert_eq!((lo, hi), (-5.0, 105.0));
    }

    #[test]
    fn test_time_range_single_point_is_widened() {
        let t = d(2).and_hms_opt(0, 0, 0).unwrap();
        let (lo, hi) = pad_time_range(&[t]).unwrap();
        assert_eq!(hi - lo, Duration::days(2));
        assert!(pad_time_range(&[]).is_none());
    }
}
