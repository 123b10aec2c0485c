//! Group-by-day aggregation of raw tables into daily series.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use quality_core::error::{Result, StudyError};
use quality_core::formatting::format_metric;
use quality_core::models::{CellValue, DailySeries, Predicate, RawTable};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ── Reducer ───────────────────────────────────────────────────────────────────

/// Function applied to the metric column within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Sum,
    /// Number of non-empty cells.
    Count,
    Average,
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Reducer::Sum => "sum",
            Reducer::Count => "count",
            Reducer::Average => "avg",
        })
    }
}

// ── AggregateSpec ─────────────────────────────────────────────────────────────

/// Parameters of one daily aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSpec {
    /// Normalised timestamp column, truncated to the calendar day.
    pub group_key: String,
    /// Column the reducer reads.
    pub metric: String,
    pub reducer: Reducer,
    /// Row filter applied before grouping.
    pub filter: Option<Predicate>,
    /// Multiplier applied to each reduced value.
    pub scale: Option<f64>,
    /// Name of the output metric.
    pub label: String,
}

impl AggregateSpec {
    pub fn new(
        group_key: impl Into<String>,
        metric: impl Into<String>,
        reducer: Reducer,
        label: impl Into<String>,
    ) -> Self {
        Self {
            group_key: group_key.into(),
            metric: metric.into(),
            reducer,
            filter: None,
            scale: None,
            label: label.into(),
        }
    }

    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }
}

impl fmt::Display for AggregateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.reducer, self.metric)?;
        if let Some(scale) = self.scale {
            write!(f, " * {}", scale)?;
        }
        write!(f, " as {}", self.label)?;
        if let Some(filter) = &self.filter {
            write!(f, " where {}", filter)?;
        }
        write!(f, " group by day({})", self.group_key)
    }
}

// ── DayAccumulator ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DayAccumulator {
    sum: f64,
    count: usize,
}

impl DayAccumulator {
    fn reduce(&self, reducer: Reducer) -> f64 {
        match reducer {
            Reducer::Count => self.count as f64,
            Reducer::Sum if self.count == 0 => f64::NAN,
            Reducer::Sum => self.sum,
            Reducer::Average if self.count == 0 => f64::NAN,
            Reducer::Average => self.sum / self.count as f64,
        }
    }
}

// ── DailyAggregator ───────────────────────────────────────────────────────────

/// Stateless helper that collapses raw rows into one value per calendar day.
pub struct DailyAggregator;

impl DailyAggregator {
    /// Run `spec` over `table`.
    ///
    /// Rows failing the filter are skipped. Every remaining row must carry a
    /// timestamp in the group key. `Sum`/`Average` skip empty cells and
    /// reject non-numeric ones; a day with no numeric value yields NaN.
    /// Output is ascending by date.
    pub fn aggregate(table: &RawTable, spec: &AggregateSpec) -> Result<DailySeries> {
        debug!("Aggregating {}", spec);

        let key_idx = table.column_index(&spec.group_key)?;
        let metric_idx = table.column_index(&spec.metric)?;
        let filter = spec.filter.as_ref().map(|p| p.bind(table)).transpose()?;

        // BTreeMap keeps the days sorted.
        let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();

        for (i, row) in table.rows().iter().enumerate() {
            if let Some(filter) = &filter {
                if !filter.matches(row) {
                    continue;
                }
            }

            let key = &row[key_idx];
            let ts = key.as_timestamp().ok_or_else(|| StudyError::TypeMismatch {
                column: spec.group_key.clone(),
                row: i + 1,
                expected: "a timestamp",
                found: key.kind().to_string(),
            })?;

            let acc = days.entry(ts.date()).or_default();
            let cell = &row[metric_idx];
            match (spec.reducer, cell) {
                (_, CellValue::Empty) => {}
                (Reducer::Count, _) => acc.count += 1,
                (_, CellValue::Number(v)) => {
                    acc.sum += v;
                    acc.count += 1;
                }
                (_, other) => {
                    return Err(StudyError::TypeMismatch {
                        column: spec.metric.clone(),
                        row: i + 1,
                        expected: "a number",
                        found: other.kind().to_string(),
                    })
                }
            }
        }

        let scale = spec.scale.unwrap_or(1.0);
        let points = days
            .into_iter()
            .map(|(day, acc)| (day, acc.reduce(spec.reducer) * scale))
            .collect();

        let series = DailySeries::new(spec.label.clone(), points);
        debug!(
            "{}: {} days, total {}",
            spec.label,
            series.len(),
            format_metric(series.values().filter(|v| v.is_finite()).sum())
        );
        Ok(series)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(day: u32, hour: u32) -> CellValue {
        CellValue::Timestamp(
            NaiveDate::from_ymd_opt(2024, 9, day)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
        )
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, day).unwrap()
    }

    fn quantities(rows: &[(u32, f64)]) -> RawTable {
        RawTable::new(
            vec!["Date".into(), "Quantity".into()],
            rows.iter()
                .map(|(day, q)| vec![ts(*day, 8), CellValue::Number(*q)])
                .collect(),
        )
    }

    fn inspections() -> RawTable {
        let row = |day: u32, hour: u32, val: &str, feature: &str, media: CellValue| {
            vec![
                ts(day, hour),
                CellValue::Text(val.into()),
                CellValue::Text(feature.into()),
                media,
            ]
        };
        RawTable::new(
            vec!["Date".into(), "Val".into(), "Feature".into(), "Media".into()],
            vec![
                row(1, 6, "R", "TEMPERATURA SALA", CellValue::Number(95.0)),
                row(1, 7, "OK", "TEMPERATURA SALA", CellValue::Number(150.0)),
                row(1, 8, "R", "TEMPERATURA SALA", CellValue::Number(85.0)),
                row(1, 9, "R", "HUMEDAD", CellValue::Number(40.0)),
                row(2, 6, "OK", "TEMPERATURA SALA", CellValue::Number(20.0)),
                row(3, 6, "R", "HUMEDAD", CellValue::Empty),
            ],
        )
    }

    // ── sum ───────────────────────────────────────────────────────────────────

    #[test]
    fn test_sum_with_scale() {
        let table = quantities(&[(1, 10.0), (1, 5.0), (2, 7.0)]);
        let spec = AggregateSpec::new("Date", "Quantity", Reducer::Sum, "Waste").with_scale(5.0);
        let series = DailyAggregator::aggregate(&table, &spec).unwrap();

        assert_eq!(series.label, "Waste");
        assert_eq!(series.points, vec![(d(1), 75.0), (d(2), 35.0)]);
    }

    #[test]
    fn test_sum_preserves_total_across_days() {
        let rows = [(3, 4.0), (1, 10.0), (2, 7.0), (1, 5.0), (3, 1.0), (2, 2.0)];
        let table = quantities(&rows);
        let spec = AggregateSpec::new("Date", "Quantity", Reducer::Sum, "Waste");
        let series = DailyAggregator::aggregate(&table, &spec).unwrap();

        let raw_total: f64 = rows.iter().map(|(_, q)| q).sum();
        let daily_total: f64 = series.values().sum();
        assert_eq!(raw_total, daily_total);
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn test_rows_group_by_calendar_day_not_timestamp() {
        let table = RawTable::new(
            vec!["Date".into(), "Quantity".into()],
            vec![
                vec![ts(1, 0), CellValue::Number(1.0)],
                vec![ts(1, 23), CellValue::Number(2.0)],
                vec![ts(2, 0), CellValue::Number(4.0)],
            ],
        );
        let spec = AggregateSpec::new("Date", "Quantity", Reducer::Sum, "Waste");
        let series = DailyAggregator::aggregate(&table, &spec).unwrap();
        assert_eq!(series.points, vec![(d(1), 3.0), (d(2), 4.0)]);
    }

    #[test]
    fn test_output_sorted_and_unique() {
        let table = quantities(&[(5, 1.0), (2, 1.0), (5, 1.0), (9, 1.0), (2, 1.0)]);
        let spec = AggregateSpec::new("Date", "Quantity", Reducer::Sum, "Waste");
        let series = DailyAggregator::aggregate(&table, &spec).unwrap();
        let dates: Vec<NaiveDate> = series.dates().collect();
        assert_eq!(dates, vec![d(2), d(5), d(9)]);
    }

    // ── count ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_count_with_filter_and_scale() {
        let spec = AggregateSpec::new("Date", "Val", Reducer::Count, "Revisions")
            .with_filter(Predicate::equals("Val", "R"))
            .with_scale(100.0);
        let series = DailyAggregator::aggregate(&inspections(), &spec).unwrap();
        assert_eq!(series.points, vec![(d(1), 300.0), (d(3), 100.0)]);
    }

    #[test]
    fn test_count_skips_empty_cells() {
        let spec = AggregateSpec::new("Date", "Media", Reducer::Count, "Readings");
        let series = DailyAggregator::aggregate(&inspections(), &spec).unwrap();
        assert_eq!(series.points, vec![(d(1), 4.0), (d(2), 1.0), (d(3), 0.0)]);
    }

    // ── average ───────────────────────────────────────────────────────────────

    #[test]
    fn test_average_excludes_out_of_range_readings() {
        let spec = AggregateSpec::new("Date", "Media", Reducer::Average, "Temp")
            .with_filter(
                Predicate::equals("Feature", "TEMPERATURA SALA")
                    .and(Predicate::less_than("Media", 100.0)),
            );
        let series = DailyAggregator::aggregate(&inspections(), &spec).unwrap();
        assert_eq!(series.points, vec![(d(1), 90.0), (d(2), 20.0)]);
    }

    #[test]
    fn test_average_of_day_without_numbers_is_nan() {
        let spec = AggregateSpec::new("Date", "Media", Reducer::Average, "Humidity")
            .with_filter(Predicate::equals("Feature", "HUMEDAD"));
        let series = DailyAggregator::aggregate(&inspections(), &spec).unwrap();
        assert_eq!(series.points[0], (d(1), 40.0));
        assert_eq!(series.points[1].0, d(3));
        assert!(series.points[1].1.is_nan());
    }

    // ── errors ────────────────────────────────────────────────────────────────

    #[test]
    fn test_text_metric_is_type_mismatch_for_sum() {
        let spec = AggregateSpec::new("Date", "Val", Reducer::Sum, "Bad");
        let err = DailyAggregator::aggregate(&inspections(), &spec).unwrap_err();
        assert!(matches!(
            err,
            StudyError::TypeMismatch { ref column, row: 1, .. } if column == "Val"
        ));
    }

    #[test]
    fn test_unnormalised_group_key_is_type_mismatch() {
        let table = RawTable::new(
            vec!["Date".into(), "Quantity".into()],
            vec![vec![
                CellValue::Text("2024-09-01 00:00:00.000000".into()),
                CellValue::Number(1.0),
            ]],
        );
        let spec = AggregateSpec::new("Date", "Quantity", Reducer::Sum, "Waste");
        assert!(matches!(
            DailyAggregator::aggregate(&table, &spec),
            Err(StudyError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_metric_column() {
        let spec = AggregateSpec::new("Date", "NUM_DEFECTOS", Reducer::Sum, "DefectCount");
        assert!(matches!(
            DailyAggregator::aggregate(&quantities(&[(1, 1.0)]), &spec),
            Err(StudyError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_table_gives_empty_series() {
        let spec = AggregateSpec::new("Date", "Quantity", Reducer::Sum, "Waste");
        let series = DailyAggregator::aggregate(&quantities(&[]), &spec).unwrap();
        assert!(series.is_empty());
    }

    // ── display ───────────────────────────────────────────────────────────────

    #[test]
    fn test_spec_display_reads_like_a_query() {
        let spec = AggregateSpec::new("Date", "Media", Reducer::Average, "Temp")
            .with_filter(Predicate::less_than("Media", 100.0))
            .with_scale(200.0);
        assert_eq!(
            spec.to_string(),
            "avg(Media) * 200 as Temp where Media < 100 group by day(Date)"
        );
    }
}
