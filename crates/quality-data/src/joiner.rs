//! Inner joins of daily series on the date key.

use std::cmp::Ordering;

use quality_core::error::{Result, StudyError};
use quality_core::models::{JoinedTable, MetricColumn};
use tracing::warn;

/// Inner-join two date-keyed tables.
///
/// Only days present in both inputs survive. Metric columns keep their
/// order: `left`'s first, then `right`'s. A metric name present on both
/// sides is a [`StudyError::DuplicateColumn`]. An empty result is returned
/// as an empty table.
pub fn join(left: &JoinedTable, right: &JoinedTable) -> Result<JoinedTable> {
    for name in right.metric_names() {
        if left.metrics().iter().any(|m| m.name == name) {
            return Err(StudyError::DuplicateColumn(name));
        }
    }

    let (ld, rd) = (left.dates(), right.dates());
    let mut dates = Vec::new();
    let mut picks: Vec<(usize, usize)> = Vec::new();

    // Both date keys are sorted and unique, so a merge walk suffices.
    let (mut i, mut j) = (0, 0);
    while i < ld.len() && j < rd.len() {
        match ld[i].cmp(&rd[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                dates.push(ld[i]);
                picks.push((i, j));
                i += 1;
                j += 1;
            }
        }
    }

    let pick = |column: &MetricColumn, side: fn(&(usize, usize)) -> usize| MetricColumn {
        name: column.name.clone(),
        values: picks.iter().map(|p| column.values[side(p)]).collect(),
    };

    let mut metrics: Vec<MetricColumn> = left.metrics().iter().map(|m| pick(m, |p| p.0)).collect();
    metrics.extend(right.metrics().iter().map(|m| pick(m, |p| p.1)));

    let joined = JoinedTable::from_parts(dates, metrics);
    if joined.is_empty() {
        warn!(
            "Join of [{}] with [{}] has no common days",
            left.metric_names().join(", "),
            right.metric_names().join(", ")
        );
    }
    Ok(joined)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
