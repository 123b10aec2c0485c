use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::formatting::describe_strength;
use crate::models::JoinedTable;

// ── Correlation ───────────────────────────────────────────────────────────────

/// Why a correlation coefficient could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    /// Fewer than two rows carry a finite value in both columns.
    InsufficientPairs,
    /// One of the columns is constant over the valid pairs.
    ZeroVariance,
}

impl fmt::Display for UndefinedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UndefinedReason::InsufficientPairs => f.write_str("fewer than two paired values"),
            UndefinedReason::ZeroVariance => f.write_str("zero variance"),
        }
    }
}

/// Outcome of a Pearson correlation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correlation {
    /// Coefficient in `[-1, 1]`.
    Coefficient(f64),
    Undefined(UndefinedReason),
}

impl Correlation {
    pub fn value(&self) -> Option<f64> {
        match self {
            Correlation::Coefficient(r) => Some(*r),
            Correlation::Undefined(_) => None,
        }
    }

    /// Strength band, e.g. `"Moderate"`, or `"Undefined"`.
    pub fn strength(&self) -> &'static str {
        match self {
            Correlation::Coefficient(r) => describe_strength(*r),
            Correlation::Undefined(_) => "Undefined",
        }
    }
}

impl fmt::Display for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Correlation::Coefficient(r) => write!(f, "{:+.4} ({})", r, describe_strength(*r)),
            Correlation::Undefined(reason) => write!(f, "undefined ({})", reason),
        }
    }
}

// ── Pearson ───────────────────────────────────────────────────────────────────

/// Pearson product-moment correlation over the rows where both `xs[i]` and
/// `ys[i]` are finite.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Correlation {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect();

    if pairs.len() < 2 {
        return Correlation::Undefined(UndefinedReason::InsufficientPairs);
    }

    // Constant columns are caught before the arithmetic: the mean of equal
    // values can drift by an ulp and leave a tiny non-zero variance.
    let (x0, y0) = pairs[0];
    if pairs.iter().all(|(x, _)| *x == x0) || pairs.iter().all(|(_, y)| *y == y0) {
        return Correlation::Undefined(UndefinedReason::ZeroVariance);
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx <= 0.0 || syy <= 0.0 {
        return Correlation::Undefined(UndefinedReason::ZeroVariance);
    }

    Correlation::Coefficient((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Correlate two metric columns of the same joined table.
pub fn correlate(table: &JoinedTable, column_a: &str, column_b: &str) -> Result<Correlation> {
    let xs = table.metric(column_a)?;
    let ys = table.metric(column_b)?;
    Ok(pearson(xs, ys))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
