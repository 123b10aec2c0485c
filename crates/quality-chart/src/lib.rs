//! Chart output for the quality study.
//!
//! [`SvgRenderer`] is the production [`ChartSink`](quality_core::models::ChartSink):
//! it draws every requested column as a line against the table's time axis
//! and writes one SVG file per chart.

pub mod chart;

pub use chart::SvgRenderer;
