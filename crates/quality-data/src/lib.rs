//! Data layer for the quality study.
//!
//! Reads the source workbooks, collapses raw rows into daily series, joins
//! series on the date key and runs the numbered study steps.

pub mod aggregator;
pub mod joiner;
pub mod reader;
pub mod study;

pub use quality_core as core;
