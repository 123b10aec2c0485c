//! Shared building blocks for the quality study.
//!
//! Table models, the error taxonomy, timestamp normalisation, Pearson
//! correlation, formatting helpers and command-line settings.

pub mod calculations;
pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;
pub mod time_utils;
