//! Raw credit-application tables, feature derivation and dataset assembly.
//!
//! The flow is `raw` (CSV loading and required-column validation) into
//! `features` (one engineered row per applicant) with `encoding` supplying the
//! categorical codes, and `builder` tying the train/test populations together.

pub mod builder;
pub mod encoding;
pub mod features;
pub mod raw;

use std::path::PathBuf;

use thiserror::Error;

pub use builder::{BuiltDatasets, build_datasets};
pub use encoding::{CategoryEncoder, FeatureEncoders, UNSEEN_CATEGORY_CODE};
pub use features::{DeriveMode, FEATURE_COLUMNS, FeatureRecord, FeatureTable, derive_features};
pub use raw::{ApplicationRecord, ApplicationTable, DelinquencyIndex};

/// Errors returned while loading raw tables or writing feature tables.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("{table}: missing required column {column}")]
    MissingColumn { table: String, column: &'static str },
    #[error("{table}: row {row} has no value for required column {column}")]
    MissingValue {
        table: String,
        row: usize,
        column: &'static str,
    },
    #[error("{table}: row {row} has {value} in column {column}; expected a whole number")]
    InvalidValue {
        table: String,
        row: usize,
        column: &'static str,
        value: f64,
    },
    #[error("{table}: duplicate applicant identifier {id}")]
    DuplicateId { table: String, id: u64 },
    #[error("csv error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
