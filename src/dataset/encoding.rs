//! Stable integer codes for categorical application fields.
//!
//! Codes are assigned by lexicographic order of the distinct values seen at fit
//! time. The dataset builder fits once on the training population and reuses
//! the mapping for the scoring population, so both tables agree on every code.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::DatasetError;
use super::raw::{ApplicationRecord, ApplicationTable};

/// Code returned for values absent from the fitted vocabulary.
pub const UNSEEN_CATEGORY_CODE: i64 = -1;
/// Substitute for absent categorical values.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Sorted vocabulary mapping category strings to codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    classes: Vec<String>,
}

impl CategoryEncoder {
    /// Fit on the distinct values of `values`, sorted by byte order.
    pub fn fit<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut classes: Vec<String> = values.into_iter().map(Into::into).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    /// Code for `value`, or [`UNSEEN_CATEGORY_CODE`].
    pub fn encode(&self, value: &str) -> i64 {
        self.classes
            .binary_search_by(|class| class.as_str().cmp(value))
            .map(|idx| idx as i64)
            .unwrap_or(UNSEEN_CATEGORY_CODE)
    }

    /// Fitted classes in code order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Encoders for the three categorical feature columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEncoders {
    pub product_category: CategoryEncoder,
    pub education_level: CategoryEncoder,
    pub family_status: CategoryEncoder,
}

impl FeatureEncoders {
    /// Fit all three encoders on one application table.
    pub fn fit(table: &ApplicationTable) -> Self {
        let records = &table.records;
        Self {
            product_category: CategoryEncoder::fit(records.iter().map(product_key)),
            education_level: CategoryEncoder::fit(
                records.iter().map(|r| or_unknown(&r.education_type).to_string()),
            ),
            family_status: CategoryEncoder::fit(
                records.iter().map(|r| or_unknown(&r.family_status).to_string()),
            ),
        }
    }

    /// Persist the encoders as pretty JSON.
    pub fn save_json(&self, path: &Path) -> Result<(), DatasetError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load encoders previously written by [`FeatureEncoders::save_json`].
    pub fn load_json(path: &Path) -> Result<Self, DatasetError> {
        let bytes = std::fs::read(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// `"{contract}_{education}"` key used for the product category.
pub fn product_key(record: &ApplicationRecord) -> String {
    format!(
        "{}_{}",
        or_unknown(&record.contract_type),
        or_unknown(&record.education_type)
    )
}

pub(crate) fn or_unknown(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(UNKNOWN_CATEGORY)
}

/// Number of rows per code, used for logging vocabulary coverage.
pub(crate) fn code_histogram(codes: impl IntoIterator<Item = i64>) -> BTreeMap<i64, usize> {
    let mut histogram = BTreeMap::new();
    for code in codes {
        *histogram.entry(code).or_insert(0) += 1;
    }
    histogram
}
