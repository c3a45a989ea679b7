//! Assembly of the train and test feature tables from the raw inputs.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;

use super::DatasetError;
use super::encoding::{FeatureEncoders, UNSEEN_CATEGORY_CODE, code_histogram};
use super::features::{DeriveMode, FeatureTable, derive_features};
use super::raw::{load_applications, load_bureau};

/// Derived training table file name.
pub const TRAIN_DATASET_FILE: &str = "dataset_train.csv";
/// Derived scoring table file name.
pub const TEST_DATASET_FILE: &str = "dataset_test.csv";
/// Fitted category encoders file name.
pub const ENCODERS_FILE: &str = "encoders.json";

/// In-memory result of a dataset build.
#[derive(Debug, Clone)]
pub struct BuiltDatasets {
    pub train: FeatureTable,
    pub test: FeatureTable,
    /// Encoders fitted on the training population and applied to both tables.
    pub encoders: FeatureEncoders,
}

/// Load the raw tables, derive both feature tables and persist them.
///
/// Nothing is written unless both tables derive successfully.
pub fn build_datasets(config: &PipelineConfig) -> Result<BuiltDatasets, DatasetError> {
    let train_raw = load_applications(&config.application_train_path(), DeriveMode::Training)?;
    let test_raw = load_applications(&config.application_test_path(), DeriveMode::Scoring)?;
    let bureau = load_bureau(&config.bureau_path())?;
    tracing::info!(
        "Loaded {} training and {} scoring applications",
        train_raw.len(),
        test_raw.len()
    );

    let encoders = FeatureEncoders::fit(&train_raw);
    let train = derive_features(&train_raw, Some(&bureau), DeriveMode::Training, Some(&encoders))?;
    let test = derive_features(&test_raw, Some(&bureau), DeriveMode::Scoring, Some(&encoders))?;
    log_unseen_categories(&test);

    let built = BuiltDatasets {
        train,
        test,
        encoders,
    };
    persist(&built, &config.output_data_dir)?;
    Ok(built)
}

/// Write both tables and the encoders into `out_dir`, creating it if needed.
pub fn persist(built: &BuiltDatasets, out_dir: &Path) -> Result<(), DatasetError> {
    fs::create_dir_all(out_dir).map_err(|source| DatasetError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;
    write_atomic(&out_dir.join(TRAIN_DATASET_FILE), |tmp| built.train.write_csv(tmp))?;
    write_atomic(&out_dir.join(TEST_DATASET_FILE), |tmp| built.test.write_csv(tmp))?;
    write_atomic(&out_dir.join(ENCODERS_FILE), |tmp| built.encoders.save_json(tmp))?;
    tracing::info!(
        "Wrote {} training rows and {} scoring rows to {}",
        built.train.len(),
        built.test.len(),
        out_dir.display()
    );
    Ok(())
}

fn write_atomic(
    dest: &Path,
    write: impl FnOnce(&Path) -> Result<(), DatasetError>,
) -> Result<(), DatasetError> {
    let tmp = tmp_path(dest);
    if let Err(err) = write(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    fs::rename(&tmp, dest).map_err(|source| DatasetError::Io {
        path: dest.to_path_buf(),
        source,
    })
}

fn tmp_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn log_unseen_categories(table: &FeatureTable) {
    let columns = [
        (
            "product_category",
            code_histogram(table.records.iter().map(|r| r.product_category)),
        ),
        (
            "education_level",
            code_histogram(table.records.iter().map(|r| r.education_level)),
        ),
        (
            "family_status",
            code_histogram(table.records.iter().map(|r| r.family_status)),
        ),
    ];
    for (column, histogram) in columns {
        if let Some(count) = histogram.get(&UNSEEN_CATEGORY_CODE) {
            tracing::warn!("{count} scoring rows have a {column} value unseen in training");
        }
    }
}
