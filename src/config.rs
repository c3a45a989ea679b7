//! Pipeline configuration loaded from an optional TOML file.
//!
//! Every field has a default relative to the working directory
//! (`data/raw`, `data/output`, `models/`), so a missing file is not an error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;
use crate::hub::FetchOptions;
use crate::ml::gbdt::TrainOptions;

/// Default filename looked up in the app root directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "CREDIT_SCORING_CONFIG";
/// Environment variable overriding the hub endpoint.
pub const HUB_ENDPOINT_ENV: &str = "HF_ENDPOINT";

const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

/// Errors returned while resolving or parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error(transparent)]
    AppDir(#[from] app_dirs::AppDirError),
}

/// Paths and settings shared by the download and training programs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding `application_train.csv`, `application_test.csv` and `bureau.csv`.
    #[serde(default = "default_raw_data_dir")]
    pub raw_data_dir: PathBuf,
    /// Directory receiving the derived feature tables.
    #[serde(default = "default_output_data_dir")]
    pub output_data_dir: PathBuf,
    /// Path of the trained model artifact.
    #[serde(default = "default_model_output")]
    pub model_output: PathBuf,
    #[serde(default)]
    pub hub: HubSettings,
    #[serde(default)]
    pub training: TrainingSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_data_dir: default_raw_data_dir(),
            output_data_dir: default_output_data_dir(),
            model_output: default_model_output(),
            hub: HubSettings::default(),
            training: TrainingSettings::default(),
        }
    }
}

/// Remote model repository the download program fetches from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubSettings {
    #[serde(default = "default_repo_id")]
    pub repo_id: String,
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(default = "default_revision")]
    pub revision: String,
    /// Hub base URL; `HF_ENDPOINT` overrides the built-in default.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Local cache directory for the downloaded artifact.
    #[serde(default = "default_models_dir")]
    pub dest_dir: PathBuf,
    /// Optional SHA-256 (hex) the artifact must match.
    #[serde(default)]
    pub sha256: Option<String>,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            repo_id: default_repo_id(),
            filename: default_filename(),
            revision: default_revision(),
            endpoint: default_endpoint(),
            dest_dir: default_models_dir(),
            sha256: None,
        }
    }
}

impl HubSettings {
    /// Build fetch options for this repository.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            repo_id: self.repo_id.clone(),
            filename: self.filename.clone(),
            revision: self.revision.clone(),
            endpoint: self.endpoint.clone(),
            dest_dir: self.dest_dir.clone(),
            sha256: self.sha256.clone(),
            force: false,
        }
    }
}

/// Boosting hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    #[serde(default = "default_rounds")]
    pub rounds: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_bins")]
    pub bins: usize,
    /// L2 regularization on leaf values.
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    /// Fraction of rows sampled per round.
    #[serde(default = "default_subsample")]
    pub subsample: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            learning_rate: default_learning_rate(),
            bins: default_bins(),
            lambda: default_lambda(),
            subsample: default_subsample(),
            seed: default_seed(),
        }
    }
}

impl TrainingSettings {
    /// Convert to trainer options.
    pub fn train_options(&self) -> TrainOptions {
        TrainOptions {
            rounds: self.rounds,
            learning_rate: self.learning_rate,
            bins: self.bins,
            lambda: self.lambda,
            subsample: self.subsample,
            seed: self.seed,
        }
    }
}

impl PipelineConfig {
    /// Load configuration, preferring `explicit`, then `CREDIT_SCORING_CONFIG`,
    /// then `config.toml` in the app root. Falls back to defaults when no file exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match resolve_config_path(explicit)? {
            Some(path) => {
                tracing::info!("Loading config from {}", path.display());
                Self::load_from(&path)
            }
            None => {
                tracing::debug!("No config file found; using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse a TOML config file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Raw application table used for training.
    pub fn application_train_path(&self) -> PathBuf {
        self.raw_data_dir.join("application_train.csv")
    }

    /// Raw application table used for scoring.
    pub fn application_test_path(&self) -> PathBuf {
        self.raw_data_dir.join("application_test.csv")
    }

    /// Raw credit bureau history table.
    pub fn bureau_path(&self) -> PathBuf {
        self.raw_data_dir.join("bureau.csv")
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        return Ok(Some(path.to_path_buf()));
    }
    if let Ok(value) = std::env::var(CONFIG_PATH_ENV) {
        let value = value.trim();
        if !value.is_empty() {
            return Ok(Some(PathBuf::from(value)));
        }
    }
    let candidate = app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME);
    Ok(candidate.is_file().then_some(candidate))
}

fn default_raw_data_dir() -> PathBuf {
    PathBuf::from("data").join("raw")
}

fn default_output_data_dir() -> PathBuf {
    PathBuf::from("data").join("output")
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_model_output() -> PathBuf {
    default_models_dir().join("credit_scoring_gbdt.json")
}

fn default_repo_id() -> String {
    "dworsleytonks/credit-scoring-xgb".to_string()
}

fn default_filename() -> String {
    "credit_scoring_xgb.pkl".to_string()
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_endpoint() -> String {
    std::env::var(HUB_ENDPOINT_ENV)
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_HUB_ENDPOINT.to_string())
}

fn default_rounds() -> usize {
    100
}

fn default_learning_rate() -> f64 {
    0.3
}

fn default_bins() -> usize {
    64
}

fn default_lambda() -> f64 {
    1.0
}

fn default_subsample() -> f64 {
    1.0
}

fn default_seed() -> u64 {
    42
}
