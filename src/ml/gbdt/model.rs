use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current artifact format version.
pub(crate) const MODEL_VERSION: i64 = 1;

/// Errors returned while saving or loading a model artifact.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid model: {0}")]
    Invalid(String),
}

/// Single-split decision tree used as a weak learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    /// Feature index used for the split.
    pub feature_index: u16,
    /// Threshold in feature units.
    pub threshold: f64,
    /// Prediction for `feature <= threshold`.
    pub left_value: f64,
    /// Prediction for `feature > threshold`.
    pub right_value: f64,
    /// Whether missing (NaN) values follow the left branch.
    pub missing_left: bool,
}

impl Stump {
    /// Predict the stump value for a feature vector.
    pub fn predict(&self, features: &[f64]) -> f64 {
        let idx = self.feature_index as usize;
        let value = features.get(idx).copied().unwrap_or(f64::NAN);
        let go_left = if value.is_nan() {
            self.missing_left
        } else {
            value <= self.threshold
        };
        if go_left {
            self.left_value
        } else {
            self.right_value
        }
    }
}

/// Boosted stump ensemble producing the probability of default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditModel {
    /// Model format version.
    pub model_version: i64,
    /// Ordered model input names.
    pub feature_names: Vec<String>,
    /// Initial raw logit before boosting rounds.
    pub base_score: f64,
    /// Learning rate applied to each stump prediction.
    pub learning_rate: f64,
    /// Weight applied to positive examples during fitting.
    pub scale_pos_weight: f64,
    /// Seed used for row subsampling.
    pub seed: u64,
    /// Mean log-loss on the training rows after the final round.
    pub train_logloss: f64,
    /// One stump per boosting round.
    pub stumps: Vec<Stump>,
}

impl CreditModel {
    /// Validate structural invariants of the model.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.model_version != MODEL_VERSION {
            return Err(ModelError::Invalid(format!(
                "unsupported model_version {} (expected {MODEL_VERSION})",
                self.model_version
            )));
        }
        if self.feature_names.is_empty() {
            return Err(ModelError::Invalid("model has no features".to_string()));
        }
        if !self.base_score.is_finite() || !self.learning_rate.is_finite() {
            return Err(ModelError::Invalid(
                "base_score and learning_rate must be finite".to_string(),
            ));
        }
        for (round, stump) in self.stumps.iter().enumerate() {
            if stump.feature_index as usize >= self.feature_names.len() {
                return Err(ModelError::Invalid(format!(
                    "round {round} splits on feature {} but the model has {}",
                    stump.feature_index,
                    self.feature_names.len()
                )));
            }
        }
        Ok(())
    }

    /// Write the model as pretty JSON, creating the parent directory.
    pub fn save_json(&self, path: &Path) -> Result<(), ModelError> {
        let io_err = |source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes).map_err(io_err)
    }

    /// Load a model from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model: Self = serde_json::from_slice(&bytes)?;
        model.validate()?;
        Ok(model)
    }

    /// Raw logit for a feature vector.
    pub fn predict_raw(&self, features: &[f64]) -> f64 {
        self.stumps.iter().fold(self.base_score, |raw, stump| {
            raw + self.learning_rate * stump.predict(features)
        })
    }

    /// Probability of default for a feature vector.
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        sigmoid(self.predict_raw(features))
    }

    /// Predicted label at the 0.5 probability cut-off.
    pub fn predict_label(&self, features: &[f64]) -> u8 {
        u8::from(self.predict_proba(features) >= 0.5)
    }
}

/// Logistic function.
pub fn sigmoid(raw: f64) -> f64 {
    1.0 / (1.0 + (-raw).exp())
}
