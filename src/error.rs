use thiserror::Error;

use crate::config::ConfigError;
use crate::dataset::DatasetError;
use crate::hub::FetchError;
use crate::ml::gbdt::{ModelError, TrainError};

/// Any failure of a download or training run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Train(#[from] TrainError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{0}")]
    Usage(String),
}
