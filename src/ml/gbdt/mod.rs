//! Deterministic gradient-boosted decision-stump classifier for binary credit default.
//!
//! Boosting uses second-order (Newton) steps on the log-loss objective with:
//! - Positive-class reweighting through `scale_pos_weight`.
//! - Histogram split search with a learned default direction for missing values.
//! - Optional seeded row subsampling, so a fixed seed gives a fixed model.
//! - Reproducible JSON model export/load.

mod model;
mod train;

pub use model::{CreditModel, ModelError, Stump, sigmoid};
pub use train::{
    TrainDataset, TrainError, TrainOptions, imbalance_ratio, train_classifier, train_gbdt,
};
