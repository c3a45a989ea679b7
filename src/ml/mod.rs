//! Machine learning helpers for training and scoring the credit default model.
//!
//! The classifier is trained in Rust from the derived feature table and
//! persisted as JSON; metrics summarise a fitted model on a labelled table.

pub mod gbdt;
pub mod metrics;
