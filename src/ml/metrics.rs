//! Evaluation metrics for the binary default classifier.

use crate::ml::gbdt::{CreditModel, TrainDataset};

const LOGLOSS_EPS: f64 = 1e-15;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Confusion counts with `1` (default) as the positive class.
pub struct ConfusionMatrix {
    pub true_positive: u32,
    pub false_positive: u32,
    pub true_negative: u32,
    pub false_negative: u32,
}

impl ConfusionMatrix {
    pub fn add(&mut self, truth: u8, predicted: u8) {
        let slot = match (truth == 1, predicted == 1) {
            (true, true) => &mut self.true_positive,
            (false, true) => &mut self.false_positive,
            (false, false) => &mut self.true_negative,
            (true, false) => &mut self.false_negative,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn total(&self) -> u32 {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    /// `TP / (TP + FP)`, `0` when nothing was predicted positive.
    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    /// `TP / (TP + FN)`, `0` when there are no positives.
    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }
}

/// Summary of a model on a labelled dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMetrics {
    pub confusion: ConfusionMatrix,
    pub log_loss: f64,
}

/// Score every row of `dataset` and summarise the predictions.
pub fn evaluate(model: &CreditModel, dataset: &TrainDataset) -> BinaryMetrics {
    let mut confusion = ConfusionMatrix::default();
    let mut probs = Vec::with_capacity(dataset.x.len());
    for (row, &truth) in dataset.x.iter().zip(&dataset.y) {
        let p = model.predict_proba(row);
        confusion.add(truth, u8::from(p >= 0.5));
        probs.push(p);
    }
    BinaryMetrics {
        confusion,
        log_loss: log_loss(&dataset.y, &probs),
    }
}

/// Mean binary cross-entropy with probabilities clipped away from 0 and 1.
pub fn log_loss(labels: &[u8], probs: &[f64]) -> f64 {
    let n = labels.len().min(probs.len());
    if n == 0 {
        return 0.0;
    }
    let total: f64 = labels
        .iter()
        .zip(probs)
        .map(|(&label, &p)| {
            let p = p.clamp(LOGLOSS_EPS, 1.0 - LOGLOSS_EPS);
            if label == 1 { -p.ln() } else { -(1.0 - p).ln() }
        })
        .sum();
    total / n as f64
}

fn ratio(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        f64::from(numerator) / f64::from(denominator)
    }
}
