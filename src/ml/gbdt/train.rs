use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use super::model::{CreditModel, MODEL_VERSION, Stump, sigmoid};
use crate::dataset::{DeriveMode, FeatureRecord, FeatureTable};
use crate::ml::metrics::log_loss;

const MISSING_BIN: u16 = u16::MAX;
const MIN_HESSIAN: f64 = 1e-16;
const PROB_CLAMP: f64 = 1e-6;

/// Training hyperparameters for stump boosting.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOptions {
    /// Number of boosting rounds.
    pub rounds: usize,
    /// Learning rate applied per round.
    pub learning_rate: f64,
    /// Number of bins used for split search.
    pub bins: usize,
    /// L2 regularization on leaf values.
    pub lambda: f64,
    /// Fraction of rows sampled each round.
    pub subsample: f64,
    /// Seed for row subsampling.
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            rounds: 100,
            learning_rate: 0.3,
            bins: 64,
            lambda: 1.0,
            subsample: 1.0,
            seed: 42,
        }
    }
}

/// Errors returned while preparing data for or running training.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("training table is empty")]
    EmptyTable,
    #[error("training requires a labelled table")]
    UnlabelledTable,
    #[error("applicant {id} has label {label}; expected 0 or 1")]
    InvalidLabel { id: u64, label: u8 },
    #[error(
        "cannot compute class imbalance: {negatives} negative and {positives} positive rows"
    )]
    ClassImbalance { negatives: usize, positives: usize },
    #[error("mismatched X/Y lengths: {rows} rows, {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("invalid option {name}: {reason}")]
    InvalidOption {
        name: &'static str,
        reason: &'static str,
    },
}

/// In-memory design matrix with binary labels.
#[derive(Debug, Clone)]
pub struct TrainDataset {
    /// Model input names, aligned with each row of `x`.
    pub feature_names: Vec<String>,
    /// Feature matrix, row-major; NaN marks a missing value.
    pub x: Vec<Vec<f64>>,
    /// Labels aligned with `x`, `0` or `1`.
    pub y: Vec<u8>,
}

impl TrainDataset {
    /// Split a training feature table into inputs (without `id`/`target`) and labels.
    pub fn from_table(table: &FeatureTable) -> Result<Self, TrainError> {
        if table.mode != DeriveMode::Training {
            return Err(TrainError::UnlabelledTable);
        }
        let mut x = Vec::with_capacity(table.len());
        let mut y = Vec::with_capacity(table.len());
        for record in &table.records {
            let label = record.target.ok_or(TrainError::UnlabelledTable)?;
            if label > 1 {
                return Err(TrainError::InvalidLabel {
                    id: record.id,
                    label,
                });
            }
            x.push(record.model_inputs());
            y.push(label);
        }
        Ok(Self {
            feature_names: FeatureRecord::model_input_names(),
            x,
            y,
        })
    }
}

/// `count(label == 0) / count(label == 1)`.
///
/// Fails when either class is absent instead of producing `inf` or `NaN`.
pub fn imbalance_ratio(labels: &[u8]) -> Result<f64, TrainError> {
    let positives = labels.iter().filter(|&&label| label == 1).count();
    let negatives = labels.iter().filter(|&&label| label == 0).count();
    if negatives == 0 || positives == 0 {
        return Err(TrainError::ClassImbalance {
            negatives,
            positives,
        });
    }
    Ok(negatives as f64 / positives as f64)
}

/// Fit a classifier on a training feature table. The table is not modified.
pub fn train_classifier(
    table: &FeatureTable,
    options: &TrainOptions,
) -> Result<CreditModel, TrainError> {
    let dataset = TrainDataset::from_table(table)?;
    train_gbdt(&dataset, options)
}

/// Train a binary stump-GBDT with log-loss and `scale_pos_weight = negatives / positives`.
pub fn train_gbdt(dataset: &TrainDataset, options: &TrainOptions) -> Result<CreditModel, TrainError> {
    validate_options(options)?;
    if dataset.x.len() != dataset.y.len() {
        return Err(TrainError::LengthMismatch {
            rows: dataset.x.len(),
            labels: dataset.y.len(),
        });
    }
    if dataset.x.is_empty() {
        return Err(TrainError::EmptyTable);
    }
    let scale_pos_weight = imbalance_ratio(&dataset.y)?;
    tracing::info!(
        "Training on {} rows; scale_pos_weight={scale_pos_weight:.4}",
        dataset.x.len()
    );

    let n = dataset.x.len();
    let d = dataset.feature_names.len();
    let bins = options.bins.clamp(2, 256);
    let (mins, maxs) = compute_feature_min_max(&dataset.x, d);
    let binned = bin_features(&dataset.x, &mins, &maxs, bins);
    let targets: Vec<f64> = dataset.y.iter().map(|&label| f64::from(label)).collect();
    let weights: Vec<f64> = dataset
        .y
        .iter()
        .map(|&label| if label == 1 { scale_pos_weight } else { 1.0 })
        .collect();

    let base_score = weighted_prior_logit(&targets, &weights);
    let mut raw = vec![base_score; n];
    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut stumps = Vec::with_capacity(options.rounds);
    let mut logloss = mean_log_loss(&dataset.y, &raw);

    for round in 0..options.rounds {
        let rows = sample_rows(n, options.subsample, &mut rng);
        let mut grad = vec![0.0f64; n];
        let mut hess = vec![0.0f64; n];
        for &i in &rows {
            let p = sigmoid(raw[i]);
            grad[i] = weights[i] * (p - targets[i]);
            hess[i] = (weights[i] * p * (1.0 - p)).max(MIN_HESSIAN);
        }

        let stump = fit_best_stump(
            &binned,
            &dataset.x,
            &rows,
            &grad,
            &hess,
            &mins,
            &maxs,
            bins,
            options.lambda,
        );
        for (i, row) in dataset.x.iter().enumerate() {
            raw[i] += options.learning_rate * stump.predict(row);
        }
        stumps.push(stump);

        logloss = mean_log_loss(&dataset.y, &raw);
        if (round + 1) % 10 == 0 || round + 1 == options.rounds {
            tracing::debug!("round {:>4}  train-logloss={logloss:.6}", round + 1);
        }
    }

    Ok(CreditModel {
        model_version: MODEL_VERSION,
        feature_names: dataset.feature_names.clone(),
        base_score,
        learning_rate: options.learning_rate,
        scale_pos_weight,
        seed: options.seed,
        train_logloss: logloss,
        stumps,
    })
}

fn validate_options(options: &TrainOptions) -> Result<(), TrainError> {
    if !(options.learning_rate > 0.0 && options.learning_rate.is_finite()) {
        return Err(TrainError::InvalidOption {
            name: "learning_rate",
            reason: "must be a positive number",
        });
    }
    if !(options.subsample > 0.0 && options.subsample <= 1.0) {
        return Err(TrainError::InvalidOption {
            name: "subsample",
            reason: "must be in (0, 1]",
        });
    }
    if !(options.lambda >= 0.0 && options.lambda.is_finite()) {
        return Err(TrainError::InvalidOption {
            name: "lambda",
            reason: "must be a non-negative number",
        });
    }
    Ok(())
}

fn weighted_prior_logit(targets: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    let positive: f64 = targets.iter().zip(weights).map(|(t, w)| t * w).sum();
    let p = (positive / total).clamp(PROB_CLAMP, 1.0 - PROB_CLAMP);
    (p / (1.0 - p)).ln()
}

fn mean_log_loss(labels: &[u8], raw: &[f64]) -> f64 {
    let probs: Vec<f64> = raw.iter().map(|&r| sigmoid(r)).collect();
    log_loss(labels, &probs)
}

fn sample_rows(n: usize, subsample: f64, rng: &mut StdRng) -> Vec<usize> {
    if subsample >= 1.0 {
        return (0..n).collect();
    }
    let rows: Vec<usize> = (0..n).filter(|_| rng.random_bool(subsample)).collect();
    if rows.is_empty() {
        // Keep at least one row so the round still fits something.
        return vec![rng.random_range(0..n)];
    }
    rows
}

fn compute_feature_min_max(x: &[Vec<f64>], feature_len: usize) -> (Vec<f64>, Vec<f64>) {
    let mut mins = vec![f64::INFINITY; feature_len];
    let mut maxs = vec![f64::NEG_INFINITY; feature_len];
    for row in x {
        for (j, &v) in row.iter().take(feature_len).enumerate() {
            if v.is_finite() {
                mins[j] = mins[j].min(v);
                maxs[j] = maxs[j].max(v);
            }
        }
    }
    for j in 0..feature_len {
        if !mins[j].is_finite() || !maxs[j].is_finite() {
            mins[j] = 0.0;
            maxs[j] = 0.0;
        }
        if mins[j] == maxs[j] {
            maxs[j] = mins[j] + 1.0;
        }
    }
    (mins, maxs)
}

/// Bin `b` covers `[min + b/bins * range, min + (b+1)/bins * range)`; NaN maps to [`MISSING_BIN`].
fn bin_features(x: &[Vec<f64>], mins: &[f64], maxs: &[f64], bins: usize) -> Vec<Vec<u16>> {
    let mut out = Vec::with_capacity(x.len());
    for row in x {
        let mut binned = Vec::with_capacity(mins.len());
        for (j, &min) in mins.iter().enumerate() {
            let v = row.get(j).copied().unwrap_or(f64::NAN);
            if v.is_nan() {
                binned.push(MISSING_BIN);
                continue;
            }
            let t = ((v - min) / (maxs[j] - min)).clamp(0.0, 1.0);
            let b = ((t * bins as f64).floor() as usize).min(bins - 1);
            binned.push(b as u16);
        }
        out.push(binned);
    }
    out
}

#[derive(Debug, Clone, Copy, Default)]
struct GradStats {
    grad: f64,
    hess: f64,
    count: u32,
}

impl GradStats {
    fn add(&mut self, grad: f64, hess: f64) {
        self.grad += grad;
        self.hess += hess;
        self.count += 1;
    }

    fn merged(self, other: GradStats) -> GradStats {
        GradStats {
            grad: self.grad + other.grad,
            hess: self.hess + other.hess,
            count: self.count + other.count,
        }
    }

    fn minus(self, other: GradStats) -> GradStats {
        GradStats {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
            count: self.count - other.count,
        }
    }

    fn score(&self, lambda: f64) -> f64 {
        self.grad * self.grad / (self.hess + lambda)
    }

    fn leaf_value(&self, lambda: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        -self.grad / (self.hess + lambda)
    }
}

#[derive(Debug, Clone)]
struct BestSplit {
    gain: f64,
    feature_index: usize,
    split_bin: usize,
    missing_left: bool,
}

impl Default for BestSplit {
    fn default() -> Self {
        Self {
            gain: f64::NEG_INFINITY,
            feature_index: 0,
            split_bin: 0,
            missing_left: true,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn fit_best_stump(
    binned: &[Vec<u16>],
    x: &[Vec<f64>],
    rows: &[usize],
    grad: &[f64],
    hess: &[f64],
    mins: &[f64],
    maxs: &[f64],
    bins: usize,
    lambda: f64,
) -> Stump {
    let mut best = BestSplit::default();
    for feature_idx in 0..mins.len() {
        let split = best_split_for_feature(binned, rows, grad, hess, feature_idx, bins, lambda);
        if split.gain > best.gain {
            best = split;
        }
    }

    if !best.gain.is_finite() {
        // No feature separates the sampled rows; fall back to a constant step.
        let mut total = GradStats::default();
        for &i in rows {
            total.add(grad[i], hess[i]);
        }
        let value = total.leaf_value(lambda);
        return Stump {
            feature_index: 0,
            threshold: 0.0,
            left_value: value,
            right_value: value,
            missing_left: true,
        };
    }

    let feature_idx = best.feature_index;
    let threshold = threshold_for_bin(mins[feature_idx], maxs[feature_idx], best.split_bin, bins);
    let (left, right) =
        leaf_stats_for_threshold(x, rows, grad, hess, feature_idx, threshold, best.missing_left);
    Stump {
        feature_index: feature_idx as u16,
        threshold,
        left_value: left.leaf_value(lambda),
        right_value: right.leaf_value(lambda),
        missing_left: best.missing_left,
    }
}

fn best_split_for_feature(
    binned: &[Vec<u16>],
    rows: &[usize],
    grad: &[f64],
    hess: &[f64],
    feature_idx: usize,
    bins: usize,
    lambda: f64,
) -> BestSplit {
    let mut hist = vec![GradStats::default(); bins];
    let mut missing = GradStats::default();
    for &i in rows {
        let b = binned[i][feature_idx];
        if b == MISSING_BIN {
            missing.add(grad[i], hess[i]);
        } else {
            hist[b as usize].add(grad[i], hess[i]);
        }
    }
    let present = hist
        .iter()
        .fold(GradStats::default(), |acc, stats| acc.merged(*stats));
    let total = present.merged(missing);
    if total.count == 0 {
        return BestSplit::default();
    }
    let parent_score = total.score(lambda);

    let mut best = BestSplit {
        feature_index: feature_idx,
        ..BestSplit::default()
    };
    // The last bin puts every present value left so missing values can be isolated.
    let mut left = GradStats::default();
    for split_bin in 0..bins {
        left = left.merged(hist[split_bin]);
        let right = present.minus(left);
        for missing_left in [true, false] {
            let (l, r) = if missing_left {
                (left.merged(missing), right)
            } else {
                (left, right.merged(missing))
            };
            if l.count == 0 || r.count == 0 {
                continue;
            }
            let gain = l.score(lambda) + r.score(lambda) - parent_score;
            if gain > best.gain {
                best.gain = gain;
                best.split_bin = split_bin;
                best.missing_left = missing_left;
            }
        }
    }
    best
}

fn threshold_for_bin(min: f64, max: f64, split_bin: usize, bins: usize) -> f64 {
    let t = ((split_bin + 1) as f64) / bins as f64;
    min + t * (max - min)
}

fn leaf_stats_for_threshold(
    x: &[Vec<f64>],
    rows: &[usize],
    grad: &[f64],
    hess: &[f64],
    feature_idx: usize,
    threshold: f64,
    missing_left: bool,
) -> (GradStats, GradStats) {
    let mut left = GradStats::default();
    let mut right = GradStats::default();
    for &i in rows {
        let v = x[i].get(feature_idx).copied().unwrap_or(f64::NAN);
        let go_left = if v.is_nan() { missing_left } else { v <= threshold };
        if go_left {
            left.add(grad[i], hess[i]);
        } else {
            right.add(grad[i], hess[i]);
        }
    }
    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> TrainDataset {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..40 {
            let label = u8::from(i % 4 == 0);
            let signal = if label == 1 { 5.0 + i as f64 * 0.01 } else { i as f64 * 0.05 };
            x.push(vec![signal, (i % 7) as f64]);
            y.push(label);
        }
        TrainDataset {
            feature_names: vec!["signal".into(), "noise".into()],
            x,
            y,
        }
    }

    #[test]
    fn imbalance_ratio_is_negatives_over_positives() {
        assert_eq!(imbalance_ratio(&[0, 1]).unwrap(), 1.0);
        assert_eq!(imbalance_ratio(&[0, 0, 0, 1]).unwrap(), 3.0);
    }

    #[test]
    fn imbalance_ratio_fails_when_a_class_is_absent() {
        let err = imbalance_ratio(&[0, 0, 0]).unwrap_err();
        assert!(matches!(
            err,
            TrainError::ClassImbalance {
                negatives: 3,
                positives: 0
            }
        ));
        assert!(matches!(
            imbalance_ratio(&[1]).unwrap_err(),
            TrainError::ClassImbalance { negatives: 0, .. }
        ));
    }

    #[test]
    fn two_applicant_table_has_unit_imbalance_factor() {
        use crate::dataset::{ApplicationRecord, ApplicationTable, derive_features};

        let applicant = |id, income, target| ApplicationRecord {
            id,
            days_birth: -12_000.0,
            days_employed: Some(-1_000.0),
            income,
            credit_amount: 100_000.0,
            children: Some(0),
            ext_sources: [Some(0.5), None, None],
            contract_type: Some("Cash loans".to_string()),
            education_type: Some("Higher education".to_string()),
            family_status: Some("Married".to_string()),
            target: Some(target),
        };
        let raw = ApplicationTable::new(
            "application_train.csv",
            vec![applicant(1, 50_000.0, 0), applicant(2, 20_000.0, 1)],
        );
        let table = derive_features(&raw, None, DeriveMode::Training, None).unwrap();
        let ratios: Vec<f64> = table.records.iter().map(|r| r.debt_ratio).collect();
        assert_eq!(ratios, vec![2.0, 5.0]);

        let model = train_classifier(&table, &TrainOptions::default()).unwrap();
        assert_eq!(model.scale_pos_weight, 1.0);
        assert_eq!(model.feature_names, FeatureRecord::model_input_names());
    }

    #[test]
    fn learns_a_separable_signal() {
        let dataset = separable();
        let model = train_gbdt(&dataset, &TrainOptions::default()).unwrap();
        assert_eq!(model.scale_pos_weight, 3.0);
        assert_eq!(model.stumps.len(), 100);
        for (row, &label) in dataset.x.iter().zip(&dataset.y) {
            assert_eq!(model.predict_label(row), label);
        }
        assert!(model.train_logloss < 0.1);
        assert_eq!(model.stumps[0].feature_index, 0);
    }

    #[test]
    fn training_is_deterministic_for_a_seed() {
        let dataset = separable();
        let options = TrainOptions {
            rounds: 20,
            subsample: 0.7,
            ..TrainOptions::default()
        };
        let a = train_gbdt(&dataset, &options).unwrap();
        let b = train_gbdt(&dataset, &options).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_values_get_a_direction() {
        let x = vec![
            vec![f64::NAN],
            vec![f64::NAN],
            vec![1.0],
            vec![2.0],
            vec![3.0],
            vec![4.0],
        ];
        let y = vec![1, 1, 0, 0, 0, 0];
        let dataset = TrainDataset {
            feature_names: vec!["score".into()],
            x,
            y,
        };
        let model = train_gbdt(&dataset, &TrainOptions::default()).unwrap();
        assert_eq!(model.predict_label(&[f64::NAN]), 1);
        assert_eq!(model.predict_label(&[2.5]), 0);
    }

    #[test]
    fn constant_features_fall_back_to_a_constant_step() {
        let dataset = TrainDataset {
            feature_names: vec!["flat".into()],
            x: vec![vec![1.0]; 4],
            y: vec![0, 0, 0, 1],
        };
        let model = train_gbdt(
            &dataset,
            &TrainOptions {
                rounds: 3,
                ..TrainOptions::default()
            },
        )
        .unwrap();
        for stump in &model.stumps {
            assert_eq!(stump.left_value, stump.right_value);
        }
        assert!((model.predict_proba(&[1.0]) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn rejects_invalid_options_and_shapes() {
        let dataset = separable();
        let err = train_gbdt(
            &dataset,
            &TrainOptions {
                subsample: 0.0,
                ..TrainOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, TrainError::InvalidOption { name: "subsample", .. }));

        let empty = TrainDataset {
            feature_names: vec!["a".into()],
            x: Vec::new(),
            y: Vec::new(),
        };
        assert!(matches!(
            train_gbdt(&empty, &TrainOptions::default()).unwrap_err(),
            TrainError::EmptyTable
        ));
    }

    #[test]
    fn binning_places_extremes_and_missing() {
        let x = vec![vec![0.0], vec![10.0], vec![f64::INFINITY], vec![f64::NAN]];
        let (mins, maxs) = compute_feature_min_max(&x, 1);
        assert_eq!((mins[0], maxs[0]), (0.0, 10.0));
        let binned = bin_features(&x, &mins, &maxs, 4);
        assert_eq!(binned[0][0], 0);
        assert_eq!(binned[1][0], 3);
        assert_eq!(binned[2][0], 3);
        assert_eq!(binned[3][0], MISSING_BIN);
    }
}
