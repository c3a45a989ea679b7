mod support;

use std::path::{Path, PathBuf};

use credit_scoring::config::PipelineConfig;
use credit_scoring::dataset::builder::{ENCODERS_FILE, TEST_DATASET_FILE, TRAIN_DATASET_FILE};
use credit_scoring::dataset::{
    DatasetError, DeriveMode, FeatureEncoders, UNSEEN_CATEGORY_CODE, build_datasets,
};
use credit_scoring::ml::gbdt::{CreditModel, TrainError, TrainOptions, train_classifier};
use support::raw_tables::{
    DELINQUENT_ID, TEST_ROWS, TRAIN_ROWS, default_label, write_raw_tables, write_raw_tables_with,
};
use tempfile::TempDir;

fn config_in(root: &Path) -> PipelineConfig {
    PipelineConfig {
        raw_data_dir: root.join("raw"),
        output_data_dir: root.join("output"),
        model_output: root.join("models").join("model.json"),
        ..PipelineConfig::default()
    }
}

fn fast_options() -> TrainOptions {
    TrainOptions {
        rounds: 20,
        ..TrainOptions::default()
    }
}

fn output_files(config: &PipelineConfig) -> [PathBuf; 3] {
    [
        config.output_data_dir.join(TRAIN_DATASET_FILE),
        config.output_data_dir.join(TEST_DATASET_FILE),
        config.output_data_dir.join(ENCODERS_FILE),
    ]
}

#[test]
fn build_and_train_end_to_end() {
    let temp = TempDir::new().expect("tempdir");
    let config = config_in(temp.path());
    write_raw_tables(&config.raw_data_dir);

    let built = build_datasets(&config).expect("build datasets");
    assert_eq!(built.train.len(), TRAIN_ROWS);
    assert_eq!(built.test.len(), TEST_ROWS);
    assert_eq!(built.train.mode, DeriveMode::Training);
    for path in output_files(&config) {
        assert!(path.is_file(), "missing {}", path.display());
    }

    let train_csv = std::fs::read_to_string(config.output_data_dir.join(TRAIN_DATASET_FILE))
        .expect("read train csv");
    let test_csv = std::fs::read_to_string(config.output_data_dir.join(TEST_DATASET_FILE))
        .expect("read test csv");
    assert!(train_csv.lines().next().unwrap().ends_with(",delinquency_count,target"));
    assert!(test_csv.lines().next().unwrap().ends_with(",delinquency_count"));

    let delinquent = built
        .train
        .records
        .iter()
        .find(|record| record.id == DELINQUENT_ID)
        .expect("delinquent applicant");
    assert_eq!(delinquent.delinquency_count, 2);
    let sentinel = &built.train.records[0];
    assert_eq!(sentinel.tenure_years, Some(0.0));

    let unseen = built
        .test
        .records
        .iter()
        .find(|record| record.id == 200_000)
        .expect("scoring applicant");
    assert_eq!(unseen.education_level, UNSEEN_CATEGORY_CODE);
    let encoders = FeatureEncoders::load_json(&config.output_data_dir.join(ENCODERS_FILE))
        .expect("load encoders");
    assert_eq!(encoders, built.encoders);

    let model = train_classifier(&built.train, &fast_options()).expect("train");
    model.save_json(&config.model_output).expect("save model");
    let loaded = CreditModel::load_json(&config.model_output).expect("load model");
    assert_eq!(loaded, model);
    assert_eq!(loaded.scale_pos_weight, 3.0);

    let mean_proba = |label: u8| {
        let probs: Vec<f64> = built
            .train
            .records
            .iter()
            .enumerate()
            .filter(|(idx, _)| default_label(*idx) == label)
            .map(|(_, record)| loaded.predict_proba(&record.model_inputs()))
            .collect();
        probs.iter().sum::<f64>() / probs.len() as f64
    };
    assert!(mean_proba(1) > mean_proba(0));
}

#[test]
fn rebuilding_produces_identical_outputs() {
    let temp = TempDir::new().expect("tempdir");
    let config = config_in(temp.path());
    write_raw_tables(&config.raw_data_dir);

    build_datasets(&config).expect("first build");
    let first: Vec<Vec<u8>> = output_files(&config)
        .iter()
        .map(|path| std::fs::read(path).expect("read output"))
        .collect();
    let built = build_datasets(&config).expect("second build");
    let second: Vec<Vec<u8>> = output_files(&config)
        .iter()
        .map(|path| std::fs::read(path).expect("read output"))
        .collect();
    assert_eq!(first, second);

    let a = train_classifier(&built.train, &fast_options()).expect("train a");
    let b = train_classifier(&built.train, &fast_options()).expect("train b");
    assert_eq!(
        serde_json::to_vec(&a).expect("serialize a"),
        serde_json::to_vec(&b).expect("serialize b")
    );
}

#[test]
fn missing_required_column_writes_nothing() {
    let temp = TempDir::new().expect("tempdir");
    let config = config_in(temp.path());
    write_raw_tables_with(&config.raw_data_dir, default_label, Some("AMT_CREDIT"));

    let err = build_datasets(&config).unwrap_err();
    assert!(matches!(
        err,
        DatasetError::MissingColumn {
            column: "AMT_CREDIT",
            ..
        }
    ));
    for path in output_files(&config) {
        assert!(!path.exists(), "unexpected {}", path.display());
    }
}

#[test]
fn missing_target_column_is_fatal_for_training_population() {
    let temp = TempDir::new().expect("tempdir");
    let config = config_in(temp.path());
    write_raw_tables_with(&config.raw_data_dir, default_label, Some("TARGET"));

    let err = build_datasets(&config).unwrap_err();
    assert!(matches!(
        err,
        DatasetError::MissingColumn {
            column: "TARGET",
            ..
        }
    ));
}

#[test]
fn single_class_training_table_is_rejected() {
    let temp = TempDir::new().expect("tempdir");
    let config = config_in(temp.path());
    write_raw_tables_with(&config.raw_data_dir, |_| 0, None);

    let built = build_datasets(&config).expect("build datasets");
    let err = train_classifier(&built.train, &fast_options()).unwrap_err();
    assert!(matches!(
        err,
        TrainError::ClassImbalance {
            negatives: TRAIN_ROWS,
            positives: 0
        }
    ));
    assert!(!config.model_output.exists());
}
