mod support;

use credit_scoring::config::{CONFIG_FILE_NAME, PipelineConfig};
use credit_scoring::hub::{FetchError, download_model};
use support::env::CreditScoringEnvGuard;
use tempfile::TempDir;

#[test]
fn config_file_in_app_root_is_used() {
    let temp = TempDir::new().expect("tempdir");
    let env = CreditScoringEnvGuard::set_home(temp.path().to_path_buf());
    let app_root = temp.path().join(".credit-scoring");
    std::fs::create_dir_all(&app_root).expect("create app root");
    std::fs::write(
        app_root.join(CONFIG_FILE_NAME),
        "raw_data_dir = \"inputs\"\n[training]\nrounds = 7\n",
    )
    .expect("write config");

    let config = PipelineConfig::load(None).expect("load config");
    assert_eq!(config.raw_data_dir, std::path::PathBuf::from("inputs"));
    assert_eq!(config.training.rounds, 7);
    assert_eq!(config.training.seed, 42);

    let explicit = temp.path().join("explicit.toml");
    std::fs::write(&explicit, "[training]\nrounds = 3\n").expect("write explicit");
    env.set_config_path(explicit.clone());
    assert_eq!(PipelineConfig::load(None).expect("env config").training.rounds, 3);

    let other = temp.path().join("other.toml");
    std::fs::write(&other, "[training]\nrounds = 9\n").expect("write other");
    let config = PipelineConfig::load(Some(&other)).expect("explicit config");
    assert_eq!(config.training.rounds, 9);
}

#[test]
fn missing_config_falls_back_to_defaults() {
    let temp = TempDir::new().expect("tempdir");
    let _env = CreditScoringEnvGuard::set_home(temp.path().to_path_buf());
    let config = PipelineConfig::load(None).expect("load config");
    assert_eq!(config.training, PipelineConfig::default().training);
    assert_eq!(
        config.model_output,
        std::path::Path::new("models").join("credit_scoring_gbdt.json")
    );
}

#[test]
fn cached_artifact_is_returned_without_network() {
    let temp = TempDir::new().expect("tempdir");
    let mut options = PipelineConfig::default().hub.fetch_options();
    options.dest_dir = temp.path().join("models");
    std::fs::create_dir_all(&options.dest_dir).expect("create models dir");
    let cached = options.dest_dir.join(&options.filename);
    std::fs::write(&cached, b"cached-model").expect("write cached");
    options.endpoint = "https://unreachable.invalid".to_string();

    let path = download_model(&options).expect("cache hit");
    assert_eq!(path, cached);
    assert_eq!(std::fs::read(&path).expect("read"), b"cached-model");
}

#[test]
fn forced_download_rejects_plain_http_hosts() {
    let temp = TempDir::new().expect("tempdir");
    let mut options = PipelineConfig::default().hub.fetch_options();
    options.dest_dir = temp.path().to_path_buf();
    options.endpoint = "http://models.example.com".to_string();
    options.force = true;

    let err = download_model(&options).unwrap_err();
    assert!(matches!(err, FetchError::InsecureUrl { .. }));
    assert!(!temp.path().join(&options.filename).exists());
}
