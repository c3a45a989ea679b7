//! Build the derived datasets from the raw tables and train the default-risk classifier.

use std::path::PathBuf;

use credit_scoring::config::PipelineConfig;
use credit_scoring::dataset::build_datasets;
use credit_scoring::error::PipelineError;
use credit_scoring::logging;
use credit_scoring::ml::gbdt::{TrainDataset, train_classifier};
use credit_scoring::ml::metrics;

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_help();
            return;
        }
        Err(err) => {
            eprintln!("{err}");
            print_help();
            std::process::exit(1);
        }
    };
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }
    match run(&options) {
        Ok(path) => println!("Model saved to {}", path.display()),
        Err(err) => {
            tracing::error!("Training failed: {err}");
            eprintln!("Training failed: {err}");
            std::process::exit(1);
        }
    }
}

fn run(options: &CliOptions) -> Result<PathBuf, PipelineError> {
    let config = PipelineConfig::load(options.config.as_deref())?;
    let built = build_datasets(&config)?;
    let train_options = config.training.train_options();
    let model = train_classifier(&built.train, &train_options)?;

    let dataset = TrainDataset::from_table(&built.train)?;
    let summary = metrics::evaluate(&model, &dataset);
    tracing::info!(
        "Training set: rows={} log_loss={:.4} accuracy={:.4} precision={:.4} recall={:.4}",
        summary.confusion.total(),
        summary.log_loss,
        summary.confusion.accuracy(),
        summary.confusion.precision(),
        summary.confusion.recall()
    );

    model.save_json(&config.model_output)?;
    Ok(config.model_output)
}

#[derive(Debug, Default)]
struct CliOptions {
    config: Option<PathBuf>,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Option<CliOptions>, PipelineError> {
    let mut options = CliOptions::default();
    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| PipelineError::Usage("--config requires a value".into()))?;
                options.config = Some(PathBuf::from(value));
            }
            "-h" | "--help" => return Ok(None),
            other => return Err(PipelineError::Usage(format!("Unknown argument: {other}"))),
        }
    }
    Ok(Some(options))
}

fn print_help() {
    println!("Usage: credit-scoring-train [--config <file>]");
}
