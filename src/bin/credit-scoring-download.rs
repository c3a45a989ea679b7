//! Fetch the pretrained credit-scoring model from the model hub.

use std::path::PathBuf;

use credit_scoring::config::PipelineConfig;
use credit_scoring::error::PipelineError;
use credit_scoring::hub::download_model;
use credit_scoring::logging;

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
        Ok(path) => println!("Model downloaded to {}", path.display()),
        Err(err) => {
            tracing::error!("Download failed: {err}");
            eprintln!("Failed to download model: {err}");
            std::process::exit(1);
        }
    }
}

fn run(options: &CliOptions) -> Result<PathBuf, PipelineError> {
    let config = PipelineConfig::load(options.config.as_deref())?;
    let mut fetch = config.hub.fetch_options();
    fetch.force = options.force;
    Ok(download_model(&fetch)?)
}

#[derive(Debug, Default)]
struct CliOptions {
    config: Option<PathBuf>,
    force: bool,
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
            "--force" => options.force = true,
            "-h" | "--help" => return Ok(None),
            other => return Err(PipelineError::Usage(format!("Unknown argument: {other}"))),
        }
    }
    Ok(Some(options))
}

fn print_help() {
    println!("Usage: credit-scoring-download [--config <file>] [--force]");
}
