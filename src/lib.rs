//! Library exports shared by the download and training programs, tests and benchmarks.
/// Application directory resolution.
pub mod app_dirs;
/// Pipeline configuration.
pub mod config;
/// Raw table loading, feature derivation and dataset assembly.
pub mod dataset;
/// Errors spanning a whole pipeline run.
pub mod error;
/// Shared HTTP agent and bounded response helpers.
pub mod http_client;
/// Model hub artifact fetching.
pub mod hub;
/// Tracing subscriber setup.
pub mod logging;
/// Gradient-boosted classifier and metrics.
pub mod ml;
