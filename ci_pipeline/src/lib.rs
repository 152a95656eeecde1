//! helo CI pipeline engine
//!
//! Runs the helo project's CI descriptor locally: a YAML file naming the
//! services a build needs, the environment it exports, and the phased
//! shell commands that install dependencies and run the test suite.
//!
//! This crate provides:
//! - Descriptor parsing and validation
//! - Service container provisioning with TCP readiness checks
//! - Phased step execution with abort-on-failure semantics
//! - Build reports with fingerprinted failure classification

pub mod config;
pub mod dburl;
pub mod error;
pub mod executor;
pub mod failure;
pub mod pipeline;
pub mod report;
pub mod services;
pub mod step_executor;

pub use config::RunnerConfig;
pub use dburl::DatabaseUrl;
pub use error::PipelineError;
pub use executor::{run_pipeline, run_single_phase, RunOptions};
pub use pipeline::{Phase, PipelineConfig};
pub use report::{BuildReport, BuildStatus};
