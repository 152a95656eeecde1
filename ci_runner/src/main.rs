//! helo-ci — local runner for the helo project's CI descriptor.
//!
//! Executes `.helo-ci.yml` the way a hosted CI worker would: provision
//! the declared services, export the env block, run every phase in
//! order, and exit 0 for a pass, 1 for a failed script, 2 when the
//! build errored before reaching a verdict.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use helo_ci_pipeline::executor::{self, RunOptions};
use helo_ci_pipeline::pipeline::{Phase, PipelineConfig};
use helo_ci_pipeline::services::{ServiceManager, ServiceSpec};
use helo_ci_pipeline::RunnerConfig;

#[derive(Parser)]
#[command(name = "helo-ci", about = "Local CI pipeline runner for helo", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: services, phases, report
    Run {
        /// Pipeline descriptor
        #[arg(long, default_value = ".helo-ci.yml")]
        config: PathBuf,
        /// Directory the steps run in
        #[arg(long, default_value = ".")]
        source: PathBuf,
        /// Skip service provisioning; services are assumed reachable
        #[arg(long)]
        no_services: bool,
        /// Leave service containers running after the build
        #[arg(long)]
        keep_services: bool,
        /// Write the build report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Check the descriptor without running anything
    Validate {
        #[arg(long, default_value = ".helo-ci.yml")]
        config: PathBuf,
    },
    /// Run a single phase, without services
    Phase {
        /// before_install, install, before_script, script or after_success
        #[arg(long)]
        name: String,
        #[arg(long, default_value = ".helo-ci.yml")]
        config: PathBuf,
        #[arg(long, default_value = ".")]
        source: PathBuf,
    },
    /// Manage the descriptor's service containers
    Services {
        #[command(subcommand)]
        action: ServicesCommand,
    },
}

#[derive(Subcommand)]
enum ServicesCommand {
    /// Start service containers and wait until they accept connections
    Up {
        #[arg(long, default_value = ".helo-ci.yml")]
        config: PathBuf,
    },
    /// Remove service containers
    Down {
        #[arg(long, default_value = ".helo-ci.yml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let runner_config = RunnerConfig::from_env();

    let code = match dispatch(cli.command, &runner_config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            2
        }
    };
    Ok(ExitCode::from(code))
}

/// Run one subcommand. `Err` means the runner could not do its job at
/// all, which callers see as exit code 2.
async fn dispatch(command: Command, runner_config: &RunnerConfig) -> eyre::Result<u8> {
    match command {
        Command::Run {
            config,
            source,
            no_services,
            keep_services,
            report,
        } => {
            let pipeline = PipelineConfig::load(&config)?;
            let options = RunOptions {
                source_dir: source,
                no_services,
                keep_services,
                echo_output: true,
            };
            let built = executor::run_pipeline(&pipeline, runner_config, &options).await?;
            if let Some(path) = report {
                built.write_json(&path)?;
                tracing::info!(path = %path.display(), "Report written");
            }
            print!("{}", built.summary());
            Ok(built.status.exit_code() as u8)
        }
        Command::Validate { config } => {
            let pipeline = PipelineConfig::load(&config)?;
            let problems = pipeline.validate();
            if problems.is_empty() {
                println!("{}: OK", config.display());
                Ok(0)
            } else {
                for problem in &problems {
                    eprintln!("{}: {problem}", config.display());
                }
                Ok(1)
            }
        }
        Command::Phase {
            name,
            config,
            source,
        } => {
            let phase: Phase = name.parse()?;
            let pipeline = PipelineConfig::load(&config)?;
            let options = RunOptions {
                source_dir: source,
                no_services: true,
                keep_services: false,
                echo_output: true,
            };
            let built =
                executor::run_single_phase(&pipeline, runner_config, phase, &options).await?;
            print!("{}", built.summary());
            Ok(built.status.exit_code() as u8)
        }
        Command::Services { action } => match action {
            ServicesCommand::Up { config } => {
                let manager = service_manager(&config, runner_config)?;
                match manager {
                    Some(manager) => manager.up().await?,
                    None => println!("no services declared"),
                }
                Ok(0)
            }
            ServicesCommand::Down { config } => {
                let manager = service_manager(&config, runner_config)?;
                match manager {
                    Some(manager) => manager.down().await,
                    None => println!("no services declared"),
                }
                Ok(0)
            }
        },
    }
}

fn service_manager(
    config: &std::path::Path,
    runner_config: &RunnerConfig,
) -> eyre::Result<Option<ServiceManager>> {
    let pipeline = PipelineConfig::load(config)?;
    if pipeline.services.is_empty() {
        return Ok(None);
    }
    let db_url = pipeline.database_url()?;
    let mut specs = Vec::new();
    for kind in &pipeline.services {
        specs.push(ServiceSpec::resolve(*kind, db_url.as_ref(), runner_config)?);
    }
    Ok(Some(ServiceManager::new(runner_config, specs)))
}

fn init_tracing() {
    // Logs go to stderr so stdout stays the build's own output stream.
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }
}
