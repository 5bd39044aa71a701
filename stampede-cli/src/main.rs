use anyhow::Context;
use clap::{Parser, Subcommand};
use stampede::{LoadTest, RunError};
use stampede_core::RunConfig;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_LOG_FILTER: &str = "stampede=info,stampede_core=info";

/// Thresholds or checks failed.
const EXIT_FAILED: u8 = 1;
/// The configuration could not be loaded.
const EXIT_CONFIG: u8 = 2;

#[derive(Parser, Debug)]
#[command(version, about = "A staged HTTP load generator.")]
struct StampedeCli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the load test described by a JSON configuration file.
    Run {
        config: PathBuf,

        /// Override the configured target URL.
        #[arg(short, long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = StampedeCli::parse();
    debug!("{args:?}");

    match args.command {
        Command::Run { config, url } => run(&config, url.as_deref()).await,
    }
}

async fn run(path: &Path, url: Option<&str>) -> ExitCode {
    let config = match load_config(path, url) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match LoadTest::new(config).await {
        Ok(report) => {
            println!("{report}");
            if report.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_FAILED)
            }
        }
        Err(RunError::Config(err)) => {
            eprintln!("error: {err}");
            ExitCode::from(EXIT_CONFIG)
        }
        Err(err) => {
            error!("{err}");
            ExitCode::from(EXIT_FAILED)
        }
    }
}

fn load_config(path: &Path, url: Option<&str>) -> anyhow::Result<RunConfig> {
    let mut config = RunConfig::from_path(path)
        .with_context(|| format!("Unable to load configuration from {}", path.display()))?;

    if let Some(url) = url {
        config
            .set_target_url(url)
            .context("Invalid --url override")?;
    }

    Ok(config)
}
