// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! meshbench CLI
//!
//! Runs the interconnect benchmark as one member of a group. Group
//! membership comes from the launcher (TCP) or from `--local` (tasks of
//! this process).

use std::io;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use meshbench_core::error::{EX_OK, EX_USAGE};
use meshbench_core::{
    local_host_name, run_local_group, run_member, BenchError, ConfigLoader, TcpGroup,
    TrialCount, ValidationError,
};

mod cpu_affinity;

/// meshbench - interconnect latency and bandwidth benchmark
#[derive(Parser)]
#[command(name = "meshbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Number of trials (positive integer)
    pub trials: String,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Run an in-process group of N members instead of joining over TCP
    #[arg(long, value_name = "N")]
    pub local: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Failures surfaced by the binary, each with its own exit status.
#[derive(Debug, Error)]
enum CliError {
    #[error("Usage: meshbench trials\n{0}")]
    Usage(ValidationError),

    #[error("sched_getaffinity: {0}")]
    Affinity(nix::Error),

    #[error(transparent)]
    Bench(#[from] BenchError),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => EX_USAGE,
            CliError::Affinity(_) => -1,
            CliError::Bench(e) => e.exit_code(),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let _ = e.print();
            std::process::exit(EX_USAGE);
        }
    };

    // Initialize logging; RUST_LOG wins over the verbose flag
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let code = match run(cli).await {
        Ok(()) => EX_OK,
        Err(e) => {
            if matches!(&e, CliError::Bench(inner) if !inner.is_local()) {
                tracing::error!(error = %e, "Benchmark aborted");
            }
            eprintln!("meshbench: {}", e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // Nothing may reach the group before the trial count is known good.
    let trials: TrialCount = cli.trials.parse().map_err(CliError::Usage)?;

    let cpus = cpu_affinity::allowed_cpus().map_err(CliError::Affinity)?;
    cpu_affinity::report(&mut io::stdout(), &cpus).map_err(|source| BenchError::Io {
        context: "writing affinity report",
        source,
    })?;

    let config = ConfigLoader::load(cli.config.as_deref())?;
    let host = local_host_name();

    match (cli.local, config.transport) {
        (Some(0), _) => {
            return Err(BenchError::from(ValidationError::InvalidFieldValue {
                field: "local",
                value: "0".to_string(),
                reason: "group must have at least one member".to_string(),
            })
            .into());
        }
        (Some(size), _) => {
            tracing::info!(size = size, trials = trials.value(), "Running local group");
            run_local_group(size, trials, config.benchmark, &host, io::stdout()).await?;
        }
        (None, Some(transport)) => {
            tracing::info!(
                rank = %transport.rank,
                size = transport.size,
                root_addr = %transport.root_addr,
                "Forming TCP group"
            );
            let group = TcpGroup::connect(&transport).await.map_err(BenchError::from)?;
            run_member(group, trials, config.benchmark, host, io::stdout()).await?;
        }
        (None, None) => {
            tracing::info!("No group configured, running as a single member");
            run_local_group(1, trials, config.benchmark, &host, io::stdout()).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_trials_and_flags() {
        let cli = Cli::try_parse_from(["meshbench", "5", "--local", "3", "-v"]).unwrap();
        assert_eq!(cli.trials, "5");
        assert_eq!(cli.local, Some(3));
        assert!(cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_requires_trials() {
        assert!(Cli::try_parse_from(["meshbench"]).is_err());
    }

    #[tokio::test]
    async fn test_non_numeric_trials_is_usage_error() {
        let cli = Cli::try_parse_from(["meshbench", "abc", "--local", "2"]).unwrap();
        let err = run(cli).await.unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
        assert_eq!(err.exit_code(), EX_USAGE);
        assert!(err.to_string().starts_with("Usage: meshbench trials"));
    }

    #[tokio::test]
    async fn test_zero_trials_is_usage_error() {
        let cli = Cli::try_parse_from(["meshbench", "0"]).unwrap();
        assert_eq!(run(cli).await.unwrap_err().exit_code(), EX_USAGE);
    }

    #[tokio::test]
    async fn test_empty_local_group_is_config_error() {
        let cli = Cli::try_parse_from(["meshbench", "1", "--local", "0"]).unwrap();
        let err = run(cli).await.unwrap_err();
        assert_eq!(err.exit_code(), meshbench_core::error::EX_CONFIG);
    }

    #[test]
    fn test_affinity_failure_exit_code() {
        let err = CliError::Affinity(nix::Error::EINVAL);
        assert_eq!(err.exit_code(), -1);
        assert!(err.to_string().starts_with("sched_getaffinity"));
    }
}
