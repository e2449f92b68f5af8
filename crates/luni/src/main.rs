// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Luni - conversational state store for chat agents.
//!
//! This is the operator binary: it inspects the configured store, runs a
//! maintenance sweep on demand, and prints the effective configuration.

mod config_cmd;
mod status;
mod sweep;

use clap::{Parser, Subcommand};

/// Luni - conversational state store for chat agents.
#[derive(Parser, Debug)]
#[command(name = "luni", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the selected backend, store health and operation metrics.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
        /// Also print the Prometheus exposition of the probe run.
        #[arg(long)]
        metrics: bool,
    },
    /// Reap expired sessions and sweep cache domains once, or periodically.
    Sweep {
        /// Keep sweeping at `session.sweep_interval_seconds` until interrupted.
        #[arg(long)]
        watch: bool,
    },
    /// Print the effective configuration.
    Config {
        /// Output as JSON instead of TOML.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match luni_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            luni_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.agent.log_level);

    let result = match cli.command {
        Some(Commands::Status {
            json,
            plain,
            metrics,
        }) => status::run_status(&config, json, plain, metrics).await,
        Some(Commands::Sweep { watch }) => sweep::run_sweep(&config, watch).await,
        Some(Commands::Config { json }) => config_cmd::run_config(&config, json),
        None => {
            println!("luni: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("luni={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn status_flags_parse() {
        let cli = Cli::parse_from(["luni", "status", "--json"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Status {
                json: true,
                plain: false,
                metrics: false
            })
        ));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = luni_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.agent.name, "luni");
        assert!(!config.store.use_redis);
    }
}
