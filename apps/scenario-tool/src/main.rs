//! scenario-tool: load CSV test scenarios into a record store.
//!
//! ```bash
//! # Create everything a scenario describes
//! scenario-tool --env qa run lost_sale
//!
//! # Re-run it, updating records that already exist
//! scenario-tool run data/lost_sale --upsert
//!
//! # Remove it again
//! scenario-tool delete lost_sale
//!
//! # Remove leftovers by name pattern
//! scenario-tool clean --pattern 'LostS%' --object Account
//! ```

mod cli;
mod commands;
mod env;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use record_store_api::RestStore;
use scenario_core::{FactoryConfig, HandlerRegistry};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    let config = FactoryConfig::default();
    let handlers = HandlerRegistry::with_builtin_handlers();

    if !cli.command.needs_store() {
        return match &cli.command {
            Commands::Split { input, out_dir } => commands::split(input, out_dir),
            Commands::Check { scenario } => {
                let scenario = commands::locate_scenario(&cli.data_dir, scenario)?;
                commands::check(&scenario, &config)
            }
            _ => Ok(()),
        };
    }

    let client_config = env::client_config(&cli.environments_dir, &cli.env)?;
    let store = RestStore::new(client_config).context("failed to build record store client")?;
    tracing::info!(env = %cli.env, url = store.base_url(), "connecting");
    store
        .health()
        .with_context(|| format!("record store at {} is not reachable", store.base_url()))?;

    match cli.command {
        Commands::Run {
            scenario,
            upsert,
            teardown,
        } => {
            let scenario = commands::locate_scenario(&cli.data_dir, &scenario)?;
            let config = FactoryConfig {
                force_upsert: upsert,
                ..config
            };
            commands::run(&store, &handlers, config, &scenario, teardown)
        }
        Commands::Delete { scenario } => {
            let scenario = commands::locate_scenario(&cli.data_dir, &scenario)?;
            commands::delete(&store, &handlers, config, &scenario)
        }
        Commands::Clean { pattern, object } => {
            commands::clean(&store, &handlers, config, &object, &pattern)
        }
        Commands::Split { .. } | Commands::Check { .. } => Ok(()),
    }
}
