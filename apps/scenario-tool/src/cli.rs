//! Command-line definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "scenario-tool",
    author,
    version,
    about = "Load, delete and clean CSV test scenarios in a record store"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Environment to use (reads <environments-dir>/<env>.toml)
    #[arg(long, global = true, default_value = "qa")]
    pub env: String,

    /// Directory holding environment files
    #[arg(long, global = true, default_value = "environments")]
    pub environments_dir: PathBuf,

    /// Directory scenario names are looked up in
    #[arg(long, global = true, default_value = "data")]
    pub data_dir: PathBuf,

    /// Verbose output (debug logging)
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Materialize a scenario (directory path or name under --data-dir)
    Run {
        scenario: String,

        /// Update existing records matched by key instead of creating duplicates
        #[arg(long)]
        upsert: bool,

        /// Delete everything this run created once it finishes
        #[arg(long)]
        teardown: bool,
    },

    /// Delete the records a scenario describes, in reverse file order
    Delete { scenario: String },

    /// Delete records whose Name matches a LIKE pattern
    Clean {
        /// SQL LIKE pattern, e.g. 'LostS%'
        #[arg(long)]
        pattern: String,

        /// Object type to clean
        #[arg(long, default_value = "Account")]
        object: String,
    },

    /// Split a wide CSV with NN_Object section markers into scenario files
    Split { input: PathBuf, out_dir: PathBuf },

    /// Check that every reference names an alias declared by an earlier file
    Check { scenario: String },
}

impl Commands {
    /// Whether the command talks to the record store.
    pub fn needs_store(&self) -> bool {
        !matches!(self, Commands::Split { .. } | Commands::Check { .. })
    }
}
