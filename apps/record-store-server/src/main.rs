//! Local sandbox record store.
//!
//! Serves an in-memory store with the CRM sandbox automations over the
//! JSON-over-HTTP protocol the scenario tool speaks, so scenarios can be
//! exercised without a real CRM org.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use record_store_api::{Router, Server, ServerConfig};
use scenario_core::{MemoryStore, RecordStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the sandbox server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Reads an automation-populated field stays invisible for
    #[arg(long, default_value_t = 0)]
    visibility_lag: u32,

    /// Bearer token clients must present
    #[arg(long)]
    token: Option<String>,

    /// Request timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    request_timeout_ms: u64,

    /// Serve a plain store without sandbox automations
    #[arg(long)]
    bare: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", args.host, args.port))?;

    let store = if args.bare {
        MemoryStore::new()
    } else {
        MemoryStore::sandbox()
    }
    .with_visibility_lag(args.visibility_lag);
    let store: Arc<dyn RecordStore> = Arc::new(store);

    let config = ServerConfig {
        token: args.token,
        request_timeout_ms: args.request_timeout_ms,
    };
    let router = Router::new(store, config).context("failed to build route table")?;
    let server = Server::new(addr, router);

    tracing::info!(%addr, sandbox = !args.bare, visibility_lag = args.visibility_lag, "starting record store");

    tokio::select! {
        result = server.serve() => result.context("server stopped")?,
        _ = signal::ctrl_c() => tracing::info!("shutdown signal received"),
    }
    Ok(())
}
