//! JSON-over-HTTP record store.
//!
//! Serves any [`RecordStore`](scenario_core::RecordStore) over hyper and
//! provides [`RestStore`], a blocking client implementing the same trait, so
//! the scenario engine can run against a remote sandbox.

pub mod client;
pub mod config;
pub mod handlers;
pub mod router;
pub mod server;

pub use client::RestStore;
pub use config::{ClientConfig, ServerConfig};
pub use router::Router;
pub use server::Server;
