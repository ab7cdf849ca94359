//! Integration tests for the HTTP record store.
//!
//! 1. Record CRUD and queries over the wire
//! 2. Full scenario runs through the client

pub mod helpers;
pub mod scenario_tests;
pub mod store_tests;
