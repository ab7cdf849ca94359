//! Integration test suite for the scenario engine.
//!
//! 1. End-to-end scenario runs
//! 2. Upsert matching and update files
//! 3. Cleanup

pub mod cleanup_tests;
pub mod end_to_end_tests;
pub mod upsert_tests;
