//! athena-audit - Athena statement runner and usage-metrics collector.
//!
//! This library exposes the core modules for use in the binary and in
//! integration tests.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod query;
pub mod service;
