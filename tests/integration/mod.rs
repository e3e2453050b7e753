//! Integration tests for athena-audit.

pub mod batch_test;
pub mod common;
pub mod executor_test;
pub mod live_test;
pub mod metrics_test;
