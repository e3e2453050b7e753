//! Statement execution for athena-audit.
//!
//! Submission, completion polling, pagination, and batch execution, plus the
//! executor that ties them together.

pub mod batch;
pub mod executor;
pub mod paginator;
pub mod poller;
pub mod submitter;

pub use batch::{BatchOrchestrator, BatchOutcome, StatementReport, StatementRunner};
pub use executor::QueryExecutor;
pub use paginator::ResultPaginator;
pub use poller::CompletionPoller;
pub use submitter::{request_token, Submitter};
