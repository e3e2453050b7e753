//! Remote query service abstraction.
//!
//! Provides a trait-based interface to the asynchronous query service, so the
//! Athena SDK client and the in-memory mock can be used interchangeably.

mod athena;
mod mock;
mod types;

pub use athena::AthenaService;
pub use mock::{MockFault, MockQueryService};
pub use types::{
    statement_kind, ColumnInfo, ExecutionHandle, ExecutionState, ExecutionStats, ExecutionStatus,
    ResultPage, Row, StatusSource,
};

use crate::error::Result;
use async_trait::async_trait;

/// Maximum number of execution ids accepted by one statistics call.
pub const MAX_STATS_BATCH: usize = 50;

/// Trait defining the operations the core consumes from the remote service.
///
/// All calls are single network round trips; none of them retry.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Starts a statement and returns its execution handle.
    ///
    /// Two calls with the same `request_token` are the same logical request.
    async fn start_execution(
        &self,
        statement: &str,
        request_token: &str,
        output_location: &str,
    ) -> Result<ExecutionHandle>;

    /// Returns the current status of an execution.
    async fn execution_status(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus>;

    /// Returns up to `max_rows` rows of a finished execution's results.
    async fn result_page(
        &self,
        handle: &ExecutionHandle,
        continuation_token: Option<&str>,
        max_rows: usize,
    ) -> Result<ResultPage>;

    /// Returns usage statistics for up to [`MAX_STATS_BATCH`] executions.
    async fn batch_execution_stats(&self, execution_ids: &[String])
        -> Result<Vec<ExecutionStats>>;
}
