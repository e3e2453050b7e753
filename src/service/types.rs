//! Execution and result types for the remote query service.
//!
//! Defines the handle, status, and page structures passed between the
//! submitter, poller, paginator, and batch orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for one submitted statement on the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionHandle(String);

impl ExecutionHandle {
    /// Wraps an execution id issued by the service.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw execution id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionState {
    /// Returns the state as the service spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parses a state string as reported by the service.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "QUEUED" => Some(Self::Queued),
            "RUNNING" => Some(Self::Running),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" | "CANCELED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns true for SUCCEEDED, FAILED and CANCELLED.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed | Self::Cancelled => 2,
        }
    }

    /// Returns true if moving from `self` to `next` does not regress.
    ///
    /// Terminal states never transition, not even to another terminal state.
    pub fn can_advance_to(&self, next: ExecutionState) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        next.rank() >= self.rank()
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a status came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    /// The service reported this state.
    Service,
    /// No usable status could be read; the poller gave up after `errors`
    /// consecutive transport failures and forced the state to FAILED.
    TransportExhausted { errors: u32 },
    /// The status response could not be used (missing fields, unknown
    /// state, or a non-transport error); the state was forced to FAILED
    /// without retrying.
    Unreadable,
}

/// Status of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub handle: ExecutionHandle,
    pub state: ExecutionState,
    /// First token of the statement, upper-cased (e.g. "SELECT", "SHOW").
    pub statement_kind: String,
    pub statement_text: String,
    /// Only present for FAILED or CANCELLED when a reason is known.
    pub failure_reason: Option<String>,
    pub source: StatusSource,
}

impl ExecutionStatus {
    /// Builds a status as reported by the service.
    ///
    /// A failure reason supplied alongside a non-failure state is dropped.
    pub fn reported(
        handle: ExecutionHandle,
        state: ExecutionState,
        statement_text: impl Into<String>,
        failure_reason: Option<String>,
    ) -> Self {
        let statement_text = statement_text.into();
        let failure_reason = match state {
            ExecutionState::Failed | ExecutionState::Cancelled => failure_reason,
            _ => None,
        };
        Self {
            handle,
            state,
            statement_kind: statement_kind(&statement_text),
            statement_text,
            failure_reason,
            source: StatusSource::Service,
        }
    }

    /// Builds the forced FAILED status used when status queries kept failing.
    ///
    /// Statement details come from the last successful response, if any.
    pub fn transport_exhausted(
        handle: ExecutionHandle,
        errors: u32,
        last_seen: Option<&ExecutionStatus>,
        last_error: impl Into<String>,
    ) -> Self {
        Self::forced_failure(
            handle,
            StatusSource::TransportExhausted { errors },
            last_seen,
            last_error.into(),
        )
    }

    /// Builds the forced FAILED status for a status query that failed in a
    /// way retrying cannot fix.
    pub fn unreadable(
        handle: ExecutionHandle,
        last_seen: Option<&ExecutionStatus>,
        error: impl Into<String>,
    ) -> Self {
        Self::forced_failure(handle, StatusSource::Unreadable, last_seen, error.into())
    }

    fn forced_failure(
        handle: ExecutionHandle,
        source: StatusSource,
        last_seen: Option<&ExecutionStatus>,
        reason: String,
    ) -> Self {
        let statement_text = last_seen
            .map(|s| s.statement_text.clone())
            .unwrap_or_default();
        Self {
            handle,
            state: ExecutionState::Failed,
            statement_kind: statement_kind(&statement_text),
            statement_text,
            failure_reason: Some(reason),
            source,
        }
    }

    /// True iff the execution reached SUCCEEDED according to the service.
    pub fn success(&self) -> bool {
        self.state == ExecutionState::Succeeded && self.source == StatusSource::Service
    }

    /// Returns true if the service prefixes results with a header row.
    pub fn has_header_row(&self) -> bool {
        self.statement_kind == "SELECT"
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}]", self.statement_kind, self.state, self.handle)?;
        match self.source {
            StatusSource::TransportExhausted { errors } => {
                write!(f, " after {errors} status errors")?;
            }
            StatusSource::Unreadable => f.write_str(" (unreadable status)")?,
            StatusSource::Service => {}
        }
        if let Some(reason) = &self.failure_reason {
            write!(f, ": {reason}")?;
        }
        Ok(())
    }
}

/// Returns the first whitespace-delimited token of `statement`, upper-cased.
pub fn statement_kind(statement: &str) -> String {
    statement
        .split_whitespace()
        .next()
        .map(str::to_uppercase)
        .unwrap_or_default()
}

/// Metadata about a column in a result page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Column data type as reported by the service.
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A row of values; `None` is a SQL NULL.
pub type Row = Vec<Option<String>>;

/// One page (or a concatenation of pages) of query results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPage {
    /// Column metadata for the result set.
    pub columns: Vec<ColumnInfo>,

    /// Rows of data.
    pub rows: Vec<Row>,

    /// Cursor for the next page, if any.
    pub next_token: Option<String>,
}

impl ResultPage {
    /// Creates a page with the given columns and rows and no continuation.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            next_token: None,
        }
    }

    /// Returns true if the page has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows in the page.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Removes and returns the first row, if present.
    pub fn strip_header(&mut self) -> Option<Row> {
        if self.rows.is_empty() {
            None
        } else {
            Some(self.rows.remove(0))
        }
    }

    /// Returns the values of the first column, skipping NULLs.
    pub fn first_column(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(|row| row.first().and_then(|v| v.as_deref()))
    }
}

/// Usage statistics for one finished execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub execution_id: String,
    pub database: Option<String>,
    pub engine_execution_ms: Option<i64>,
    pub data_scanned_bytes: Option<i64>,
    /// State as the service spells it.
    pub state: String,
    pub submitted_at: Option<String>,
    pub completed_at: Option<String>,
}
