//! Mock query service for testing.
//!
//! Provides an in-memory service with scriptable outcomes, transport faults,
//! paginated results, and request-token deduplication.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::{
    statement_kind, ColumnInfo, ExecutionHandle, ExecutionState, ExecutionStats, ExecutionStatus,
    QueryService, ResultPage, Row,
};
use crate::error::{AuditError, Result};

/// A fault injected into status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// Ordinary transport failure.
    Transport,
    /// Expired credentials.
    CredentialExpired,
    /// A response missing required fields.
    Malformed,
}

impl MockFault {
    fn into_error(self) -> AuditError {
        match self {
            Self::Transport => AuditError::transport("simulated transport failure"),
            Self::CredentialExpired => {
                AuditError::credential_expired("ExpiredTokenException: simulated")
            }
            Self::Malformed => AuditError::malformed("simulated response without a state"),
        }
    }
}

#[derive(Debug, Clone)]
struct MockResult {
    pattern: String,
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
}

#[derive(Debug)]
struct MockExecution {
    statement: String,
    terminal: ExecutionState,
    reason: Option<String>,
    polls: u32,
    columns: Vec<ColumnInfo>,
    /// Rows as the service would return them, header included for SELECT.
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    executions: HashMap<String, MockExecution>,
    tokens: HashMap<String, String>,
    submissions: HashMap<String, u32>,
    outcomes: Vec<(String, ExecutionState, Option<String>)>,
    results: Vec<MockResult>,
    stats: HashMap<String, ExecutionStats>,
    failed_attempts: u32,
    running_polls: u32,
    start_failures: u32,
    status_faults: VecDeque<MockFault>,
    persistent_fault: Option<MockFault>,
    stats_failures: u32,
    status_calls: u32,
    page_requests: Vec<(Option<String>, usize)>,
}

/// In-memory query service that behaves like the remote service.
///
/// Every statement succeeds unless an outcome pattern matches it or it is
/// within the first `failed_attempts` submissions of that statement text.
#[derive(Debug, Default)]
pub struct MockQueryService {
    state: Mutex<MockState>,
}

impl MockQueryService {
    /// Creates a mock where every statement succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn configure(self, f: impl FnOnce(&mut MockState)) -> Self {
        f(&mut self.state());
        self
    }

    /// Statements containing `pattern` end in `state`.
    pub fn with_outcome(
        self,
        pattern: impl Into<String>,
        state: ExecutionState,
        reason: Option<&str>,
    ) -> Self {
        let pattern = pattern.into();
        let reason = reason.map(str::to_string);
        self.configure(|s| s.outcomes.push((pattern, state, reason)))
    }

    /// The first `n` submissions of each distinct statement end FAILED.
    pub fn with_failed_attempts(self, n: u32) -> Self {
        self.configure(|s| s.failed_attempts = n)
    }

    /// Each execution reports QUEUED, then RUNNING, for `n` polls in total.
    pub fn with_running_polls(self, n: u32) -> Self {
        self.configure(|s| s.running_polls = n)
    }

    /// The first `n` start calls fail with a transport error.
    pub fn with_start_failures(self, n: u32) -> Self {
        self.configure(|s| s.start_failures = n)
    }

    /// Status queries fail with these faults, in order, before succeeding.
    pub fn with_status_faults(self, faults: impl IntoIterator<Item = MockFault>) -> Self {
        let faults: Vec<_> = faults.into_iter().collect();
        self.configure(|s| s.status_faults.extend(faults))
    }

    /// Every status query fails with `fault`.
    pub fn with_persistent_status_fault(self, fault: MockFault) -> Self {
        self.configure(|s| s.persistent_fault = Some(fault))
    }

    /// The first `n` statistics calls fail with a transport error.
    pub fn with_stats_failures(self, n: u32) -> Self {
        self.configure(|s| s.stats_failures = n)
    }

    /// Statements containing `pattern` produce these data rows.
    ///
    /// SELECT statements additionally get a header row echoing the column
    /// names, as the real service returns.
    pub fn with_result(
        self,
        pattern: impl Into<String>,
        columns: Vec<ColumnInfo>,
        rows: Vec<Row>,
    ) -> Self {
        let result = MockResult {
            pattern: pattern.into(),
            columns,
            rows,
        };
        self.configure(|s| s.results.push(result))
    }

    /// Registers statistics returned for `stats.execution_id`.
    pub fn with_stats(self, stats: ExecutionStats) -> Self {
        self.configure(|s| {
            s.stats.insert(stats.execution_id.clone(), stats);
        })
    }

    /// Number of start calls made for exactly this statement text.
    pub fn submissions(&self, statement: &str) -> u32 {
        self.state().submissions.get(statement).copied().unwrap_or(0)
    }

    /// Number of distinct executions created.
    pub fn execution_count(&self) -> usize {
        self.state().executions.len()
    }

    /// Number of status queries received, failed ones included.
    pub fn status_calls(&self) -> u32 {
        self.state().status_calls
    }

    /// `(continuation_token, max_rows)` of every page request, in order.
    pub fn page_requests(&self) -> Vec<(Option<String>, usize)> {
        self.state().page_requests.clone()
    }
}

impl MockState {
    fn build_execution(&self, statement: &str, attempt: u32) -> MockExecution {
        let (terminal, reason) = if attempt <= self.failed_attempts {
            (
                ExecutionState::Failed,
                Some(format!("simulated failure on attempt {attempt}")),
            )
        } else {
            self.outcomes
                .iter()
                .find(|(pattern, _, _)| statement.contains(pattern.as_str()))
                .map(|(_, state, reason)| (*state, reason.clone()))
                .unwrap_or((ExecutionState::Succeeded, None))
        };

        let (columns, mut rows) = self
            .results
            .iter()
            .find(|r| statement.contains(r.pattern.as_str()))
            .map(|r| (r.columns.clone(), r.rows.clone()))
            .unwrap_or_default();
        if statement_kind(statement) == "SELECT" {
            let header = columns.iter().map(|c| Some(c.name.clone())).collect();
            rows.insert(0, header);
        }

        MockExecution {
            statement: statement.to_string(),
            terminal,
            reason,
            polls: 0,
            columns,
            rows,
        }
    }
}

#[async_trait]
impl QueryService for MockQueryService {
    async fn start_execution(
        &self,
        statement: &str,
        request_token: &str,
        _output_location: &str,
    ) -> Result<ExecutionHandle> {
        let mut state = self.state();
        *state.submissions.entry(statement.to_string()).or_insert(0) += 1;

        if state.start_failures > 0 {
            state.start_failures -= 1;
            return Err(AuditError::transport("simulated start failure"));
        }

        if let Some(id) = state.tokens.get(request_token) {
            return Ok(ExecutionHandle::new(id.clone()));
        }

        let attempt = state.submissions[statement];
        let execution = state.build_execution(statement, attempt);
        state.next_id += 1;
        let id = format!("mock-exec-{:04}", state.next_id);
        state.executions.insert(id.clone(), execution);
        state.tokens.insert(request_token.to_string(), id.clone());
        Ok(ExecutionHandle::new(id))
    }

    async fn execution_status(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus> {
        let mut state = self.state();
        state.status_calls += 1;

        if let Some(fault) = state.persistent_fault {
            return Err(fault.into_error());
        }
        if let Some(fault) = state.status_faults.pop_front() {
            return Err(fault.into_error());
        }

        let running_polls = state.running_polls;
        let execution = state
            .executions
            .get_mut(handle.as_str())
            .ok_or_else(|| AuditError::transport(format!("unknown execution {handle}")))?;

        let current = if execution.polls >= running_polls {
            execution.terminal
        } else if execution.polls == 0 {
            ExecutionState::Queued
        } else {
            ExecutionState::Running
        };
        execution.polls += 1;

        Ok(ExecutionStatus::reported(
            handle.clone(),
            current,
            execution.statement.clone(),
            execution.reason.clone(),
        ))
    }

    async fn result_page(
        &self,
        handle: &ExecutionHandle,
        continuation_token: Option<&str>,
        max_rows: usize,
    ) -> Result<ResultPage> {
        let mut state = self.state();
        state
            .page_requests
            .push((continuation_token.map(str::to_string), max_rows));

        let execution = state
            .executions
            .get(handle.as_str())
            .ok_or_else(|| AuditError::transport(format!("unknown execution {handle}")))?;
        if execution.terminal != ExecutionState::Succeeded {
            return Err(AuditError::transport(format!(
                "execution {handle} has no results"
            )));
        }

        let offset = match continuation_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| AuditError::transport(format!("invalid token '{token}'")))?,
            None => 0,
        };
        let end = offset.saturating_add(max_rows).min(execution.rows.len());
        let rows = execution.rows.get(offset..end).unwrap_or_default().to_vec();
        let next_token = (end < execution.rows.len()).then(|| end.to_string());

        Ok(ResultPage {
            columns: execution.columns.clone(),
            rows,
            next_token,
        })
    }

    async fn batch_execution_stats(
        &self,
        execution_ids: &[String],
    ) -> Result<Vec<ExecutionStats>> {
        let mut state = self.state();
        if state.stats_failures > 0 {
            state.stats_failures -= 1;
            return Err(AuditError::transport("simulated statistics failure"));
        }
        Ok(execution_ids
            .iter()
            .filter_map(|id| state.stats.get(id).cloned())
            .collect())
    }
}
