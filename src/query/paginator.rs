//! Result pagination.
//!
//! Fetches the results of a successful execution page by page. For SELECT
//! statements the service prepends a header row echoing the column names to
//! the first page only; it is stripped exactly once.

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::debug;

use super::poller::CompletionPoller;
use crate::client::{ClientManager, WorkerId};
use crate::config::MAX_PAGE_SIZE;
use crate::error::{AuditError, Result};
use crate::service::{ExecutionHandle, ExecutionStatus, ResultPage};

/// Position of a lazily consumed page stream.
enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Retrieves result pages of finished executions.
#[derive(Debug, Clone)]
pub struct ResultPaginator {
    clients: Arc<ClientManager>,
    poller: CompletionPoller,
    page_size: usize,
}

impl ResultPaginator {
    /// Creates a paginator requesting `page_size` rows per page in `fetch_all`.
    pub fn new(clients: Arc<ClientManager>, poller: CompletionPoller, page_size: usize) -> Self {
        Self {
            clients,
            poller,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Waits for `handle` and fails with `QueryFailed` unless it succeeded.
    async fn completed(&self, worker: WorkerId, handle: &ExecutionHandle) -> Result<ExecutionStatus> {
        let status = self.poller.await_completion(worker, handle).await;
        if status.success() {
            Ok(status)
        } else {
            Err(AuditError::query_failed(status))
        }
    }

    /// Collects every page of the result into one.
    ///
    /// The returned page carries the first page's columns and no token.
    pub async fn fetch_all(&self, worker: WorkerId, handle: &ExecutionHandle) -> Result<ResultPage> {
        let status = self.completed(worker, handle).await?;
        let client = self.clients.handle_for(worker).await?;

        let mut collected = ResultPage::default();
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut page = client
                .result_page(handle, token.as_deref(), self.page_size)
                .await?;
            if pages == 0 {
                if status.has_header_row() {
                    page.strip_header();
                }
                collected.columns = std::mem::take(&mut page.columns);
            }
            pages += 1;
            collected.rows.append(&mut page.rows);

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        debug!(
            "Fetched {} rows in {} pages for {}",
            collected.row_count(),
            pages,
            handle
        );
        Ok(collected)
    }

    /// Fetches a single page.
    ///
    /// Without a token this is the first page: for SELECT one extra row is
    /// requested to make up for the stripped header, within the service
    /// maximum. With a token exactly `max_rows` are requested and nothing is
    /// stripped. `max_rows` must be between 1 and [`MAX_PAGE_SIZE`].
    pub async fn fetch_page(
        &self,
        worker: WorkerId,
        handle: &ExecutionHandle,
        continuation_token: Option<&str>,
        max_rows: usize,
    ) -> Result<ResultPage> {
        if !(1..=MAX_PAGE_SIZE).contains(&max_rows) {
            return Err(AuditError::config(format!(
                "max_rows must be between 1 and {MAX_PAGE_SIZE}, got {max_rows}"
            )));
        }
        let status = self.completed(worker, handle).await?;
        let client = self.clients.handle_for(worker).await?;

        match continuation_token {
            None if status.has_header_row() => {
                let request = (max_rows + 1).min(MAX_PAGE_SIZE);
                let mut page = client.result_page(handle, None, request).await?;
                page.strip_header();
                Ok(page)
            }
            None => client.result_page(handle, None, max_rows).await,
            Some(token) => client.result_page(handle, Some(token), max_rows).await,
        }
    }

    /// Streams pages of `page_size` rows, header stripped from the first.
    pub fn page_stream(
        &self,
        worker: WorkerId,
        handle: ExecutionHandle,
        page_size: usize,
    ) -> BoxStream<'static, Result<ResultPage>> {
        let paginator = self.clone();
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        stream::try_unfold(Cursor::Start, move |cursor| {
            Self::advance(paginator.clone(), worker, handle.clone(), page_size, cursor)
        })
        .boxed()
    }

    async fn advance(
        paginator: ResultPaginator,
        worker: WorkerId,
        handle: ExecutionHandle,
        page_size: usize,
        cursor: Cursor,
    ) -> Result<Option<(ResultPage, Cursor)>> {
        let token = match cursor {
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
            Cursor::Done => return Ok(None),
        };
        let page = paginator
            .fetch_page(worker, &handle, token.as_deref(), page_size)
            .await?;
        let next = match &page.next_token {
            Some(token) => Cursor::Next(token.clone()),
            None => Cursor::Done,
        };
        Ok(Some((page, next)))
    }
}
