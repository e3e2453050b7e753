//! Statement submission.
//!
//! Starts one execution per call. Request tokens decide whether two
//! submissions are the same logical request on the service side.

use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::service::{statement_kind, ExecutionHandle, QueryService};

/// Starts statements on the remote service.
#[derive(Debug, Clone)]
pub struct Submitter {
    staging_location: String,
}

impl Submitter {
    /// Creates a submitter writing results below `staging_location` by default.
    pub fn new(staging_location: impl Into<String>) -> Self {
        Self {
            staging_location: staging_location.into(),
        }
    }

    /// Returns the default output location.
    pub fn staging_location(&self) -> &str {
        &self.staging_location
    }

    /// Submits `statement` and returns its handle.
    ///
    /// Without a `dedup_key` every call gets a fresh token, so identical text
    /// always starts a new execution. Errors are returned as-is; there is no
    /// retry here.
    pub async fn submit(
        &self,
        client: &dyn QueryService,
        statement: &str,
        output_location: Option<&str>,
        dedup_key: Option<&str>,
    ) -> Result<ExecutionHandle> {
        let output_location = output_location.unwrap_or(&self.staging_location);
        let token = request_token(dedup_key);

        debug!(
            "Submitting {} statement (dedup: {}) to {}",
            statement_kind(statement),
            dedup_key.is_some(),
            output_location
        );
        let handle = client
            .start_execution(statement, &token, output_location)
            .await?;
        info!("Started execution {}", handle);
        Ok(handle)
    }
}

/// Builds the service request token for a submission.
///
/// A dedup key maps to its SHA-256 hex digest (64 characters, within the
/// service's 32..=128 bound); no key yields a random UUID.
pub fn request_token(dedup_key: Option<&str>) -> String {
    match dedup_key {
        Some(key) => format!("{:x}", Sha256::digest(key.as_bytes())),
        None => Uuid::new_v4().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::MockQueryService;

    #[test]
    fn test_dedup_token_is_deterministic() {
        let a = request_token(Some("SELECT 1"));
        let b = request_token(Some("SELECT 1"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, request_token(Some("SELECT 2")));
    }

    #[test]
    fn test_random_tokens_are_unique() {
        let a = request_token(None);
        let b = request_token(None);
        assert_ne!(a, b);
        assert!((32..=128).contains(&a.len()));
    }

    #[tokio::test]
    async fn test_identical_text_without_key_starts_twice() {
        let service = MockQueryService::new();
        let submitter = Submitter::new("s3://staging/");

        let a = submitter.submit(&service, "SELECT 1", None, None).await.unwrap();
        let b = submitter.submit(&service, "SELECT 1", None, None).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(service.execution_count(), 2);
    }

    #[tokio::test]
    async fn test_same_key_is_same_request() {
        let service = MockQueryService::new();
        let submitter = Submitter::new("s3://staging/");

        let a = submitter
            .submit(&service, "SELECT 1", None, Some("daily"))
            .await
            .unwrap();
        let b = submitter
            .submit(&service, "SELECT 1", None, Some("daily"))
            .await
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(service.execution_count(), 1);
        assert_eq!(service.submissions("SELECT 1"), 2);
    }

    #[tokio::test]
    async fn test_start_failure_propagates_without_retry() {
        let service = MockQueryService::new().with_start_failures(1);
        let submitter = Submitter::new("s3://staging/");

        let result = submitter.submit(&service, "SELECT 1", None, None).await;

        assert!(result.is_err());
        assert_eq!(service.submissions("SELECT 1"), 1);
        assert_eq!(service.execution_count(), 0);
    }
}
