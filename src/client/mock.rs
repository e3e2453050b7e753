//! Mock client factory for testing.
//!
//! Hands out clients that all talk to the same in-memory service, while
//! counting how many clients were created for each worker.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{ClientFactory, ClientHandle, WorkerId};
use crate::error::Result;
use crate::service::MockQueryService;

/// Factory whose clients share one [`MockQueryService`].
#[derive(Debug)]
pub struct MockClientFactory {
    service: Arc<MockQueryService>,
    created: Mutex<HashMap<WorkerId, u32>>,
}

impl MockClientFactory {
    /// Creates a factory over the given mock service.
    pub fn new(service: MockQueryService) -> Self {
        Self::shared(Arc::new(service))
    }

    /// Creates a factory over a service the caller keeps a handle to.
    pub fn shared(service: Arc<MockQueryService>) -> Self {
        Self {
            service,
            created: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the underlying service for inspection.
    pub fn service(&self) -> &Arc<MockQueryService> {
        &self.service
    }

    /// Number of clients created for `worker`.
    pub fn created_for(&self, worker: WorkerId) -> u32 {
        self.created
            .lock()
            .map(|created| created.get(&worker).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of clients created in total.
    pub fn total_created(&self) -> u32 {
        self.created
            .lock()
            .map(|created| created.values().sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ClientFactory for MockClientFactory {
    async fn create(&self, worker: WorkerId) -> Result<ClientHandle> {
        if let Ok(mut created) = self.created.lock() {
            *created.entry(worker).or_insert(0) += 1;
        }
        Ok(self.service.clone())
    }
}
