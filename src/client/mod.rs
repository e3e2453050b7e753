//! Client lifecycle management.
//!
//! Owns one authenticated service client per worker. Clients are created on
//! first use, reused for the worker's lifetime, and replaced in place when the
//! service reports expired credentials.

mod mock;

pub use mock::MockClientFactory;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::config::AthenaConfig;
use crate::error::Result;
use crate::service::{AthenaService, QueryService};

/// A per-worker handle to the remote service.
pub type ClientHandle = Arc<dyn QueryService>;

/// Identifies the worker a client belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(usize);

impl WorkerId {
    /// The caller's own task, used outside of batch execution.
    pub const MAIN: WorkerId = WorkerId(0);

    /// Identifier of the `n`th batch worker (1-indexed).
    pub fn batch(n: usize) -> Self {
        Self(n.max(1))
    }

    /// Returns the table index of this worker.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::MAIN {
            f.write_str("main")
        } else {
            write!(f, "worker-{}", self.0)
        }
    }
}

/// Creates authenticated clients.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Builds a fresh client for `worker`, resolving credentials anew.
    async fn create(&self, worker: WorkerId) -> Result<ClientHandle>;
}

/// Factory producing Athena SDK clients for a fixed region.
#[derive(Debug, Clone)]
pub struct AthenaClientFactory {
    region: String,
    workgroup: Option<String>,
}

impl AthenaClientFactory {
    /// Creates a factory for the configured region and workgroup.
    pub fn new(config: &AthenaConfig) -> Self {
        Self {
            region: config.region().to_string(),
            workgroup: config.workgroup.clone(),
        }
    }
}

#[async_trait]
impl ClientFactory for AthenaClientFactory {
    async fn create(&self, worker: WorkerId) -> Result<ClientHandle> {
        debug!("Connecting {} to Athena in {}", worker, self.region);
        let service = AthenaService::connect(&self.region, self.workgroup.clone()).await;
        Ok(Arc::new(service))
    }
}

/// Worker-indexed table of client handles.
///
/// Each worker only ever reads and replaces its own slot, so a slot is never
/// shared between two workers.
pub struct ClientManager {
    factory: Arc<dyn ClientFactory>,
    clients: Mutex<HashMap<WorkerId, ClientHandle>>,
}

impl ClientManager {
    /// Creates an empty manager; no client is created until first use.
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<WorkerId, ClientHandle>> {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the client for `worker`, creating it on first use.
    pub async fn handle_for(&self, worker: WorkerId) -> Result<ClientHandle> {
        let existing = self.table().get(&worker).cloned();
        if let Some(client) = existing {
            return Ok(client);
        }

        let client = self.factory.create(worker).await?;
        let mut table = self.table();
        let client = Arc::clone(table.entry(worker).or_insert(client));
        Ok(client)
    }

    /// Discards the client of `worker` and installs a freshly authenticated one.
    pub async fn refresh(&self, worker: WorkerId) -> Result<ClientHandle> {
        info!("Refreshing expired credentials for {}", worker);
        let client = self.factory.create(worker).await?;
        self.table().insert(worker, Arc::clone(&client));
        Ok(client)
    }

    /// Drops the client of `worker`; the next `handle_for` creates a new one.
    pub fn release(&self, worker: WorkerId) {
        if self.table().remove(&worker).is_some() {
            debug!("Released client of {}", worker);
        }
    }

    /// Number of workers that currently hold a client.
    pub fn active_clients(&self) -> usize {
        self.table().len()
    }
}

impl fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientManager")
            .field("active_clients", &self.active_clients())
            .finish()
    }
}
