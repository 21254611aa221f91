use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use rowsift_table::Table;
use rowsift_types::UploadHandle;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no uploaded table for handle {0}")]
    NotFound(UploadHandle),
    #[error("table store error: {0}")]
    Backend(String),
}

/// Durable-enough mapping from upload handles to parsed tables.
///
/// Tables are immutable once stored; concurrent readers of the same
/// handle each get their own clone.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Persist a table and return a fresh unique handle.
    async fn put(&self, table: Table) -> Result<UploadHandle, StoreError>;

    /// Retrieve a previously stored table.
    async fn get(&self, handle: UploadHandle) -> Result<Table, StoreError>;

    /// Drop entries older than the given age; returns how many went.
    async fn purge_older_than(&self, age: Duration) -> Result<usize, StoreError>;
}

struct StoredTable {
    table: Table,
    stored_at: Instant,
}

/// In-memory table store for a single-process deployment.
///
/// Does not survive a restart; the upload contract only promises as
/// much durability as the backing medium gives.
pub struct InMemoryTableStore {
    tables: Mutex<HashMap<UploadHandle, StoredTable>>,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn put(&self, table: Table) -> Result<UploadHandle, StoreError> {
        let handle = UploadHandle::fresh();
        let mut inner = self.tables.lock().await;
        inner.insert(
            handle,
            StoredTable {
                table,
                stored_at: Instant::now(),
            },
        );
        Ok(handle)
    }

    async fn get(&self, handle: UploadHandle) -> Result<Table, StoreError> {
        let inner = self.tables.lock().await;
        inner
            .get(&handle)
            .map(|stored| stored.table.clone())
            .ok_or(StoreError::NotFound(handle))
    }

    async fn purge_older_than(&self, age: Duration) -> Result<usize, StoreError> {
        let mut inner = self.tables.lock().await;
        let before = inner.len();
        inner.retain(|_, stored| stored.stored_at.elapsed() < age);
        let dropped = before - inner.len();
        if dropped > 0 {
            tracing::debug!(dropped, "purged expired uploads");
        }
        Ok(dropped)
    }
}
