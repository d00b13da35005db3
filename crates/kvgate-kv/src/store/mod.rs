//! Store client abstraction
//!
//! The access layer only talks to the backing engine through [`KvStore`],
//! so it can be driven by Redis in production and by an in-memory double
//! in tests.

mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

pub use redis_store::RedisStore;

/// One page of an incremental scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Keys returned by this page. May repeat keys seen on earlier pages.
    pub keys: Vec<String>,
    /// Cursor to continue from. Zero means the scan is complete.
    pub cursor: u64,
}

impl ScanPage {
    pub fn is_last(&self) -> bool {
        self.cursor == 0
    }
}

/// Commands the access layer needs from the backing engine.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous value and expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Read a key. `None` when it does not exist or has expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete a key, returning how many keys were removed.
    async fn del(&self, key: &str) -> Result<u64, StoreError>;

    /// Fetch one page of keys matching `pattern`, starting at `cursor`.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize)
        -> Result<ScanPage, StoreError>;

    /// Round trip to check the engine is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}
