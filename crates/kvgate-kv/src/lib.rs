//! kvgate-kv: Key-Value access layer and HTTP handlers
//!
//! Provides a Redis-backed string KV store with a fixed one-hour TTL on
//! every write and scan-based enumeration of the whole keyspace.

pub mod error;
pub mod handlers;
pub mod services;
pub mod store;
pub mod test_utils;

pub use error::{KvError, StoreError};
pub use services::{Enumeration, KeyValue, KvConfig, KvService};
pub use store::{KvStore, RedisStore, ScanPage};
