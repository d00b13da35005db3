//! KV Service implementation
//!
//! This module provides the access layer between HTTP handlers and the
//! backing [`KvStore`](crate::store::KvStore): fixed-TTL upserts, single-key
//! reads and deletes, and cursor-driven enumeration of the keyspace.

mod config;
mod kv_service;

pub use config::{KvConfig, DEFAULT_FETCH_ALL_TIMEOUT_MS, DEFAULT_OPERATION_TIMEOUT_MS};
pub use kv_service::{
    Enumeration, KeyScan, KeyValue, KvService, SCAN_PAGE_SIZE, SCAN_PATTERN, UPSERT_TTL,
};
