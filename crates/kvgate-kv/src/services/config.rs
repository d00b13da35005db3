//! KV Service configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bound on a single store round trip
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 5_000;
/// Default bound on a whole FetchAll (scan plus per-key reads)
pub const DEFAULT_FETCH_ALL_TIMEOUT_MS: u64 = 30_000;

fn default_operation_timeout_ms() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_MS
}

fn default_fetch_all_timeout_ms() -> u64 {
    DEFAULT_FETCH_ALL_TIMEOUT_MS
}

/// Runtime tuning for [`KvService`](super::KvService).
///
/// TTL, scan page size and scan pattern are fixed and deliberately not part
/// of this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvConfig {
    /// Timeout for each individual store command, in milliseconds
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Deadline for a complete FetchAll, in milliseconds
    #[serde(default = "default_fetch_all_timeout_ms")]
    pub fetch_all_timeout_ms: u64,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            fetch_all_timeout_ms: DEFAULT_FETCH_ALL_TIMEOUT_MS,
        }
    }
}

impl KvConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn fetch_all_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_all_timeout_ms)
    }

    /// Reject zero timeouts, which would fail every call.
    pub fn validate(&self) -> Result<(), String> {
        if self.operation_timeout_ms == 0 {
            return Err("operation timeout must be greater than zero".to_string());
        }
        if self.fetch_all_timeout_ms == 0 {
            return Err("fetch-all timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}
