//! Request and response types for KV handlers

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use utoipa::{IntoParams, ToSchema};

use crate::KvService;

/// Application state for KV handlers
pub struct KvAppState {
    pub kv_service: Arc<KvService>,
    /// Fired on server shutdown; aborts in-flight enumerations.
    pub shutdown: CancellationToken,
}

impl KvAppState {
    pub fn new(kv_service: Arc<KvService>, shutdown: CancellationToken) -> Self {
        Self {
            kv_service,
            shutdown,
        }
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// Request to store or update a key
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetRequest {
    /// The key to write
    #[serde(default)]
    #[schema(example = "session:42")]
    pub key: String,

    /// The value to store; always a string
    #[serde(default)]
    #[schema(example = "active")]
    pub value: String,
}

/// Query string for reading a key
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GetQuery {
    /// The key to read
    #[param(example = "session:42")]
    pub key: Option<String>,
}

/// Request to delete a key
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteRequest {
    /// The key to delete
    #[serde(default)]
    #[schema(example = "session:42")]
    pub key: String,
}

// =============================================================================
// Response Types
// =============================================================================

/// Confirmation returned by write operations
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Key stored/updated successfully")]
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Store health
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}
