//! Error types for the KV service

use std::time::Duration;

use axum::http::StatusCode;
use kvgate_core::problemdetails::{self, Problem};
use thiserror::Error;

/// Failures talking to the backing store.
///
/// All of these collapse to a single outcome at the HTTP boundary; the
/// variants exist for logging.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store operation cancelled")]
    Cancelled,
}

/// Errors that can occur in the KV service
#[derive(Error, Debug)]
pub enum KvError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<KvError> for Problem {
    fn from(error: KvError) -> Self {
        match error {
            KvError::Validation(msg) => problemdetails::new(StatusCode::BAD_REQUEST)
                .with_title("Invalid Request")
                .with_detail(msg),

            KvError::KeyNotFound(key) => problemdetails::new(StatusCode::NOT_FOUND)
                .with_title("Key Not Found")
                .with_detail(format!("Key '{}' does not exist", key)),

            KvError::Store(e) => problemdetails::new(StatusCode::INTERNAL_SERVER_ERROR)
                .with_title("Store Error")
                .with_detail(e.to_string()),
        }
    }
}
