//! HTTP handlers for KV operations

mod handler;
mod types;

pub use handler::*;
pub use types::*;
