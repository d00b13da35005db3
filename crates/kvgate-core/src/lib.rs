//! kvgate-core: shared building blocks for the kvgate crates
//!
//! Currently this is the RFC 7807 problem-details response type that every
//! HTTP handler returns on failure.

pub mod problemdetails;

pub use problemdetails::{Problem, ProblemDetails};
