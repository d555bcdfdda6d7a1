//! HTTP front end for batchconv.
//!
//! Exposes config, state, error handling and the router so the binary and
//! the integration tests build the same application.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
