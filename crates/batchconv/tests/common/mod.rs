//! Shared utilities for batchconv integration tests.
//!
//! - `TestHarness` owns a temp archive directory and a coordinator
//! - builders produce PNG/PDF/DOCX fixtures in memory and scripted converters

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
