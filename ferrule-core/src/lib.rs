//! Ferrule Core
//!
//! Core types and the cross-job resolution protocol for the Ferrule job runner.
//!
//! This crate contains:
//! - Domain types: job definitions, run state, status records, log entries
//! - Placeholder resolution against the results of earlier jobs
//! - The result store (batch-scoped memory plus on-disk documents)
//! - Job-kind shortcuts and parameter-bag helpers
//!
//! Execution itself (executors, lifecycle driver, batch runner) lives in the runner.

pub mod domain;
pub mod error;
pub mod ids;
pub mod loader;
pub mod params;
pub mod placeholder;
pub mod shortcuts;
pub mod store;

pub use error::{CoreError, Result};
