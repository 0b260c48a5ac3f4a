//! Core domain types
//!
//! These types describe what a job is (its definition), where it stands while
//! it runs (run state and status record), and how it reports progress (log
//! entries and sinks). They are shared by the resolver and the runner.

pub mod job;
pub mod log;
pub mod run;
