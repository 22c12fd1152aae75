//! Shared configuration model and constants for the kvbench harness.
//!
//! This crate holds the benchmark configuration (`BenchConfig`), the
//! scenario/workload taxonomy, and the defaults both binaries agree on.
//! The configuration is created and persisted by the controller
//! (`benchctl`), shipped to the runner as raw JSON over the control
//! stream, and treated as read-only for the rest of the run.

#![deny(unsafe_code)]

pub mod config;
pub mod constants;

pub use config::{BenchConfig, ConfigError, RunPhase, Scenario, WorkloadType};
