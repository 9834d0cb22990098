// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! fxmark Core Library
//!
//! Orchestration core for filesystem scalability benchmarks. Provides the
//! test matrix, the mount/format lifecycle with compensating cleanup, the
//! profiling brackets and the measurement store that reports query.

pub mod config;
pub mod cpu;
pub mod dbench;
pub mod driver;
pub mod error;
pub mod lifecycle;
pub mod matrix;
pub mod media;
pub mod mount;
pub mod perfmon;
pub mod profiler;
pub mod report;
pub mod runlog;
pub mod runner;
pub mod signal;
pub mod store;
pub mod types;
pub mod workload;

// Re-export commonly used types
pub use config::{Config, ConfigLoader};
pub use driver::{CommandSpec, OutputMode, ResourceDriver, SystemDriver};
#[cfg(any(test, feature = "testing"))]
pub use driver::RecordingDriver;
pub use error::{FxError, FxResult, HardValidationError};
pub use lifecycle::{LifecyclePhase, ResourceLifecycleManager};
pub use matrix::{ConfigMatrix, RunTask};
pub use runner::{RunSummary, Runner};
pub use store::{MeasurementRecord, MeasurementStore, QueryEngine, TestKey};
pub use types::{Benchmark, FsKind, IoMode, Medium};
