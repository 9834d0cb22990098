// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for the benchmark runner.
//!
//! Every concern gets its own explicit enum; `FxError` ties them together.
//! No `Box<dyn Error>`, no `anyhow::Result` in the library.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the orchestration core.
#[derive(Debug, Error)]
pub enum FxError {
    // =========================================================================
    // Configuration Errors - Fail-Fast Before Touching Any Resource
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(#[from] StateTransitionError),

    #[error("Command driver error: {0}")]
    Driver(#[from] DriverError),

    // =========================================================================
    // Resource Acquisition Errors - Local To One Task
    // =========================================================================
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Mount error: {0}")]
    Mount(#[from] MountError),

    // =========================================================================
    // Measurement Log Errors
    // =========================================================================
    #[error("Log parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Workload output without a result: {message}")]
    WorkloadOutput { message: String },

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("System call failed: {syscall} - {message}")]
    Syscall {
        syscall: &'static str,
        message: String,
    },
}

/// Configuration errors that stop the run before any resource is touched.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unsupported filesystem: {name}")]
    UnsupportedFilesystem { name: String },

    #[error("Unsupported storage medium: {name}")]
    UnsupportedMedium { name: String },

    #[error("Unsupported I/O mode: {name}")]
    UnsupportedIoMode { name: String },

    #[error("Invalid filter '{pattern}': {reason}")]
    InvalidFilter { pattern: String, reason: String },

    #[error("Schema validation failed: {message}")]
    SchemaValidation { message: String },
}

/// State transition errors for the resource lifecycle.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Failures to launch an external command at all.
///
/// A command that runs and exits non-zero is not a driver error; the exit
/// status is reported back to the caller.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Failed to spawn '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("Failed to collect output of '{command}': {reason}")]
    OutputFailed { command: String, reason: String },
}

/// Storage medium initialization errors.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Device {path} does not exist")]
    DeviceMissing { path: PathBuf },

    #[error("Medium step '{step}' failed with status {status}: {command}")]
    StepFailed {
        step: &'static str,
        command: String,
        status: i32,
    },

    #[error("Driver failure during medium setup: {0}")]
    Driver(#[from] DriverError),
}

/// Format/mount errors. Any one of these skips the current task only.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("{0}")]
    Media(#[from] MediaError),

    #[error("Mount step '{step}' failed with status {status}: {command}")]
    StepFailed {
        step: &'static str,
        command: String,
        status: i32,
    },

    #[error("Driver failure during mount: {0}")]
    Driver(#[from] DriverError),
}

/// Run log lines that do not fit the line grammar.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line_no}: config line without '=': {line}")]
    MalformedConfig { line_no: usize, line: String },

    #[error("line {line_no}: key line without fields: {line}")]
    MalformedKey { line_no: usize, line: String },

    #[error("line {line_no}: data line before any key and schema line: {line}")]
    DataBeforeHeader { line_no: usize, line: String },

    #[error("line {line_no}: schema declares {expected} fields but data line has {found}")]
    ArityMismatch {
        line_no: usize,
        expected: usize,
        found: usize,
    },
}

/// Errors raised by report consumers interpreting stored records.
#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("No record matches {pattern}")]
    NoMatch { pattern: String },

    #[error("Record {key} has no field '{field}'")]
    MissingField { key: String, field: String },

    #[error("Record {key} field '{field}' is not numeric: {value}")]
    NotNumeric {
        key: String,
        field: String,
        value: String,
    },
}

/// Result type alias using FxError.
pub type FxResult<T> = Result<T, FxError>;
