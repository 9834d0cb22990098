// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Structured measurement store built from the line-oriented run log.
//!
//! The run log mixes four line classes: `###` run configuration, `##` test
//! key, `#` schema and plain data lines. Parsing folds them into a map from
//! normalized [`TestKey`] to [`MeasurementRecord`], which [`QueryEngine`]
//! searches with wildcard patterns.

mod key;
mod parser;
mod query;
mod record;

pub use key::{normalize_token, TestKey, NUMERIC_WIDTH, WILDCARD};
pub use parser::{LineKind, MeasurementStore};
pub use query::{Measurement, QueryEngine};
pub use record::MeasurementRecord;
