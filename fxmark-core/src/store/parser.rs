// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Run log parser.
//!
//! ```text
//! ### KEY = VALUE          run configuration
//! ## media:fs:bench:ncore  current key
//! # field1 field2 ...      current schema
//! v1 v2 ...                data, zipped against the current schema
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::error::{FxError, FxResult, ParseError};
use crate::store::{MeasurementRecord, TestKey};

/// Classification of one non-empty log line by its leading token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Config,
    Key,
    Schema,
    Data,
}

impl LineKind {
    pub fn classify(line: &str) -> Self {
        match line.split_whitespace().next() {
            Some("###") => Self::Config,
            Some("##") => Self::Key,
            Some("#") => Self::Schema,
            _ => Self::Data,
        }
    }
}

/// Measurements and run configuration parsed from one or more run logs.
///
/// A test key maps to at most one record. Data lines for a key seen again
/// later merge into the existing record field by field.
#[derive(Debug, Default)]
pub struct MeasurementStore {
    config: BTreeMap<String, String>,
    data: BTreeMap<TestKey, MeasurementRecord>,
    current_key: Option<TestKey>,
    schema: Option<Vec<String>>,
}

impl MeasurementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a run log file.
    pub fn load_file(path: impl AsRef<Path>) -> FxResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| FxError::Io {
            context: "reading run log",
            source: e,
        })?;

        let mut store = Self::new();
        store.parse(&text)?;
        Ok(store)
    }

    /// Parse log text, mutating the store incrementally.
    ///
    /// The current key and schema persist across calls, so a log may be fed
    /// in chunks. Lines that fit none of the four classes are rejected with
    /// their 1-based line number; data parsed before the error is kept.
    pub fn parse(&mut self, text: &str) -> Result<(), ParseError> {
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let line_no = index + 1;
            match LineKind::classify(line) {
                LineKind::Config => self.parse_config(line_no, line)?,
                LineKind::Key => self.parse_key(line_no, line)?,
                LineKind::Schema => self.parse_schema(line),
                LineKind::Data => self.parse_data(line_no, line)?,
            }
        }
        Ok(())
    }

    fn parse_config(&mut self, line_no: usize, line: &str) -> Result<(), ParseError> {
        let (key, value) = line
            .split_once(char::is_whitespace)
            .and_then(|(_, rest)| rest.split_once('='))
            .ok_or_else(|| ParseError::MalformedConfig {
                line_no,
                line: line.to_string(),
            })?;

        self.config
            .insert(key.trim().to_string(), value.trim().to_string());
        Ok(())
    }

    fn parse_key(&mut self, line_no: usize, line: &str) -> Result<(), ParseError> {
        let rest = line
            .split_once(char::is_whitespace)
            .map(|(_, rest)| rest.trim())
            .unwrap_or_default();

        if rest.is_empty() {
            return Err(ParseError::MalformedKey {
                line_no,
                line: line.to_string(),
            });
        }

        self.current_key = Some(TestKey::parse(rest));
        Ok(())
    }

    fn parse_schema(&mut self, line: &str) {
        self.schema = Some(line.split_whitespace().skip(1).map(String::from).collect());
    }

    fn parse_data(&mut self, line_no: usize, line: &str) -> Result<(), ParseError> {
        let (key, schema) = match (&self.current_key, &self.schema) {
            (Some(key), Some(schema)) => (key, schema),
            _ => {
                return Err(ParseError::DataBeforeHeader {
                    line_no,
                    line: line.to_string(),
                })
            }
        };

        let values: Vec<&str> = line.split_whitespace().collect();
        if values.len() != schema.len() {
            return Err(ParseError::ArityMismatch {
                line_no,
                expected: schema.len(),
                found: values.len(),
            });
        }

        let record = self.data.entry(key.clone()).or_default();
        for (field, value) in schema.iter().zip(values) {
            record.insert(field.as_str(), value);
        }
        Ok(())
    }

    /// Value of one run configuration entry, e.g. `DURATION`.
    pub fn config(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    pub fn run_config(&self) -> &BTreeMap<String, String> {
        &self.config
    }

    pub fn get(&self, key: &TestKey) -> Option<&MeasurementRecord> {
        self.data.get(key)
    }

    /// All records in ascending key order.
    pub fn records(&self) -> impl Iterator<Item = (&TestKey, &MeasurementRecord)> {
        self.data.iter()
    }

    /// Insert or merge a record directly, bypassing the text format.
    pub fn insert(&mut self, key: TestKey, record: MeasurementRecord) {
        let entry = self.data.entry(key).or_default();
        for (field, value) in record.iter() {
            entry.insert(field, value);
        }
    }

    pub fn set_config(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Render the store back into run log text. Parsing the output yields
    /// the same configuration and the same set of (key, record) pairs.
    pub fn serialize(&self) -> String {
        let mut out = String::new();

        for (key, value) in &self.config {
            let _ = writeln!(out, "### {} = {}", key, value);
        }

        for (key, record) in &self.data {
            let (fields, values): (Vec<&str>, Vec<&str>) = record.iter().unzip();
            let _ = writeln!(out, "## {}", key);
            let _ = writeln!(out, "# {}", fields.join(" "));
            let _ = writeln!(out, "{}", values.join(" "));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
### DURATION = 30s
## mem:ext4:DWAL:4
# ncpu secs works works/sec
4 30 100 3.33
";

    #[test]
    fn test_classify_lines() {
        assert_eq!(LineKind::classify("### A = b"), LineKind::Config);
        assert_eq!(LineKind::classify("## mem:ext4"), LineKind::Key);
        assert_eq!(LineKind::classify("# a b"), LineKind::Schema);
        assert_eq!(LineKind::classify("1 2 3"), LineKind::Data);
        assert_eq!(LineKind::classify("#@ raw"), LineKind::Data);
    }

    #[test]
    fn test_parse_sample() {
        let mut store = MeasurementStore::new();
        store.parse(SAMPLE).unwrap();

        assert_eq!(store.config("DURATION"), Some("30s"));
        assert_eq!(store.len(), 1);

        let record = store.get(&TestKey::parse("mem:ext4:DWAL:4")).unwrap();
        assert_eq!(record.get("works/sec"), Some("3.33"));
        assert_eq!(record.get("ncpu"), Some("4"));
    }

    #[test]
    fn test_config_value_keeps_later_equals() {
        let mut store = MeasurementStore::new();
        store
            .parse("### SYSTEM         = Linux host 6.1 #1 SMP a=b\n")
            .unwrap();
        assert_eq!(store.config("SYSTEM"), Some("Linux host 6.1 #1 SMP a=b"));
    }

    #[test]
    fn test_schema_change_merges_fields() {
        let text = "\
## mem:ext4:DWAL:4
# ncpu secs
4 30
# works
100
";
        let mut store = MeasurementStore::new();
        store.parse(text).unwrap();
        let record = store.get(&TestKey::parse("mem:ext4:DWAL:4")).unwrap();
        assert_eq!(record.len(), 3);
        assert_eq!(record.get("works"), Some("100"));
    }

    #[test]
    fn test_data_before_header_rejected() {
        let mut store = MeasurementStore::new();
        let err = store.parse("# ncpu\n4\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::DataBeforeHeader {
                line_no: 2,
                line: "4".to_string()
            }
        );
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let mut store = MeasurementStore::new();
        let err = store
            .parse("## mem:ext4:DWAL:4\n# ncpu secs works\n4 30\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ParseError::ArityMismatch {
                line_no: 3,
                expected: 3,
                found: 2
            }
        ));
    }

    #[test]
    fn test_malformed_config_and_key_rejected() {
        let mut store = MeasurementStore::new();
        assert!(matches!(
            store.parse("### NO_EQUALS_HERE\n"),
            Err(ParseError::MalformedConfig { .. })
        ));
        assert!(matches!(
            store.parse("##\n"),
            Err(ParseError::MalformedKey { .. })
        ));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let text = "\
### DURATION = 30s
### MEDIA_TYPES = mem,ssd
## mem:ext4:DWAL:4:bufferedio
# ncpu secs works works/sec
4 30 100 3.33
## mem:ext4:DWAL:16:bufferedio
# ncpu works/sec sys.sec
16 9.5 12.25
";
        let mut original = MeasurementStore::new();
        original.parse(text).unwrap();

        let mut reparsed = MeasurementStore::new();
        reparsed.parse(&original.serialize()).unwrap();

        assert_eq!(original.run_config(), reparsed.run_config());
        let a: Vec<_> = original.records().collect();
        let b: Vec<_> = reparsed.records().collect();
        assert_eq!(a, b);
    }
}
