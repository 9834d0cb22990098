// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Wildcard lookup over a parsed [`MeasurementStore`].

use crate::error::QueryError;
use crate::store::{MeasurementRecord, MeasurementStore, TestKey};

/// One search hit: a stored key and its record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement<'s> {
    pub key: &'s TestKey,
    pub record: &'s MeasurementRecord,
}

impl<'s> Measurement<'s> {
    /// Raw string value of a field.
    pub fn field(&self, field: &str) -> Result<&'s str, QueryError> {
        self.record
            .get(field)
            .ok_or_else(|| QueryError::MissingField {
                key: self.key.to_string(),
                field: field.to_string(),
            })
    }

    /// Field value interpreted as a number.
    pub fn number(&self, field: &str) -> Result<f64, QueryError> {
        let value = self.field(field)?;
        value.parse::<f64>().map_err(|_| QueryError::NotNumeric {
            key: self.key.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

/// Read-only query view of a store.
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'s> {
    store: &'s MeasurementStore,
}

impl<'s> QueryEngine<'s> {
    pub fn new(store: &'s MeasurementStore) -> Self {
        Self { store }
    }

    /// All entries whose key matches `pattern`, ascending by normalized key.
    ///
    /// The store is a `BTreeMap`, so iteration order already is the result
    /// order.
    pub fn search(&self, pattern: &TestKey) -> Vec<Measurement<'s>> {
        self.store
            .records()
            .filter(|(key, _)| pattern.matches(key))
            .map(|(key, record)| Measurement { key, record })
            .collect()
    }

    /// Search by raw pattern fields, e.g. `["mem", "ext4", "DWAL", "*"]`.
    pub fn search_fields<I, S>(&self, fields: I) -> Vec<Measurement<'s>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.search(&TestKey::new(fields))
    }

    /// First match or [`QueryError::NoMatch`].
    pub fn first(&self, pattern: &TestKey) -> Result<Measurement<'s>, QueryError> {
        self.search(pattern)
            .into_iter()
            .next()
            .ok_or_else(|| QueryError::NoMatch {
                pattern: pattern.to_string(),
            })
    }

    /// Run configuration entry of the underlying store.
    pub fn config(&self, key: &str) -> Option<&'s str> {
        self.store.config(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(text: &str) -> MeasurementStore {
        let mut store = MeasurementStore::new();
        store.parse(text).unwrap();
        store
    }

    #[test]
    fn test_search_sample_record() {
        let store = store(
            "### DURATION = 30s\n## mem:ext4:DWAL:4\n# ncpu secs works works/sec\n4 30 100 3.33\n",
        );
        let engine = QueryEngine::new(&store);

        let hits = engine.search_fields(["mem", "ext4", "DWAL", "*"]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.get("works/sec"), Some("3.33"));
        assert_eq!(hits[0].number("works/sec").unwrap(), 3.33);
        assert_eq!(engine.config("DURATION"), Some("30s"));
    }

    #[test]
    fn test_search_sorted_numerically() {
        let store = store(
            "\
## mem:ext4:DWAL:16
# ncpu
16
## mem:ext4:DWAL:2
# ncpu
2
## mem:ext4:DWAL:4
# ncpu
4
## mem:xfs:DWAL:8
# ncpu
8
",
        );
        let engine = QueryEngine::new(&store);

        let ncpu: Vec<&str> = engine
            .search_fields(["mem", "ext4", "DWAL", "*"])
            .iter()
            .map(|m| m.record.get("ncpu").unwrap())
            .collect();
        assert_eq!(ncpu, vec!["2", "4", "16"]);
    }

    #[test]
    fn test_four_field_pattern_matches_five_field_keys() {
        let store = store(
            "## mem:ext4:DWAL:4:bufferedio\n# ncpu\n4\n## mem:ext4:DWAL:4:directio\n# ncpu\n4\n",
        );
        let engine = QueryEngine::new(&store);
        assert_eq!(engine.search_fields(["mem", "ext4", "DWAL", "4"]).len(), 2);
        assert_eq!(
            engine
                .search_fields(["mem", "ext4", "DWAL", "4", "directio"])
                .len(),
            1
        );
    }

    #[test]
    fn test_query_errors() {
        let store = store("## mem:ext4:DWAL:4\n# ncpu works/sec\n4 n/a\n");
        let engine = QueryEngine::new(&store);

        let hit = engine.first(&TestKey::parse("mem:ext4:DWAL:*")).unwrap();
        assert!(matches!(
            hit.number("sys.sec"),
            Err(QueryError::MissingField { .. })
        ));
        assert!(matches!(
            hit.number("works/sec"),
            Err(QueryError::NotNumeric { .. })
        ));
        assert!(matches!(
            engine.first(&TestKey::parse("ssd:*:*:*")),
            Err(QueryError::NoMatch { .. })
        ));
    }
}
