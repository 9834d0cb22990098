// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Composite test keys and their normalization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Field value matching anything, on either side of a comparison.
pub const WILDCARD: &str = "*";

/// Width numeric tokens are zero-padded to.
pub const NUMERIC_WIDTH: usize = 9;

/// Normalize one key token: integers are zero-padded to [`NUMERIC_WIDTH`]
/// digits so lexical order equals numeric order, anything else is kept.
pub fn normalize_token(token: &str) -> String {
    let token = token.trim();
    match token.parse::<i64>() {
        Ok(n) => format!("{:0width$}", n, width = NUMERIC_WIDTH),
        Err(_) => token.to_string(),
    }
}

/// Inverse of [`normalize_token`] for writing keys back out.
fn display_token(token: &str) -> String {
    match token.parse::<i64>() {
        Ok(n) => n.to_string(),
        Err(_) => token.to_string(),
    }
}

/// Ordered tuple `(medium, filesystem, benchmark, cores, io mode)`, or a
/// prefix of it. Used both as a concrete record identifier and, when some
/// fields are [`WILDCARD`], as a query pattern.
///
/// Fields are always stored normalized; the derived `Ord` is therefore the
/// sort order of search results.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TestKey {
    fields: Vec<String>,
}

impl TestKey {
    /// Build a key from raw tokens, normalizing each.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|f| normalize_token(f.as_ref()))
                .collect(),
        }
    }

    /// Parse the colon-separated form used in key lines and filters.
    pub fn parse(text: &str) -> Self {
        Self::new(text.split(':'))
    }

    /// Pattern matching every key.
    pub fn any(arity: usize) -> Self {
        Self::new(std::iter::repeat(WILDCARD).take(arity))
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when no field is a wildcard.
    pub fn is_concrete(&self) -> bool {
        self.fields.iter().all(|f| f != WILDCARD)
    }

    /// Field-wise match. A wildcard on either side matches anything; fields
    /// beyond the shorter key are not compared, so a four-field pattern
    /// selects five-field keys by prefix.
    pub fn matches(&self, other: &TestKey) -> bool {
        self.fields
            .iter()
            .zip(other.fields.iter())
            .all(|(a, b)| a == WILDCARD || b == WILDCARD || a == b)
    }
}

impl fmt::Display for TestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: Vec<String> = self.fields.iter().map(|t| display_token(t)).collect();
        f.write_str(&shown.join(":"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pads_integers() {
        assert_eq!(normalize_token("4"), "000000004");
        assert_eq!(normalize_token("80"), "000000080");
        assert_eq!(normalize_token("ext4"), "ext4");
        assert_eq!(normalize_token("*"), "*");
    }

    #[test]
    fn test_normalize_preserves_numeric_order() {
        let values = [0i64, 1, 2, 9, 10, 11, 99, 100, 12345, 999_999_999];
        for pair in values.windows(2) {
            let a = normalize_token(&pair[0].to_string());
            let b = normalize_token(&pair[1].to_string());
            assert!(a < b, "{a} should sort before {b}");
        }
    }

    #[test]
    fn test_match_wildcards_either_side() {
        let pattern = TestKey::new(["mem", "*", "DWAL", "*"]);
        let key = TestKey::new(["mem", "ext4", "DWAL", "4"]);
        assert!(pattern.matches(&key));
        assert!(key.matches(&pattern));

        let other = TestKey::new(["mem", "ext4", "DWOL", "4"]);
        assert!(!pattern.matches(&other));
    }

    #[test]
    fn test_match_equal_arity_property() {
        let keys = [
            TestKey::new(["mem", "ext4", "DWAL", "4", "directio"]),
            TestKey::new(["ssd", "xfs", "MRPL", "16", "bufferedio"]),
        ];
        let patterns = [
            TestKey::new(["*", "*", "*", "*", "*"]),
            TestKey::new(["mem", "*", "*", "04", "*"]),
            TestKey::new(["ssd", "xfs", "*", "16", "directio"]),
        ];
        for p in &patterns {
            for k in &keys {
                let expected = p
                    .fields()
                    .iter()
                    .zip(k.fields())
                    .all(|(pf, kf)| pf == WILDCARD || pf == kf);
                assert_eq!(p.matches(k), expected, "{p} vs {k}");
            }
        }
    }

    #[test]
    fn test_shorter_pattern_matches_by_prefix() {
        let pattern = TestKey::parse("mem:ext4:DWAL:*");
        let key = TestKey::parse("mem:ext4:DWAL:8:bufferedio");
        assert!(pattern.matches(&key));
    }

    #[test]
    fn test_display_strips_padding() {
        let key = TestKey::parse("mem:ext4:DWAL:4");
        assert_eq!(key.fields()[3], "000000004");
        assert_eq!(key.to_string(), "mem:ext4:DWAL:4");
        assert!(key.is_concrete());
        assert!(!TestKey::any(5).is_concrete());
    }
}
