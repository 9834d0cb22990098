// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Text reports over a parsed run log.

use std::fmt;

use crate::error::QueryError;
use crate::store::{QueryEngine, TestKey};

/// Throughput of one core count relative to the first (smallest) one.
#[derive(Debug, Clone, PartialEq)]
pub struct RelativePerformance {
    pub ncpu: String,
    pub ratio: f64,
}

impl fmt::Display for RelativePerformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.ncpu, self.ratio)
    }
}

/// `works/sec` of every `(medium, fs, bench, *)` record divided by that of
/// the first match.
pub fn relative_performance(
    engine: &QueryEngine<'_>,
    medium: &str,
    fs: &str,
    bench: &str,
) -> Result<Vec<RelativePerformance>, QueryError> {
    let pattern = TestKey::new([medium, fs, bench, "*"]);
    let base = engine.first(&pattern)?.number("works/sec")?;

    engine
        .search(&pattern)
        .iter()
        .map(|m| {
            Ok(RelativePerformance {
                ncpu: m.field("ncpu")?.to_string(),
                ratio: m.number("works/sec")? / base,
            })
        })
        .collect()
}

/// CPU time split of one record, in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeBreakdown {
    pub user: String,
    pub sys: String,
    pub idle: String,
    pub iowait: String,
    /// `(fs-sys, sync-sys)` when a sync share of sys time was given.
    pub sys_split: Option<(f64, f64)>,
}

impl fmt::Display for TimeBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sys_split {
            None => write!(
                f,
                "user: {}\nsys:  {}\nidle: {}\nio:   {}\n",
                self.user, self.sys, self.idle, self.iowait
            ),
            Some((fs_sys, sync_sys)) => write!(
                f,
                "user:    {}\nfs-sys:  {:?}\nsync-sys:{:?}\nidle:    {}\nio:      {}\n",
                self.user, fs_sys, sync_sys, self.idle, self.iowait
            ),
        }
    }
}

/// Time breakdown of every `(medium, fs, bench, core)` record.
/// `sync_percent` is the share of sys time spent in sync; zero keeps sys
/// whole.
pub fn time_breakdown(
    engine: &QueryEngine<'_>,
    medium: &str,
    fs: &str,
    bench: &str,
    core: &str,
    sync_percent: f64,
) -> Result<Vec<TimeBreakdown>, QueryError> {
    let pattern = TestKey::new([medium, fs, bench, core]);
    let matches = engine.search(&pattern);
    if matches.is_empty() {
        return Err(QueryError::NoMatch {
            pattern: pattern.to_string(),
        });
    }

    matches
        .iter()
        .map(|m| {
            let sys_split = if sync_percent == 0.0 {
                None
            } else {
                let sys = m.number("sys.sec")?;
                let sync = sync_percent * sys / 100.0;
                Some((sys - sync, sync))
            };

            Ok(TimeBreakdown {
                user: m.field("user.sec")?.to_string(),
                sys: m.field("sys.sec")?.to_string(),
                idle: m.field("idle.sec")?.to_string(),
                iowait: m.field("iowait.sec")?.to_string(),
                sys_split,
            })
        })
        .collect()
}
