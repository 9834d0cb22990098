// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CPU topology and the core counts a run sweeps over.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FxError, FxResult, HardValidationError};

/// Kernel list of online CPUs, e.g. `0-3,8-11`.
pub const ONLINE_CPUS_PATH: &str = "/sys/devices/system/cpu/online";

/// Parse a CPU list string like "0-3,8-11" into CPU indices.
///
/// The empty string is the empty list; anything else that is not a
/// comma-separated list of indices and inclusive ranges is rejected.
pub fn parse_cpu_list(s: &str) -> Result<Vec<usize>, HardValidationError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Vec::new());
    }

    let invalid = || HardValidationError::InvalidFieldValue {
        field: "cpu_list",
        value: s.to_string(),
        reason: "Expected comma-separated CPU indices or ranges".to_string(),
    };

    let mut cpus = Vec::new();
    for part in s.split(',') {
        let part = part.trim();
        match part.split_once('-') {
            Some((start, end)) => {
                let start: usize = start.trim().parse().map_err(|_| invalid())?;
                let end: usize = end.trim().parse().map_err(|_| invalid())?;
                if end < start {
                    return Err(invalid());
                }
                cpus.extend(start..=end);
            }
            None => cpus.push(part.parse().map_err(|_| invalid())?),
        }
    }
    Ok(cpus)
}

/// Core-count granularity of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreGrain {
    /// 1, 2, 4, then every 4 cores.
    Fine,
    /// Powers of two, plus the full machine.
    #[default]
    Coarse,
}

/// `1, 2, 4, 8, 12, ...` up to `max`, always ending with `max`.
pub fn fine_grain_counts(max: usize) -> Vec<usize> {
    let mut counts: Vec<usize> = [1, 2, 4]
        .into_iter()
        .chain((8..=max).step_by(4))
        .filter(|&n| n <= max)
        .collect();
    if max > 0 && counts.last() != Some(&max) {
        counts.push(max);
    }
    counts
}

/// `1, 2, 4, 8, ...` up to `max`, always ending with `max`.
pub fn coarse_grain_counts(max: usize) -> Vec<usize> {
    let mut counts: Vec<usize> = std::iter::successors(Some(1usize), |n| n.checked_mul(2))
        .take_while(|&n| n <= max)
        .collect();
    if max > 0 && counts.last() != Some(&max) {
        counts.push(max);
    }
    counts
}

/// Which CPUs `set-cpus` leaves online.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpuSelection {
    All,
    /// The first entries of the core sequence.
    Cores(Vec<usize>),
}

impl fmt::Display for CpuSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Cores(cores) => {
                let list: Vec<String> = cores.iter().map(usize::to_string).collect();
                f.write_str(&list.join(","))
            }
        }
    }
}

/// Machine shape used to pick core counts and CPU sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTopology {
    pub physical_chips: usize,
    pub cores_per_chip: usize,
    pub smt_level: usize,
    /// Order in which CPUs are brought online as the core count grows.
    pub core_sequence: Vec<usize>,
    pub fine_grain: Vec<usize>,
    pub coarse_grain: Vec<usize>,
}

impl CpuTopology {
    /// Single chip without SMT, one core per listed CPU.
    pub fn from_online(online: &[usize]) -> Self {
        let ncpu = online.len();
        Self {
            physical_chips: 1,
            cores_per_chip: ncpu,
            smt_level: 1,
            core_sequence: online.to_vec(),
            fine_grain: fine_grain_counts(ncpu),
            coarse_grain: coarse_grain_counts(ncpu),
        }
    }

    /// Detect from the kernel's list of online CPUs.
    pub fn detect() -> FxResult<Self> {
        Self::detect_from(Path::new(ONLINE_CPUS_PATH))
    }

    pub fn detect_from(path: &Path) -> FxResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| FxError::Io {
            context: "reading online CPU list",
            source: e,
        })?;

        let online = parse_cpu_list(&text)?;
        if online.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "cpu_list",
                value: text.trim().to_string(),
                reason: "No online CPUs".to_string(),
            }
            .into());
        }

        let topology = Self::from_online(&online);
        tracing::debug!(
            cores = topology.physical_cores(),
            path = %path.display(),
            "Detected CPU topology"
        );
        Ok(topology)
    }

    pub fn physical_cores(&self) -> usize {
        self.physical_chips * self.cores_per_chip
    }

    pub fn hw_threads(&self) -> usize {
        self.physical_cores() * self.smt_level
    }

    /// Core counts tested at `grain`, cut at the number of physical cores.
    pub fn core_counts(&self, grain: CoreGrain) -> Vec<usize> {
        let counts = match grain {
            CoreGrain::Fine => &self.fine_grain,
            CoreGrain::Coarse => &self.coarse_grain,
        };
        let max = self.physical_cores();
        counts.iter().copied().take_while(|&n| n <= max).collect()
    }

    /// CPU set for `ncore` active cores; zero means every CPU.
    pub fn selection(&self, ncore: usize) -> CpuSelection {
        if ncore == 0 {
            return CpuSelection::All;
        }
        let n = ncore.min(self.core_sequence.len());
        CpuSelection::Cores(self.core_sequence[..n].to_vec())
    }

    /// Internal consistency, checked when a topology comes from config.
    pub fn validate(&self) -> Result<(), HardValidationError> {
        let positive = [
            ("physical_chips", self.physical_chips),
            ("cores_per_chip", self.cores_per_chip),
            ("smt_level", self.smt_level),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(HardValidationError::InvalidFieldValue {
                    field,
                    value: "0".to_string(),
                    reason: "Must be greater than 0".to_string(),
                });
            }
        }

        if self.core_sequence.len() < self.hw_threads() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "core_sequence",
                value: self.core_sequence.len().to_string(),
                reason: format!("Must list every hardware thread ({})", self.hw_threads()),
            });
        }

        let grains = [
            ("fine_grain", &self.fine_grain),
            ("coarse_grain", &self.coarse_grain),
        ];
        for (field, counts) in grains {
            if counts.is_empty() || counts.contains(&0) {
                return Err(HardValidationError::InvalidFieldValue {
                    field,
                    value: format!("{:?}", counts),
                    reason: "Must be a non-empty list of positive core counts".to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0-3").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(parse_cpu_list("0,2,4").unwrap(), vec![0, 2, 4]);
        assert_eq!(
            parse_cpu_list("0,2-4,7,10-12\n").unwrap(),
            vec![0, 2, 3, 4, 7, 10, 11, 12]
        );
        assert_eq!(parse_cpu_list("").unwrap(), Vec::<usize>::new());
        assert!(parse_cpu_list("0-x").is_err());
        assert!(parse_cpu_list("4-2").is_err());
    }

    #[test]
    fn test_grain_counts() {
        assert_eq!(fine_grain_counts(1), vec![1]);
        assert_eq!(fine_grain_counts(16), vec![1, 2, 4, 8, 12, 16]);
        assert_eq!(fine_grain_counts(10), vec![1, 2, 4, 8, 10]);
        assert_eq!(coarse_grain_counts(16), vec![1, 2, 4, 8, 16]);
        assert_eq!(coarse_grain_counts(6), vec![1, 2, 4, 6]);
        assert!(coarse_grain_counts(0).is_empty());
    }

    #[test]
    fn test_core_counts_capped_at_physical_cores() {
        let mut topo = CpuTopology::from_online(&[0, 1, 2, 3]);
        topo.coarse_grain = vec![1, 2, 4, 8];
        assert_eq!(topo.core_counts(CoreGrain::Coarse), vec![1, 2, 4]);
    }

    #[test]
    fn test_selection() {
        let mut topo = CpuTopology::from_online(&[0, 1, 2, 3]);
        topo.core_sequence = vec![0, 2, 1, 3];
        assert_eq!(topo.selection(0), CpuSelection::All);
        assert_eq!(topo.selection(2).to_string(), "0,2");
        assert_eq!(topo.selection(9).to_string(), "0,2,1,3");
    }

    #[test]
    fn test_detect_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0-7").unwrap();

        let topo = CpuTopology::detect_from(file.path()).unwrap();
        assert_eq!(topo.physical_cores(), 8);
        assert_eq!(topo.hw_threads(), 8);
        assert!(topo.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_sequence() {
        let mut topo = CpuTopology::from_online(&[0, 1]);
        topo.smt_level = 2;
        assert!(topo.validate().is_err());
    }
}
