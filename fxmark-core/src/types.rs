// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Closed enums and newtypes for the benchmark matrix dimensions.
//!
//! Names coming from configuration are parsed once into these types, so an
//! unsupported filesystem or medium is rejected before anything runs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Suffix marking benchmarks that run one background worker.
pub const BACKGROUND_SUFFIX: &str = "_bg";

/// Storage medium a filesystem is created on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Medium {
    /// Loop device backed by a file on tmpfs.
    Mem,
    Nvme,
    Ssd,
    Hdd,
}

impl Medium {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mem => "mem",
            Self::Nvme => "nvme",
            Self::Ssd => "ssd",
            Self::Hdd => "hdd",
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Mem)
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Medium {
    type Err = HardValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mem" => Ok(Self::Mem),
            "nvme" => Ok(Self::Nvme),
            "ssd" => Ok(Self::Ssd),
            "hdd" => Ok(Self::Hdd),
            other => Err(HardValidationError::UnsupportedMedium {
                name: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Medium {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Medium> for String {
    fn from(medium: Medium) -> Self {
        medium.name().to_string()
    }
}

/// Filesystem under test. Each variant has exactly one mount strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FsKind {
    Tmpfs,
    Ext2,
    Ext3,
    Ext4,
    /// ext4 formatted normally, then stripped of its journal with tune2fs.
    Ext4NoJournal,
    Xfs,
    Btrfs,
    F2fs,
    Jfs,
    Reiserfs,
}

impl FsKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Tmpfs => "tmpfs",
            Self::Ext2 => "ext2",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::Ext4NoJournal => "ext4_no_jnl",
            Self::Xfs => "xfs",
            Self::Btrfs => "btrfs",
            Self::F2fs => "f2fs",
            Self::Jfs => "jfs",
            Self::Reiserfs => "reiserfs",
        }
    }

    /// Filesystem type as understood by `mkfs.<type>` and `mount -t`.
    pub const fn fs_type(&self) -> &'static str {
        match self {
            Self::Ext4NoJournal => "ext4",
            other => other.name(),
        }
    }

    /// Flag forcing mkfs to overwrite an existing filesystem.
    pub const fn mkfs_flags(&self) -> Option<&'static str> {
        match self {
            Self::Ext2 | Self::Ext3 | Self::Ext4 | Self::Ext4NoJournal => Some("-F"),
            Self::Xfs | Self::Btrfs => Some("-f"),
            Self::Jfs | Self::Reiserfs => Some("-q"),
            Self::Tmpfs | Self::F2fs => None,
        }
    }

    /// Filesystems that live in memory and need no block device.
    pub fn is_memory_only(&self) -> bool {
        matches!(self, Self::Tmpfs)
    }
}

impl fmt::Display for FsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FsKind {
    type Err = HardValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tmpfs" => Ok(Self::Tmpfs),
            "ext2" => Ok(Self::Ext2),
            "ext3" => Ok(Self::Ext3),
            "ext4" => Ok(Self::Ext4),
            "ext4_no_jnl" => Ok(Self::Ext4NoJournal),
            "xfs" => Ok(Self::Xfs),
            "btrfs" => Ok(Self::Btrfs),
            "f2fs" => Ok(Self::F2fs),
            "jfs" => Ok(Self::Jfs),
            "reiserfs" => Ok(Self::Reiserfs),
            other => Err(HardValidationError::UnsupportedFilesystem {
                name: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for FsKind {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FsKind> for String {
    fn from(fs: FsKind) -> Self {
        fs.name().to_string()
    }
}

/// Buffered or O_DIRECT file I/O inside the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IoMode {
    Buffered,
    Direct,
}

impl IoMode {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Buffered => "bufferedio",
            Self::Direct => "directio",
        }
    }
}

impl fmt::Display for IoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IoMode {
    type Err = HardValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bufferedio" => Ok(Self::Buffered),
            "directio" => Ok(Self::Direct),
            other => Err(HardValidationError::UnsupportedIoMode {
                name: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for IoMode {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IoMode> for String {
    fn from(mode: IoMode) -> Self {
        mode.name().to_string()
    }
}

/// Validated benchmark name, e.g. `DWAL`, `filebench_varmail`, `MRPM_bg`.
/// Must be non-empty and free of `:` and whitespace since it is embedded in
/// key lines of the run log.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Benchmark(String);

impl Benchmark {
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        let name = name.into();

        if name.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "benchmark",
                value: name,
                reason: "Benchmark name cannot be empty".to_string(),
            });
        }

        if name.chars().any(|c| c == ':' || c.is_whitespace()) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "benchmark",
                value: name,
                reason: "Benchmark name must not contain ':' or whitespace".to_string(),
            });
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this benchmark runs a background worker next to the measured ones.
    pub fn has_background_worker(&self) -> bool {
        self.0.ends_with(BACKGROUND_SUFFIX)
    }

    /// Which launcher runs this benchmark and the `--type` it receives.
    pub fn workload(&self) -> (WorkloadBinary, &str) {
        if let Some(kind) = self.0.strip_prefix("filebench_") {
            (WorkloadBinary::Filebench, kind)
        } else if let Some(kind) = self.0.strip_prefix("dbench_") {
            (WorkloadBinary::Dbench, kind)
        } else {
            (WorkloadBinary::Fxmark, self.as_str())
        }
    }
}

impl fmt::Display for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Benchmark {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Benchmark> for String {
    fn from(bench: Benchmark) -> Self {
        bench.0
    }
}

/// External workload launchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadBinary {
    Fxmark,
    Filebench,
    Dbench,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_kind_roundtrip_names() {
        for name in ["tmpfs", "ext4", "ext4_no_jnl", "xfs", "btrfs", "f2fs"] {
            let fs: FsKind = name.parse().unwrap();
            assert_eq!(fs.to_string(), name);
        }
    }

    #[test]
    fn test_unsupported_filesystem_rejected() {
        let err = "zfs".parse::<FsKind>().unwrap_err();
        assert!(matches!(
            err,
            HardValidationError::UnsupportedFilesystem { ref name } if name == "zfs"
        ));
    }

    #[test]
    fn test_mkfs_flags() {
        assert_eq!(FsKind::Ext4.mkfs_flags(), Some("-F"));
        assert_eq!(FsKind::Xfs.mkfs_flags(), Some("-f"));
        assert_eq!(FsKind::Jfs.mkfs_flags(), Some("-q"));
        assert_eq!(FsKind::F2fs.mkfs_flags(), None);
        assert_eq!(FsKind::Ext4NoJournal.fs_type(), "ext4");
    }

    #[test]
    fn test_medium_parse() {
        assert_eq!("mem".parse::<Medium>().unwrap(), Medium::Mem);
        assert!("floppy".parse::<Medium>().is_err());
        assert!(Medium::Mem.is_memory());
        assert!(!Medium::Nvme.is_memory());
    }

    #[test]
    fn test_benchmark_validation() {
        assert!(Benchmark::new("DWAL").is_ok());
        assert!(Benchmark::new("").is_err());
        assert!(Benchmark::new("DW:AL").is_err());
        assert!(Benchmark::new("DW AL").is_err());
    }

    #[test]
    fn test_benchmark_workload_selection() {
        let fb = Benchmark::new("filebench_varmail").unwrap();
        assert_eq!(fb.workload(), (WorkloadBinary::Filebench, "varmail"));

        let db = Benchmark::new("dbench_client").unwrap();
        assert_eq!(db.workload(), (WorkloadBinary::Dbench, "client"));

        let fx = Benchmark::new("MRPM_bg").unwrap();
        assert_eq!(fx.workload(), (WorkloadBinary::Fxmark, "MRPM_bg"));
        assert!(fx.has_background_worker());
    }
}
