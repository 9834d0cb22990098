// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Test matrix enumeration.
//!
//! Nesting order, outermost first: core count (descending), benchmark,
//! medium, I/O mode, filesystem. Run logs from different machines line up
//! only if this order never changes.

use std::fmt;

use itertools::iproduct;

use crate::config::Config;
use crate::store::TestKey;
use crate::types::{Benchmark, FsKind, IoMode, Medium};

/// One resolved matrix cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTask {
    pub medium: Medium,
    pub fs: FsKind,
    pub bench: Benchmark,
    /// Core count as enumerated, before adding a background worker.
    pub requested_cores: usize,
    /// Cores brought online for this task.
    pub cores: usize,
    pub io_mode: IoMode,
    pub foreground: usize,
    pub background: usize,
}

impl RunTask {
    /// Derive the foreground/background split. A `_bg` benchmark gets one
    /// extra core, capped at `hw_threads`, for its background worker.
    pub fn new(
        medium: Medium,
        fs: FsKind,
        bench: Benchmark,
        requested_cores: usize,
        io_mode: IoMode,
        hw_threads: usize,
    ) -> Self {
        let (cores, background) = if bench.has_background_worker() {
            ((requested_cores + 1).min(hw_threads), 1)
        } else {
            (requested_cores, 0)
        };

        Self {
            medium,
            fs,
            bench,
            requested_cores,
            cores,
            io_mode,
            foreground: cores.saturating_sub(background),
            background,
        }
    }

    /// Key under which the workload's measurements are logged.
    pub fn key(&self) -> TestKey {
        TestKey::new([
            self.medium.name(),
            self.fs.name(),
            self.bench.as_str(),
            self.foreground.to_string().as_str(),
            self.io_mode.name(),
        ])
    }
}

impl fmt::Display for RunTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.medium, self.fs, self.bench, self.foreground, self.io_mode
        )
    }
}

/// Ordered dimensions plus the run filter.
#[derive(Debug, Clone)]
pub struct ConfigMatrix {
    core_counts: Vec<usize>,
    benchmarks: Vec<Benchmark>,
    media: Vec<Medium>,
    io_modes: Vec<IoMode>,
    filesystems: Vec<FsKind>,
    filter: TestKey,
    hw_threads: usize,
}

impl ConfigMatrix {
    pub fn new(
        core_counts: Vec<usize>,
        benchmarks: Vec<Benchmark>,
        media: Vec<Medium>,
        io_modes: Vec<IoMode>,
        filesystems: Vec<FsKind>,
        filter: TestKey,
        hw_threads: usize,
    ) -> Self {
        let mut core_counts = core_counts;
        core_counts.sort_unstable_by(|a, b| b.cmp(a));

        Self {
            core_counts,
            benchmarks,
            media,
            io_modes,
            filesystems,
            filter,
            hw_threads,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.core_counts(),
            config.matrix.benchmarks.clone(),
            config.matrix.media.clone(),
            config.matrix.io_modes.clone(),
            config.matrix.filesystems.clone(),
            config.runner.filter.clone(),
            config.cpu.hw_threads(),
        )
    }

    /// Core counts in enumeration order.
    pub fn core_counts(&self) -> &[usize] {
        &self.core_counts
    }

    /// Lazily enumerate the filtered matrix. Each call starts over.
    pub fn tasks(&self) -> impl Iterator<Item = RunTask> + '_ {
        iproduct!(
            self.core_counts.iter(),
            self.benchmarks.iter(),
            self.media.iter(),
            self.io_modes.iter(),
            self.filesystems.iter()
        )
        .filter(|(_, _, medium, _, fs)| !fs.is_memory_only() || medium.is_memory())
        .filter(|(ncore, bench, medium, io_mode, fs)| {
            let candidate = TestKey::new([
                medium.name(),
                fs.name(),
                bench.as_str(),
                ncore.to_string().as_str(),
                io_mode.name(),
            ]);
            self.filter.matches(&candidate)
        })
        .map(|(ncore, bench, medium, io_mode, fs)| {
            RunTask::new(
                *medium,
                *fs,
                bench.clone(),
                *ncore,
                *io_mode,
                self.hw_threads,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bench(name: &str) -> Benchmark {
        Benchmark::new(name).unwrap()
    }

    fn any() -> TestKey {
        TestKey::any(5)
    }

    #[test]
    fn test_nesting_order() {
        let matrix = ConfigMatrix::new(
            vec![2, 4],
            vec![bench("DWAL"), bench("MRPL")],
            vec![Medium::Mem],
            vec![IoMode::Buffered],
            vec![FsKind::Ext4, FsKind::Xfs],
            any(),
            8,
        );

        let order: Vec<String> = matrix.tasks().map(|t| t.to_string()).collect();
        assert_eq!(
            order,
            vec![
                "mem:ext4:DWAL:4:bufferedio",
                "mem:xfs:DWAL:4:bufferedio",
                "mem:ext4:MRPL:4:bufferedio",
                "mem:xfs:MRPL:4:bufferedio",
                "mem:ext4:DWAL:2:bufferedio",
                "mem:xfs:DWAL:2:bufferedio",
                "mem:ext4:MRPL:2:bufferedio",
                "mem:xfs:MRPL:2:bufferedio",
            ]
        );
    }

    #[test]
    fn test_restartable() {
        let matrix = ConfigMatrix::new(
            vec![1],
            vec![bench("DWAL")],
            vec![Medium::Mem, Medium::Ssd],
            vec![IoMode::Buffered, IoMode::Direct],
            vec![FsKind::Ext4],
            any(),
            1,
        );
        let first: Vec<RunTask> = matrix.tasks().collect();
        let second: Vec<RunTask> = matrix.tasks().collect();
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
    }

    #[test]
    fn test_memory_only_fs_skipped_on_block_media() {
        let matrix = ConfigMatrix::new(
            vec![1],
            vec![bench("DWAL")],
            vec![Medium::Ssd, Medium::Mem],
            vec![IoMode::Buffered],
            vec![FsKind::Tmpfs, FsKind::Ext4],
            any(),
            1,
        );
        let order: Vec<String> = matrix.tasks().map(|t| t.to_string()).collect();
        assert_eq!(
            order,
            vec![
                "ssd:ext4:DWAL:1:bufferedio",
                "mem:tmpfs:DWAL:1:bufferedio",
                "mem:ext4:DWAL:1:bufferedio",
            ]
        );
    }

    #[test]
    fn test_filter() {
        let matrix = ConfigMatrix::new(
            vec![1, 2, 4],
            vec![bench("DWAL"), bench("DWOL")],
            vec![Medium::Mem],
            vec![IoMode::Buffered, IoMode::Direct],
            vec![FsKind::Ext4, FsKind::Xfs],
            TestKey::parse("mem:*:DWOL:2:directio"),
            8,
        );
        let order: Vec<String> = matrix.tasks().map(|t| t.to_string()).collect();
        assert_eq!(
            order,
            vec!["mem:ext4:DWOL:2:directio", "mem:xfs:DWOL:2:directio"]
        );
    }

    #[test]
    fn test_filter_sees_requested_cores() {
        let matrix = ConfigMatrix::new(
            vec![2, 4],
            vec![bench("MRPM_bg")],
            vec![Medium::Mem],
            vec![IoMode::Buffered],
            vec![FsKind::Tmpfs],
            TestKey::parse("*:*:*:4"),
            8,
        );
        let tasks: Vec<RunTask> = matrix.tasks().collect();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].requested_cores, 4);
        assert_eq!(tasks[0].cores, 5);
        assert_eq!(tasks[0].foreground, 4);
        assert_eq!(tasks[0].background, 1);
    }

    #[test]
    fn test_background_worker_capped() {
        let task = RunTask::new(
            Medium::Mem,
            FsKind::Tmpfs,
            bench("DRBL_bg"),
            4,
            IoMode::Buffered,
            4,
        );
        assert_eq!(task.cores, 4);
        assert_eq!(task.foreground, 3);
        assert_eq!(task.background, 1);
        assert_eq!(task.key(), TestKey::parse("mem:tmpfs:DRBL_bg:3:bufferedio"));
    }
}
