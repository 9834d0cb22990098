// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! The measurement log of one run.
//!
//! Lines follow the grammar read back by
//! [`MeasurementStore`](crate::store::MeasurementStore). Every line is
//! flushed immediately so an interrupted run keeps what it measured.

use std::fmt::Display;
use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{FxError, FxResult};
use crate::matrix::RunTask;

pub const RUN_LOG_NAME: &str = "fxmark.log";

/// Timestamp format of per-run log directories.
const RUN_DIR_FORMAT: &str = "%Y-%m-%d-%H-%M-%S%.6f";

fn join<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug)]
pub struct RunLog {
    dir: PathBuf,
    path: PathBuf,
    writer: LineWriter<File>,
    echo: bool,
}

impl RunLog {
    /// Create `<log_root>/<timestamp>/fxmark.log`.
    pub fn create(log_root: &Path, echo: bool) -> FxResult<Self> {
        let stamp = chrono::Local::now().format(RUN_DIR_FORMAT).to_string();
        Self::open(log_root.join(stamp), echo)
    }

    /// Create `fxmark.log` inside `dir`, creating `dir` as needed.
    pub fn open(dir: PathBuf, echo: bool) -> FxResult<Self> {
        std::fs::create_dir_all(&dir).map_err(|e| FxError::Io {
            context: "creating run log directory",
            source: e,
        })?;

        let path = dir.join(RUN_LOG_NAME);
        let file = File::create(&path).map_err(|e| FxError::Io {
            context: "creating run log",
            source: e,
        })?;

        tracing::info!(path = %path.display(), "Run log created");
        Ok(Self {
            dir,
            path,
            writer: LineWriter::new(file),
            echo,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&mut self, text: &str) -> FxResult<()> {
        if self.echo {
            println!("{}", text);
        }
        writeln!(self.writer, "{}", text).map_err(|e| FxError::Io {
            context: "writing run log",
            source: e,
        })
    }

    /// `### NAME = value`
    pub fn config(&mut self, name: &str, value: impl Display) -> FxResult<()> {
        self.line(&format!("### {:<14} = {}", name, value))
    }

    /// `## medium:fs:bench:foreground:iomode`
    pub fn key(&mut self, task: &RunTask) -> FxResult<()> {
        self.line(&format!("## {}", task))
    }

    /// `# text`
    pub fn comment(&mut self, text: &str) -> FxResult<()> {
        self.line(&format!("# {}", text))
    }

    /// Run metadata. `system` is the host identity, usually `uname -a`.
    pub fn write_header(&mut self, config: &Config, system: &str) -> FxResult<()> {
        let cpu = &config.cpu;

        self.config("SYSTEM", system.trim())?;
        self.config("DISK_SIZE", &config.runner.disk_size)?;
        self.config("DURATION", format!("{}s", config.runner.duration_secs))?;
        self.config("DIRECTIO", join(&config.matrix.io_modes))?;
        self.config("MEDIA_TYPES", join(&config.matrix.media))?;
        self.config("FS_TYPES", join(&config.matrix.filesystems))?;
        self.config("BENCH_TYPES", join(&config.matrix.benchmarks))?;
        self.config("NCORES", join(&config.core_counts()))?;
        self.config("CORE_SEQ", join(&cpu.core_sequence))?;
        self.config("PHYSICAL_CHIPS", cpu.physical_chips)?;
        self.config("CORE_PER_CHIP", cpu.cores_per_chip)?;
        self.config("SMT_LEVEL", cpu.smt_level)
    }

    /// Write the configuration count that closes a run.
    pub fn write_footer(&mut self, configurations: usize) -> FxResult<()> {
        self.config("NUM_TEST_CONF", configurations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;
    use crate::store::MeasurementStore;

    const CONFIG: &str = r#"
matrix:
  media: [mem]
  filesystems: [tmpfs, ext4]
  benchmarks: [DWAL]
  io_modes: [bufferedio]
cpu:
  physical_chips: 1
  cores_per_chip: 4
"#;

    #[test]
    fn test_timestamped_directory() {
        let root = tempfile::tempdir().unwrap();
        let log = RunLog::create(root.path(), false).unwrap();

        assert_eq!(log.dir().parent(), Some(root.path()));
        assert!(log.path().ends_with(RUN_LOG_NAME));
        assert!(log.path().exists());
    }

    #[test]
    fn test_header_is_readable_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::load_string(CONFIG).unwrap();

        let mut log = RunLog::open(dir.path().join("run"), false).unwrap();
        log.write_header(&config, "Linux box 6.1.0 x86_64\n").unwrap();
        log.write_footer(2).unwrap();
        let path = log.path().to_path_buf();
        drop(log);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("### SYSTEM         = Linux box 6.1.0 x86_64\n"));

        let store = MeasurementStore::load_file(&path).unwrap();
        assert_eq!(store.config("DURATION"), Some("30s"));
        assert_eq!(store.config("FS_TYPES"), Some("tmpfs,ext4"));
        assert_eq!(store.config("NCORES"), Some("1,2,4"));
        assert_eq!(store.config("NUM_TEST_CONF"), Some("2"));
        assert!(store.is_empty());
    }
}
