// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Profiling brackets around each workload.
//!
//! The workload itself calls the begin/end commands around its measurement
//! window. The adapter only prepares the session and makes sure nothing is
//! left running afterwards. No profiling failure ever reaches the caller.

use std::path::{Path, PathBuf};

use crate::driver::{CommandSpec, OutputMode, ResourceDriver};
use crate::matrix::RunTask;
use crate::perfmon::{PerfmonSettings, ProfileLevel};

/// Extension of per-task profiling logs.
pub const PROFILE_LOG_EXT: &str = "pm";

/// Profiling state for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSession {
    pub log_path: PathBuf,
    pub settings: PerfmonSettings,
}

impl ProfileSession {
    pub fn env(&self) -> Vec<(String, String)> {
        self.settings.env()
    }
}

#[derive(Debug, Clone)]
pub struct ProfilerAdapter {
    perfmon: String,
    level: ProfileLevel,
    log_dir: PathBuf,
}

impl ProfilerAdapter {
    pub fn new(perfmon: impl Into<String>, level: ProfileLevel, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            perfmon: perfmon.into(),
            level,
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn begin_command(&self) -> String {
        format!("{} start", self.perfmon)
    }

    pub fn end_command(&self) -> String {
        format!("{} stop", self.perfmon)
    }

    /// `<log_dir>/<medium>.<fs>.<bench>.<foreground>.pm` and the environment
    /// pointing perfmon at it.
    pub fn arm(&self, task: &RunTask) -> ProfileSession {
        let log_path = self.log_dir.join(format!(
            "{}.{}.{}.{}.{}",
            task.medium, task.fs, task.bench, task.foreground, PROFILE_LOG_EXT
        ));

        ProfileSession {
            settings: PerfmonSettings {
                level: self.level,
                dir: self.log_dir.clone(),
                file: log_path.display().to_string(),
            },
            log_path,
        }
    }

    /// Close the session after the workload exited with `status`. A failed
    /// workload may have died inside its window, so the end command is
    /// issued on its behalf.
    pub fn finish(&self, session: &ProfileSession, status: i32, driver: &mut dyn ResourceDriver) {
        if status != 0 {
            tracing::warn!(
                status,
                log = %session.log_path.display(),
                "Workload failed, stopping profiler"
            );
            self.stop(driver, session.env());
        }
    }

    /// Stop anything still profiling and delete stray session logs.
    pub fn teardown(&self, driver: &mut dyn ResourceDriver) {
        let settings = PerfmonSettings {
            level: self.level,
            dir: self.log_dir.clone(),
            file: crate::perfmon::DEFAULT_FILE.to_string(),
        };
        self.stop(driver, settings.env());

        match remove_session_logs(&self.log_dir) {
            Ok(0) => {}
            Ok(n) => tracing::debug!(removed = n, "Removed stray profiling logs"),
            Err(e) => tracing::warn!(
                dir = %self.log_dir.display(),
                error = %e,
                "Failed to remove profiling logs"
            ),
        }
    }

    fn stop(&self, driver: &mut dyn ResourceDriver, env: Vec<(String, String)>) {
        let Some(cmd) = CommandSpec::from_line(&self.end_command()) else {
            tracing::warn!(command = %self.perfmon, "Empty profiler command");
            return;
        };

        match driver.run(&cmd.envs(env), OutputMode::Silent) {
            Ok(out) if !out.success() => {
                tracing::warn!(status = out.status, "Profiler stop exited non-zero")
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Profiler stop failed"),
        }
    }
}

fn remove_session_logs(dir: &Path) -> std::io::Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == PROFILE_LOG_EXT) {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
