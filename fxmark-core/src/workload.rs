// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Workload launcher command lines.

use std::path::PathBuf;

use crate::config::Config;
use crate::driver::CommandSpec;
use crate::matrix::RunTask;
use crate::profiler::{ProfileSession, ProfilerAdapter};
use crate::types::{FsKind, IoMode, WorkloadBinary};

/// Builds the command for one task.
#[derive(Debug, Clone)]
pub struct WorkloadLauncher {
    fxmark: PathBuf,
    filebench: PathBuf,
    dbench: String,
    root: PathBuf,
    duration_secs: u64,
}

impl WorkloadLauncher {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fxmark: config.paths.fxmark.clone(),
            filebench: config.paths.filebench.clone(),
            dbench: config.paths.dbench.clone(),
            root: config.paths.root.clone(),
            duration_secs: config.runner.duration_secs,
        }
    }

    fn binary(&self, kind: WorkloadBinary) -> CommandSpec {
        match kind {
            WorkloadBinary::Fxmark => CommandSpec::new(self.fxmark.display().to_string()),
            WorkloadBinary::Filebench => CommandSpec::new(self.filebench.display().to_string()),
            // May carry a sub-command, e.g. `/usr/bin/fxmark dbench`.
            WorkloadBinary::Dbench => CommandSpec::from_line(&self.dbench)
                .unwrap_or_else(|| CommandSpec::new(self.dbench.as_str())),
        }
    }

    pub fn command(
        &self,
        task: &RunTask,
        profiler: &ProfilerAdapter,
        session: &ProfileSession,
    ) -> CommandSpec {
        let (kind, workload_type) = task.bench.workload();

        let direct = match (task.io_mode, task.fs) {
            (IoMode::Direct, FsKind::Tmpfs) => {
                tracing::info!("DirectIO under tmpfs disabled by default");
                false
            }
            (IoMode::Direct, _) => {
                tracing::info!("DirectIO enabled");
                true
            }
            (IoMode::Buffered, _) => false,
        };

        self.binary(kind)
            .arg("--type")
            .arg(workload_type)
            .arg("--ncore")
            .arg(task.cores.to_string())
            .arg("--nbg")
            .arg(task.background.to_string())
            .arg("--duration")
            .arg(self.duration_secs.to_string())
            .arg("--directio")
            .arg(if direct { "1" } else { "0" })
            .arg("--root")
            .arg(self.root.display().to_string())
            .arg("--profbegin")
            .arg(profiler.begin_command())
            .arg("--profend")
            .arg(profiler.end_command())
            .arg("--proflog")
            .arg(session.log_path.display().to_string())
            .envs(session.env())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;
    use crate::perfmon::ProfileLevel;
    use crate::types::{Benchmark, Medium};

    const CONFIG: &str = r#"
runner:
  duration_secs: 5
paths:
  root: /fx/root
  fxmark: /fx/bin/fxmark
  filebench: /fx/bin/run-filebench
  dbench: /fx/bin/fxmark-runner dbench
cpu:
  physical_chips: 1
  cores_per_chip: 8
"#;

    fn render(bench: &str, fs: FsKind, io_mode: IoMode) -> String {
        let config = ConfigLoader::load_string(CONFIG).unwrap();
        let launcher = WorkloadLauncher::from_config(&config);
        let profiler = ProfilerAdapter::new("/fx/perfmon", ProfileLevel::Low, "/logs");
        let task = RunTask::new(Medium::Mem, fs, Benchmark::new(bench).unwrap(), 2, io_mode, 8);
        let session = profiler.arm(&task);
        launcher.command(&task, &profiler, &session).to_string()
    }

    #[test]
    fn test_fxmark_command() {
        let cmd = render("MRPM_bg", FsKind::Ext4, IoMode::Direct);
        assert!(cmd.starts_with("PERFMON_LEVEL=0 PERFMON_LDIR=/logs "));
        assert!(cmd.ends_with(
            "/fx/bin/fxmark --type MRPM_bg --ncore 3 --nbg 1 --duration 5 --directio 1 \
             --root /fx/root --profbegin \"/fx/perfmon start\" --profend \"/fx/perfmon stop\" \
             --proflog /logs/mem.ext4.MRPM_bg.2.pm"
        ));
    }

    #[test]
    fn test_tmpfs_forces_buffered_io() {
        let cmd = render("DWAL", FsKind::Tmpfs, IoMode::Direct);
        assert!(cmd.contains("--directio 0"));
    }

    #[test]
    fn test_launcher_selection() {
        let cmd = render("filebench_varmail", FsKind::Xfs, IoMode::Buffered);
        assert!(cmd.contains("/fx/bin/run-filebench --type varmail"));

        let cmd = render("dbench_client", FsKind::Xfs, IoMode::Buffered);
        assert!(cmd.contains("/fx/bin/fxmark-runner dbench --type client"));
    }
}
