// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Drives a whole benchmark run over the test matrix.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Config;
use crate::driver::{CommandSpec, OutputMode, ResourceDriver};
use crate::error::{FxError, FxResult};
use crate::lifecycle::ResourceLifecycleManager;
use crate::matrix::{ConfigMatrix, RunTask};
use crate::profiler::ProfilerAdapter;
use crate::runlog::RunLog;
use crate::signal;
use crate::workload::WorkloadLauncher;

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Matrix cells enumerated, including skipped ones.
    pub configurations: usize,
    pub executed: usize,
    pub mount_failures: usize,
    pub workload_failures: usize,
    pub interrupted: bool,
    pub log_path: PathBuf,
}

/// Tears the environment down when dropped, so an early return or a panic
/// in the middle of the matrix still cleans up, exactly once.
struct RunSession<'a, D: ResourceDriver> {
    lifecycle: &'a mut ResourceLifecycleManager<D>,
    profiler: &'a ProfilerAdapter,
    closed: bool,
}

impl<'a, D: ResourceDriver> RunSession<'a, D> {
    fn new(lifecycle: &'a mut ResourceLifecycleManager<D>, profiler: &'a ProfilerAdapter) -> Self {
        Self {
            lifecycle,
            profiler,
            closed: false,
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        signal::begin_teardown();
        self.lifecycle.teardown(Some(self.profiler));
    }
}

impl<D: ResourceDriver> Drop for RunSession<'_, D> {
    fn drop(&mut self) {
        if !self.closed && std::thread::panicking() {
            tracing::error!("Run aborted, tearing down");
        }
        self.close();
    }
}

pub struct Runner<D: ResourceDriver> {
    config: Config,
    matrix: ConfigMatrix,
    launcher: WorkloadLauncher,
    lifecycle: ResourceLifecycleManager<D>,
    interrupt: &'static AtomicBool,
    echo: bool,
}

impl<D: ResourceDriver> Runner<D> {
    pub fn new(config: Config, driver: D) -> Self {
        Self {
            matrix: ConfigMatrix::from_config(&config),
            launcher: WorkloadLauncher::from_config(&config),
            lifecycle: ResourceLifecycleManager::new(&config, driver),
            interrupt: &signal::INTERRUPTED,
            echo: false,
            config,
        }
    }

    /// Poll `flag` instead of the process-wide interrupt flag.
    pub fn with_interrupt(mut self, flag: &'static AtomicBool) -> Self {
        self.interrupt = flag;
        self
    }

    /// Also print every run log line to stdout.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn lifecycle(&self) -> &ResourceLifecycleManager<D> {
        &self.lifecycle
    }

    fn system_identity(&mut self) -> String {
        let uname = CommandSpec::new("uname").arg("-a");
        match self.lifecycle.driver_mut().run(&uname, OutputMode::Captured) {
            Ok(out) => out.stdout.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot identify system");
                "unknown".to_string()
            }
        }
    }

    /// Run every task of the matrix. Teardown runs once at the end, also
    /// when a step fails or panics. A dry run only lists the tasks.
    pub fn run(&mut self) -> FxResult<RunSummary> {
        let mut log = RunLog::create(&self.config.paths.log_dir, self.echo)?;
        let system = self.system_identity();
        log.write_header(&self.config, &system)?;

        let mut summary = RunSummary {
            configurations: 0,
            executed: 0,
            mount_failures: 0,
            workload_failures: 0,
            interrupted: false,
            log_path: log.path().to_path_buf(),
        };

        if self.config.runner.dry_run {
            for task in self.matrix.tasks() {
                log.key(&task)?;
                summary.configurations += 1;
            }
            log.write_footer(summary.configurations)?;
            return Ok(summary);
        }

        let profiler = ProfilerAdapter::new(
            self.config.paths.perfmon.as_str(),
            self.config.runner.perfmon_level,
            log.dir(),
        );
        let mut session = RunSession::new(&mut self.lifecycle, &profiler);

        for task in self.matrix.tasks() {
            if self.interrupt.load(Ordering::SeqCst) {
                summary.interrupted = true;
                break;
            }
            summary.configurations += 1;

            let lifecycle = &mut *session.lifecycle;
            lifecycle.prepare(task.cores)?;
            match lifecycle.mount(&task) {
                Ok(()) => {}
                Err(FxError::Mount(e)) => {
                    tracing::warn!(task = %task, error = %e, "Mount failed, skipping task");
                    log.comment(&format!("Fail to mount {} on {}.", task.fs, task.medium))?;
                    summary.mount_failures += 1;
                    continue;
                }
                Err(e) => return Err(e),
            }

            log.key(&task)?;
            lifecycle.pre_work()?;
            let status = lifecycle.execute(&task, &self.launcher, &profiler, &mut log)?;
            lifecycle.post_work()?;
            lifecycle.release()?;

            summary.executed += 1;
            if status != 0 {
                summary.workload_failures += 1;
            }
        }

        if self.interrupt.load(Ordering::SeqCst) {
            summary.interrupted = true;
            tracing::warn!("Run interrupted");
        } else {
            log.write_footer(summary.configurations)?;
        }

        session.close();
        tracing::info!(
            configurations = summary.configurations,
            executed = summary.executed,
            mount_failures = summary.mount_failures,
            "Run finished"
        );
        Ok(summary)
    }

    /// Tasks a run would execute, in order.
    pub fn plan(&self) -> Vec<RunTask> {
        self.matrix.tasks().collect()
    }
}
