// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Resource lifecycle around each benchmark task.
//!
//! One manager owns the driver, the mount hooks and the memoized CPU set
//! for a whole run. Per task: `prepare` → `mount` → `pre_work` → `execute`
//! → `post_work` → `release`. `teardown` ends the run from any phase.

pub mod hooks;
pub mod state;

pub use hooks::{CleanupHook, HookStack};
pub use state::{LifecyclePhase, LifecycleState};

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::cpu::CpuTopology;
use crate::driver::{CommandOutput, CommandSpec, OutputMode, ResourceDriver};
use crate::error::FxResult;
use crate::matrix::RunTask;
use crate::media::MediaManager;
use crate::mount::FilesystemMounter;
use crate::perfmon::lock_stat_command;
use crate::profiler::ProfilerAdapter;
use crate::runlog::RunLog;
use crate::workload::WorkloadLauncher;

pub struct ResourceLifecycleManager<D: ResourceDriver> {
    driver: D,
    state: LifecycleState,
    mounter: FilesystemMounter,
    topology: CpuTopology,
    root: PathBuf,
    set_cpus: PathBuf,
    drop_caches: PathBuf,
}

impl<D: ResourceDriver> ResourceLifecycleManager<D> {
    pub fn new(config: &Config, driver: D) -> Self {
        let media = MediaManager::new(
            config.devices.clone(),
            &config.paths,
            config.runner.disk_size.as_str(),
        );

        Self {
            driver,
            state: LifecycleState::new(),
            mounter: FilesystemMounter::new(media),
            topology: config.cpu.clone(),
            root: config.paths.root.clone(),
            set_cpus: config.paths.set_cpus.clone(),
            drop_caches: config.paths.drop_caches.clone(),
        }
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Scratch root the filesystem under test is mounted on.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Quiet the machine and bring `ncore` cores online.
    pub fn prepare(&mut self, ncore: usize) -> FxResult<()> {
        self.state.transition_to(LifecyclePhase::CpuSet)?;

        self.keep_sudo()?;
        self.run(&lock_stat_command(0))?;
        self.drop_caches()?;
        self.run(&CommandSpec::new("sync"))?;
        self.set_cpus(ncore)
    }

    /// Mount the task's filesystem at the scratch root. A
    /// [`FxError::Mount`](crate::error::FxError::Mount) concerns this task
    /// only and leaves the manager ready for the next `prepare`.
    pub fn mount(&mut self, task: &RunTask) -> FxResult<()> {
        self.mounter.mount(
            &mut self.driver,
            &mut self.state.hooks,
            task.medium,
            task.fs,
            &self.root,
        )?;
        self.state.transition_to(LifecyclePhase::Mounted)?;
        Ok(())
    }

    pub fn pre_work(&mut self) -> FxResult<()> {
        self.keep_sudo()?;
        self.drop_caches()
    }

    /// Run the workload inside a profiling session and copy its stdout
    /// into the run log. Stderr goes to the tracing log only, since every
    /// run log line is read back as measurement data. Returns the
    /// workload's exit status.
    pub fn execute(
        &mut self,
        task: &RunTask,
        launcher: &WorkloadLauncher,
        profiler: &ProfilerAdapter,
        log: &mut RunLog,
    ) -> FxResult<i32> {
        self.state.transition_to(LifecyclePhase::Running)?;

        let session = profiler.arm(task);
        let command = launcher.command(task, profiler, &session);
        tracing::info!(task = %task, "Running workload");

        let output = self.driver.run(&command, OutputMode::Captured)?;
        for line in output.stdout.lines() {
            log.line(line.trim())?;
        }
        for line in output.stderr.lines().map(str::trim).filter(|l| !l.is_empty()) {
            tracing::warn!(task = %task, stderr = line, "Workload diagnostic");
        }

        profiler.finish(&session, output.status, &mut self.driver);
        if !output.success() {
            tracing::warn!(task = %task, status = output.status, "Workload exited with failure");
        }
        Ok(output.status)
    }

    pub fn post_work(&mut self) -> FxResult<()> {
        self.keep_sudo()
    }

    /// Unmount the scratch root and release what the mount was holding.
    pub fn release(&mut self) -> FxResult<()> {
        self.state.transition_to(LifecyclePhase::Unmounting)?;
        self.mounter
            .unmount(&mut self.driver, &mut self.state.hooks, &self.root)?;
        self.state.transition_to(LifecyclePhase::Idle)?;
        Ok(())
    }

    /// Return the machine to its pre-run state. Never fails; every step is
    /// attempted and problems are logged.
    pub fn teardown(&mut self, profiler: Option<&ProfilerAdapter>) {
        if let Err(e) = self.state.transition_to(LifecyclePhase::Cleanup) {
            tracing::warn!(error = %e, "Unexpected lifecycle phase at teardown");
        }

        if let Some(profiler) = profiler {
            profiler.teardown(&mut self.driver);
        }

        if let Err(e) = self.run(&lock_stat_command(0)) {
            tracing::warn!(error = %e, "Failed to disable lock statistics");
        }

        if let Err(e) = self
            .mounter
            .unmount(&mut self.driver, &mut self.state.hooks, &self.root)
        {
            tracing::warn!(root = %self.root.display(), error = %e, "Failed to unmount scratch root");
        }
        // Hooks whose owner was never unmounted through the root.
        self.state.hooks.run_all(&mut self.driver);

        if let Err(e) = self.set_cpus(0) {
            tracing::warn!(error = %e, "Failed to restore CPU set");
        }

        if let Err(e) = self.state.transition_to(LifecyclePhase::Idle) {
            tracing::warn!(error = %e, "Unexpected lifecycle phase after teardown");
        }
        tracing::info!("Teardown complete");
    }

    fn run(&mut self, command: &CommandSpec) -> FxResult<CommandOutput> {
        Ok(self.driver.run(command, OutputMode::Silent)?)
    }

    fn keep_sudo(&mut self) -> FxResult<()> {
        self.run(&CommandSpec::sudo("-v"))?;
        Ok(())
    }

    fn drop_caches(&mut self) -> FxResult<()> {
        self.run(&CommandSpec::sudo(self.drop_caches.display().to_string()))?;
        Ok(())
    }

    /// Memoized: asking for the active count again runs nothing.
    fn set_cpus(&mut self, ncore: usize) -> FxResult<()> {
        if self.state.active_cores() == Some(ncore) {
            return Ok(());
        }

        let selection = self.topology.selection(ncore);
        let command = CommandSpec::sudo(self.set_cpus.display().to_string())
            .arg(selection.to_string());
        let output = self.run(&command)?;
        if !output.success() {
            tracing::warn!(cpus = %selection, status = output.status, "set-cpus failed");
        }

        tracing::debug!(ncore, cpus = %selection, "CPU set changed");
        self.state.set_active_cores(ncore);
        Ok(())
    }
}
