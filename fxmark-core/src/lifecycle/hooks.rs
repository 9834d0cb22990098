// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Compensating actions for acquired resources.

use std::path::{Path, PathBuf};

use crate::driver::{CommandSpec, OutputMode, ResourceDriver};
use crate::error::DriverError;
use crate::mount::unmount_all;

/// Deferred release of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupHook {
    /// Unbind a loop device from its backing file.
    DetachLoop { device: PathBuf },
    /// Unmount everything stacked on a path.
    Unmount { path: PathBuf },
}

impl CleanupHook {
    pub fn run(&self, driver: &mut dyn ResourceDriver) -> Result<(), DriverError> {
        tracing::debug!(hook = ?self, "Running cleanup hook");

        match self {
            Self::DetachLoop { device } => {
                let cmd = CommandSpec::sudo("losetup")
                    .arg("-d")
                    .arg(device.display().to_string());
                driver.run(&cmd, OutputMode::Silent)?;
            }
            Self::Unmount { path } => {
                unmount_all(driver, path)?;
            }
        }
        Ok(())
    }
}

/// Hooks keyed by the mount path that owns them.
///
/// Hooks are removed from the stack before they run, so each runs at most
/// once no matter how the caller exits.
#[derive(Debug, Default)]
pub struct HookStack {
    hooks: Vec<(PathBuf, CleanupHook)>,
}

impl HookStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, owner: impl Into<PathBuf>, hook: CleanupHook) {
        self.hooks.push((owner.into(), hook));
    }

    /// Remove the hooks owned by `owner`, newest first.
    pub fn drain_for(&mut self, owner: &Path) -> Vec<CleanupHook> {
        let (owned, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.hooks)
            .into_iter()
            .partition(|(path, _)| path == owner);
        self.hooks = kept;
        owned.into_iter().rev().map(|(_, hook)| hook).collect()
    }

    /// Remove every hook, newest first.
    pub fn drain_all(&mut self) -> Vec<CleanupHook> {
        std::mem::take(&mut self.hooks)
            .into_iter()
            .rev()
            .map(|(_, hook)| hook)
            .collect()
    }

    /// Drain and run the hooks owned by `owner`. A failing hook is logged
    /// and does not stop the others.
    pub fn run_for(&mut self, owner: &Path, driver: &mut dyn ResourceDriver) {
        for hook in self.drain_for(owner) {
            if let Err(e) = hook.run(driver) {
                tracing::warn!(hook = ?hook, error = %e, "Cleanup hook failed");
            }
        }
    }

    /// Drain and run every hook.
    pub fn run_all(&mut self, driver: &mut dyn ResourceDriver) {
        for hook in self.drain_all() {
            if let Err(e) = hook.run(driver) {
                tracing::warn!(hook = ?hook, error = %e, "Cleanup hook failed");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RecordingDriver;

    fn detach(dev: &str) -> CleanupHook {
        CleanupHook::DetachLoop {
            device: PathBuf::from(dev),
        }
    }

    #[test]
    fn test_drain_for_is_lifo_and_scoped() {
        let mut stack = HookStack::new();
        stack.push("/root", detach("/dev/loop0"));
        stack.push("/other", detach("/dev/loop1"));
        stack.push("/root", detach("/dev/loop2"));

        let drained = stack.drain_for(Path::new("/root"));
        assert_eq!(drained, vec![detach("/dev/loop2"), detach("/dev/loop0")]);
        assert_eq!(stack.len(), 1);
        assert!(stack.drain_for(Path::new("/root")).is_empty());
    }

    #[test]
    fn test_hooks_run_once() {
        let mut stack = HookStack::new();
        stack.push(
            "/root",
            CleanupHook::Unmount {
                path: PathBuf::from("/tmp/fx"),
            },
        );
        stack.push("/root", detach("/dev/loop0"));

        let mut driver = RecordingDriver::new();
        stack.run_for(Path::new("/root"), &mut driver);
        stack.run_all(&mut driver);

        assert_eq!(
            driver.commands(),
            vec!["sudo losetup -d /dev/loop0", "sudo umount /tmp/fx"]
        );
        assert!(stack.is_empty());
    }
}
