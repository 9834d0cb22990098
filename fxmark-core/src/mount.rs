// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Format and mount a filesystem at the scratch root.

use std::path::Path;

use crate::driver::{CommandSpec, OutputMode, ResourceDriver};
use crate::error::{DriverError, MountError};
use crate::lifecycle::HookStack;
use crate::media::MediaManager;
use crate::types::{FsKind, Medium};

/// Upper bound on stacked mounts peeled off one path.
pub const MAX_UNMOUNT_ATTEMPTS: usize = 64;

/// Unmount `path` until `umount` reports there is nothing left. Returns
/// the number of successful unmounts.
pub fn unmount_all(driver: &mut dyn ResourceDriver, path: &Path) -> Result<usize, DriverError> {
    let cmd = CommandSpec::sudo("umount").arg(path.display().to_string());

    for attempt in 0..MAX_UNMOUNT_ATTEMPTS {
        if !driver.run(&cmd, OutputMode::Silent)?.success() {
            return Ok(attempt);
        }
    }

    tracing::warn!(
        path = %path.display(),
        attempts = MAX_UNMOUNT_ATTEMPTS,
        "Path still mounted after repeated unmounts"
    );
    Ok(MAX_UNMOUNT_ATTEMPTS)
}

/// `sudo mount -t tmpfs -o mode=0777,size=<size> none <target>`.
pub fn tmpfs_mount_command(size: &str, target: &Path) -> CommandSpec {
    CommandSpec::sudo("mount")
        .args(["-t", "tmpfs", "-o"])
        .arg(format!("mode=0777,size={}", size))
        .arg("none")
        .arg(target.display().to_string())
}

/// How a filesystem kind gets onto the target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStrategy {
    /// Mount directly, no device.
    Memory,
    /// Initialize the medium, mkfs, mount, open up permissions.
    Block,
    /// As [`MountStrategy::Block`], with the journal removed before mounting.
    BlockWithoutJournal,
}

impl MountStrategy {
    pub fn for_fs(fs: FsKind) -> Self {
        match fs {
            FsKind::Tmpfs => Self::Memory,
            FsKind::Ext4NoJournal => Self::BlockWithoutJournal,
            FsKind::Ext2
            | FsKind::Ext3
            | FsKind::Ext4
            | FsKind::Xfs
            | FsKind::Btrfs
            | FsKind::F2fs
            | FsKind::Jfs
            | FsKind::Reiserfs => Self::Block,
        }
    }
}

/// Mounts filesystems under test.
#[derive(Debug, Clone)]
pub struct FilesystemMounter {
    media: MediaManager,
}

impl FilesystemMounter {
    pub fn new(media: MediaManager) -> Self {
        Self { media }
    }

    pub fn media(&self) -> &MediaManager {
        &self.media
    }

    /// Clear `target` and run the hooks it owns: peel off every mount, then
    /// release whatever those mounts were holding.
    pub fn unmount(
        &self,
        driver: &mut dyn ResourceDriver,
        hooks: &mut HookStack,
        target: &Path,
    ) -> Result<(), DriverError> {
        let count = unmount_all(driver, target)?;
        tracing::debug!(target = %target.display(), count, "Unmounted target");
        hooks.run_for(target, driver);
        Ok(())
    }

    /// Mount `fs` on `medium` at `target`. The first failing step aborts
    /// the chain.
    pub fn mount(
        &self,
        driver: &mut dyn ResourceDriver,
        hooks: &mut HookStack,
        medium: Medium,
        fs: FsKind,
        target: &Path,
    ) -> Result<(), MountError> {
        self.unmount(driver, hooks, target)?;
        let mkdir = CommandSpec::new("mkdir")
            .arg("-p")
            .arg(target.display().to_string());
        driver.run(&mkdir, OutputMode::Silent)?;

        match MountStrategy::for_fs(fs) {
            MountStrategy::Memory => {
                let cmd = tmpfs_mount_command(self.media.disk_size(), target);
                step(driver, "mount", &cmd)
            }
            MountStrategy::Block => self.mount_block(driver, hooks, medium, fs, target, false),
            MountStrategy::BlockWithoutJournal => {
                self.mount_block(driver, hooks, medium, fs, target, true)
            }
        }?;

        tracing::info!(
            medium = %medium,
            fs = %fs,
            target = %target.display(),
            "Filesystem mounted"
        );
        Ok(())
    }

    fn mount_block(
        &self,
        driver: &mut dyn ResourceDriver,
        hooks: &mut HookStack,
        medium: Medium,
        fs: FsKind,
        target: &Path,
        strip_journal: bool,
    ) -> Result<(), MountError> {
        let device = self.media.initialize(medium, driver, hooks, target)?;
        let device = device.display().to_string();

        let mut mkfs = CommandSpec::sudo(format!("mkfs.{}", fs.fs_type()));
        if let Some(flag) = fs.mkfs_flags() {
            mkfs = mkfs.arg(flag);
        }
        step(driver, "mkfs", &mkfs.arg(device.as_str()))?;

        if strip_journal {
            let tune = CommandSpec::sudo("tune2fs").args(["-O", "^has_journal"]).arg(device.as_str());
            step(driver, "tune2fs", &tune)?;
        }

        let mount = CommandSpec::sudo("mount")
            .args(["-t", fs.fs_type()])
            .arg(device.as_str())
            .arg(target.display().to_string());
        step(driver, "mount", &mount)?;

        let chmod = CommandSpec::sudo("chmod")
            .arg("777")
            .arg(target.display().to_string());
        step(driver, "chmod", &chmod)
    }
}

fn step(
    driver: &mut dyn ResourceDriver,
    name: &'static str,
    command: &CommandSpec,
) -> Result<(), MountError> {
    let output = driver.run(command, OutputMode::Silent)?;
    if output.success() {
        Ok(())
    } else {
        Err(MountError::StepFailed {
            step: name,
            command: command.to_string(),
            status: output.status,
        })
    }
}
