// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Storage medium initialization.
//!
//! The memory medium is a sparse image on a private tmpfs, bound to a loop
//! device. Physical media are only checked for presence; formatting them is
//! the mounter's job.

use std::path::{Path, PathBuf};

use crate::config::{DevicesConfig, PathsConfig};
use crate::driver::{CommandSpec, OutputMode, ResourceDriver};
use crate::error::MediaError;
use crate::lifecycle::{CleanupHook, HookStack};
use crate::mount::{tmpfs_mount_command, unmount_all};
use crate::types::Medium;

/// Brings a medium up and reports its block device.
#[derive(Debug, Clone)]
pub struct MediaManager {
    devices: DevicesConfig,
    tmp_dir: PathBuf,
    disk_image: PathBuf,
    disk_size: String,
}

impl MediaManager {
    pub fn new(devices: DevicesConfig, paths: &PathsConfig, disk_size: impl Into<String>) -> Self {
        Self {
            devices,
            tmp_dir: paths.tmp_dir.clone(),
            disk_image: paths.disk_image(),
            disk_size: disk_size.into(),
        }
    }

    pub fn disk_size(&self) -> &str {
        &self.disk_size
    }

    pub fn device(&self, medium: Medium) -> &Path {
        self.devices.for_medium(medium)
    }

    /// Initialize `medium` and return its device path. Release hooks for
    /// the memory disk are pushed under `owner` only once the whole chain
    /// succeeded.
    pub fn initialize(
        &self,
        medium: Medium,
        driver: &mut dyn ResourceDriver,
        hooks: &mut HookStack,
        owner: &Path,
    ) -> Result<PathBuf, MediaError> {
        match medium {
            Medium::Mem => self.init_mem_disk(driver, hooks, owner),
            Medium::Nvme | Medium::Ssd | Medium::Hdd => {
                let device = self.device(medium);
                if driver.path_exists(device) {
                    Ok(device.to_path_buf())
                } else {
                    Err(MediaError::DeviceMissing {
                        path: device.to_path_buf(),
                    })
                }
            }
        }
    }

    fn init_mem_disk(
        &self,
        driver: &mut dyn ResourceDriver,
        hooks: &mut HookStack,
        owner: &Path,
    ) -> Result<PathBuf, MediaError> {
        let loop_device = self.devices.loop_device.clone();
        let tmp = self.tmp_dir.display().to_string();

        // Stale state from an earlier run: detach, unmount, detach again
        // since the unmount may have released a busy binding.
        self.detach_loop(driver)?;
        unmount_all(driver, &self.tmp_dir)?;
        hooks.run_for(&self.tmp_dir, driver);
        self.detach_loop(driver)?;

        driver.run(
            &CommandSpec::new("mkdir").arg("-p").arg(tmp.as_str()),
            OutputMode::Silent,
        )?;

        let mount = tmpfs_mount_command(&self.disk_size, &self.tmp_dir);
        check("mount tmpfs", &mount, driver.run(&mount, OutputMode::Silent)?.status)?;

        let truncate = CommandSpec::new("truncate")
            .arg("-s")
            .arg(self.disk_size.as_str())
            .arg(self.disk_image.display().to_string());
        check(
            "allocate disk image",
            &truncate,
            driver.run(&truncate, OutputMode::Silent)?.status,
        )?;

        let bind = CommandSpec::sudo("losetup")
            .arg(loop_device.display().to_string())
            .arg(self.disk_image.display().to_string());
        check("bind loop device", &bind, driver.run(&bind, OutputMode::Silent)?.status)?;

        // LIFO: the loop device is detached before its backing tmpfs goes.
        hooks.push(
            owner,
            CleanupHook::Unmount {
                path: self.tmp_dir.clone(),
            },
        );
        hooks.push(
            owner,
            CleanupHook::DetachLoop {
                device: loop_device.clone(),
            },
        );

        tracing::debug!(device = %loop_device.display(), "Memory disk ready");
        Ok(loop_device)
    }

    fn detach_loop(&self, driver: &mut dyn ResourceDriver) -> Result<(), MediaError> {
        let cmd = CommandSpec::sudo("losetup")
            .arg("-d")
            .arg(self.devices.loop_device.display().to_string());
        driver.run(&cmd, OutputMode::Silent)?;
        Ok(())
    }
}

fn check(step: &'static str, command: &CommandSpec, status: i32) -> Result<(), MediaError> {
    if status == 0 {
        Ok(())
    } else {
        Err(MediaError::StepFailed {
            step,
            command: command.to_string(),
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;
    use crate::driver::RecordingDriver;

    const CONFIG: &str = r#"
runner:
  disk_size: 4G
paths:
  tmp_dir: /fx/.tmp
devices:
  loop: /dev/loop7
  nvme: /dev/nvme0n1p1
cpu:
  physical_chips: 1
  cores_per_chip: 2
"#;

    fn manager() -> MediaManager {
        let config = ConfigLoader::load_string(CONFIG).unwrap();
        MediaManager::new(config.devices, &config.paths, config.runner.disk_size)
    }

    #[test]
    fn test_mem_disk_sequence() {
        let media = manager();
        let mut driver = RecordingDriver::new();
        let mut hooks = HookStack::new();

        let dev = media
            .initialize(Medium::Mem, &mut driver, &mut hooks, Path::new("/fx/root"))
            .unwrap();
        assert_eq!(dev, PathBuf::from("/dev/loop7"));

        assert_eq!(
            driver.commands(),
            vec![
                "sudo losetup -d /dev/loop7",
                "sudo umount /fx/.tmp",
                "sudo losetup -d /dev/loop7",
                "mkdir -p /fx/.tmp",
                "sudo mount -t tmpfs -o mode=0777,size=4G none /fx/.tmp",
                "truncate -s 4G /fx/.tmp/disk.img",
                "sudo losetup /dev/loop7 /fx/.tmp/disk.img",
            ]
        );
        assert_eq!(hooks.len(), 2);
        assert_eq!(
            hooks.drain_for(Path::new("/fx/root"))[0],
            CleanupHook::DetachLoop {
                device: PathBuf::from("/dev/loop7")
            }
        );
    }

    #[test]
    fn test_mem_disk_no_hooks_on_failure() {
        let media = manager();
        let mut driver = RecordingDriver::new().fail_on("losetup /dev/loop7", 1);
        let mut hooks = HookStack::new();

        let err = media
            .initialize(Medium::Mem, &mut driver, &mut hooks, Path::new("/fx/root"))
            .unwrap_err();
        assert!(matches!(
            err,
            MediaError::StepFailed {
                step: "bind loop device",
                ..
            }
        ));
        assert!(hooks.is_empty());
    }

    #[test]
    fn test_physical_media_existence() {
        let media = manager();
        let mut driver = RecordingDriver::new().with_path("/dev/nvme0n1p1");
        let mut hooks = HookStack::new();

        let dev = media
            .initialize(Medium::Nvme, &mut driver, &mut hooks, Path::new("/fx/root"))
            .unwrap();
        assert_eq!(dev, PathBuf::from("/dev/nvme0n1p1"));

        let err = media
            .initialize(Medium::Ssd, &mut driver, &mut hooks, Path::new("/fx/root"))
            .unwrap_err();
        assert!(matches!(err, MediaError::DeviceMissing { .. }));
        assert!(driver.history().is_empty());
    }
}
