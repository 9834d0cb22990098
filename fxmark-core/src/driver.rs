// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! External command execution.
//!
//! Every OS mutation the orchestrator performs (mounting, formatting, loop
//! devices, CPU hotplug, cache drops, profiling) goes through a
//! [`ResourceDriver`]. The lifecycle code never touches `std::process`
//! directly, so it can be driven by a recording fake in tests (the
//! `testing` feature exports it to integration tests).

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use crate::error::DriverError;

#[cfg(any(test, feature = "testing"))]
pub use recording::{RecordedCommand, RecordingDriver};

/// Exit status reported for a child killed by a signal is `128 + signo`,
/// the shell convention.
const SIGNAL_STATUS_BASE: i32 = 128;

/// A program with its arguments and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// `sudo <program>`.
    pub fn sudo(program: impl Into<String>) -> Self {
        Self::new("sudo").arg(program)
    }

    /// Split a whitespace-separated command line such as
    /// `/usr/bin/fxmark perfmon`. Returns `None` for an empty line.
    pub fn from_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).args(parts))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn environment(&self) -> &[(String, String)] {
        &self.env
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd
    }
}

/// Shell-like rendering, used for logs and for matching scripted
/// responses in tests. Arguments containing whitespace are double-quoted.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, value)?;
        }
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.chars().any(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// What to do with a child's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Discard stdout and stderr.
    Silent,
    /// Collect stdout and stderr, each on its own.
    Captured,
}

/// Exit status and (in captured mode) output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Capability to run external commands and inspect device paths.
pub trait ResourceDriver {
    /// Run to completion. A non-zero exit is reported in the output, not
    /// as an error.
    fn run(&mut self, command: &CommandSpec, mode: OutputMode)
        -> Result<CommandOutput, DriverError>;

    /// Start in the background without waiting.
    fn spawn_detached(&mut self, command: &CommandSpec) -> Result<(), DriverError>;

    fn path_exists(&self, path: &Path) -> bool;
}

/// Runs commands on the host with `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDriver;

impl SystemDriver {
    pub fn new() -> Self {
        Self
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signo)) => SIGNAL_STATUS_BASE + signo,
        (None, None) => -1,
    }
}

impl ResourceDriver for SystemDriver {
    fn run(
        &mut self,
        command: &CommandSpec,
        mode: OutputMode,
    ) -> Result<CommandOutput, DriverError> {
        tracing::debug!(command = %command, ?mode, "Running command");

        let mut cmd = command.to_command();
        cmd.stdin(Stdio::null());

        match mode {
            OutputMode::Silent => {
                let status = cmd
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .map_err(|e| DriverError::SpawnFailed {
                        command: command.to_string(),
                        reason: e.to_string(),
                    })?;

                Ok(CommandOutput {
                    status: exit_code(status),
                    ..CommandOutput::default()
                })
            }
            OutputMode::Captured => {
                let output = cmd.output().map_err(|e| DriverError::OutputFailed {
                    command: command.to_string(),
                    reason: e.to_string(),
                })?;

                Ok(CommandOutput {
                    status: exit_code(output.status),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
        }
    }

    fn spawn_detached(&mut self, command: &CommandSpec) -> Result<(), DriverError> {
        tracing::debug!(command = %command, "Spawning detached command");

        let child = command
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| DriverError::SpawnFailed {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(pid = child.id(), "Detached command started");
        Ok(())
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[cfg(any(test, feature = "testing"))]
mod recording {
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::{CommandOutput, CommandSpec, OutputMode, ResourceDriver};
    use crate::error::DriverError;

    /// Scripted response for commands whose rendering contains `pattern`.
    #[derive(Debug, Clone)]
    struct ScriptRule {
        pattern: String,
        status: i32,
        stdout: String,
        stderr: String,
        remaining: Option<usize>,
        panic: bool,
    }

    /// Raises `flag` when the `nth` command containing `pattern` is seen.
    #[derive(Debug)]
    struct Trigger {
        pattern: String,
        nth: usize,
        seen: usize,
        flag: &'static AtomicBool,
    }

    /// One command seen by a [`RecordingDriver`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedCommand {
        pub command: String,
        pub detached: bool,
    }

    /// Side-effect-free driver that records every command and answers from a
    /// script.
    ///
    /// Rules are consulted newest first; the first rule whose pattern is a
    /// substring of the rendered command and that has uses left decides the
    /// result. Unmatched commands succeed with empty output. A fresh driver
    /// carries one rule making `umount` fail, i.e. nothing is mounted.
    #[derive(Debug)]
    pub struct RecordingDriver {
        rules: Vec<ScriptRule>,
        triggers: Vec<Trigger>,
        paths: HashSet<PathBuf>,
        history: Vec<RecordedCommand>,
    }

    impl Default for RecordingDriver {
        fn default() -> Self {
            Self::new()
        }
    }

    impl RecordingDriver {
        pub fn new() -> Self {
            let mut driver = Self {
                rules: Vec::new(),
                triggers: Vec::new(),
                paths: HashSet::new(),
                history: Vec::new(),
            };
            driver.push_rule("umount", 32, "", "", None, false);
            driver
        }

        fn push_rule(
            &mut self,
            pattern: &str,
            status: i32,
            stdout: &str,
            stderr: &str,
            remaining: Option<usize>,
            panic: bool,
        ) {
            self.rules.push(ScriptRule {
                pattern: pattern.to_string(),
                status,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                remaining,
                panic,
            });
        }

        /// Commands containing `pattern` exit with `status`.
        pub fn fail_on(mut self, pattern: &str, status: i32) -> Self {
            self.push_rule(pattern, status, "", "", None, false);
            self
        }

        /// The next `times` commands containing `pattern` exit with `status`,
        /// after which older rules apply again.
        pub fn status_times(mut self, pattern: &str, status: i32, times: usize) -> Self {
            self.push_rule(pattern, status, "", "", Some(times), false);
            self
        }

        /// Commands containing `pattern` succeed and print `stdout`.
        pub fn respond(self, pattern: &str, stdout: &str) -> Self {
            self.respond_with(pattern, stdout, "")
        }

        /// Like [`respond`](Self::respond), also writing `stderr`.
        pub fn respond_with(mut self, pattern: &str, stdout: &str, stderr: &str) -> Self {
            self.push_rule(pattern, 0, stdout, stderr, None, false);
            self
        }

        /// Commands containing `pattern` panic inside the driver, simulating a
        /// crash in the middle of a run.
        pub fn panic_on(mut self, pattern: &str) -> Self {
            self.push_rule(pattern, 0, "", "", Some(1), true);
            self
        }

        /// Set `flag` when the `nth` (1-based) command containing `pattern`
        /// runs, like a signal arriving while that command is in flight.
        pub fn raise_on(mut self, pattern: &str, nth: usize, flag: &'static AtomicBool) -> Self {
            self.triggers.push(Trigger {
                pattern: pattern.to_string(),
                nth,
                seen: 0,
                flag,
            });
            self
        }

        /// Make `path` visible to [`ResourceDriver::path_exists`].
        pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
            self.paths.insert(path.into());
            self
        }

        pub fn history(&self) -> &[RecordedCommand] {
            &self.history
        }

        /// Rendered commands in execution order.
        pub fn commands(&self) -> Vec<&str> {
            self.history.iter().map(|c| c.command.as_str()).collect()
        }

        /// Number of recorded commands containing `pattern`.
        pub fn count(&self, pattern: &str) -> usize {
            self.history
                .iter()
                .filter(|c| c.command.contains(pattern))
                .count()
        }

        /// Index of the first recorded command containing `pattern`.
        pub fn position(&self, pattern: &str) -> Option<usize> {
            self.history.iter().position(|c| c.command.contains(pattern))
        }

        pub fn clear_history(&mut self) {
            self.history.clear();
        }

        fn record(&mut self, rendered: &str, detached: bool) {
            self.history.push(RecordedCommand {
                command: rendered.to_string(),
                detached,
            });

            for trigger in &mut self.triggers {
                if rendered.contains(trigger.pattern.as_str()) {
                    trigger.seen += 1;
                    if trigger.seen == trigger.nth {
                        trigger.flag.store(true, Ordering::SeqCst);
                    }
                }
            }
        }

        fn answer(&mut self, rendered: &str) -> CommandOutput {
            let rule = self.rules.iter_mut().rev().find(|rule| {
                rendered.contains(rule.pattern.as_str()) && rule.remaining != Some(0)
            });

            match rule {
                Some(rule) => {
                    if let Some(left) = rule.remaining.as_mut() {
                        *left -= 1;
                    }
                    if rule.panic {
                        panic!("scripted panic on '{}'", rendered);
                    }
                    CommandOutput {
                        status: rule.status,
                        stdout: rule.stdout.clone(),
                        stderr: rule.stderr.clone(),
                    }
                }
                None => CommandOutput::default(),
            }
        }
    }

    impl ResourceDriver for RecordingDriver {
        fn run(
            &mut self,
            command: &CommandSpec,
            _mode: OutputMode,
        ) -> Result<CommandOutput, DriverError> {
            let rendered = command.to_string();
            self.record(&rendered, false);
            Ok(self.answer(&rendered))
        }

        fn spawn_detached(&mut self, command: &CommandSpec) -> Result<(), DriverError> {
            let rendered = command.to_string();
            self.record(&rendered, true);

            let output = self.answer(&rendered);
            if output.success() {
                Ok(())
            } else {
                Err(DriverError::SpawnFailed {
                    command: rendered,
                    reason: format!("scripted status {}", output.status),
                })
            }
        }

        fn path_exists(&self, path: &Path) -> bool {
            self.paths.contains(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_rendering() {
        let cmd = CommandSpec::sudo("sh")
            .arg("-c")
            .arg("echo 0 >/proc/sys/kernel/lock_stat");
        assert_eq!(
            cmd.to_string(),
            "sudo sh -c \"echo 0 >/proc/sys/kernel/lock_stat\""
        );

        let cmd = CommandSpec::new("fxmark").env("PERFMON_LEVEL", "0").arg("--ncore");
        assert_eq!(cmd.to_string(), "PERFMON_LEVEL=0 fxmark --ncore");
    }

    #[test]
    fn test_from_line() {
        let cmd = CommandSpec::from_line("/opt/fxmark perfmon start").unwrap();
        assert_eq!(cmd.program(), "/opt/fxmark");
        assert_eq!(cmd.arguments(), ["perfmon", "start"]);
        assert!(CommandSpec::from_line("   ").is_none());
    }

    #[test]
    fn test_recording_driver_rules() {
        let mut driver = RecordingDriver::new()
            .fail_on("mkfs", 1)
            .respond("uname", "Linux box");

        let mkfs = CommandSpec::sudo("mkfs.ext4").arg("/dev/loop0");
        assert_eq!(driver.run(&mkfs, OutputMode::Silent).unwrap().status, 1);

        let uname = CommandSpec::new("uname").arg("-a");
        let out = driver.run(&uname, OutputMode::Captured).unwrap();
        assert_eq!(out.stdout, "Linux box");

        let umount = CommandSpec::sudo("umount").arg("/mnt");
        assert!(!driver.run(&umount, OutputMode::Silent).unwrap().success());

        let sync = CommandSpec::new("sync");
        assert!(driver.run(&sync, OutputMode::Silent).unwrap().success());

        assert_eq!(driver.commands().len(), 4);
        assert_eq!(driver.count("mkfs"), 1);
    }

    #[test]
    fn test_status_times_expires() {
        let mut driver = RecordingDriver::new().status_times("umount", 0, 2);
        let umount = CommandSpec::sudo("umount").arg("/mnt");

        let statuses: Vec<i32> = (0..3)
            .map(|_| driver.run(&umount, OutputMode::Silent).unwrap().status)
            .collect();
        assert_eq!(statuses, vec![0, 0, 32]);
    }

    #[test]
    fn test_system_driver_status() {
        let mut driver = SystemDriver::new();
        let ok = driver
            .run(&CommandSpec::new("true"), OutputMode::Silent)
            .unwrap();
        assert!(ok.success());

        let echo = driver
            .run(
                &CommandSpec::new("echo").arg("hello"),
                OutputMode::Captured,
            )
            .unwrap();
        assert_eq!(echo.stdout.trim(), "hello");

        let missing = driver.run(
            &CommandSpec::new("/nonexistent/fxmark-helper"),
            OutputMode::Silent,
        );
        assert!(matches!(missing, Err(DriverError::SpawnFailed { .. })));
    }

    #[test]
    fn test_captured_streams_stay_apart() {
        let mut driver = SystemDriver::new();
        let out = driver
            .run(
                &CommandSpec::new("sh")
                    .arg("-c")
                    .arg("echo '2 30.0 100 3.33'; echo 'WARN helper failed' >&2"),
                OutputMode::Captured,
            )
            .unwrap();

        assert_eq!(out.stdout, "2 30.0 100 3.33\n");
        assert_eq!(out.stderr, "WARN helper failed\n");
    }

    #[test]
    fn test_raise_on_nth_match() {
        use std::sync::atomic::{AtomicBool, Ordering};
        static FLAG: AtomicBool = AtomicBool::new(false);

        let mut driver = RecordingDriver::new().raise_on("fxmark", 2, &FLAG);
        let cmd = CommandSpec::new("fxmark").arg("--type").arg("DWAL");

        driver.run(&cmd, OutputMode::Captured).unwrap();
        assert!(!FLAG.load(Ordering::SeqCst));
        driver.run(&cmd, OutputMode::Captured).unwrap();
        assert!(FLAG.load(Ordering::SeqCst));
    }
}
