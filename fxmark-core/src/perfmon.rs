// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Profiling collaborator behind `fxmark perfmon start|stop`.
//!
//! Workloads call `start` right before and `stop` right after their
//! measurement window. Level 0 samples the aggregate `cpu` line of
//! `/proc/stat` and leaves a schema line and a value line in the stat
//! file, which the workload appends to its own report. Higher levels also
//! drive `perf` as an external command.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::driver::{CommandSpec, OutputMode, ResourceDriver};
use crate::error::{FxError, FxResult, HardValidationError};

pub const ENV_LEVEL: &str = "PERFMON_LEVEL";
pub const ENV_DIR: &str = "PERFMON_LDIR";
pub const ENV_FILE: &str = "PERFMON_LFILE";

pub const DEFAULT_DIR: &str = ".";
pub const DEFAULT_FILE: &str = "_perfmon.stat";
pub const PROC_STAT_PATH: &str = "/proc/stat";

/// Seconds `perf stat` samples for when no duration is given.
pub const DEFAULT_STAT_DURATION_SECS: u64 = 30;

const PERF_SAMPLE_RATE: u32 = 1000;

/// Columns of one CPU time sample. `real` is wall-clock time, the rest are
/// the `/proc/stat` counters in order.
pub const CPU_STAT: [&str; 10] = [
    "real", "user", "nice", "sys", "idle", "iowait", "irq", "softirq", "steal", "guest",
];

/// Sleepable lock entry points traced by the probe levels.
const PROBE_SLEEP_LOCK: &[&str] = &[
    "mutex_lock",
    "mutex_trylock",
    "mutex_lock_killable",
    "down_read",
    "down_read_trylock",
    "down_write",
    "down_write_trylock",
    "downgrade_write",
    "down",
    "io_schedule_timeout",
    "schedule",
    "preempt_schedule_common",
];

/// Profiling depth, selected by `PERFMON_LEVEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProfileLevel {
    /// CPU time accounting only.
    #[default]
    Low,
    PerfRecord,
    /// Probe-based `perf record` on sleepable locks, capturing `%ax`.
    ProbeSleepLockD,
    /// Cycle and instruction counters.
    PerfStat,
    ProbeSleepLock,
    /// `perf lock record`; needs lockdep and lock_stat in the kernel.
    PerfLock,
}

impl ProfileLevel {
    pub fn from_level(level: u32) -> Result<Self, HardValidationError> {
        match level {
            0 => Ok(Self::Low),
            1 => Ok(Self::PerfRecord),
            2 => Ok(Self::ProbeSleepLockD),
            3 => Ok(Self::PerfStat),
            998 => Ok(Self::ProbeSleepLock),
            999 => Ok(Self::PerfLock),
            other => Err(HardValidationError::InvalidFieldValue {
                field: "perfmon_level",
                value: other.to_string(),
                reason: "Expected one of 0, 1, 2, 3, 998, 999".to_string(),
            }),
        }
    }

    pub const fn level(&self) -> u32 {
        match self {
            Self::Low => 0,
            Self::PerfRecord => 1,
            Self::ProbeSleepLockD => 2,
            Self::PerfStat => 3,
            Self::ProbeSleepLock => 998,
            Self::PerfLock => 999,
        }
    }
}

/// Where a profiling session writes, as passed through the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfmonSettings {
    pub level: ProfileLevel,
    pub dir: PathBuf,
    pub file: String,
}

impl PerfmonSettings {
    /// Read `PERFMON_LEVEL`, `PERFMON_LDIR` and `PERFMON_LFILE`, falling back
    /// to level 0, `.` and `_perfmon.stat`.
    pub fn from_env() -> Result<Self, HardValidationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, HardValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let level = match lookup(ENV_LEVEL) {
            None => ProfileLevel::Low,
            Some(raw) => {
                let value = raw.trim().parse::<u32>().map_err(|_| {
                    HardValidationError::InvalidFieldValue {
                        field: "PERFMON_LEVEL",
                        value: raw.clone(),
                        reason: "Expected an integer".to_string(),
                    }
                })?;
                ProfileLevel::from_level(value)?
            }
        };

        Ok(Self {
            level,
            dir: PathBuf::from(lookup(ENV_DIR).unwrap_or_else(|| DEFAULT_DIR.to_string())),
            file: lookup(ENV_FILE).unwrap_or_else(|| DEFAULT_FILE.to_string()),
        })
    }

    /// Stat file path. An absolute `file` wins over `dir`.
    pub fn stat_path(&self) -> PathBuf {
        self.dir.join(&self.file)
    }

    /// Sibling output file named `<file><suffix>` inside `dir`.
    fn output(&self, suffix: &str) -> String {
        let mut path = self.stat_path().into_os_string();
        path.push(suffix);
        PathBuf::from(path).display().to_string()
    }

    /// The environment a workload hands back to `perfmon`.
    pub fn env(&self) -> Vec<(String, String)> {
        vec![
            (ENV_LEVEL.to_string(), self.level.level().to_string()),
            (ENV_DIR.to_string(), self.dir.display().to_string()),
            (ENV_FILE.to_string(), self.file.clone()),
        ]
    }
}

/// Seconds since the epoch, the `real` column.
fn wall_clock() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Kernel clock ticks per second.
pub fn clock_ticks() -> f64 {
    match nix::unistd::sysconf(nix::unistd::SysconfVar::CLK_TCK) {
        Ok(Some(ticks)) if ticks > 0 => ticks as f64,
        _ => 100.0,
    }
}

/// Extract one CPU time sample (seconds) from `/proc/stat` text.
pub fn parse_cpu_sample(proc_stat: &str, clk_tck: f64, real: f64) -> Option<Vec<f64>> {
    let line = proc_stat.lines().find(|l| l.starts_with("cpu "))?;

    let mut sample = vec![real];
    for field in line.split_whitespace().skip(1).take(CPU_STAT.len() - 1) {
        let ticks: u64 = field.parse().ok()?;
        sample.push(ticks as f64 / clk_tck);
    }
    Some(sample)
}

/// Schema and value lines for the difference of two samples: `<stat>.sec`
/// for every column, then `<stat>.util` percentages of everything but
/// `real`.
pub fn render_delta(start: &[f64], stop: &[f64]) -> (String, String) {
    let delta: Vec<f64> = stop.iter().zip(start).map(|(b, a)| b - a).collect();
    let total: f64 = delta.iter().skip(1).sum();

    let mut values = delta.clone();
    values.extend(delta.iter().skip(1).map(|d| {
        if total > 0.0 {
            d / total * 100.0
        } else {
            0.0
        }
    }));

    let names: Vec<String> = CPU_STAT
        .iter()
        .take(delta.len())
        .map(|s| format!("{}.sec", s))
        .chain(
            CPU_STAT
                .iter()
                .take(delta.len())
                .skip(1)
                .map(|s| format!("{}.util", s)),
        )
        .collect();

    let values: Vec<String> = values.iter().map(|v| format_general(*v)).collect();
    (names.join(" "), values.join(" "))
}

/// printf `%g`: six significant digits, trailing zeros dropped.
pub fn format_general(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return if value.is_finite() {
            "0".to_string()
        } else {
            value.to_string()
        };
    }

    let exponent = value.abs().log10().floor() as i32;
    if (-4..6).contains(&exponent) {
        let decimals = (5 - exponent).max(0) as usize;
        trim_fraction(format!("{:.*}", decimals, value))
    } else {
        let rendered = format!("{:.5e}", value);
        match rendered.split_once('e') {
            Some((mantissa, exp)) => {
                let exp: i32 = exp.parse().unwrap_or_default();
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{}e{}{:02}", trim_fraction(mantissa.to_string()), sign, exp.abs())
            }
            None => rendered,
        }
    }
}

fn trim_fraction(text: String) -> String {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

/// One `perfmon` invocation.
#[derive(Debug, Clone)]
pub struct Perfmon {
    settings: PerfmonSettings,
    proc_stat: PathBuf,
    duration_secs: u64,
}

impl Perfmon {
    pub fn new(settings: PerfmonSettings) -> Self {
        Self {
            settings,
            proc_stat: PathBuf::from(PROC_STAT_PATH),
            duration_secs: DEFAULT_STAT_DURATION_SECS,
        }
    }

    /// Read CPU counters from `path` instead of `/proc/stat`.
    pub fn with_proc_stat(mut self, path: impl Into<PathBuf>) -> Self {
        self.proc_stat = path.into();
        self
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn settings(&self) -> &PerfmonSettings {
        &self.settings
    }

    pub fn start(&self, driver: &mut dyn ResourceDriver) -> FxResult<()> {
        tracing::debug!(level = self.settings.level.level(), "perfmon start");
        self.cpu_stat_start()?;

        match self.settings.level {
            ProfileLevel::Low => {}
            ProfileLevel::PerfRecord => {
                let cmd = CommandSpec::sudo("perf")
                    .args(["record", "-F"])
                    .arg(PERF_SAMPLE_RATE.to_string())
                    .args(["-a", "-g", "-o"])
                    .arg(self.settings.output(".perf.data"));
                driver.spawn_detached(&cmd)?;
            }
            ProfileLevel::ProbeSleepLock => self.probe_sleep_lock_start(driver, "")?,
            ProfileLevel::ProbeSleepLockD => self.probe_sleep_lock_start(driver, "%ax")?,
            ProfileLevel::PerfStat => {
                let cmd = CommandSpec::sudo("perf")
                    .args(["stat", "-a", "-g", "-o"])
                    .arg(self.settings.output(".perf.stat.data"))
                    .arg("sleep")
                    .arg(self.duration_secs.to_string());
                driver.spawn_detached(&cmd)?;
            }
            ProfileLevel::PerfLock => {
                run_quiet(driver, &lock_stat_command(1));
                let cmd = CommandSpec::sudo("perf")
                    .args(["lock", "record", "-a", "-g", "-o"])
                    .arg(self.settings.output(".perf.lock.data"));
                driver.spawn_detached(&cmd)?;
            }
        }
        Ok(())
    }

    /// Stop every collector. Collector failures are logged, never raised,
    /// except for the CPU time accounting whose output the workload needs.
    pub fn stop(&self, driver: &mut dyn ResourceDriver) -> FxResult<()> {
        tracing::debug!(level = self.settings.level.level(), "perfmon stop");

        match self.settings.level {
            ProfileLevel::Low => {}
            ProfileLevel::PerfRecord => perf_stop(driver),
            ProfileLevel::ProbeSleepLock | ProfileLevel::ProbeSleepLockD => {
                perf_stop(driver);
                run_quiet(driver, &probe_cleanup());
            }
            // `perf stat` ends by itself with its sleep.
            ProfileLevel::PerfStat => {}
            ProfileLevel::PerfLock => {
                run_quiet(driver, &lock_stat_command(0));
                perf_stop(driver);
                let copy = CommandSpec::sudo("cp")
                    .arg("/proc/lock_stat")
                    .arg(self.settings.output(".perf.lock_stat"));
                run_quiet(driver, &copy);
            }
        }

        self.cpu_stat_stop()
    }

    fn probe_sleep_lock_start(&self, driver: &mut dyn ResourceDriver, arg0: &str) -> FxResult<()> {
        run_quiet(driver, &probe_cleanup());
        for probe in PROBE_SLEEP_LOCK {
            let spec = format!("{} {}", probe, arg0);
            let add = CommandSpec::sudo("perf")
                .args(["probe", "--add"])
                .arg(spec.trim());
            run_quiet(driver, &add);
        }

        let output = match arg0.strip_prefix('%') {
            Some(reg) => self.settings.output(&format!(".perf.sleeplock.{}.data", reg)),
            None => self.settings.output(".perf.sleeplock.data"),
        };

        let mut cmd = CommandSpec::sudo("perf").arg("record");
        for probe in PROBE_SLEEP_LOCK {
            cmd = cmd.arg("-e").arg(format!("probe:{}", probe));
        }
        let cmd = cmd
            .arg("-F")
            .arg(PERF_SAMPLE_RATE.to_string())
            .args(["-a", "-g", "-o"])
            .arg(output);
        driver.spawn_detached(&cmd)?;
        Ok(())
    }

    fn sample(&self) -> FxResult<Vec<f64>> {
        let text = std::fs::read_to_string(&self.proc_stat).map_err(|e| FxError::Io {
            context: "reading CPU statistics",
            source: e,
        })?;

        parse_cpu_sample(&text, clock_ticks(), wall_clock()).ok_or_else(|| FxError::Syscall {
            syscall: "proc_stat",
            message: format!("no aggregate cpu line in {}", self.proc_stat.display()),
        })
    }

    fn cpu_stat_start(&self) -> FxResult<()> {
        let sample = self.sample()?;
        let line: Vec<String> = sample.iter().map(|v| v.to_string()).collect();
        write_stat(&self.settings.stat_path(), &format!("{}\n", line.join(" ")))
    }

    fn cpu_stat_stop(&self) -> FxResult<()> {
        let stop = self.sample()?;
        let path = self.settings.stat_path();

        let text = std::fs::read_to_string(&path).map_err(|e| FxError::Io {
            context: "reading perfmon start sample",
            source: e,
        })?;
        let start: Vec<f64> = text
            .lines()
            .next()
            .unwrap_or_default()
            .split_whitespace()
            .filter_map(|v| v.parse().ok())
            .collect();

        let (schema, values) = render_delta(&start, &stop);
        write_stat(&path, &format!("{}\n{}\n", schema, values))
    }
}

fn write_stat(path: &Path, content: &str) -> FxResult<()> {
    std::fs::write(path, content).map_err(|e| FxError::Io {
        context: "writing perfmon stat file",
        source: e,
    })
}

/// Toggle kernel lock statistics collection.
pub fn lock_stat_command(value: u8) -> CommandSpec {
    CommandSpec::sudo("sh")
        .arg("-c")
        .arg(format!("echo {} >/proc/sys/kernel/lock_stat", value))
}

fn probe_cleanup() -> CommandSpec {
    CommandSpec::sudo("perf").args(["probe", "--del", "*"])
}

fn perf_stop(driver: &mut dyn ResourceDriver) {
    run_quiet(driver, &CommandSpec::sudo("pkill").args(["-INT", "perf"]));
}

fn run_quiet(driver: &mut dyn ResourceDriver, command: &CommandSpec) {
    if let Err(e) = driver.run(command, OutputMode::Silent) {
        tracing::warn!(command = %command, error = %e, "perfmon helper failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RecordingDriver;

    const PROC_STAT: &str = "\
cpu  1000 20 300 5000 40 0 10 0 0 0
cpu0 500 10 150 2500 20 0 5 0 0 0
intr 12345
";

    #[test]
    fn test_profile_levels() {
        for level in [0, 1, 2, 3, 998, 999] {
            assert_eq!(ProfileLevel::from_level(level).unwrap().level(), level);
        }
        assert!(ProfileLevel::from_level(4).is_err());
    }

    #[test]
    fn test_settings_defaults() {
        let settings = PerfmonSettings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.level, ProfileLevel::Low);
        assert_eq!(settings.stat_path(), PathBuf::from("./_perfmon.stat"));
    }

    #[test]
    fn test_settings_absolute_file_wins() {
        let settings = PerfmonSettings::from_lookup(|key| match key {
            ENV_LEVEL => Some("1".to_string()),
            ENV_DIR => Some("/logs/run".to_string()),
            ENV_FILE => Some("/logs/run/mem.ext4.DWAL.4.pm".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(settings.level, ProfileLevel::PerfRecord);
        assert_eq!(
            settings.stat_path(),
            PathBuf::from("/logs/run/mem.ext4.DWAL.4.pm")
        );
        assert_eq!(
            settings.output(".perf.data"),
            "/logs/run/mem.ext4.DWAL.4.pm.perf.data"
        );
    }

    #[test]
    fn test_settings_bad_level() {
        let result = PerfmonSettings::from_lookup(|key| {
            (key == ENV_LEVEL).then(|| "high".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_cpu_sample() {
        let sample = parse_cpu_sample(PROC_STAT, 100.0, 7.0).unwrap();
        assert_eq!(sample.len(), 10);
        assert_eq!(sample[0], 7.0);
        assert_eq!(sample[1], 10.0);
        assert_eq!(sample[4], 50.0);
        assert!(parse_cpu_sample("intr 1\n", 100.0, 0.0).is_none());
    }

    #[test]
    fn test_render_delta() {
        let start = [0.0, 1.0, 0.0, 1.0, 1.0];
        let stop = [30.0, 4.0, 0.0, 2.0, 7.0];
        let (schema, values) = render_delta(&start, &stop);
        assert_eq!(
            schema,
            "real.sec user.sec nice.sec sys.sec idle.sec user.util nice.util sys.util idle.util"
        );
        assert_eq!(values, "30 3 0 1 6 30 0 10 60");
    }

    #[test]
    fn test_format_general() {
        assert_eq!(format_general(0.0), "0");
        assert_eq!(format_general(3.0), "3");
        assert_eq!(format_general(3.3333333), "3.33333");
        assert_eq!(format_general(123456.7), "123457");
        assert_eq!(format_general(1234567.0), "1.23457e+06");
        assert_eq!(format_general(0.00012), "0.00012");
        assert_eq!(format_general(-2.5), "-2.5");
    }

    #[test]
    fn test_low_level_session_writes_stat_lines() {
        let dir = tempfile::tempdir().unwrap();
        let proc_stat = dir.path().join("stat");
        std::fs::write(&proc_stat, PROC_STAT).unwrap();

        let settings = PerfmonSettings {
            level: ProfileLevel::Low,
            dir: dir.path().to_path_buf(),
            file: "run.pm".to_string(),
        };
        let perfmon = Perfmon::new(settings).with_proc_stat(&proc_stat);
        let mut driver = RecordingDriver::new();

        perfmon.start(&mut driver).unwrap();
        perfmon.stop(&mut driver).unwrap();

        let text = std::fs::read_to_string(dir.path().join("run.pm")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("real.sec user.sec"));
        assert_eq!(lines[1].split_whitespace().count(), 19);
        assert!(driver.history().is_empty());
    }

    #[test]
    fn test_perf_record_level_drives_perf() {
        let dir = tempfile::tempdir().unwrap();
        let proc_stat = dir.path().join("stat");
        std::fs::write(&proc_stat, PROC_STAT).unwrap();

        let settings = PerfmonSettings {
            level: ProfileLevel::PerfRecord,
            dir: dir.path().to_path_buf(),
            file: "run.pm".to_string(),
        };
        let perfmon = Perfmon::new(settings).with_proc_stat(&proc_stat);
        let mut driver = RecordingDriver::new();

        perfmon.start(&mut driver).unwrap();
        perfmon.stop(&mut driver).unwrap();

        let history = driver.history();
        assert_eq!(history.len(), 2);
        assert!(history[0].detached);
        assert!(history[0].command.starts_with("sudo perf record -F 1000 -a -g -o "));
        assert_eq!(history[1].command, "sudo pkill -INT perf");
    }
}
