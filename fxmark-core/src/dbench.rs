// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! dbench launcher speaking the workload command-line protocol.
//!
//! dbench reports only throughput, so the `works` column is always 0.

use std::path::{Path, PathBuf};

use crate::driver::{CommandSpec, OutputMode, ResourceDriver};
use crate::error::{FxError, FxResult};

/// Marker preceding the throughput figure in dbench's summary.
pub const THROUGHPUT_MARKER: &str = "Throughput";

/// Directory of `<type>.txt` load files next to the executable.
pub const WORKLOAD_DIR_NAME: &str = "dbench-workloads";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbenchOptions {
    pub workload_type: String,
    pub ncore: usize,
    pub duration_secs: u64,
    pub root: PathBuf,
    pub prof_begin: String,
    pub prof_end: String,
    pub prof_log: PathBuf,
    pub workload_dir: PathBuf,
}

impl DbenchOptions {
    pub fn load_file(&self) -> PathBuf {
        self.workload_dir
            .join(format!("{}.txt", self.workload_type))
    }

    pub fn command(&self) -> CommandSpec {
        CommandSpec::sudo("dbench")
            .arg(self.ncore.to_string())
            .arg("-t")
            .arg(self.duration_secs.to_string())
            .arg("-c")
            .arg(self.load_file().display().to_string())
            .arg("-D")
            .arg(self.root.display().to_string())
    }
}

/// `<exe dir>/dbench-workloads`, or a relative one if the executable path
/// is unknown.
pub fn default_workload_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(WORKLOAD_DIR_NAME)))
        .unwrap_or_else(|| PathBuf::from(WORKLOAD_DIR_NAME))
}

/// First token after the throughput marker, e.g. `640.759` from
/// `Throughput 640.759 MB/sec  32 clients  32 procs  max_latency=464.544 ms`.
pub fn parse_throughput(output: &str) -> Option<&str> {
    output
        .lines()
        .find_map(|line| line.split_once(THROUGHPUT_MARKER))
        .and_then(|(_, rest)| rest.split_whitespace().next())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbenchReport {
    pub ncore: usize,
    pub duration_secs: u64,
    pub throughput: String,
    /// Schema and value lines written by perfmon, empty without profiling.
    pub profile_schema: String,
    pub profile_values: String,
}

impl DbenchReport {
    /// Schema line and value line.
    pub fn render(&self) -> String {
        format!(
            "# ncpu secs works works/sec {}\n{} {} 0 {} {}\n",
            self.profile_schema,
            self.ncore,
            self.duration_secs,
            self.throughput,
            self.profile_values
        )
    }
}

fn read_profile(path: &Path) -> (String, String) {
    let Ok(text) = std::fs::read_to_string(path) else {
        return Default::default();
    };

    let mut lines = text.lines();
    match (lines.next(), lines.next()) {
        (Some(schema), Some(values)) => (schema.trim().to_string(), values.trim().to_string()),
        _ => Default::default(),
    }
}

fn run_profiler(driver: &mut dyn ResourceDriver, line: &str) {
    let Some(cmd) = CommandSpec::from_line(line) else {
        return;
    };
    match driver.run(&cmd, OutputMode::Silent) {
        Ok(out) if !out.success() => {
            tracing::warn!(command = %cmd, status = out.status, "Profiler command failed")
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(command = %cmd, error = %e, "Profiler command failed"),
    }
}

/// Run dbench between the profiling brackets and collect its report.
pub fn run(options: &DbenchOptions, driver: &mut dyn ResourceDriver) -> FxResult<DbenchReport> {
    run_profiler(driver, &options.prof_begin);

    let command = options.command();
    let output = driver.run(&command, OutputMode::Captured)?;
    for line in output.stdout.lines() {
        tracing::debug!(target: "dbench", "{}", line);
    }

    run_profiler(driver, &options.prof_end);

    let throughput = parse_throughput(&output.stdout)
        .ok_or_else(|| FxError::WorkloadOutput {
            message: format!("'{}' exited {} without '{}'", command, output.status, THROUGHPUT_MARKER),
        })?
        .to_string();

    let (profile_schema, profile_values) = read_profile(&options.prof_log);
    Ok(DbenchReport {
        ncore: options.ncore,
        duration_secs: options.duration_secs,
        throughput,
        profile_schema,
        profile_values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RecordingDriver;

    const OUTPUT: &str = "\
dbench version 4.00 - Copyright Andrew Tridgell 1999-2004
   4     12345   640.76 MB/sec  execute  29 sec  latency 2.345 ms
Throughput 640.759 MB/sec  4 clients  4 procs  max_latency=464.544 ms
";

    fn options(prof_log: PathBuf) -> DbenchOptions {
        DbenchOptions {
            workload_type: "client".to_string(),
            ncore: 4,
            duration_secs: 30,
            root: PathBuf::from("/fx/root"),
            prof_begin: "/fx/perfmon start".to_string(),
            prof_end: "/fx/perfmon stop".to_string(),
            prof_log,
            workload_dir: PathBuf::from("/fx/dbench-workloads"),
        }
    }

    #[test]
    fn test_parse_throughput() {
        assert_eq!(parse_throughput(OUTPUT), Some("640.759"));
        assert_eq!(parse_throughput("no summary\n"), None);
    }

    #[test]
    fn test_run_brackets_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let pm = dir.path().join("mem.ext4.dbench_client.4.pm");
        std::fs::write(&pm, "user.sec sys.sec\n1.5 2\n").unwrap();

        let mut driver = RecordingDriver::new().respond("sudo dbench", OUTPUT);
        let report = run(&options(pm), &mut driver).unwrap();

        assert_eq!(
            driver.commands(),
            vec![
                "/fx/perfmon start",
                "sudo dbench 4 -t 30 -c /fx/dbench-workloads/client.txt -D /fx/root",
                "/fx/perfmon stop",
            ]
        );
        assert_eq!(
            report.render(),
            "# ncpu secs works works/sec user.sec sys.sec\n4 30 0 640.759 1.5 2\n"
        );
    }

    #[test]
    fn test_missing_throughput_is_an_error() {
        let mut driver = RecordingDriver::new().respond("sudo dbench", "error\n");
        let err = run(&options(PathBuf::from("/nonexistent.pm")), &mut driver).unwrap_err();
        assert!(matches!(err, FxError::WorkloadOutput { .. }));
        assert_eq!(driver.count("perfmon stop"), 1);
    }
}
