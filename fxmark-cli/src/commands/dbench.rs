// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fxmark dbench` command - dbench behind the workload launcher flags.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use fxmark_core::dbench::{self, default_workload_dir, DbenchOptions};
use fxmark_core::{FxResult, SystemDriver};

#[derive(Args)]
pub struct DbenchArgs {
    /// Workload name, selects <workload-dir>/<type>.txt
    #[arg(long = "type")]
    pub workload_type: String,

    /// Number of cores
    #[arg(long)]
    pub ncore: usize,

    /// Background workers (unused)
    #[arg(long)]
    pub nbg: usize,

    /// Benchmark time in seconds
    #[arg(long)]
    pub duration: u64,

    /// Accepted for launcher compatibility, ignored
    #[arg(long)]
    pub directio: Option<u8>,

    /// Benchmark root directory
    #[arg(long)]
    pub root: PathBuf,

    /// Profile begin command
    #[arg(long)]
    pub profbegin: String,

    /// Profile end command
    #[arg(long)]
    pub profend: String,

    /// Profile log path
    #[arg(long)]
    pub proflog: PathBuf,

    /// Directory holding the dbench load files
    #[arg(long)]
    pub workload_dir: Option<PathBuf>,
}

pub fn execute(args: DbenchArgs) -> FxResult<ExitCode> {
    let options = DbenchOptions {
        workload_type: args.workload_type,
        ncore: args.ncore,
        duration_secs: args.duration,
        root: args.root,
        prof_begin: args.profbegin,
        prof_end: args.profend,
        prof_log: args.proflog,
        workload_dir: args.workload_dir.unwrap_or_else(default_workload_dir),
    };
    tracing::debug!(nbg = args.nbg, "dbench ignores background workers");

    let report = dbench::run(&options, &mut SystemDriver::new())?;
    print!("{}", report.render());
    Ok(ExitCode::SUCCESS)
}
