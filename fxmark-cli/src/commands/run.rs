// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fxmark run` command - Run the benchmark matrix.

use std::path::Path;
use std::process::ExitCode;

use fxmark_core::config::parse_filter;
use fxmark_core::cpu::CoreGrain;
use fxmark_core::{signal, ConfigLoader, FxResult, Runner, SystemDriver};

pub fn execute(
    config_path: Option<&Path>,
    filter: Option<&str>,
    dry_run: bool,
    fine_grain: bool,
) -> FxResult<ExitCode> {
    let mut config = match config_path {
        Some(path) => {
            tracing::info!(config = %path.display(), "Loading configuration");
            ConfigLoader::load_file(path)?
        }
        None => ConfigLoader::defaults()?,
    };

    if let Some(filter) = filter {
        config.runner.filter = parse_filter(filter)?;
    }
    if dry_run {
        config.runner.dry_run = true;
    }
    if fine_grain {
        config.runner.core_grain = CoreGrain::Fine;
    }

    // Before any resource is touched.
    signal::install()?;

    let mut runner = Runner::new(config, SystemDriver::new()).with_echo(true);
    let summary = runner.run()?;

    println!();
    println!("Run log:        {}", summary.log_path.display());
    println!("Configurations: {}", summary.configurations);
    println!("Executed:       {}", summary.executed);
    if summary.mount_failures > 0 {
        println!("Mount failures: {}", summary.mount_failures);
    }
    if summary.workload_failures > 0 {
        println!("Failed runs:    {}", summary.workload_failures);
    }

    if summary.interrupted {
        eprintln!("✗ Run interrupted");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
