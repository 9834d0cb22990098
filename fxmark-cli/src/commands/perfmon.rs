// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fxmark perfmon` command - Profiling start/stop for workloads.

use std::process::ExitCode;

use clap::Subcommand;
use fxmark_core::perfmon::{Perfmon, PerfmonSettings};
use fxmark_core::{FxResult, SystemDriver};

#[derive(Subcommand)]
pub enum PerfmonAction {
    /// Sample CPU time and start the collectors for PERFMON_LEVEL
    Start,
    /// Stop the collectors and write the CPU time report
    Stop,
}

pub fn execute(action: PerfmonAction) -> FxResult<ExitCode> {
    let settings = PerfmonSettings::from_env()?;
    tracing::debug!(
        level = settings.level.level(),
        file = %settings.stat_path().display(),
        "perfmon"
    );

    let perfmon = Perfmon::new(settings);
    let mut driver = SystemDriver::new();
    match action {
        PerfmonAction::Start => perfmon.start(&mut driver)?,
        PerfmonAction::Stop => perfmon.stop(&mut driver)?,
    }
    Ok(ExitCode::SUCCESS)
}
