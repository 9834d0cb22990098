// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fxmark report` command - Summaries of an existing run log.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Subcommand;
use fxmark_core::report::{relative_performance, time_breakdown};
use fxmark_core::{FxResult, MeasurementStore, QueryEngine};

#[derive(Subcommand)]
pub enum ReportKind {
    /// Throughput per core count relative to the first one
    Perf {
        log: PathBuf,
        fs: String,
        bench: String,

        /// Storage medium to select
        #[arg(long, default_value = "mem")]
        medium: String,
    },

    /// User/sys/idle/iowait seconds of one core count
    Time {
        log: PathBuf,
        fs: String,
        bench: String,
        core: String,
        /// Share of sys time spent in sync, in percent
        sync_percent: f64,

        /// Storage medium to select
        #[arg(long, default_value = "mem")]
        medium: String,
    },
}

pub fn execute(kind: ReportKind) -> FxResult<ExitCode> {
    match kind {
        ReportKind::Perf {
            log,
            fs,
            bench,
            medium,
        } => {
            let store = MeasurementStore::load_file(&log)?;
            let rows = relative_performance(&QueryEngine::new(&store), &medium, &fs, &bench)?;
            for row in rows {
                println!("{}", row);
            }
        }
        ReportKind::Time {
            log,
            fs,
            bench,
            core,
            sync_percent,
            medium,
        } => {
            let store = MeasurementStore::load_file(&log)?;
            let rows = time_breakdown(
                &QueryEngine::new(&store),
                &medium,
                &fs,
                &bench,
                &core,
                sync_percent,
            )?;
            for row in rows {
                println!("{}", row);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
