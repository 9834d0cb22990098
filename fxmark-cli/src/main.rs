// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! fxmark CLI
//!
//! Command-line interface for the filesystem scalability benchmark runner.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// fxmark - Filesystem scalability benchmark orchestrator
#[derive(Parser)]
#[command(name = "fxmark")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the benchmark matrix
    Run {
        /// Configuration file; built-in defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run filter, e.g. "mem:*:DWOL:4:directio"
        #[arg(short, long)]
        filter: Option<String>,

        /// Only list the tasks in the run log
        #[arg(long)]
        dry_run: bool,

        /// Sweep the fine-grained core counts
        #[arg(long)]
        fine_grain: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: PathBuf,
    },

    /// Summarize a run log
    Report {
        #[command(subcommand)]
        kind: commands::report::ReportKind,
    },

    /// Profiling collaborator invoked around each workload
    Perfmon {
        #[command(subcommand)]
        action: commands::perfmon::PerfmonAction,
    },

    /// dbench workload launcher
    Dbench(commands::dbench::DbenchArgs),
}

/// Exit status for a command line clap rejected.
fn usage_status(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        ErrorKind::MissingRequiredArgument => 1,
        _ => 2,
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(usage_status(e.kind()));
        }
    };

    // Initialize logging; run log lines go to stdout, diagnostics to stderr
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Dispatch to command handlers
    let result = match cli.command {
        Commands::Run {
            config,
            filter,
            dry_run,
            fine_grain,
        } => commands::run::execute(config.as_deref(), filter.as_deref(), dry_run, fine_grain),
        Commands::Validate { file } => commands::validate::execute(&file),
        Commands::Report { kind } => commands::report::execute(kind),
        Commands::Perfmon { action } => commands::perfmon::execute(action),
        Commands::Dbench(args) => commands::dbench::execute(args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("✗ {}", e);
            ExitCode::FAILURE
        }
    }
}
