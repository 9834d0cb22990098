// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fxmark validate` command - Validate configuration file.

use std::fmt::Display;
use std::path::Path;
use std::process::ExitCode;

use fxmark_core::{ConfigLoader, ConfigMatrix, FxResult};

fn list<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn execute(file: &Path) -> FxResult<ExitCode> {
    tracing::info!(file = %file.display(), "Validating configuration");

    let config = ConfigLoader::load_file(file)?;
    let tasks = ConfigMatrix::from_config(&config).tasks().count();

    println!("✓ Configuration is valid");
    println!();
    println!("Runner Settings:");
    println!("  Disk Size:     {}", config.runner.disk_size);
    println!("  Duration:      {}s", config.runner.duration_secs);
    println!("  Profile Level: {}", config.runner.perfmon_level.level());
    println!("  Filter:        {}", config.runner.filter);
    println!("  Scratch Root:  {}", config.paths.root.display());
    println!("  Log Directory: {}", config.paths.log_dir.display());
    println!();
    println!("Matrix ({} tasks):", tasks);
    println!("  Core Counts:   {}", list(&config.core_counts()));
    println!("  Benchmarks:    {}", list(&config.matrix.benchmarks));
    println!("  Media:         {}", list(&config.matrix.media));
    println!("  I/O Modes:     {}", list(&config.matrix.io_modes));
    println!("  Filesystems:   {}", list(&config.matrix.filesystems));

    Ok(ExitCode::SUCCESS)
}
