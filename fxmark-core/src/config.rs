// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML run configuration with strict validation.
//!
//! Every field has a default, so `{}` is a complete configuration. Any
//! invalid value results in a HardValidationError before a single command
//! is run.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cpu::{coarse_grain_counts, fine_grain_counts, CoreGrain, CpuTopology};
use crate::error::{FxError, FxResult, HardValidationError};
use crate::perfmon::ProfileLevel;
use crate::store::TestKey;
use crate::types::{Benchmark, FsKind, IoMode, Medium};

/// Number of fields of a full test key.
pub const KEY_ARITY: usize = 5;

/// Raw runner section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRunnerConfig {
    #[serde(default = "default_disk_size")]
    disk_size: String,
    #[serde(default = "default_duration")]
    duration_secs: u64,
    #[serde(default)]
    core_grain: CoreGrain,
    #[serde(default)]
    perfmon_level: u32,
    #[serde(default = "default_filter")]
    filter: String,
    #[serde(default)]
    dry_run: bool,
}

fn default_disk_size() -> String {
    "32G".to_string()
}

fn default_duration() -> u64 {
    30
}

fn default_filter() -> String {
    vec!["*"; KEY_ARITY].join(":")
}

impl Default for RawRunnerConfig {
    fn default() -> Self {
        Self {
            disk_size: default_disk_size(),
            duration_secs: default_duration(),
            core_grain: CoreGrain::default(),
            perfmon_level: 0,
            filter: default_filter(),
            dry_run: false,
        }
    }
}

/// Raw paths section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPathsConfig {
    #[serde(default = "default_root")]
    root: String,
    #[serde(default = "default_log_dir")]
    log_dir: String,
    #[serde(default = "default_tmp_dir")]
    tmp_dir: String,
    #[serde(default = "default_fxmark")]
    fxmark: String,
    #[serde(default = "default_filebench")]
    filebench: String,
    #[serde(default)]
    dbench: Option<String>,
    #[serde(default = "default_set_cpus")]
    set_cpus: String,
    #[serde(default = "default_drop_caches")]
    drop_caches: String,
    #[serde(default)]
    perfmon: Option<String>,
}

fn default_root() -> String {
    "root".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_tmp_dir() -> String {
    ".tmp".to_string()
}

fn default_fxmark() -> String {
    "bin/fxmark".to_string()
}

fn default_filebench() -> String {
    "bin/run-filebench".to_string()
}

fn default_set_cpus() -> String {
    "bin/set-cpus".to_string()
}

fn default_drop_caches() -> String {
    "bin/drop-caches".to_string()
}

impl Default for RawPathsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            log_dir: default_log_dir(),
            tmp_dir: default_tmp_dir(),
            fxmark: default_fxmark(),
            filebench: default_filebench(),
            dbench: None,
            set_cpus: default_set_cpus(),
            drop_caches: default_drop_caches(),
            perfmon: None,
        }
    }
}

/// Raw devices section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDevicesConfig {
    #[serde(default = "default_loop_device", rename = "loop")]
    loop_device: String,
    #[serde(default = "default_nvme_device")]
    nvme: String,
    #[serde(default = "default_ssd_device")]
    ssd: String,
    #[serde(default = "default_hdd_device")]
    hdd: String,
}

fn default_loop_device() -> String {
    "/dev/loopX".to_string()
}

fn default_nvme_device() -> String {
    "/dev/nvme0n1pX".to_string()
}

fn default_ssd_device() -> String {
    "/dev/sdY".to_string()
}

fn default_hdd_device() -> String {
    "/dev/sdX".to_string()
}

impl Default for RawDevicesConfig {
    fn default() -> Self {
        Self {
            loop_device: default_loop_device(),
            nvme: default_nvme_device(),
            ssd: default_ssd_device(),
            hdd: default_hdd_device(),
        }
    }
}

/// Raw matrix section. Names are validated into closed enums.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMatrixConfig {
    #[serde(default = "default_media")]
    media: Vec<String>,
    #[serde(default = "default_filesystems")]
    filesystems: Vec<String>,
    #[serde(default = "default_benchmarks")]
    benchmarks: Vec<String>,
    #[serde(default = "default_io_modes")]
    io_modes: Vec<String>,
}

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn default_media() -> Vec<String> {
    strings(&["ssd", "hdd", "nvme", "mem"])
}

fn default_filesystems() -> Vec<String> {
    strings(&["tmpfs", "ext4", "ext4_no_jnl", "xfs", "btrfs", "f2fs"])
}

fn default_benchmarks() -> Vec<String> {
    strings(&[
        // write/write
        "DWAL",
        "DWOL",
        "DWOM",
        "DWSL",
        "MWRL",
        "MWRM",
        "MWCL",
        "MWCM",
        "MWUM",
        "MWUL",
        "DWTL",
        // filebench
        "filebench_varmail",
        "filebench_oltp",
        "filebench_fileserver",
        // dbench
        "dbench_client",
        // read/read
        "MRPL",
        "MRPM",
        "MRPH",
        "MRDM",
        "MRDL",
        "DRBH",
        "DRBM",
        "DRBL",
    ])
}

fn default_io_modes() -> Vec<String> {
    strings(&["bufferedio", "directio"])
}

impl Default for RawMatrixConfig {
    fn default() -> Self {
        Self {
            media: default_media(),
            filesystems: default_filesystems(),
            benchmarks: default_benchmarks(),
            io_modes: default_io_modes(),
        }
    }
}

/// Raw CPU section. Absent entirely means "detect".
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCpuConfig {
    physical_chips: usize,
    cores_per_chip: usize,
    #[serde(default = "default_smt_level")]
    smt_level: usize,
    #[serde(default)]
    core_sequence: Option<Vec<usize>>,
    #[serde(default)]
    fine_grain: Option<Vec<usize>>,
    #[serde(default)]
    coarse_grain: Option<Vec<usize>>,
}

fn default_smt_level() -> usize {
    1
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    runner: RawRunnerConfig,
    #[serde(default)]
    paths: RawPathsConfig,
    #[serde(default)]
    devices: RawDevicesConfig,
    #[serde(default)]
    matrix: RawMatrixConfig,
    #[serde(default)]
    cpu: Option<RawCpuConfig>,
}

/// Validated runner settings.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Size of the memory disk and of tmpfs mounts, e.g. `32G`.
    pub disk_size: String,
    pub duration_secs: u64,
    pub core_grain: CoreGrain,
    pub perfmon_level: ProfileLevel,
    /// Pattern over `(medium, fs, bench, ncore, iomode)`.
    pub filter: TestKey,
    pub dry_run: bool,
}

/// Validated paths. Command lines (`dbench`, `perfmon`) may carry
/// leading arguments such as a sub-command.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub root: PathBuf,
    pub log_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub fxmark: PathBuf,
    pub filebench: PathBuf,
    pub dbench: String,
    pub set_cpus: PathBuf,
    pub drop_caches: PathBuf,
    pub perfmon: String,
}

impl PathsConfig {
    /// Sparse backing file of the memory disk.
    pub fn disk_image(&self) -> PathBuf {
        self.tmp_dir.join("disk.img")
    }
}

/// Block devices per medium.
#[derive(Debug, Clone)]
pub struct DevicesConfig {
    pub loop_device: PathBuf,
    pub nvme: PathBuf,
    pub ssd: PathBuf,
    pub hdd: PathBuf,
}

impl DevicesConfig {
    /// Device a filesystem on `medium` is created on.
    pub fn for_medium(&self, medium: Medium) -> &Path {
        match medium {
            Medium::Mem => &self.loop_device,
            Medium::Nvme => &self.nvme,
            Medium::Ssd => &self.ssd,
            Medium::Hdd => &self.hdd,
        }
    }
}

/// Ordered test dimensions.
#[derive(Debug, Clone)]
pub struct MatrixConfig {
    pub media: Vec<Medium>,
    pub filesystems: Vec<FsKind>,
    pub benchmarks: Vec<Benchmark>,
    pub io_modes: Vec<IoMode>,
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub runner: RunnerConfig,
    pub paths: PathsConfig,
    pub devices: DevicesConfig,
    pub matrix: MatrixConfig,
    pub cpu: CpuTopology,
}

impl Config {
    /// Core counts swept by this configuration.
    pub fn core_counts(&self) -> Vec<usize> {
        self.cpu.core_counts(self.runner.core_grain)
    }
}

/// Command line running a sub-command of this executable.
fn self_command(subcommand: &str) -> String {
    let exe = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "fxmark".to_string());
    format!("{} {}", exe, subcommand)
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> FxResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(FxError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| FxError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> FxResult<Config> {
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| FxError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?
        };

        Self::validate(raw)
    }

    /// All defaults, CPU topology detected from the host.
    pub fn defaults() -> FxResult<Config> {
        Self::validate(RawConfig::default())
    }

    fn validate(raw: RawConfig) -> FxResult<Config> {
        let runner = Self::validate_runner(raw.runner)?;
        let paths = Self::validate_paths(raw.paths)?;
        let devices = DevicesConfig {
            loop_device: PathBuf::from(raw.devices.loop_device),
            nvme: PathBuf::from(raw.devices.nvme),
            ssd: PathBuf::from(raw.devices.ssd),
            hdd: PathBuf::from(raw.devices.hdd),
        };
        let matrix = Self::validate_matrix(raw.matrix)?;
        let cpu = match raw.cpu {
            Some(cpu) => Self::validate_cpu(cpu)?,
            None => CpuTopology::detect()?,
        };

        Ok(Config {
            runner,
            paths,
            devices,
            matrix,
            cpu,
        })
    }

    fn validate_runner(raw: RawRunnerConfig) -> FxResult<RunnerConfig> {
        if !is_valid_size(&raw.disk_size) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "disk_size",
                value: raw.disk_size,
                reason: "Expected a positive size with optional K/M/G/T suffix".to_string(),
            }
            .into());
        }

        if raw.duration_secs == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "duration_secs",
                value: "0".to_string(),
                reason: "Duration must be greater than 0".to_string(),
            }
            .into());
        }

        let perfmon_level = ProfileLevel::from_level(raw.perfmon_level)?;
        let filter = parse_filter(&raw.filter)?;

        Ok(RunnerConfig {
            disk_size: raw.disk_size,
            duration_secs: raw.duration_secs,
            core_grain: raw.core_grain,
            perfmon_level,
            filter,
            dry_run: raw.dry_run,
        })
    }

    fn validate_paths(raw: RawPathsConfig) -> FxResult<PathsConfig> {
        let required = [
            ("root", &raw.root),
            ("log_dir", &raw.log_dir),
            ("tmp_dir", &raw.tmp_dir),
            ("fxmark", &raw.fxmark),
            ("filebench", &raw.filebench),
            ("set_cpus", &raw.set_cpus),
            ("drop_caches", &raw.drop_caches),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(HardValidationError::InvalidFieldValue {
                    field,
                    value: value.clone(),
                    reason: "Path cannot be empty".to_string(),
                }
                .into());
            }
        }

        let dbench = non_empty_command("dbench", raw.dbench, "dbench")?;
        let perfmon = non_empty_command("perfmon", raw.perfmon, "perfmon")?;

        Ok(PathsConfig {
            root: PathBuf::from(raw.root),
            log_dir: PathBuf::from(raw.log_dir),
            tmp_dir: PathBuf::from(raw.tmp_dir),
            fxmark: PathBuf::from(raw.fxmark),
            filebench: PathBuf::from(raw.filebench),
            dbench,
            set_cpus: PathBuf::from(raw.set_cpus),
            drop_caches: PathBuf::from(raw.drop_caches),
            perfmon,
        })
    }

    fn validate_matrix(raw: RawMatrixConfig) -> FxResult<MatrixConfig> {
        let dimensions = [
            ("media", raw.media.is_empty()),
            ("filesystems", raw.filesystems.is_empty()),
            ("benchmarks", raw.benchmarks.is_empty()),
            ("io_modes", raw.io_modes.is_empty()),
        ];
        for (field, empty) in dimensions {
            if empty {
                return Err(HardValidationError::MissingRequiredField {
                    field,
                    context: "matrix".to_string(),
                }
                .into());
            }
        }

        let media = raw
            .media
            .iter()
            .map(|m| m.parse::<Medium>())
            .collect::<Result<Vec<_>, _>>()?;
        let filesystems = raw
            .filesystems
            .iter()
            .map(|f| f.parse::<FsKind>())
            .collect::<Result<Vec<_>, _>>()?;
        let benchmarks = raw
            .benchmarks
            .into_iter()
            .map(Benchmark::new)
            .collect::<Result<Vec<_>, _>>()?;
        let io_modes = raw
            .io_modes
            .iter()
            .map(|m| m.parse::<IoMode>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MatrixConfig {
            media,
            filesystems,
            benchmarks,
            io_modes,
        })
    }

    fn validate_cpu(raw: RawCpuConfig) -> FxResult<CpuTopology> {
        let physical = raw.physical_chips * raw.cores_per_chip;
        let hw_threads = physical * raw.smt_level;

        let topology = CpuTopology {
            physical_chips: raw.physical_chips,
            cores_per_chip: raw.cores_per_chip,
            smt_level: raw.smt_level,
            core_sequence: raw
                .core_sequence
                .unwrap_or_else(|| (0..hw_threads).collect()),
            fine_grain: raw
                .fine_grain
                .unwrap_or_else(|| fine_grain_counts(physical)),
            coarse_grain: raw
                .coarse_grain
                .unwrap_or_else(|| coarse_grain_counts(physical)),
        };

        topology.validate()?;
        Ok(topology)
    }
}

/// `12G`, `512M`, `1024`.
fn is_valid_size(size: &str) -> bool {
    let digits = size.trim_end_matches(['K', 'M', 'G', 'T', 'k', 'm', 'g', 't']);
    let suffix_len = size.len() - digits.len();
    !digits.is_empty()
        && suffix_len <= 1
        && digits.chars().all(|c| c.is_ascii_digit())
        && digits.chars().any(|c| c != '0')
}

/// Parse a colon-separated run filter of up to five fields.
pub fn parse_filter(pattern: &str) -> Result<TestKey, HardValidationError> {
    let fields: Vec<&str> = pattern.split(':').map(str::trim).collect();

    if fields.len() > KEY_ARITY {
        return Err(HardValidationError::InvalidFilter {
            pattern: pattern.to_string(),
            reason: format!("At most {} fields allowed", KEY_ARITY),
        });
    }

    if fields.iter().any(|f| f.is_empty()) {
        return Err(HardValidationError::InvalidFilter {
            pattern: pattern.to_string(),
            reason: "Empty field; use '*' to match anything".to_string(),
        });
    }

    Ok(TestKey::new(fields))
}

fn non_empty_command(
    field: &'static str,
    value: Option<String>,
    subcommand: &str,
) -> Result<String, HardValidationError> {
    match value {
        None => Ok(self_command(subcommand)),
        Some(v) if v.trim().is_empty() => Err(HardValidationError::InvalidFieldValue {
            field,
            value: v,
            reason: "Command cannot be empty".to_string(),
        }),
        Some(v) => Ok(v),
    }
}
