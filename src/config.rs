use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the project template location
pub const TEMPLATE_DIR_ENV: &str = "PAKE_TEMPLATE_DIR";

/// Top‑level packager configuration (`pake.toml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Tauri shell project copied into every job's staging tree
    pub template_dir: PathBuf,
    /// Parent of the per-invocation working directory
    pub work_dir: PathBuf,
    /// Where finished bundles are copied
    pub output_dir: PathBuf,
    pub max_parallel_jobs: usize,
    pub build_timeout_secs: u64,
    /// Keep staged projects after the run (debugging aid)
    pub keep_work_dir: bool,
    /// Version written into the generated package metadata
    pub app_version: String,
    pub toolchain: ToolchainSettings,
}

/// How to invoke the native build toolchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSettings {
    pub program: String,
    pub build_args: Vec<String>,
    pub version_args: Vec<String>,
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            program: "cargo".into(),
            build_args: vec!["tauri".into(), "build".into()],
            version_args: vec!["tauri".into(), "--version".into()],
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            template_dir: dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("pake")
                .join("template"),
            work_dir: std::env::temp_dir(),
            output_dir: PathBuf::from("."),
            max_parallel_jobs: 2,
            build_timeout_secs: 3600,
            keep_work_dir: false,
            app_version: "1.0.0".into(),
            toolchain: ToolchainSettings::default(),
        }
    }
}

impl Settings {
    /// Default config location: `<config dir>/pake/pake.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pake").join("pake.toml"))
    }

    /// Load settings from `path`, or from the default location when it exists,
    /// falling back to built-in defaults. `PAKE_TEMPLATE_DIR` wins over both.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    log::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        if let Some(dir) = std::env::var_os(TEMPLATE_DIR_ENV) {
            settings.template_dir = PathBuf::from(dir);
        }
        settings.max_parallel_jobs = settings.max_parallel_jobs.max(1);
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let settings: Settings = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        log::info!("Using config from: {}", path.display());
        Ok(settings)
    }
}
