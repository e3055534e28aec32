//! Native toolchain probing and invocation
//!
//! The pipeline never installs or repairs the toolchain. [`probe`] reports
//! whether it is usable and the CLI decides what to tell the user.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use log::{debug, info};
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::ToolchainSettings;
use crate::platform::ResolvedPlatform;
use crate::task::AsyncTask;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const EXCERPT_MAX_LINES: usize = 20;
const EXCERPT_MAX_CHARS: usize = 2000;

/// Result of the pre-flight toolchain check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainStatus {
    Available { program: PathBuf, version: String },
    Missing { program: String, reason: String },
}

impl ToolchainStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, ToolchainStatus::Available { .. })
    }
}

/// Check that the configured toolchain exists and answers its version query
pub async fn probe(settings: &ToolchainSettings) -> ToolchainStatus {
    let program = match which::which(&settings.program) {
        Ok(path) => path,
        Err(e) => {
            return ToolchainStatus::Missing {
                program: settings.program.clone(),
                reason: e.to_string(),
            };
        }
    };

    let output = timeout(
        PROBE_TIMEOUT,
        Command::new(&program)
            .args(&settings.version_args)
            .stdin(Stdio::null())
            .output(),
    )
    .await;

    match output {
        Ok(Ok(output)) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            info!("Found toolchain {} ({version})", program.display());
            ToolchainStatus::Available { program, version }
        }
        Ok(Ok(output)) => ToolchainStatus::Missing {
            program: settings.program.clone(),
            reason: format!(
                "`{} {}` failed: {}",
                settings.program,
                settings.version_args.join(" "),
                stderr_excerpt(&String::from_utf8_lossy(&output.stderr))
            ),
        },
        Ok(Err(e)) => ToolchainStatus::Missing {
            program: settings.program.clone(),
            reason: e.to_string(),
        },
        Err(_) => ToolchainStatus::Missing {
            program: settings.program.clone(),
            reason: format!("version check timed out after {} seconds", PROBE_TIMEOUT.as_secs()),
        },
    }
}

/// One native build request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub platform: ResolvedPlatform,
    pub project_dir: PathBuf,
    pub timeout: Duration,
}

/// Exit status and captured stderr of a finished build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The external program that turns a staged project into a bundle
pub trait NativeToolchain: Send + Sync {
    fn build(&self, invocation: Invocation) -> AsyncTask<io::Result<ToolOutput>>;
}

/// `cargo tauri build` (or whatever [`ToolchainSettings`] names)
#[derive(Debug, Clone)]
pub struct TauriToolchain {
    settings: ToolchainSettings,
}

impl TauriToolchain {
    pub fn new(settings: ToolchainSettings) -> Self {
        Self { settings }
    }

    fn command(&self, invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&self.settings.program);
        cmd.args(&self.settings.build_args);
        if let Some(triple) = invocation.platform.target_triple() {
            cmd.args(["--target", triple]);
        }
        cmd.args(["--bundles", invocation.platform.package_format()])
            .current_dir(&invocation.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl NativeToolchain for TauriToolchain {
    fn build(&self, invocation: Invocation) -> AsyncTask<io::Result<ToolOutput>> {
        let mut cmd = self.command(&invocation);
        debug!("Running {cmd:?} in {}", invocation.project_dir.display());

        AsyncTask::from_future(async move {
            match timeout(invocation.timeout, cmd.output()).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "build for {} timed out after {} seconds",
                        invocation.platform,
                        invocation.timeout.as_secs()
                    ),
                )),
            }
        })
        .map(|output| ToolOutput {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Directory the toolchain writes `platform`'s bundles to
pub fn bundle_dir(project_dir: &Path, platform: ResolvedPlatform) -> PathBuf {
    let mut dir = project_dir.join("target");
    if let Some(triple) = platform.target_triple() {
        dir.push(triple);
    }
    dir.join("release").join("bundle").join(platform.package_format())
}

/// Bundles produced for `platform`, sorted by path
pub fn find_artifacts(project_dir: &Path, platform: ResolvedPlatform) -> io::Result<Vec<PathBuf>> {
    let dir = bundle_dir(project_dir, platform);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let ext = platform.artifact_extension();
    let mut artifacts = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if matches && path.is_file() {
            artifacts.push(path);
        }
    }
    artifacts.sort();
    Ok(artifacts)
}

/// Tail of a stderr stream, short enough for a report line
pub fn stderr_excerpt(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let tail = lines[lines.len().saturating_sub(EXCERPT_MAX_LINES)..].join("\n");

    let count = tail.chars().count();
    if count <= EXCERPT_MAX_CHARS {
        return tail;
    }
    tail.chars().skip(count - EXCERPT_MAX_CHARS).collect()
}
