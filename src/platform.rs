//! Host detection and build-target resolution

use std::fmt;

use log::debug;
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::error::{PakeError, Result};
use crate::request::LinuxTarget;
use crate::validate::ValidatedRequest;

/// Operating system of the machine running the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOs {
    MacOs,
    Windows,
    Linux,
}

/// CPU architecture of the machine running the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostArch {
    X86_64,
    AArch64,
}

/// Host environment the pipeline resolves against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Host {
    pub os: HostOs,
    pub arch: HostArch,
}

/// Global cache for host detection (initialized once, used everywhere)
static HOST_CACHE: OnceCell<Host> = OnceCell::new();

impl Host {
    pub const fn new(os: HostOs, arch: HostArch) -> Self {
        Self { os, arch }
    }

    /// Detect current host (cached after first call)
    pub fn detect() -> Result<Self> {
        HOST_CACHE
            .get_or_try_init(|| Self::from_consts(std::env::consts::OS, std::env::consts::ARCH))
            .copied()
    }

    fn from_consts(os: &str, arch: &str) -> Result<Self> {
        let os = match os {
            "macos" => HostOs::MacOs,
            "windows" => HostOs::Windows,
            "linux" => HostOs::Linux,
            other => {
                return Err(PakeError::UnsupportedPlatformCombo(format!(
                    "host operating system `{other}` cannot build desktop bundles"
                )));
            }
        };
        let arch = match arch {
            "x86_64" => HostArch::X86_64,
            "aarch64" => HostArch::AArch64,
            other => {
                return Err(PakeError::UnsupportedPlatformCombo(format!(
                    "host architecture `{other}` is not supported"
                )));
            }
        };
        Ok(Self { os, arch })
    }
}

/// A single concrete build target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResolvedPlatform {
    #[serde(rename = "macos-x64")]
    MacOsX64,
    #[serde(rename = "macos-arm64")]
    MacOsArm64,
    #[serde(rename = "windows")]
    Windows,
    #[serde(rename = "linux-deb")]
    LinuxDeb,
    #[serde(rename = "linux-appimage")]
    LinuxAppImage,
}

impl ResolvedPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedPlatform::MacOsX64 => "macos-x64",
            ResolvedPlatform::MacOsArm64 => "macos-arm64",
            ResolvedPlatform::Windows => "windows",
            ResolvedPlatform::LinuxDeb => "linux-deb",
            ResolvedPlatform::LinuxAppImage => "linux-appimage",
        }
    }

    pub fn os(&self) -> HostOs {
        match self {
            ResolvedPlatform::MacOsX64 | ResolvedPlatform::MacOsArm64 => HostOs::MacOs,
            ResolvedPlatform::Windows => HostOs::Windows,
            ResolvedPlatform::LinuxDeb | ResolvedPlatform::LinuxAppImage => HostOs::Linux,
        }
    }

    /// Icon file extension the native toolchain expects
    pub fn icon_extension(&self) -> &'static str {
        icon_extension_for(self.os())
    }

    /// Bundle format handed to the toolchain (`--bundles`)
    pub fn package_format(&self) -> &'static str {
        match self {
            ResolvedPlatform::MacOsX64 | ResolvedPlatform::MacOsArm64 => "dmg",
            ResolvedPlatform::Windows => "msi",
            ResolvedPlatform::LinuxDeb => "deb",
            ResolvedPlatform::LinuxAppImage => "appimage",
        }
    }

    /// Extension of the produced artifact
    pub fn artifact_extension(&self) -> &'static str {
        match self {
            ResolvedPlatform::LinuxAppImage => "AppImage",
            other => other.package_format(),
        }
    }

    /// Rust target triple passed explicitly for cross-arch macOS builds
    pub fn target_triple(&self) -> Option<&'static str> {
        match self {
            ResolvedPlatform::MacOsX64 => Some("x86_64-apple-darwin"),
            ResolvedPlatform::MacOsArm64 => Some("aarch64-apple-darwin"),
            _ => None,
        }
    }

    /// Architecture label used in artifact names
    pub fn arch_label(&self) -> Option<&'static str> {
        match self {
            ResolvedPlatform::MacOsX64 => Some("x64"),
            ResolvedPlatform::MacOsArm64 => Some("aarch64"),
            _ => None,
        }
    }
}

impl fmt::Display for ResolvedPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Icon extension convention per operating system
pub fn icon_extension_for(os: HostOs) -> &'static str {
    match os {
        HostOs::MacOs => "icns",
        HostOs::Windows => "ico",
        HostOs::Linux => "png",
    }
}

/// Expand a validated request into the ordered list of build targets
///
/// Multi-arch always yields x64 before arm64 so build logs are reproducible.
pub fn resolve_platforms(request: &ValidatedRequest, host: Host) -> Result<Vec<ResolvedPlatform>> {
    if request.multi_arch && host.os != HostOs::MacOs {
        return Err(PakeError::UnsupportedPlatformCombo(
            "--multi-arch is only available when building on macOS".to_string(),
        ));
    }
    if request.targets.is_some() && host.os != HostOs::Linux {
        return Err(PakeError::UnsupportedPlatformCombo(
            "--targets only applies to Linux builds".to_string(),
        ));
    }

    let platforms = match host.os {
        HostOs::MacOs if request.multi_arch => {
            vec![ResolvedPlatform::MacOsX64, ResolvedPlatform::MacOsArm64]
        }
        HostOs::MacOs => match host.arch {
            HostArch::X86_64 => vec![ResolvedPlatform::MacOsX64],
            HostArch::AArch64 => vec![ResolvedPlatform::MacOsArm64],
        },
        HostOs::Windows => match host.arch {
            HostArch::X86_64 => vec![ResolvedPlatform::Windows],
            HostArch::AArch64 => {
                return Err(PakeError::UnsupportedPlatformCombo(
                    "Windows bundles can only be built on x86_64 hosts".to_string(),
                ));
            }
        },
        HostOs::Linux => match request.targets.unwrap_or(LinuxTarget::Deb) {
            LinuxTarget::Deb => vec![ResolvedPlatform::LinuxDeb],
            LinuxTarget::AppImage => vec![ResolvedPlatform::LinuxAppImage],
            LinuxTarget::All => vec![ResolvedPlatform::LinuxDeb, ResolvedPlatform::LinuxAppImage],
        },
    };

    debug!(
        "Resolved build targets: {}",
        platforms
            .iter()
            .map(ResolvedPlatform::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(platforms)
}
