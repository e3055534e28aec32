//! Per-job build manifests
//!
//! A [`BuildManifest`] is a frozen value: every field is private and only
//! readable, so concurrent jobs can never observe each other's options.
//! It renders the two files the Tauri shell project consumes:
//! `tauri.conf.json` (bundle metadata) and `pake.json` (window behaviour).

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::platform::{HostOs, ResolvedPlatform};
use crate::request::{IconSource, UrlSource};
use crate::validate::ValidatedRequest;

pub const TAURI_CONFIG_FILE: &str = "tauri.conf.json";
pub const PAKE_CONFIG_FILE: &str = "pake.json";
/// Directory (relative to the project root) holding bundled local content
pub const DIST_DIR: &str = "dist";

const MACOS_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.1 Safari/605.1.15";
const WINDOWS_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";
const LINUX_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// Browser user agent a platform's webview reports unless overridden
pub fn default_user_agent(os: HostOs) -> &'static str {
    match os {
        HostOs::MacOs => MACOS_USER_AGENT,
        HostOs::Windows => WINDOWS_USER_AGENT,
        HostOs::Linux => LINUX_USER_AGENT,
    }
}

/// Bundle identifier derived from the packaged location
pub fn bundle_identifier(url: &UrlSource) -> String {
    let digest = Sha256::digest(url.to_string().as_bytes());
    format!("com.pake.{}", &hex::encode(digest)[..6])
}

/// File-system friendly form of an app name
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Window settings shared by both rendered config files
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowConfig {
    pub url: String,
    pub url_type: &'static str,
    pub transparent: bool,
    pub fullscreen: bool,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

/// Frozen inputs of one build job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildManifest {
    platform: ResolvedPlatform,
    name: String,
    product_name: String,
    slug: String,
    version: String,
    identifier: String,
    source: UrlSource,
    window: WindowConfig,
    user_agent: String,
    show_menu: bool,
    icon: Option<IconSource>,
    icon_path: String,
    tray_icon: Option<PathBuf>,
    tray_icon_path: Option<String>,
    copy_local_assets: bool,
    multi_arch: bool,
}

impl BuildManifest {
    /// Freeze `request` for a build on `platform`
    pub fn new(request: &ValidatedRequest, platform: ResolvedPlatform, version: &str) -> Self {
        let slug = slugify(&request.name);
        let os = platform.os();

        let window_url = match &request.url {
            UrlSource::Remote(url) => url.to_string(),
            UrlSource::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "index.html".to_string()),
        };

        let window = WindowConfig {
            url: window_url,
            url_type: request.url.url_type(),
            // Only macOS draws a transparent title bar.
            transparent: request.transparent_titlebar && os == HostOs::MacOs,
            fullscreen: request.fullscreen,
            width: request.width,
            height: request.height,
            resizable: request.resizable,
        };

        let icon_path = format!("icons/{slug}.{}", platform.icon_extension());
        let tray_icon_path = request.system_tray_icon.as_ref().map(|source| {
            let ext = source
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_else(|| "png".to_string());
            format!("png/{slug}_tray.{ext}")
        });

        // Linux package names must be lowercase without spaces.
        let product_name = match os {
            HostOs::Linux => slug.clone(),
            HostOs::MacOs | HostOs::Windows => request.name.clone(),
        };

        Self {
            platform,
            name: request.name.clone(),
            product_name,
            slug,
            version: version.to_string(),
            identifier: bundle_identifier(&request.url),
            source: request.url.clone(),
            window,
            user_agent: request
                .user_agent
                .clone()
                .unwrap_or_else(|| default_user_agent(os).to_string()),
            show_menu: request.show_menu,
            icon: request.icon.clone(),
            icon_path,
            tray_icon: request.system_tray_icon.clone(),
            tray_icon_path,
            copy_local_assets: request.copy_local_assets,
            multi_arch: request.multi_arch,
        }
    }

    pub fn platform(&self) -> ResolvedPlatform {
        self.platform
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name written into package metadata and artifact names
    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn source(&self) -> &UrlSource {
        &self.source
    }

    pub fn window(&self) -> &WindowConfig {
        &self.window
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn show_menu(&self) -> bool {
        self.show_menu
    }

    pub fn show_system_tray(&self) -> bool {
        self.tray_icon.is_some()
    }

    /// User-supplied icon, `None` means the template's default icon
    pub fn icon(&self) -> Option<&IconSource> {
        self.icon.as_ref()
    }

    /// Icon location inside the staged project
    pub fn icon_path(&self) -> &str {
        &self.icon_path
    }

    pub fn tray_icon(&self) -> Option<&Path> {
        self.tray_icon.as_deref()
    }

    pub fn tray_icon_path(&self) -> Option<&str> {
        self.tray_icon_path.as_deref()
    }

    /// Local HTML file to bundle, if the app wraps local content
    pub fn local_content(&self) -> Option<&Path> {
        match &self.source {
            UrlSource::Local(path) => Some(path),
            UrlSource::Remote(_) => None,
        }
    }

    /// Whether the whole directory around the local file is bundled
    pub fn copy_local_assets(&self) -> bool {
        self.copy_local_assets && self.source.is_local()
    }

    /// Unique, stable directory name for this job
    pub fn job_id(&self) -> String {
        format!("{}-{}", self.slug, self.platform)
    }

    /// File name the finished bundle gets in the output directory
    pub fn output_file_name(&self) -> String {
        let ext = self.platform.artifact_extension();
        match self.platform.arch_label() {
            Some(arch) if self.multi_arch => format!("{}_{arch}.{ext}", self.product_name),
            _ => format!("{}.{ext}", self.product_name),
        }
    }

    /// Render `tauri.conf.json`
    pub fn tauri_config_json(&self) -> serde_json::Result<String> {
        let config = TauriConfig {
            package: PackageSection {
                product_name: &self.product_name,
                version: &self.version,
            },
            build: BuildSection { dist_dir: DIST_DIR },
            tauri: TauriSection {
                windows: vec![TauriWindow {
                    url: &self.window.url,
                    transparent: self.window.transparent,
                    fullscreen: self.window.fullscreen,
                    width: self.window.width,
                    height: self.window.height,
                    resizable: self.window.resizable,
                }],
                bundle: BundleSection {
                    active: true,
                    identifier: &self.identifier,
                    icon: vec![&self.icon_path],
                    targets: vec![self.platform.package_format()],
                },
                system_tray: self.tray_icon_path.as_deref().map(|icon_path| SystemTraySection {
                    icon_path,
                    icon_as_template: false,
                }),
            },
        };
        serde_json::to_string_pretty(&config)
    }

    /// Render `pake.json`
    pub fn pake_config_json(&self) -> serde_json::Result<String> {
        let config = PakeConfig {
            windows: vec![&self.window],
            user_agent: &self.user_agent,
            show_menu: self.show_menu,
            show_system_tray: self.show_system_tray(),
        };
        serde_json::to_string_pretty(&config)
    }
}

/// One manifest per resolved platform, in resolution order
pub fn build_manifests(
    request: &ValidatedRequest,
    platforms: &[ResolvedPlatform],
    version: &str,
) -> Vec<BuildManifest> {
    platforms
        .iter()
        .map(|&platform| BuildManifest::new(request, platform, version))
        .collect()
}

#[derive(Serialize)]
struct TauriConfig<'a> {
    package: PackageSection<'a>,
    build: BuildSection<'a>,
    tauri: TauriSection<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PackageSection<'a> {
    product_name: &'a str,
    version: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildSection<'a> {
    dist_dir: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TauriSection<'a> {
    windows: Vec<TauriWindow<'a>>,
    bundle: BundleSection<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_tray: Option<SystemTraySection<'a>>,
}

#[derive(Serialize)]
struct TauriWindow<'a> {
    url: &'a str,
    transparent: bool,
    fullscreen: bool,
    width: u32,
    height: u32,
    resizable: bool,
}

#[derive(Serialize)]
struct BundleSection<'a> {
    active: bool,
    identifier: &'a str,
    icon: Vec<&'a str>,
    targets: Vec<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SystemTraySection<'a> {
    icon_path: &'a str,
    icon_as_template: bool,
}

#[derive(Serialize)]
struct PakeConfig<'a> {
    windows: Vec<&'a WindowConfig>,
    user_agent: &'a str,
    show_menu: bool,
    show_system_tray: bool,
}
