//! Packaging request: the user's intent, constructed once by the CLI layer
//! and passed by value through every pipeline stage.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_WIDTH: u32 = 1200;
pub const DEFAULT_HEIGHT: u32 = 780;

/// Raw packaging options as supplied by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagingRequest {
    /// Web URL or local HTML file path, not yet normalized
    pub url: String,
    pub name: Option<String>,
    /// Local path or http(s) URL of the application icon
    pub icon: Option<String>,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
    pub fullscreen: bool,
    pub transparent_titlebar: bool,
    pub show_menu: bool,
    pub show_system_tray: bool,
    pub system_tray_icon: Option<PathBuf>,
    pub user_agent: Option<String>,
    /// Linux bundle formats, raw (`deb`, `appimage` or `all`)
    pub targets: Option<String>,
    pub multi_arch: bool,
    pub copy_local_assets: bool,
}

impl PackagingRequest {
    /// Request with every option at its default
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            icon: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            resizable: true,
            fullscreen: false,
            transparent_titlebar: false,
            show_menu: false,
            show_system_tray: false,
            system_tray_icon: None,
            user_agent: None,
            targets: None,
            multi_arch: false,
            copy_local_assets: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Where the packaged content lives. Exactly one of the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlSource {
    Remote(url::Url),
    Local(PathBuf),
}

impl UrlSource {
    pub fn is_local(&self) -> bool {
        matches!(self, UrlSource::Local(_))
    }

    /// Value used for the `url_type` window field
    pub fn url_type(&self) -> &'static str {
        match self {
            UrlSource::Remote(_) => "web",
            UrlSource::Local(_) => "local",
        }
    }
}

impl fmt::Display for UrlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlSource::Remote(url) => write!(f, "{url}"),
            UrlSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Where the icon comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconSource {
    File(PathBuf),
    Remote(url::Url),
}

impl IconSource {
    /// Lowercased file extension, if the location carries one
    pub fn extension(&self) -> Option<String> {
        let name = match self {
            IconSource::File(path) => path.file_name()?.to_string_lossy().into_owned(),
            IconSource::Remote(url) => url.path_segments()?.next_back()?.to_string(),
        };
        let (_, ext) = name.rsplit_once('.')?;
        Some(ext.to_ascii_lowercase())
    }
}

/// Linux bundle format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinuxTarget {
    Deb,
    AppImage,
    All,
}

impl FromStr for LinuxTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deb" => Ok(LinuxTarget::Deb),
            "appimage" => Ok(LinuxTarget::AppImage),
            "all" => Ok(LinuxTarget::All),
            other => Err(format!("`{other}` is not one of deb, appimage, all")),
        }
    }
}
