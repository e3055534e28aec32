//! Command-line surface of the `pake` binary

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use inquire::Text;

use pake::platform::HostOs;
use pake::request::{DEFAULT_HEIGHT, DEFAULT_WIDTH, PackagingRequest};

/// Turn a web page or local HTML file into a desktop app
#[derive(Parser, Debug, Clone)]
#[command(name = "pake", version, about)]
pub struct Args {
    /// Web URL or path to a local HTML file
    pub url: String,

    /// Application name
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    /// Application icon (local path or http(s) URL)
    #[arg(long, short = 'i')]
    pub icon: Option<String>,

    /// Window height in pixels
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    pub height: u32,

    /// Window width in pixels
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    pub width: u32,

    /// Transparent title bar (macOS only)
    #[arg(long)]
    pub transparent: bool,

    /// Disable window resizing
    #[arg(long)]
    pub resizable: bool,

    /// Start in fullscreen
    #[arg(long)]
    pub fullscreen: bool,

    /// Build universal macOS bundles (x64 and arm64)
    #[arg(long)]
    pub multi_arch: bool,

    /// Linux bundle formats: deb, appimage or all
    #[arg(long, value_name = "deb|appimage|all")]
    pub targets: Option<String>,

    /// Override the webview user agent
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Show the application menu
    #[arg(long)]
    pub show_menu: bool,

    /// Show a system tray icon
    #[arg(long)]
    pub show_system_tray: bool,

    /// Tray icon image, square between 32 and 256 px
    #[arg(long)]
    pub system_tray_icon: Option<PathBuf>,

    /// Bundle the whole directory of a local HTML file
    #[arg(long = "copy-iter-file")]
    pub copy_iter_file: bool,

    /// Path to configuration file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Where finished bundles are written (overrides the config file)
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// Keep staged projects after the run
    #[arg(long)]
    pub keep_work_dir: bool,

    /// Never prompt; fail on missing input instead
    #[arg(long)]
    pub no_interaction: bool,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    /// Map flags onto a request, one field each
    pub fn to_request(&self) -> PackagingRequest {
        PackagingRequest {
            url: self.url.clone(),
            name: self.name.clone(),
            icon: self.icon.clone(),
            width: self.width,
            height: self.height,
            // The flag switches resizing off.
            resizable: !self.resizable,
            fullscreen: self.fullscreen,
            transparent_titlebar: self.transparent,
            show_menu: self.show_menu,
            show_system_tray: self.show_system_tray,
            system_tray_icon: self.system_tray_icon.clone(),
            user_agent: self.user_agent.clone(),
            targets: self.targets.clone(),
            multi_arch: self.multi_arch,
            copy_local_assets: self.copy_iter_file,
        }
    }

    pub fn interactive(&self) -> bool {
        !self.no_interaction && std::io::stdin().is_terminal()
    }
}

/// Ask for an app name, offering `suggestion` as the default
pub fn prompt_name(suggestion: Option<&str>) -> Result<String> {
    let mut prompt = Text::new("App name:").with_help_message("Shown in the title bar and installer");
    if let Some(suggestion) = suggestion {
        prompt = prompt.with_default(suggestion);
    }
    prompt.prompt().context("Failed to read app name")
}

/// Name derived from the URL host or local file stem
pub fn suggest_name(url: &str, os: HostOs) -> Option<String> {
    let base = match pake::validate::normalize_url(url).ok()? {
        pake::request::UrlSource::Remote(url) => {
            let host = url.host_str()?;
            host.split('.')
                .find(|label| !label.is_empty() && *label != "www")?
                .to_string()
        }
        pake::request::UrlSource::Local(path) => path.file_stem()?.to_string_lossy().into_owned(),
    };

    let cleaned: String = base
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if cleaned.is_empty() {
        return None;
    }

    Some(match os {
        HostOs::Linux => cleaned.to_lowercase(),
        HostOs::MacOs | HostOs::Windows => {
            let mut chars = cleaned.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => cleaned,
            }
        }
    })
}
