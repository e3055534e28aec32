//! Option validation
//!
//! Turns a raw [`PackagingRequest`] into a [`ValidatedRequest`] or a typed
//! error. Nothing here writes to disk or spawns processes, so a bad request is
//! rejected before any staging or native build cost is paid.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::error::{PakeError, Result};
use crate::platform::{Host, HostOs, icon_extension_for};
use crate::request::{IconSource, LinuxTarget, PackagingRequest, UrlSource};

/// Raster formats the stager can convert into any platform icon format
pub const CONVERTIBLE_ICON_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif", "ico"];

pub const TRAY_ICON_MIN_PX: u32 = 32;
pub const TRAY_ICON_MAX_PX: u32 = 256;

static APP_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9\p{Han}]+([- ][a-zA-Z0-9\p{Han}]+)*$").expect("static regex")
});

/// A request whose every field has been checked and normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub url: UrlSource,
    pub name: String,
    pub icon: Option<IconSource>,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
    pub fullscreen: bool,
    pub transparent_titlebar: bool,
    pub show_menu: bool,
    /// Present exactly when the system tray is shown
    pub system_tray_icon: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub targets: Option<LinuxTarget>,
    pub multi_arch: bool,
    pub copy_local_assets: bool,
    _sealed: (),
}

impl ValidatedRequest {
    pub fn show_system_tray(&self) -> bool {
        self.system_tray_icon.is_some()
    }
}

/// Validate every option of `request` for a build on `host`
pub fn validate(request: PackagingRequest, host: Host) -> Result<ValidatedRequest> {
    let url = normalize_url(&request.url)?;

    if request.width == 0 {
        return Err(PakeError::invalid("width", "must be a positive number of pixels"));
    }
    if request.height == 0 {
        return Err(PakeError::invalid("height", "must be a positive number of pixels"));
    }

    let icon = match request.icon.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(raw) => Some(validate_icon(raw, host.os)?),
    };

    if let Some(path) = &request.system_tray_icon {
        validate_tray_icon(path)?;
    }
    let system_tray_icon = if request.show_system_tray {
        Some(
            request
                .system_tray_icon
                .ok_or_else(|| PakeError::missing("systemTrayIcon"))?,
        )
    } else {
        None
    };

    let targets = request
        .targets
        .as_deref()
        .map(|raw| raw.parse::<LinuxTarget>().map_err(|reason| PakeError::invalid("targets", reason)))
        .transpose()?;

    let user_agent = request
        .user_agent
        .map(|ua| ua.trim().to_string())
        .filter(|ua| !ua.is_empty());

    let name = request
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| PakeError::missing("name"))?;
    validate_name(&name)?;

    Ok(ValidatedRequest {
        url,
        name,
        icon,
        width: request.width,
        height: request.height,
        resizable: request.resizable,
        fullscreen: request.fullscreen,
        transparent_titlebar: request.transparent_titlebar,
        show_menu: request.show_menu,
        system_tray_icon,
        user_agent,
        targets,
        multi_arch: request.multi_arch,
        copy_local_assets: request.copy_local_assets,
        _sealed: (),
    })
}

/// Classify `raw` as a remote URL or a local file
///
/// Bare domains such as `github.com` get an `https://` scheme.
pub fn normalize_url(raw: &str) -> Result<UrlSource> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PakeError::missing("url"));
    }

    if let Ok(url) = Url::parse(raw) {
        match url.scheme() {
            "http" | "https" => return Ok(UrlSource::Remote(url)),
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|()| PakeError::invalid("url", "file URL has no local path"))?;
                return local_source(&path);
            }
            // Windows drive letters and `host:port` parse as schemes; fall through.
            _ => {}
        }
    }

    let path = Path::new(raw);
    if path.exists() {
        return local_source(path);
    }

    if looks_like_domain(raw) {
        return Url::parse(&format!("https://{raw}"))
            .map(UrlSource::Remote)
            .map_err(|e| PakeError::invalid("url", e.to_string()));
    }

    Err(PakeError::invalid(
        "url",
        format!("`{raw}` is neither an http(s) URL nor an existing local file"),
    ))
}

fn local_source(path: &Path) -> Result<UrlSource> {
    if !path.is_file() {
        return Err(PakeError::invalid(
            "url",
            format!("{} is not a file", path.display()),
        ));
    }
    let path = std::fs::canonicalize(path)
        .map_err(|e| PakeError::invalid("url", format!("{}: {e}", path.display())))?;
    Ok(UrlSource::Local(path))
}

fn looks_like_domain(raw: &str) -> bool {
    let host = raw.split(['/', '?', '#']).next().unwrap_or_default();
    host.contains('.')
        && !host.starts_with('.')
        && !host.ends_with('.')
        && !host.chars().any(|c| c.is_whitespace() || c == '\\')
}

fn validate_icon(raw: &str, os: HostOs) -> Result<IconSource> {
    let source = match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => IconSource::Remote(url),
        _ => IconSource::File(PathBuf::from(raw)),
    };

    let native = icon_extension_for(os);
    let Some(ext) = source.extension() else {
        // Remote icons without an extension are sniffed at staging time.
        if let IconSource::File(path) = &source {
            return Err(PakeError::invalid(
                "icon",
                format!("{} has no file extension", path.display()),
            ));
        }
        return Ok(source);
    };

    if ext == native || CONVERTIBLE_ICON_EXTENSIONS.contains(&ext.as_str()) {
        Ok(source)
    } else {
        Err(PakeError::invalid(
            "icon",
            format!(".{ext} icons cannot be used on this platform; provide a .{native} or a png/jpg image"),
        ))
    }
}

fn validate_tray_icon(path: &Path) -> Result<()> {
    let (width, height) = image::image_dimensions(path).map_err(|e| {
        PakeError::invalid("systemTrayIcon", format!("cannot read {}: {e}", path.display()))
    })?;

    if width != height {
        return Err(PakeError::invalid(
            "systemTrayIcon",
            format!("must be square, got {width}x{height}"),
        ));
    }
    if !(TRAY_ICON_MIN_PX..=TRAY_ICON_MAX_PX).contains(&width) {
        return Err(PakeError::invalid(
            "systemTrayIcon",
            format!(
                "must be between {TRAY_ICON_MIN_PX}x{TRAY_ICON_MIN_PX} and {TRAY_ICON_MAX_PX}x{TRAY_ICON_MAX_PX} px, got {width}x{height}"
            ),
        ));
    }
    Ok(())
}

/// Names are shared by every platform; Linux packages use the slugified form.
fn validate_name(name: &str) -> Result<()> {
    if APP_NAME.is_match(name) {
        Ok(())
    } else {
        Err(PakeError::invalid(
            "name",
            format!(
                "`{name}` is not a valid app name; use letters, digits or CJK characters, \
                 optionally joined by single spaces or dashes"
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::HostArch;

    const LINUX: Host = Host::new(HostOs::Linux, HostArch::X86_64);
    const MAC: Host = Host::new(HostOs::MacOs, HostArch::AArch64);
    const WINDOWS: Host = Host::new(HostOs::Windows, HostArch::X86_64);

    fn write_png(path: &Path, width: u32, height: u32) {
        image::RgbaImage::from_pixel(width, height, image::Rgba([10, 120, 200, 255]))
            .save(path)
            .unwrap();
    }

    fn demo() -> PackagingRequest {
        PackagingRequest::new("https://example.com").with_name("Demo")
    }

    #[test]
    fn tray_without_icon_is_missing_field() {
        let mut req = demo();
        req.show_system_tray = true;
        assert_eq!(
            validate(req, MAC).unwrap_err(),
            PakeError::MissingRequiredField("systemTrayIcon".to_string())
        );
    }

    #[test]
    fn tray_check_precedes_missing_name() {
        let mut req = PackagingRequest::new("https://example.com");
        req.show_system_tray = true;
        assert_eq!(
            validate(req, LINUX).unwrap_err(),
            PakeError::missing("systemTrayIcon")
        );
    }

    #[test]
    fn missing_name_is_reported_not_prompted() {
        let req = PackagingRequest::new("https://example.com");
        assert_eq!(validate(req, MAC).unwrap_err(), PakeError::missing("name"));

        let blank = PackagingRequest::new("https://example.com").with_name("   ");
        assert_eq!(validate(blank, MAC).unwrap_err(), PakeError::missing("name"));
    }

    #[test]
    fn zero_geometry_is_rejected() {
        let mut req = demo();
        req.width = 0;
        assert!(matches!(
            validate(req, MAC).unwrap_err(),
            PakeError::InvalidOption { field, .. } if field == "width"
        ));

        let mut req = demo();
        req.height = 0;
        assert!(matches!(
            validate(req, MAC).unwrap_err(),
            PakeError::InvalidOption { field, .. } if field == "height"
        ));
    }

    #[test]
    fn name_rules() {
        assert!(validate(demo(), MAC).is_ok());
        assert!(validate(demo(), LINUX).is_ok());
        assert!(validate(demo().with_name("Weekly 笔记"), WINDOWS).is_ok());
        assert!(validate(demo().with_name("weekly-notes"), LINUX).is_ok());
        assert!(matches!(
            validate(demo().with_name("weekly--notes"), LINUX).unwrap_err(),
            PakeError::InvalidOption { field, .. } if field == "name"
        ));
        assert!(validate(demo().with_name("bad_name!"), MAC).is_err());
        assert!(validate(demo().with_name("trailing "), MAC).is_ok());
    }

    #[test]
    fn icon_extension_follows_platform_convention() {
        let mut req = demo();
        req.icon = Some("/icons/app.icns".to_string());
        assert!(validate(req.clone(), MAC).is_ok());
        assert!(matches!(
            validate(req.clone(), WINDOWS).unwrap_err(),
            PakeError::InvalidOption { field, .. } if field == "icon"
        ));

        req.icon = Some("/icons/app.png".to_string());
        assert!(validate(req.clone(), MAC).is_ok());
        assert!(validate(req.clone(), WINDOWS).is_ok());

        req.icon = Some("/icons/app.svg".to_string());
        assert!(validate(req.clone(), MAC).is_err());

        req.icon = Some("/icons/app".to_string());
        assert!(validate(req.clone(), MAC).is_err());

        req.icon = Some("https://cdn.test/icon".to_string());
        let validated = validate(req, MAC).unwrap();
        assert!(matches!(validated.icon, Some(IconSource::Remote(_))));
    }

    #[test]
    fn tray_icon_must_be_square_and_in_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = demo();
        req.show_system_tray = true;

        for (w, h, ok) in [(32, 32, true), (256, 256, true), (16, 16, false), (300, 300, false), (64, 32, false)] {
            let path = dir.path().join(format!("tray_{w}x{h}.png"));
            write_png(&path, w, h);
            req.system_tray_icon = Some(path);
            let result = validate(req.clone(), MAC);
            assert_eq!(result.is_ok(), ok, "{w}x{h}: {result:?}");
        }
    }

    #[test]
    fn unreadable_tray_icon_is_invalid() {
        let mut req = demo();
        req.show_system_tray = true;
        req.system_tray_icon = Some(PathBuf::from("/definitely/not/here.png"));
        assert!(matches!(
            validate(req, MAC).unwrap_err(),
            PakeError::InvalidOption { field, .. } if field == "systemTrayIcon"
        ));
    }

    #[test]
    fn tray_icon_is_dropped_when_tray_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tray.png");
        write_png(&path, 32, 32);
        let mut req = demo();
        req.system_tray_icon = Some(path);
        let validated = validate(req, MAC).unwrap();
        assert!(!validated.show_system_tray());
    }

    #[test]
    fn tray_icon_is_checked_even_when_tray_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tray.png");
        write_png(&path, 300, 300);
        let mut req = demo();
        req.system_tray_icon = Some(path);
        assert!(matches!(
            validate(req.clone(), MAC).unwrap_err(),
            PakeError::InvalidOption { field, .. } if field == "systemTrayIcon"
        ));

        req.system_tray_icon = Some(PathBuf::from("/definitely/not/here.png"));
        assert!(matches!(
            validate(req, MAC).unwrap_err(),
            PakeError::InvalidOption { field, .. } if field == "systemTrayIcon"
        ));
    }

    #[test]
    fn targets_must_be_known() {
        let mut req = demo().with_name("demo");
        req.targets = Some("rpm".to_string());
        assert!(matches!(
            validate(req.clone(), LINUX).unwrap_err(),
            PakeError::InvalidOption { field, .. } if field == "targets"
        ));
        req.targets = Some("all".to_string());
        assert_eq!(validate(req, LINUX).unwrap().targets, Some(LinuxTarget::All));
    }

    #[test]
    fn url_normalization() {
        assert!(matches!(
            normalize_url("https://example.com/app").unwrap(),
            UrlSource::Remote(url) if url.as_str() == "https://example.com/app"
        ));
        assert!(matches!(
            normalize_url("github.com/tw93").unwrap(),
            UrlSource::Remote(url) if url.as_str() == "https://github.com/tw93"
        ));
        assert!(matches!(normalize_url("not a url"), Err(PakeError::InvalidOption { .. })));
        assert_eq!(normalize_url("  "), Err(PakeError::missing("url")));

        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("index.html");
        std::fs::write(&page, "<html></html>").unwrap();
        let source = normalize_url(page.to_str().unwrap()).unwrap();
        assert!(source.is_local());
        assert!(normalize_url(dir.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn user_agent_is_trimmed() {
        let mut req = demo();
        req.user_agent = Some("  ".to_string());
        assert_eq!(validate(req.clone(), MAC).unwrap().user_agent, None);
        req.user_agent = Some(" Custom/1.0 ".to_string());
        assert_eq!(
            validate(req, MAC).unwrap().user_agent.as_deref(),
            Some("Custom/1.0")
        );
    }
}
