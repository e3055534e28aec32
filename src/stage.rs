//! Asset staging
//!
//! Every job gets its own copy of the shell project template with the icon,
//! tray icon, local content and rendered configs in place. The tree is built
//! in a hidden `.staging-*` directory next to its final location and renamed
//! into place only once complete, so a job either sees a whole project or
//! fails before the native toolchain is ever started.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::codecs::ico::{IcoEncoder, IcoFrame};
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageFormat, ImageReader};
use log::{debug, info};
use walkdir::WalkDir;

use crate::error::{PakeError, Result};
use crate::manifest::{BuildManifest, DIST_DIR, PAKE_CONFIG_FILE, TAURI_CONFIG_FILE};
use crate::request::IconSource;

const ICON_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Template directories never copied into a job
const SKIPPED_TEMPLATE_DIRS: &[&str] = &["target", ".git"];

/// Converts an image into a platform icon format
pub trait IconConverter: Send + Sync {
    /// Write `source` to `dest` encoded as `format` (`png`, `ico` or `icns`)
    fn convert(&self, source: &Path, format: &str, dest: &Path) -> Result<()>;
}

/// [`IconConverter`] backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageIconConverter;

const PNG_ICON_SIZE: u32 = 512;
const ICO_SIZES: &[u32] = &[16, 32, 48, 64, 128, 256];
/// ICNS entries holding PNG payloads, keyed by OSType
const ICNS_ENTRIES: &[(&[u8; 4], u32)] = &[(b"ic07", 128), (b"ic08", 256), (b"ic09", 512)];

impl IconConverter for ImageIconConverter {
    fn convert(&self, source: &Path, format: &str, dest: &Path) -> Result<()> {
        let image = ImageReader::open(source)
            .map_err(|e| PakeError::asset_copy(source, e))?
            .with_guessed_format()
            .map_err(|e| PakeError::asset_copy(source, e))?
            .decode()
            .map_err(|e| PakeError::icon_format(source, e.to_string()))?;

        let bytes = match format {
            "png" => encode_png(&square(&image, PNG_ICON_SIZE)),
            "ico" => encode_ico(&image),
            "icns" => encode_icns(&image),
            other => {
                return Err(PakeError::icon_format(
                    source,
                    format!("no converter for .{other} icons"),
                ));
            }
        }
        .map_err(|e| PakeError::icon_format(source, e.to_string()))?;

        fs::write(dest, bytes).map_err(|e| PakeError::asset_copy(dest, e))
    }
}

fn square(image: &DynamicImage, size: u32) -> DynamicImage {
    image.resize_to_fill(size, size, FilterType::Lanczos3)
}

fn encode_png(image: &DynamicImage) -> image::ImageResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

fn encode_ico(image: &DynamicImage) -> image::ImageResult<Vec<u8>> {
    let frames = ICO_SIZES
        .iter()
        .map(|&size| {
            let rgba = square(image, size).to_rgba8();
            IcoFrame::as_png(rgba.as_raw(), size, size, ExtendedColorType::Rgba8)
        })
        .collect::<image::ImageResult<Vec<_>>>()?;

    let mut buf = Vec::new();
    IcoEncoder::new(&mut buf).encode_images(&frames)?;
    Ok(buf)
}

/// Minimal ICNS container: a header followed by PNG-compressed entries
fn encode_icns(image: &DynamicImage) -> image::ImageResult<Vec<u8>> {
    let mut body = Vec::new();
    for (kind, size) in ICNS_ENTRIES {
        let png = encode_png(&square(image, *size))?;
        body.extend_from_slice(*kind);
        body.extend_from_slice(&((png.len() + 8) as u32).to_be_bytes());
        body.extend_from_slice(&png);
    }

    let mut icns = Vec::with_capacity(body.len() + 8);
    icns.extend_from_slice(b"icns");
    icns.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
    icns.extend_from_slice(&body);
    Ok(icns)
}

/// A fully staged project owned by one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedProject {
    /// Project root handed to the native toolchain
    pub root: PathBuf,
    /// Icon as referenced by `tauri.conf.json`
    pub icon: PathBuf,
}

/// Builds job staging trees from the shell project template
#[derive(Clone)]
pub struct AssetStager {
    template_dir: PathBuf,
    work_root: PathBuf,
    converter: Arc<dyn IconConverter>,
    client: reqwest::Client,
}

impl AssetStager {
    pub fn new(
        template_dir: impl Into<PathBuf>,
        work_root: impl Into<PathBuf>,
        converter: Arc<dyn IconConverter>,
    ) -> Self {
        Self {
            template_dir: template_dir.into(),
            work_root: work_root.into(),
            converter,
            client: reqwest::Client::new(),
        }
    }

    /// Directory the job for `manifest` is staged into
    pub fn job_dir(&self, manifest: &BuildManifest) -> PathBuf {
        self.work_root.join(manifest.job_id())
    }

    /// Stage everything `manifest` needs, atomically
    pub async fn stage(&self, manifest: &BuildManifest) -> Result<StagedProject> {
        let downloaded = match manifest.icon() {
            Some(IconSource::Remote(url)) => Some(self.fetch_icon(url).await?),
            _ => None,
        };

        let job = StageJob {
            manifest: manifest.clone(),
            template_dir: self.template_dir.clone(),
            work_root: self.work_root.clone(),
            target: self.job_dir(manifest),
            converter: Arc::clone(&self.converter),
            downloaded,
        };

        tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| PakeError::asset_copy(&self.work_root, format!("staging task failed: {e}")))?
    }

    async fn fetch_icon(&self, url: &url::Url) -> Result<Vec<u8>> {
        info!("Downloading icon from {url}");
        let fetch = async {
            let response = self
                .client
                .get(url.clone())
                .timeout(ICON_FETCH_TIMEOUT)
                .send()
                .await?
                .error_for_status()?;
            response.bytes().await
        };
        fetch
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| PakeError::asset_copy(url.as_str(), e))
    }
}

/// Owned inputs of one blocking staging run
struct StageJob {
    manifest: BuildManifest,
    template_dir: PathBuf,
    work_root: PathBuf,
    target: PathBuf,
    converter: Arc<dyn IconConverter>,
    downloaded: Option<Vec<u8>>,
}

impl StageJob {
    fn run(mut self) -> Result<StagedProject> {
        fs::create_dir_all(&self.work_root).map_err(|e| PakeError::asset_copy(&self.work_root, e))?;
        // Local content paths are canonical, so the root must be too for the self-copy filter.
        self.work_root = fs::canonicalize(&self.work_root)
            .map_err(|e| PakeError::asset_copy(&self.work_root, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.work_root)
            .map_err(|e| PakeError::asset_copy(&self.work_root, e))?;
        let root = staging.path();

        // Any early return drops `staging`, which removes the partial tree.
        copy_template(&self.template_dir, root)?;
        let icon = self.stage_icon(root)?;
        self.stage_tray_icon(root)?;
        self.stage_local_content(root)?;
        write_config(root, TAURI_CONFIG_FILE, self.manifest.tauri_config_json())?;
        write_config(root, PAKE_CONFIG_FILE, self.manifest.pake_config_json())?;

        if self.target.exists() {
            fs::remove_dir_all(&self.target).map_err(|e| PakeError::asset_copy(&self.target, e))?;
        }
        let staged = staging.keep();
        if let Err(e) = fs::rename(&staged, &self.target) {
            let _ = fs::remove_dir_all(&staged);
            return Err(PakeError::asset_copy(&self.target, e));
        }

        info!("Staged {} in {}", self.manifest.job_id(), self.target.display());
        Ok(StagedProject {
            icon: self.target.join(self.manifest.icon_path()),
            root: self.target,
        })
    }

    fn stage_icon(&self, root: &Path) -> Result<PathBuf> {
        let dest = root.join(self.manifest.icon_path());
        ensure_parent(&dest)?;
        let format = self.manifest.platform().icon_extension();

        let source = match (self.manifest.icon(), &self.downloaded) {
            (Some(IconSource::File(path)), _) => path.clone(),
            (Some(icon @ IconSource::Remote(_)), Some(bytes)) => {
                let ext = icon.extension().unwrap_or_else(|| "download".to_string());
                let path = root.join(format!(".icon-source.{ext}"));
                fs::write(&path, bytes).map_err(|e| PakeError::asset_copy(&path, e))?;
                path
            }
            _ => {
                let default = self.template_dir.join("icons").join(format!("icon.{format}"));
                debug!("No icon given, using template icon {}", default.display());
                copy_file(&default, &dest)?;
                return Ok(dest);
            }
        };

        if !source.is_file() {
            return Err(PakeError::asset_copy(&source, "icon file not found"));
        }

        let already_native = source
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(format));
        if already_native {
            copy_file(&source, &dest)?;
        } else {
            debug!("Converting {} to .{format}", source.display());
            self.converter.convert(&source, format, &dest)?;
        }

        if self.downloaded.is_some() {
            let _ = fs::remove_file(&source);
        }
        Ok(dest)
    }

    fn stage_tray_icon(&self, root: &Path) -> Result<()> {
        let (Some(source), Some(rel)) = (self.manifest.tray_icon(), self.manifest.tray_icon_path())
        else {
            return Ok(());
        };
        let dest = root.join(rel);
        ensure_parent(&dest)?;
        copy_file(source, &dest)
    }

    fn stage_local_content(&self, root: &Path) -> Result<()> {
        let Some(page) = self.manifest.local_content() else {
            return Ok(());
        };
        let dist = root.join(DIST_DIR);
        fs::create_dir_all(&dist).map_err(|e| PakeError::asset_copy(&dist, e))?;

        if !self.manifest.copy_local_assets() {
            let name = page
                .file_name()
                .ok_or_else(|| PakeError::asset_copy(page, "not a file"))?;
            return copy_file(page, &dist.join(name));
        }

        let parent = page
            .parent()
            .ok_or_else(|| PakeError::asset_copy(page, "file has no parent directory"))?;
        debug!("Copying local assets from {}", parent.display());
        // The working root may live inside the content directory; never copy it into itself.
        copy_tree(parent, &dist, |path| !path.starts_with(&self.work_root))
    }
}

fn copy_template(template_dir: &Path, root: &Path) -> Result<()> {
    if !template_dir.is_dir() {
        return Err(PakeError::asset_copy(
            template_dir,
            "project template directory does not exist",
        ));
    }
    copy_tree(template_dir, root, |path| {
        let top_level = path
            .strip_prefix(template_dir)
            .ok()
            .and_then(|rel| rel.components().next());
        !matches!(top_level, Some(c) if SKIPPED_TEMPLATE_DIRS.iter().any(|d| c.as_os_str() == *d))
    })
}

/// Recursively copy `from` into `to`, preserving relative structure
fn copy_tree(from: &Path, to: &Path, keep: impl Fn(&Path) -> bool) -> Result<()> {
    for entry in WalkDir::new(from).into_iter().filter_entry(|e| keep(e.path())) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            PakeError::asset_copy(path, e)
        })?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| PakeError::asset_copy(entry.path(), e))?;
        let dest = to.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(|e| PakeError::asset_copy(&dest, e))?;
        } else {
            copy_file(entry.path(), &dest)?;
        }
    }
    Ok(())
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    ensure_parent(to)?;
    fs::copy(from, to)
        .map(|_| ())
        .map_err(|e| PakeError::asset_copy(from, e))
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent).map_err(|e| PakeError::asset_copy(parent, e)),
        None => Ok(()),
    }
}

fn write_config(root: &Path, file: &str, rendered: serde_json::Result<String>) -> Result<()> {
    let path = root.join(file);
    let contents = rendered.map_err(|e| PakeError::asset_copy(&path, e))?;
    fs::write(&path, contents).map_err(|e| PakeError::asset_copy(&path, e))
}
