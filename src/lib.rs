//! Package a web page or local HTML file into native desktop bundles.
//!
//! The pipeline runs in fixed stages:
//!
//! 1. [`validate`](validate::validate) a [`PackagingRequest`] into a [`ValidatedRequest`]
//! 2. [`resolve_platforms`](platform::resolve_platforms) against the [`Host`]
//! 3. freeze one [`BuildManifest`] per platform
//! 4. stage and build every manifest concurrently ([`Orchestrator`])
//!
//! Stages 1 to 3 fail the whole invocation. Stage 4 failures are recorded
//! per platform in the [`BuildReport`].

pub mod config;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod platform;
pub mod report;
pub mod request;
pub mod stage;
pub mod task;
pub mod toolchain;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use config::Settings;
pub use error::{PakeError, Result};
pub use manifest::BuildManifest;
pub use orchestrator::{BuildReport, BuildResult, BuildStatus, JobEvent, Orchestrator};
pub use platform::{Host, HostArch, HostOs, ResolvedPlatform};
pub use request::PackagingRequest;
pub use stage::{AssetStager, IconConverter, ImageIconConverter};
pub use toolchain::{NativeToolchain, TauriToolchain, ToolchainStatus};
pub use validate::ValidatedRequest;

/// Everything one invocation needs, passed explicitly
pub struct Pipeline {
    settings: Settings,
    host: Host,
    toolchain: Arc<dyn NativeToolchain>,
    converter: Arc<dyn IconConverter>,
    progress: Option<mpsc::Sender<JobEvent>>,
}

impl Pipeline {
    pub fn new(settings: Settings, host: Host, toolchain: Arc<dyn NativeToolchain>) -> Self {
        Self {
            settings,
            host,
            toolchain,
            converter: Arc::new(ImageIconConverter),
            progress: None,
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn IconConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<JobEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Validate, resolve and freeze manifests without touching the disk
    pub fn plan(&self, request: PackagingRequest) -> Result<Vec<BuildManifest>> {
        let request = validate::validate(request, self.host)?;
        let platforms = platform::resolve_platforms(&request, self.host)?;
        Ok(manifest::build_manifests(
            &request,
            &platforms,
            &self.settings.app_version,
        ))
    }

    /// Plan, then stage and build every platform
    ///
    /// Returns `Err` only for invocation-wide failures; per-platform
    /// failures are part of the report.
    pub async fn run(&self, request: PackagingRequest, cancel: CancellationToken) -> Result<BuildReport> {
        let manifests = self.plan(request)?;
        self.execute(manifests, cancel).await
    }

    /// Stage and build already planned manifests in a fresh working root
    pub async fn execute(
        &self,
        manifests: Vec<BuildManifest>,
        cancel: CancellationToken,
    ) -> Result<BuildReport> {
        std::fs::create_dir_all(&self.settings.work_dir)
            .map_err(|e| PakeError::asset_copy(&self.settings.work_dir, e))?;
        let work_root = tempfile::Builder::new()
            .prefix("pake-")
            .tempdir_in(&self.settings.work_dir)
            .map_err(|e| PakeError::asset_copy(&self.settings.work_dir, e))?;
        if let Some(first) = manifests.first() {
            info!(
                "Packaging {} for {} platform(s) in {}",
                first.name(),
                manifests.len(),
                work_root.path().display()
            );
        }

        let stager = AssetStager::new(
            &self.settings.template_dir,
            work_root.path(),
            Arc::clone(&self.converter),
        );
        let mut orchestrator = Orchestrator::new(stager, Arc::clone(&self.toolchain), &self.settings.output_dir)
            .max_parallel_jobs(self.settings.max_parallel_jobs)
            .build_timeout(Duration::from_secs(self.settings.build_timeout_secs));
        if let Some(tx) = &self.progress {
            orchestrator = orchestrator.progress(tx.clone());
        }

        let report = orchestrator.run(manifests, cancel).await;

        if self.settings.keep_work_dir {
            let kept = work_root.keep();
            info!("Keeping staged projects in {}", kept.display());
        }
        Ok(report)
    }
}
