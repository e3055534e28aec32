//! Build orchestration
//!
//! Each manifest becomes an independent job: stage, then invoke the native
//! toolchain, then collect the bundle. Jobs run concurrently up to a limit
//! and never share mutable state. A failing job records its error and leaves
//! its siblings alone.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::PakeError;
use crate::manifest::BuildManifest;
use crate::platform::ResolvedPlatform;
use crate::stage::AssetStager;
use crate::toolchain::{self, Invocation, NativeToolchain};

/// Terminal state of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    Success { artifacts: Vec<PathBuf> },
    Failed(PakeError),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub platform: ResolvedPlatform,
    pub status: BuildStatus,
}

/// Outcome of every requested platform, in resolution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub results: Vec<BuildResult>,
}

impl BuildReport {
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, BuildStatus::Failed(_)))
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, BuildStatus::Success { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, BuildStatus::Skipped(_)))
    }

    /// Process exit code: non-zero iff any platform failed
    pub fn exit_code(&self) -> i32 {
        if self.failed() > 0 { 1 } else { 0 }
    }

    fn count(&self, pred: impl Fn(&BuildStatus) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.status)).count()
    }
}

/// Progress notifications, delivered best effort
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Queued { platform: ResolvedPlatform },
    Staging { platform: ResolvedPlatform },
    Building { platform: ResolvedPlatform },
    Finished { platform: ResolvedPlatform, ok: bool },
}

/// Runs build jobs for a set of manifests
#[derive(Clone)]
pub struct Orchestrator {
    stager: AssetStager,
    toolchain: Arc<dyn NativeToolchain>,
    output_dir: PathBuf,
    max_parallel_jobs: usize,
    build_timeout: Duration,
    progress: Option<mpsc::Sender<JobEvent>>,
}

impl Orchestrator {
    pub fn new(
        stager: AssetStager,
        toolchain: Arc<dyn NativeToolchain>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            stager,
            toolchain,
            output_dir: output_dir.into(),
            max_parallel_jobs: 1,
            build_timeout: Duration::from_secs(3600),
            progress: None,
        }
    }

    pub fn max_parallel_jobs(mut self, jobs: usize) -> Self {
        self.max_parallel_jobs = jobs.max(1);
        self
    }

    pub fn build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    pub fn progress(mut self, tx: mpsc::Sender<JobEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Run every job to a terminal state
    pub async fn run(&self, manifests: Vec<BuildManifest>, cancel: CancellationToken) -> BuildReport {
        let platforms: Vec<ResolvedPlatform> = manifests.iter().map(BuildManifest::platform).collect();
        let permits = Arc::new(Semaphore::new(self.max_parallel_jobs));
        let mut jobs = JoinSet::new();

        for (index, manifest) in manifests.into_iter().enumerate() {
            self.notify(JobEvent::Queued { platform: manifest.platform() });
            let job = self.clone();
            let permits = Arc::clone(&permits);
            let cancel = cancel.clone();
            jobs.spawn(async move {
                let status = job.run_job(manifest, permits, cancel).await;
                (index, status)
            });
        }

        let mut slots: Vec<Option<BuildStatus>> = vec![None; platforms.len()];
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok((index, status)) => slots[index] = Some(status),
                Err(e) => error!("Build job aborted: {e}"),
            }
        }

        let results = platforms
            .into_iter()
            .zip(slots)
            .map(|(platform, status)| BuildResult {
                platform,
                status: status.unwrap_or_else(|| {
                    BuildStatus::Failed(PakeError::BuildFailed {
                        platform,
                        exit_code: None,
                        stderr_excerpt: "build job aborted unexpectedly".to_string(),
                    })
                }),
            })
            .collect();
        BuildReport { results }
    }

    async fn run_job(
        &self,
        manifest: BuildManifest,
        permits: Arc<Semaphore>,
        cancel: CancellationToken,
    ) -> BuildStatus {
        let platform = manifest.platform();

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.skip(platform),
            permit = permits.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return self.skip(platform),
            },
        };
        if cancel.is_cancelled() {
            return self.skip(platform);
        }

        self.notify(JobEvent::Staging { platform });
        let staged = match self.stager.stage(&manifest).await {
            Ok(staged) => staged,
            Err(e) => {
                warn!("Staging for {platform} failed: {e}");
                return self.finish(platform, BuildStatus::Failed(e));
            }
        };

        // Once the toolchain starts it runs to completion.
        if cancel.is_cancelled() {
            return self.skip(platform);
        }

        self.notify(JobEvent::Building { platform });
        info!("Building {platform} in {}", staged.root.display());
        let invocation = Invocation {
            platform,
            project_dir: staged.root.clone(),
            timeout: self.build_timeout,
        };
        let status = match self.toolchain.build(invocation).await {
            Ok(output) if output.success() => self.collect(&manifest, &staged.root),
            Ok(output) => BuildStatus::Failed(PakeError::BuildFailed {
                platform,
                exit_code: output.exit_code,
                stderr_excerpt: toolchain::stderr_excerpt(&output.stderr),
            }),
            Err(e) => BuildStatus::Failed(PakeError::BuildFailed {
                platform,
                exit_code: None,
                stderr_excerpt: e.to_string(),
            }),
        };
        self.finish(platform, status)
    }

    /// Copy the produced bundles to the output directory
    fn collect(&self, manifest: &BuildManifest, project_dir: &Path) -> BuildStatus {
        let platform = manifest.platform();
        let produced = match toolchain::find_artifacts(project_dir, platform) {
            Ok(found) => found,
            Err(e) => {
                return BuildStatus::Failed(PakeError::asset_copy(
                    toolchain::bundle_dir(project_dir, platform),
                    e,
                ));
            }
        };
        if produced.is_empty() {
            return BuildStatus::Failed(PakeError::BuildFailed {
                platform,
                exit_code: Some(0),
                stderr_excerpt: format!(
                    "toolchain exited successfully but no .{} bundle was found in {}",
                    platform.artifact_extension(),
                    toolchain::bundle_dir(project_dir, platform).display()
                ),
            });
        }

        if let Err(e) = std::fs::create_dir_all(&self.output_dir) {
            return BuildStatus::Failed(PakeError::asset_copy(&self.output_dir, e));
        }

        let single = produced.len() == 1;
        let mut artifacts = Vec::with_capacity(produced.len());
        for source in produced {
            let file_name = if single {
                manifest.output_file_name().into()
            } else {
                match source.file_name() {
                    Some(name) => name.to_os_string(),
                    None => continue,
                }
            };
            let dest = self.output_dir.join(file_name);
            if let Err(e) = std::fs::copy(&source, &dest) {
                return BuildStatus::Failed(PakeError::asset_copy(&source, e));
            }
            debug!("Copied {} to {}", source.display(), dest.display());
            artifacts.push(dest);
        }
        BuildStatus::Success { artifacts }
    }

    fn skip(&self, platform: ResolvedPlatform) -> BuildStatus {
        info!("Skipping {platform}: cancelled before the toolchain started");
        self.finish(
            platform,
            BuildStatus::Skipped("cancelled before the build started".to_string()),
        )
    }

    fn finish(&self, platform: ResolvedPlatform, status: BuildStatus) -> BuildStatus {
        let ok = matches!(status, BuildStatus::Success { .. });
        if let BuildStatus::Failed(e) = &status {
            error!("{e}");
        }
        self.notify(JobEvent::Finished { platform, ok });
        status
    }

    fn notify(&self, event: JobEvent) {
        if let Some(tx) = &self.progress {
            // Best effort: a slow or closed receiver never stalls a build.
            let _ = tx.try_send(event);
        }
    }
}
