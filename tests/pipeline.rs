use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use pake::task::AsyncTask;
use pake::toolchain::{Invocation, ToolOutput, bundle_dir};
use pake::{
    BuildStatus, Host, HostArch, HostOs, NativeToolchain, PackagingRequest, PakeError, Pipeline,
    ResolvedPlatform, Settings,
};
use tokio_util::sync::CancellationToken;

const LINUX: Host = Host::new(HostOs::Linux, HostArch::X86_64);
const MAC: Host = Host::new(HostOs::MacOs, HostArch::AArch64);
const WINDOWS: Host = Host::new(HostOs::Windows, HostArch::X86_64);

/// Records every invocation and writes a bundle where the real toolchain would
#[derive(Default)]
struct FakeToolchain {
    failing: Vec<ResolvedPlatform>,
    skip_artifacts: bool,
    calls: Mutex<Vec<ResolvedPlatform>>,
    configs: Mutex<Vec<(ResolvedPlatform, String, String)>>,
}

impl FakeToolchain {
    fn failing(platform: ResolvedPlatform) -> Self {
        Self {
            failing: vec![platform],
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<ResolvedPlatform> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }

    fn configs(&self) -> Vec<(ResolvedPlatform, String, String)> {
        let mut configs = self.configs.lock().unwrap().clone();
        configs.sort();
        configs
    }
}

impl NativeToolchain for FakeToolchain {
    fn build(&self, invocation: Invocation) -> AsyncTask<io::Result<ToolOutput>> {
        self.calls.lock().unwrap().push(invocation.platform);
        let read = |file: &str| fs::read_to_string(invocation.project_dir.join(file)).unwrap_or_default();
        self.configs.lock().unwrap().push((
            invocation.platform,
            read("tauri.conf.json"),
            read("pake.json"),
        ));

        if self.failing.contains(&invocation.platform) {
            return AsyncTask::ready(Ok(ToolOutput {
                exit_code: Some(101),
                stderr: "Compiling app\nerror: linker `cc` not found\n".to_string(),
            }));
        }

        let write = !self.skip_artifacts;
        AsyncTask::from_future(async move {
            if write {
                let dir = bundle_dir(&invocation.project_dir, invocation.platform);
                tokio::fs::create_dir_all(&dir).await?;
                let file = format!("app_1.0.0.{}", invocation.platform.artifact_extension());
                tokio::fs::write(dir.join(file), b"bundle").await?;
            }
            Ok(ToolOutput {
                exit_code: Some(0),
                stderr: String::new(),
            })
        })
    }
}

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template");
        fs::create_dir_all(template.join("icons")).unwrap();
        fs::write(template.join("Cargo.toml"), "[package]\nname = \"app\"\n").unwrap();
        image::RgbaImage::from_pixel(32, 32, image::Rgba([0, 0, 0, 255]))
            .save(template.join("icons/icon.png"))
            .unwrap();
        fs::write(template.join("icons/icon.icns"), b"icns").unwrap();
        fs::write(template.join("icons/icon.ico"), b"ico").unwrap();
        Self { dir }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn settings(&self) -> Settings {
        Settings {
            template_dir: self.path("template"),
            work_dir: self.path("work"),
            output_dir: self.path("out"),
            max_parallel_jobs: 2,
            ..Settings::default()
        }
    }

    fn pipeline(&self, host: Host, toolchain: Arc<FakeToolchain>) -> Pipeline {
        Pipeline::new(self.settings(), host, toolchain)
    }
}

fn demo_all_targets() -> PackagingRequest {
    let mut request = PackagingRequest::new("https://example.com").with_name("Demo");
    request.targets = Some("all".to_string());
    request
}

fn artifacts(status: &BuildStatus) -> &[PathBuf] {
    match status {
        BuildStatus::Success { artifacts } => artifacts,
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn linux_all_targets_builds_two_independent_jobs() {
    let ws = Workspace::new();
    let toolchain = Arc::new(FakeToolchain::default());
    let report = ws
        .pipeline(LINUX, toolchain.clone())
        .run(demo_all_targets(), CancellationToken::new())
        .await
        .unwrap();

    let platforms: Vec<_> = report.results.iter().map(|r| r.platform).collect();
    assert_eq!(platforms, [ResolvedPlatform::LinuxDeb, ResolvedPlatform::LinuxAppImage]);
    assert_eq!(toolchain.calls(), platforms);

    assert_eq!(artifacts(&report.results[0].status), [ws.path("out/demo.deb")]);
    assert_eq!(artifacts(&report.results[1].status), [ws.path("out/demo.AppImage")]);
    assert!(ws.path("out/demo.deb").is_file());
    assert!(ws.path("out/demo.AppImage").is_file());
    assert_eq!(report.exit_code(), 0);

    // The staged working root is removed once the run completes.
    assert_eq!(fs::read_dir(ws.path("work")).unwrap().count(), 0);
}

#[tokio::test]
async fn one_failing_platform_does_not_affect_its_sibling() {
    let ws = Workspace::new();
    let toolchain = Arc::new(FakeToolchain::failing(ResolvedPlatform::LinuxAppImage));
    let report = ws
        .pipeline(LINUX, toolchain.clone())
        .run(demo_all_targets(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(artifacts(&report.results[0].status).len(), 1);
    match &report.results[1].status {
        BuildStatus::Failed(PakeError::BuildFailed {
            platform,
            exit_code,
            stderr_excerpt,
        }) => {
            assert_eq!(*platform, ResolvedPlatform::LinuxAppImage);
            assert_eq!(*exit_code, Some(101));
            assert!(stderr_excerpt.contains("linker `cc` not found"));
        }
        other => panic!("expected build failure, got {other:?}"),
    }
    assert_eq!(report.exit_code(), 1);
    assert!(!ws.path("out/demo.AppImage").exists());
}

#[tokio::test]
async fn staging_failure_prevents_toolchain_invocation() {
    let ws = Workspace::new();
    let toolchain = Arc::new(FakeToolchain::default());
    let mut request = demo_all_targets();
    request.icon = Some(ws.path("missing/icon.png").display().to_string());

    let report = ws
        .pipeline(LINUX, toolchain.clone())
        .run(request, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 2);
    for result in &report.results {
        assert!(
            matches!(result.status, BuildStatus::Failed(PakeError::AssetCopyError { .. })),
            "{result:?}"
        );
    }
    assert!(toolchain.calls().is_empty());
    assert_eq!(report.exit_code(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_local_asset_fails_staging_without_leftovers() {
    let ws = Workspace::new();
    let site = ws.path("site");
    fs::create_dir_all(&site).unwrap();
    fs::write(site.join("index.html"), "<link href=broken.css>").unwrap();
    std::os::unix::fs::symlink(site.join("gone.css"), site.join("broken.css")).unwrap();

    let mut request = PackagingRequest::new(site.join("index.html").display().to_string())
        .with_name("notes");
    request.copy_local_assets = true;
    request.targets = Some("all".to_string());

    let toolchain = Arc::new(FakeToolchain::default());
    let settings = Settings {
        keep_work_dir: true,
        ..ws.settings()
    };
    let report = Pipeline::new(settings, LINUX, toolchain.clone())
        .run(request, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 2);
    for result in &report.results {
        match &result.status {
            BuildStatus::Failed(PakeError::AssetCopyError { path, .. }) => {
                assert!(path.ends_with("broken.css"), "{path:?}");
            }
            other => panic!("expected asset copy failure, got {other:?}"),
        }
    }
    assert!(toolchain.calls().is_empty());
    assert_eq!(report.exit_code(), 1);

    // The kept working root holds neither partial staging trees nor job directories.
    let leftovers: Vec<_> = walkdir::WalkDir::new(ws.path("work"))
        .min_depth(2)
        .into_iter()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[tokio::test]
async fn successful_exit_without_bundle_is_a_failure() {
    let ws = Workspace::new();
    let toolchain = Arc::new(FakeToolchain {
        skip_artifacts: true,
        ..FakeToolchain::default()
    });
    let request = PackagingRequest::new("https://example.com").with_name("Demo");
    let report = ws
        .pipeline(LINUX, toolchain)
        .run(request, CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(
        &report.results[0].status,
        BuildStatus::Failed(PakeError::BuildFailed { exit_code: Some(0), .. })
    ));
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn cancellation_before_start_skips_every_job() {
    let ws = Workspace::new();
    let toolchain = Arc::new(FakeToolchain::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = ws
        .pipeline(LINUX, toolchain.clone())
        .run(demo_all_targets(), cancel)
        .await
        .unwrap();

    assert_eq!(report.skipped(), 2);
    assert!(toolchain.calls().is_empty());
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn tray_without_icon_fails_before_staging() {
    let ws = Workspace::new();
    let toolchain = Arc::new(FakeToolchain::default());
    let mut request = PackagingRequest::new("https://example.com").with_name("Demo");
    request.show_system_tray = true;

    let err = ws
        .pipeline(MAC, toolchain.clone())
        .run(request, CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, PakeError::MissingRequiredField("systemTrayIcon".to_string()));
    assert!(!ws.path("work").exists());
    assert!(toolchain.calls().is_empty());
}

#[test]
fn multi_arch_on_windows_is_unsupported() {
    let ws = Workspace::new();
    let mut request = PackagingRequest::new("https://example.com").with_name("Demo");
    request.multi_arch = true;

    let err = ws
        .pipeline(WINDOWS, Arc::new(FakeToolchain::default()))
        .plan(request)
        .unwrap_err();
    assert!(matches!(err, PakeError::UnsupportedPlatformCombo(_)));
}

#[tokio::test]
async fn multi_arch_on_macos_names_bundles_per_arch() {
    let ws = Workspace::new();
    let toolchain = Arc::new(FakeToolchain::default());
    let mut request = PackagingRequest::new("https://example.com").with_name("Demo");
    request.multi_arch = true;

    let report = ws
        .pipeline(MAC, toolchain)
        .run(request, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(artifacts(&report.results[0].status), [ws.path("out/Demo_x64.dmg")]);
    assert_eq!(artifacts(&report.results[1].status), [ws.path("out/Demo_aarch64.dmg")]);
}

#[tokio::test]
async fn identical_requests_render_identical_manifests() {
    let first = Arc::new(FakeToolchain::default());
    let second = Arc::new(FakeToolchain::default());

    for toolchain in [&first, &second] {
        let ws = Workspace::new();
        ws.pipeline(LINUX, Arc::clone(toolchain))
            .run(demo_all_targets(), CancellationToken::new())
            .await
            .unwrap();
    }

    let first = first.configs();
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|(_, tauri, pake)| !tauri.is_empty() && !pake.is_empty()));
    assert_eq!(first, second.configs());
}
