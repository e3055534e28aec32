mod cli;

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pake::orchestrator::JobEvent;
use pake::toolchain::{self, TauriToolchain, ToolchainStatus};
use pake::{Host, Pipeline, Settings};

fn main() {
    let args = cli::Args::parse();

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(if args.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    match rt.block_on(real_main(args)) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

async fn real_main(args: cli::Args) -> Result<i32> {
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(dir) = &args.output_dir {
        settings.output_dir = dir.clone();
    }
    settings.keep_work_dir |= args.keep_work_dir;

    let host = Host::detect()?;
    let mut request = args.to_request();
    if request.name.is_none() && args.interactive() {
        let suggestion = cli::suggest_name(&request.url, host.os);
        request.name = Some(cli::prompt_name(suggestion.as_deref())?);
    }

    let toolchain_settings = settings.toolchain.clone();
    let (tx, rx) = mpsc::channel::<JobEvent>(64);
    let pipeline = Pipeline::new(
        settings,
        host,
        Arc::new(TauriToolchain::new(toolchain_settings.clone())),
    )
    .with_progress(tx);

    // Reject bad options before probing or staging anything.
    let manifests = pipeline.plan(request)?;
    if let Some(first) = manifests.first() {
        let platforms: Vec<String> = manifests.iter().map(|m| m.platform().to_string()).collect();
        print_header(first.name(), &platforms);
    }

    match toolchain::probe(&toolchain_settings).await {
        ToolchainStatus::Available { program, version } => {
            info!("Using {} ({version})", program.display());
        }
        ToolchainStatus::Missing { program, reason } => {
            anyhow::bail!(
                "`{program}` is not usable ({reason}). Install Rust from https://rustup.rs \
                 and the Tauri CLI with `cargo install tauri-cli`, then retry."
            );
        }
    }

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted: pending builds will be skipped, running builds finish");
                cancel.cancel();
            }
        })
    };

    let progress_task = tokio::spawn(show_progress(rx));
    let report = pipeline
        .execute(manifests, cancel)
        .await
        .context("Packaging failed")?;
    ctrl_c.abort();

    // Dropping the pipeline closes the progress channel.
    drop(pipeline);
    progress_task.await.ok();

    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    pake::report::write_report(&mut stdout, &report).context("Failed to print build report")?;
    let _ = stdout.reset();

    Ok(report.exit_code())
}

/// One spinner per platform, driven by orchestrator events
async fn show_progress(mut rx: mpsc::Receiver<JobEvent>) {
    let multi = MultiProgress::new();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {prefix:<16} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let mut bars: HashMap<pake::ResolvedPlatform, ProgressBar> = HashMap::new();

    while let Some(event) = rx.recv().await {
        match event {
            JobEvent::Queued { platform } => {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(style.clone());
                bar.set_prefix(platform.to_string());
                bar.set_message("queued");
                bar.enable_steady_tick(Duration::from_millis(120));
                bars.insert(platform, bar);
            }
            JobEvent::Staging { platform } => {
                if let Some(bar) = bars.get(&platform) {
                    bar.set_message("staging assets");
                }
            }
            JobEvent::Building { platform } => {
                if let Some(bar) = bars.get(&platform) {
                    bar.set_message("building bundle");
                }
            }
            JobEvent::Finished { platform, ok } => {
                if let Some(bar) = bars.get(&platform) {
                    bar.finish_with_message(if ok { "done" } else { "not built" });
                }
            }
        }
    }

    for bar in bars.values() {
        if !bar.is_finished() {
            bar.finish_and_clear();
        }
    }
}

fn print_header(name: &str, platforms: &[String]) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true));
    let _ = writeln!(stdout, "📦 Packaging {name}");
    let _ = stdout.reset();
    let _ = writeln!(stdout, "Targets: {}\n", platforms.join(", "));
}
