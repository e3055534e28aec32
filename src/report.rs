//! Terminal rendering of a [`BuildReport`]

use std::io::{self, Write};

use termcolor::{Color, ColorSpec, WriteColor};

use crate::orchestrator::{BuildReport, BuildStatus};

/// Write one line per platform plus a summary line
pub fn write_report<W: WriteColor>(out: &mut W, report: &BuildReport) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(out, "\nBuild report")?;
    out.reset()?;

    for result in &report.results {
        let (mark, color) = match &result.status {
            BuildStatus::Success { .. } => ("✓", Color::Green),
            BuildStatus::Failed(_) => ("✗", Color::Red),
            BuildStatus::Skipped(_) => ("-", Color::Yellow),
        };
        out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
        write!(out, "  {mark} {:<16}", result.platform.as_str())?;
        out.reset()?;

        match &result.status {
            BuildStatus::Success { artifacts } => {
                let paths: Vec<String> = artifacts.iter().map(|p| p.display().to_string()).collect();
                writeln!(out, "{}", paths.join(", "))?;
            }
            BuildStatus::Failed(e) => writeln!(out, "{e}")?,
            BuildStatus::Skipped(reason) => writeln!(out, "skipped: {reason}")?,
        }
    }

    let summary_color = if report.failed() > 0 { Color::Red } else { Color::Green };
    out.set_color(ColorSpec::new().set_fg(Some(summary_color)))?;
    writeln!(
        out,
        "\n{} succeeded, {} failed, {} skipped",
        report.succeeded(),
        report.failed(),
        report.skipped()
    )?;
    out.reset()
}
