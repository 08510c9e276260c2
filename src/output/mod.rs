use anyhow::Result;
use console::style;
use std::fmt::Write as _;
use std::path::Path;

use crate::automation::{AutomationStats, AutomationStatus};
use crate::cli::OutputFormat;
use crate::orchestrator::{RunReport, RunStatus};
use crate::utils::{file_size, format_duration, format_file_size};

/// Render a run report in the requested format
pub fn render_report(report: &RunReport, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format_as_text(report)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

/// Print a run report to the console
pub fn print_report(report: &RunReport, format: &OutputFormat) -> Result<()> {
    println!("{}", render_report(report, format)?);
    Ok(())
}

/// Save a run report next to other run artifacts
pub async fn save_report(report: &RunReport, path: &Path, format: &OutputFormat) -> Result<()> {
    let content = render_report(report, format)?;
    fs_err::write(path, content)?;
    Ok(())
}

pub fn format_as_text(report: &RunReport) -> String {
    let mut out = String::new();

    let status = match report.status {
        RunStatus::Succeeded => style("✔ Succeeded").green().bold(),
        RunStatus::Cancelled => style("■ Cancelled").yellow().bold(),
        RunStatus::Failed => style("✘ Failed").red().bold(),
    };
    let _ = writeln!(out, "{}", status);

    if let Some(title) = &report.title {
        let _ = writeln!(out, "Title:    {}", title);
    }

    if let Some(video) = &report.video {
        let _ = writeln!(out, "Video:    {}", video.path.display());
        let _ = writeln!(
            out,
            "Duration: {} (narration {})",
            format_duration(video.duration_seconds),
            format_duration(video.narration_seconds)
        );
        let _ = writeln!(
            out,
            "Segments: {} content, {} image(s)",
            video.content_segments, video.images_used
        );
        if let Some(size) = file_size(&video.path) {
            let _ = writeln!(out, "Size:     {}", format_file_size(size));
        }
        if let Some(reference) = &video.archive_ref {
            let _ = writeln!(out, "Archive:  {}", reference);
        }
    }

    if let Some(stage) = report.cancelled_before {
        let _ = writeln!(out, "Stopped before {}", stage);
    }

    for receipt in &report.published {
        let _ = writeln!(out, "Published to {}: {}", receipt.platform, receipt.reference);
    }
    for error in &report.publish_errors {
        let _ = writeln!(out, "{} {}", style("Publish error:").red(), error);
    }

    if report.status != RunStatus::Succeeded {
        let _ = writeln!(out, "{}", report.message);
    }

    let elapsed = (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0;
    let _ = write!(out, "Elapsed:  {}", format_duration(elapsed.max(0.0)));
    out
}

pub fn format_stats(stats: &AutomationStats) -> String {
    let last_run = stats
        .last_run
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    format!(
        "Generated: {}  Published: {}  Errors: {}  Cancelled: {}  Last run: {}",
        stats.videos_generated, stats.videos_published, stats.errors, stats.cancelled, last_run
    )
}

/// Scheduler state, settings and totals as a short text block
pub fn format_status(status: &AutomationStatus) -> String {
    let mut out = String::new();
    let state = if status.running {
        style("running").green().bold()
    } else {
        style("idle").yellow().bold()
    };
    let settings = &status.settings;

    let _ = writeln!(out, "Automation: {}", state);
    let _ = writeln!(out, "Niche:      {}", settings.niche);
    let _ = writeln!(out, "Voice:      {}", settings.voice);
    let _ = writeln!(out, "Interval:   every {}h", settings.interval_hours);
    let _ = writeln!(out, "Images:     {}", settings.image_source);
    if !settings.publish_to.is_empty() {
        let _ = writeln!(out, "Publish to: {}", settings.publish_to.join(", "));
    }
    if let Some(next) = status.next_run {
        let _ = writeln!(out, "Next run:   {}", next.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    let _ = write!(out, "{}", format_stats(&status.stats));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::{RenderedVideo, Stage};
    use chrono::Utc;
    use std::path::PathBuf;

    fn report(status: RunStatus) -> RunReport {
        RunReport {
            status,
            message: "Operation cancelled by user".to_string(),
            title: Some("Robots".to_string()),
            video: None,
            cancelled_before: None,
            published: Vec::new(),
            publish_errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_text_report_for_success() {
        let mut success = report(RunStatus::Succeeded);
        success.video = Some(RenderedVideo {
            path: PathBuf::from("/videos/video_1.mp4"),
            duration_seconds: 17.5,
            narration_seconds: 9.5,
            content_segments: 1,
            images_used: 1,
            archive_ref: Some("https://cdn.example/v.mp4".to_string()),
        });

        let text = format_as_text(&success);
        assert!(text.contains("Succeeded"));
        assert!(text.contains("/videos/video_1.mp4"));
        assert!(text.contains("Duration: 17.5s (narration 9.5s)"));
        assert!(text.contains("Archive:  https://cdn.example/v.mp4"));
        assert!(!text.contains("Operation cancelled"));
    }

    #[test]
    fn test_text_report_for_cancellation() {
        let mut cancelled = report(RunStatus::Cancelled);
        cancelled.cancelled_before = Some(Stage::ResolveImages);
        let text = format_as_text(&cancelled);
        assert!(text.contains("Stopped before image sourcing"));
        assert!(text.contains("Operation cancelled by user"));
    }

    #[test]
    fn test_json_report() {
        let json = render_report(&report(RunStatus::Failed), &OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["title"], "Robots");
    }

    #[test]
    fn test_format_status_lists_settings() {
        use crate::automation::AutomationSettings;
        use crate::config::AutomationConfig;

        let status = AutomationStatus {
            running: false,
            settings: AutomationSettings::from(&AutomationConfig::default()),
            stats: AutomationStats::default(),
            next_run: None,
        };
        let text = console::strip_ansi_codes(&format_status(&status)).to_string();
        assert!(text.starts_with("Automation: idle"));
        assert!(text.contains("Niche:      Artificial Intelligence"));
        assert!(text.contains("Interval:   every 48h"));
        assert!(text.contains("Images:     generated"));
        assert!(!text.contains("Next run"));
        assert!(text.ends_with("Last run: never"));
    }

    #[test]
    fn test_format_stats() {
        let stats = AutomationStats {
            videos_generated: 3,
            errors: 1,
            ..Default::default()
        };
        assert_eq!(
            format_stats(&stats),
            "Generated: 3  Published: 0  Errors: 1  Cancelled: 0  Last run: never"
        );
    }
}
