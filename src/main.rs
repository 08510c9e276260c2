use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reelforge::automation::AutomationScheduler;
use reelforge::cli::{Cli, Commands, LogFormat, ProductionArgs};
use reelforge::orchestrator::VideoJob;
use reelforge::output;
use reelforge::speech::VoiceProfile;
use reelforge::utils;
use reelforge::{Config, ContentPackage, Orchestrator, OutputFormat, ProductionRequest, RunReport};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Produce {
            content,
            production,
            publish,
            format,
            output,
        } => {
            let raw = fs_err::read_to_string(&content)?;
            let package = ContentPackage::from_json(&raw)
                .with_context(|| format!("Invalid content package {}", content.display()))?;
            let request = production_request(&production, &config);

            let orchestrator = Arc::new(Orchestrator::from_config(&config).await?);
            stop_on_ctrl_c(Arc::clone(&orchestrator));

            let report = with_spinner(
                cli.quiet,
                format!("Producing \"{}\"", package.title),
                orchestrator.produce_from_package(&package, &request, &publish),
            )
            .await;

            finish(&report, &format, output.as_deref()).await?;
        }
        Commands::Generate {
            topic,
            niche,
            research,
            production,
            publish,
            format,
            output,
        } => {
            let job = VideoJob {
                request: production_request(&production, &config),
                topic,
                niche,
                use_web_context: research,
                publish_to: publish,
            };

            let orchestrator = Arc::new(Orchestrator::from_config(&config).await?);
            stop_on_ctrl_c(Arc::clone(&orchestrator));

            let report = with_spinner(
                cli.quiet,
                format!("Generating a video about \"{}\"", job.topic),
                orchestrator.generate_single_video(&job),
            )
            .await;

            finish(&report, &format, output.as_deref()).await?;
        }
        Commands::Automate {
            cycles,
            once,
            status,
            settings,
        } => {
            let orchestrator = Arc::new(Orchestrator::from_config(&config).await?);
            let mut scheduler = AutomationScheduler::new(
                Arc::clone(&orchestrator),
                config.automation.clone(),
                config.production.default_aspect_ratio,
                &config.production.data_dir,
            );

            let update = settings.into_update();
            if status || !update.is_empty() {
                if !update.is_empty() {
                    scheduler.update_settings(update)?;
                    println!(
                        "Automation settings saved to {}",
                        scheduler.settings_path().display()
                    );
                }
                println!("{}", output::format_status(&scheduler.status()));
                return Ok(());
            }

            let shutdown = scheduler.shutdown_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Stop requested, finishing after the current stage");
                    orchestrator.trigger_stop();
                    shutdown.notify_one();
                }
            });

            if once {
                let report = scheduler.run_single_cycle().await;
                output::print_report(&report, &OutputFormat::Text)?;
            } else {
                scheduler.run(cycles).await?;
            }
            println!("{}", output::format_stats(scheduler.stats()));
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = Config::config_path(cli.config.as_deref())?;
                println!("Configuration file: {}", path.display());
                println!("Edit it directly or run `reelforge config --show` to review it.");
            }
        }
        Commands::Doctor => {
            let missing = utils::check_dependencies(
                &config.production.ffmpeg_path,
                &config.production.ffprobe_path,
            )
            .await;
            if !missing.is_empty() {
                eprintln!("Missing dependencies:");
                for dep in &missing {
                    eprintln!("   • {}", dep);
                }
                anyhow::bail!("{} required tool(s) unavailable", missing.len());
            }
            println!("ffmpeg and ffprobe are available");
        }
        Commands::Platforms => {
            let orchestrator = Orchestrator::from_config(&config).await?;
            let platforms = orchestrator.list_platforms();
            if platforms.is_empty() {
                println!("No publishing platforms configured; videos stay in the local videos directory.");
            } else {
                println!("Configured platforms:");
                for platform in platforms {
                    println!("  • {}", platform);
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_filter = if verbose { "reelforge=debug" } else { "reelforge=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

/// Command-line overrides win, then configured defaults
fn production_request(args: &ProductionArgs, config: &Config) -> ProductionRequest {
    let defaults = &config.production;
    ProductionRequest {
        voice: VoiceProfile::from_name(args.voice.as_deref().unwrap_or(&defaults.default_voice)),
        aspect_ratio: args.aspect_ratio.unwrap_or(defaults.default_aspect_ratio),
        image_source: args.images.unwrap_or(defaults.default_image_source),
    }
}

fn stop_on_ctrl_c(orchestrator: Arc<Orchestrator>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Stop requested, finishing after the current stage");
            orchestrator.trigger_stop();
        }
    });
}

async fn with_spinner<F>(quiet: bool, message: String, run: F) -> RunReport
where
    F: Future<Output = RunReport>,
{
    if quiet {
        return run.await;
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));

    let report = run.await;
    spinner.finish_and_clear();
    report
}

async fn finish(report: &RunReport, format: &OutputFormat, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            output::save_report(report, path, format).await?;
            println!("Report saved to: {}", path.display());
        }
        None => output::print_report(report, format)?,
    }

    if report.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Run {}: {}", report.status, report.message)
    }
}
