use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::automation::SettingsUpdate;
use crate::visuals::{AspectRatio, ImageSourcingMode};

#[derive(Parser)]
#[command(
    name = "reelforge",
    about = "Reelforge - Turn a topic or a content package into a narrated, branded video",
    version,
    long_about = "A content-automation CLI: drafts a script with a language model, narrates it, sources images by generation or web search, assembles intro, content and outro segments with background music using ffmpeg, and publishes or archives the result to object storage."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (defaults to ./reelforge.yaml or the user config directory)
    #[arg(short, long, global = true, env = "REELFORGE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Produce a video from a content package JSON file
    Produce {
        /// Content package with `script` and `image_prompts` (title, description, tags optional)
        #[arg(value_name = "CONTENT_JSON")]
        content: PathBuf,

        #[command(flatten)]
        production: ProductionArgs,

        /// Publish the finished video to these platforms
        #[arg(long, value_name = "PLATFORM")]
        publish: Vec<String>,

        /// Report format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Also write the report to this file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Draft content for a topic with the language model, then produce the video
    Generate {
        /// What the video is about
        #[arg(value_name = "TOPIC")]
        topic: String,

        /// Channel niche used to frame the script
        #[arg(short, long, default_value = "Technology")]
        niche: String,

        /// Research the topic on the web before drafting
        #[arg(long)]
        research: bool,

        #[command(flatten)]
        production: ProductionArgs,

        /// Publish the finished video to these platforms
        #[arg(long, value_name = "PLATFORM")]
        publish: Vec<String>,

        /// Report format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Also write the report to this file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Produce and publish on a fixed interval using the automation settings
    Automate {
        /// Stop after this many cycles
        #[arg(long, value_name = "COUNT")]
        cycles: Option<u64>,

        /// Run a single cycle now and exit
        #[arg(long, conflicts_with = "cycles")]
        once: bool,

        /// Show settings and totals, then exit
        #[arg(long, conflicts_with_all = ["once", "cycles"])]
        status: bool,

        #[command(flatten)]
        settings: AutomationSettingsArgs,
    },

    /// Show or initialise the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// Check that ffmpeg and ffprobe are available
    Doctor,

    /// List configured publishing platforms
    Platforms,
}

/// Per-run production overrides; unset values fall back to configuration
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ProductionArgs {
    /// Voice profile (female_voice, male_voice)
    #[arg(long, value_name = "VOICE")]
    pub voice: Option<String>,

    /// Aspect ratio (16:9, 9:16, 1:1)
    #[arg(long, value_name = "RATIO")]
    pub aspect_ratio: Option<AspectRatio>,

    /// Where images come from
    #[arg(long, value_enum)]
    pub images: Option<ImageSourcingMode>,
}

/// Saved automation settings to change; any of them updates the settings file and exits
#[derive(clap::Args, Debug, Clone, Default)]
pub struct AutomationSettingsArgs {
    /// New niche for scheduled runs
    #[arg(long, value_name = "NICHE", conflicts_with_all = ["once", "cycles"])]
    pub set_niche: Option<String>,

    /// New voice profile for scheduled runs
    #[arg(long, value_name = "VOICE", conflicts_with_all = ["once", "cycles"])]
    pub set_voice: Option<String>,

    /// New interval between runs, in hours
    #[arg(
        long,
        value_name = "HOURS",
        value_parser = clap::value_parser!(u64).range(1..),
        conflicts_with_all = ["once", "cycles"]
    )]
    pub set_interval: Option<u64>,

    /// New image source for scheduled runs
    #[arg(long, value_enum, value_name = "MODE", conflicts_with_all = ["once", "cycles"])]
    pub set_images: Option<ImageSourcingMode>,
}

impl AutomationSettingsArgs {
    pub fn into_update(self) -> SettingsUpdate {
        SettingsUpdate {
            niche: self.set_niche,
            voice: self.set_voice,
            interval_hours: self.set_interval,
            image_source: self.set_images,
        }
    }
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human readable summary
    Text,
    /// Run report as JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}
