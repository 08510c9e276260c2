//! Reelforge - A Rust CLI content-automation hub
//!
//! This library drafts a content package with a language model, narrates it, sources
//! imagery, assembles a branded video with ffmpeg and hands the result to publishers
//! or object storage.

pub mod automation;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod content;
pub mod orchestrator;
pub mod output;
pub mod producer;
pub mod publish;
pub mod research;
pub mod speech;
pub mod storage;
pub mod timeline;
pub mod utils;
pub mod visuals;

pub use cancel::CancellationToken;
pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use content::{ContentGenerator, ContentPackage, Script};
pub use orchestrator::{Orchestrator, RunReport, RunStatus};
pub use producer::{ProductionOutcome, ProductionRequest, RenderedVideo, Stage, VideoProducer};
pub use storage::AssetStore;
pub use timeline::{MediaToolkit, TimelineAssembler, TimelineSegment};
pub use visuals::{AspectRatio, ImageAsset, ImageSourcingMode};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to content production
#[derive(thiserror::Error, Debug)]
pub enum ForgeError {
    #[error("Invalid content package: {0}")]
    Validation(String),

    #[error("Cancelled before {0}")]
    Cancelled(Stage),

    #[error("Audio generation failed: {0}")]
    AudioGeneration(String),

    #[error("Production failed during {stage}: {cause:#}")]
    Production { stage: Stage, cause: anyhow::Error },

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Publishing failed: {0}")]
    Publish(String),
}

impl ForgeError {
    /// Wrap an unexpected failure raised while running `stage`
    pub fn production(stage: Stage, cause: impl Into<anyhow::Error>) -> Self {
        ForgeError::Production {
            stage,
            cause: cause.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ForgeError::Cancelled(_))
    }
}
