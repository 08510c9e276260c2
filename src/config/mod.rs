use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::visuals::{AspectRatio, ImageSourcingMode};
use crate::ForgeError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Object storage used for archival and publishing
    pub storage: StorageConfig,

    /// Video production settings
    pub production: ProductionConfig,

    /// Per-call network timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Scheduled production settings
    #[serde(default)]
    pub automation: AutomationConfig,

    /// External API settings; keys are normally supplied through the environment
    #[serde(default)]
    pub apis: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bucket (or Space) name; empty disables object storage
    pub bucket: String,

    /// Region name
    pub region: String,

    /// Custom S3 endpoint, e.g. `https://nyc3.digitaloceanspaces.com`
    pub endpoint_url: Option<String>,

    /// Base URL used to build public references (defaults to endpoint/bucket)
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Optional key prefix for every archived object
    pub key_prefix: Option<String>,

    /// Archive into a local directory when no bucket is configured
    #[serde(default)]
    pub local_dir: Option<PathBuf>,

    /// Also archive narration and images, not only final renders
    #[serde(default)]
    pub archive_intermediates: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionConfig {
    /// Root for run workspaces, rendered videos and automation state
    pub data_dir: PathBuf,

    /// Brand asset directory (`visual_identity/intro_logo.png`, `visual_identity/outro_card.png`)
    pub assets_dir: PathBuf,

    /// Background music pool; defaults to `{assets_dir}/music`
    #[serde(default)]
    pub music_dir: Option<PathBuf>,

    /// Intro length in seconds
    pub intro_seconds: f64,

    /// Outro length in seconds
    pub outro_seconds: f64,

    /// Output frame rate
    pub fps: u32,

    /// Background music gain relative to the track (0.0 - 1.0)
    pub music_volume: f64,

    /// Intro/outro background colour
    pub brand_color: String,

    /// Background colour when no image could be sourced
    pub content_fallback_color: String,

    /// Intro logo height as a fraction of frame height
    pub logo_height_ratio: f64,

    /// Default voice profile name
    pub default_voice: String,

    /// Default aspect ratio
    pub default_aspect_ratio: AspectRatio,

    /// Default image sourcing mode
    pub default_image_source: ImageSourcingMode,

    /// ffmpeg binary
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,

    /// ffprobe binary
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub tts_secs: u64,
    pub image_generation_secs: u64,
    pub image_search_secs: u64,
    pub image_fetch_secs: u64,
    pub llm_secs: u64,
    pub research_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Niche the scheduler produces for
    pub niche: String,

    /// Voice profile for scheduled runs
    pub voice: String,

    /// Hours between runs
    pub interval_hours: u64,

    /// Image sourcing mode for scheduled runs
    pub image_source: ImageSourcingMode,

    /// Publishers to hand finished videos to
    pub publish_to: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serper_api_key: Option<String>,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: default_openai_model(),
            stability_api_key: None,
            serper_api_key: None,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            tts_secs: 30,
            image_generation_secs: 30,
            image_search_secs: 10,
            image_fetch_secs: 5,
            llm_secs: 60,
            research_secs: 15,
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            niche: "Artificial Intelligence".to_string(),
            voice: "female_voice".to_string(),
            interval_hours: 48,
            image_source: ImageSourcingMode::Generated,
            publish_to: vec!["object-storage".to_string()],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                bucket: "".to_string(),
                region: "nyc3".to_string(),
                endpoint_url: None,
                public_base_url: None,
                key_prefix: Some("reelforge/".to_string()),
                local_dir: None,
                archive_intermediates: false,
            },
            production: ProductionConfig {
                data_dir: PathBuf::from("reelforge-data"),
                assets_dir: PathBuf::from("assets"),
                music_dir: None,
                intro_seconds: 3.0,
                outro_seconds: 5.0,
                fps: 24,
                music_volume: 0.1,
                brand_color: "#0d1117".to_string(),
                content_fallback_color: "#000000".to_string(),
                logo_height_ratio: 0.2,
                default_voice: "female_voice".to_string(),
                default_aspect_ratio: AspectRatio::Landscape,
                default_image_source: ImageSourcingMode::Generated,
                ffmpeg_path: default_ffmpeg(),
                ffprobe_path: default_ffprobe(),
            },
            timeouts: TimeoutConfig::default(),
            automation: AutomationConfig::default(),
            apis: ApiConfig::default(),
        }
    }
}

impl TimeoutConfig {
    pub fn tts(&self) -> Duration {
        Duration::from_secs(self.tts_secs)
    }

    pub fn image_generation(&self) -> Duration {
        Duration::from_secs(self.image_generation_secs)
    }

    pub fn image_search(&self) -> Duration {
        Duration::from_secs(self.image_search_secs)
    }

    pub fn image_fetch(&self) -> Duration {
        Duration::from_secs(self.image_fetch_secs)
    }

    pub fn llm(&self) -> Duration {
        Duration::from_secs(self.llm_secs)
    }

    pub fn research(&self) -> Duration {
        Duration::from_secs(self.research_secs)
    }
}

impl ProductionConfig {
    pub fn music_dir(&self) -> PathBuf {
        self.music_dir
            .clone()
            .unwrap_or_else(|| self.assets_dir.join("music"))
    }

    pub fn intro_logo(&self) -> PathBuf {
        self.assets_dir.join("visual_identity").join("intro_logo.png")
    }

    pub fn outro_card(&self) -> PathBuf {
        self.assets_dir.join("visual_identity").join("outro_card.png")
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.data_dir.join("generated_videos")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.data_dir.join("work")
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = Self::config_path(explicit)?;

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;
            Self::from_yaml(&content)?
        } else {
            let config = Self::default();
            config.save_to(&config_path).await?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            config
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)
            .context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        // First try current directory for easy testing
        let local_config = PathBuf::from("reelforge.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("reelforge").join("config.yaml"))
    }

    /// Overlay secrets and deployment settings from the environment
    pub fn apply_env(&mut self) {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(key) = var("OPENAI_API_KEY") {
            self.apis.openai_api_key = Some(key);
        }
        if let Some(key) = var("STABILITY_AI_API_KEY") {
            self.apis.stability_api_key = Some(key);
        }
        if let Some(key) = var("SERPER_API_KEY") {
            self.apis.serper_api_key = Some(key);
        }
        if let Some(bucket) = var("DO_SPACES_NAME") {
            self.storage.bucket = bucket;
        }
        if let Some(region) = var("DO_SPACES_REGION") {
            self.storage.region = region;
        }
        if let Some(endpoint) = var("DO_SPACES_ENDPOINT_URL") {
            self.storage.endpoint_url = Some(endpoint);
        }
        if let Some(data_dir) = var("DATA_PATH") {
            self.production.data_dir = PathBuf::from(data_dir);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let production = &self.production;

        if production.fps == 0 {
            return Err(ForgeError::Config("fps must be greater than zero".into()).into());
        }
        if production.intro_seconds <= 0.0 || production.outro_seconds <= 0.0 {
            return Err(
                ForgeError::Config("intro and outro durations must be positive".into()).into(),
            );
        }
        if !(0.0..=1.0).contains(&production.music_volume) {
            return Err(ForgeError::Config(format!(
                "music volume must be between 0 and 1, got {}",
                production.music_volume
            ))
            .into());
        }
        if production.logo_height_ratio <= 0.0 || production.logo_height_ratio > 1.0 {
            return Err(ForgeError::Config("logo height ratio must be in (0, 1]".into()).into());
        }

        crate::timeline::RgbColor::parse(&production.brand_color)?;
        crate::timeline::RgbColor::parse(&production.content_fallback_color)?;

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        let set = |value: &Option<String>| if value.is_some() { "set" } else { "not set" };

        println!("Current Configuration:");
        if self.storage.bucket.is_empty() {
            println!("  Object Storage: disabled");
        } else {
            println!("  Bucket: {}", self.storage.bucket);
            println!("  Region: {}", self.storage.region);
            if let Some(endpoint) = &self.storage.endpoint_url {
                println!("  Endpoint: {}", endpoint);
            }
        }
        if let Some(prefix) = &self.storage.key_prefix {
            println!("  Key Prefix: {}", prefix);
        }
        println!("  Data Dir: {}", self.production.data_dir.display());
        println!("  Assets Dir: {}", self.production.assets_dir.display());
        println!(
            "  Intro/Outro: {}s / {}s at {} fps",
            self.production.intro_seconds, self.production.outro_seconds, self.production.fps
        );
        println!("  Music Volume: {}", self.production.music_volume);
        println!("  OpenAI Key: {}", set(&self.apis.openai_api_key));
        println!("  Stability Key: {}", set(&self.apis.stability_api_key));
        println!("  Serper Key: {}", set(&self.apis.serper_api_key));
    }
}
