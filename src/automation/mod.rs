use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::config::AutomationConfig;
use crate::orchestrator::{Orchestrator, RunReport, RunStatus, VideoJob};
use crate::producer::ProductionRequest;
use crate::speech::VoiceProfile;
use crate::visuals::{AspectRatio, ImageSourcingMode};
use crate::Result;

const STATS_FILE: &str = "automation_stats.json";
const SETTINGS_FILE: &str = "automation_settings.json";

/// What scheduled runs produce; seeded from configuration, then edited at runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationSettings {
    pub niche: String,
    pub voice: String,
    pub interval_hours: u64,
    pub image_source: ImageSourcingMode,
    #[serde(default)]
    pub publish_to: Vec<String>,
}

impl From<&AutomationConfig> for AutomationSettings {
    fn from(config: &AutomationConfig) -> Self {
        Self {
            niche: config.niche.clone(),
            voice: config.voice.clone(),
            interval_hours: config.interval_hours,
            image_source: config.image_source,
            publish_to: config.publish_to.clone(),
        }
    }
}

impl AutomationSettings {
    /// Load settings from `path`, falling back to `defaults` when the file is missing or unreadable
    pub fn load_or(path: &Path, defaults: &AutomationConfig) -> Self {
        let content = match fs_err::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::from(defaults),
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable settings file {}: {}", path.display(), e);
            Self::from(defaults)
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs_err::write(path, content).context("Failed to write automation settings")?;
        Ok(())
    }

    /// Apply the fields set in `update`
    pub fn apply(&mut self, update: SettingsUpdate) -> Result<()> {
        if update.interval_hours == Some(0) {
            anyhow::bail!("Automation interval must be at least one hour");
        }
        if let Some(niche) = update.niche {
            self.niche = niche;
        }
        if let Some(voice) = update.voice {
            self.voice = voice;
        }
        if let Some(hours) = update.interval_hours {
            self.interval_hours = hours;
        }
        if let Some(mode) = update.image_source {
            self.image_source = mode;
        }
        Ok(())
    }
}

/// Partial settings change; unset fields keep their current value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsUpdate {
    pub niche: Option<String>,
    pub voice: Option<String>,
    pub interval_hours: Option<u64>,
    pub image_source: Option<ImageSourcingMode>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Snapshot of the scheduler for status queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutomationStatus {
    pub running: bool,
    pub settings: AutomationSettings,
    pub stats: AutomationStats,
    pub next_run: Option<DateTime<Utc>>,
}

/// Running totals kept across scheduler restarts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutomationStats {
    #[serde(default)]
    pub videos_generated: u64,
    #[serde(default)]
    pub videos_published: u64,
    #[serde(default)]
    pub errors: u64,
    /// User-requested stops; never counted as errors
    #[serde(default)]
    pub cancelled: u64,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

impl AutomationStats {
    /// Load stats from `path`; a missing or unreadable file starts from zero
    pub fn load(path: &Path) -> Self {
        let content = match fs_err::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable stats file {}: {}", path.display(), e);
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs_err::write(path, content).context("Failed to write automation stats")?;
        Ok(())
    }

    pub fn record(&mut self, report: &RunReport) {
        match report.status {
            RunStatus::Succeeded => {
                self.videos_generated += 1;
                if !report.published.is_empty() {
                    self.videos_published += 1;
                }
                if !report.publish_errors.is_empty() {
                    self.errors += 1;
                }
            }
            RunStatus::Cancelled => self.cancelled += 1,
            RunStatus::Failed => self.errors += 1,
        }
        self.last_run = Some(report.finished_at);
    }
}

/// Topic used for scheduled runs, which pick no topic of their own
pub fn topic_for_niche(niche: &str) -> String {
    format!("The latest developments in {}", niche)
}

/// Periodic single-platform production
pub struct AutomationScheduler {
    orchestrator: Arc<Orchestrator>,
    settings: AutomationSettings,
    aspect_ratio: AspectRatio,
    settings_path: PathBuf,
    stats_path: PathBuf,
    stats: AutomationStats,
    running: bool,
    next_run: Option<DateTime<Utc>>,
    shutdown: Arc<Notify>,
}

impl AutomationScheduler {
    /// Settings saved in `state_dir` win over `defaults` from configuration
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        defaults: AutomationConfig,
        aspect_ratio: AspectRatio,
        state_dir: &Path,
    ) -> Self {
        let settings_path = state_dir.join(SETTINGS_FILE);
        let stats_path = state_dir.join(STATS_FILE);
        Self {
            orchestrator,
            settings: AutomationSettings::load_or(&settings_path, &defaults),
            aspect_ratio,
            settings_path,
            stats: AutomationStats::load(&stats_path),
            stats_path,
            running: false,
            next_run: None,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn stats(&self) -> &AutomationStats {
        &self.stats
    }

    pub fn settings(&self) -> &AutomationSettings {
        &self.settings
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Change and persist the settings; later cycles use the new values
    pub fn update_settings(&mut self, update: SettingsUpdate) -> Result<&AutomationSettings> {
        let mut settings = self.settings.clone();
        settings.apply(update)?;
        settings.save(&self.settings_path)?;
        tracing::info!(
            niche = %settings.niche,
            voice = %settings.voice,
            interval_hours = settings.interval_hours,
            "Automation settings updated"
        );
        self.settings = settings;
        Ok(&self.settings)
    }

    pub fn status(&self) -> AutomationStatus {
        AutomationStatus {
            running: self.running,
            settings: self.settings.clone(),
            stats: self.stats.clone(),
            next_run: self.next_run,
        }
    }

    /// Handle that ends `run` after the current cycle
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    fn job(&self) -> VideoJob {
        VideoJob {
            topic: topic_for_niche(&self.settings.niche),
            niche: self.settings.niche.clone(),
            use_web_context: true,
            request: ProductionRequest {
                voice: VoiceProfile::from_name(&self.settings.voice),
                aspect_ratio: self.aspect_ratio,
                image_source: self.settings.image_source,
            },
            publish_to: self.settings.publish_to.clone(),
        }
    }

    /// Run one cycle and persist the updated stats
    pub async fn run_single_cycle(&mut self) -> RunReport {
        tracing::info!(
            niche = %self.settings.niche,
            voice = %self.settings.voice,
            "Starting automation cycle"
        );

        let report = self.orchestrator.generate_single_video(&self.job()).await;
        match report.status {
            RunStatus::Succeeded => tracing::info!("Automation cycle completed"),
            RunStatus::Cancelled => tracing::warn!("Automation cycle cancelled"),
            RunStatus::Failed => tracing::error!("Automation cycle failed: {}", report.message),
        }

        self.stats.record(&report);
        if let Err(e) = self.stats.save(&self.stats_path) {
            tracing::warn!("Could not save automation stats: {:#}", e);
        }
        report
    }

    /// Run a cycle immediately and then every `interval_hours`, until shut down or
    /// `max_cycles` cycles have run
    pub async fn run(&mut self, max_cycles: Option<u64>) -> Result<()> {
        if self.settings.interval_hours == 0 {
            anyhow::bail!("Automation interval must be at least one hour");
        }
        let period = Duration::from_secs(self.settings.interval_hours * 3600);
        let mut interval = tokio::time::interval(period);
        let shutdown = self.shutdown_handle();
        let mut cycles = 0u64;

        tracing::info!("Automation started: every {}h", self.settings.interval_hours);
        self.running = true;
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.notified() => break,
            }

            let started = Utc::now();
            self.run_single_cycle().await;
            cycles += 1;
            self.next_run = Some(started + chrono::Duration::seconds(period.as_secs() as i64));
            if max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }
        }
        self.running = false;
        self.next_run = None;

        tracing::info!("Automation stopped after {} cycle(s)", cycles);
        Ok(())
    }
}
