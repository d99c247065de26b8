// Engine settings and persistence
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Playback preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSettings {
    pub volume: f32,          // 0.0 - 1.0
    pub progress_tick_ms: u64, // cadence of progress updates
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            progress_tick_ms: 100,
        }
    }
}

/// Download preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Where saved narrations land; None means the caller decides per save.
    pub export_dir: Option<PathBuf>,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self { export_dir: None }
    }
}

/// Engine settings, persisted as JSON next to the host application's data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub playback: PlaybackSettings,
    #[serde(default)]
    pub download: DownloadSettings,
}

impl EngineSettings {
    /// Get the settings file path
    pub fn settings_path(app_dir: &Path) -> PathBuf {
        app_dir.join("audio-settings.json")
    }

    /// Load settings from file, or return defaults if the file doesn't exist
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = Self::settings_path(app_dir);

        if !path.exists() {
            log::debug!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file {:?}", path))?;

        let settings: EngineSettings =
            serde_json::from_str(&content).context("Failed to parse settings")?;

        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, app_dir: &Path) -> Result<()> {
        fs::create_dir_all(app_dir)
            .with_context(|| format!("Failed to create settings directory {:?}", app_dir))?;

        let path = Self::settings_path(app_dir);
        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;

        fs::write(&path, content)
            .with_context(|| format!("Failed to write settings file {:?}", path))?;

        Ok(())
    }
}
