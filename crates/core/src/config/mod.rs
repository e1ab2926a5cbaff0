use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    tempo::{DEFAULT_MAX_BPM, DEFAULT_MIN_BPM},
    BeatScheduler, ClickSound, Result, TempoModel,
};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub tempo: TempoConfig,
    pub metronome: MetronomeConfig,
    pub library: LibraryConfig,
    /// Refresh rate of the driver loop that ticks the engine.
    pub tick_hz: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            tempo: TempoConfig::default(),
            metronome: MetronomeConfig::default(),
            library: LibraryConfig::default(),
            tick_hz: 60,
        }
    }
}

impl AppConfig {
    /// Reads a JSON configuration file. Absent fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub block_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            block_size: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub min_bpm: u32,
    pub max_bpm: u32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            min_bpm: DEFAULT_MIN_BPM,
            max_bpm: DEFAULT_MAX_BPM,
        }
    }
}

impl TempoConfig {
    pub fn model(&self) -> TempoModel {
        TempoModel::with_range(self.min_bpm, self.max_bpm)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub enabled: bool,
    pub lookahead_ms: u32,
    pub click_frequency_hz: f32,
    pub click_duration_ms: u32,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            lookahead_ms: 100,
            click_frequency_hz: crate::audio::CLICK_FREQUENCY_HZ,
            click_duration_ms: 80,
        }
    }
}

impl MetronomeConfig {
    pub fn scheduler(&self) -> BeatScheduler {
        let mut scheduler = BeatScheduler::new(self.lookahead_ms as f64 / 1000.0);
        scheduler.set_enabled(self.enabled);
        scheduler
    }

    pub fn click_sound(&self, sample_rate: u32) -> ClickSound {
        ClickSound::generate(
            sample_rate,
            self.click_frequency_hz,
            self.click_duration_ms as f32 / 1000.0,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub database_path: PathBuf,
    /// Directory preset asset paths are resolved against.
    pub assets_root: PathBuf,
    /// When set (and HTTP support is built), presets are downloaded from here.
    pub preset_base_url: Option<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("drumpro").join("library.sqlite3"),
            assets_root: PathBuf::from("."),
            preset_base_url: None,
        }
    }
}
