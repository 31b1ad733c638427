use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Result, ShowError};

/// Top-level configuration structure for the installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub analyzer: AnalyzerConfig,
    pub layers: Vec<LayerConfig>,
    /// Seed for scene picks and rotation jitter. `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            analyzer: AnalyzerConfig::default(),
            layers: vec![LayerConfig::named("background"), LayerConfig::named("foreground")],
            seed: None,
        }
    }
}

impl AppConfig {
    /// Returns the settings used by the installation when no file is given.
    pub fn live_defaults() -> Self {
        Self::default()
    }

    /// Parses a JSON document and validates the result.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialises the configuration as indented JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns the layer configured under `name`.
    pub fn layer(&self, name: &str) -> Option<&LayerConfig> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    /// Checks every section, returning the first configuration error.
    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.analyzer.validate()?;
        for layer in &self.layers {
            layer.validate()?;
        }
        Ok(())
    }
}

/// Configuration specific to the audio input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Number of samples handed to the analyzer per display frame.
    pub block_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 1024,
        }
    }
}

impl AudioConfig {
    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ShowError::InvalidConfig("sample_rate must be positive".into()));
        }
        if self.block_size == 0 {
            return Err(ShowError::InvalidConfig("block_size must be positive".into()));
        }
        Ok(())
    }
}

/// Feature extractor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Gain applied to volume and band levels before clamping to [0, 1].
    pub volume_sensitivity: f32,
    pub beat: BeatConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            volume_sensitivity: 1.0,
            beat: BeatConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    fn validate(&self) -> Result<()> {
        if !self.volume_sensitivity.is_finite() || self.volume_sensitivity < 0.0 {
            return Err(ShowError::InvalidConfig(format!(
                "volume_sensitivity must be a non-negative number, got {}",
                self.volume_sensitivity
            )));
        }
        self.beat.validate()
    }
}

/// Adaptive threshold beat detector settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BeatConfig {
    /// Multiplier applied to the triggering volume to form the next cutoff.
    pub sensitivity: f32,
    /// Volumes below this never trigger and let the cutoff fall toward zero.
    pub minimum_volume: f32,
    /// Analysis cycles during which a new beat is suppressed after a hit.
    pub hold_frames: u32,
    /// Fraction of the cutoff removed per decaying cycle, in [0, 1].
    pub decay_rate: f32,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            sensitivity: 1.1,
            minimum_volume: 0.2,
            hold_frames: 45,
            decay_rate: 0.05,
        }
    }
}

impl BeatConfig {
    fn validate(&self) -> Result<()> {
        if !self.sensitivity.is_finite() || self.sensitivity < 0.0 {
            return Err(ShowError::InvalidConfig(format!(
                "beat sensitivity must be a non-negative number, got {}",
                self.sensitivity
            )));
        }
        if !self.minimum_volume.is_finite() || !(0.0..=1.0).contains(&self.minimum_volume) {
            return Err(ShowError::InvalidConfig(format!(
                "beat minimum_volume must lie in [0, 1], got {}",
                self.minimum_volume
            )));
        }
        if !self.decay_rate.is_finite() || !(0.0..=1.0).contains(&self.decay_rate) {
            return Err(ShowError::InvalidConfig(format!(
                "beat decay_rate must lie in [0, 1], got {}",
                self.decay_rate
            )));
        }
        Ok(())
    }
}

/// Per-layer rotation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayerConfig {
    pub name: String,
    pub interval_min_ms: u64,
    pub interval_max_ms: u64,
    /// Scene started before the first rotation. Defaults to the reserved
    /// empty scene.
    pub initial_scene: Option<String>,
    /// When set, a manual `stop` also invalidates the pending rotation so the
    /// layer stays idle until the next command. Off by default: a stopped
    /// layer resumes at its next scheduled rotation.
    pub stop_cancels_rotation: bool,
    /// Exclude the current scene from random picks.
    pub avoid_repeats: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            name: "layer".to_string(),
            interval_min_ms: 5 * 60 * 1000,
            interval_max_ms: 10 * 60 * 1000,
            initial_scene: None,
            stop_cancels_rotation: false,
            avoid_repeats: false,
        }
    }
}

impl LayerConfig {
    /// Creates a layer with default timing.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Replaces the rotation interval bounds, truncated to milliseconds.
    pub fn with_interval(mut self, min: Duration, max: Duration) -> Self {
        self.interval_min_ms = min.as_millis() as u64;
        self.interval_max_ms = max.as_millis() as u64;
        self
    }

    pub fn interval_min(&self) -> Duration {
        Duration::from_millis(self.interval_min_ms)
    }

    pub fn interval_max(&self) -> Duration {
        Duration::from_millis(self.interval_max_ms)
    }

    /// Rejects an interval whose minimum exceeds its maximum.
    pub fn validate(&self) -> Result<()> {
        if self.interval_min_ms > self.interval_max_ms {
            return Err(ShowError::InvalidInterval {
                layer: self.name.clone(),
                min: self.interval_min(),
                max: self.interval_max(),
            });
        }
        Ok(())
    }
}
