//! User configuration for Hush
//!
//! Stored as `key=value` lines. Unknown keys and unparsable values are
//! ignored so an old or hand-edited file never stops the app starting.

use hush_audio::{clamp_gain, EngineConfig, EqPreset};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the sound files
    pub sounds_dir: Option<PathBuf>,
    pub master_volume: f32,
    pub max_channels: usize,
    pub fade_tick_ms: u64,
    /// Equalizer preset applied at startup
    pub eq_preset: Option<EqPreset>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sounds_dir: None,
            master_volume: 1.0,
            max_channels: EngineConfig::DEFAULT_MAX_CHANNELS,
            fade_tick_ms: EngineConfig::DEFAULT_FADE_TICK.as_millis() as u64,
            eq_preset: None,
        }
    }
}

impl Config {
    /// Load config from the default location
    ///
    /// Returns default config if the file doesn't exist or can't be read.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn save(&self) -> io::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())
    }

    /// Default config file path (`<config dir>/hush/config.txt`)
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hush")
            .join("config.txt")
    }

    /// Engine settings derived from this config, on top of `base`
    pub fn engine_config(&self, base: EngineConfig) -> EngineConfig {
        EngineConfig {
            max_channels: self.max_channels,
            fade_tick: Duration::from_millis(self.fade_tick_ms),
            initial_master_volume: self.master_volume,
            ..base
        }
    }

    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "sounds_dir" => {
                    if !value.is_empty() {
                        config.sounds_dir = Some(PathBuf::from(value));
                    }
                }
                "master_volume" => match value.parse::<f32>() {
                    Ok(v) => config.master_volume = clamp_gain(v),
                    Err(_) => warn!(key, value, "ignoring invalid config value"),
                },
                "max_channels" => match value.parse::<usize>() {
                    Ok(v) if v > 0 => config.max_channels = v,
                    _ => warn!(key, value, "ignoring invalid config value"),
                },
                "fade_tick_ms" => match value.parse::<u64>() {
                    Ok(v) if v > 0 => config.fade_tick_ms = v,
                    _ => warn!(key, value, "ignoring invalid config value"),
                },
                "eq_preset" => match EqPreset::from_name(value) {
                    Some(preset) => config.eq_preset = Some(preset),
                    None => warn!(key, value, "ignoring invalid config value"),
                },
                _ => {}
            }
        }

        config
    }

    fn serialize(&self) -> String {
        let mut lines = vec!["# Hush configuration".to_string()];

        if let Some(ref dir) = self.sounds_dir {
            lines.push(format!("sounds_dir={}", dir.display()));
        }
        lines.push(format!("master_volume={}", self.master_volume));
        lines.push(format!("max_channels={}", self.max_channels));
        lines.push(format!("fade_tick_ms={}", self.fade_tick_ms));
        if let Some(preset) = self.eq_preset {
            lines.push(format!("eq_preset={}", preset.name()));
        }

        lines.join("\n")
    }
}
