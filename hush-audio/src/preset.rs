//! Mix presets - named scenes of sounds played together

use crate::channel::ChannelHandle;
use crate::error::EngineError;
use std::time::Duration;

/// One sound in a preset
#[derive(Debug, Clone, PartialEq)]
pub struct PresetEntry {
    pub sound_name: String,
    pub gain: f32,
    pub looping: bool,
    pub fade_in: Duration,
}

impl PresetEntry {
    pub fn new(sound_name: impl Into<String>, gain: f32, looping: bool, fade_in: Duration) -> Self {
        Self {
            sound_name: sound_name.into(),
            gain,
            looping,
            fade_in,
        }
    }
}

/// Ordered set of entries started as one scene
#[derive(Debug, Clone, PartialEq)]
pub struct MixPreset {
    pub name: String,
    pub description: String,
    pub entries: Vec<PresetEntry>,
}

impl MixPreset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            entries: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_entry(mut self, entry: PresetEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn ocean_breeze() -> Self {
        Self::new("Ocean Breeze")
            .with_description("Gentle waves with a light wind")
            .with_entry(PresetEntry::new("waves", 0.8, true, Duration::from_secs(2)))
            .with_entry(PresetEntry::new("wind", 0.3, true, Duration::from_secs(3)))
    }

    pub fn forest_night() -> Self {
        Self::new("Forest Night")
            .with_description("Rustling forest and distant crickets")
            .with_entry(PresetEntry::new("forest", 0.6, true, Duration::from_secs(2)))
            .with_entry(PresetEntry::new("crickets", 0.4, true, Duration::from_secs(4)))
    }

    pub fn thunderstorm() -> Self {
        Self::new("Thunderstorm")
            .with_description("Steady rain with rolling thunder")
            .with_entry(PresetEntry::new("rain", 0.7, true, Duration::from_secs(2)))
            .with_entry(PresetEntry::new("thunder", 0.5, true, Duration::from_secs(3)))
    }
}

/// Presets that ship with the engine
pub fn builtin_presets() -> Vec<MixPreset> {
    vec![
        MixPreset::ocean_breeze(),
        MixPreset::forest_night(),
        MixPreset::thunderstorm(),
    ]
}

/// Case-insensitive lookup among `presets`
pub fn find_preset<'a>(presets: &'a [MixPreset], name: &str) -> Option<&'a MixPreset> {
    presets.iter().find(|p| p.name.eq_ignore_ascii_case(name.trim()))
}

/// What happened to each entry of a started preset
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PresetOutcome {
    pub started: Vec<ChannelHandle>,
    /// Entries that could not start, with the reason
    pub failed: Vec<(String, EngineError)>,
}

impl PresetOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
