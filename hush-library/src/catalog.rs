//! Sound catalog backed by a directory of audio files
//!
//! A sound's name is its file stem: `sounds/ocean.flac` is "ocean".

use hush_audio::AssetResolver;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions tried, in order, when resolving a name
pub const SOUND_EXTENSIONS: &[&str] = &["wav", "flac", "ogg", "mp3", "m4a", "aac"];

/// One sound the catalog knows about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundEntry {
    /// Identifier used to play the sound
    pub name: String,
    pub path: PathBuf,
    /// Human-readable name ("ocean_waves" becomes "Ocean Waves")
    pub display_name: String,
}

/// Resolves sound names to files under one directory
#[derive(Debug, Clone)]
pub struct SoundCatalog {
    root: PathBuf,
}

impl SoundCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default sounds directory (`<data dir>/hush/sounds`)
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hush")
            .join("sounds")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every playable file in the directory, sorted by name
    pub fn list(&self) -> io::Result<Vec<SoundEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() || !has_sound_extension(&path) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            entries.push(SoundEntry {
                name: name.to_string(),
                display_name: display_name(name),
                path,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries.dedup_by(|a, b| a.name == b.name);
        Ok(entries)
    }
}

impl AssetResolver for SoundCatalog {
    fn resolve_asset(&self, name: &str) -> Option<PathBuf> {
        // Names are bare stems; anything path-like is not in the catalog
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return None;
        }
        let found = SOUND_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{name}.{ext}")))
            .find(|path| path.is_file());
        if found.is_none() {
            debug!(sound = name, root = %self.root.display(), "sound not in catalog");
        }
        found
    }
}

fn has_sound_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SOUND_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn display_name(stem: &str) -> String {
    stem.split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
