//! Sound library for Hush - catalog, decoding, preset files and config

mod catalog;
mod config;
mod loader;
mod presets;

pub use catalog::{SoundCatalog, SoundEntry, SOUND_EXTENSIONS};
pub use config::Config;
pub use loader::{DecodeError, SoundLoader};
pub use presets::{
    default_presets_path, format_presets, load_presets, parse_presets, save_presets, PresetFileError,
};
