//! Preset files
//!
//! Plain text, one preset per `[Name]` section:
//!
//! ```text
//! # comments start with '#'
//! [Rainy Cabin]
//! description = Rain on the roof with a crackling fire
//! rain 0.7 loop 2
//! fire 0.4 loop 3.5
//! ```
//!
//! Entry lines are `sound gain loop|once fade_in_secs`; the last two fields
//! are optional (default `loop 0`).

use hush_audio::{MixPreset, PresetEntry};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PresetFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

fn parse_error(line: usize, message: impl Into<String>) -> PresetFileError {
    PresetFileError::Parse {
        line,
        message: message.into(),
    }
}

/// Default presets file (`<config dir>/hush/presets.txt`)
pub fn default_presets_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hush")
        .join("presets.txt")
}

pub fn load_presets(path: &Path) -> Result<Vec<MixPreset>, PresetFileError> {
    let content = fs::read_to_string(path)?;
    parse_presets(&content)
}

pub fn save_presets(path: &Path, presets: &[MixPreset]) -> Result<(), PresetFileError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format_presets(presets))?;
    Ok(())
}

pub fn parse_presets(content: &str) -> Result<Vec<MixPreset>, PresetFileError> {
    let mut presets: Vec<MixPreset> = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[') {
            let name = header
                .strip_suffix(']')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| parse_error(line_no, "malformed section header"))?;
            presets.push(MixPreset::new(name));
            continue;
        }

        let preset = presets
            .last_mut()
            .ok_or_else(|| parse_error(line_no, "entry before any [preset] header"))?;

        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "description" => preset.description = value.trim().to_string(),
                other => return Err(parse_error(line_no, format!("unknown key '{other}'"))),
            }
            continue;
        }

        preset.entries.push(parse_entry(line, line_no)?);
    }

    Ok(presets)
}

fn parse_entry(line: &str, line_no: usize) -> Result<PresetEntry, PresetFileError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let (sound, rest) = match fields.split_first() {
        Some((sound, rest)) if !rest.is_empty() && rest.len() <= 3 => (*sound, rest),
        _ => return Err(parse_error(line_no, "expected: sound gain [loop|once] [fade]")),
    };

    let gain: f32 = rest[0]
        .parse()
        .map_err(|_| parse_error(line_no, format!("invalid gain '{}'", rest[0])))?;
    if !(0.0..=1.0).contains(&gain) {
        return Err(parse_error(line_no, format!("gain {gain} outside 0..1")));
    }

    let looping = match rest.get(1).copied() {
        None | Some("loop") | Some("true") => true,
        Some("once") | Some("false") => false,
        Some(other) => return Err(parse_error(line_no, format!("invalid loop flag '{other}'"))),
    };

    let fade_in = match rest.get(2) {
        None => Duration::ZERO,
        Some(s) => {
            let secs: f64 = s
                .parse()
                .map_err(|_| parse_error(line_no, format!("invalid fade '{s}'")))?;
            if !secs.is_finite() || secs < 0.0 {
                return Err(parse_error(line_no, format!("invalid fade '{s}'")));
            }
            Duration::from_secs_f64(secs)
        }
    };

    Ok(PresetEntry::new(sound, gain, looping, fade_in))
}

pub fn format_presets(presets: &[MixPreset]) -> String {
    let mut out = String::from("# Hush presets\n");
    for preset in presets {
        out.push_str(&format!("\n[{}]\n", preset.name));
        if !preset.description.is_empty() {
            out.push_str(&format!("description = {}\n", preset.description));
        }
        for entry in &preset.entries {
            out.push_str(&format!(
                "{} {} {} {}\n",
                entry.sound_name,
                entry.gain,
                if entry.looping { "loop" } else { "once" },
                entry.fade_in.as_secs_f64()
            ));
        }
    }
    out
}
