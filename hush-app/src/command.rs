//! Console command parsing

use hush_audio::{EqPreset, ReverbRoom};
use std::time::Duration;

/// A channel named on the command line, by id (`3`, `ch3`) or sound name
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Id(u64),
    Sound(String),
}

impl Target {
    fn parse(s: &str) -> Self {
        let digits = s.strip_prefix("ch").unwrap_or(s);
        match digits.parse() {
            Ok(id) => Target::Id(id),
            Err(_) => Target::Sound(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play {
        sound: String,
        gain: f32,
        fade_in: Duration,
        looping: bool,
    },
    Stop(Target, Duration),
    StopAll(Duration),
    ForceStopAll,
    Volume(Target, f32),
    Fade(Target, f32, Duration),
    Crossfade {
        from: Target,
        sound: String,
        gain: f32,
        duration: Duration,
    },
    Master(f32),
    Mute(bool),
    Preset(String),
    ListPresets,
    Interrupt,
    EndInterruption { resume: bool },
    Unplug,
    Resume,
    Eq(Option<EqPreset>),
    Reverb(Option<ReverbRoom>),
    Delay(Option<f32>),
    ClearCache,
    Background(bool),
    Sounds,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  play <sound> [gain] [fade_s] [once]   start a sound
  stop <ch|sound> [fade_s]              stop one channel
  stopall [fade_s] | kill               stop everything (kill: no fade)
  vol <ch|sound> <gain>                 set channel volume
  fade <ch|sound> <gain> <secs>         fade a channel to a volume
  xfade <ch|sound> <sound> <secs> [gain] crossfade to another sound
  master <gain> | mute | unmute         master output
  preset <name> | presets               start or list presets
  interrupt | end [noresume] | unplug | resume
  eq <preset|off> | reverb <room|off> | delay <secs|off>
  cache clear | background | foreground
  sounds | status | help | quit";

fn secs(s: &str) -> Option<Duration> {
    let v: f64 = s.parse().ok()?;
    (v.is_finite() && v >= 0.0).then(|| Duration::from_secs_f64(v))
}

fn gain(s: &str) -> Option<f32> {
    s.parse::<f32>().ok().filter(|g| g.is_finite())
}

/// Parse one console line
pub fn parse_command(input: &str) -> Option<Command> {
    let words: Vec<&str> = input.split_whitespace().collect();
    let (&verb, args) = words.split_first()?;

    let cmd = match (verb, args) {
        ("q" | "quit" | "exit", []) => Command::Quit,
        ("help" | "?", []) => Command::Help,
        ("sounds" | "ls", []) => Command::Sounds,
        ("status" | "st", []) => Command::Status,
        ("presets", []) => Command::ListPresets,
        ("kill", []) => Command::ForceStopAll,
        ("mute", []) => Command::Mute(true),
        ("unmute", []) => Command::Mute(false),
        ("interrupt", []) => Command::Interrupt,
        ("end", []) => Command::EndInterruption { resume: true },
        ("end", ["noresume"]) => Command::EndInterruption { resume: false },
        ("unplug", []) => Command::Unplug,
        ("resume", []) => Command::Resume,
        ("cache", ["clear"]) => Command::ClearCache,
        ("background", []) => Command::Background(true),
        ("foreground", []) => Command::Background(false),

        ("play", [sound, rest @ ..]) if rest.len() <= 3 => {
            let mut gain_v = 1.0;
            let mut fade_in = Duration::ZERO;
            let mut looping = true;
            let mut numbers = 0;
            for arg in rest {
                if *arg == "once" {
                    looping = false;
                } else if numbers == 0 {
                    gain_v = gain(arg)?;
                    numbers += 1;
                } else if numbers == 1 {
                    fade_in = secs(arg)?;
                    numbers += 1;
                } else {
                    return None;
                }
            }
            Command::Play {
                sound: sound.to_string(),
                gain: gain_v,
                fade_in,
                looping,
            }
        }
        ("stop", [target]) => Command::Stop(Target::parse(target), Duration::ZERO),
        ("stop", [target, fade]) => Command::Stop(Target::parse(target), secs(fade)?),
        ("stopall", []) => Command::StopAll(Duration::ZERO),
        ("stopall", [fade]) => Command::StopAll(secs(fade)?),
        ("vol", [target, g]) => Command::Volume(Target::parse(target), gain(g)?),
        ("fade", [target, g, d]) => Command::Fade(Target::parse(target), gain(g)?, secs(d)?),
        ("xfade", [from, sound, d, rest @ ..]) if rest.len() <= 1 => Command::Crossfade {
            from: Target::parse(from),
            sound: sound.to_string(),
            duration: secs(d)?,
            gain: match rest.first() {
                Some(g) => gain(g)?,
                None => 1.0,
            },
        },
        ("master", [g]) => Command::Master(gain(g)?),
        ("preset", [_, ..]) => Command::Preset(args.join(" ")),
        ("eq", ["off"]) => Command::Eq(None),
        ("eq", [name]) => Command::Eq(Some(EqPreset::from_name(name)?)),
        ("reverb", ["off"]) => Command::Reverb(None),
        ("reverb", [name]) => Command::Reverb(Some(ReverbRoom::from_name(name)?)),
        ("delay", ["off"]) => Command::Delay(None),
        ("delay", [time]) => Command::Delay(Some(secs(time)?.as_secs_f32())),
        _ => return None,
    };
    Some(cmd)
}
