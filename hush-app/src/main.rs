//! Hush - ambient sound mixer
//!
//! Line-oriented console around the mixing engine. Reads commands from
//! stdin and prints engine events as they arrive.

mod command;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use crossbeam_channel::Receiver;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hush_audio::{
    builtin_presets, find_preset, CacheLimits, ChannelHandle, ChannelInfo, CpalOutput, DelaySettings, EngineConfig,
    EngineError, EngineEvent, EngineHandle, EngineService, EqSettings, InsertSettings, MixPreset, MixingEngine,
    MixingEngineContext, PlayOptions, ReverbSettings, RouteChange,
};
use hush_library::{default_presets_path, load_presets, Config, SoundCatalog, SoundLoader};

use command::{parse_command, Command, Target, HELP};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hush=info")))
        .with_writer(io::stderr)
        .init();

    let config = Config::load();
    let sounds_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| config.sounds_dir.clone())
        .unwrap_or_else(SoundCatalog::default_root);
    let catalog = SoundCatalog::new(&sounds_dir);
    info!(sounds = %sounds_dir.display(), "using sound directory");

    // Render at whatever the device prefers; decoded buffers follow it
    let (sample_rate, output_channels) = CpalOutput::default_config().unwrap_or_else(|e| {
        warn!(error = %e, "could not query output device, assuming 48 kHz stereo");
        (48000, 2)
    });
    let engine_config = config.engine_config(EngineConfig {
        sample_rate,
        output_channels,
        ..EngineConfig::default()
    });

    let mut service = {
        let catalog = catalog.clone();
        let engine_config = engine_config.clone();
        EngineService::spawn(move || {
            let ctx = MixingEngineContext::new(
                engine_config.clone(),
                Arc::new(catalog),
                Arc::new(SoundLoader::new(engine_config.sample_rate)),
                Box::new(CpalOutput::new()),
            );
            MixingEngine::start(ctx)
        })
        .context("failed to start audio engine")?
    };

    if let Some(preset) = config.eq_preset {
        service.set_insert(InsertSettings::Equalizer(EqSettings::from_preset(preset)))?;
    }

    let presets = load_all_presets();
    let printer = spawn_event_printer(service.events().clone(), config);

    println!("hush - type 'help' for commands");
    let mut console = Console {
        service: &service,
        catalog: &catalog,
        presets: &presets,
        delay: DelaySettings::default(),
        reverb: ReverbSettings::default(),
    };
    let stdin = io::stdin();
    prompt();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            prompt();
            continue;
        }
        match parse_command(&line) {
            Some(Command::Quit) => break,
            Some(cmd) => {
                if let Err(e) = console.run(cmd) {
                    println!("error: {e}");
                }
            }
            None => println!("unrecognised command, try 'help'"),
        }
        prompt();
    }

    service.shutdown();
    let _ = printer.join();
    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

/// User presets file first, so it can override a builtin of the same name
fn load_all_presets() -> Vec<MixPreset> {
    let path = default_presets_path();
    let mut presets = if path.exists() {
        load_presets(&path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "ignoring presets file");
            Vec::new()
        })
    } else {
        Vec::new()
    };
    presets.extend(builtin_presets());
    presets
}

/// Print events until the engine goes away. Master volume changes are persisted.
fn spawn_event_printer(events: Receiver<EngineEvent>, mut config: Config) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for event in events.iter() {
            match event {
                EngineEvent::ChannelStarted { handle, sound_name } => println!("\n[{handle}] {sound_name} started"),
                EngineEvent::ChannelStopped(handle) => println!("\n[{handle}] stopped"),
                EngineEvent::FadeCompleted(handle) => println!("\n[{handle}] fade complete"),
                EngineEvent::InterruptionChanged(state) => println!("\noutput: {state:?}"),
                EngineEvent::Error(message) => println!("\nengine error: {message}"),
                EngineEvent::MasterVolumeChanged(volume) => {
                    println!("\nmaster volume {volume:.2}");
                    config.master_volume = volume;
                    if let Err(e) = config.save() {
                        warn!(error = %e, "could not save config");
                    }
                }
            }
        }
    })
}

struct Console<'a> {
    service: &'a EngineHandle,
    catalog: &'a SoundCatalog,
    presets: &'a [MixPreset],
    delay: DelaySettings,
    reverb: ReverbSettings,
}

impl Console<'_> {
    fn run(&mut self, cmd: Command) -> anyhow::Result<()> {
        let service = self.service;
        match cmd {
            Command::Play {
                sound,
                gain,
                fade_in,
                looping,
            } => {
                let options = PlayOptions::default()
                    .with_gain(gain)
                    .with_looping(looping)
                    .with_fade_in(fade_in);
                let handle = service.play_sound(&sound, options)?;
                println!("playing {sound} on {handle}");
            }
            Command::Stop(target, fade) => service.stop_sound(self.resolve(&target)?, fade)?,
            Command::StopAll(fade) => service.stop_all(fade)?,
            Command::ForceStopAll => service.force_stop_all()?,
            Command::Volume(target, gain) => service.set_channel_volume(self.resolve(&target)?, gain)?,
            Command::Fade(target, gain, duration) => service.fade_channel(self.resolve(&target)?, gain, duration)?,
            Command::Crossfade {
                from,
                sound,
                gain,
                duration,
            } => {
                let handle = service.crossfade(self.resolve(&from)?, &sound, gain, duration)?;
                println!("crossfading to {sound} on {handle}");
            }
            Command::Master(gain) => service.set_master_volume(gain)?,
            Command::Mute(muted) => service.set_muted(muted)?,
            Command::Preset(name) => {
                let preset = find_preset(self.presets, &name)
                    .with_context(|| format!("no preset named '{name}'"))?
                    .clone();
                let outcome = service.play_preset(preset)?;
                for (sound, error) in &outcome.failed {
                    println!("  {sound}: {error}");
                }
                println!("{} of the preset's sounds started", outcome.started.len());
            }
            Command::ListPresets => {
                for preset in self.presets {
                    let sounds: Vec<_> = preset.entries.iter().map(|e| e.sound_name.as_str()).collect();
                    println!("  {:<16} {} ({})", preset.name, preset.description, sounds.join(", "));
                }
            }
            Command::Interrupt => service.interruption_began()?,
            Command::EndInterruption { resume } => service.interruption_ended(resume)?,
            Command::Unplug => service.route_changed(RouteChange::OldDeviceUnavailable)?,
            Command::Resume => {
                if !service.resume_output()? {
                    println!("output is not paused");
                }
            }
            Command::Eq(preset) => {
                let settings = preset.map(EqSettings::from_preset).unwrap_or_default();
                service.set_insert(InsertSettings::Equalizer(settings))?;
            }
            Command::Reverb(room) => {
                self.reverb.enabled = room.is_some();
                if let Some(room) = room {
                    self.reverb.room = room;
                }
                service.set_insert(InsertSettings::Reverb(self.reverb.clone()))?;
            }
            Command::Delay(time) => {
                self.delay.enabled = time.is_some();
                if let Some(time) = time {
                    self.delay.time = time;
                }
                service.set_insert(InsertSettings::Delay(self.delay.clone()))?;
            }
            Command::ClearCache => service.clear_buffer_cache()?,
            Command::Background(background) => {
                let limits = if background {
                    CacheLimits::background()
                } else {
                    CacheLimits::foreground()
                };
                service.set_cache_limits(limits)?;
            }
            Command::Sounds => {
                let sounds = self
                    .catalog
                    .list()
                    .with_context(|| format!("cannot read {}", self.catalog.root().display()))?;
                if sounds.is_empty() {
                    println!("no sounds in {}", self.catalog.root().display());
                }
                for sound in sounds {
                    println!("  {:<16} {}", sound.name, sound.display_name);
                }
            }
            Command::Status => self.print_status()?,
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
        Ok(())
    }

    fn resolve(&self, target: &Target) -> anyhow::Result<ChannelHandle> {
        let channels = self.service.channels()?;
        let found = channels.iter().find(|c| match target {
            Target::Id(id) => c.handle.id() == *id,
            Target::Sound(name) => c.sound_name == *name,
        });
        match (found, target) {
            (Some(channel), _) => Ok(channel.handle),
            (None, Target::Id(id)) => Err(EngineError::ChannelNotFound(*id).into()),
            (None, Target::Sound(name)) => anyhow::bail!("'{name}' is not playing"),
        }
    }

    fn print_status(&self) -> Result<(), EngineError> {
        let (channels, master, muted, state) = self
            .service
            .call(|e| (e.channels(), e.master_volume(), e.is_muted(), e.interruption_state()))?;
        println!(
            "master {master:.2}{}  output {state:?}",
            if muted { " (muted)" } else { "" }
        );
        if channels.is_empty() {
            println!("  nothing playing");
        }
        for ChannelInfo {
            handle,
            sound_name,
            gain,
            looping,
            state,
        } in channels
        {
            let mode = if looping { "loop" } else { "once" };
            println!("  {:<5} {sound_name:<12} {gain:.2} {mode} {state:?}", handle.to_string());
        }
        Ok(())
    }
}
