//! Engine service - runs the engine on its own control thread
//!
//! All calls are marshalled to one thread as commands, so the engine sees
//! them one at a time. The same loop drains render completions, resumes calls
//! whose sounds finished decoding on worker threads, and drives the fade
//! tick, which only exists while fades are live.

use crate::channel::{ChannelHandle, ChannelInfo};
use crate::config::CacheLimits;
use crate::engine::{MixingEngine, PlayOptions};
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::inserts::InsertSettings;
use crate::interruption::{InterruptionState, RouteChange};
use crate::loads::LoadedBuffers;
use crate::preset::{MixPreset, PresetOutcome};
use crossbeam_channel::{bounded, never, select, tick, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// Depth of the command queue
const COMMAND_QUEUE: usize = 1024;

type EngineJob = Box<dyn FnOnce(&mut MixingEngine) + Send>;

/// Commands to the control thread
pub enum EngineCommand {
    /// Run a closure against the engine
    Run(EngineJob),
    Shutdown,
}

/// Owner of the control thread
pub struct EngineService;

impl EngineService {
    /// Build the engine on a new control thread
    ///
    /// `build` runs on that thread, so backends that must stay on the thread
    /// that created them (cpal streams) are fine. Returns once the engine
    /// has started or failed to.
    pub fn spawn<F>(build: F) -> Result<EngineHandle, EngineError>
    where
        F: FnOnce() -> Result<MixingEngine, EngineError> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = bounded::<EngineCommand>(COMMAND_QUEUE);
        let (ready_tx, ready_rx) = bounded::<Result<Receiver<EngineEvent>, EngineError>>(1);

        let thread = thread::Builder::new()
            .name("hush-engine".into())
            .spawn(move || {
                let mut engine = match build() {
                    Ok(engine) => engine,
                    Err(e) => {
                        error!(error = %e, "engine failed to start");
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let events = engine.subscribe();
                if ready_tx.send(Ok(events)).is_err() {
                    return;
                }
                run_loop(&mut engine, &cmd_rx);
                engine.shutdown();
            })
            .map_err(|e| EngineError::EngineNotRunning(e.to_string()))?;

        let events = match ready_rx.recv() {
            Ok(Ok(events)) => events,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(EngineError::EngineNotRunning("control thread exited".into()));
            }
        };

        info!("engine service started");
        Ok(EngineHandle {
            commands: cmd_tx,
            events,
            thread: Some(thread),
        })
    }
}

fn run_loop(engine: &mut MixingEngine, commands: &Receiver<EngineCommand>) {
    let render_events = engine.render_events();
    let loads = engine.load_events();
    let interval = engine.config().fade_tick;
    let mut ticker: Option<Receiver<std::time::Instant>> = None;

    loop {
        // Fade timer runs only while there is something to fade
        match (engine.needs_fade_tick(), ticker.is_some()) {
            (true, false) => ticker = Some(tick(interval)),
            (false, true) => ticker = None,
            _ => {}
        }
        let fade_tick = ticker.clone().unwrap_or_else(never);

        select! {
            recv(commands) -> cmd => match cmd {
                Ok(EngineCommand::Run(job)) => job(&mut *engine),
                Ok(EngineCommand::Shutdown) | Err(_) => {
                    debug!("engine service shutting down");
                    break;
                }
            },
            recv(render_events) -> event => {
                if let Ok(event) = event {
                    engine.handle_render_event(event);
                }
            },
            recv(loads) -> done => {
                if let Ok(done) = done {
                    engine.handle_load(done);
                }
            },
            recv(fade_tick) -> _ => engine.advance_fades(),
        }
    }
}

/// Front end to the control thread. Dropping it shuts the thread down.
pub struct EngineHandle {
    commands: Sender<EngineCommand>,
    events: Receiver<EngineEvent>,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Run `f` on the control thread and wait for its result
    pub fn call<R, F>(&self, f: F) -> Result<R, EngineError>
    where
        R: Send + 'static,
        F: FnOnce(&mut MixingEngine) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = bounded(1);
        let job: EngineJob = Box::new(move |engine| {
            let _ = reply_tx.send(f(engine));
        });
        self.commands
            .send(EngineCommand::Run(job))
            .map_err(|_| EngineError::ServiceStopped)?;
        reply_rx.recv().map_err(|_| EngineError::ServiceStopped)
    }

    /// Like `call`, but first gets `names` decoded without holding up the
    /// control thread
    ///
    /// The caller waits for the decodes; fades and other calls carry on.
    pub fn call_loaded<R, F>(&self, names: Vec<String>, f: F) -> Result<R, EngineError>
    where
        R: Send + 'static,
        F: FnOnce(&mut MixingEngine, &LoadedBuffers) -> R + Send + 'static,
    {
        self.call(move |engine| {
            let (reply_tx, reply_rx) = bounded(1);
            engine.load_then(&names, move |engine, loaded| {
                let _ = reply_tx.send(f(engine, loaded));
            });
            reply_rx
        })?
        .recv()
        .map_err(|_| EngineError::ServiceStopped)
    }

    /// Engine notifications
    pub fn events(&self) -> &Receiver<EngineEvent> {
        &self.events
    }

    pub fn play_sound(&self, sound_name: &str, options: PlayOptions) -> Result<ChannelHandle, EngineError> {
        let name = sound_name.to_string();
        self.call_loaded(vec![name.clone()], move |e, loaded| e.play_loaded(&name, options, loaded))?
    }

    pub fn stop_sound(&self, handle: ChannelHandle, fade_out: Duration) -> Result<(), EngineError> {
        self.call(move |e| e.stop_sound(handle, fade_out))
    }

    pub fn stop_all(&self, fade_out: Duration) -> Result<(), EngineError> {
        self.call(move |e| e.stop_all(fade_out))
    }

    pub fn force_stop_all(&self) -> Result<(), EngineError> {
        self.call(|e| e.force_stop_all())
    }

    pub fn set_channel_volume(&self, handle: ChannelHandle, gain: f32) -> Result<(), EngineError> {
        self.call(move |e| e.set_channel_volume(handle, gain))?
    }

    pub fn fade_channel(&self, handle: ChannelHandle, target: f32, duration: Duration) -> Result<(), EngineError> {
        self.call(move |e| e.fade_channel(handle, target, duration))?
    }

    pub fn crossfade(
        &self,
        from: ChannelHandle,
        sound_name: &str,
        gain: f32,
        duration: Duration,
    ) -> Result<ChannelHandle, EngineError> {
        let name = sound_name.to_string();
        self.call_loaded(vec![name.clone()], move |e, loaded| {
            e.crossfade_loaded(from, &name, gain, duration, loaded)
        })?
    }

    pub fn set_master_volume(&self, gain: f32) -> Result<(), EngineError> {
        self.call(move |e| e.set_master_volume(gain))
    }

    pub fn set_muted(&self, muted: bool) -> Result<(), EngineError> {
        self.call(move |e| e.set_muted(muted))
    }

    pub fn play_preset(&self, preset: MixPreset) -> Result<PresetOutcome, EngineError> {
        let names = preset.entries.iter().map(|e| e.sound_name.clone()).collect();
        self.call_loaded(names, move |e, loaded| e.play_preset_loaded(&preset, loaded))
    }

    pub fn interruption_began(&self) -> Result<(), EngineError> {
        self.call(|e| e.interruption_began())
    }

    pub fn interruption_ended(&self, should_resume: bool) -> Result<(), EngineError> {
        self.call(move |e| e.interruption_ended(should_resume))
    }

    pub fn route_changed(&self, change: RouteChange) -> Result<(), EngineError> {
        self.call(move |e| e.route_changed(change))
    }

    pub fn resume_output(&self) -> Result<bool, EngineError> {
        self.call(|e| e.resume_output())
    }

    pub fn set_insert(&self, settings: InsertSettings) -> Result<(), EngineError> {
        self.call(move |e| e.set_insert(settings))
    }

    pub fn clear_buffer_cache(&self) -> Result<(), EngineError> {
        self.call(|e| e.clear_buffer_cache())
    }

    pub fn set_cache_limits(&self, limits: CacheLimits) -> Result<(), EngineError> {
        self.call(move |e| e.set_cache_limits(limits))
    }

    pub fn channels(&self) -> Result<Vec<ChannelInfo>, EngineError> {
        self.call(|e| e.channels())
    }

    pub fn master_volume(&self) -> Result<f32, EngineError> {
        self.call(|e| e.master_volume())
    }

    pub fn interruption_state(&self) -> Result<InterruptionState, EngineError> {
        self.call(|e| e.interruption_state())
    }

    /// Stop the control thread and wait for it
    pub fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.commands.send(EngineCommand::Shutdown);
            if thread.join().is_err() {
                error!("engine thread panicked");
            }
            info!("engine service stopped");
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
