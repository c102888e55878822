//! Mixing engine - the control-path façade
//!
//! Composes the buffer store, channel registry, fade scheduler, render graph
//! and interruption coordinator. Every method takes `&mut self`, so calls are
//! applied strictly in order; `EngineService` puts the engine on its own
//! thread when several callers need it.

use crate::buffer::{AssetResolver, BufferStore, SharedBuffer, SoundDecoder};
use crate::channel::{clamp_gain, ChannelHandle, ChannelInfo, ChannelRegistry, ChannelState};
use crate::clock::{Clock, SystemClock};
use crate::config::{CacheLimits, EngineConfig};
use crate::error::EngineError;
use crate::events::{EngineEvent, Notifier};
use crate::fade::{FadeAction, FadeScheduler};
use crate::graph::{MixGraph, RenderEvent, SharedGraph};
use crate::inserts::InsertSettings;
use crate::interruption::{InterruptionCoordinator, InterruptionState, PauseReason, RouteChange};
use crate::loads::{LoadCompleted, LoadQueue, LoadedBuffers};
use crate::output::{AudioOutput, OutputInfo};
use crate::preset::{MixPreset, PresetOutcome};
use crossbeam_channel::{bounded, Receiver};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Depth of the render-to-control completion queue
const RENDER_EVENT_QUEUE: usize = 1024;

/// Everything the engine needs from the outside world
pub struct MixingEngineContext {
    pub config: EngineConfig,
    pub resolver: Arc<dyn AssetResolver>,
    pub decoder: Arc<dyn SoundDecoder>,
    pub output: Box<dyn AudioOutput>,
    pub clock: Arc<dyn Clock>,
}

impl MixingEngineContext {
    pub fn new(
        config: EngineConfig,
        resolver: Arc<dyn AssetResolver>,
        decoder: Arc<dyn SoundDecoder>,
        output: Box<dyn AudioOutput>,
    ) -> Self {
        Self {
            config,
            resolver,
            decoder,
            output,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source (tests drive fades with a manual clock)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// How to start a sound
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayOptions {
    /// Target gain in [0, 1]
    pub gain: f32,
    pub looping: bool,
    /// Zero starts at full gain
    pub fade_in: Duration,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            gain: 1.0,
            looping: true,
            fade_in: Duration::ZERO,
        }
    }
}

impl PlayOptions {
    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_fade_in(mut self, fade_in: Duration) -> Self {
        self.fade_in = fade_in;
        self
    }
}

/// Multi-channel mixing engine
pub struct MixingEngine {
    config: EngineConfig,
    store: BufferStore,
    registry: ChannelRegistry,
    fades: FadeScheduler,
    graph: SharedGraph,
    interruption: InterruptionCoordinator,
    output: Box<dyn AudioOutput>,
    output_info: OutputInfo,
    clock: Arc<dyn Clock>,
    master: f32,
    muted: bool,
    notifier: Notifier,
    render_rx: Receiver<RenderEvent>,
    loads: LoadQueue,
}

impl MixingEngine {
    /// Build the render graph and start the output backend
    ///
    /// A backend that fails to start is reported once as `EngineNotRunning`.
    pub fn start(ctx: MixingEngineContext) -> Result<Self, EngineError> {
        let MixingEngineContext {
            config,
            resolver,
            decoder,
            mut output,
            clock,
        } = ctx;

        let (render_tx, render_rx) = bounded(RENDER_EVENT_QUEUE);
        let master = clamp_gain(config.initial_master_volume);
        let mut graph = MixGraph::new(config.sample_rate, config.output_channels, render_tx);
        graph.set_master(master);
        let graph = graph.into_shared();

        let output_info = output.start(Arc::clone(&graph)).map_err(|e| {
            error!(backend = output.name(), error = %e, "output failed to start");
            EngineError::from(e)
        })?;
        info!(
            backend = output_info.backend,
            sample_rate = output_info.sample_rate,
            channels = output_info.channels,
            max_channels = config.max_channels,
            "mixing engine started"
        );

        Ok(Self {
            store: BufferStore::new(resolver, decoder, config.cache),
            registry: ChannelRegistry::new(config.max_channels, Arc::clone(&graph)),
            fades: FadeScheduler::new(config.fade_tick),
            graph,
            interruption: InterruptionCoordinator::new(),
            output,
            output_info,
            clock,
            master,
            muted: false,
            notifier: Notifier::new(),
            render_rx,
            loads: LoadQueue::new(),
            config,
        })
    }

    /// Start a sound on a new channel
    ///
    /// On failure nothing about the current mix changes. A sound that is not
    /// cached yet is decoded on the calling thread; `load_then` keeps the
    /// decode elsewhere.
    pub fn play_sound(&mut self, sound_name: &str, options: PlayOptions) -> Result<ChannelHandle, EngineError> {
        self.play_from(sound_name, options, None)
    }

    /// `play_sound` with the buffer taken from a finished `load_then`
    pub fn play_loaded(
        &mut self,
        sound_name: &str,
        options: PlayOptions,
        loaded: &LoadedBuffers,
    ) -> Result<ChannelHandle, EngineError> {
        self.play_from(sound_name, options, Some(loaded))
    }

    fn buffer_for(&self, sound_name: &str, loaded: Option<&LoadedBuffers>) -> Result<SharedBuffer, EngineError> {
        let result = match loaded.and_then(|l| l.get(sound_name)) {
            Some(result) => result.clone(),
            None => self.store.acquire(sound_name).map_err(EngineError::from),
        };
        if let Err(e) = &result {
            warn!(sound = sound_name, error = %e, "failed to load sound");
        }
        result
    }

    fn play_from(
        &mut self,
        sound_name: &str,
        options: PlayOptions,
        loaded: Option<&LoadedBuffers>,
    ) -> Result<ChannelHandle, EngineError> {
        let buffer = self.buffer_for(sound_name, loaded)?;
        if self.registry.is_full() {
            warn!(sound = sound_name, max = self.registry.max_channels(), "channel capacity exceeded");
            return Err(EngineError::CapacityExceeded {
                max: self.registry.max_channels(),
            });
        }

        // A new sound while paused is a user action: bring output back first
        if self.interruption.state().is_interrupted() {
            self.resume_output();
        }

        let gain = clamp_gain(options.gain);
        let start_gain = if options.fade_in.is_zero() { gain } else { 0.0 };
        let handle = self.registry.create(sound_name, buffer, start_gain, options.looping)?;

        // Loops keep one pass queued ahead so rescheduling never leaves a gap
        let passes = if options.looping { 2 } else { 1 };
        self.graph.lock().schedule(handle, passes);

        let now = self.clock.now();
        if let Some(channel) = self.registry.get_mut(handle) {
            channel.set_state(ChannelState::Playing);
            if !options.fade_in.is_zero() {
                self.fades
                    .start_fade(channel, gain, options.fade_in, now, FadeAction::Notify);
            }
        }

        info!(
            channel = %handle,
            sound = sound_name,
            gain,
            looping = options.looping,
            fade_in_ms = options.fade_in.as_millis() as u64,
            "sound started"
        );
        self.notifier.emit(EngineEvent::ChannelStarted {
            handle,
            sound_name: sound_name.to_string(),
        });
        Ok(handle)
    }

    /// Stop a channel, optionally fading it out first
    ///
    /// Unknown or already-removed handles are ignored. A channel already
    /// fading out keeps its current fade unless `fade_out` is zero.
    pub fn stop_sound(&mut self, handle: ChannelHandle, fade_out: Duration) {
        let interrupted = self.interruption.state().is_interrupted();
        let now = self.clock.now();
        let Some(channel) = self.registry.get_mut(handle) else {
            debug!(channel = %handle, "stop ignored, channel not live");
            return;
        };

        // Paused output would never advance the fade
        if fade_out.is_zero() || interrupted {
            self.remove_channel(handle);
            return;
        }
        if channel.state() == ChannelState::Stopping {
            return;
        }
        self.fades
            .start_fade(channel, 0.0, fade_out, now, FadeAction::Remove);
    }

    /// Stop every live channel; with a fade, each is removed as its own fade ends
    pub fn stop_all(&mut self, fade_out: Duration) {
        for handle in self.registry.all() {
            self.stop_sound(handle, fade_out);
        }
    }

    /// Tear down every channel and fade right now
    pub fn force_stop_all(&mut self) {
        let cancelled = self.fades.cancel_all();
        let channels = self.registry.all();
        for handle in &channels {
            self.remove_channel(*handle);
        }
        if !channels.is_empty() {
            info!(channels = channels.len(), fades = cancelled, "force stopped all channels");
        }
    }

    /// Replace the current mix with `preset`
    ///
    /// The outgoing channels fade out over `preset_fade_out` while the new
    /// entries start immediately. An entry that finds the registry full
    /// drops the oldest outgoing channel to make room.
    pub fn play_preset(&mut self, preset: &MixPreset) -> PresetOutcome {
        self.preset_from(preset, None)
    }

    /// `play_preset` with buffers taken from a finished `load_then`
    pub fn play_preset_loaded(&mut self, preset: &MixPreset, loaded: &LoadedBuffers) -> PresetOutcome {
        self.preset_from(preset, Some(loaded))
    }

    fn preset_from(&mut self, preset: &MixPreset, loaded: Option<&LoadedBuffers>) -> PresetOutcome {
        if self.interruption.state().is_interrupted() {
            self.resume_output();
        }
        self.stop_all(self.config.preset_fade_out);

        let mut outcome = PresetOutcome::default();
        for entry in &preset.entries {
            let options = PlayOptions {
                gain: entry.gain,
                looping: entry.looping,
                fade_in: entry.fade_in,
            };
            let mut result = self.play_from(&entry.sound_name, options, loaded);
            if matches!(result, Err(EngineError::CapacityExceeded { .. })) {
                if let Some(oldest) = self.registry.oldest_in_state(ChannelState::Stopping) {
                    debug!(channel = %oldest, "reclaiming outgoing channel for preset");
                    self.remove_channel(oldest);
                    result = self.play_from(&entry.sound_name, options, loaded);
                }
            }

            match result {
                Ok(handle) => outcome.started.push(handle),
                Err(e) => {
                    warn!(preset = %preset.name, sound = %entry.sound_name, error = %e, "preset entry failed");
                    outcome.failed.push((entry.sound_name.clone(), e));
                }
            }
        }

        info!(
            preset = %preset.name,
            started = outcome.started.len(),
            failed = outcome.failed.len(),
            "preset started"
        );
        outcome
    }

    /// Fade out `from` while `sound_name` fades in over the same span
    pub fn crossfade(
        &mut self,
        from: ChannelHandle,
        sound_name: &str,
        gain: f32,
        duration: Duration,
    ) -> Result<ChannelHandle, EngineError> {
        self.crossfade_from(from, sound_name, gain, duration, None)
    }

    /// `crossfade` with the incoming buffer taken from a finished `load_then`
    pub fn crossfade_loaded(
        &mut self,
        from: ChannelHandle,
        sound_name: &str,
        gain: f32,
        duration: Duration,
        loaded: &LoadedBuffers,
    ) -> Result<ChannelHandle, EngineError> {
        self.crossfade_from(from, sound_name, gain, duration, Some(loaded))
    }

    fn crossfade_from(
        &mut self,
        from: ChannelHandle,
        sound_name: &str,
        gain: f32,
        duration: Duration,
        loaded: Option<&LoadedBuffers>,
    ) -> Result<ChannelHandle, EngineError> {
        let looping = self
            .registry
            .get(from)
            .map(|c| c.looping())
            .ok_or(EngineError::ChannelNotFound(from.id()))?;

        let options = PlayOptions {
            gain,
            looping,
            fade_in: duration,
        };
        let handle = self.play_from(sound_name, options, loaded)?;
        self.stop_sound(from, duration);
        Ok(handle)
    }

    /// Set a channel's gain immediately
    ///
    /// Cancels a fade in progress. Channels on their way out are left alone.
    pub fn set_channel_volume(&mut self, handle: ChannelHandle, gain: f32) -> Result<(), EngineError> {
        let channel = self
            .registry
            .get_mut(handle)
            .ok_or(EngineError::ChannelNotFound(handle.id()))?;
        if channel.state() == ChannelState::Stopping {
            debug!(channel = %handle, "volume change ignored, channel stopping");
            return Ok(());
        }

        self.fades.cancel_fade(handle);
        channel.set_gain(gain);
        channel.set_state(ChannelState::Playing);
        let gain = channel.gain();
        self.graph.lock().set_gain(handle, gain);
        debug!(channel = %handle, gain, "channel volume set");
        Ok(())
    }

    /// Fade a channel to `target_gain`; zero duration sets it immediately
    pub fn fade_channel(
        &mut self,
        handle: ChannelHandle,
        target_gain: f32,
        duration: Duration,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let channel = self
            .registry
            .get_mut(handle)
            .ok_or(EngineError::ChannelNotFound(handle.id()))?;

        if duration.is_zero() {
            self.fades.cancel_fade(handle);
            channel.set_gain(target_gain);
            channel.set_state(ChannelState::Playing);
            let gain = channel.gain();
            self.graph.lock().set_gain(handle, gain);
            self.notifier.emit(EngineEvent::FadeCompleted(handle));
            return Ok(());
        }

        self.fades
            .start_fade(channel, target_gain, duration, now, FadeAction::Notify);
        Ok(())
    }

    /// Set the master gain applied on top of every channel
    pub fn set_master_volume(&mut self, gain: f32) {
        self.master = clamp_gain(gain);
        self.graph.lock().set_master(self.master);
        info!(master = self.master, "master volume set");
        self.notifier
            .emit(EngineEvent::MasterVolumeChanged(self.master));
    }

    pub fn set_muted(&mut self, muted: bool) {
        if self.muted == muted {
            return;
        }
        self.muted = muted;
        self.graph.lock().set_muted(muted);
        info!(muted, "mute toggled");
    }

    /// Hand new parameters to an insert stage
    pub fn set_insert(&mut self, settings: InsertSettings) {
        debug!(?settings, "insert updated");
        self.graph.lock().inserts_mut().apply(settings);
    }

    /// Host took audio away (call, alarm)
    pub fn interruption_began(&mut self) {
        self.pause_output(PauseReason::Interruption);
    }

    /// Host gave audio back; output restarts only if `should_resume`
    pub fn interruption_ended(&mut self, should_resume: bool) {
        let now = self.clock.now();
        let resumed = {
            let mut graph = self.graph.lock();
            self.interruption
                .ended(should_resume, &mut graph, &mut self.fades, self.master, now)
        };
        if resumed {
            self.notify_interruption();
        }
    }

    pub fn route_changed(&mut self, change: RouteChange) {
        match change {
            RouteChange::OldDeviceUnavailable => {
                info!("output device unavailable, pausing");
                self.pause_output(PauseReason::RouteChange);
            }
            RouteChange::NewDeviceAvailable => info!("new output device available"),
            RouteChange::Other => debug!("audio route changed"),
        }
    }

    /// Explicit user resume after an interruption or route pause
    pub fn resume_output(&mut self) -> bool {
        let now = self.clock.now();
        let resumed = {
            let mut graph = self.graph.lock();
            self.interruption
                .resume(&mut graph, &mut self.fades, self.master, now)
        };
        if resumed {
            self.notify_interruption();
        }
        resumed
    }

    fn pause_output(&mut self, reason: PauseReason) {
        let now = self.clock.now();
        let paused = {
            let mut graph = self.graph.lock();
            self.interruption
                .began(reason, &mut graph, &mut self.fades, now)
        };
        if paused {
            self.notify_interruption();
        }
    }

    fn notify_interruption(&mut self) {
        let state = self.interruption.state();
        self.notifier.emit(EngineEvent::InterruptionChanged(state));
    }

    /// Drop every cached buffer (memory pressure). Playing channels keep theirs.
    pub fn clear_buffer_cache(&mut self) {
        self.store.evict_all();
    }

    pub fn set_cache_limits(&mut self, limits: CacheLimits) {
        self.store.set_limits(limits);
    }

    pub fn cached_buffers(&self) -> usize {
        self.store.len()
    }

    /// Make sure every named sound is decoded, then run `then` on the engine
    ///
    /// Cached sounds and unknown names settle at once. Misses decode on
    /// worker threads and `then` runs from `handle_load` when the last one
    /// arrives; until then the engine keeps serving other calls. Failed
    /// loads appear in the map as errors.
    pub fn load_then<F>(&mut self, names: &[String], then: F)
    where
        F: FnOnce(&mut MixingEngine, &LoadedBuffers) + Send + 'static,
    {
        let request = self.loads.next_request();
        let loader = self.store.loader();
        let mut loaded = LoadedBuffers::new();
        let mut seen = HashSet::new();
        let mut outstanding = 0;

        for name in names {
            if !seen.insert(name.as_str()) {
                continue;
            }
            if let Some(buffer) = self.store.cached(name) {
                loaded.insert(name.clone(), Ok(buffer));
                continue;
            }
            match loader.resolve(name) {
                Ok(location) => {
                    if self.loads.spawn_decode(request, name, location, loader.clone()) {
                        outstanding += 1;
                    } else {
                        let failure = EngineError::DecodeFailure {
                            name: name.clone(),
                            reason: "could not start decode worker".into(),
                        };
                        loaded.insert(name.clone(), Err(failure));
                    }
                }
                Err(e) => {
                    loaded.insert(name.clone(), Err(e.into()));
                }
            }
        }

        if outstanding == 0 {
            then(self, &loaded);
        } else {
            self.loads.park(request, loaded, outstanding, Box::new(then));
        }
    }

    /// Decodes finishing on worker threads
    pub fn load_events(&self) -> Receiver<LoadCompleted> {
        self.loads.receiver()
    }

    /// Cache a finished decode and resume the call waiting on it
    pub fn handle_load(&mut self, done: LoadCompleted) {
        let (request, name, result) = done.into_parts();
        let result = match result {
            Ok(buffer) => Ok(self.store.insert(&name, buffer)),
            Err(e) => {
                warn!(sound = %name, error = %e, "background decode failed");
                Err(EngineError::from(e))
            }
        };
        if let Some((then, loaded)) = self.loads.complete(request, name, result) {
            then(self, &loaded);
        }
    }

    /// Calls parked on decodes that have not finished
    pub fn pending_loads(&self) -> usize {
        self.loads.pending()
    }

    /// Completion queue from the render path
    pub fn render_events(&self) -> Receiver<RenderEvent> {
        self.render_rx.clone()
    }

    /// React to one render-path event
    pub fn handle_render_event(&mut self, event: RenderEvent) {
        match event {
            RenderEvent::PassCompleted(_) => self.reconcile_completions(),
            RenderEvent::StreamError(message) => {
                error!(error = %message, "output stream failed");
                self.notifier.emit(EngineEvent::Error(message));
            }
        }
    }

    /// Collect every finished pass from the graph: loops get that many
    /// passes queued again, one-shots are removed
    fn reconcile_completions(&mut self) {
        let finished = self.graph.lock().take_completions();
        for (handle, passes) in finished {
            // Stopped between completion and now
            let Some(channel) = self.registry.get(handle) else {
                continue;
            };
            if channel.looping() {
                self.graph.lock().schedule(handle, passes);
            } else {
                debug!(channel = %handle, "one-shot finished");
                self.remove_channel(handle);
            }
        }
    }

    /// Drain every pending render completion
    pub fn process_render_events(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.render_rx.try_recv() {
            self.handle_render_event(event);
            count += 1;
        }
        count
    }

    /// Advance every fade to the current time
    pub fn advance_fades(&mut self) {
        let now = self.clock.now();
        let tick = self.fades.tick(now, &mut self.registry);

        if !tick.updated.is_empty() {
            let mut graph = self.graph.lock();
            for (handle, gain) in &tick.updated {
                graph.set_gain(*handle, *gain);
            }
        }

        for done in tick.completed {
            match done.action {
                FadeAction::Notify => self.notifier.emit(EngineEvent::FadeCompleted(done.channel)),
                FadeAction::Remove => self.remove_channel(done.channel),
            }
        }
    }

    /// Drain completions, then advance fades
    ///
    /// Also picks up finished passes whose wake-up never made it through
    /// the render queue.
    pub fn tick(&mut self) {
        self.process_render_events();
        self.reconcile_completions();
        self.advance_fades();
    }

    /// Whether fade ticks should be running
    pub fn needs_fade_tick(&self) -> bool {
        self.fades.needs_tick()
    }

    fn remove_channel(&mut self, handle: ChannelHandle) {
        self.fades.cancel_fade(handle);
        if self.registry.remove(handle).is_some() {
            self.notifier.emit(EngineEvent::ChannelStopped(handle));
        }
    }

    /// Live channels in creation order
    pub fn channels(&self) -> Vec<ChannelInfo> {
        self.registry.iter().map(|c| c.info()).collect()
    }

    pub fn channel(&self, handle: ChannelHandle) -> Option<ChannelInfo> {
        self.registry.get(handle).map(|c| c.info())
    }

    /// Channel gain times master (zero when muted)
    pub fn effective_gain(&self, handle: ChannelHandle) -> Option<f32> {
        self.graph.lock().effective_gain(handle)
    }

    pub fn is_fading(&self, handle: ChannelHandle) -> bool {
        self.fades.is_fading(handle)
    }

    pub fn master_volume(&self) -> f32 {
        self.master
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Something is live and output is not paused
    pub fn is_playing(&self) -> bool {
        !self.registry.is_empty() && !self.interruption.state().is_interrupted()
    }

    pub fn interruption_state(&self) -> InterruptionState {
        self.interruption.state()
    }

    /// Render graph shared with the output backend
    pub fn graph(&self) -> SharedGraph {
        Arc::clone(&self.graph)
    }

    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        self.notifier.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn output_info(&self) -> OutputInfo {
        self.output_info
    }

    /// Stop every channel and the output backend
    ///
    /// Calls still waiting on decodes are dropped with the engine.
    pub fn shutdown(&mut self) {
        self.force_stop_all();
        self.output.stop();
        info!("mixing engine stopped");
    }
}

impl Drop for MixingEngine {
    fn drop(&mut self) {
        self.output.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::testing::{FakeDecoder, FakeResolver};
    use crate::clock::ManualClock;
    use crate::output::NullOutput;
    use crate::preset::PresetEntry;

    const SOUNDS: &[&str] = &["rain", "ocean", "wind", "forest", "fire", "birds", "corrupt"];

    fn engine() -> (MixingEngine, ManualClock) {
        engine_with(EngineConfig::default())
    }

    fn engine_with(config: EngineConfig) -> (MixingEngine, ManualClock) {
        let clock = ManualClock::new();
        let ctx = MixingEngineContext::new(
            config,
            Arc::new(FakeResolver::with(SOUNDS)),
            Arc::new(FakeDecoder::new(64)),
            Box::new(NullOutput::new()),
        )
        .with_clock(Arc::new(clock.clone()));
        (MixingEngine::start(ctx).unwrap(), clock)
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn gain(engine: &MixingEngine, handle: ChannelHandle) -> f32 {
        engine.channel(handle).unwrap().gain
    }

    #[test]
    fn test_play_sound_defaults() {
        let (mut engine, _clock) = engine();
        let events = engine.subscribe();

        let handle = engine.play_sound("rain", PlayOptions::default()).unwrap();
        let info = engine.channel(handle).unwrap();
        assert_eq!(info.gain, 1.0);
        assert!(info.looping);
        assert_eq!(info.state, ChannelState::Playing);
        assert_eq!(
            events.try_recv(),
            Ok(EngineEvent::ChannelStarted {
                handle,
                sound_name: "rain".into()
            })
        );
        assert_eq!(engine.graph().lock().scheduled_passes(handle), Some(2));
    }

    #[test]
    fn test_failed_play_leaves_mix_untouched() {
        let (mut engine, _clock) = engine();
        let rain = engine.play_sound("rain", PlayOptions::default()).unwrap();

        assert_eq!(
            engine.play_sound("thunder", PlayOptions::default()),
            Err(EngineError::AssetNotFound("thunder".into()))
        );
        assert!(matches!(
            engine.play_sound("corrupt", PlayOptions::default()),
            Err(EngineError::DecodeFailure { .. })
        ));
        assert_eq!(engine.channels().len(), 1);
        assert_eq!(engine.channels()[0].handle, rain);
        assert_eq!(engine.graph().lock().voice_count(), 1);
    }

    #[test]
    fn test_stop_with_fade_removes_after_completion() {
        let (mut engine, clock) = engine();
        let events = engine.subscribe();
        let handle = engine.play_sound("rain", PlayOptions::default()).unwrap();

        engine.stop_sound(handle, secs(1.0));
        assert_eq!(engine.channel(handle).unwrap().state, ChannelState::Stopping);

        clock.advance(secs(0.5));
        engine.tick();
        assert!((gain(&engine, handle) - 0.5).abs() < 1e-4);

        clock.advance(secs(0.5));
        engine.tick();
        assert!(engine.channel(handle).is_none());
        assert!(events.try_iter().any(|e| e == EngineEvent::ChannelStopped(handle)));
    }

    #[test]
    fn test_stop_twice_is_harmless() {
        let (mut engine, _clock) = engine();
        let events = engine.subscribe();
        let handle = engine.play_sound("rain", PlayOptions::default()).unwrap();

        engine.stop_sound(handle, Duration::ZERO);
        engine.stop_sound(handle, Duration::ZERO);
        engine.stop_sound(handle, secs(1.0));

        let stops = events
            .try_iter()
            .filter(|e| *e == EngineEvent::ChannelStopped(handle))
            .count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn test_set_channel_volume_cancels_fade() {
        let (mut engine, clock) = engine();
        let handle = engine
            .play_sound("rain", PlayOptions::default().with_fade_in(secs(2.0)))
            .unwrap();

        clock.advance(secs(1.0));
        engine.tick();
        engine.set_channel_volume(handle, 0.3).unwrap();
        assert!(!engine.is_fading(handle));

        clock.advance(secs(5.0));
        engine.tick();
        assert_eq!(gain(&engine, handle), 0.3);
        assert_eq!(engine.channel(handle).unwrap().state, ChannelState::Playing);

        assert_eq!(
            engine.set_channel_volume(ChannelHandle::new(99), 0.5),
            Err(EngineError::ChannelNotFound(99))
        );
    }

    #[test]
    fn test_master_volume_scales_effective_gain() {
        let (mut engine, _clock) = engine();
        let events = engine.subscribe();
        let handle = engine
            .play_sound("rain", PlayOptions::default().with_gain(0.8))
            .unwrap();

        engine.set_master_volume(0.5);
        assert!((engine.effective_gain(handle).unwrap() - 0.4).abs() < 1e-6);
        assert!(events.try_iter().any(|e| e == EngineEvent::MasterVolumeChanged(0.5)));

        engine.set_muted(true);
        assert_eq!(engine.effective_gain(handle), Some(0.0));
        assert_eq!(engine.master_volume(), 0.5);
    }

    #[test]
    fn test_one_shot_removed_on_completion() {
        let (mut engine, _clock) = engine();
        let handle = engine
            .play_sound("birds", PlayOptions::default().with_looping(false))
            .unwrap();

        // A wake-up with nothing finished changes nothing
        engine.handle_render_event(RenderEvent::PassCompleted(handle));
        assert!(engine.channel(handle).is_some());

        let mut out = vec![0.0; 256];
        engine.graph().lock().render(&mut out);
        assert_eq!(engine.process_render_events(), 1);
        assert!(engine.channel(handle).is_none());
    }

    #[test]
    fn test_lost_wakeups_recovered_on_tick() {
        let (mut engine, _clock) = engine();
        let rain = engine.play_sound("rain", PlayOptions::default()).unwrap();
        let birds = engine
            .play_sound("birds", PlayOptions::default().with_looping(false))
            .unwrap();
        let graph = engine.graph();

        let mut out = vec![0.0; 256];
        graph.lock().render(&mut out);
        // Every wake-up is lost, as with an overflowing queue
        assert_eq!(engine.render_events().try_iter().count(), 3);

        engine.tick();
        assert_eq!(graph.lock().scheduled_passes(rain), Some(2));
        assert!(engine.channel(birds).is_none());
    }

    #[test]
    fn test_stream_error_reported() {
        let (mut engine, _clock) = engine();
        let events = engine.subscribe();

        let sender = engine.graph().lock().event_sender();
        sender
            .send(RenderEvent::StreamError("device disconnected".into()))
            .unwrap();
        engine.process_render_events();

        assert_eq!(
            events.try_recv(),
            Ok(EngineEvent::Error("device disconnected".into()))
        );
    }

    fn wait_for_loads(engine: &mut MixingEngine) {
        let loads = engine.load_events();
        while engine.pending_loads() > 0 {
            let done = loads.recv_timeout(Duration::from_secs(5)).unwrap();
            engine.handle_load(done);
        }
    }

    #[test]
    fn test_load_then_decodes_off_thread() {
        let (mut engine, _clock) = engine();
        engine.play_sound("rain", PlayOptions::default()).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);

        let names = vec!["rain".to_string(), "ocean".to_string(), "thunder".to_string()];
        engine.load_then(&names, move |engine, loaded| {
            let ran_on = std::thread::current().id();
            let ocean = engine.play_loaded("ocean", PlayOptions::default(), loaded);
            tx.send((ran_on, loaded.len(), ocean, loaded["thunder"].clone())).unwrap();
        });

        // Ocean is still decoding; the engine is free meanwhile
        assert_eq!(engine.pending_loads(), 1);
        assert!(rx.try_recv().is_err());
        engine.set_master_volume(0.5);

        wait_for_loads(&mut engine);
        let (ran_on, count, ocean, thunder) = rx.try_recv().unwrap();
        assert_eq!(ran_on, std::thread::current().id());
        assert_eq!(count, 3);
        assert!(engine.channel(ocean.unwrap()).is_some());
        assert_eq!(thunder.unwrap_err(), EngineError::AssetNotFound("thunder".into()));
        assert_eq!(engine.cached_buffers(), 2);
    }

    #[test]
    fn test_load_then_reports_decode_failure() {
        let (mut engine, _clock) = engine();
        let (tx, rx) = crossbeam_channel::bounded(1);

        engine.load_then(&["corrupt".to_string()], move |engine, loaded| {
            tx.send(engine.play_loaded("corrupt", PlayOptions::default(), loaded))
                .unwrap();
        });
        wait_for_loads(&mut engine);

        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(EngineError::DecodeFailure { .. })
        ));
        assert!(engine.channels().is_empty());
        assert_eq!(engine.cached_buffers(), 0);
    }

    #[test]
    fn test_load_then_cached_runs_immediately() {
        let (mut engine, _clock) = engine();
        engine.play_sound("rain", PlayOptions::default()).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);

        engine.load_then(&["rain".to_string(), "rain".to_string()], move |_, loaded| {
            tx.send(loaded.len()).unwrap();
        });

        assert_eq!(engine.pending_loads(), 0);
        assert_eq!(rx.try_recv(), Ok(1));
    }

    #[test]
    fn test_loop_reschedules_while_registered() {
        let (mut engine, _clock) = engine();
        let handle = engine.play_sound("rain", PlayOptions::default()).unwrap();
        let graph = engine.graph();

        // 64-frame buffer, 128 frames rendered: both queued passes finish
        let mut out = vec![0.0; 256];
        graph.lock().render(&mut out);
        assert_eq!(engine.process_render_events(), 2);
        assert_eq!(graph.lock().scheduled_passes(handle), Some(2));

        engine.stop_sound(handle, Duration::ZERO);
        // A late completion for a removed channel is ignored
        engine.handle_render_event(RenderEvent::PassCompleted(handle));
        assert_eq!(graph.lock().voice_count(), 0);
    }

    #[test]
    fn test_crossfade() {
        let (mut engine, clock) = engine();
        let rain = engine.play_sound("rain", PlayOptions::default()).unwrap();

        let ocean = engine.crossfade(rain, "ocean", 0.6, secs(2.0)).unwrap();
        clock.advance(secs(1.0));
        engine.tick();
        assert!((gain(&engine, rain) - 0.5).abs() < 1e-4);
        assert!((gain(&engine, ocean) - 0.3).abs() < 1e-4);

        clock.advance(secs(1.0));
        engine.tick();
        assert!(engine.channel(rain).is_none());
        assert_eq!(gain(&engine, ocean), 0.6);

        assert_eq!(
            engine.crossfade(rain, "wind", 1.0, secs(1.0)),
            Err(EngineError::ChannelNotFound(rain.id()))
        );
    }

    #[test]
    fn test_fade_channel_emits_completion() {
        let (mut engine, clock) = engine();
        let events = engine.subscribe();
        let handle = engine.play_sound("rain", PlayOptions::default()).unwrap();

        engine.fade_channel(handle, 0.25, secs(0.5)).unwrap();
        assert!(engine.needs_fade_tick());
        clock.advance(secs(0.5));
        engine.tick();

        assert_eq!(gain(&engine, handle), 0.25);
        assert!(!engine.needs_fade_tick());
        assert!(events.try_iter().any(|e| e == EngineEvent::FadeCompleted(handle)));
    }

    #[test]
    fn test_preset_reclaims_outgoing_channels() {
        let config = EngineConfig {
            max_channels: 3,
            ..EngineConfig::default()
        };
        let (mut engine, clock) = engine_with(config);
        let old: Vec<_> = ["rain", "wind", "fire"]
            .iter()
            .map(|s| engine.play_sound(s, PlayOptions::default()).unwrap())
            .collect();

        let preset = MixPreset::new("Test")
            .with_entry(PresetEntry::new("ocean", 0.8, true, secs(2.0)))
            .with_entry(PresetEntry::new("forest", 0.4, true, secs(2.0)))
            .with_entry(PresetEntry::new("thunder", 0.4, true, secs(2.0)));

        let outcome = engine.play_preset(&preset);
        assert_eq!(outcome.started.len(), 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "thunder");
        assert!(engine.channels().len() <= 3);

        // The two oldest outgoing channels made room; the third still fades
        assert!(engine.channel(old[0]).is_none());
        assert!(engine.channel(old[1]).is_none());
        assert_eq!(engine.channel(old[2]).unwrap().state, ChannelState::Stopping);

        clock.advance(secs(1.0));
        engine.tick();
        assert!(engine.channel(old[2]).is_none());
        assert_eq!(engine.channels().len(), 2);
    }

    #[test]
    fn test_play_while_interrupted_resumes_output() {
        let (mut engine, _clock) = engine();
        engine.play_sound("rain", PlayOptions::default()).unwrap();
        engine.interruption_began();
        assert!(!engine.is_playing());

        let wind = engine.play_sound("wind", PlayOptions::default()).unwrap();
        assert_eq!(engine.interruption_state(), InterruptionState::Active);
        assert_eq!(engine.graph().lock().is_paused(wind), Some(false));
        assert!(engine.is_playing());
    }

    #[test]
    fn test_route_change_pauses_until_resumed() {
        let (mut engine, _clock) = engine();
        let events = engine.subscribe();
        let handle = engine.play_sound("rain", PlayOptions::default()).unwrap();

        engine.route_changed(RouteChange::NewDeviceAvailable);
        assert_eq!(engine.interruption_state(), InterruptionState::Active);

        engine.route_changed(RouteChange::OldDeviceUnavailable);
        assert_eq!(
            engine.interruption_state(),
            InterruptionState::Interrupted(PauseReason::RouteChange)
        );
        assert_eq!(engine.graph().lock().is_paused(handle), Some(true));

        assert!(engine.resume_output());
        assert_eq!(engine.graph().lock().is_paused(handle), Some(false));
        let changes = events
            .try_iter()
            .filter(|e| matches!(e, EngineEvent::InterruptionChanged(_)))
            .count();
        assert_eq!(changes, 2);
    }

    #[test]
    fn test_stop_while_interrupted_is_immediate() {
        let (mut engine, _clock) = engine();
        let handle = engine.play_sound("rain", PlayOptions::default()).unwrap();
        engine.interruption_began();

        engine.stop_sound(handle, secs(2.0));
        assert!(engine.channel(handle).is_none());
    }

    #[test]
    fn test_clear_cache_keeps_playing_channels() {
        let (mut engine, _clock) = engine();
        let handle = engine.play_sound("rain", PlayOptions::default()).unwrap();
        assert_eq!(engine.cached_buffers(), 1);

        engine.clear_buffer_cache();
        assert_eq!(engine.cached_buffers(), 0);
        assert!(engine.channel(handle).is_some());
        assert_eq!(engine.graph().lock().voice_count(), 1);
    }

    #[test]
    fn test_shutdown_clears_everything() {
        let (mut engine, _clock) = engine();
        engine.play_sound("rain", PlayOptions::default()).unwrap();
        engine.play_sound("wind", PlayOptions::default()).unwrap();

        engine.shutdown();
        assert!(engine.channels().is_empty());
        assert!(!engine.is_playing());
    }
}
