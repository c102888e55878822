//! End-to-end behaviour of the mixing engine façade

mod common;

use hush_audio::{
    AudioOutput, ChannelState, DelaySettings, EngineConfig, EngineError, EngineEvent, InsertSettings,
    InterruptionState, MixPreset, MixingEngine, OutputError, OutputInfo, PlayOptions, ReverbRoom, ReverbSettings,
    SharedGraph,
};
use std::time::Duration;

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

#[test]
fn test_capacity_cap() {
    let (mut engine, _clock) = common::engine();

    let rain = engine
        .play_sound("rain", PlayOptions::default().with_gain(0.8))
        .unwrap();
    let info = engine.channel(rain).unwrap();
    assert_eq!(engine.channels().len(), 1);
    assert_eq!(info.gain, 0.8);
    assert_eq!(info.state, ChannelState::Playing);

    for name in ["ocean", "wind", "forest", "fire"] {
        engine.play_sound(name, PlayOptions::default()).unwrap();
    }
    assert_eq!(engine.channels().len(), EngineConfig::DEFAULT_MAX_CHANNELS);

    assert_eq!(
        engine.play_sound("birds", PlayOptions::default()),
        Err(EngineError::CapacityExceeded { max: 5 })
    );
    assert_eq!(engine.channels().len(), 5);
}

#[test]
fn test_fade_in_samples() {
    let (mut engine, clock) = common::engine();
    let ocean = engine
        .play_sound("ocean", PlayOptions::default().with_fade_in(secs(2.0)))
        .unwrap();

    let mut samples = vec![engine.channel(ocean).unwrap().gain];
    for _ in 0..3 {
        clock.advance(secs(1.0));
        engine.tick();
        samples.push(engine.channel(ocean).unwrap().gain);
    }

    let expected = [0.0, 0.5, 1.0, 1.0];
    for (got, want) in samples.iter().zip(expected) {
        assert!((got - want).abs() < 1e-3, "got {samples:?}");
    }
}

#[test]
fn test_fade_out_removes_only_at_end() {
    let (mut engine, clock) = common::engine();
    let rain = engine.play_sound("rain", PlayOptions::default()).unwrap();

    engine.stop_sound(rain, secs(1.0));
    let mut last = 1.0;
    for _ in 0..19 {
        clock.advance(Duration::from_millis(50));
        engine.tick();
        let gain = engine.channel(rain).expect("still live mid-fade").gain;
        assert!(gain <= last);
        last = gain;
    }

    clock.advance(Duration::from_millis(50));
    engine.tick();
    assert!(engine.channel(rain).is_none());
    assert!(engine.channels().is_empty());
}

#[test]
fn test_stop_all_fades_independently() {
    let (mut engine, clock) = common::engine();
    let a = engine.play_sound("rain", PlayOptions::default()).unwrap();
    let b = engine.play_sound("wind", PlayOptions::default()).unwrap();

    engine.stop_all(secs(1.0));
    // A newer, shorter stop on one channel finishes it alone
    engine.stop_sound(b, Duration::ZERO);
    assert!(engine.channel(b).is_none());
    assert!(engine.channel(a).is_some());

    clock.advance(secs(1.0));
    engine.tick();
    assert!(engine.channels().is_empty());
}

#[test]
fn test_force_stop_all_mid_fade() {
    let (mut engine, clock) = common::engine();
    let events = engine.subscribe();
    let handles: Vec<_> = ["rain", "ocean", "wind", "forest", "fire"]
        .iter()
        .map(|s| engine.play_sound(s, PlayOptions::default()).unwrap())
        .collect();
    for handle in &handles[..3] {
        engine.fade_channel(*handle, 0.2, secs(2.0)).unwrap();
    }

    engine.force_stop_all();
    assert!(engine.channels().is_empty());
    assert!(!engine.needs_fade_tick());
    let _ = events.try_iter().count();

    clock.advance(secs(5.0));
    engine.tick();
    assert!(events.try_iter().all(|e| !matches!(e, EngineEvent::FadeCompleted(_))));
}

#[test]
fn test_interruption_preserves_channels() {
    let (mut engine, _clock) = common::engine();
    engine
        .play_sound("rain", PlayOptions::default().with_gain(0.7))
        .unwrap();
    engine
        .play_sound("birds", PlayOptions::default().with_gain(0.3).with_looping(false))
        .unwrap();
    let before = engine.channels();

    engine.interruption_began();
    assert!(engine.interruption_state().is_interrupted());
    engine.interruption_ended(true);

    assert_eq!(engine.interruption_state(), InterruptionState::Active);
    assert_eq!(engine.channels(), before);
}

#[test]
fn test_interruption_freezes_fades() {
    let (mut engine, clock) = common::engine();
    let rain = engine
        .play_sound("rain", PlayOptions::default().with_fade_in(secs(2.0)))
        .unwrap();

    clock.advance(secs(1.0));
    engine.tick();
    engine.interruption_began();

    clock.advance(secs(30.0));
    engine.tick();
    assert!((engine.channel(rain).unwrap().gain - 0.5).abs() < 1e-3);

    engine.interruption_ended(true);
    clock.advance(secs(0.5));
    engine.tick();
    assert!((engine.channel(rain).unwrap().gain - 0.75).abs() < 1e-3);
}

#[test]
fn test_interruption_without_resume_waits() {
    let (mut engine, _clock) = common::engine();
    engine.play_sound("rain", PlayOptions::default()).unwrap();

    engine.interruption_began();
    engine.interruption_ended(false);
    assert!(engine.interruption_state().is_interrupted());
    assert_eq!(engine.channels().len(), 1);

    assert!(engine.resume_output());
    assert!(engine.is_playing());
}

#[test]
fn test_builtin_preset_replaces_mix() {
    let (mut engine, clock) = common::engine();
    let old = engine.play_sound("rain", PlayOptions::default()).unwrap();

    let outcome = engine.play_preset(&MixPreset::ocean_breeze());
    assert!(outcome.is_complete());
    assert_eq!(outcome.started.len(), 2);
    assert_eq!(engine.channel(old).unwrap().state, ChannelState::Stopping);

    clock.advance(secs(1.0));
    engine.tick();
    let names: Vec<_> = engine.channels().into_iter().map(|c| c.sound_name).collect();
    assert_eq!(names, vec!["waves", "wind"]);

    clock.advance(secs(2.0));
    engine.tick();
    let gains: Vec<_> = engine.channels().into_iter().map(|c| c.gain).collect();
    assert!((gains[0] - 0.8).abs() < 1e-6);
    assert!((gains[1] - 0.3).abs() < 1e-6);
}

#[test]
fn test_render_loops_and_one_shots() {
    let (mut engine, _clock) = common::engine();
    let rain = engine.play_sound("rain", PlayOptions::default()).unwrap();
    let birds = engine
        .play_sound("birds", PlayOptions::default().with_looping(false))
        .unwrap();
    let graph = engine.graph();

    // Just over one second of output: every buffer finishes one pass
    let mut out = vec![0.0; 2 * 48_512];
    graph.lock().render(&mut out);
    assert!(out.iter().any(|s| *s != 0.0));
    engine.tick();

    assert!(engine.channel(rain).is_some());
    assert!(engine.channel(birds).is_none());
    assert_eq!(graph.lock().voice_count(), 1);
}

struct BrokenOutput;

impl AudioOutput for BrokenOutput {
    fn start(&mut self, _graph: SharedGraph) -> Result<OutputInfo, OutputError> {
        Err(OutputError::NoDevice)
    }

    fn stop(&mut self) {}

    fn name(&self) -> &'static str {
        "broken"
    }
}

#[test]
fn test_output_failure_reported_at_start() {
    let mut ctx = common::context(EngineConfig::default());
    ctx.output = Box::new(BrokenOutput);

    match MixingEngine::start(ctx) {
        Err(EngineError::EngineNotRunning(reason)) => assert!(reason.contains("no audio output device")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("engine started without output"),
    }
}

#[test]
fn test_delay_and_reverb_inserts() {
    let (mut engine, _clock) = common::engine();
    assert!(!engine.graph().lock().inserts().is_active());

    engine.set_insert(InsertSettings::Delay(DelaySettings {
        enabled: true,
        time: 0.25,
        ..DelaySettings::default()
    }));
    engine.set_insert(InsertSettings::Reverb(ReverbSettings {
        enabled: true,
        room: ReverbRoom::Hall,
        ..ReverbSettings::default()
    }));

    let graph = engine.graph();
    let graph = graph.lock();
    assert!(graph.inserts().is_active());
    assert_eq!(graph.inserts().delay().time(), 0.25);
    assert_eq!(graph.inserts().reverb().room(), ReverbRoom::Hall);
}
