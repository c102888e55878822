use hush_audio::{
    AssetResolver, AudioBuffer, EngineConfig, ManualClock, MixingEngine, MixingEngineContext, NullOutput,
    SoundDecoder,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const SOUNDS: &[&str] = &["rain", "ocean", "wind", "forest", "fire", "birds", "waves", "crickets"];

/// Knows a fixed set of names
pub struct StaticResolver(pub Vec<String>);

impl AssetResolver for StaticResolver {
    fn resolve_asset(&self, name: &str) -> Option<PathBuf> {
        self.0
            .iter()
            .any(|n| n == name)
            .then(|| PathBuf::from(format!("/assets/{name}.flac")))
    }
}

/// One second of quiet stereo noise at 48kHz for any path
pub struct SilenceDecoder;

impl SoundDecoder for SilenceDecoder {
    fn decode(&self, _location: &Path) -> Result<AudioBuffer, Box<dyn std::error::Error + Send + Sync>> {
        Ok(AudioBuffer::new(vec![0.01; 48000 * 2], 48000, 2))
    }
}

/// `SilenceDecoder` that takes its time over assets named "slow"
pub struct SlowDecoder(pub Duration);

impl SoundDecoder for SlowDecoder {
    fn decode(&self, location: &Path) -> Result<AudioBuffer, Box<dyn std::error::Error + Send + Sync>> {
        if location.file_stem().is_some_and(|stem| stem == "slow") {
            std::thread::sleep(self.0);
        }
        SilenceDecoder.decode(location)
    }
}

/// Context whose "slow" sound takes `delay` to decode
pub fn slow_context(config: EngineConfig, delay: Duration) -> MixingEngineContext {
    let mut names: Vec<String> = SOUNDS.iter().map(|s| s.to_string()).collect();
    names.push("slow".into());
    MixingEngineContext::new(
        config,
        Arc::new(StaticResolver(names)),
        Arc::new(SlowDecoder(delay)),
        Box::new(NullOutput::new()),
    )
}

pub fn context(config: EngineConfig) -> MixingEngineContext {
    MixingEngineContext::new(
        config,
        Arc::new(StaticResolver(SOUNDS.iter().map(|s| s.to_string()).collect())),
        Arc::new(SilenceDecoder),
        Box::new(NullOutput::new()),
    )
}

pub fn engine() -> (MixingEngine, ManualClock) {
    let clock = ManualClock::new();
    let ctx = context(EngineConfig::default()).with_clock(Arc::new(clock.clone()));
    let engine = MixingEngine::start(ctx).expect("engine starts with null output");
    (engine, clock)
}
