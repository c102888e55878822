//! Mixing and fade-control engine for Hush
//!
//! This crate provides the playback core:
//! - Buffer store: decode-once, shared PCM buffers with a bounded LRU cache
//! - Channels: per-sound playback units under a hard concurrency cap
//! - Fades: one shared tick driving linear gain ramps
//! - Graph: the render path (voices, master gain, inserts, soft clip)
//! - Engine: the control-path façade, and a service that runs it on its own thread

mod buffer;
mod channel;
mod clock;
mod config;
mod engine;
mod error;
mod events;
mod fade;
mod graph;
mod interruption;
mod loads;
mod output;
mod preset;
mod service;
pub mod inserts;

pub use buffer::{AssetLoader, AssetResolver, AudioBuffer, BufferStore, SharedBuffer, SoundDecoder};
pub use channel::{clamp_gain, Channel, ChannelHandle, ChannelInfo, ChannelRegistry, ChannelState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheLimits, EngineConfig};
pub use engine::{MixingEngine, MixingEngineContext, PlayOptions};
pub use error::{EngineError, LoadError, OutputError, RegistryError};
pub use events::{EngineEvent, Notifier};
pub use fade::{CompletedFade, FadeAction, FadeScheduler, FadeTask, FadeTick};
pub use graph::{MixGraph, RenderEvent, SharedGraph};
pub use inserts::{DelaySettings, EqPreset, EqSettings, InsertSettings, ReverbRoom, ReverbSettings};
pub use interruption::{InterruptionCoordinator, InterruptionState, PauseReason, RouteChange};
pub use loads::{LoadCompleted, LoadedBuffers};
pub use output::{AudioOutput, CpalOutput, NullOutput, OutputInfo};
pub use preset::{builtin_presets, find_preset, MixPreset, PresetEntry, PresetOutcome};
pub use service::{EngineCommand, EngineHandle, EngineService};
