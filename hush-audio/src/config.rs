//! Engine configuration

use std::time::Duration;

/// Size policy for the decoded buffer cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    /// Maximum number of cached buffers
    pub max_entries: usize,
    /// Maximum total size of cached sample data in bytes
    pub max_bytes: usize,
}

impl CacheLimits {
    /// Limits used while the application is in the foreground
    pub const fn foreground() -> Self {
        Self {
            max_entries: 20,
            max_bytes: 50 * 1024 * 1024,
        }
    }

    /// Tighter limits used while the application is in the background
    pub const fn background() -> Self {
        Self {
            max_entries: 10,
            max_bytes: 20 * 1024 * 1024,
        }
    }
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self::foreground()
    }
}

/// Mixing engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard cap on simultaneously live channels
    pub max_channels: usize,
    /// Interval between fade scheduler ticks
    pub fade_tick: Duration,
    /// Render sample rate in Hz (buffers are decoded to this rate)
    pub sample_rate: u32,
    /// Number of interleaved output channels
    pub output_channels: u16,
    /// Master volume applied at startup
    pub initial_master_volume: f32,
    /// Fade-out used for the outgoing mix when a preset is started
    pub preset_fade_out: Duration,
    /// Buffer cache size policy
    pub cache: CacheLimits,
}

impl EngineConfig {
    pub const DEFAULT_MAX_CHANNELS: usize = 5;
    pub const DEFAULT_FADE_TICK: Duration = Duration::from_millis(50);
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_channels: Self::DEFAULT_MAX_CHANNELS,
            fade_tick: Self::DEFAULT_FADE_TICK,
            sample_rate: 48000,
            output_channels: 2,
            initial_master_volume: 1.0,
            preset_fade_out: Duration::from_secs(1),
            cache: CacheLimits::default(),
        }
    }
}
