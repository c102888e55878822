//! Decoded sound buffers and the shared buffer cache
//!
//! A sound is decoded once into memory and shared read-only by every channel
//! that plays it. The cache is bounded by entry count and byte size with
//! least-recently-used eviction; evicting an entry never interrupts a channel
//! that already holds the buffer.

use crate::config::CacheLimits;
use crate::error::LoadError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Immutable decoded PCM audio (interleaved f32)
#[derive(Debug)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    frames: usize,
}

/// Reference-counted handle to a decoded buffer
pub type SharedBuffer = Arc<AudioBuffer>;

impl AudioBuffer {
    /// Wrap interleaved samples. A trailing partial frame is dropped.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let frames = samples.len() / channels as usize;
        samples.truncate(frames * channels as usize);
        Self {
            samples,
            sample_rate,
            channels,
            frames,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Total length in frames
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate as f64)
    }

    /// Size of the sample data in bytes
    pub fn byte_size(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }

    /// Sample for output channel `out_ch` of `out_channels` at `frame`,
    /// up/down-mixing as needed.
    #[inline]
    pub fn sample_for(&self, frame: usize, out_ch: usize, out_channels: usize) -> f32 {
        let src = self.channels as usize;
        let base = frame * src;
        if out_channels == 1 && src >= 2 {
            (self.samples[base] + self.samples[base + 1]) * 0.5
        } else {
            self.samples[base + out_ch.min(src - 1)]
        }
    }
}

/// Resolves a sound name to the location of its bundled asset
pub trait AssetResolver: Send + Sync {
    fn resolve_asset(&self, name: &str) -> Option<PathBuf>;
}

/// Platform codec: decodes an asset fully into memory at the engine rate
pub trait SoundDecoder: Send + Sync {
    fn decode(&self, location: &Path) -> Result<AudioBuffer, Box<dyn std::error::Error + Send + Sync>>;
}

struct CacheEntry {
    buffer: SharedBuffer,
    last_used: u64,
}

#[derive(Default)]
struct Cache {
    entries: HashMap<String, CacheEntry>,
    bytes: usize,
    counter: u64,
}

impl Cache {
    fn touch(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn remove_lru(&mut self, keep: Option<&str>) -> bool {
        let victim = self
            .entries
            .iter()
            .filter(|(name, _)| Some(name.as_str()) != keep)
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(name, _)| name.clone());

        match victim {
            Some(name) => {
                if let Some(entry) = self.entries.remove(&name) {
                    self.bytes -= entry.buffer.byte_size();
                    debug!(sound = %name, "evicted buffer from cache");
                }
                true
            }
            None => false,
        }
    }

    fn enforce(&mut self, limits: CacheLimits, keep: Option<&str>) {
        while self.entries.len() > limits.max_entries || self.bytes > limits.max_bytes {
            if !self.remove_lru(keep) {
                break;
            }
        }
    }
}

/// Resolves and decodes sounds without touching the cache
///
/// Cheap to clone, so a decode can be handed to a worker thread.
#[derive(Clone)]
pub struct AssetLoader {
    resolver: Arc<dyn AssetResolver>,
    decoder: Arc<dyn SoundDecoder>,
}

impl AssetLoader {
    pub fn new(resolver: Arc<dyn AssetResolver>, decoder: Arc<dyn SoundDecoder>) -> Self {
        Self { resolver, decoder }
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf, LoadError> {
        self.resolver
            .resolve_asset(name)
            .ok_or_else(|| LoadError::AssetNotFound(name.to_string()))
    }

    /// Decode the asset at `location`. Blocks for as long as the codec takes.
    pub fn decode(&self, name: &str, location: &Path) -> Result<SharedBuffer, LoadError> {
        let decoded = self
            .decoder
            .decode(location)
            .map_err(|e| LoadError::DecodeFailure {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        if decoded.frames() == 0 {
            return Err(LoadError::DecodeFailure {
                name: name.to_string(),
                reason: "asset contains no audio frames".to_string(),
            });
        }

        let buffer = Arc::new(decoded);
        info!(
            sound = name,
            frames = buffer.frames(),
            bytes = buffer.byte_size(),
            "decoded sound"
        );
        Ok(buffer)
    }

    pub fn load(&self, name: &str) -> Result<SharedBuffer, LoadError> {
        let location = self.resolve(name)?;
        self.decode(name, &location)
    }
}

/// Loads sounds on first use and shares them across channels
pub struct BufferStore {
    loader: AssetLoader,
    limits: Mutex<CacheLimits>,
    cache: Mutex<Cache>,
}

impl BufferStore {
    pub fn new(
        resolver: Arc<dyn AssetResolver>,
        decoder: Arc<dyn SoundDecoder>,
        limits: CacheLimits,
    ) -> Self {
        Self {
            loader: AssetLoader::new(resolver, decoder),
            limits: Mutex::new(limits),
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Get the decoded buffer for `name`, decoding and caching it on first use
    ///
    /// A miss decodes on the calling thread.
    pub fn acquire(&self, name: &str) -> Result<SharedBuffer, LoadError> {
        if let Some(buffer) = self.cached(name) {
            return Ok(buffer);
        }
        let buffer = self.loader.load(name)?;
        Ok(self.insert(name, buffer))
    }

    /// Cached buffer for `name`, marking it most recently used
    pub fn cached(&self, name: &str) -> Option<SharedBuffer> {
        let mut cache = self.cache.lock();
        let stamp = cache.touch();
        let entry = cache.entries.get_mut(name)?;
        entry.last_used = stamp;
        Some(Arc::clone(&entry.buffer))
    }

    /// Cache a buffer decoded elsewhere
    ///
    /// Returns the buffer channels should share: the one already cached
    /// under `name` if another decode got there first.
    pub fn insert(&self, name: &str, buffer: SharedBuffer) -> SharedBuffer {
        let limits = *self.limits.lock();
        let mut cache = self.cache.lock();
        if buffer.byte_size() > limits.max_bytes {
            warn!(sound = name, "buffer larger than cache budget, not caching");
            return buffer;
        }

        let stamp = cache.touch();
        if let Some(existing) = cache.entries.get_mut(name) {
            existing.last_used = stamp;
            return Arc::clone(&existing.buffer);
        }

        cache.bytes += buffer.byte_size();
        cache.entries.insert(
            name.to_string(),
            CacheEntry {
                buffer: Arc::clone(&buffer),
                last_used: stamp,
            },
        );
        cache.enforce(limits, Some(name));
        buffer
    }

    /// Resolver and decoder for loading off the caller's thread
    pub fn loader(&self) -> AssetLoader {
        self.loader.clone()
    }

    /// Drop every cached buffer. Channels keep their own references.
    pub fn evict_all(&self) {
        let mut cache = self.cache.lock();
        let count = cache.entries.len();
        cache.entries.clear();
        cache.bytes = 0;
        info!(count, "evicted all cached buffers");
    }

    /// Change the cache policy, evicting down to the new limits
    pub fn set_limits(&self, limits: CacheLimits) {
        *self.limits.lock() = limits;
        self.cache.lock().enforce(limits, None);
    }

    pub fn limits(&self) -> CacheLimits {
        *self.limits.lock()
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.lock().entries.contains_key(name)
    }

    /// Number of cached buffers
    pub fn len(&self) -> usize {
        self.cache.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes of cached sample data
    pub fn cached_bytes(&self) -> usize {
        self.cache.lock().bytes
    }
}
