//! Channels and the channel registry
//!
//! A channel is one playing instance of a sound buffer. The registry owns the
//! live channels, enforces the concurrency cap, and keeps each channel's
//! render node attached to the graph for exactly as long as the channel lives.

use crate::buffer::SharedBuffer;
use crate::error::RegistryError;
use crate::graph::SharedGraph;
use std::fmt;
use tracing::{debug, warn};

/// Stable identifier for a live channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelHandle(u64);

impl ChannelHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Lifecycle state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Starting,
    Playing,
    Fading,
    Stopping,
    Stopped,
}

/// A single playback unit
#[derive(Debug)]
pub struct Channel {
    handle: ChannelHandle,
    sound_name: String,
    buffer: Option<SharedBuffer>,
    gain: f32,
    looping: bool,
    state: ChannelState,
}

impl Channel {
    pub fn handle(&self) -> ChannelHandle {
        self.handle
    }

    pub fn sound_name(&self) -> &str {
        &self.sound_name
    }

    /// Linear gain in [0, 1]
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Set gain, clamped to [0, 1]
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = clamp_gain(gain);
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn set_state(&mut self, state: ChannelState) {
        self.state = state;
    }

    pub fn buffer(&self) -> Option<&SharedBuffer> {
        self.buffer.as_ref()
    }

    /// Snapshot for callers outside the control path
    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            handle: self.handle,
            sound_name: self.sound_name.clone(),
            gain: self.gain,
            looping: self.looping,
            state: self.state,
        }
    }
}

/// Point-in-time view of a channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub handle: ChannelHandle,
    pub sound_name: String,
    pub gain: f32,
    pub looping: bool,
    pub state: ChannelState,
}

/// Clamp a gain into [0, 1]; NaN becomes silence
pub fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        0.0
    } else {
        gain.clamp(0.0, 1.0)
    }
}

/// Owns the set of live channels, in creation order
pub struct ChannelRegistry {
    channels: Vec<Channel>,
    max_channels: usize,
    next_id: u64,
    graph: SharedGraph,
}

impl ChannelRegistry {
    pub fn new(max_channels: usize, graph: SharedGraph) -> Self {
        Self {
            channels: Vec::with_capacity(max_channels),
            max_channels,
            next_id: 1,
            graph,
        }
    }

    /// Create a channel in `Starting` state and attach its render node
    pub fn create(
        &mut self,
        sound_name: &str,
        buffer: SharedBuffer,
        gain: f32,
        looping: bool,
    ) -> Result<ChannelHandle, RegistryError> {
        if self.channels.len() >= self.max_channels {
            warn!(
                sound = sound_name,
                max = self.max_channels,
                "channel capacity exceeded"
            );
            return Err(RegistryError::CapacityExceeded {
                max: self.max_channels,
            });
        }

        let handle = ChannelHandle::new(self.next_id);
        self.next_id += 1;
        let gain = clamp_gain(gain);

        self.graph.lock().attach(handle, buffer.clone(), gain);
        self.channels.push(Channel {
            handle,
            sound_name: sound_name.to_string(),
            buffer: Some(buffer),
            gain,
            looping,
            state: ChannelState::Starting,
        });
        debug!(channel = %handle, sound = sound_name, "channel created");
        Ok(handle)
    }

    /// Detach and drop a channel. Removing an unknown handle is a no-op.
    pub fn remove(&mut self, handle: ChannelHandle) -> Option<ChannelInfo> {
        let index = self.channels.iter().position(|c| c.handle == handle)?;
        let mut channel = self.channels.remove(index);

        self.graph.lock().detach(handle);
        channel.buffer = None;
        channel.state = ChannelState::Stopped;
        debug!(channel = %handle, sound = %channel.sound_name, "channel removed");
        Some(channel.info())
    }

    pub fn get(&self, handle: ChannelHandle) -> Option<&Channel> {
        self.channels.iter().find(|c| c.handle == handle)
    }

    pub fn get_mut(&mut self, handle: ChannelHandle) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.handle == handle)
    }

    pub fn contains(&self, handle: ChannelHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Live channels in creation order
    pub fn all(&self) -> Vec<ChannelHandle> {
        self.channels.iter().map(|c| c.handle).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Oldest channel in the given state
    pub fn oldest_in_state(&self, state: ChannelState) -> Option<ChannelHandle> {
        self.channels
            .iter()
            .find(|c| c.state == state)
            .map(|c| c.handle)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.channels.len() >= self.max_channels
    }

    pub fn max_channels(&self) -> usize {
        self.max_channels
    }
}
