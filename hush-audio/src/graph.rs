//! Render graph - per-channel voices, master stage, and output inserts
//!
//! The graph is the only state touched by the audio callback. It is shared
//! with the control path behind a mutex; the callback only ever `try_lock`s
//! it and renders silence on contention.

use crate::buffer::SharedBuffer;
use crate::channel::ChannelHandle;
use crate::inserts::InsertChain;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;

/// Render graph shared between the control path and the audio callback
pub type SharedGraph = Arc<Mutex<MixGraph>>;

/// Events sent from the render path back to the control path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    /// One scheduled pass of a channel's buffer finished playing
    ///
    /// Only a wake-up: the finished count lives on the voice and is
    /// collected with `MixGraph::take_completions`.
    PassCompleted(ChannelHandle),
    /// The output device reported a failure
    StreamError(String),
}

/// Render node for a single channel
struct Voice {
    handle: ChannelHandle,
    buffer: SharedBuffer,
    /// Read position in frames
    cursor: usize,
    /// Buffer passes queued for playback
    scheduled: u32,
    /// Passes finished since the control path last collected them
    completed: u32,
    paused: bool,
    /// Channel gain (before master)
    gain: f32,
    /// Smoothed effective gain (interpolates toward gain * master)
    smoothed: f32,
}

/// Mixes every live voice into the shared output path
pub struct MixGraph {
    voices: Vec<Voice>,
    master: f32,
    muted: bool,
    sample_rate: u32,
    output_channels: usize,
    inserts: InsertChain,
    events: Sender<RenderEvent>,
}

impl MixGraph {
    /// Smoothing coefficient for gain changes (~5ms at 48kHz)
    const GAIN_SMOOTH_COEFF: f32 = 0.995;

    pub fn new(sample_rate: u32, output_channels: u16, events: Sender<RenderEvent>) -> Self {
        let output_channels = output_channels.max(1) as usize;
        Self {
            voices: Vec::new(),
            master: 1.0,
            muted: false,
            sample_rate,
            output_channels,
            inserts: InsertChain::new(sample_rate, output_channels),
            events,
        }
    }

    /// Wrap in the shared handle used by the control path and audio callback
    pub fn into_shared(self) -> SharedGraph {
        Arc::new(Mutex::new(self))
    }

    fn target_gain(&self, gain: f32) -> f32 {
        if self.muted {
            0.0
        } else {
            gain * self.master
        }
    }

    fn voice(&self, handle: ChannelHandle) -> Option<&Voice> {
        self.voices.iter().find(|v| v.handle == handle)
    }

    fn voice_mut(&mut self, handle: ChannelHandle) -> Option<&mut Voice> {
        self.voices.iter_mut().find(|v| v.handle == handle)
    }

    /// Attach a render node. Nothing plays until passes are scheduled.
    pub fn attach(&mut self, handle: ChannelHandle, buffer: SharedBuffer, gain: f32) {
        let smoothed = self.target_gain(gain);
        self.voices.push(Voice {
            handle,
            buffer,
            cursor: 0,
            scheduled: 0,
            completed: 0,
            paused: false,
            gain,
            smoothed,
        });
    }

    /// Detach a render node, releasing its buffer reference
    pub fn detach(&mut self, handle: ChannelHandle) -> bool {
        let before = self.voices.len();
        self.voices.retain(|v| v.handle != handle);
        self.voices.len() != before
    }

    /// Queue more passes of the voice's buffer
    pub fn schedule(&mut self, handle: ChannelHandle, passes: u32) -> bool {
        match self.voice_mut(handle) {
            Some(voice) => {
                voice.scheduled += passes;
                true
            }
            None => false,
        }
    }

    pub fn scheduled_passes(&self, handle: ChannelHandle) -> Option<u32> {
        self.voice(handle).map(|v| v.scheduled)
    }

    /// Finished-pass counts per voice since the last call, resetting them
    pub fn take_completions(&mut self) -> Vec<(ChannelHandle, u32)> {
        self.voices
            .iter_mut()
            .filter(|v| v.completed > 0)
            .map(|v| (v.handle, std::mem::take(&mut v.completed)))
            .collect()
    }

    /// Sender for reporting render-side trouble (device errors)
    pub fn event_sender(&self) -> Sender<RenderEvent> {
        self.events.clone()
    }

    pub fn set_gain(&mut self, handle: ChannelHandle, gain: f32) {
        if let Some(voice) = self.voice_mut(handle) {
            voice.gain = gain;
        }
    }

    pub fn set_master(&mut self, master: f32) {
        self.master = master;
    }

    pub fn master(&self) -> f32 {
        self.master
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Gain the voice is heading toward: channel gain * master (0 when muted)
    pub fn effective_gain(&self, handle: ChannelHandle) -> Option<f32> {
        self.voice(handle).map(|v| self.target_gain(v.gain))
    }

    pub fn pause(&mut self, handle: ChannelHandle) {
        if let Some(voice) = self.voice_mut(handle) {
            voice.paused = true;
        }
    }

    pub fn resume(&mut self, handle: ChannelHandle) {
        if let Some(voice) = self.voice_mut(handle) {
            voice.paused = false;
        }
    }

    pub fn pause_all(&mut self) {
        for voice in &mut self.voices {
            voice.paused = true;
        }
    }

    pub fn resume_all(&mut self) {
        for voice in &mut self.voices {
            voice.paused = false;
        }
    }

    pub fn is_paused(&self, handle: ChannelHandle) -> Option<bool> {
        self.voice(handle).map(|v| v.paused)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Interleaved channel count of the rendered output
    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn inserts(&self) -> &InsertChain {
        &self.inserts
    }

    pub fn inserts_mut(&mut self) -> &mut InsertChain {
        &mut self.inserts
    }

    /// Render interleaved audio into `output`
    ///
    /// Runs on the audio thread: no allocation, no blocking. Completion of a
    /// scheduled pass is counted on the voice and signalled with a
    /// non-blocking send.
    pub fn render(&mut self, output: &mut [f32]) {
        output.fill(0.0);
        let channels = self.output_channels;
        let frames = output.len() / channels;
        let master = if self.muted { 0.0 } else { self.master };

        for voice in &mut self.voices {
            if voice.paused || voice.scheduled == 0 {
                continue;
            }
            let target = voice.gain * master;
            let buffer = &voice.buffer;

            for frame in 0..frames {
                if voice.scheduled == 0 {
                    break;
                }
                voice.smoothed = Self::GAIN_SMOOTH_COEFF * voice.smoothed
                    + (1.0 - Self::GAIN_SMOOTH_COEFF) * target;

                let out = &mut output[frame * channels..(frame + 1) * channels];
                for (ch, sample) in out.iter_mut().enumerate() {
                    *sample += buffer.sample_for(voice.cursor, ch, channels) * voice.smoothed;
                }

                voice.cursor += 1;
                if voice.cursor >= buffer.frames() {
                    voice.cursor = 0;
                    voice.scheduled -= 1;
                    voice.completed += 1;
                    // A full queue loses the wake-up, never the count
                    let _ = self.events.try_send(RenderEvent::PassCompleted(voice.handle));
                }
            }
        }

        self.inserts.process(output);

        for sample in output.iter_mut() {
            *sample = soft_clip(*sample);
        }
    }
}

/// Soft clip threshold
const SOFT_CLIP_THRESHOLD: f32 = 0.75;
/// Soft clip ceiling
const SOFT_CLIP_CEILING: f32 = 0.89;

/// Gentle soft clipper for the mix bus
///
/// Transparent below the threshold; above it, approaches the ceiling
/// asymptotically so summed channels never hard-clip.
#[inline(always)]
fn soft_clip(x: f32) -> f32 {
    let abs_x = x.abs();
    if abs_x <= SOFT_CLIP_THRESHOLD {
        return x;
    }

    let knee_width = SOFT_CLIP_CEILING - SOFT_CLIP_THRESHOLD;
    let ratio = (abs_x - SOFT_CLIP_THRESHOLD) / knee_width;
    let compressed = SOFT_CLIP_THRESHOLD + knee_width * (1.0 - (-ratio * 3.0).exp());
    x.signum() * compressed.min(SOFT_CLIP_CEILING)
}
