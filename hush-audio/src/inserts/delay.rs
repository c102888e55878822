//! Feedback delay
//!
//! Plain integer-sample echo with feedback and a wet/dry mix. The delay line
//! holds up to two seconds per channel.

use super::Insert;

/// Maximum delay time in seconds
const MAX_DELAY_SECS: f32 = 2.0;

/// Feedback ceiling; keeps the loop from running away
const MAX_FEEDBACK: f32 = 0.95;

/// Delay parameters
#[derive(Debug, Clone, PartialEq)]
pub struct DelaySettings {
    pub enabled: bool,
    /// Delay time in seconds
    pub time: f32,
    /// Feedback amount (0.0 - 0.95)
    pub feedback: f32,
    /// Wet/dry mix (0.0 = dry, 1.0 = wet)
    pub mix: f32,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            time: 0.1,
            feedback: 0.2,
            mix: 0.2,
        }
    }
}

/// Interleaved feedback delay line
pub struct Delay {
    sample_rate: f32,
    channels: usize,
    /// Delay buffer, interleaved like the output
    buffer: Vec<f32>,
    buffer_frames: usize,
    write_pos: usize,
    delay_frames: usize,
    time: f32,
    feedback: f32,
    mix: f32,
    enabled: bool,
}

impl Delay {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let sample_rate = sample_rate as f32;
        let channels = channels.max(1);
        let buffer_frames = (sample_rate * MAX_DELAY_SECS) as usize + 1;
        let defaults = DelaySettings::default();

        let mut delay = Self {
            sample_rate,
            channels,
            buffer: vec![0.0; buffer_frames * channels],
            buffer_frames,
            write_pos: 0,
            delay_frames: 1,
            time: 0.0,
            feedback: defaults.feedback,
            mix: defaults.mix,
            enabled: false,
        };
        delay.set_time(defaults.time);
        delay
    }

    pub fn apply(&mut self, settings: &DelaySettings) {
        self.enabled = settings.enabled;
        self.set_time(settings.time);
        self.feedback = settings.feedback.clamp(0.0, MAX_FEEDBACK);
        self.mix = settings.mix.clamp(0.0, 1.0);
    }

    /// Set delay time in seconds
    pub fn set_time(&mut self, secs: f32) {
        self.time = secs.clamp(0.0, MAX_DELAY_SECS);
        self.delay_frames = ((self.time * self.sample_rate).round() as usize).clamp(1, self.buffer_frames - 1);
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }
}

impl Insert for Delay {
    fn process(&mut self, samples: &mut [f32]) {
        let channels = self.channels;
        for frame in samples.chunks_exact_mut(channels) {
            let read_pos = (self.write_pos + self.buffer_frames - self.delay_frames) % self.buffer_frames;
            for (ch, sample) in frame.iter_mut().enumerate() {
                let dry = *sample;
                let delayed = self.buffer[read_pos * channels + ch];
                self.buffer[self.write_pos * channels + ch] = dry + delayed * self.feedback;
                *sample = dry * (1.0 - self.mix) + delayed * self.mix;
            }
            self.write_pos = (self.write_pos + 1) % self.buffer_frames;
        }
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn name(&self) -> &'static str {
        "Delay"
    }
}
