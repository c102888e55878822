//! Freeverb-style reverb
//!
//! Eight parallel lowpass-feedback combs into four series allpasses, one bank
//! per side. Mono output uses the left bank only; channels past the first two
//! pass through untouched.

use super::Insert;

/// Comb delay lengths in samples at 44.1kHz
const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass delay lengths in samples at 44.1kHz
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];

/// Extra samples on the right bank for stereo width
const STEREO_SPREAD: usize = 23;

/// Room character presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReverbRoom {
    #[default]
    Room,
    Hall,
    Cathedral,
    Plate,
}

impl ReverbRoom {
    /// (room size, damping)
    fn shape(self) -> (f32, f32) {
        match self {
            ReverbRoom::Room => (0.4, 0.6),
            ReverbRoom::Hall => (0.7, 0.45),
            ReverbRoom::Cathedral => (0.9, 0.3),
            ReverbRoom::Plate => (0.6, 0.75),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ReverbRoom::Room => "room",
            ReverbRoom::Hall => "hall",
            ReverbRoom::Cathedral => "cathedral",
            ReverbRoom::Plate => "plate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "room" => Some(ReverbRoom::Room),
            "hall" => Some(ReverbRoom::Hall),
            "cathedral" => Some(ReverbRoom::Cathedral),
            "plate" => Some(ReverbRoom::Plate),
            _ => None,
        }
    }
}

/// Reverb parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ReverbSettings {
    pub enabled: bool,
    pub room: ReverbRoom,
    /// Wet/dry mix (0.0 = dry, 1.0 = wet)
    pub mix: f32,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            room: ReverbRoom::Room,
            mix: 0.3,
        }
    }
}

struct CombFilter {
    buffer: Vec<f32>,
    index: usize,
    filter_store: f32,
}

impl CombFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            filter_store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damping: f32) -> f32 {
        let output = self.buffer[self.index];
        self.filter_store = output * (1.0 - damping) + self.filter_store * damping;
        self.buffer[self.index] = input + self.filter_store * feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_store = 0.0;
        self.index = 0;
    }
}

struct AllpassFilter {
    buffer: Vec<f32>,
    index: usize,
}

impl AllpassFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        self.buffer[self.index] = input + buffered * 0.5;
        self.index = (self.index + 1) % self.buffer.len();
        buffered - input
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

/// One side of the network
struct Bank {
    combs: [CombFilter; 8],
    allpasses: [AllpassFilter; 4],
}

impl Bank {
    fn new(scale: f32, spread: usize) -> Self {
        Self {
            combs: std::array::from_fn(|i| CombFilter::new((COMB_TUNINGS[i] as f32 * scale) as usize + spread)),
            allpasses: std::array::from_fn(|i| {
                AllpassFilter::new((ALLPASS_TUNINGS[i] as f32 * scale) as usize + spread)
            }),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damping: f32) -> f32 {
        let mut out = 0.0;
        for comb in &mut self.combs {
            out += comb.process(input, feedback, damping);
        }
        out *= 0.125;
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }

    fn reset(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::reset);
        self.allpasses.iter_mut().for_each(AllpassFilter::reset);
    }
}

/// Stereo Freeverb
pub struct Reverb {
    left: Bank,
    right: Bank,
    channels: usize,
    room: ReverbRoom,
    feedback: f32,
    damping: f32,
    mix: f32,
    enabled: bool,
}

impl Reverb {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let scale = sample_rate as f32 / 44100.0;
        let spread = (STEREO_SPREAD as f32 * scale) as usize;
        let mut reverb = Self {
            left: Bank::new(scale, 0),
            right: Bank::new(scale, spread),
            channels: channels.max(1),
            room: ReverbRoom::Room,
            feedback: 0.0,
            damping: 0.0,
            mix: ReverbSettings::default().mix,
            enabled: false,
        };
        reverb.set_room(ReverbRoom::Room);
        reverb
    }

    pub fn apply(&mut self, settings: &ReverbSettings) {
        self.enabled = settings.enabled;
        self.set_room(settings.room);
        self.mix = settings.mix.clamp(0.0, 1.0);
    }

    pub fn set_room(&mut self, room: ReverbRoom) {
        let (size, damping) = room.shape();
        self.room = room;
        self.feedback = size * 0.28 + 0.7;
        self.damping = damping * 0.4;
    }

    pub fn room(&self) -> ReverbRoom {
        self.room
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }
}

impl Insert for Reverb {
    fn process(&mut self, samples: &mut [f32]) {
        let (feedback, damping, mix) = (self.feedback, self.damping, self.mix);

        for frame in samples.chunks_exact_mut(self.channels) {
            if frame.len() == 1 {
                let dry = frame[0];
                let wet = self.left.process(dry * 0.5, feedback, damping);
                frame[0] = dry * (1.0 - mix) + wet * mix;
                continue;
            }

            let (dry_l, dry_r) = (frame[0], frame[1]);
            let input = (dry_l + dry_r) * 0.25;
            let wet_l = self.left.process(input, feedback, damping);
            let wet_r = self.right.process(input, feedback, damping);
            frame[0] = dry_l * (1.0 - mix) + wet_l * mix;
            frame[1] = dry_r * (1.0 - mix) + wet_r * mix;
        }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.reset();
        }
    }

    fn name(&self) -> &'static str {
        "Reverb"
    }
}
