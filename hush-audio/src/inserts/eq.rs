//! 10-band graphic equalizer
//!
//! One RBJ peaking biquad per band, octave spaced from 32Hz to 16kHz.
//! Bands at or above 0.45x the sample rate are bypassed.

use super::Insert;
use std::f32::consts::PI;

/// Band centre frequencies in Hz
pub const EQ_BANDS: [f32; 10] = [
    32.0, 63.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Band gain range in dB
const MAX_GAIN_DB: f32 = 12.0;

/// Roughly one-octave bandwidth
const BAND_Q: f32 = 1.414;

/// Named gain curves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EqPreset {
    #[default]
    Flat,
    Rock,
    Pop,
    Jazz,
    Classical,
    Electronic,
    SleepOptimized,
    BassBoost,
    TrebleBoost,
    Vocal,
    /// User-defined gains
    Custom,
}

impl EqPreset {
    pub const ALL: [EqPreset; 11] = [
        EqPreset::Flat,
        EqPreset::Rock,
        EqPreset::Pop,
        EqPreset::Jazz,
        EqPreset::Classical,
        EqPreset::Electronic,
        EqPreset::SleepOptimized,
        EqPreset::BassBoost,
        EqPreset::TrebleBoost,
        EqPreset::Vocal,
        EqPreset::Custom,
    ];

    /// Per-band gains in dB. `Custom` starts flat.
    pub fn gains(self) -> [f32; 10] {
        match self {
            EqPreset::Flat | EqPreset::Custom => [0.0; 10],
            EqPreset::Rock => [3.0, 2.0, -1.0, -2.0, 0.0, 1.0, 2.0, 3.0, 4.0, 3.0],
            EqPreset::Pop => [1.0, 2.0, 3.0, 2.0, 0.0, -1.0, 1.0, 2.0, 3.0, 2.0],
            EqPreset::Jazz => [2.0, 1.0, 0.0, 1.0, 2.0, 1.0, 0.0, -1.0, 1.0, 2.0],
            EqPreset::Classical => [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -1.0, -1.0, 0.0, 0.0],
            EqPreset::Electronic => [4.0, 3.0, 1.0, 0.0, -1.0, 0.0, 1.0, 2.0, 3.0, 4.0],
            EqPreset::SleepOptimized => [2.0, 1.0, 1.0, 0.0, 0.0, -1.0, -2.0, -3.0, -2.0, -1.0],
            EqPreset::BassBoost => [6.0, 4.0, 2.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            EqPreset::TrebleBoost => [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            EqPreset::Vocal => [-1.0, 0.0, 1.0, 2.0, 3.0, 3.0, 2.0, 1.0, 0.0, -1.0],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EqPreset::Flat => "flat",
            EqPreset::Rock => "rock",
            EqPreset::Pop => "pop",
            EqPreset::Jazz => "jazz",
            EqPreset::Classical => "classical",
            EqPreset::Electronic => "electronic",
            EqPreset::SleepOptimized => "sleep",
            EqPreset::BassBoost => "bass",
            EqPreset::TrebleBoost => "treble",
            EqPreset::Vocal => "vocal",
            EqPreset::Custom => "custom",
        }
    }

    /// Look up a preset by its short name
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// Equalizer parameters
#[derive(Debug, Clone, PartialEq)]
pub struct EqSettings {
    pub enabled: bool,
    pub preset: EqPreset,
    /// Per-band gains in dB, clamped to ±12
    pub gains_db: [f32; 10],
}

impl EqSettings {
    pub fn from_preset(preset: EqPreset) -> Self {
        Self {
            enabled: preset != EqPreset::Flat,
            preset,
            gains_db: preset.gains(),
        }
    }
}

impl Default for EqSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            preset: EqPreset::Flat,
            gains_db: [0.0; 10],
        }
    }
}

#[derive(Clone, Copy)]
struct BiquadCoeffs {
    a0: f32,
    a1: f32,
    a2: f32,
    b1: f32,
    b2: f32,
}

impl BiquadCoeffs {
    const IDENTITY: Self = Self {
        a0: 1.0,
        a1: 0.0,
        a2: 0.0,
        b1: 0.0,
        b2: 0.0,
    };

    /// RBJ cookbook peaking filter
    fn peaking(freq: f32, gain_db: f32, q: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let norm = 1.0 + alpha / a;
        Self {
            a0: (1.0 + alpha * a) / norm,
            a1: (-2.0 * cos_w0) / norm,
            a2: (1.0 - alpha * a) / norm,
            b1: (-2.0 * cos_w0) / norm,
            b2: (1.0 - alpha / a) / norm,
        }
    }
}

#[derive(Default, Clone, Copy)]
struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input: f32, c: &BiquadCoeffs) -> f32 {
        let output = c.a0 * input + c.a1 * self.x1 + c.a2 * self.x2 - c.b1 * self.y1 - c.b2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

/// 10-band peaking equalizer
pub struct Equalizer {
    enabled: bool,
    sample_rate: f32,
    channels: usize,
    preset: EqPreset,
    gains_db: [f32; 10],
    coeffs: [BiquadCoeffs; 10],
    /// Bands that actually filter (non-zero gain, below the Nyquist guard)
    active: [bool; 10],
    /// Filter memory, one bank per output channel
    states: Vec<[BiquadState; 10]>,
}

impl Equalizer {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            enabled: false,
            sample_rate: sample_rate as f32,
            channels: channels.max(1),
            preset: EqPreset::Flat,
            gains_db: [0.0; 10],
            coeffs: [BiquadCoeffs::IDENTITY; 10],
            active: [false; 10],
            states: vec![[BiquadState::default(); 10]; channels.max(1)],
        }
    }

    pub fn apply(&mut self, settings: &EqSettings) {
        self.enabled = settings.enabled;
        self.preset = settings.preset;
        for (band, gain) in settings.gains_db.iter().enumerate() {
            self.set_band_gain(band, *gain);
        }
    }

    /// Set one band's gain in dB
    pub fn set_band_gain(&mut self, band: usize, gain_db: f32) {
        if band >= EQ_BANDS.len() {
            return;
        }
        let gain_db = gain_db.clamp(-MAX_GAIN_DB, MAX_GAIN_DB);
        self.gains_db[band] = gain_db;

        let freq = EQ_BANDS[band];
        if gain_db == 0.0 || freq >= self.sample_rate * 0.45 {
            self.coeffs[band] = BiquadCoeffs::IDENTITY;
            self.active[band] = false;
        } else {
            self.coeffs[band] = BiquadCoeffs::peaking(freq, gain_db, BAND_Q, self.sample_rate);
            self.active[band] = true;
        }
    }

    pub fn band_gain(&self, band: usize) -> Option<f32> {
        self.gains_db.get(band).copied()
    }

    pub fn preset(&self) -> EqPreset {
        self.preset
    }

    /// Whether a band is applied at the current sample rate
    pub fn is_band_active(&self, band: usize) -> bool {
        self.active.get(band).copied().unwrap_or(false)
    }
}

impl Insert for Equalizer {
    fn process(&mut self, samples: &mut [f32]) {
        if !self.active.iter().any(|a| *a) {
            return;
        }
        for frame in samples.chunks_exact_mut(self.channels) {
            for (sample, state) in frame.iter_mut().zip(self.states.iter_mut()) {
                let mut x = *sample;
                for band in 0..EQ_BANDS.len() {
                    if self.active[band] {
                        x = state[band].process(x, &self.coeffs[band]);
                    }
                }
                *sample = x;
            }
        }
    }

    fn reset(&mut self) {
        for bank in &mut self.states {
            *bank = [BiquadState::default(); 10];
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn name(&self) -> &'static str {
        "Equalizer"
    }
}
