//! Insert stages on the shared output path
//!
//! Every stage is disabled by default. The engine hands parameters through
//! as-is; the stages own their DSP state.

mod delay;
mod eq;
mod reverb;

pub use delay::{Delay, DelaySettings};
pub use eq::{EqPreset, EqSettings, Equalizer, EQ_BANDS};
pub use reverb::{Reverb, ReverbRoom, ReverbSettings};

/// A processing stage on the mix bus
pub trait Insert: Send {
    /// Process interleaved samples in place
    fn process(&mut self, samples: &mut [f32]);

    /// Clear internal state (delay lines, filter memory)
    fn reset(&mut self);

    fn is_enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);

    fn name(&self) -> &'static str;
}

/// Parameters for one insert stage, replaced wholesale
#[derive(Debug, Clone, PartialEq)]
pub enum InsertSettings {
    Equalizer(EqSettings),
    Delay(DelaySettings),
    Reverb(ReverbSettings),
}

/// Fixed chain: equalizer, then delay, then reverb
pub struct InsertChain {
    eq: Equalizer,
    delay: Delay,
    reverb: Reverb,
}

impl InsertChain {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            eq: Equalizer::new(sample_rate, channels),
            delay: Delay::new(sample_rate, channels),
            reverb: Reverb::new(sample_rate, channels),
        }
    }

    /// Apply new parameters to the matching stage
    pub fn apply(&mut self, settings: InsertSettings) {
        match settings {
            InsertSettings::Equalizer(s) => self.eq.apply(&s),
            InsertSettings::Delay(s) => self.delay.apply(&s),
            InsertSettings::Reverb(s) => self.reverb.apply(&s),
        }
    }

    pub fn eq(&self) -> &Equalizer {
        &self.eq
    }

    pub fn delay(&self) -> &Delay {
        &self.delay
    }

    pub fn reverb(&self) -> &Reverb {
        &self.reverb
    }

    /// Whether any stage would touch the signal
    pub fn is_active(&self) -> bool {
        self.eq.is_enabled() || self.delay.is_enabled() || self.reverb.is_enabled()
    }

    pub fn reset(&mut self) {
        self.eq.reset();
        self.delay.reset();
        self.reverb.reset();
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        let stages: [&mut dyn Insert; 3] = [&mut self.eq, &mut self.delay, &mut self.reverb];
        for stage in stages {
            if stage.is_enabled() {
                stage.process(samples);
            }
        }
    }
}
