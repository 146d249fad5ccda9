//! Envelope generator descriptions.

use super::{cc_sum, normalize_velocity, set_cc_data, CCData};
use crate::midi_state::MidiState;
use crate::region::Range;

/// Legal range of stage durations, in seconds.
pub const EG_TIME_RANGE: Range<f32> = Range::new(0.0, 100.0);
/// Legal range of sustain and start levels, in percent.
pub const EG_PERCENT_RANGE: Range<f32> = Range::new(0.0, 100.0);
/// Legal range of pitch and filter EG depth, in cents.
pub const EG_DEPTH_RANGE: Range<f32> = Range::new(-12_000.0, 12_000.0);
/// Legal range of `*_onccN` and `vel2*` amounts.
pub const EG_MOD_RANGE: Range<f32> = Range::new(-100.0, 100.0);

/// One stage: base value, velocity amount and CC routings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EgStage {
    pub base: f32,
    pub vel2: f32,
    pub cc: Vec<CCData<f32>>,
}

impl EgStage {
    fn with_base(base: f32) -> Self {
        Self {
            base,
            ..Default::default()
        }
    }

    pub fn set_cc(&mut self, cc: u16, amount: f32) {
        set_cc_data(&mut self.cc, cc, amount);
    }

    fn evaluate(&self, state: &MidiState, velocity: u8, bounds: Range<f32>) -> f32 {
        let value = self.base + normalize_velocity(velocity) * self.vel2 + cc_sum(state, &self.cc);
        bounds.clamp(value)
    }
}

/// Static description of an ADSR envelope with delay, hold and start level.
#[derive(Debug, Clone, PartialEq)]
pub struct EGDescription {
    pub delay: EgStage,
    pub attack: EgStage,
    pub hold: EgStage,
    pub decay: EgStage,
    pub sustain: EgStage,
    pub release: EgStage,
    /// Initial level; velocity has no effect on it
    pub start: EgStage,
    /// Modulation depth in cents (pitch and filter EGs)
    pub depth: f32,
    pub vel2depth: f32,
}

impl Default for EGDescription {
    fn default() -> Self {
        Self {
            delay: EgStage::default(),
            attack: EgStage::default(),
            hold: EgStage::default(),
            decay: EgStage::default(),
            sustain: EgStage::with_base(100.0),
            release: EgStage::default(),
            start: EgStage::default(),
            depth: 0.0,
            vel2depth: 0.0,
        }
    }
}

impl EGDescription {
    pub fn get_delay(&self, state: &MidiState, velocity: u8) -> f32 {
        self.delay.evaluate(state, velocity, EG_TIME_RANGE)
    }

    pub fn get_attack(&self, state: &MidiState, velocity: u8) -> f32 {
        self.attack.evaluate(state, velocity, EG_TIME_RANGE)
    }

    pub fn get_hold(&self, state: &MidiState, velocity: u8) -> f32 {
        self.hold.evaluate(state, velocity, EG_TIME_RANGE)
    }

    pub fn get_decay(&self, state: &MidiState, velocity: u8) -> f32 {
        self.decay.evaluate(state, velocity, EG_TIME_RANGE)
    }

    /// Sustain level in percent.
    pub fn get_sustain(&self, state: &MidiState, velocity: u8) -> f32 {
        self.sustain.evaluate(state, velocity, EG_PERCENT_RANGE)
    }

    pub fn get_release(&self, state: &MidiState, velocity: u8) -> f32 {
        self.release.evaluate(state, velocity, EG_TIME_RANGE)
    }

    /// Start level in percent.
    pub fn get_start(&self, state: &MidiState) -> f32 {
        self.start.evaluate(state, 0, EG_PERCENT_RANGE)
    }

    /// Depth in cents, including velocity scaling.
    pub fn get_depth(&self, velocity: u8) -> f32 {
        EG_DEPTH_RANGE.clamp(self.depth + self.vel2depth * normalize_velocity(velocity))
    }
}
