//! Automatable parameters.
//!
//! Hosts automate normalized values in `[0, 1]`; [`ParamRange`] maps them
//! to engine units and back.

use crate::config::{Oversampling, SamplerConfig, MAX_VOICES};

pub const VOLUME_PARAM: u32 = 0;
pub const NUM_VOICES_PARAM: u32 = 1;
pub const OVERSAMPLING_PARAM: u32 = 2;
pub const PRELOAD_SIZE_PARAM: u32 = 3;
/// Parameters `4..=131` carry MIDI CC 0..=127.
pub const FIRST_CC_PARAM: u32 = 4;
pub const NUM_CC_PARAMS: u32 = 128;
pub const PARAM_COUNT: u32 = FIRST_CC_PARAM + NUM_CC_PARAMS;

/// Default, bounds and quantization of one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub default: f32,
    pub min: f32,
    pub max: f32,
    /// Quantization step in engine units, 0 for continuous
    pub step: f32,
}

impl ParamRange {
    pub const fn new(default: f32, min: f32, max: f32) -> Self {
        Self {
            default,
            min,
            max,
            step: 0.0,
        }
    }

    pub const fn stepped(default: f32, min: f32, max: f32, step: f32) -> Self {
        Self {
            default,
            min,
            max,
            step,
        }
    }

    pub fn normalize(&self, value: f32) -> f32 {
        if self.max <= self.min {
            return 0.0;
        }
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }

    pub fn denormalize(&self, normalized: f32) -> f32 {
        let value = self.min + normalized.clamp(0.0, 1.0) * (self.max - self.min);
        if self.step > 0.0 {
            (self.min + ((value - self.min) / self.step).round() * self.step).min(self.max)
        } else {
            value
        }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    pub fn normalized_default(&self) -> f32 {
        self.normalize(self.default)
    }
}

/// Range of parameter `id`, or `None` for unknown ids.
pub fn param_range(id: u32) -> Option<ParamRange> {
    let (preload_min, preload_max) = SamplerConfig::PRELOAD_SIZE_RANGE;
    match id {
        VOLUME_PARAM => Some(ParamRange::new(0.0, -60.0, 6.0)),
        NUM_VOICES_PARAM => Some(ParamRange::stepped(64.0, 1.0, MAX_VOICES as f32, 1.0)),
        OVERSAMPLING_PARAM => Some(ParamRange::stepped(0.0, 0.0, 3.0, 1.0)),
        PRELOAD_SIZE_PARAM => Some(ParamRange::stepped(
            8192.0,
            preload_min as f32,
            preload_max as f32,
            1.0,
        )),
        id if (FIRST_CC_PARAM..PARAM_COUNT).contains(&id) => Some(ParamRange::new(0.0, 0.0, 1.0)),
        _ => None,
    }
}

/// A denormalized parameter change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamChange {
    Volume(f32),
    NumVoices(usize),
    Oversampling(Oversampling),
    PreloadSize(u32),
    Cc(u16, f32),
}

impl ParamChange {
    /// Interpret a normalized host value for parameter `id`.
    pub fn from_normalized(id: u32, normalized: f32) -> Option<Self> {
        let value = param_range(id)?.denormalize(normalized);
        let change = match id {
            VOLUME_PARAM => ParamChange::Volume(value),
            NUM_VOICES_PARAM => ParamChange::NumVoices(value as usize),
            OVERSAMPLING_PARAM => ParamChange::Oversampling(Oversampling::from_log2(value as u32)),
            PRELOAD_SIZE_PARAM => ParamChange::PreloadSize(value as u32),
            _ => ParamChange::Cc((id - FIRST_CC_PARAM) as u16, value),
        };
        Some(change)
    }
}
