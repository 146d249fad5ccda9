//! Filter parameter resolution.
//!
//! A [`FilterHolder`] is taken from the engine pool when a voice starts. It
//! freezes the note-dependent base values (key tracking, velocity tracking,
//! random detune) and then, every control interval, adds the CC routings on
//! top and hands per-sample spans to the [`FilterKernel`]. The DSP itself
//! lives behind the trait.

use rand::Rng;

use super::{cents_factor, normalize_velocity, set_cc_data, BufferPool, CCData};
use crate::midi_state::MidiState;
use crate::region::values::{EqType, FilterType};
use crate::region::Range;

pub const CUTOFF_RANGE: Range<f32> = Range::new(0.0, 20_000.0);
pub const RESONANCE_RANGE: Range<f32> = Range::new(0.0, 96.0);
pub const FILTER_GAIN_RANGE: Range<f32> = Range::new(-96.0, 96.0);

/// Kind of response a kernel is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelShape {
    Filter(FilterType),
    Eq(EqType),
}

/// External filter DSP.
///
/// `process` filters `buffer` in place. The parameter spans have the same
/// length as `buffer` and hold one value per frame.
pub trait FilterKernel: Send {
    fn set_shape(&mut self, shape: KernelShape);
    fn reset(&mut self);
    fn process(&mut self, buffer: &mut [f32], cutoff: &[f32], resonance: &[f32], gain: &[f32]);
}

/// Kernel that leaves audio untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct BypassKernel;

impl FilterKernel for BypassKernel {
    fn set_shape(&mut self, _shape: KernelShape) {}

    fn reset(&mut self) {}

    fn process(&mut self, _buffer: &mut [f32], _cutoff: &[f32], _resonance: &[f32], _gain: &[f32]) {}
}

/// Factory used to fill the filter and EQ pools.
pub type KernelFactory = Box<dyn Fn() -> Box<dyn FilterKernel> + Send>;

pub fn bypass_factory() -> KernelFactory {
    Box::new(|| Box::new(BypassKernel))
}

/// Static filter routing of a region.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDescription {
    pub filter_type: FilterType,
    /// Cutoff in Hz
    pub cutoff: f32,
    /// Resonance in dB
    pub resonance: f32,
    /// Shelf/peak gain in dB
    pub gain: f32,
    /// Cents per key
    pub keytrack: f32,
    pub keycenter: u8,
    /// Cents at full velocity
    pub veltrack: f32,
    /// Maximum random detune in cents
    pub random: f32,
    /// Cutoff modulation in cents per unit CC
    pub cutoff_cc: Vec<CCData<f32>>,
    /// Resonance modulation in dB per unit CC
    pub resonance_cc: Vec<CCData<f32>>,
    /// Gain modulation in dB per unit CC
    pub gain_cc: Vec<CCData<f32>>,
}

impl Default for FilterDescription {
    fn default() -> Self {
        Self {
            filter_type: FilterType::Lpf2p,
            cutoff: 0.0,
            resonance: 0.0,
            gain: 0.0,
            keytrack: 0.0,
            keycenter: 60,
            veltrack: 0.0,
            random: 0.0,
            cutoff_cc: Vec::new(),
            resonance_cc: Vec::new(),
            gain_cc: Vec::new(),
        }
    }
}

impl FilterDescription {
    pub fn set_cutoff_cc(&mut self, cc: u16, cents: f32) {
        set_cc_data(&mut self.cutoff_cc, cc, cents);
    }

    pub fn set_resonance_cc(&mut self, cc: u16, db: f32) {
        set_cc_data(&mut self.resonance_cc, cc, db);
    }

    pub fn set_gain_cc(&mut self, cc: u16, db: f32) {
        set_cc_data(&mut self.gain_cc, cc, db);
    }

    /// Note-dependent cutoff before CC modulation.
    pub fn base_cutoff(&self, note: u8, velocity: u8, random_cents: f32) -> f32 {
        let mut cutoff = self.cutoff;
        cutoff *= cents_factor(random_cents);
        cutoff *= cents_factor(self.keytrack * (note as f32 - self.keycenter as f32));
        cutoff *= cents_factor(self.veltrack * normalize_velocity(velocity));
        CUTOFF_RANGE.clamp(cutoff)
    }

    /// Cutoff, resonance and gain in effect at `delay`.
    pub fn modulated(&self, state: &MidiState, base: FilterValues, delay: i32) -> FilterValues {
        let mut cutoff = base.cutoff;
        for m in &self.cutoff_cc {
            cutoff *= cents_factor(state.cc_value_at(m.cc, delay) * m.data);
        }
        let resonance = base.resonance + super::cc_sum_at(state, &self.resonance_cc, delay);
        let gain = base.gain + super::cc_sum_at(state, &self.gain_cc, delay);
        FilterValues {
            cutoff: CUTOFF_RANGE.clamp(cutoff),
            resonance: RESONANCE_RANGE.clamp(resonance),
            gain: FILTER_GAIN_RANGE.clamp(gain),
        }
    }
}

/// Resolved kernel inputs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterValues {
    pub cutoff: f32,
    pub resonance: f32,
    pub gain: f32,
}

/// Per-voice filter state taken from the pool.
pub struct FilterHolder {
    kernel: Box<dyn FilterKernel>,
    base: FilterValues,
    current: FilterValues,
    envelope_cents: f32,
}

impl std::fmt::Debug for FilterHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterHolder")
            .field("base", &self.base)
            .field("current", &self.current)
            .finish()
    }
}

impl FilterHolder {
    pub fn new(kernel: Box<dyn FilterKernel>) -> Self {
        Self {
            kernel,
            base: FilterValues::default(),
            current: FilterValues::default(),
            envelope_cents: 0.0,
        }
    }

    /// Freeze the note-dependent values for a new voice.
    pub fn setup<R: Rng>(
        &mut self,
        description: &FilterDescription,
        note: u8,
        velocity: u8,
        rng: &mut R,
    ) {
        let random = if description.random > 0.0 {
            rng.random_range(-description.random..=description.random)
        } else {
            0.0
        };
        self.base = FilterValues {
            cutoff: description.base_cutoff(note, velocity, random),
            resonance: RESONANCE_RANGE.clamp(description.resonance),
            gain: FILTER_GAIN_RANGE.clamp(description.gain),
        };
        self.current = self.base;
        self.envelope_cents = 0.0;
        self.kernel.set_shape(KernelShape::Filter(description.filter_type));
        self.kernel.reset();
    }

    /// Cutoff offset from the filter envelope, applied from the next block on.
    pub fn set_envelope_cents(&mut self, cents: f32) {
        self.envelope_cents = cents;
    }

    pub fn base(&self) -> FilterValues {
        self.base
    }

    /// Values used for the last control interval.
    pub fn current(&self) -> FilterValues {
        self.current
    }

    /// Filter `buffer` in place, refreshing parameters every `control_interval` frames.
    pub fn process(
        &mut self,
        description: &FilterDescription,
        state: &MidiState,
        buffer: &mut [f32],
        control_interval: usize,
        spans: &mut BufferPool,
    ) {
        let len = buffer.len();
        let Some(mut cutoff) = spans.take(len) else {
            log::trace!("no modulation span available, filter bypassed for this block");
            return;
        };
        let Some(mut resonance) = spans.take(len) else {
            spans.give(cutoff);
            return;
        };
        let Some(mut gain) = spans.take(len) else {
            spans.give(cutoff);
            spans.give(resonance);
            return;
        };

        let interval = control_interval.max(1);
        let mut start = 0;
        while start < len {
            let end = (start + interval).min(len);
            self.current = description.modulated(state, self.base, start as i32);
            if self.envelope_cents != 0.0 {
                self.current.cutoff =
                    CUTOFF_RANGE.clamp(self.current.cutoff * cents_factor(self.envelope_cents));
            }
            cutoff[start..end].fill(self.current.cutoff);
            resonance[start..end].fill(self.current.resonance);
            gain[start..end].fill(self.current.gain);
            start = end;
        }

        self.kernel
            .process(buffer, &cutoff[..len], &resonance[..len], &gain[..len]);

        spans.give(cutoff);
        spans.give(resonance);
        spans.give(gain);
    }
}
