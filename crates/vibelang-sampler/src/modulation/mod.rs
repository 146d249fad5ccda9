//! Modulation resolution.
//!
//! Everything here evaluates a region's static routings against the current
//! [`MidiState`](crate::midi_state::MidiState): envelope stage targets
//! ([`eg`]), the per-voice ADSR generator ([`envelope`]), and the filter and
//! EQ parameter pools ([`filter`], [`eq`]) that recompute kernel inputs at
//! control rate. Scratch memory for per-sample spans comes from
//! [`buffers::BufferPool`] so that nothing allocates while rendering.

pub mod buffers;
pub mod eg;
pub mod envelope;
pub mod eq;
pub mod filter;

pub use buffers::BufferPool;
pub use eg::{EGDescription, EgStage};
pub use envelope::{AdsrEnvelope, EnvelopeStage};
pub use eq::{EqDescription, EqHolder};
pub use filter::{
    bypass_factory, BypassKernel, FilterDescription, FilterHolder, FilterKernel, KernelFactory,
    KernelShape,
};

use crate::midi_state::MidiState;

/// A value attached to a controller number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CCData<T> {
    pub cc: u16,
    pub data: T,
}

/// Insert or replace the entry for `cc`.
pub fn set_cc_data<T>(entries: &mut Vec<CCData<T>>, cc: u16, data: T) {
    match entries.iter_mut().find(|e| e.cc == cc) {
        Some(entry) => entry.data = data,
        None => entries.push(CCData { cc, data }),
    }
}

/// Entry for `cc`, if any.
pub fn cc_data<T>(entries: &[CCData<T>], cc: u16) -> Option<&T> {
    entries.iter().find(|e| e.cc == cc).map(|e| &e.data)
}

/// Sum of `value(cc) * amount` over linear CC routings.
pub fn cc_sum(state: &MidiState, routings: &[CCData<f32>]) -> f32 {
    routings
        .iter()
        .map(|m| state.cc_value(m.cc) * m.data)
        .sum()
}

/// Same as [`cc_sum`] with controller values taken at `delay`.
pub fn cc_sum_at(state: &MidiState, routings: &[CCData<f32>], delay: i32) -> f32 {
    routings
        .iter()
        .map(|m| state.cc_value_at(m.cc, delay) * m.data)
        .sum()
}

/// Frequency ratio of an interval in cents.
pub fn cents_factor(cents: f32) -> f32 {
    (cents / 1200.0).exp2()
}

pub fn db_to_mag(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

pub fn mag_to_db(mag: f32) -> f32 {
    20.0 * mag.max(f32::MIN_POSITIVE).log10()
}

pub fn normalize_velocity(velocity: u8) -> f32 {
    velocity as f32 / 127.0
}

/// Fixed set of preallocated holders handed out by index.
#[derive(Debug)]
pub struct HolderPool<T> {
    holders: Vec<T>,
    free: Vec<usize>,
}

impl<T> HolderPool<T> {
    pub fn new(size: usize, mut factory: impl FnMut() -> T) -> Self {
        Self {
            holders: (0..size).map(|_| factory()).collect(),
            free: (0..size).rev().collect(),
        }
    }

    /// Take a free holder, or `None` when the pool is exhausted.
    pub fn acquire(&mut self) -> Option<usize> {
        self.free.pop()
    }

    /// Return a holder to the pool. Releasing twice is ignored.
    pub fn release(&mut self, index: usize) {
        if index < self.holders.len() && !self.free.contains(&index) {
            self.free.push(index);
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.holders.get_mut(index)
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.holders.len()
    }
}
