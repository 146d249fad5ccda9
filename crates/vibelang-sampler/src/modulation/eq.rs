//! EQ band parameter resolution.

use super::filter::{FilterKernel, KernelShape};
use super::{cc_sum_at, normalize_velocity, set_cc_data, BufferPool, CCData};
use crate::midi_state::MidiState;
use crate::region::values::EqType;
use crate::region::Range;

pub const EQ_FREQUENCY_RANGE: Range<f32> = Range::new(0.0, 30_000.0);
pub const EQ_BANDWIDTH_RANGE: Range<f32> = Range::new(0.001, 4.0);
pub const EQ_GAIN_RANGE: Range<f32> = Range::new(-96.0, 96.0);

/// Default centre frequency of each band.
pub const DEFAULT_EQ_FREQUENCIES: [f32; 3] = [50.0, 500.0, 5000.0];

/// Static routing of one EQ band.
#[derive(Debug, Clone, PartialEq)]
pub struct EqDescription {
    pub eq_type: EqType,
    /// Centre frequency in Hz
    pub frequency: f32,
    /// Bandwidth in octaves
    pub bandwidth: f32,
    /// Gain in dB
    pub gain: f32,
    /// Hz added at full velocity
    pub vel2frequency: f32,
    /// dB added at full velocity
    pub vel2gain: f32,
    pub frequency_cc: Vec<CCData<f32>>,
    pub bandwidth_cc: Vec<CCData<f32>>,
    pub gain_cc: Vec<CCData<f32>>,
}

impl Default for EqDescription {
    fn default() -> Self {
        Self::for_band(0)
    }
}

impl EqDescription {
    /// Default description of band `index` (0-based).
    pub fn for_band(index: usize) -> Self {
        Self {
            eq_type: EqType::Peak,
            frequency: DEFAULT_EQ_FREQUENCIES
                .get(index)
                .copied()
                .unwrap_or(DEFAULT_EQ_FREQUENCIES[0]),
            bandwidth: 1.0,
            gain: 0.0,
            vel2frequency: 0.0,
            vel2gain: 0.0,
            frequency_cc: Vec::new(),
            bandwidth_cc: Vec::new(),
            gain_cc: Vec::new(),
        }
    }

    pub fn set_frequency_cc(&mut self, cc: u16, hz: f32) {
        set_cc_data(&mut self.frequency_cc, cc, hz);
    }

    pub fn set_bandwidth_cc(&mut self, cc: u16, octaves: f32) {
        set_cc_data(&mut self.bandwidth_cc, cc, octaves);
    }

    pub fn set_gain_cc(&mut self, cc: u16, db: f32) {
        set_cc_data(&mut self.gain_cc, cc, db);
    }

    /// Velocity-dependent values before CC modulation.
    pub fn base_values(&self, velocity: u8) -> EqValues {
        let velocity = normalize_velocity(velocity);
        EqValues {
            frequency: EQ_FREQUENCY_RANGE.clamp(self.frequency + velocity * self.vel2frequency),
            bandwidth: EQ_BANDWIDTH_RANGE.clamp(self.bandwidth),
            gain: EQ_GAIN_RANGE.clamp(self.gain + velocity * self.vel2gain),
        }
    }

    pub fn modulated(&self, state: &MidiState, base: EqValues, delay: i32) -> EqValues {
        EqValues {
            frequency: EQ_FREQUENCY_RANGE
                .clamp(base.frequency + cc_sum_at(state, &self.frequency_cc, delay)),
            bandwidth: EQ_BANDWIDTH_RANGE
                .clamp(base.bandwidth + cc_sum_at(state, &self.bandwidth_cc, delay)),
            gain: EQ_GAIN_RANGE.clamp(base.gain + cc_sum_at(state, &self.gain_cc, delay)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EqValues {
    pub frequency: f32,
    pub bandwidth: f32,
    pub gain: f32,
}

/// Per-voice EQ band state taken from the pool.
pub struct EqHolder {
    kernel: Box<dyn FilterKernel>,
    base: EqValues,
    current: EqValues,
}

impl std::fmt::Debug for EqHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EqHolder")
            .field("base", &self.base)
            .field("current", &self.current)
            .finish()
    }
}

impl EqHolder {
    pub fn new(kernel: Box<dyn FilterKernel>) -> Self {
        Self {
            kernel,
            base: EqValues::default(),
            current: EqValues::default(),
        }
    }

    pub fn setup(&mut self, description: &EqDescription, velocity: u8) {
        self.base = description.base_values(velocity);
        self.current = self.base;
        self.kernel.set_shape(KernelShape::Eq(description.eq_type));
        self.kernel.reset();
    }

    pub fn current(&self) -> EqValues {
        self.current
    }

    /// Equalize `buffer` in place. The kernel receives frequency, bandwidth
    /// and gain in its cutoff, resonance and gain spans.
    pub fn process(
        &mut self,
        description: &EqDescription,
        state: &MidiState,
        buffer: &mut [f32],
        control_interval: usize,
        spans: &mut BufferPool,
    ) {
        let len = buffer.len();
        let Some(mut frequency) = spans.take(len) else {
            return;
        };
        let Some(mut bandwidth) = spans.take(len) else {
            spans.give(frequency);
            return;
        };
        let Some(mut gain) = spans.take(len) else {
            spans.give(frequency);
            spans.give(bandwidth);
            return;
        };

        for start in (0..len).step_by(control_interval.max(1)) {
            let end = (start + control_interval.max(1)).min(len);
            self.current = description.modulated(state, self.base, start as i32);
            frequency[start..end].fill(self.current.frequency);
            bandwidth[start..end].fill(self.current.bandwidth);
            gain[start..end].fill(self.current.gain);
        }

        self.kernel
            .process(buffer, &frequency[..len], &bandwidth[..len], &gain[..len]);

        spans.give(frequency);
        spans.give(bandwidth);
        spans.give(gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulation::BypassKernel;
    use approx::assert_relative_eq;

    #[test]
    fn test_band_defaults() {
        assert_eq!(EqDescription::for_band(0).frequency, 50.0);
        assert_eq!(EqDescription::for_band(1).frequency, 500.0);
        assert_eq!(EqDescription::for_band(2).frequency, 5000.0);
        assert_eq!(EqDescription::for_band(2).bandwidth, 1.0);
    }

    #[test]
    fn test_velocity_scaling() {
        let desc = EqDescription {
            frequency: 1000.0,
            gain: 3.0,
            vel2frequency: 500.0,
            vel2gain: -6.0,
            ..EqDescription::for_band(1)
        };
        let base = desc.base_values(127);
        assert_relative_eq!(base.frequency, 1500.0);
        assert_relative_eq!(base.gain, -3.0);
        let base = desc.base_values(0);
        assert_relative_eq!(base.frequency, 1000.0);
    }

    #[test]
    fn test_cc_modulation_is_additive_and_clamped() {
        let mut state = MidiState::new();
        let mut desc = EqDescription::for_band(0);
        desc.set_frequency_cc(20, 100.0);
        desc.set_bandwidth_cc(21, -10.0);
        desc.set_gain_cc(22, 12.0);
        state.cc_event(0, 20, 0.5);
        state.cc_event(0, 21, 1.0);
        state.cc_event(0, 22, 0.25);

        let values = desc.modulated(&state, desc.base_values(0), 0);
        assert_relative_eq!(values.frequency, 100.0);
        assert_relative_eq!(values.bandwidth, 0.001);
        assert_relative_eq!(values.gain, 3.0);
    }

    #[test]
    fn test_holder_tracks_current_values() {
        let mut state = MidiState::new();
        let mut desc = EqDescription::for_band(2);
        desc.set_gain_cc(7, 10.0);
        let mut holder = EqHolder::new(Box::new(BypassKernel));
        holder.setup(&desc, 64);

        state.cc_event(0, 7, 1.0);
        let mut spans = BufferPool::new(3, 32);
        let mut buffer = vec![0.5; 32];
        holder.process(&desc, &state, &mut buffer, 16, &mut spans);
        assert_relative_eq!(holder.current().gain, 10.0);
        assert!(buffer.iter().all(|v| *v == 0.5));
        assert_eq!(spans.available(), 3);
    }
}
