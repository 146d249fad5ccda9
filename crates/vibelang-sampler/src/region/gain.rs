//! Crossfades, velocity curves and per-note derived values.

use rand::Rng;

use super::{CrossfadeCurve, Range, Region};
use crate::config::{Oversampling, CENTS_PER_SEMITONE};
use crate::midi_state::MidiState;
use crate::modulation::{cc_sum, cc_sum_at, cents_factor, db_to_mag, normalize_velocity};

/// Fade-in gain of `value` over `range`.
///
/// 0 below the range, a ramp inside it and 1 above it.
pub fn crossfade_in<T>(range: &Range<T>, value: T, curve: CrossfadeCurve) -> f32
where
    T: PartialOrd + Copy + Into<f32>,
{
    if value < range.start {
        return 0.0;
    }
    if value < range.end {
        let position = crossfade_position(range, value);
        return match curve {
            CrossfadeCurve::Power => position.sqrt(),
            CrossfadeCurve::Gain => position,
        };
    }
    1.0
}

/// Fade-out gain of `value` over `range`.
///
/// 1 below the range, a ramp inside it and 0 above it.
pub fn crossfade_out<T>(range: &Range<T>, value: T, curve: CrossfadeCurve) -> f32
where
    T: PartialOrd + Copy + Into<f32>,
{
    if value > range.end {
        return 0.0;
    }
    if value > range.start {
        let position = crossfade_position(range, value);
        return match curve {
            CrossfadeCurve::Power => (1.0 - position).sqrt(),
            CrossfadeCurve::Gain => 1.0 - position,
        };
    }
    1.0
}

fn crossfade_position<T: Copy + Into<f32>>(range: &Range<T>, value: T) -> f32 {
    let start: f32 = range.start.into();
    let end: f32 = range.end.into();
    (value.into() - start) / (end - start).max(1.0)
}

/// Integer key ranges are faded in f32 space.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
struct Key(i32);

impl From<Key> for f32 {
    fn from(key: Key) -> f32 {
        key.0 as f32
    }
}

fn key_range(range: &Range<i32>) -> Range<Key> {
    Range::new(Key(range.start), Key(range.end))
}

impl Region {
    /// Amplitude velocity response in [0, 1].
    ///
    /// Without `amp_velcurve_N` points the curve is quadratic and scaled by
    /// `amp_veltrack`; with points it interpolates linearly between them,
    /// with implicit ends at (0, 0) and (127, 1).
    pub fn velocity_curve(&self, velocity: u8) -> f32 {
        if self.velocity_points.is_empty() {
            let gain = normalize_velocity(velocity).powi(2);
            let tracked = self.amp_veltrack.abs() * (1.0 - gain);
            return if self.amp_veltrack < 0.0 { tracked } else { 1.0 - tracked };
        }

        let mut previous = (0u8, 0.0f32);
        for &point in self
            .velocity_points
            .iter()
            .chain(std::iter::once(&(127u8, 1.0f32)))
        {
            if velocity <= point.0 {
                let span = (point.0 - previous.0) as f32;
                if span <= 0.0 {
                    return point.1;
                }
                let t = (velocity - previous.0) as f32 / span;
                return previous.1 + t * (point.1 - previous.1);
            }
            previous = point;
        }
        previous.1
    }

    /// Set one `amp_velcurve_N` point, keeping points sorted.
    pub fn set_velocity_point(&mut self, velocity: u8, value: f32) {
        let value = value.clamp(0.0, 1.0);
        match self.velocity_points.binary_search_by_key(&velocity, |p| p.0) {
            Ok(index) => self.velocity_points[index].1 = value,
            Err(index) => self.velocity_points.insert(index, (velocity, value)),
        }
    }

    /// Gain from key tracking, key crossfades, velocity curve and velocity crossfades.
    pub fn note_gain(&self, key: u8, velocity: u8) -> f32 {
        let mut gain = db_to_mag(self.amp_keytrack * (key as f32 - self.amp_keycenter as f32));

        let key = Key(key as i32);
        gain *= crossfade_in(&key_range(&self.crossfade_key_in_range), key, self.crossfade_key_curve);
        gain *= crossfade_out(&key_range(&self.crossfade_key_out_range), key, self.crossfade_key_curve);

        gain *= self.velocity_curve(velocity);

        gain *= crossfade_in(&self.crossfade_vel_in_range, velocity, self.crossfade_vel_curve);
        gain *= crossfade_out(&self.crossfade_vel_out_range, velocity, self.crossfade_vel_curve);
        gain
    }

    /// Product of the CC crossfades at the current controller values.
    pub fn crossfade_gain(&self, state: &MidiState) -> f32 {
        let mut gain = 1.0;
        for entry in &self.crossfade_cc_in_range {
            let value = state.cc_value(entry.cc) * 127.0;
            gain *= crossfade_in(&entry.data, value, self.crossfade_cc_curve);
        }
        for entry in &self.crossfade_cc_out_range {
            let value = state.cc_value(entry.cc) * 127.0;
            gain *= crossfade_out(&entry.data, value, self.crossfade_cc_curve);
        }
        gain
    }

    /// Volume in dB for a note starting `delay` frames into the block.
    ///
    /// Release-triggered regions are attenuated by `rt_decay` for every
    /// second the note was held.
    pub fn base_volume_db<R: Rng>(&self, state: &MidiState, key: u8, delay: i32, rng: &mut R) -> f32 {
        let mut volume = self.volume + cc_sum(state, &self.volume_cc);
        if self.amp_random > 0.0 {
            volume += rng.random_range(0.0..=self.amp_random);
        }
        if self.is_release() {
            volume -= self.rt_decay * state.note_duration(key, delay);
        }
        volume
    }

    /// Linear gain from `amplitude` and its CC routings.
    pub fn base_gain(&self, state: &MidiState) -> f32 {
        ((self.amplitude + cc_sum(state, &self.amplitude_cc)) / 100.0).clamp(0.0, 1.0)
    }

    /// Pan position in [-1, 1].
    pub fn pan_value(&self, state: &MidiState) -> f32 {
        ((self.pan + cc_sum(state, &self.pan_cc)) / 100.0).clamp(-1.0, 1.0)
    }

    /// Pitch offset in cents for a note.
    pub fn base_pitch_cents<R: Rng>(&self, key: u8, velocity: u8, rng: &mut R) -> f32 {
        let mut cents = self.pitch_keytrack * (key as f32 - self.pitch_keycenter as f32);
        cents += self.tune;
        cents += CENTS_PER_SEMITONE * self.transpose as f32;
        cents += normalize_velocity(velocity) * self.pitch_veltrack;
        if self.pitch_random > 0.0 {
            cents += rng.random_range(-self.pitch_random..=self.pitch_random);
        }
        cents
    }

    /// Playback speed ratio for a note.
    pub fn base_pitch_variation<R: Rng>(&self, key: u8, velocity: u8, rng: &mut R) -> f32 {
        cents_factor(self.base_pitch_cents(key, velocity, rng))
    }

    /// Pitch bend in cents for a bend value in [-1, 1], quantized to `bend_step`.
    pub fn bend_in_cents(&self, bend: f32) -> f32 {
        let cents = if bend > 0.0 {
            bend * self.bend_up
        } else {
            -bend * self.bend_down
        };
        if self.bend_step > 1.0 {
            (cents / self.bend_step).round() * self.bend_step
        } else {
            cents
        }
    }

    /// Start delay in seconds, using controller values in effect at `delay`.
    pub fn delay_seconds<R: Rng>(&self, state: &MidiState, delay: i32, rng: &mut R) -> f32 {
        let mut seconds = self.delay + cc_sum_at(state, &self.delay_cc, delay);
        if self.delay_random > 0.0 {
            seconds += rng.random_range(0.0..=self.delay_random);
        }
        seconds.max(0.0)
    }

    /// Sample start offset in frames, scaled by the oversampling factor.
    pub fn sample_offset<R: Rng>(
        &self,
        state: &MidiState,
        delay: i32,
        oversampling: Oversampling,
        rng: &mut R,
    ) -> u64 {
        let mut offset = self.offset as f64 + cc_sum_at(state, &self.offset_cc, delay) as f64;
        if self.offset_random > 0 {
            offset += rng.random_range(0..=self.offset_random) as f64;
        }
        offset.max(0.0) as u64 * oversampling.factor() as u64
    }

    /// Last playable frame, scaled by the oversampling factor.
    pub fn true_sample_end(&self, oversampling: Oversampling) -> u64 {
        self.sample_end.min(self.loop_range.end) as u64 * oversampling.factor() as u64
    }

    pub fn loop_start(&self, oversampling: Oversampling) -> u64 {
        self.loop_range.start as u64 * oversampling.factor() as u64
    }

    pub fn loop_end(&self, oversampling: Oversampling) -> u64 {
        self.loop_range.end as u64 * oversampling.factor() as u64
    }
}
