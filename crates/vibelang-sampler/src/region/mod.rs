//! Region model.
//!
//! A [`Region`] is one sample-playback rule: the opcode-derived description
//! of when it sounds and how it is modulated, plus the runtime gating state
//! that the engine updates as events arrive. Regions never own audio.
//!
//! - [`parse`]: opcode ingestion (`Region::parse_opcode`)
//! - [`activation`]: `register_*` mutators and the gating flags
//! - [`gain`]: crossfades, velocity curves and per-note derived values
//! - [`builder`]: header inheritance and key offsets

pub mod activation;
pub mod builder;
pub mod gain;
pub mod opcode;
pub mod parse;
pub mod range;
pub mod values;

pub use activation::{Gate, Gates};
pub use builder::{Header, RegionBuilder};
pub use opcode::{Opcode, OpcodeValue};
pub use range::Range;
pub use values::{
    CrossfadeCurve, EqType, FilterType, LoopMode, OffMode, SelfMask, Trigger, VelocityOverride,
};

use crate::config::{MAX_DELAYED_RELEASES, SOSTENUTO_CC, SUSTAIN_CC};
use crate::modulation::{CCData, EGDescription, EqDescription, FilterDescription};

/// A (note, velocity) pair waiting for a pedal release.
pub type DelayedRelease = (u8, u8);

#[derive(Debug, Clone)]
pub struct Region {
    pub id: usize,

    // Sound source
    pub sample: String,
    /// Seconds before the voice starts
    pub delay: f32,
    pub delay_random: f32,
    pub delay_cc: Vec<CCData<f32>>,
    /// Frames skipped at the start of the sample
    pub offset: u32,
    pub offset_random: u32,
    pub offset_cc: Vec<CCData<f32>>,
    pub sample_end: u32,
    pub sample_count: Option<u32>,
    pub loop_mode: Option<LoopMode>,
    pub loop_range: Range<u32>,

    // Voice lifecycle
    pub group: u32,
    pub off_by: Option<u32>,
    pub off_mode: OffMode,
    pub polyphony: Option<u32>,
    pub note_polyphony: Option<u32>,
    pub self_mask: SelfMask,

    // Key and velocity mapping
    pub key_range: Range<i32>,
    pub velocity_range: Range<u8>,

    // MIDI conditions, all controller values normalized
    pub bend_range: Range<f32>,
    pub cc_conditions: Vec<CCData<Range<f32>>>,
    pub keyswitch_range: Range<i32>,
    pub last_keyswitch: Option<i32>,
    pub last_keyswitch_range: Option<Range<i32>>,
    pub keyswitch_up: Option<i32>,
    pub keyswitch_down: Option<i32>,
    pub previous_keyswitch: Option<i32>,
    pub velocity_override: VelocityOverride,
    pub check_sustain: bool,
    pub check_sostenuto: bool,
    pub sustain_cc: u16,
    pub sostenuto_cc: u16,
    pub sustain_threshold: f32,
    pub sostenuto_threshold: f32,

    // Internal conditions
    pub aftertouch_range: Range<f32>,
    pub bpm_range: Range<f32>,
    pub random_range: Range<f32>,
    pub sequence_length: u32,
    pub sequence_position: u32,

    // Triggers
    pub trigger: Trigger,
    pub cc_triggers: Vec<CCData<Range<f32>>>,
    pub trigger_on_cc: bool,

    // Amplitude
    /// dB
    pub volume: f32,
    /// Percent
    pub amplitude: f32,
    /// Percent, -100 (left) to 100 (right)
    pub pan: f32,
    pub volume_cc: Vec<CCData<f32>>,
    pub amplitude_cc: Vec<CCData<f32>>,
    pub pan_cc: Vec<CCData<f32>>,
    pub amp_keycenter: u8,
    /// dB per key
    pub amp_keytrack: f32,
    /// Fraction, -1 to 1
    pub amp_veltrack: f32,
    /// Custom velocity curve points, sorted by velocity
    pub velocity_points: Vec<(u8, f32)>,
    pub amp_random: f32,
    /// dB per second of held note, release triggers only
    pub rt_decay: f32,
    pub crossfade_key_in_range: Range<i32>,
    pub crossfade_key_out_range: Range<i32>,
    pub crossfade_vel_in_range: Range<u8>,
    pub crossfade_vel_out_range: Range<u8>,
    /// CC crossfade ranges in raw controller units (0-127)
    pub crossfade_cc_in_range: Vec<CCData<Range<f32>>>,
    pub crossfade_cc_out_range: Vec<CCData<Range<f32>>>,
    pub crossfade_key_curve: CrossfadeCurve,
    pub crossfade_vel_curve: CrossfadeCurve,
    pub crossfade_cc_curve: CrossfadeCurve,

    // Pitch
    pub pitch_keycenter: u8,
    /// Cents per key
    pub pitch_keytrack: f32,
    /// Cents at full velocity
    pub pitch_veltrack: f32,
    pub pitch_random: f32,
    pub transpose: i32,
    pub tune: f32,
    pub bend_up: f32,
    pub bend_down: f32,
    pub bend_step: f32,

    // Envelopes, filters and EQ
    pub amplitude_eg: EGDescription,
    pub pitch_eg: Option<EGDescription>,
    pub filter_eg: Option<EGDescription>,
    pub filters: Vec<FilterDescription>,
    pub equalizers: Vec<EqDescription>,

    // Runtime state
    pub(crate) gates: Gates,
    pub(crate) sequence_counter: u32,
    pub(crate) held_notes: u128,
    pub(crate) active_notes_in_range: u32,
    pub(crate) sustain_pressed: bool,
    pub(crate) sostenuto_pressed: bool,
    pub(crate) sostenuto_notes: u128,
    pub(crate) pending_pedal_releases: u8,
    pub(crate) delayed_releases: Vec<DelayedRelease>,
    pub(crate) delayed_sostenuto_releases: Vec<DelayedRelease>,
}

impl Region {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            sample: String::new(),
            delay: 0.0,
            delay_random: 0.0,
            delay_cc: Vec::new(),
            offset: 0,
            offset_random: 0,
            offset_cc: Vec::new(),
            sample_end: u32::MAX,
            sample_count: None,
            loop_mode: None,
            loop_range: Range::new(0, u32::MAX),
            group: 0,
            off_by: None,
            off_mode: OffMode::Fast,
            polyphony: None,
            note_polyphony: None,
            self_mask: SelfMask::Mask,
            key_range: Range::new(0, 127),
            velocity_range: Range::new(0, 127),
            bend_range: Range::new(-1.0, 1.0),
            cc_conditions: Vec::new(),
            keyswitch_range: Range::new(0, 127),
            last_keyswitch: None,
            last_keyswitch_range: None,
            keyswitch_up: None,
            keyswitch_down: None,
            previous_keyswitch: None,
            velocity_override: VelocityOverride::Current,
            check_sustain: true,
            check_sostenuto: true,
            sustain_cc: SUSTAIN_CC,
            sostenuto_cc: SOSTENUTO_CC,
            sustain_threshold: 0.5,
            sostenuto_threshold: 0.5,
            aftertouch_range: Range::new(0.0, 1.0),
            bpm_range: Range::new(0.0, 500.0),
            random_range: Range::new(0.0, 1.0),
            sequence_length: 1,
            sequence_position: 1,
            trigger: Trigger::Attack,
            cc_triggers: Vec::new(),
            trigger_on_cc: false,
            volume: 0.0,
            amplitude: 100.0,
            pan: 0.0,
            volume_cc: Vec::new(),
            amplitude_cc: Vec::new(),
            pan_cc: Vec::new(),
            amp_keycenter: 60,
            amp_keytrack: 0.0,
            amp_veltrack: 1.0,
            velocity_points: Vec::new(),
            amp_random: 0.0,
            rt_decay: 0.0,
            crossfade_key_in_range: Range::new(0, 0),
            crossfade_key_out_range: Range::new(127, 127),
            crossfade_vel_in_range: Range::new(0, 0),
            crossfade_vel_out_range: Range::new(127, 127),
            crossfade_cc_in_range: Vec::new(),
            crossfade_cc_out_range: Vec::new(),
            crossfade_key_curve: CrossfadeCurve::Power,
            crossfade_vel_curve: CrossfadeCurve::Power,
            crossfade_cc_curve: CrossfadeCurve::Power,
            pitch_keycenter: 60,
            pitch_keytrack: 100.0,
            pitch_veltrack: 0.0,
            pitch_random: 0.0,
            transpose: 0,
            tune: 0.0,
            bend_up: 200.0,
            bend_down: -200.0,
            bend_step: 1.0,
            amplitude_eg: EGDescription::default(),
            pitch_eg: None,
            filter_eg: None,
            filters: Vec::new(),
            equalizers: Vec::new(),
            gates: Gates::default(),
            sequence_counter: 0,
            held_notes: 0,
            active_notes_in_range: 0,
            sustain_pressed: false,
            sostenuto_pressed: false,
            sostenuto_notes: 0,
            pending_pedal_releases: 0,
            delayed_releases: Vec::with_capacity(MAX_DELAYED_RELEASES),
            delayed_sostenuto_releases: Vec::with_capacity(MAX_DELAYED_RELEASES),
        }
    }

    /// Whether the region plays a built-in generator (`*sine`, `*noise`, ...).
    pub fn is_generator(&self) -> bool {
        self.sample.starts_with('*')
    }

    /// Whether the region ignores note-off events.
    pub fn is_one_shot(&self) -> bool {
        self.loop_mode == Some(LoopMode::OneShot)
    }

    pub fn is_release(&self) -> bool {
        self.trigger.is_release()
    }

    /// Notes currently held down inside the key range.
    pub fn active_notes_in_range(&self) -> u32 {
        self.active_notes_in_range
    }

    /// Notes waiting for the sustain pedal, in arrival order.
    pub fn delayed_releases(&self) -> &[DelayedRelease] {
        &self.delayed_releases
    }

    /// Notes waiting for the sostenuto pedal, in arrival order.
    pub fn delayed_sostenuto_releases(&self) -> &[DelayedRelease] {
        &self.delayed_sostenuto_releases
    }

    /// Shift every key-valued field by `offset` semitones.
    pub fn offset_all_keys(&mut self, offset: i32) {
        fn shift(key: i32, offset: i32) -> i32 {
            (key + offset).clamp(0, 127)
        }
        fn shift_u8(key: u8, offset: i32) -> u8 {
            shift(key as i32, offset) as u8
        }

        if offset == 0 {
            return;
        }

        if !self.trigger_on_cc {
            self.key_range = Range::new(
                shift(self.key_range.start, offset),
                shift(self.key_range.end, offset),
            );
        }
        self.pitch_keycenter = shift_u8(self.pitch_keycenter, offset);
        self.amp_keycenter = shift_u8(self.amp_keycenter, offset);
        self.crossfade_key_in_range = Range::new(
            shift(self.crossfade_key_in_range.start, offset),
            shift(self.crossfade_key_in_range.end, offset),
        );
        self.crossfade_key_out_range = Range::new(
            shift(self.crossfade_key_out_range.start, offset),
            shift(self.crossfade_key_out_range.end, offset),
        );
        self.keyswitch_range = Range::new(
            shift(self.keyswitch_range.start, offset),
            shift(self.keyswitch_range.end, offset),
        );
        for key in [
            &mut self.last_keyswitch,
            &mut self.keyswitch_up,
            &mut self.keyswitch_down,
            &mut self.previous_keyswitch,
        ]
        .into_iter()
        .flatten()
        {
            *key = shift(*key, offset);
        }
        if let Some(range) = &mut self.last_keyswitch_range {
            *range = Range::new(shift(range.start, offset), shift(range.end, offset));
        }
        for filter in &mut self.filters {
            filter.keycenter = shift_u8(filter.keycenter, offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let region = Region::new(0);
        assert_eq!(region.key_range, Range::new(0, 127));
        assert_eq!(region.trigger, Trigger::Attack);
        assert_eq!(region.sustain_cc, 64);
        assert_eq!(region.sequence_length, 1);
        assert!(region.filters.is_empty());
        assert!(!region.is_generator());
    }

    #[test]
    fn test_offset_all_keys() {
        let mut region = Region::new(0);
        region.key_range = Range::new(60, 64);
        region.pitch_keycenter = 62;
        region.last_keyswitch = Some(36);
        region.filters.push(FilterDescription::default());
        region.offset_all_keys(-12);
        assert_eq!(region.key_range, Range::new(48, 52));
        assert_eq!(region.pitch_keycenter, 50);
        assert_eq!(region.last_keyswitch, Some(24));
        assert_eq!(region.filters[0].keycenter, 48);

        region.offset_all_keys(200);
        assert_eq!(region.key_range, Range::new(127, 127));
    }
}
