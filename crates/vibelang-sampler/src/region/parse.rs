//! Opcode ingestion.
//!
//! [`Region::parse_opcode`] never rejects an instrument: unknown opcodes are
//! logged and skipped, malformed values keep the previous setting, and
//! numeric values are clamped to the opcode's declared bounds.

use super::activation::Gate;
use super::opcode::Opcode;
use super::values::{
    CrossfadeCurve, EqType, FilterType, LoopMode, OffMode, SelfMask, Trigger, VelocityOverride,
};
use super::{Range, Region};
use crate::config::{MAX_EQS_PER_REGION, MAX_FILTERS_PER_REGION, MAX_VOICES, NUM_CCS};
use crate::error::{Error, Result};
use crate::modulation::eg::{EG_DEPTH_RANGE, EG_MOD_RANGE, EG_PERCENT_RANGE, EG_TIME_RANGE};
use crate::modulation::{set_cc_data, EGDescription, EgStage, EqDescription, FilterDescription};

const MIDI_RANGE: Range<f32> = Range::new(0.0, 127.0);
const BEND_RANGE: Range<f32> = Range::new(-8192.0, 8192.0);
const VOLUME_RANGE: Range<f32> = Range::new(-144.0, 6.0);
const VOLUME_CC_RANGE: Range<f32> = Range::new(-144.0, 48.0);
const PERCENT_RANGE: Range<f32> = Range::new(0.0, 100.0);
const BIPOLAR_PERCENT_RANGE: Range<f32> = Range::new(-100.0, 100.0);
const PAN_CC_RANGE: Range<f32> = Range::new(-200.0, 200.0);
const CENTS_RANGE: Range<f32> = Range::new(-9600.0, 9600.0);
const DB_RANGE: Range<f32> = Range::new(-96.0, 96.0);
const SECONDS_RANGE: Range<f32> = Range::new(0.0, 100.0);
const FRAMES_RANGE: Range<u32> = Range::new(0, u32::MAX);
const FRAMES_CC_RANGE: Range<f32> = Range::new(-4_294_967_296.0, 4_294_967_296.0);

/// Which envelope an `*eg_*` opcode addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EgTarget {
    Amplitude,
    Pitch,
    Filter,
}

impl Region {
    /// Apply one opcode. Returns false when it was unknown or invalid.
    pub fn parse_opcode(&mut self, opcode: &Opcode) -> bool {
        match self.try_parse_opcode(opcode) {
            Ok(()) => true,
            Err(Error::UnknownOpcode(name)) => {
                log::debug!("Unknown opcode '{}' in region {}", name, self.id);
                false
            }
            Err(e) => {
                log::warn!(
                    "Ignoring '{}={}' in region {}: {}",
                    opcode.name,
                    opcode.value,
                    self.id,
                    e
                );
                false
            }
        }
    }

    /// Apply one opcode, reporting why it was not applied.
    pub fn try_parse_opcode(&mut self, opcode: &Opcode) -> Result<()> {
        let name = opcode.normalized.as_str();
        if let Some(rest) = name.strip_prefix("ampeg_") {
            return self.parse_eg(EgTarget::Amplitude, rest, opcode);
        }
        if let Some(rest) = name.strip_prefix("pitcheg_") {
            return self.parse_eg(EgTarget::Pitch, rest, opcode);
        }
        if let Some(rest) = name.strip_prefix("fileg_") {
            return self.parse_eg(EgTarget::Filter, rest, opcode);
        }
        if name.starts_with("eqN_") {
            return self.parse_eq(opcode);
        }

        match name {
            // Sound source
            "sample" => self.sample = opcode.value.replace('\\', "/"),
            "delay" => self.delay = opcode.read_bounded(SECONDS_RANGE)?,
            "delay_random" => self.delay_random = opcode.read_bounded(SECONDS_RANGE)?,
            "delay_onccN" => {
                let cc = cc_parameter(opcode)?;
                set_cc_data(&mut self.delay_cc, cc, opcode.read_bounded(SECONDS_RANGE)?);
            }
            "offset" => self.offset = opcode.read_bounded(FRAMES_RANGE)?,
            "offset_random" => self.offset_random = opcode.read_bounded(FRAMES_RANGE)?,
            "offset_onccN" | "offset_ccN" => {
                let cc = cc_parameter(opcode)?;
                set_cc_data(&mut self.offset_cc, cc, opcode.read_bounded(FRAMES_CC_RANGE)?);
            }
            "end" => self.sample_end = opcode.read_bounded(FRAMES_RANGE)?,
            "count" => self.sample_count = Some(opcode.read_bounded(FRAMES_RANGE)?),
            "loop_mode" | "loopmode" => self.loop_mode = Some(opcode.read::<LoopMode>()?),
            "loop_start" | "loopstart" => self.loop_range.set_start(opcode.read_bounded(FRAMES_RANGE)?),
            "loop_end" | "loopend" => self.loop_range.set_end(opcode.read_bounded(FRAMES_RANGE)?),

            // Voice lifecycle
            "group" => self.group = opcode.read::<u32>()?,
            "off_by" | "offby" => self.off_by = Some(opcode.read::<u32>()?),
            "off_mode" => self.off_mode = opcode.read::<OffMode>()?,
            "polyphony" => {
                self.polyphony = Some(opcode.read_bounded(Range::new(1, MAX_VOICES as u32))?)
            }
            "note_polyphony" => {
                self.note_polyphony = Some(opcode.read_bounded(Range::new(1, MAX_VOICES as u32))?)
            }
            "note_selfmask" => self.self_mask = opcode.read::<SelfMask>()?,

            // Key and velocity mapping
            "key" => {
                let key = opcode.read_key()?;
                if key < 0 {
                    self.trigger_on_cc = true;
                }
                self.key_range = Range::new(key, key);
                if key >= 0 {
                    self.pitch_keycenter = key as u8;
                }
            }
            "lokey" => self.key_range.set_start(opcode.read_key()?.max(0)),
            "hikey" => {
                let key = opcode.read_key()?;
                if key < 0 {
                    self.trigger_on_cc = true;
                }
                self.key_range.set_end(key);
            }
            "lovel" => self.velocity_range.set_start(opcode.read_bounded(Range::new(0, 127))?),
            "hivel" => self.velocity_range.set_end(opcode.read_bounded(Range::new(0, 127))?),
            "lochan" | "hichan" => {
                log::trace!("'{}' has no effect, channels are not a gating dimension", opcode.name);
            }

            // MIDI conditions
            "loccN" | "hiccN" => {
                let cc = cc_parameter(opcode)?;
                let value = opcode.read_bounded(MIDI_RANGE)? / 127.0;
                let entry = cc_range_entry(&mut self.cc_conditions, cc, Range::new(0.0, 1.0));
                if name == "loccN" {
                    entry.set_start(value);
                } else {
                    entry.set_end(value);
                }
                let on = entry.contains_with_end(0.0);
                self.gates.set_cc(cc, on);
            }
            "lobend" | "hibend" => {
                let value = opcode.read_bounded(BEND_RANGE)? / 8192.0;
                if name == "lobend" {
                    self.bend_range.set_start(value);
                } else {
                    self.bend_range.set_end(value);
                }
                self.gates.set(Gate::Pitch, self.bend_range.contains_with_end(0.0));
            }
            "sw_lokey" => self.keyswitch_range.set_start(opcode.read_key()?.max(0)),
            "sw_hikey" => self.keyswitch_range.set_end(opcode.read_key()?.max(0)),
            "sw_last" => {
                self.last_keyswitch = Some(opcode.read_key()?.max(0));
                self.gates.set(Gate::Key, false);
            }
            "sw_lolast" | "sw_hilast" => {
                let key = opcode.read_key()?.max(0);
                let range = self.last_keyswitch_range.get_or_insert(Range::new(key, key));
                if name == "sw_lolast" {
                    range.set_start(key);
                } else {
                    range.set_end(key);
                }
                self.gates.set(Gate::Key, false);
            }
            "sw_up" => self.keyswitch_up = Some(opcode.read_key()?.max(0)),
            "sw_down" => {
                self.keyswitch_down = Some(opcode.read_key()?.max(0));
                self.gates.set(Gate::Key, false);
            }
            "sw_previous" => {
                self.previous_keyswitch = Some(opcode.read_key()?.max(0));
                self.gates.set(Gate::PreviousKey, false);
            }
            "sw_vel" => self.velocity_override = opcode.read::<VelocityOverride>()?,
            "sustain_sw" => self.check_sustain = opcode.read::<bool>()?,
            "sostenuto_sw" => self.check_sostenuto = opcode.read::<bool>()?,
            "sustain_cc" => self.sustain_cc = opcode.read_bounded(MIDI_RANGE)? as u16,
            "sostenuto_cc" => self.sostenuto_cc = opcode.read_bounded(MIDI_RANGE)? as u16,
            "sustain_lo" => self.sustain_threshold = opcode.read_bounded(MIDI_RANGE)? / 127.0,
            "sostenuto_lo" => self.sostenuto_threshold = opcode.read_bounded(MIDI_RANGE)? / 127.0,

            // Internal conditions
            "lochanaft" | "hichanaft" => {
                let value = opcode.read_bounded(MIDI_RANGE)? / 127.0;
                if name == "lochanaft" {
                    self.aftertouch_range.set_start(value);
                } else {
                    self.aftertouch_range.set_end(value);
                }
                self.gates
                    .set(Gate::Aftertouch, self.aftertouch_range.contains_with_end(0.0));
            }
            "lobpm" | "hibpm" => {
                let value = opcode.read_bounded(Range::new(0.0, 500.0))?;
                if name == "lobpm" {
                    self.bpm_range.set_start(value);
                } else {
                    self.bpm_range.set_end(value);
                }
                self.gates.set(Gate::Bpm, self.bpm_range.contains_with_end(120.0));
            }
            "lorand" => self.random_range.set_start(opcode.read_bounded(Range::new(0.0, 1.0))?),
            "hirand" => self.random_range.set_end(opcode.read_bounded(Range::new(0.0, 1.0))?),
            "seq_length" | "seq_position" => {
                let value = opcode.read_bounded(Range::new(1u32, 100))?;
                if name == "seq_length" {
                    self.sequence_length = value;
                } else {
                    self.sequence_position = value;
                }
                self.sequence_counter = 0;
                self.gates.set(Gate::Sequence, self.sequence_position == 1);
            }

            // Triggers
            "trigger" => self.trigger = opcode.read::<Trigger>()?,
            "on_loccN" | "on_hiccN" => {
                let cc = cc_parameter(opcode)?;
                let value = opcode.read_bounded(MIDI_RANGE)? / 127.0;
                let entry = cc_range_entry(&mut self.cc_triggers, cc, Range::new(0.0, 1.0));
                if name == "on_loccN" {
                    entry.set_start(value);
                } else {
                    entry.set_end(value);
                }
                self.trigger_on_cc = true;
            }

            // Amplitude
            "volume" | "gain" => self.volume = opcode.read_bounded(VOLUME_RANGE)?,
            "amplitude" => self.amplitude = opcode.read_bounded(PERCENT_RANGE)?,
            "pan" => self.pan = opcode.read_bounded(BIPOLAR_PERCENT_RANGE)?,
            "volume_onccN" | "gain_onccN" | "gain_ccN" => {
                let cc = cc_parameter(opcode)?;
                set_cc_data(&mut self.volume_cc, cc, opcode.read_bounded(VOLUME_CC_RANGE)?);
            }
            "amplitude_onccN" | "amplitude_ccN" => {
                let cc = cc_parameter(opcode)?;
                set_cc_data(&mut self.amplitude_cc, cc, opcode.read_bounded(BIPOLAR_PERCENT_RANGE)?);
            }
            "pan_onccN" | "pan_ccN" => {
                let cc = cc_parameter(opcode)?;
                set_cc_data(&mut self.pan_cc, cc, opcode.read_bounded(PAN_CC_RANGE)?);
            }
            "amp_keycenter" => self.amp_keycenter = opcode.read_key()?.max(0) as u8,
            "amp_keytrack" => self.amp_keytrack = opcode.read_bounded(Range::new(-96.0, 12.0))?,
            "amp_veltrack" => self.amp_veltrack = opcode.read_bounded(BIPOLAR_PERCENT_RANGE)? / 100.0,
            "amp_velcurve_N" => {
                let velocity = opcode
                    .parameter(0)
                    .filter(|v| *v <= 127)
                    .ok_or_else(|| opcode.invalid_parameter(opcode.parameter(0).unwrap_or(0)))?;
                let value = opcode.read_bounded(Range::new(0.0, 1.0))?;
                self.set_velocity_point(velocity as u8, value);
            }
            "amp_random" => self.amp_random = opcode.read_bounded(Range::new(0.0, 24.0))?,
            "rt_decay" => self.rt_decay = opcode.read_bounded(Range::new(0.0, 200.0))?,
            "xfin_lokey" => self.crossfade_key_in_range.set_start(opcode.read_key()?.max(0)),
            "xfin_hikey" => self.crossfade_key_in_range.set_end(opcode.read_key()?.max(0)),
            "xfout_lokey" => self.crossfade_key_out_range.set_start(opcode.read_key()?.max(0)),
            "xfout_hikey" => self.crossfade_key_out_range.set_end(opcode.read_key()?.max(0)),
            "xfin_lovel" => self.crossfade_vel_in_range.set_start(opcode.read_bounded(Range::new(0, 127))?),
            "xfin_hivel" => self.crossfade_vel_in_range.set_end(opcode.read_bounded(Range::new(0, 127))?),
            "xfout_lovel" => self.crossfade_vel_out_range.set_start(opcode.read_bounded(Range::new(0, 127))?),
            "xfout_hivel" => self.crossfade_vel_out_range.set_end(opcode.read_bounded(Range::new(0, 127))?),
            "xf_keycurve" => self.crossfade_key_curve = opcode.read::<CrossfadeCurve>()?,
            "xf_velcurve" => self.crossfade_vel_curve = opcode.read::<CrossfadeCurve>()?,
            "xf_cccurve" => self.crossfade_cc_curve = opcode.read::<CrossfadeCurve>()?,
            "xfin_loccN" | "xfin_hiccN" => {
                let cc = cc_parameter(opcode)?;
                let value = opcode.read_bounded(MIDI_RANGE)?;
                let entry = cc_range_entry(&mut self.crossfade_cc_in_range, cc, Range::new(0.0, 0.0));
                if name == "xfin_loccN" {
                    entry.set_start(value);
                } else {
                    entry.set_end(value);
                }
            }
            "xfout_loccN" | "xfout_hiccN" => {
                let cc = cc_parameter(opcode)?;
                let value = opcode.read_bounded(MIDI_RANGE)?;
                let entry =
                    cc_range_entry(&mut self.crossfade_cc_out_range, cc, Range::new(127.0, 127.0));
                if name == "xfout_loccN" {
                    entry.set_start(value);
                } else {
                    entry.set_end(value);
                }
            }

            // Pitch
            "pitch_keycenter" => self.pitch_keycenter = opcode.read_key()?.max(0) as u8,
            "pitch_keytrack" => self.pitch_keytrack = opcode.read_bounded(Range::new(-1200.0, 1200.0))?,
            "pitch_veltrack" => self.pitch_veltrack = opcode.read_bounded(CENTS_RANGE)?,
            "pitch_random" => self.pitch_random = opcode.read_bounded(Range::new(0.0, 9600.0))?,
            "transpose" => self.transpose = opcode.read_bounded(Range::new(-127, 127))?,
            "tune" | "pitch" => self.tune = opcode.read_bounded(CENTS_RANGE)?,
            "bend_up" | "bendup" => self.bend_up = opcode.read_bounded(CENTS_RANGE)?,
            "bend_down" | "benddown" => self.bend_down = opcode.read_bounded(CENTS_RANGE)?,
            "bend_step" => self.bend_step = opcode.read_bounded(Range::new(1.0, 1200.0))?,

            // Filters
            "fil_type" | "filN_type" | "filtype" => {
                let value = opcode.read::<FilterType>()?;
                self.filter_mut(opcode, false)?.filter_type = value;
            }
            "cutoff" | "cutoffN" => {
                let value = opcode.read_bounded(Range::new(0.0, 20_000.0))?;
                self.filter_mut(opcode, false)?.cutoff = value;
            }
            "resonance" | "resonanceN" => {
                let value = opcode.read_bounded(Range::new(0.0, 96.0))?;
                self.filter_mut(opcode, false)?.resonance = value;
            }
            "fil_gain" | "filN_gain" => {
                let value = opcode.read_bounded(DB_RANGE)?;
                self.filter_mut(opcode, false)?.gain = value;
            }
            "fil_keytrack" | "filN_keytrack" => {
                let value = opcode.read_bounded(Range::new(0.0, 1200.0))?;
                self.filter_mut(opcode, false)?.keytrack = value;
            }
            "fil_keycenter" | "filN_keycenter" => {
                let value = opcode.read_key()?.max(0) as u8;
                self.filter_mut(opcode, false)?.keycenter = value;
            }
            "fil_veltrack" | "filN_veltrack" => {
                let value = opcode.read_bounded(CENTS_RANGE)?;
                self.filter_mut(opcode, false)?.veltrack = value;
            }
            "fil_random" | "filN_random" | "cutoff_random" | "cutoffN_random" => {
                let value = opcode.read_bounded(Range::new(0.0, 9600.0))?;
                self.filter_mut(opcode, false)?.random = value;
            }
            "cutoff_onccN" | "cutoffN_onccN" | "cutoff_ccN" | "cutoffN_ccN" => {
                let cc = cc_parameter(opcode)?;
                let value = opcode.read_bounded(CENTS_RANGE)?;
                self.filter_mut(opcode, true)?.set_cutoff_cc(cc, value);
            }
            "resonance_onccN" | "resonanceN_onccN" | "resonance_ccN" | "resonanceN_ccN" => {
                let cc = cc_parameter(opcode)?;
                let value = opcode.read_bounded(DB_RANGE)?;
                self.filter_mut(opcode, true)?.set_resonance_cc(cc, value);
            }
            "fil_gain_onccN" | "filN_gain_onccN" | "fil_gain_ccN" | "filN_gain_ccN" => {
                let cc = cc_parameter(opcode)?;
                let value = opcode.read_bounded(DB_RANGE)?;
                self.filter_mut(opcode, true)?.set_gain_cc(cc, value);
            }

            _ => return Err(Error::UnknownOpcode(opcode.name.clone())),
        }

        Ok(())
    }

    fn parse_eg(&mut self, target: EgTarget, rest: &str, opcode: &Opcode) -> Result<()> {
        if matches!(rest, "depth" | "vel2depth") {
            let value = opcode.read_bounded(EG_DEPTH_RANGE)?;
            let eg = match target {
                EgTarget::Amplitude => {
                    log::trace!("'{}' has no effect on the amplitude envelope", opcode.name);
                    return Ok(());
                }
                EgTarget::Pitch => self.pitch_eg.get_or_insert_with(EGDescription::default),
                EgTarget::Filter => self.filter_eg.get_or_insert_with(EGDescription::default),
            };
            if rest == "depth" {
                eg.depth = value;
            } else {
                eg.vel2depth = value;
            }
            return Ok(());
        }

        let (stage_name, kind) = if let Some(stage) = rest.strip_prefix("vel2") {
            (stage, StageField::Velocity)
        } else if let Some(stage) = rest
            .strip_suffix("_onccN")
            .or_else(|| rest.strip_suffix("ccN"))
        {
            (stage, StageField::Controller)
        } else {
            (rest, StageField::Base)
        };

        let base_range = match stage_name {
            "sustain" | "start" => EG_PERCENT_RANGE,
            "delay" | "attack" | "hold" | "decay" | "release" => EG_TIME_RANGE,
            _ => return Err(Error::UnknownOpcode(opcode.name.clone())),
        };
        if stage_name == "start" && kind == StageField::Velocity {
            return Err(Error::UnknownOpcode(opcode.name.clone()));
        }

        let cc = match kind {
            StageField::Controller => Some(cc_parameter(opcode)?),
            _ => None,
        };
        let value = match kind {
            StageField::Base => opcode.read_bounded(base_range)?,
            StageField::Velocity | StageField::Controller => opcode.read_bounded(EG_MOD_RANGE)?,
        };

        let eg = match target {
            EgTarget::Amplitude => &mut self.amplitude_eg,
            EgTarget::Pitch => self.pitch_eg.get_or_insert_with(EGDescription::default),
            EgTarget::Filter => self.filter_eg.get_or_insert_with(EGDescription::default),
        };
        let stage = eg_stage_mut(eg, stage_name)
            .ok_or_else(|| Error::UnknownOpcode(opcode.name.clone()))?;
        match (kind, cc) {
            (StageField::Controller, Some(cc)) => stage.set_cc(cc, value),
            (StageField::Velocity, _) => stage.vel2 = value,
            _ => stage.base = value,
        }
        Ok(())
    }

    fn parse_eq(&mut self, opcode: &Opcode) -> Result<()> {
        let band = opcode.parameter(0).unwrap_or(0);
        if band == 0 || band as usize > MAX_EQS_PER_REGION {
            return Err(opcode.invalid_parameter(band));
        }
        let index = band as usize - 1;

        let rest = opcode.normalized.trim_start_matches("eqN_");
        let freq_cc_range = Range::new(-30_000.0, 30_000.0);
        let bw_cc_range = Range::new(-4.0, 4.0);

        // Parse before growing the band list so that errors leave it untouched.
        enum Field {
            Type(EqType),
            Frequency(f32),
            Bandwidth(f32),
            Gain(f32),
            Vel2Frequency(f32),
            Vel2Gain(f32),
            FrequencyCc(u16, f32),
            BandwidthCc(u16, f32),
            GainCc(u16, f32),
        }
        let field = match rest {
            "type" => Field::Type(opcode.read::<EqType>()?),
            "freq" => Field::Frequency(opcode.read_bounded(Range::new(0.0, 30_000.0))?),
            "bw" => Field::Bandwidth(opcode.read_bounded(Range::new(0.001, 4.0))?),
            "gain" => Field::Gain(opcode.read_bounded(DB_RANGE)?),
            "vel2freq" => Field::Vel2Frequency(opcode.read_bounded(freq_cc_range)?),
            "vel2gain" => Field::Vel2Gain(opcode.read_bounded(DB_RANGE)?),
            "freqccN" | "freq_onccN" => {
                Field::FrequencyCc(cc_parameter(opcode)?, opcode.read_bounded(freq_cc_range)?)
            }
            "bwccN" | "bw_onccN" => {
                Field::BandwidthCc(cc_parameter(opcode)?, opcode.read_bounded(bw_cc_range)?)
            }
            "gainccN" | "gain_onccN" => {
                Field::GainCc(cc_parameter(opcode)?, opcode.read_bounded(DB_RANGE)?)
            }
            _ => return Err(Error::UnknownOpcode(opcode.name.clone())),
        };

        while self.equalizers.len() <= index {
            let next = self.equalizers.len();
            self.equalizers.push(EqDescription::for_band(next));
        }
        let eq = &mut self.equalizers[index];
        match field {
            Field::Type(value) => eq.eq_type = value,
            Field::Frequency(value) => eq.frequency = value,
            Field::Bandwidth(value) => eq.bandwidth = value,
            Field::Gain(value) => eq.gain = value,
            Field::Vel2Frequency(value) => eq.vel2frequency = value,
            Field::Vel2Gain(value) => eq.vel2gain = value,
            Field::FrequencyCc(cc, value) => eq.set_frequency_cc(cc, value),
            Field::BandwidthCc(cc, value) => eq.set_bandwidth_cc(cc, value),
            Field::GainCc(cc, value) => eq.set_gain_cc(cc, value),
        }
        Ok(())
    }

    /// Filter addressed by an opcode, created on first use. Un-numbered
    /// opcodes address the first filter.
    fn filter_mut(&mut self, opcode: &Opcode, has_cc: bool) -> Result<&mut FilterDescription> {
        let indexed = opcode.parameters.len() > usize::from(has_cc);
        let number = if indexed { opcode.parameter(0).unwrap_or(1) } else { 1 };
        if number == 0 || number as usize > MAX_FILTERS_PER_REGION {
            return Err(opcode.invalid_parameter(number));
        }
        let index = number as usize - 1;
        while self.filters.len() <= index {
            self.filters.push(FilterDescription::default());
        }
        Ok(&mut self.filters[index])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageField {
    Base,
    Velocity,
    Controller,
}

fn eg_stage_mut<'a>(eg: &'a mut EGDescription, stage: &str) -> Option<&'a mut EgStage> {
    match stage {
        "delay" => Some(&mut eg.delay),
        "attack" => Some(&mut eg.attack),
        "hold" => Some(&mut eg.hold),
        "decay" => Some(&mut eg.decay),
        "sustain" => Some(&mut eg.sustain),
        "release" => Some(&mut eg.release),
        "start" => Some(&mut eg.start),
        _ => None,
    }
}

/// Controller number of a CC-indexed opcode.
fn cc_parameter(opcode: &Opcode) -> Result<u16> {
    match opcode.last_parameter() {
        Some(cc) if (cc as usize) < NUM_CCS => Ok(cc as u16),
        Some(cc) => Err(opcode.invalid_parameter(cc)),
        None => Err(opcode.invalid_parameter(0)),
    }
}

fn cc_range_entry(
    entries: &mut Vec<crate::modulation::CCData<Range<f32>>>,
    cc: u16,
    default: Range<f32>,
) -> &mut Range<f32> {
    let position = match entries.iter().position(|e| e.cc == cc) {
        Some(position) => position,
        None => {
            entries.push(crate::modulation::CCData { cc, data: default });
            entries.len() - 1
        }
    };
    &mut entries[position].data
}
