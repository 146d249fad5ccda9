//! Region gating and trigger evaluation.
//!
//! Every gating dimension owns one flag. `register_*` methods update the
//! flags of their own dimension only, and [`Region::is_switched_on`] is the
//! conjunction of all of them. Trigger decisions additionally check the
//! per-event conditions (key, velocity, random value, trigger kind).

use super::{DelayedRelease, Region, Trigger};
use crate::modulation::cc_data;
use crate::config::{MAX_DELAYED_RELEASES, NUM_CCS};

/// Non-CC gating dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Key,
    PreviousKey,
    Sequence,
    Pitch,
    Bpm,
    Aftertouch,
}

impl Gate {
    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Gating flags. A cleared bit means the dimension lets the region sound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gates {
    off: u8,
    cc_off: [u64; NUM_CCS / 64],
}

impl Default for Gates {
    fn default() -> Self {
        Self {
            off: 0,
            cc_off: [0; NUM_CCS / 64],
        }
    }
}

impl Gates {
    pub fn set(&mut self, gate: Gate, on: bool) {
        if on {
            self.off &= !gate.bit();
        } else {
            self.off |= gate.bit();
        }
    }

    pub fn get(&self, gate: Gate) -> bool {
        self.off & gate.bit() == 0
    }

    pub fn set_cc(&mut self, cc: u16, on: bool) {
        let index = cc as usize;
        if index >= NUM_CCS {
            return;
        }
        let mask = 1u64 << (index % 64);
        if on {
            self.cc_off[index / 64] &= !mask;
        } else {
            self.cc_off[index / 64] |= mask;
        }
    }

    pub fn cc(&self, cc: u16) -> bool {
        let index = cc as usize;
        index >= NUM_CCS || self.cc_off[index / 64] & (1u64 << (index % 64)) == 0
    }

    /// Conjunction of every flag.
    pub fn all_on(&self) -> bool {
        self.off == 0 && self.cc_off.iter().all(|word| *word == 0)
    }
}

const PENDING_SUSTAIN: u8 = 1;
const PENDING_SOSTENUTO: u8 = 2;

fn note_bit(key: u8) -> u128 {
    1u128 << (key & 0x7f)
}

fn push_capped(list: &mut Vec<DelayedRelease>, release: DelayedRelease) {
    if list.len() < MAX_DELAYED_RELEASES {
        list.push(release);
    } else {
        log::warn!(
            "Delayed release list full ({} entries), dropping release of note {}",
            MAX_DELAYED_RELEASES,
            release.0
        );
    }
}

impl Region {
    pub fn is_switched_on(&self) -> bool {
        self.gates.all_on()
    }

    pub fn gates(&self) -> &Gates {
        &self.gates
    }

    /// Process a note-on. Returns true when the region should start a voice.
    pub fn register_note_on(&mut self, key: u8, velocity: u8, rand: f32) -> bool {
        let note = key as i32;

        if self.keyswitch_range.contains_with_end(note) {
            if let Some(keyswitch) = self.last_keyswitch {
                self.gates.set(Gate::Key, keyswitch == note);
            }
            if let Some(range) = self.last_keyswitch_range {
                self.gates.set(Gate::Key, range.contains_with_end(note));
            }
            if self.keyswitch_down == Some(note) {
                self.gates.set(Gate::Key, true);
            }
            if self.keyswitch_up == Some(note) {
                self.gates.set(Gate::Key, false);
            }
        }

        let key_ok = self.key_range.contains_with_end(note);
        let previously_active = self.active_notes_in_range;
        if key_ok {
            let length = self.sequence_length.max(1);
            self.gates.set(
                Gate::Sequence,
                self.sequence_counter % length == self.sequence_position.saturating_sub(1),
            );
            self.sequence_counter = (self.sequence_counter + 1) % length;

            if self.held_notes & note_bit(key) == 0 {
                self.held_notes |= note_bit(key);
                self.active_notes_in_range += 1;
            }
        }

        let previous_ok = !matches!(self.previous_keyswitch, Some(previous) if previous == note);
        let switched = self.is_switched_on();

        if let Some(previous) = self.previous_keyswitch {
            self.gates.set(Gate::PreviousKey, previous == note);
        }

        if !switched || self.trigger_on_cc || !previous_ok {
            return false;
        }

        let velocity_ok = self.velocity_range.contains_with_end(velocity);
        let trigger_ok = match self.trigger {
            Trigger::Attack => true,
            Trigger::First => previously_active == 0,
            Trigger::Legato => previously_active > 0,
            Trigger::Release | Trigger::ReleaseKey => false,
        };

        key_ok && velocity_ok && self.rand_ok(rand) && trigger_ok
    }

    /// Process a note-off. Returns true when a release-triggered voice should
    /// start now. Release triggers arriving while a pedal is held are queued
    /// instead and come back through [`Region::drain_pedal_releases`].
    pub fn register_note_off(&mut self, key: u8, velocity: u8, rand: f32) -> bool {
        let note = key as i32;

        if self.keyswitch_range.contains_with_end(note) {
            if self.keyswitch_down == Some(note) {
                self.gates.set(Gate::Key, false);
            }
            if self.keyswitch_up == Some(note) {
                self.gates.set(Gate::Key, true);
            }
        }

        let key_ok = self.key_range.contains_with_end(note);
        if key_ok && self.held_notes & note_bit(key) != 0 {
            self.held_notes &= !note_bit(key);
            self.active_notes_in_range = self.active_notes_in_range.saturating_sub(1);
        }

        if !self.is_switched_on() || self.trigger_on_cc {
            return false;
        }

        let velocity_ok = self.velocity_range.contains_with_end(velocity);
        if !(key_ok && velocity_ok && self.rand_ok(rand)) {
            return false;
        }

        match self.trigger {
            Trigger::ReleaseKey => true,
            Trigger::Release => {
                if self.check_sostenuto && self.sostenuto_pressed && self.sostenuto_notes & note_bit(key) != 0 {
                    push_capped(&mut self.delayed_sostenuto_releases, (key, velocity));
                    false
                } else if self.check_sustain && self.sustain_pressed {
                    push_capped(&mut self.delayed_releases, (key, velocity));
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    /// Process a controller change (normalized value). Returns true when a
    /// CC-triggered region should start a voice.
    pub fn register_cc(&mut self, cc: u16, value: f32) -> bool {
        if let Some(range) = cc_data(&self.cc_conditions, cc) {
            self.gates.set_cc(cc, range.contains_with_end(value));
        }

        self.update_pedals(cc, value);

        if !self.is_switched_on() || !self.trigger_on_cc {
            return false;
        }

        cc_data(&self.cc_triggers, cc).is_some_and(|range| range.contains_with_end(value))
    }

    /// Process a pitch bend change in [-1, 1].
    pub fn register_pitch_wheel(&mut self, bend: f32) {
        self.gates
            .set(Gate::Pitch, self.bend_range.contains_with_end(bend));
    }

    /// Process a channel pressure change in [0, 1].
    pub fn register_aftertouch(&mut self, value: f32) {
        self.gates
            .set(Gate::Aftertouch, self.aftertouch_range.contains_with_end(value));
    }

    pub fn register_tempo(&mut self, seconds_per_quarter: f32) {
        if seconds_per_quarter <= 0.0 {
            return;
        }
        let bpm = 60.0 / seconds_per_quarter;
        self.gates.set(Gate::Bpm, self.bpm_range.contains_with_end(bpm));
    }

    /// Move the releases unlocked by a pedal going up into `out`, in order.
    pub fn drain_pedal_releases(&mut self, out: &mut Vec<DelayedRelease>) {
        if self.pending_pedal_releases & PENDING_SOSTENUTO != 0 {
            out.extend(self.delayed_sostenuto_releases.drain(..));
        }
        if self.pending_pedal_releases & PENDING_SUSTAIN != 0 {
            out.extend(self.delayed_releases.drain(..));
        }
        self.pending_pedal_releases = 0;
    }

    pub fn has_pending_pedal_releases(&self) -> bool {
        self.pending_pedal_releases != 0
    }

    /// Forget held notes and queued releases (all notes off, reset).
    pub fn reset_note_state(&mut self) {
        self.held_notes = 0;
        self.active_notes_in_range = 0;
        self.sostenuto_notes = 0;
        self.pending_pedal_releases = 0;
        self.delayed_releases.clear();
        self.delayed_sostenuto_releases.clear();
    }

    fn rand_ok(&self, rand: f32) -> bool {
        self.random_range.contains(rand) || (rand == 1.0 && self.random_range.end == 1.0)
    }

    fn update_pedals(&mut self, cc: u16, value: f32) {
        if self.check_sustain && cc == self.sustain_cc {
            let pressed = value >= self.sustain_threshold;
            if self.sustain_pressed && !pressed && !self.delayed_releases.is_empty() {
                self.pending_pedal_releases |= PENDING_SUSTAIN;
            }
            self.sustain_pressed = pressed;
        }

        if self.check_sostenuto && cc == self.sostenuto_cc {
            let pressed = value >= self.sostenuto_threshold;
            if pressed && !self.sostenuto_pressed {
                self.sostenuto_notes = self.held_notes;
            } else if !pressed && self.sostenuto_pressed {
                self.sostenuto_notes = 0;
                if self.check_sustain && self.sustain_pressed {
                    for release in self.delayed_sostenuto_releases.drain(..) {
                        push_capped(&mut self.delayed_releases, release);
                    }
                } else if !self.delayed_sostenuto_releases.is_empty() {
                    self.pending_pedal_releases |= PENDING_SOSTENUTO;
                }
            }
            self.sostenuto_pressed = pressed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Opcode;

    fn region(opcodes: &[(&str, &str)]) -> Region {
        let mut region = Region::new(0);
        region.parse_opcode(&Opcode::new("sample", "*sine"));
        for (name, value) in opcodes {
            region.parse_opcode(&Opcode::new(*name, *value));
        }
        region
    }

    fn cc(raw: u8) -> f32 {
        raw as f32 / 127.0
    }

    #[test]
    fn test_basic_state() {
        let mut region = region(&[]);
        region.register_cc(4, 0.0);
        assert!(region.is_switched_on());
    }

    #[test]
    fn test_single_cc_range() {
        let mut region = region(&[("locc4", "56"), ("hicc4", "59")]);
        assert!(!region.is_switched_on());
        region.register_cc(4, cc(57));
        assert!(region.is_switched_on());
        region.register_cc(4, cc(56));
        assert!(region.is_switched_on());
        region.register_cc(4, cc(59));
        assert!(region.is_switched_on());
        region.register_cc(4, cc(43));
        assert!(!region.is_switched_on());
        region.register_cc(4, cc(65));
        assert!(!region.is_switched_on());
        region.register_cc(6, cc(57));
        assert!(!region.is_switched_on());
    }

    #[test]
    fn test_multiple_cc_ranges() {
        let mut region = region(&[
            ("locc4", "56"),
            ("hicc4", "59"),
            ("locc54", "18"),
            ("hicc54", "27"),
        ]);
        region.register_cc(4, cc(57));
        assert!(!region.is_switched_on());
        region.register_cc(54, cc(19));
        assert!(region.is_switched_on());
        region.register_cc(54, cc(27));
        assert!(region.is_switched_on());
        region.register_cc(54, cc(2));
        assert!(!region.is_switched_on());
        assert!(region.gates().cc(4));
        assert!(!region.gates().cc(54));
        region.register_cc(54, cc(26));
        region.register_cc(4, cc(65));
        assert!(!region.is_switched_on());
    }

    #[test]
    fn test_bend_aftertouch_and_bpm_ranges() {
        let mut region = region(&[("lobend", "56"), ("hibend", "243")]);
        assert!(!region.is_switched_on());
        region.register_pitch_wheel(56.0 / 8192.0);
        assert!(region.is_switched_on());
        region.register_pitch_wheel(245.0 / 8192.0);
        assert!(!region.is_switched_on());

        let mut region = region_with_aftertouch();
        region.register_aftertouch(cc(56));
        assert!(region.is_switched_on());
        region.register_aftertouch(cc(98));
        assert!(!region.is_switched_on());

        let mut region = self::region(&[("lobpm", "56"), ("hibpm", "68")]);
        assert!(!region.is_switched_on());
        region.register_tempo(0.9);
        assert!(region.is_switched_on());
        region.register_tempo(1.1);
        assert!(!region.is_switched_on());
    }

    fn region_with_aftertouch() -> Region {
        region(&[("lochanaft", "56"), ("hichanaft", "68")])
    }

    #[test]
    fn test_gates_are_independent() {
        let mut region = region(&[("locc4", "56"), ("lobend", "0")]);
        region.register_cc(4, cc(60));
        region.register_pitch_wheel(0.5);
        assert!(region.is_switched_on());
        region.register_pitch_wheel(-0.5);
        assert!(!region.gates().get(Gate::Pitch));
        assert!(region.gates().cc(4));
        assert!(region.gates().get(Gate::Key));
    }

    #[test]
    fn test_inverted_key_range_never_sounds() {
        let mut region = region(&[("lokey", "60"), ("hikey", "50")]);
        for key in 0..128u8 {
            assert!(!region.register_note_on(key, 100, 0.5));
        }
    }

    #[test]
    fn test_velocity_and_key_checks() {
        let mut region = region(&[("lokey", "60"), ("hikey", "62"), ("lovel", "10"), ("hivel", "20")]);
        assert!(region.register_note_on(60, 10, 0.5));
        assert!(region.register_note_on(62, 20, 0.5));
        assert!(!region.register_note_on(61, 21, 0.5));
        assert!(!region.register_note_on(63, 15, 0.5));
    }

    #[test]
    fn test_random_range() {
        let mut region = region(&[("lorand", "0.35"), ("hirand", "1.0")]);
        assert!(!region.register_note_on(60, 64, 0.34));
        assert!(region.register_note_on(60, 64, 0.35));
        assert!(region.register_note_on(60, 64, 1.0));

        let mut region = self::region(&[("lorand", "0.0"), ("hirand", "0.35")]);
        assert!(region.register_note_on(60, 64, 0.0));
        assert!(!region.register_note_on(60, 64, 0.35));
    }

    #[test]
    fn test_sw_last() {
        let mut region = region(&[("sw_lokey", "30"), ("sw_hikey", "50"), ("sw_last", "40")]);
        assert!(!region.is_switched_on());
        assert!(!region.register_note_on(60, 64, 0.5));
        region.register_note_off(60, 0, 0.5);
        region.register_note_on(40, 64, 0.5);
        region.register_note_off(40, 0, 0.5);
        assert!(region.is_switched_on());
        assert!(region.register_note_on(60, 64, 0.5));
        region.register_note_off(60, 0, 0.5);
        region.register_note_on(41, 64, 0.5);
        assert!(!region.is_switched_on());
    }

    #[test]
    fn test_sw_lolast_hilast() {
        let mut region = region(&[
            ("sw_lokey", "30"),
            ("sw_hikey", "50"),
            ("sw_lolast", "36"),
            ("sw_hilast", "38"),
        ]);
        assert!(!region.is_switched_on());
        region.register_note_on(37, 64, 0.5);
        assert!(region.is_switched_on());
        region.register_note_on(40, 64, 0.5);
        assert!(!region.is_switched_on());
    }

    #[test]
    fn test_sw_down() {
        let mut region = region(&[("sw_lokey", "30"), ("sw_hikey", "50"), ("sw_down", "40")]);
        assert!(!region.is_switched_on());
        region.register_note_on(40, 64, 0.5);
        assert!(region.is_switched_on());
        assert!(region.register_note_on(60, 64, 0.5));
        region.register_note_off(40, 0, 0.5);
        assert!(!region.is_switched_on());
    }

    #[test]
    fn test_sw_up() {
        let mut region = region(&[("sw_lokey", "30"), ("sw_hikey", "50"), ("sw_up", "40")]);
        assert!(region.is_switched_on());
        region.register_note_on(40, 64, 0.5);
        assert!(!region.is_switched_on());
        region.register_note_off(40, 0, 0.5);
        assert!(region.is_switched_on());
    }

    #[test]
    fn test_sw_previous() {
        let mut region = region(&[("sw_previous", "40")]);
        assert!(!region.is_switched_on());
        assert!(!region.register_note_on(41, 64, 0.5));
        assert!(!region.register_note_on(40, 64, 0.5));
        assert!(region.is_switched_on());
        assert!(region.register_note_on(41, 64, 0.5));
        assert!(!region.is_switched_on());
        assert!(!region.register_note_on(41, 64, 0.5));
    }

    #[test]
    fn test_sequence_length_3_position_2() {
        let mut region = region(&[("seq_length", "3"), ("seq_position", "2"), ("key", "40")]);
        assert!(!region.is_switched_on());
        let pattern: Vec<bool> = (0..5)
            .map(|_| {
                let on = region.register_note_on(40, 64, 0.5);
                region.register_note_off(40, 0, 0.5);
                on
            })
            .collect();
        assert_eq!(pattern, vec![false, true, false, false, true]);
    }

    #[test]
    fn test_sequence_length_2() {
        let mut region = region(&[("seq_length", "2"), ("seq_position", "1"), ("key", "40")]);
        assert!(region.is_switched_on());
        assert!(region.register_note_on(40, 64, 0.5));
        assert!(!region.register_note_on(40, 64, 0.5));
        assert!(region.register_note_on(40, 64, 0.5));
    }

    #[test]
    fn test_sequence_ignores_other_keys() {
        let mut region = region(&[("seq_length", "2"), ("seq_position", "2"), ("key", "40")]);
        assert!(!region.register_note_on(40, 64, 0.5));
        assert!(!region.register_note_on(41, 64, 0.5));
        assert!(region.register_note_on(40, 64, 0.5));
    }

    #[test]
    fn test_first_and_legato() {
        let mut first = region(&[("lokey", "60"), ("hikey", "70"), ("trigger", "first")]);
        let mut legato = region(&[("lokey", "60"), ("hikey", "70"), ("trigger", "legato")]);

        assert!(first.register_note_on(60, 64, 0.5));
        assert!(!legato.register_note_on(60, 64, 0.5));
        assert!(!first.register_note_on(62, 64, 0.5));
        assert!(legato.register_note_on(62, 64, 0.5));

        for region in [&mut first, &mut legato] {
            region.register_note_off(60, 0, 0.5);
            region.register_note_off(62, 0, 0.5);
        }
        assert_eq!(first.active_notes_in_range(), 0);
        assert!(first.register_note_on(64, 64, 0.5));
        assert!(!legato.register_note_on(64, 64, 0.5));
    }

    #[test]
    fn test_release_triggers() {
        let mut release = region(&[("trigger", "release")]);
        let mut release_key = region(&[("trigger", "release_key")]);
        assert!(!release.register_note_on(60, 64, 0.5));
        assert!(!release_key.register_note_on(60, 64, 0.5));
        assert!(release.register_note_off(60, 64, 0.5));
        assert!(release_key.register_note_off(60, 64, 0.5));

        let mut attack = region(&[]);
        attack.register_note_on(60, 64, 0.5);
        assert!(!attack.register_note_off(60, 64, 0.5));
    }

    #[test]
    fn test_release_with_sustain_is_delayed() {
        let mut region = region(&[("trigger", "release")]);
        region.register_cc(64, 1.0);
        region.register_note_on(60, 80, 0.5);
        region.register_note_on(62, 90, 0.5);
        assert!(!region.register_note_off(60, 80, 0.5));
        assert!(!region.register_note_off(62, 90, 0.5));
        assert_eq!(region.delayed_releases(), &[(60, 80), (62, 90)]);

        let mut out = Vec::new();
        region.drain_pedal_releases(&mut out);
        assert!(out.is_empty());

        region.register_cc(64, 0.0);
        assert!(region.has_pending_pedal_releases());
        region.drain_pedal_releases(&mut out);
        assert_eq!(out, vec![(60, 80), (62, 90)]);
        assert!(region.delayed_releases().is_empty());
    }

    #[test]
    fn test_delayed_releases_are_capped() {
        let mut region = region(&[("trigger", "release")]);
        region.register_cc(64, 1.0);
        for velocity in 0..(MAX_DELAYED_RELEASES + 2) as u8 {
            region.register_note_on(60, velocity, 0.5);
            assert!(!region.register_note_off(60, velocity, 0.5));
        }
        assert_eq!(region.delayed_releases().len(), MAX_DELAYED_RELEASES);
        assert_eq!(region.delayed_releases()[0], (60, 0));

        region.register_cc(64, 0.0);
        let mut out = Vec::with_capacity(MAX_DELAYED_RELEASES);
        region.drain_pedal_releases(&mut out);
        assert_eq!(out.len(), MAX_DELAYED_RELEASES);
        assert!(region.delayed_releases().is_empty());
    }

    #[test]
    fn test_release_key_ignores_sustain() {
        let mut region = region(&[("trigger", "release_key")]);
        region.register_cc(64, 1.0);
        region.register_note_on(60, 80, 0.5);
        assert!(region.register_note_off(60, 80, 0.5));
        assert!(region.delayed_releases().is_empty());
    }

    #[test]
    fn test_sustain_switch_and_custom_cc() {
        let mut region = region(&[("trigger", "release"), ("sustain_sw", "off")]);
        region.register_cc(64, 1.0);
        assert!(region.register_note_off(60, 80, 0.5));

        let mut region = self::region(&[("trigger", "release"), ("sustain_cc", "4"), ("sustain_lo", "100")]);
        region.register_cc(64, 1.0);
        assert!(region.register_note_off(60, 80, 0.5));
        region.register_cc(4, cc(99));
        assert!(region.register_note_off(60, 80, 0.5));
        region.register_cc(4, cc(100));
        assert!(!region.register_note_off(60, 80, 0.5));
    }

    #[test]
    fn test_sostenuto_captures_held_notes() {
        let mut region = region(&[("trigger", "release")]);
        region.register_note_on(60, 70, 0.5);
        region.register_cc(66, 1.0);
        region.register_note_on(62, 80, 0.5);

        assert!(!region.register_note_off(60, 70, 0.5));
        assert!(region.register_note_off(62, 80, 0.5));
        assert_eq!(region.delayed_sostenuto_releases(), &[(60, 70)]);

        region.register_cc(66, 0.0);
        let mut out = Vec::new();
        region.drain_pedal_releases(&mut out);
        assert_eq!(out, vec![(60, 70)]);
    }

    #[test]
    fn test_sostenuto_release_moves_to_sustain() {
        let mut region = region(&[("trigger", "release")]);
        region.register_note_on(60, 70, 0.5);
        region.register_cc(66, 1.0);
        region.register_cc(64, 1.0);
        assert!(!region.register_note_off(60, 70, 0.5));

        region.register_cc(66, 0.0);
        assert!(region.delayed_sostenuto_releases().is_empty());
        assert_eq!(region.delayed_releases(), &[(60, 70)]);

        region.register_cc(64, 0.0);
        let mut out = Vec::new();
        region.drain_pedal_releases(&mut out);
        assert_eq!(out, vec![(60, 70)]);
    }

    #[test]
    fn test_cc_trigger() {
        let mut region = region(&[("on_locc64", "64"), ("on_hicc64", "127")]);
        assert!(region.trigger_on_cc);
        assert!(!region.register_note_on(60, 64, 0.5));
        assert!(!region.register_cc(64, cc(63)));
        assert!(region.register_cc(64, cc(64)));
        assert!(!region.register_cc(65, cc(100)));
    }

    #[test]
    fn test_hikey_minus_one_is_cc_only() {
        let mut region = region(&[("hikey", "-1"), ("on_locc1", "0")]);
        assert!(region.trigger_on_cc);
        assert!(!region.register_note_on(0, 64, 0.5));
        assert!(region.register_cc(1, 0.2));
    }

    #[test]
    fn test_reset_note_state() {
        let mut region = region(&[("trigger", "release")]);
        region.register_cc(64, 1.0);
        region.register_note_on(60, 64, 0.5);
        region.register_note_off(60, 64, 0.5);
        region.reset_note_state();
        assert!(region.delayed_releases().is_empty());
        assert_eq!(region.active_notes_in_range(), 0);
    }
}
