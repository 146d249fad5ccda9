//! Time-aware MIDI state tracker.
//!
//! The [`MidiState`] holds the current value of every controller, note,
//! pitch bend, aftertouch and tempo, together with a short history of the
//! changes that happened inside the current block. Queries can therefore
//! ask for the value in effect at a given sample offset, which is what
//! delay- and offset-type opcodes need when a note is struck in the middle
//! of a block.
//!
//! Histories are collapsed to their last value by [`MidiState::flush_events`]
//! (called by [`MidiState::advance_time`]) at each block boundary.

use crate::config::{extended_cc, MAX_EVENTS_PER_BLOCK, NUM_CCS, NUM_NOTES};

/// Default tempo in seconds per quarter note (120 BPM).
pub const DEFAULT_SECONDS_PER_QUARTER: f32 = 0.5;

/// One timestamped value change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiEvent {
    /// Sample offset inside the current block
    pub delay: i32,
    /// Value after the change
    pub value: f32,
}

/// Sorted, bounded history of value changes for one dimension.
///
/// Always holds at least one event. Capacity is reserved up front so that
/// inserting never allocates.
#[derive(Debug, Clone)]
pub struct EventVector {
    events: Vec<MidiEvent>,
}

impl EventVector {
    fn new(initial: f32) -> Self {
        let mut events = Vec::with_capacity(MAX_EVENTS_PER_BLOCK);
        events.push(MidiEvent { delay: 0, value: initial });
        Self { events }
    }

    /// Insert a change, replacing any event already at the same delay.
    fn insert(&mut self, delay: i32, value: f32) {
        let position = self.events.partition_point(|e| e.delay < delay);
        if let Some(event) = self.events.get_mut(position) {
            if event.delay == delay {
                event.value = value;
                return;
            }
        }

        if self.events.len() >= MAX_EVENTS_PER_BLOCK {
            // Full: fold the change into its predecessor so the tail stays block-final.
            if let Some(previous) = position.checked_sub(1).and_then(|i| self.events.get_mut(i)) {
                previous.delay = delay;
                previous.value = value;
            }
            return;
        }

        self.events.insert(position, MidiEvent { delay, value });
    }

    fn value_at(&self, delay: i32) -> f32 {
        let position = self.events.partition_point(|e| e.delay <= delay);
        let index = position.saturating_sub(1);
        self.events.get(index).map(|e| e.value).unwrap_or(0.0)
    }

    fn last_value(&self) -> f32 {
        self.events.last().map(|e| e.value).unwrap_or(0.0)
    }

    fn flush(&mut self) {
        let last = self.last_value();
        self.reset(last);
    }

    fn reset(&mut self, value: f32) {
        self.events.clear();
        self.events.push(MidiEvent { delay: 0, value });
    }

    /// Events of the current block, sorted by delay.
    pub fn events(&self) -> &[MidiEvent] {
        &self.events
    }
}

/// MIDI state of one engine instance.
#[derive(Debug, Clone)]
pub struct MidiState {
    sample_rate: f32,
    internal_clock: u64,
    note_on_times: [u64; NUM_NOTES],
    note_off_times: [u64; NUM_NOTES],
    note_velocities: [u8; NUM_NOTES],
    replaced_velocities: [u8; NUM_NOTES],
    note_states: [bool; NUM_NOTES],
    active_notes: u32,
    last_note: Option<u8>,
    last_velocity: u8,
    previous_velocity: u8,
    alternate: f32,
    cc_events: Vec<EventVector>,
    pitch_events: EventVector,
    channel_aftertouch_events: EventVector,
    poly_aftertouch_events: Vec<EventVector>,
    tempo_events: EventVector,
}

impl Default for MidiState {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiState {
    pub fn new() -> Self {
        Self {
            sample_rate: 48_000.0,
            internal_clock: 0,
            note_on_times: [0; NUM_NOTES],
            note_off_times: [0; NUM_NOTES],
            note_velocities: [0; NUM_NOTES],
            replaced_velocities: [0; NUM_NOTES],
            note_states: [false; NUM_NOTES],
            active_notes: 0,
            last_note: None,
            last_velocity: 0,
            previous_velocity: 0,
            alternate: 0.0,
            cc_events: (0..NUM_CCS).map(|_| EventVector::new(0.0)).collect(),
            pitch_events: EventVector::new(0.0),
            channel_aftertouch_events: EventVector::new(0.0),
            poly_aftertouch_events: (0..NUM_NOTES).map(|_| EventVector::new(0.0)).collect(),
            tempo_events: EventVector::new(DEFAULT_SECONDS_PER_QUARTER),
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        if sample_rate > 0.0 {
            self.sample_rate = sample_rate;
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Samples elapsed since the last note-state reset.
    pub fn internal_clock(&self) -> u64 {
        self.internal_clock
    }

    // === Ingestion ===

    /// Register a controller change. Out-of-range controller numbers are ignored.
    pub fn cc_event(&mut self, delay: i32, cc: u16, value: f32) {
        if let Some(events) = self.cc_events.get_mut(cc as usize) {
            events.insert(delay, value);
        }
    }

    /// Register a note-on and update the synthesized controllers.
    ///
    /// A repeated note-on for a held key at the same delay only replaces the
    /// velocity.
    pub fn note_on_event(&mut self, delay: i32, key: u8, velocity: u8) {
        let index = key as usize;
        if index >= NUM_NOTES {
            return;
        }

        let now = self.clock_at(delay);
        let velocity_cc = velocity as f32 / 127.0;
        if self.note_states[index] && self.note_on_times[index] == now {
            self.note_velocities[index] = velocity;
            if self.last_note == Some(key) {
                self.last_velocity = velocity;
            }
            self.cc_event(delay, extended_cc::NOTE_ON_VELOCITY, velocity_cc);
            return;
        }

        self.previous_velocity = self.last_velocity;
        self.last_velocity = velocity;
        self.replaced_velocities[index] = self.note_velocities[index];
        self.note_velocities[index] = velocity;
        self.note_on_times[index] = now;
        if !self.note_states[index] {
            self.note_states[index] = true;
            self.active_notes += 1;
        }

        let key_delta = self
            .last_note
            .map(|last| key as f32 - last as f32)
            .unwrap_or(0.0);
        self.alternate = 1.0 - self.alternate;

        self.cc_event(delay, extended_cc::NOTE_ON_VELOCITY, velocity_cc);
        self.cc_event(delay, extended_cc::KEYBOARD_NOTE_NUMBER, key as f32 / 127.0);
        self.cc_event(delay, extended_cc::KEYBOARD_NOTE_GATE, 1.0);
        self.cc_event(delay, extended_cc::ALTERNATE, self.alternate);
        self.cc_event(delay, extended_cc::KEY_DELTA, key_delta);
        self.cc_event(delay, extended_cc::ABSOLUTE_KEY_DELTA, key_delta.abs());

        self.last_note = Some(key);
    }

    /// Register a note-off and update the synthesized controllers.
    pub fn note_off_event(&mut self, delay: i32, key: u8, velocity: u8) {
        let index = key as usize;
        if index >= NUM_NOTES {
            return;
        }

        self.note_off_times[index] = self.clock_at(delay);
        if self.note_states[index] {
            self.note_states[index] = false;
            self.active_notes = self.active_notes.saturating_sub(1);
        }

        self.cc_event(delay, extended_cc::NOTE_OFF_VELOCITY, velocity as f32 / 127.0);
        let gate = if self.active_notes > 0 { 1.0 } else { 0.0 };
        self.cc_event(delay, extended_cc::KEYBOARD_NOTE_GATE, gate);
    }

    /// Register a pitch bend change, normalized to [-1, 1].
    pub fn pitch_bend_event(&mut self, delay: i32, value: f32) {
        self.pitch_events.insert(delay, value.clamp(-1.0, 1.0));
    }

    /// Register a channel pressure change, normalized to [0, 1].
    pub fn channel_aftertouch_event(&mut self, delay: i32, value: f32) {
        self.channel_aftertouch_events.insert(delay, value.clamp(0.0, 1.0));
    }

    /// Register a polyphonic pressure change, normalized to [0, 1].
    pub fn poly_aftertouch_event(&mut self, delay: i32, key: u8, value: f32) {
        if let Some(events) = self.poly_aftertouch_events.get_mut(key as usize) {
            events.insert(delay, value.clamp(0.0, 1.0));
        }
    }

    /// Register a tempo change expressed in seconds per quarter note.
    pub fn tempo_event(&mut self, delay: i32, seconds_per_quarter: f32) {
        if seconds_per_quarter > 0.0 {
            self.tempo_events.insert(delay, seconds_per_quarter);
        }
    }

    /// Advance the internal clock by a rendered block and collapse histories.
    pub fn advance_time(&mut self, num_samples: usize) {
        self.internal_clock += num_samples as u64;
        self.flush_events();
    }

    /// Collapse each history to its last value at delay 0.
    pub fn flush_events(&mut self) {
        for events in &mut self.cc_events {
            events.flush();
        }
        for events in &mut self.poly_aftertouch_events {
            events.flush();
        }
        self.pitch_events.flush();
        self.channel_aftertouch_events.flush();
        self.tempo_events.flush();
    }

    /// Forget every note: times, velocities, held state and synthesized controllers.
    pub fn reset_note_states(&mut self) {
        self.internal_clock = 0;
        self.note_on_times = [0; NUM_NOTES];
        self.note_off_times = [0; NUM_NOTES];
        self.note_velocities = [0; NUM_NOTES];
        self.replaced_velocities = [0; NUM_NOTES];
        self.note_states = [false; NUM_NOTES];
        self.active_notes = 0;
        self.last_note = None;
        self.last_velocity = 0;
        self.previous_velocity = 0;
        self.alternate = 0.0;
        for cc in extended_cc::ALL {
            if let Some(events) = self.cc_events.get_mut(cc as usize) {
                events.reset(0.0);
            }
        }
    }

    /// Reset every controller, bend, aftertouch and tempo history.
    pub fn reset_event_states(&mut self) {
        for events in &mut self.cc_events {
            events.reset(0.0);
        }
        for events in &mut self.poly_aftertouch_events {
            events.reset(0.0);
        }
        self.pitch_events.reset(0.0);
        self.channel_aftertouch_events.reset(0.0);
        self.tempo_events.reset(DEFAULT_SECONDS_PER_QUARTER);
    }

    /// Set the 128 MIDI controllers, bend and channel pressure back to zero at `delay`.
    pub fn reset_all_controllers(&mut self, delay: i32) {
        for events in self.cc_events.iter_mut().take(NUM_NOTES) {
            events.insert(delay, 0.0);
        }
        self.pitch_events.insert(delay, 0.0);
        self.channel_aftertouch_events.insert(delay, 0.0);
    }

    // === Queries ===

    /// Current (block-final) value of a controller.
    pub fn cc_value(&self, cc: u16) -> f32 {
        self.cc_events
            .get(cc as usize)
            .map(|e| e.last_value())
            .unwrap_or(0.0)
    }

    /// Value of a controller in effect at `delay`.
    pub fn cc_value_at(&self, cc: u16, delay: i32) -> f32 {
        self.cc_events
            .get(cc as usize)
            .map(|e| e.value_at(delay))
            .unwrap_or(0.0)
    }

    /// History of a controller in the current block.
    pub fn cc_events(&self, cc: u16) -> &[MidiEvent] {
        self.cc_events
            .get(cc as usize)
            .map(|e| e.events())
            .unwrap_or(&[])
    }

    /// Velocity of the last note-on for `key` (block-final).
    pub fn note_velocity(&self, key: u8) -> u8 {
        self.note_velocities.get(key as usize).copied().unwrap_or(0)
    }

    /// Velocity of `key` in effect at `delay`: a strike later in the block
    /// is not visible yet.
    pub fn note_velocity_at(&self, key: u8, delay: i32) -> u8 {
        let index = key as usize;
        if index >= NUM_NOTES {
            return 0;
        }
        if self.clock_at(delay) < self.note_on_times[index] {
            self.replaced_velocities[index]
        } else {
            self.note_velocities[index]
        }
    }

    /// Velocity of the note played before the most recent one (`sw_vel=previous`).
    pub fn velocity_override(&self) -> u8 {
        self.previous_velocity
    }

    /// Velocity of the most recent note-on.
    pub fn last_velocity(&self) -> u8 {
        self.last_velocity
    }

    /// Seconds since `key` was struck, measured at `delay` into the current block.
    pub fn note_duration(&self, key: u8, delay: i32) -> f32 {
        let index = key as usize;
        if index >= NUM_NOTES {
            return 0.0;
        }
        let now = self.clock_at(delay);
        let elapsed = now.saturating_sub(self.note_on_times[index]);
        elapsed as f32 / self.sample_rate
    }

    pub fn pitch_bend(&self) -> f32 {
        self.pitch_events.last_value()
    }

    pub fn pitch_bend_at(&self, delay: i32) -> f32 {
        self.pitch_events.value_at(delay)
    }

    pub fn pitch_events(&self) -> &[MidiEvent] {
        self.pitch_events.events()
    }

    pub fn channel_aftertouch(&self) -> f32 {
        self.channel_aftertouch_events.last_value()
    }

    pub fn channel_aftertouch_at(&self, delay: i32) -> f32 {
        self.channel_aftertouch_events.value_at(delay)
    }

    pub fn poly_aftertouch(&self, key: u8) -> f32 {
        self.poly_aftertouch_events
            .get(key as usize)
            .map(|e| e.last_value())
            .unwrap_or(0.0)
    }

    pub fn seconds_per_quarter(&self) -> f32 {
        self.tempo_events.last_value()
    }

    pub fn bpm(&self) -> f32 {
        60.0 / self.seconds_per_quarter()
    }

    /// Number of keys currently held down.
    pub fn active_notes(&self) -> u32 {
        self.active_notes
    }

    pub fn last_note(&self) -> Option<u8> {
        self.last_note
    }

    pub fn is_note_pressed(&self, key: u8) -> bool {
        self.note_states.get(key as usize).copied().unwrap_or(false)
    }

    fn clock_at(&self, delay: i32) -> u64 {
        self.internal_clock + delay.max(0) as u64
    }
}
