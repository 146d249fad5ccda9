//! Voices.
//!
//! A [`Voice`] is one sounding instance of a region. Voices live in a fixed
//! pool owned by the sampler and never allocate once constructed: filter and
//! EQ state is borrowed from [`VoicePools`] by index, and scratch audio comes
//! from the shared span pool.
//!
//! Only the built-in generators (`*sine`, `*noise`, `*silence`) produce
//! audio. Voices of sample-file regions run their envelopes and modulation
//! and report their state, but their audio comes from an external reader.

use std::f32::consts::{FRAC_PI_4, TAU};

use rand::Rng;

use crate::config::{
    Oversampling, FAST_RELEASE_SECONDS, MAX_EQS_PER_REGION, MAX_FILTERS_PER_REGION,
};
use crate::midi_state::MidiState;
use crate::modulation::{
    cc_sum, cents_factor, db_to_mag, AdsrEnvelope, BufferPool, EnvelopeStage, EqHolder,
    FilterHolder, HolderPool,
};
use crate::region::{LoopMode, OffMode, Range, Region};

const VOLUME_RANGE: Range<f32> = Range::new(-144.0, 48.0);

/// What started a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    NoteOn,
    NoteOff,
    Cc,
}

/// The event that started a voice: a note number or controller, and its
/// normalized velocity or controller value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerEvent {
    pub kind: TriggerKind,
    pub number: u16,
    pub value: f32,
}

impl TriggerEvent {
    pub fn note_on(key: u8, velocity: u8) -> Self {
        Self {
            kind: TriggerKind::NoteOn,
            number: key as u16,
            value: velocity as f32 / 127.0,
        }
    }

    pub fn note_off(key: u8, velocity: u8) -> Self {
        Self {
            kind: TriggerKind::NoteOff,
            number: key as u16,
            value: velocity as f32 / 127.0,
        }
    }

    pub fn cc(cc: u16, value: f32) -> Self {
        Self {
            kind: TriggerKind::Cc,
            number: cc,
            value,
        }
    }

    /// Value as a MIDI velocity.
    pub fn velocity(&self) -> u8 {
        (self.value.clamp(0.0, 1.0) * 127.0).round() as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Playing,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Sine,
    Noise,
    Silence,
    Sample,
}

impl Source {
    fn of(region: &Region) -> Self {
        match region.sample.as_str() {
            "*sine" => Source::Sine,
            "*noise" => Source::Noise,
            s if s.starts_with('*') => Source::Silence,
            _ => Source::Sample,
        }
    }
}

/// Filter, EQ and scratch span pools shared by all voices.
pub struct VoicePools {
    pub filters: HolderPool<FilterHolder>,
    pub equalizers: HolderPool<EqHolder>,
    pub spans: BufferPool,
}

/// One voice of the fixed pool.
#[derive(Debug, Clone)]
pub struct Voice {
    state: VoiceState,
    region: Option<usize>,
    trigger: TriggerEvent,
    velocity: u8,
    age: u64,
    trigger_delay: Option<i32>,
    sample_rate: f32,
    source: Source,

    amplitude_eg: AdsrEnvelope,
    pitch_eg: AdsrEnvelope,
    filter_eg: AdsrEnvelope,
    pitch_depth: Option<f32>,
    filter_depth: Option<f32>,
    filters: [Option<usize>; MAX_FILTERS_PER_REGION],
    equalizers: [Option<usize>; MAX_EQS_PER_REGION],

    note_gain: f32,
    /// Volume in dB without the CC contribution
    volume_db: f32,
    pitch_ratio: f32,
    frequency: f32,
    phase: f32,
    start_delay: usize,
    source_position: f64,
    sample_end: Option<f64>,

    note_is_off: bool,
    sostenuto_held: bool,
}

impl Voice {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            state: VoiceState::Idle,
            region: None,
            trigger: TriggerEvent::note_on(0, 0),
            velocity: 0,
            age: 0,
            trigger_delay: None,
            sample_rate,
            source: Source::Silence,
            amplitude_eg: AdsrEnvelope::new(sample_rate),
            pitch_eg: AdsrEnvelope::new(sample_rate),
            filter_eg: AdsrEnvelope::new(sample_rate),
            pitch_depth: None,
            filter_depth: None,
            filters: [None; MAX_FILTERS_PER_REGION],
            equalizers: [None; MAX_EQS_PER_REGION],
            note_gain: 1.0,
            volume_db: 0.0,
            pitch_ratio: 1.0,
            frequency: 0.0,
            phase: 0.0,
            start_delay: 0,
            source_position: 0.0,
            sample_end: None,
            note_is_off: false,
            sostenuto_held: false,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        if sample_rate <= 0.0 {
            return;
        }
        self.sample_rate = sample_rate;
        self.amplitude_eg.set_sample_rate(sample_rate);
        self.pitch_eg.set_sample_rate(sample_rate);
        self.filter_eg.set_sample_rate(sample_rate);
    }

    /// Start playing `region` at `delay` frames into the current block.
    #[allow(clippy::too_many_arguments)]
    pub fn start<R: Rng>(
        &mut self,
        region: &Region,
        trigger: TriggerEvent,
        delay: i32,
        state: &MidiState,
        oversampling: Oversampling,
        pools: &mut VoicePools,
        rng: &mut R,
    ) {
        self.reset(pools);

        let delay = delay.max(0);
        let (key, velocity) = match trigger.kind {
            TriggerKind::Cc => (region.pitch_keycenter, trigger.velocity()),
            _ => (trigger.number.min(127) as u8, trigger.velocity()),
        };

        self.trigger = trigger;
        self.velocity = velocity;
        self.region = Some(region.id);
        self.age = state.internal_clock() + delay as u64;
        self.trigger_delay = Some(delay);
        self.source = Source::of(region);

        self.pitch_ratio = region.base_pitch_variation(key, velocity, rng);
        self.volume_db =
            region.base_volume_db(state, key, delay, rng) - cc_sum(state, &region.volume_cc);
        self.note_gain = match trigger.kind {
            TriggerKind::Cc => 1.0,
            _ => region.note_gain(key, velocity),
        };
        self.frequency = midi_note_frequency(region.pitch_keycenter);
        self.phase = 0.0;

        let delay_frames = (region.delay_seconds(state, delay, rng) * self.sample_rate) as usize;
        self.start_delay = delay as usize + delay_frames;
        self.source_position = region.sample_offset(state, delay, oversampling, rng) as f64;
        let looping = matches!(
            region.loop_mode,
            Some(LoopMode::LoopContinuous | LoopMode::LoopSustain)
        );
        self.sample_end = (self.source == Source::Sample && !looping && region.sample_end < u32::MAX)
            .then(|| region.true_sample_end(oversampling) as f64);

        self.amplitude_eg
            .reset(&region.amplitude_eg, state, velocity, self.start_delay);
        self.pitch_depth = region.pitch_eg.as_ref().map(|eg| {
            self.pitch_eg.reset(eg, state, velocity, self.start_delay);
            eg.get_depth(velocity)
        });
        self.filter_depth = region.filter_eg.as_ref().map(|eg| {
            self.filter_eg.reset(eg, state, velocity, self.start_delay);
            eg.get_depth(velocity)
        });

        for (slot, description) in self.filters.iter_mut().zip(&region.filters) {
            *slot = pools.filters.acquire();
            match slot.and_then(|index| pools.filters.get_mut(index)) {
                Some(holder) => holder.setup(description, key, velocity, rng),
                None => log::trace!("Filter pool exhausted, region {} unfiltered", region.id),
            }
        }
        for (slot, description) in self.equalizers.iter_mut().zip(&region.equalizers) {
            *slot = pools.equalizers.acquire();
            match slot.and_then(|index| pools.equalizers.get_mut(index)) {
                Some(holder) => holder.setup(description, velocity),
                None => log::trace!("EQ pool exhausted, region {} unequalized", region.id),
            }
        }

        self.note_is_off = trigger.kind != TriggerKind::NoteOn;
        self.sostenuto_held = false;
        self.state = VoiceState::Playing;
    }

    /// Enter the release stage `delay` frames into the block.
    ///
    /// A voice still waiting for its start delay ends immediately.
    pub fn release(&mut self, delay: i32, fast: bool) {
        if self.state != VoiceState::Playing {
            return;
        }
        if fast {
            self.amplitude_eg.set_release_time(FAST_RELEASE_SECONDS);
        }
        let delay = delay.max(0) as usize;
        self.amplitude_eg.start_release(delay);
        self.pitch_eg.start_release(delay);
        self.filter_eg.start_release(delay);
        self.state = VoiceState::Released;
    }

    /// Note-off for the voice's key. Pedals and one-shot regions keep the
    /// voice sounding.
    pub fn register_note_off(&mut self, delay: i32, key: u8, region: &Region, state: &MidiState) {
        if self.state != VoiceState::Playing
            || self.trigger.kind == TriggerKind::Cc
            || self.trigger.number != key as u16
        {
            return;
        }

        self.note_is_off = true;
        if region.is_one_shot() || self.sostenuto_held || sustain_held(region, state) {
            return;
        }
        self.release(delay, false);
    }

    /// Pedal transitions. `previous` and `value` are the controller values
    /// before and after the event.
    pub fn register_cc(
        &mut self,
        delay: i32,
        cc: u16,
        previous: f32,
        value: f32,
        region: &Region,
        state: &MidiState,
    ) {
        if self.state != VoiceState::Playing {
            return;
        }

        if region.check_sostenuto && cc == region.sostenuto_cc {
            let was_down = previous >= region.sostenuto_threshold;
            let is_down = value >= region.sostenuto_threshold;
            if !was_down && is_down && !self.note_is_off {
                self.sostenuto_held = true;
            } else if was_down && !is_down && self.sostenuto_held {
                self.sostenuto_held = false;
                if self.note_is_off && !sustain_held(region, state) && !region.is_one_shot() {
                    self.release(delay, false);
                }
            }
        }

        if region.check_sustain
            && cc == region.sustain_cc
            && value < region.sustain_threshold
            && self.note_is_off
            && !self.sostenuto_held
            && !region.is_one_shot()
        {
            self.release(delay, false);
        }
    }

    /// Release the voice if its region is choked by `group`. Returns true if
    /// it was released.
    pub fn check_off_group(&mut self, delay: i32, group: u32, region: &Region) -> bool {
        if self.state != VoiceState::Playing || self.trigger_delay == Some(delay) {
            return false;
        }
        if self.trigger.kind == TriggerKind::NoteOn && region.off_by == Some(group) {
            self.release(delay, region.off_mode == OffMode::Fast);
            return true;
        }
        false
    }

    /// Render one block and add it to `left` and `right`.
    #[allow(clippy::too_many_arguments)]
    pub fn render<R: Rng>(
        &mut self,
        region: &Region,
        state: &MidiState,
        pools: &mut VoicePools,
        control_interval: usize,
        rng: &mut R,
        left: &mut [f32],
        right: &mut [f32],
    ) {
        let len = left.len().min(right.len());
        if self.state == VoiceState::Idle || len == 0 {
            return;
        }

        let VoicePools {
            filters,
            equalizers,
            spans,
        } = pools;
        let Some(mut audio) = spans.take(len) else {
            log::trace!("No span available, voice skipped for this block");
            return;
        };
        let Some(mut envelope) = spans.take(len) else {
            spans.give(audio);
            return;
        };

        let pitch_cents = match self.pitch_depth {
            Some(depth) => {
                self.pitch_eg.get_block(&mut envelope[..len]);
                depth * envelope[len - 1]
            }
            None => 0.0,
        };
        let ratio = self.pitch_ratio * cents_factor(region.bend_in_cents(state.pitch_bend()) + pitch_cents);

        let start = self.start_delay.min(len);
        self.start_delay -= start;
        match self.source {
            Source::Sine => {
                let step = TAU * self.frequency * ratio / self.sample_rate;
                for sample in &mut audio[start..len] {
                    *sample = self.phase.sin();
                    self.phase += step;
                }
                self.phase = self.phase.rem_euclid(TAU);
            }
            Source::Noise => {
                for sample in &mut audio[start..len] {
                    *sample = rng.random_range(-1.0f32..1.0);
                }
            }
            Source::Silence => {}
            Source::Sample => {
                self.source_position += (len - start) as f64 * ratio as f64;
            }
        }

        if let Some(depth) = self.filter_depth {
            self.filter_eg.get_block(&mut envelope[..len]);
            let cents = depth * envelope[len - 1];
            for index in self.filters.iter().flatten() {
                if let Some(holder) = filters.get_mut(*index) {
                    holder.set_envelope_cents(cents);
                }
            }
        }
        for (description, slot) in region.filters.iter().zip(&self.filters) {
            if let Some(holder) = slot.and_then(|index| filters.get_mut(index)) {
                holder.process(description, state, &mut audio[..len], control_interval, spans);
            }
        }
        for (description, slot) in region.equalizers.iter().zip(&self.equalizers) {
            if let Some(holder) = slot.and_then(|index| equalizers.get_mut(index)) {
                holder.process(description, state, &mut audio[..len], control_interval, spans);
            }
        }

        self.amplitude_eg.get_block(&mut envelope[..len]);
        let gain = self.gain(region, state);
        let angle = (region.pan_value(state) + 1.0) * FRAC_PI_4;
        let (left_gain, right_gain) = (gain * angle.cos(), gain * angle.sin());
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).take(len).enumerate() {
            let sample = audio[i] * envelope[i];
            *l += sample * left_gain;
            *r += sample * right_gain;
        }

        spans.give(audio);
        spans.give(envelope);
        self.trigger_delay = None;

        if self.amplitude_eg.is_finished() {
            self.free_holders(filters, equalizers);
            self.clear();
        } else if self
            .sample_end
            .is_some_and(|end| self.source_position >= end)
        {
            self.release(0, false);
        }
    }

    /// Stop immediately and give back pooled state.
    pub fn reset(&mut self, pools: &mut VoicePools) {
        self.free_holders(&mut pools.filters, &mut pools.equalizers);
        self.clear();
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_free(&self) -> bool {
        self.state == VoiceState::Idle
    }

    /// Index of the region being played.
    pub fn region(&self) -> Option<usize> {
        self.region
    }

    pub fn trigger(&self) -> TriggerEvent {
        self.trigger
    }

    /// Velocity used to start the voice.
    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    /// Engine clock at which the voice started.
    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn envelope_stage(&self) -> EnvelopeStage {
        self.amplitude_eg.stage()
    }

    pub fn envelope_level(&self) -> f32 {
        self.amplitude_eg.level()
    }

    /// Whether the key that started the voice is still down.
    pub fn is_note_held(&self) -> bool {
        self.trigger.kind == TriggerKind::NoteOn && !self.note_is_off
    }

    pub fn is_sostenuto_held(&self) -> bool {
        self.sostenuto_held
    }

    /// Pool indices of the voice's filter holders.
    pub fn filter_holders(&self) -> impl Iterator<Item = usize> + '_ {
        self.filters.iter().flatten().copied()
    }

    pub fn eq_holders(&self) -> impl Iterator<Item = usize> + '_ {
        self.equalizers.iter().flatten().copied()
    }

    fn gain(&self, region: &Region, state: &MidiState) -> f32 {
        let volume = VOLUME_RANGE.clamp(self.volume_db + cc_sum(state, &region.volume_cc));
        self.note_gain * db_to_mag(volume) * region.base_gain(state) * region.crossfade_gain(state)
    }

    fn free_holders(
        &mut self,
        filters: &mut HolderPool<FilterHolder>,
        equalizers: &mut HolderPool<EqHolder>,
    ) {
        for slot in &mut self.filters {
            if let Some(index) = slot.take() {
                filters.release(index);
            }
        }
        for slot in &mut self.equalizers {
            if let Some(index) = slot.take() {
                equalizers.release(index);
            }
        }
    }

    fn clear(&mut self) {
        self.state = VoiceState::Idle;
        self.region = None;
        self.trigger_delay = None;
        self.pitch_depth = None;
        self.filter_depth = None;
        self.note_is_off = false;
        self.sostenuto_held = false;
        self.source_position = 0.0;
        self.sample_end = None;
    }
}

fn sustain_held(region: &Region, state: &MidiState) -> bool {
    region.check_sustain && state.cc_value(region.sustain_cc) >= region.sustain_threshold
}

fn midi_note_frequency(key: u8) -> f32 {
    440.0 * 2f32.powf((key as f32 - 69.0) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulation::{BypassKernel, EGDescription, EqDescription, FilterDescription};
    use crate::region::Opcode;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SAMPLE_RATE: f32 = 1000.0;

    fn pools() -> VoicePools {
        VoicePools {
            filters: HolderPool::new(4, || FilterHolder::new(Box::new(BypassKernel))),
            equalizers: HolderPool::new(4, || EqHolder::new(Box::new(BypassKernel))),
            spans: BufferPool::new(8, 64),
        }
    }

    fn region(opcodes: &[(&str, &str)]) -> Region {
        let mut region = Region::new(0);
        for (name, value) in opcodes {
            assert!(region.parse_opcode(&Opcode::new(*name, *value)), "{}", name);
        }
        region
    }

    fn state() -> MidiState {
        let mut state = MidiState::new();
        state.set_sample_rate(SAMPLE_RATE);
        state
    }

    struct Fixture {
        voice: Voice,
        pools: VoicePools,
        rng: StdRng,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                voice: Voice::new(SAMPLE_RATE),
                pools: pools(),
                rng: StdRng::seed_from_u64(7),
            }
        }

        fn start(&mut self, region: &Region, trigger: TriggerEvent, state: &MidiState) {
            self.voice.start(
                region,
                trigger,
                0,
                state,
                Oversampling::X1,
                &mut self.pools,
                &mut self.rng,
            );
        }

        fn render(&mut self, region: &Region, state: &MidiState, len: usize) -> (Vec<f32>, Vec<f32>) {
            let mut left = vec![0.0; len];
            let mut right = vec![0.0; len];
            self.voice.render(
                region,
                state,
                &mut self.pools,
                16,
                &mut self.rng,
                &mut left,
                &mut right,
            );
            (left, right)
        }
    }

    #[test]
    fn test_sine_voice_renders_centered() {
        let region = region(&[("sample", "*sine"), ("amp_veltrack", "0")]);
        let state = state();
        let mut f = Fixture::new();
        f.start(&region, TriggerEvent::note_on(60, 100), &state);
        assert_eq!(f.voice.state(), VoiceState::Playing);

        let (left, right) = f.render(&region, &state, 64);
        assert!(left.iter().any(|v| v.abs() > 0.1));
        for (l, r) in left.iter().zip(&right) {
            assert_relative_eq!(*l, *r, epsilon = 1e-6);
        }
        // Phase 0 at the first frame, then sin(step) scaled by the center pan law
        let step = TAU * midi_note_frequency(60) / SAMPLE_RATE;
        assert_relative_eq!(left[0], 0.0);
        assert_relative_eq!(left[1], step.sin() * FRAC_PI_4.cos(), epsilon = 1e-5);
    }

    #[test]
    fn test_generators_and_samples() {
        let state = state();
        for (sample, audible) in [("*noise", true), ("*silence", false), ("piano/c4.wav", false)] {
            let region = region(&[("sample", sample)]);
            let mut f = Fixture::new();
            f.start(&region, TriggerEvent::note_on(60, 127), &state);
            let (left, _) = f.render(&region, &state, 32);
            assert_eq!(left.iter().any(|v| *v != 0.0), audible, "{}", sample);
            assert_eq!(f.voice.state(), VoiceState::Playing);
        }
    }

    #[test]
    fn test_note_off_releases_and_frees() {
        let region = region(&[("sample", "*sine"), ("ampeg_release", "0.01")]);
        let state = state();
        let mut f = Fixture::new();
        f.start(&region, TriggerEvent::note_on(60, 100), &state);

        f.voice.register_note_off(0, 61, &region, &state);
        assert_eq!(f.voice.state(), VoiceState::Playing);
        f.voice.register_note_off(4, 60, &region, &state);
        assert_eq!(f.voice.state(), VoiceState::Released);

        f.render(&region, &state, 64);
        assert!(f.voice.is_free());
        assert_eq!(f.voice.region(), None);
    }

    #[test]
    fn test_sustain_pedal_holds_voice() {
        let region = region(&[("sample", "*sine")]);
        let mut state = state();
        let mut f = Fixture::new();
        f.start(&region, TriggerEvent::note_on(60, 100), &state);

        state.cc_event(0, 64, 1.0);
        f.voice.register_cc(0, 64, 0.0, 1.0, &region, &state);
        f.voice.register_note_off(0, 60, &region, &state);
        assert_eq!(f.voice.state(), VoiceState::Playing);
        assert!(!f.voice.is_note_held());

        state.cc_event(10, 64, 0.0);
        f.voice.register_cc(10, 64, 1.0, 0.0, &region, &state);
        assert_eq!(f.voice.state(), VoiceState::Released);
    }

    #[test]
    fn test_sostenuto_captures_held_notes_only() {
        let region = region(&[("sample", "*sine")]);
        let mut state = state();
        let mut held = Fixture::new();
        let mut late = Fixture::new();
        held.start(&region, TriggerEvent::note_on(60, 100), &state);

        state.cc_event(0, 66, 1.0);
        held.voice.register_cc(0, 66, 0.0, 1.0, &region, &state);
        late.start(&region, TriggerEvent::note_on(62, 100), &state);
        late.voice.register_cc(0, 66, 1.0, 1.0, &region, &state);
        assert!(held.voice.is_sostenuto_held());
        assert!(!late.voice.is_sostenuto_held());

        held.voice.register_note_off(1, 60, &region, &state);
        late.voice.register_note_off(1, 62, &region, &state);
        assert_eq!(held.voice.state(), VoiceState::Playing);
        assert_eq!(late.voice.state(), VoiceState::Released);

        state.cc_event(2, 66, 0.0);
        held.voice.register_cc(2, 66, 1.0, 0.0, &region, &state);
        assert_eq!(held.voice.state(), VoiceState::Released);
    }

    #[test]
    fn test_one_shot_ignores_note_off() {
        let region = region(&[("sample", "*sine"), ("loop_mode", "one_shot")]);
        let state = state();
        let mut f = Fixture::new();
        f.start(&region, TriggerEvent::note_on(60, 100), &state);
        f.voice.register_note_off(0, 60, &region, &state);
        assert_eq!(f.voice.state(), VoiceState::Playing);
    }

    #[test]
    fn test_off_group() {
        let region = region(&[("sample", "*sine"), ("group", "1"), ("off_by", "2")]);
        let state = state();
        let mut f = Fixture::new();
        f.start(&region, TriggerEvent::note_on(60, 100), &state);

        assert!(!f.voice.check_off_group(0, 2, &region));
        assert!(!f.voice.check_off_group(5, 3, &region));
        assert!(f.voice.check_off_group(5, 2, &region));
        assert_eq!(f.voice.state(), VoiceState::Released);
        assert!(!f.voice.check_off_group(6, 2, &region));
    }

    #[test]
    fn test_holders_are_borrowed_and_returned() {
        let mut region = region(&[("sample", "*sine")]);
        region.filters.push(FilterDescription::default());
        region.filters.push(FilterDescription::default());
        region.equalizers.push(EqDescription::for_band(0));
        let state = state();
        let mut f = Fixture::new();
        f.start(&region, TriggerEvent::note_on(60, 100), &state);
        assert_eq!(f.pools.filters.available(), 2);
        assert_eq!(f.pools.equalizers.available(), 3);
        assert_eq!(f.voice.filter_holders().count(), 2);

        f.render(&region, &state, 32);
        assert_eq!(f.pools.spans.available(), 8);

        f.voice.reset(&mut f.pools);
        assert_eq!(f.pools.filters.available(), 4);
        assert_eq!(f.pools.equalizers.available(), 4);
    }

    #[test]
    fn test_start_delay_and_release_during_delay() {
        let region = region(&[("sample", "*sine"), ("delay", "0.05")]);
        let state = state();
        let mut f = Fixture::new();
        f.start(&region, TriggerEvent::note_on(69, 127), &state);
        let (left, _) = f.render(&region, &state, 32);
        assert!(left.iter().all(|v| *v == 0.0));
        assert_eq!(f.voice.envelope_stage(), EnvelopeStage::Delay);

        f.voice.release(0, false);
        f.render(&region, &state, 32);
        assert!(f.voice.is_free());
    }

    #[test]
    fn test_sample_end_releases() {
        let region = region(&[("sample", "kick.wav"), ("end", "40")]);
        let state = state();
        let mut f = Fixture::new();
        f.start(&region, TriggerEvent::note_on(60, 127), &state);
        f.render(&region, &state, 32);
        assert_eq!(f.voice.state(), VoiceState::Playing);
        f.render(&region, &state, 32);
        assert_eq!(f.voice.state(), VoiceState::Released);
    }

    #[test]
    fn test_cc_trigger_ignores_note_gain() {
        let region = region(&[("sample", "*sine"), ("hikey", "-1"), ("on_locc1", "0")]);
        let state = state();
        let mut f = Fixture::new();
        f.start(&region, TriggerEvent::cc(1, 0.0), &state);
        assert_relative_eq!(f.voice.note_gain, 1.0);
        assert!(!f.voice.is_note_held());
        f.voice.register_note_off(0, 1, &region, &state);
        assert_eq!(f.voice.state(), VoiceState::Playing);
    }

    #[test]
    fn test_pitch_envelope_depth() {
        let mut region = region(&[("sample", "*sine"), ("pitcheg_depth", "1200")]);
        region.pitch_eg.get_or_insert_with(EGDescription::default);
        let state = state();
        let mut f = Fixture::new();
        f.start(&region, TriggerEvent::note_on(60, 127), &state);
        assert_eq!(f.voice.pitch_depth, Some(1200.0));
    }

    #[test]
    fn test_trigger_velocity() {
        assert_eq!(TriggerEvent::note_on(60, 100).velocity(), 100);
        assert_eq!(TriggerEvent::cc(1, 0.5).velocity(), 64);
    }
}
