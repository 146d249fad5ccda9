//! The sampler engine.
//!
//! [`Sampler`] owns the regions, the fixed voice pool, the MIDI state and the
//! modulation pools. Event methods (`note_on`, `cc`, ...) and
//! [`Sampler::render_block`] are meant for the audio thread and never
//! allocate. Configuration setters and [`Sampler::load_regions`] may
//! allocate and belong on the host or worker thread.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{
    Oversampling, SamplerConfig, ALL_NOTES_OFF_CC, ALL_SOUND_OFF_CC, MAX_BLOCK_SIZE,
    MAX_DELAYED_RELEASES, MAX_VOICES, NUM_CCS, NUM_NOTES, RESET_CC,
};
use crate::midi_state::MidiState;
use crate::modulation::{
    bypass_factory, db_to_mag, BufferPool, EqHolder, FilterHolder, HolderPool, KernelFactory,
};
use crate::region::{DelayedRelease, Range, Region, SelfMask, VelocityOverride};
use crate::voice::{TriggerEvent, TriggerKind, Voice, VoicePools, VoiceState};

/// Master volume range in dB.
pub const VOLUME_RANGE: Range<f32> = Range::new(-60.0, 6.0);

/// Scratch spans per block: voice audio and envelope plus three filter
/// parameter spans, with headroom.
const SPANS_IN_POOL: usize = 8;

pub struct Sampler {
    regions: Vec<Region>,
    voices: Vec<Voice>,
    pools: VoicePools,
    midi_state: MidiState,
    rng: StdRng,
    volume_db: f32,
    oversampling: Oversampling,
    preload_size: u32,
    sample_rate: f32,
    samples_per_block: usize,
    control_interval: usize,
    scratch_releases: Vec<DelayedRelease>,
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("regions", &self.regions.len())
            .field("voices", &self.voices.len())
            .field("active_voices", &self.num_active_voices())
            .field("volume_db", &self.volume_db)
            .field("oversampling", &self.oversampling)
            .finish()
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new(&SamplerConfig::default())
    }
}

impl Sampler {
    /// Create an engine whose filters and EQs leave audio untouched.
    pub fn new(config: &SamplerConfig) -> Self {
        Self::with_kernels(config, bypass_factory())
    }

    /// Create an engine whose filter and EQ pools are filled by `factory`.
    pub fn with_kernels(config: &SamplerConfig, factory: KernelFactory) -> Self {
        let mut config = config.clone();
        config.validate();

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut midi_state = MidiState::new();
        midi_state.set_sample_rate(config.sample_rate);

        let pools = VoicePools {
            filters: HolderPool::new(config.filters_in_pool, || FilterHolder::new(factory())),
            equalizers: HolderPool::new(config.filters_in_pool, || EqHolder::new(factory())),
            spans: BufferPool::new(SPANS_IN_POOL, config.samples_per_block),
        };

        log::debug!(
            "Sampler created: {} voices, {} Hz, {} frames per block",
            config.num_voices,
            config.sample_rate,
            config.samples_per_block
        );

        Self {
            regions: Vec::new(),
            voices: (0..config.num_voices)
                .map(|_| Voice::new(config.sample_rate))
                .collect(),
            pools,
            midi_state,
            rng,
            volume_db: 0.0,
            oversampling: config.oversampling,
            preload_size: config.preload_size,
            sample_rate: config.sample_rate,
            samples_per_block: config.samples_per_block,
            control_interval: config.control_interval,
            scratch_releases: Vec::with_capacity(2 * MAX_DELAYED_RELEASES),
        }
    }

    // === Loading and configuration ===

    /// Replace the instrument. Playing voices are stopped and every region
    /// is synchronized with the current controller state.
    pub fn load_regions(&mut self, regions: Vec<Region>) {
        self.stop_all_voices();
        self.regions = regions;
        for (index, region) in self.regions.iter_mut().enumerate() {
            region.id = index;
            sync_region(region, &self.midi_state);
        }
        log::info!("Loaded {} regions", self.regions.len());
    }

    pub fn set_num_voices(&mut self, num_voices: usize) {
        let num_voices = num_voices.clamp(1, MAX_VOICES);
        if num_voices == self.voices.len() {
            return;
        }
        self.stop_all_voices();
        let sample_rate = self.sample_rate;
        self.voices.resize_with(num_voices, || Voice::new(sample_rate));
        log::info!("Voice pool resized to {}", num_voices);
    }

    pub fn set_oversampling(&mut self, oversampling: Oversampling) {
        if oversampling != self.oversampling {
            self.stop_all_voices();
            self.oversampling = oversampling;
            log::info!("Oversampling set to {}", oversampling);
        }
    }

    pub fn set_preload_size(&mut self, preload_size: u32) {
        let (lo, hi) = SamplerConfig::PRELOAD_SIZE_RANGE;
        self.preload_size = preload_size.clamp(lo, hi);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            log::warn!("Ignoring invalid sample rate {}", sample_rate);
            return;
        }
        self.sample_rate = sample_rate;
        self.midi_state.set_sample_rate(sample_rate);
        for voice in &mut self.voices {
            voice.set_sample_rate(sample_rate);
        }
    }

    pub fn set_samples_per_block(&mut self, samples_per_block: usize) {
        self.samples_per_block = samples_per_block.clamp(1, MAX_BLOCK_SIZE);
        self.pools.spans.set_block_size(self.samples_per_block);
    }

    /// Master volume in dB.
    pub fn set_volume(&mut self, volume_db: f32) {
        self.volume_db = VOLUME_RANGE.clamp(volume_db);
    }

    // === Event ingestion (audio thread) ===

    pub fn note_on(&mut self, delay: i32, key: u8, velocity: u8) {
        if key as usize >= NUM_NOTES {
            return;
        }
        self.midi_state.note_on_event(delay, key, velocity);

        let rand: f32 = self.rng.random();
        for index in 0..self.regions.len() {
            let region = &mut self.regions[index];
            let velocity = match region.velocity_override {
                VelocityOverride::Current => velocity,
                VelocityOverride::Previous => self.midi_state.velocity_override(),
            };
            if region.register_note_on(key, velocity, rand) {
                self.start_voice(index, TriggerEvent::note_on(key, velocity), delay, true);
            }
        }
    }

    /// Note-off. Release triggers use the velocity of the matching note-on.
    pub fn note_off(&mut self, delay: i32, key: u8, velocity: u8) {
        if key as usize >= NUM_NOTES {
            return;
        }
        self.midi_state.note_off_event(delay, key, velocity);

        for voice in &mut self.voices {
            if let Some(region) = voice.region().and_then(|r| self.regions.get(r)) {
                voice.register_note_off(delay, key, region, &self.midi_state);
            }
        }

        let on_velocity = self.midi_state.note_velocity_at(key, delay);
        let rand: f32 = self.rng.random();
        for index in 0..self.regions.len() {
            let region = &mut self.regions[index];
            let velocity = match region.velocity_override {
                VelocityOverride::Current => on_velocity,
                VelocityOverride::Previous => self.midi_state.velocity_override(),
            };
            if region.register_note_off(key, velocity, rand) {
                self.start_voice(index, TriggerEvent::note_off(key, velocity), delay, false);
            }
        }
    }

    /// Controller change with a normalized value.
    pub fn cc(&mut self, delay: i32, cc: u16, value: f32) {
        if cc as usize >= NUM_CCS {
            return;
        }
        let value = value.clamp(0.0, 1.0);

        match cc {
            RESET_CC => {
                self.reset_all_controllers(delay);
                return;
            }
            ALL_SOUND_OFF_CC => self.all_sound_off(),
            ALL_NOTES_OFF_CC => self.all_notes_off(delay),
            _ => {}
        }

        let previous = self.midi_state.cc_value(cc);
        self.midi_state.cc_event(delay, cc, value);

        for voice in &mut self.voices {
            if let Some(region) = voice.region().and_then(|r| self.regions.get(r)) {
                voice.register_cc(delay, cc, previous, value, region, &self.midi_state);
            }
        }

        for index in 0..self.regions.len() {
            if self.regions[index].register_cc(cc, value) {
                self.start_voice(index, TriggerEvent::cc(cc, value), delay, false);
            }
        }

        self.dispatch_pedal_releases(delay);
    }

    /// Pitch bend in [-1, 1].
    pub fn pitch_wheel(&mut self, delay: i32, bend: f32) {
        let bend = bend.clamp(-1.0, 1.0);
        self.midi_state.pitch_bend_event(delay, bend);
        for region in &mut self.regions {
            region.register_pitch_wheel(bend);
        }
    }

    /// Channel pressure in [0, 1].
    pub fn aftertouch(&mut self, delay: i32, value: f32) {
        let value = value.clamp(0.0, 1.0);
        self.midi_state.channel_aftertouch_event(delay, value);
        for region in &mut self.regions {
            region.register_aftertouch(value);
        }
    }

    /// Polyphonic pressure in [0, 1].
    pub fn poly_aftertouch(&mut self, delay: i32, key: u8, value: f32) {
        self.midi_state.poly_aftertouch_event(delay, key, value);
    }

    pub fn tempo(&mut self, delay: i32, seconds_per_quarter: f32) {
        self.midi_state.tempo_event(delay, seconds_per_quarter);
        for region in &mut self.regions {
            region.register_tempo(seconds_per_quarter);
        }
    }

    /// Render every active voice into `left` and `right`, which are
    /// overwritten, then advance the MIDI clock.
    pub fn render_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        left.fill(0.0);
        right.fill(0.0);

        let chunk = self.pools.spans.block_size().max(1);
        let mut start = 0;
        while start < frames {
            let end = (start + chunk).min(frames);
            for voice in &mut self.voices {
                let Some(index) = voice.region() else {
                    continue;
                };
                match self.regions.get(index) {
                    Some(region) => voice.render(
                        region,
                        &self.midi_state,
                        &mut self.pools,
                        self.control_interval,
                        &mut self.rng,
                        &mut left[start..end],
                        &mut right[start..end],
                    ),
                    None => voice.reset(&mut self.pools),
                }
            }
            start = end;
        }

        let gain = db_to_mag(self.volume_db);
        for sample in left[..frames].iter_mut().chain(right[..frames].iter_mut()) {
            *sample *= gain;
        }

        self.midi_state.advance_time(frames);
    }

    // === Views ===

    pub fn num_active_voices(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_free()).count()
    }

    pub fn num_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn voice(&self, index: usize) -> Option<&Voice> {
        self.voices.get(index)
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn region(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn midi_state(&self) -> &MidiState {
        &self.midi_state
    }

    pub fn volume(&self) -> f32 {
        self.volume_db
    }

    pub fn oversampling(&self) -> Oversampling {
        self.oversampling
    }

    pub fn preload_size(&self) -> u32 {
        self.preload_size
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn samples_per_block(&self) -> usize {
        self.samples_per_block
    }

    // === Internals ===

    fn start_voice(&mut self, index: usize, trigger: TriggerEvent, delay: i32, choke_groups: bool) {
        let Some(group) = self.regions.get(index).map(|r| r.group) else {
            return;
        };

        if choke_groups {
            self.choke_group(group, delay);
        }
        if !self.make_room(index, trigger, delay) {
            log::trace!("Region {} masked by a louder voice on the same note", index);
            return;
        }
        let Some(slot) = self.find_free_voice() else {
            log::trace!("No voice available for region {}", index);
            return;
        };

        let Self {
            voices,
            regions,
            midi_state,
            pools,
            rng,
            oversampling,
            ..
        } = self;
        voices[slot].start(
            &regions[index],
            trigger,
            delay,
            midi_state,
            *oversampling,
            pools,
            rng,
        );
    }

    /// Release voices whose region is turned off by `group`, then start the
    /// release regions of their notes.
    fn choke_group(&mut self, group: u32, delay: i32) {
        let mut choked = std::mem::take(&mut self.scratch_releases);
        choked.clear();
        for voice in &mut self.voices {
            let Some(region) = voice.region().and_then(|r| self.regions.get(r)) else {
                continue;
            };
            if voice.check_off_group(delay, group, region) && choked.len() < choked.capacity() {
                let trigger = voice.trigger();
                choked.push((trigger.number.min(127) as u8, trigger.velocity()));
            }
        }

        for &(key, velocity) in &choked {
            for index in 0..self.regions.len() {
                let region = &self.regions[index];
                let releases = region.is_release()
                    && !region.trigger_on_cc
                    && region.is_switched_on()
                    && region.key_range.contains_with_end(key as i32)
                    && region.velocity_range.contains_with_end(velocity);
                if releases {
                    self.start_voice(index, TriggerEvent::note_off(key, velocity), delay, false);
                }
            }
        }
        self.scratch_releases = choked;
    }

    /// Apply `polyphony` and `note_polyphony`. Returns false when the new
    /// voice must not start.
    fn make_room(&mut self, index: usize, trigger: TriggerEvent, delay: i32) -> bool {
        let Some(region) = self.regions.get(index) else {
            return false;
        };
        let (polyphony, note_polyphony, self_mask) =
            (region.polyphony, region.note_polyphony, region.self_mask);

        let playing = |v: &Voice| v.region() == Some(index) && v.state() == VoiceState::Playing;

        if let Some(limit) = polyphony {
            if self.voices.iter().filter(|v| playing(v)).count() >= limit as usize {
                if let Some(oldest) = self
                    .voices
                    .iter_mut()
                    .filter(|v| playing(v))
                    .min_by_key(|v| v.age())
                {
                    oldest.release(delay, true);
                }
            }
        }

        let Some(limit) = note_polyphony else {
            return true;
        };
        if trigger.kind != TriggerKind::NoteOn {
            return true;
        }
        let same_note = |v: &Voice| {
            playing(v) && v.trigger().kind == TriggerKind::NoteOn && v.trigger().number == trigger.number
        };
        if self.voices.iter().filter(|v| same_note(v)).count() < limit as usize {
            return true;
        }

        let velocity = trigger.velocity();
        let victim = self
            .voices
            .iter_mut()
            .filter(|v| same_note(v))
            .filter(|v| self_mask == SelfMask::DontMask || v.velocity() <= velocity)
            .min_by_key(|v| v.age());
        match victim {
            Some(voice) => {
                voice.release(delay, true);
                true
            }
            None => false,
        }
    }

    /// First idle voice, or the oldest released voice, or the oldest voice.
    fn find_free_voice(&mut self) -> Option<usize> {
        if let Some(index) = self.voices.iter().position(Voice::is_free) {
            return Some(index);
        }

        let oldest = |released_only: bool| {
            self.voices
                .iter()
                .enumerate()
                .filter(|(_, v)| !released_only || v.state() == VoiceState::Released)
                .min_by_key(|(_, v)| v.age())
                .map(|(index, _)| index)
        };
        let index = oldest(true).or_else(|| oldest(false))?;
        log::trace!("Stealing voice {}", index);
        self.voices[index].reset(&mut self.pools);
        Some(index)
    }

    fn dispatch_pedal_releases(&mut self, delay: i32) {
        let mut pending = std::mem::take(&mut self.scratch_releases);
        for index in 0..self.regions.len() {
            if !self.regions[index].has_pending_pedal_releases() {
                continue;
            }
            pending.clear();
            self.regions[index].drain_pedal_releases(&mut pending);
            for &(key, velocity) in &pending {
                self.start_voice(index, TriggerEvent::note_off(key, velocity), delay, false);
            }
        }
        pending.clear();
        self.scratch_releases = pending;
    }

    fn reset_all_controllers(&mut self, delay: i32) {
        self.midi_state.reset_all_controllers(delay);

        for voice in &mut self.voices {
            if let Some(region) = voice.region().and_then(|r| self.regions.get(r)) {
                for cc in [region.sostenuto_cc, region.sustain_cc] {
                    let value = self.midi_state.cc_value(cc);
                    voice.register_cc(delay, cc, 1.0, value, region, &self.midi_state);
                }
            }
        }
        for region in &mut self.regions {
            sync_region(region, &self.midi_state);
        }
        self.dispatch_pedal_releases(delay);
    }

    fn all_sound_off(&mut self) {
        for voice in &mut self.voices {
            voice.reset(&mut self.pools);
        }
        for region in &mut self.regions {
            region.reset_note_state();
        }
    }

    fn all_notes_off(&mut self, delay: i32) {
        for voice in &mut self.voices {
            voice.release(delay, false);
        }
        for region in &mut self.regions {
            region.reset_note_state();
        }
    }

    fn stop_all_voices(&mut self) {
        for voice in &mut self.voices {
            voice.reset(&mut self.pools);
        }
    }
}

/// Bring a region's gates and pedal state in line with `state`.
fn sync_region(region: &mut Region, state: &MidiState) {
    for i in 0..region.cc_conditions.len() {
        let cc = region.cc_conditions[i].cc;
        region.register_cc(cc, state.cc_value(cc));
    }
    let (sustain_cc, sostenuto_cc) = (region.sustain_cc, region.sostenuto_cc);
    region.register_cc(sustain_cc, state.cc_value(sustain_cc));
    region.register_cc(sostenuto_cc, state.cc_value(sostenuto_cc));
    region.register_pitch_wheel(state.pitch_bend());
    region.register_aftertouch(state.channel_aftertouch());
    region.register_tempo(state.seconds_per_quarter());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{Header, Opcode, RegionBuilder, Trigger};

    fn config() -> SamplerConfig {
        SamplerConfig {
            num_voices: 8,
            sample_rate: 1000.0,
            samples_per_block: 64,
            seed: Some(42),
            ..Default::default()
        }
    }

    fn build(regions: &[&[(&str, &str)]]) -> Vec<Region> {
        let mut builder = RegionBuilder::new();
        for opcodes in regions {
            let opcodes = opcodes.iter().map(|(n, v)| Opcode::new(*n, *v)).collect();
            builder.header(Header::Region, opcodes);
        }
        builder.build()
    }

    fn sampler(regions: &[&[(&str, &str)]]) -> Sampler {
        let mut sampler = Sampler::new(&config());
        sampler.load_regions(build(regions));
        sampler
    }

    fn render(sampler: &mut Sampler) -> Vec<f32> {
        let mut left = vec![0.0; 64];
        let mut right = vec![0.0; 64];
        sampler.render_block(&mut left, &mut right);
        left
    }

    fn playing(sampler: &Sampler) -> Vec<(usize, TriggerKind, u16)> {
        sampler
            .voices()
            .iter()
            .filter(|v| v.state() == VoiceState::Playing)
            .filter_map(|v| Some((v.region()?, v.trigger().kind, v.trigger().number)))
            .collect()
    }

    #[test]
    fn test_note_on_and_off() {
        let mut sampler = sampler(&[&[("sample", "*sine"), ("lokey", "60"), ("hikey", "72")]]);
        sampler.note_on(0, 59, 100);
        assert_eq!(sampler.num_active_voices(), 0);
        sampler.note_on(0, 64, 100);
        assert_eq!(sampler.num_active_voices(), 1);
        assert!(render(&mut sampler).iter().any(|v| *v != 0.0));

        sampler.note_off(0, 64, 0);
        render(&mut sampler);
        assert_eq!(sampler.num_active_voices(), 0);
    }

    #[test]
    fn test_release_trigger_waits_for_sustain() {
        let mut sampler = sampler(&[
            &[("sample", "*sine")],
            &[("sample", "*silence"), ("trigger", "release")],
        ]);
        sampler.cc(0, 64, 1.0);
        sampler.note_on(0, 60, 90);
        sampler.note_on(0, 62, 80);
        sampler.note_off(10, 62, 0);
        sampler.note_off(12, 60, 0);
        assert_eq!(sampler.region(1).map(|r| r.delayed_releases().len()), Some(2));
        assert!(playing(&sampler).iter().all(|(region, _, _)| *region == 0));

        sampler.cc(20, 64, 0.0);
        let releases: Vec<_> = sampler
            .voices()
            .iter()
            .filter(|v| v.region() == Some(1))
            .map(|v| (v.trigger().number, v.velocity()))
            .collect();
        assert_eq!(releases, vec![(62, 80), (60, 90)]);
        assert_eq!(sampler.region(1).map(|r| r.delayed_releases().len()), Some(0));
    }

    #[test]
    fn test_release_trigger_without_pedal() {
        let mut sampler = sampler(&[&[("sample", "*silence"), ("trigger", "release")]]);
        sampler.note_on(0, 60, 70);
        assert_eq!(sampler.num_active_voices(), 0);
        sampler.note_off(5, 60, 10);
        let voice = sampler.voices().iter().find(|v| !v.is_free());
        assert_eq!(voice.map(|v| (v.trigger().kind, v.velocity())), Some((TriggerKind::NoteOff, 70)));
    }

    #[test]
    fn test_off_by_chokes_and_dispatches_releases() {
        let mut sampler = sampler(&[
            &[("sample", "*sine"), ("key", "42"), ("group", "1"), ("off_by", "2")],
            &[("sample", "*sine"), ("key", "46"), ("group", "2")],
            &[("sample", "*silence"), ("key", "42"), ("trigger", "release")],
        ]);
        sampler.note_on(0, 42, 100);
        render(&mut sampler);
        sampler.note_on(3, 46, 100);

        let states: Vec<_> = sampler
            .voices()
            .iter()
            .filter(|v| !v.is_free())
            .map(|v| (v.region(), v.state()))
            .collect();
        assert!(states.contains(&(Some(0), VoiceState::Released)));
        assert!(states.contains(&(Some(1), VoiceState::Playing)));
        assert!(states.contains(&(Some(2), VoiceState::Playing)));
    }

    #[test]
    fn test_same_block_is_not_choked() {
        let mut sampler = sampler(&[
            &[("sample", "*sine"), ("group", "1"), ("off_by", "1")],
        ]);
        sampler.note_on(0, 60, 100);
        sampler.note_on(0, 62, 100);
        assert_eq!(playing(&sampler).len(), 2);
        sampler.note_on(8, 64, 100);
        assert_eq!(playing(&sampler).len(), 1);
    }

    #[test]
    fn test_region_polyphony_releases_oldest() {
        let mut sampler = sampler(&[&[("sample", "*sine"), ("polyphony", "2")]]);
        sampler.note_on(0, 60, 100);
        sampler.note_on(1, 62, 100);
        sampler.note_on(2, 64, 100);
        let notes: Vec<_> = playing(&sampler).iter().map(|(_, _, n)| *n).collect();
        assert_eq!(notes.len(), 2);
        assert!(!notes.contains(&60));
    }

    #[test]
    fn test_note_selfmask() {
        let mut sampler = sampler(&[&[("sample", "*sine"), ("note_polyphony", "1")]]);
        sampler.note_on(0, 60, 100);
        sampler.note_on(1, 60, 50);
        assert_eq!(sampler.voices().iter().filter(|v| !v.is_free()).count(), 1);
        sampler.note_on(2, 60, 110);
        let velocities: Vec<_> = sampler
            .voices()
            .iter()
            .filter(|v| v.state() == VoiceState::Playing)
            .map(|v| v.velocity())
            .collect();
        assert_eq!(velocities, vec![110]);

        let mut sampler = sampler_with_dontmask();
        sampler.note_on(0, 60, 100);
        sampler.note_on(1, 60, 50);
        let velocities: Vec<_> = sampler
            .voices()
            .iter()
            .filter(|v| v.state() == VoiceState::Playing)
            .map(|v| v.velocity())
            .collect();
        assert_eq!(velocities, vec![50]);
    }

    fn sampler_with_dontmask() -> Sampler {
        sampler(&[&[
            ("sample", "*sine"),
            ("note_polyphony", "1"),
            ("note_selfmask", "off"),
        ]])
    }

    #[test]
    fn test_cc_trigger() {
        let mut sampler = sampler(&[&[("sample", "*sine"), ("hikey", "-1"), ("on_locc1", "64")]]);
        sampler.note_on(0, 60, 100);
        assert_eq!(sampler.num_active_voices(), 0);
        sampler.cc(0, 1, 0.2);
        assert_eq!(sampler.num_active_voices(), 0);
        sampler.cc(4, 1, 0.8);
        assert_eq!(playing(&sampler), vec![(0, TriggerKind::Cc, 1)]);
    }

    #[test]
    fn test_all_sound_and_notes_off() {
        let mut sampler = sampler(&[&[("sample", "*sine"), ("ampeg_release", "1")]]);
        sampler.note_on(0, 60, 100);
        sampler.note_on(0, 62, 100);
        sampler.cc(0, ALL_NOTES_OFF_CC, 0.0);
        assert!(sampler.voices().iter().filter(|v| !v.is_free()).all(|v| v.state() == VoiceState::Released));
        assert_eq!(sampler.region(0).map(|r| r.active_notes_in_range()), Some(0));

        sampler.cc(0, ALL_SOUND_OFF_CC, 0.0);
        assert_eq!(sampler.num_active_voices(), 0);
    }

    #[test]
    fn test_reset_controllers_releases_sustained_notes() {
        let mut sampler = sampler(&[
            &[("sample", "*sine"), ("locc7", "64")],
            &[("sample", "*silence"), ("trigger", "release")],
        ]);
        sampler.cc(0, 7, 1.0);
        sampler.cc(0, 64, 1.0);
        sampler.note_on(0, 60, 100);
        sampler.note_off(1, 60, 0);
        assert_eq!(playing(&sampler), vec![(0, TriggerKind::NoteOn, 60)]);

        sampler.cc(2, RESET_CC, 0.0);
        assert_eq!(sampler.midi_state().cc_value(64), 0.0);
        assert!(!sampler.region(0).is_some_and(|r| r.is_switched_on()));
        assert_eq!(playing(&sampler), vec![(1, TriggerKind::NoteOff, 60)]);
    }

    #[test]
    fn test_load_syncs_controller_state() {
        let mut sampler = Sampler::new(&config());
        sampler.cc(0, 20, 1.0);
        sampler.pitch_wheel(0, 0.5);
        sampler.load_regions(build(&[
            &[("sample", "*sine"), ("locc20", "100"), ("hicc20", "127")],
            &[("sample", "*sine"), ("lobend", "-100"), ("hibend", "100")],
        ]));
        assert!(sampler.region(0).is_some_and(|r| r.is_switched_on()));
        assert!(!sampler.region(1).is_some_and(|r| r.is_switched_on()));
        assert_eq!(sampler.region(1).map(|r| r.id), Some(1));
    }

    #[test]
    fn test_voice_stealing() {
        let mut config = config();
        config.num_voices = 2;
        let mut sampler = Sampler::new(&config);
        sampler.load_regions(build(&[&[("sample", "*sine"), ("ampeg_release", "5")]]));
        sampler.note_on(0, 60, 100);
        sampler.note_on(1, 62, 100);
        sampler.note_off(2, 62, 0);
        sampler.note_on(3, 64, 100);

        let notes: Vec<_> = sampler.voices().iter().map(|v| v.trigger().number).collect();
        assert_eq!(sampler.num_active_voices(), 2);
        assert!(notes.contains(&60));
        assert!(notes.contains(&64));
    }

    #[test]
    fn test_round_robin_across_regions() {
        let mut sampler = sampler(&[
            &[("sample", "*sine"), ("seq_length", "2"), ("seq_position", "1")],
            &[("sample", "*noise"), ("seq_length", "2"), ("seq_position", "2")],
        ]);
        let mut order = Vec::new();
        for _ in 0..4 {
            sampler.note_on(0, 60, 100);
            order.extend(playing(&sampler).iter().map(|(region, _, _)| *region));
            sampler.cc(0, ALL_SOUND_OFF_CC, 0.0);
        }
        assert_eq!(order, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_previous_velocity_override() {
        let mut sampler = sampler(&[&[("sample", "*sine"), ("sw_vel", "previous"), ("lovel", "100")]]);
        sampler.note_on(0, 60, 120);
        assert_eq!(sampler.num_active_voices(), 0);
        sampler.note_on(0, 62, 10);
        assert_eq!(sampler.voices().iter().find(|v| !v.is_free()).map(|v| v.velocity()), Some(120));
    }

    #[test]
    fn test_master_volume() {
        let mut loud = sampler(&[&[("sample", "*sine")]]);
        let mut quiet = sampler(&[&[("sample", "*sine")]]);
        quiet.set_volume(-100.0);
        assert_eq!(quiet.volume(), -60.0);
        loud.note_on(0, 69, 127);
        quiet.note_on(0, 69, 127);
        let loud = render(&mut loud);
        let quiet = render(&mut quiet);
        for (l, q) in loud.iter().zip(&quiet) {
            approx::assert_relative_eq!(*q, *l * db_to_mag(-60.0), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_setters_clamp() {
        let mut sampler = sampler(&[&[("sample", "*sine")]]);
        sampler.note_on(0, 60, 100);
        sampler.set_num_voices(1000);
        assert_eq!(sampler.num_voices(), MAX_VOICES);
        assert_eq!(sampler.num_active_voices(), 0);
        sampler.set_preload_size(10);
        assert_eq!(sampler.preload_size(), 1024);
        sampler.set_samples_per_block(100_000);
        assert_eq!(sampler.samples_per_block(), MAX_BLOCK_SIZE);
        sampler.set_oversampling(Oversampling::X4);
        assert_eq!(sampler.oversampling(), Oversampling::X4);
        sampler.set_sample_rate(-1.0);
        assert_eq!(sampler.sample_rate(), 1000.0);
    }

    #[test]
    fn test_first_and_legato_triggers() {
        let mut sampler = sampler(&[
            &[("sample", "*sine"), ("trigger", "first")],
            &[("sample", "*noise"), ("trigger", "legato")],
        ]);
        assert_eq!(sampler.region(0).map(|r| r.trigger), Some(Trigger::First));
        sampler.note_on(0, 60, 100);
        sampler.note_on(1, 62, 100);
        let regions: Vec<_> = playing(&sampler).iter().map(|(r, _, n)| (*r, *n)).collect();
        assert!(regions.contains(&(0, 60)));
        assert!(regions.contains(&(1, 62)));
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn test_seeded_runs_are_deterministic() {
        let run = || {
            let mut sampler = sampler(&[&[("sample", "*noise")]]);
            sampler.note_on(0, 60, 100);
            render(&mut sampler)
        };
        assert_eq!(run(), run());
    }
}
