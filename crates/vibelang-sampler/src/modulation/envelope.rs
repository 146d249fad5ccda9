//! Per-voice ADSR envelope generator.
//!
//! The attack ramps linearly from the start level to 1. Decay and release
//! are exponential and reach their target after roughly the stage duration.
//! A release may be scheduled at any frame of the next rendered block.

use super::eg::EGDescription;
use crate::config::VIRTUALLY_ZERO;
use crate::midi_state::MidiState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
    Done,
}

#[derive(Debug, Clone)]
pub struct AdsrEnvelope {
    sample_rate: f32,
    stage: EnvelopeStage,
    level: f32,
    delay: usize,
    attack: usize,
    attack_step: f32,
    hold: usize,
    decay_rate: f32,
    sustain: f32,
    release_rate: f32,
    release_at: Option<usize>,
}

impl Default for AdsrEnvelope {
    fn default() -> Self {
        Self::new(48_000.0)
    }
}

impl AdsrEnvelope {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            stage: EnvelopeStage::Done,
            level: 0.0,
            delay: 0,
            attack: 0,
            attack_step: 0.0,
            hold: 0,
            decay_rate: 0.0,
            sustain: 1.0,
            release_rate: 0.0,
            release_at: None,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        if sample_rate > 0.0 {
            self.sample_rate = sample_rate;
        }
    }

    /// Arm the envelope for a new note starting `delay` frames into the block.
    pub fn reset(&mut self, description: &EGDescription, state: &MidiState, velocity: u8, delay: usize) {
        let start = description.get_start(state) / 100.0;
        self.sustain = description.get_sustain(state, velocity) / 100.0;
        self.delay = delay + self.frames(description.get_delay(state, velocity));
        self.attack = self.frames(description.get_attack(state, velocity));
        self.attack_step = if self.attack > 0 {
            (1.0 - start) / self.attack as f32
        } else {
            0.0
        };
        self.hold = self.frames(description.get_hold(state, velocity));
        self.decay_rate = self.rate(description.get_decay(state, velocity));
        self.release_rate = self.rate(description.get_release(state, velocity));
        self.level = start;
        self.release_at = None;
        self.stage = EnvelopeStage::Delay;
    }

    /// Override the release duration, e.g. for fast releases.
    pub fn set_release_time(&mut self, seconds: f32) {
        self.release_rate = self.rate(seconds);
    }

    /// Enter the release stage `delay` frames into the next rendered block.
    pub fn start_release(&mut self, delay: usize) {
        if !self.is_released() {
            self.release_at = Some(delay);
        }
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// True once a release has been requested or has started.
    pub fn is_released(&self) -> bool {
        self.release_at.is_some() || matches!(self.stage, EnvelopeStage::Release | EnvelopeStage::Done)
    }

    pub fn is_finished(&self) -> bool {
        self.stage == EnvelopeStage::Done
    }

    /// Render the envelope over `output`.
    pub fn get_block(&mut self, output: &mut [f32]) {
        for (frame, value) in output.iter_mut().enumerate() {
            if self.release_at == Some(frame) {
                self.release_at = None;
                self.enter_release();
            }
            *value = self.step();
        }

        if let Some(at) = self.release_at {
            self.release_at = Some(at.saturating_sub(output.len()));
        }
    }

    fn enter_release(&mut self) {
        self.stage = match self.stage {
            EnvelopeStage::Delay | EnvelopeStage::Done => {
                self.level = 0.0;
                EnvelopeStage::Done
            }
            _ => EnvelopeStage::Release,
        };
    }

    fn step(&mut self) -> f32 {
        loop {
            match self.stage {
                EnvelopeStage::Delay => {
                    if self.delay > 0 {
                        self.delay -= 1;
                        return 0.0;
                    }
                    self.stage = EnvelopeStage::Attack;
                }
                EnvelopeStage::Attack => {
                    if self.attack > 0 {
                        self.attack -= 1;
                        self.level = (self.level + self.attack_step).min(1.0);
                        return self.level;
                    }
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Hold;
                }
                EnvelopeStage::Hold => {
                    if self.hold > 0 {
                        self.hold -= 1;
                        return self.level;
                    }
                    self.stage = EnvelopeStage::Decay;
                }
                EnvelopeStage::Decay => {
                    self.level = self.sustain + (self.level - self.sustain) * self.decay_rate;
                    if self.level - self.sustain < VIRTUALLY_ZERO {
                        self.level = self.sustain;
                        self.stage = if self.sustain < VIRTUALLY_ZERO {
                            EnvelopeStage::Done
                        } else {
                            EnvelopeStage::Sustain
                        };
                    }
                    return self.level;
                }
                EnvelopeStage::Sustain => return self.level,
                EnvelopeStage::Release => {
                    self.level *= self.release_rate;
                    if self.level < VIRTUALLY_ZERO {
                        self.level = 0.0;
                        self.stage = EnvelopeStage::Done;
                    }
                    return self.level;
                }
                EnvelopeStage::Done => return 0.0,
            }
        }
    }

    fn frames(&self, seconds: f32) -> usize {
        (seconds * self.sample_rate).round().max(0.0) as usize
    }

    fn rate(&self, seconds: f32) -> f32 {
        let frames = seconds * self.sample_rate;
        if frames < 1.0 {
            0.0
        } else {
            (-8.0 / frames).exp()
        }
    }
}
