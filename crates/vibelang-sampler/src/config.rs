//! Engine constants and runtime configuration.
//!
//! The configuration is plain scalars with a documented default and range.
//! It can be stored as TOML:
//!
//! ```toml
//! num_voices = 64
//! oversampling = 1
//! preload_size = 8192
//! sample_rate = 48000.0
//! samples_per_block = 1024
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Number of controllers tracked by the MIDI state, including extended CCs.
pub const NUM_CCS: usize = 512;
/// Number of MIDI notes.
pub const NUM_NOTES: usize = 128;
/// Largest render block accepted by the engine.
pub const MAX_BLOCK_SIZE: usize = 8192;
/// Upper bound for the voice pool.
pub const MAX_VOICES: usize = 256;
/// Depth of each per-dimension event history.
pub const MAX_EVENTS_PER_BLOCK: usize = 64;
/// Filters a single region may declare.
pub const MAX_FILTERS_PER_REGION: usize = 2;
/// EQ bands a single region may declare.
pub const MAX_EQS_PER_REGION: usize = 3;
/// Pending pedal releases a region keeps before ignoring new ones.
pub const MAX_DELAYED_RELEASES: usize = 128;

pub const SUSTAIN_CC: u16 = 64;
pub const SOSTENUTO_CC: u16 = 66;
pub const ALL_SOUND_OFF_CC: u16 = 120;
pub const RESET_CC: u16 = 121;
pub const ALL_NOTES_OFF_CC: u16 = 123;

/// Release duration used by `off_mode=fast` and sound-off messages.
pub const FAST_RELEASE_SECONDS: f32 = 0.01;
/// Envelope level under which a releasing voice is considered silent.
pub const VIRTUALLY_ZERO: f32 = 0.001;
pub const CENTS_PER_SEMITONE: f32 = 100.0;

/// Controller numbers synthesized by the MIDI state from note events.
pub mod extended_cc {
    pub const NOTE_ON_VELOCITY: u16 = 131;
    pub const NOTE_OFF_VELOCITY: u16 = 132;
    pub const KEYBOARD_NOTE_NUMBER: u16 = 133;
    pub const KEYBOARD_NOTE_GATE: u16 = 134;
    pub const ALTERNATE: u16 = 137;
    pub const KEY_DELTA: u16 = 140;
    pub const ABSOLUTE_KEY_DELTA: u16 = 141;

    /// All synthesized controllers, in ascending order.
    pub const ALL: [u16; 7] = [
        NOTE_ON_VELOCITY,
        NOTE_OFF_VELOCITY,
        KEYBOARD_NOTE_NUMBER,
        KEYBOARD_NOTE_GATE,
        ALTERNATE,
        KEY_DELTA,
        ABSOLUTE_KEY_DELTA,
    ];
}

/// Oversampling factor applied to sample offsets and file loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Oversampling {
    #[default]
    X1,
    X2,
    X4,
    X8,
}

impl Oversampling {
    /// Integer multiplier for this factor.
    pub fn factor(self) -> u32 {
        match self {
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
        }
    }

    /// Build from a log2 exponent (0 → x1, 3 → x8), clamping out-of-range values.
    pub fn from_log2(exponent: u32) -> Self {
        match exponent {
            0 => Oversampling::X1,
            1 => Oversampling::X2,
            2 => Oversampling::X4,
            _ => Oversampling::X8,
        }
    }

    /// Log2 exponent of this factor.
    pub fn log2(self) -> u32 {
        self.factor().trailing_zeros()
    }
}

impl TryFrom<u32> for Oversampling {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Oversampling::X1),
            2 => Ok(Oversampling::X2),
            4 => Ok(Oversampling::X4),
            8 => Ok(Oversampling::X8),
            other => Err(Error::Config(format!(
                "oversampling must be 1, 2, 4 or 8 (got {})",
                other
            ))),
        }
    }
}

impl From<Oversampling> for u32 {
    fn from(value: Oversampling) -> Self {
        value.factor()
    }
}

impl fmt::Display for Oversampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.factor())
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Size of the voice pool (1-256)
    pub num_voices: usize,
    /// Oversampling factor (1, 2, 4 or 8)
    pub oversampling: Oversampling,
    /// Frames preloaded per sample file (1024-65536)
    pub preload_size: u32,
    /// Output sample rate in Hz
    pub sample_rate: f32,
    /// Largest block the host will render (up to 8192)
    pub samples_per_block: usize,
    /// Sub-block size of the ordered event processor
    pub sub_block_size: usize,
    /// Frames between filter/EQ coefficient updates
    pub control_interval: usize,
    /// Filter holders (and EQ holders) in each pool
    pub filters_in_pool: usize,
    /// Capacity in bytes of each worker queue direction
    pub queue_capacity: usize,
    /// Period of the instrument file change check
    pub file_check_interval_ms: u64,
    /// Period of play-state notifications
    pub play_state_interval_ms: u64,
    /// Seed for the engine random generator; random when unset
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            num_voices: 64,
            oversampling: Oversampling::X1,
            preload_size: 8192,
            sample_rate: 48_000.0,
            samples_per_block: 1024,
            sub_block_size: 128,
            control_interval: 16,
            filters_in_pool: 64,
            queue_capacity: 65_536,
            file_check_interval_ms: 1000,
            play_state_interval_ms: 50,
            seed: None,
        }
    }
}

impl SamplerConfig {
    pub const NUM_VOICES_RANGE: (usize, usize) = (1, MAX_VOICES);
    pub const PRELOAD_SIZE_RANGE: (u32, u32) = (1024, 65_536);

    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: SamplerConfig = toml::from_str(content)?;
        config.validate();
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Config(format!("Config file not found at {:?}", path)));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serialize to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Clamp every value into its legal range, logging what was changed.
    pub fn validate(&mut self) {
        let (lo, hi) = Self::NUM_VOICES_RANGE;
        if !(lo..=hi).contains(&self.num_voices) {
            log::warn!("num_voices {} out of range, clamping", self.num_voices);
            self.num_voices = self.num_voices.clamp(lo, hi);
        }

        let (lo, hi) = Self::PRELOAD_SIZE_RANGE;
        if !(lo..=hi).contains(&self.preload_size) {
            log::warn!("preload_size {} out of range, clamping", self.preload_size);
            self.preload_size = self.preload_size.clamp(lo, hi);
        }

        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            log::warn!("invalid sample_rate {}, using 48000", self.sample_rate);
            self.sample_rate = 48_000.0;
        }

        if self.samples_per_block == 0 || self.samples_per_block > MAX_BLOCK_SIZE {
            log::warn!("samples_per_block {} out of range, clamping", self.samples_per_block);
            self.samples_per_block = self.samples_per_block.clamp(1, MAX_BLOCK_SIZE);
        }

        self.sub_block_size = self.sub_block_size.clamp(1, MAX_BLOCK_SIZE);
        self.control_interval = self.control_interval.clamp(1, MAX_BLOCK_SIZE);
        self.filters_in_pool = self.filters_in_pool.max(1);

        if self.queue_capacity < 64 {
            log::warn!("queue_capacity {} too small, using 64 bytes", self.queue_capacity);
            self.queue_capacity = 64;
        }
    }

    /// Number of frames between two file change checks.
    pub fn file_check_period_frames(&self) -> u64 {
        duration_to_frames(Duration::from_millis(self.file_check_interval_ms), self.sample_rate)
    }

    /// Number of frames between two play-state notifications.
    pub fn play_state_period_frames(&self) -> u64 {
        duration_to_frames(Duration::from_millis(self.play_state_interval_ms), self.sample_rate)
    }
}

fn duration_to_frames(duration: Duration, sample_rate: f32) -> u64 {
    (duration.as_secs_f64() * sample_rate as f64).round().max(1.0) as u64
}
