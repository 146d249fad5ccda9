//! Enumerated opcode values.

use std::str::FromStr;

use super::opcode::OpcodeValue;
use crate::error::{Error, Result};

fn invalid(s: &str, type_name: &str) -> Error {
    Error::InvalidOpcodeValue(s.to_string(), type_name.to_string())
}

/// Implements `OpcodeValue` through `FromStr` for enumerated values.
macro_rules! opcode_value_from_str {
    ($($ty:ty),* $(,)?) => {
        $(
            impl OpcodeValue for $ty {
                fn parse_opcode(s: &str) -> Result<Self> {
                    s.trim().parse()
                }
            }
        )*
    };
}

/// Event that causes a region to start a voice.
///
/// ```text
/// trigger=attack       note-on
/// trigger=release      note-off, deferred while a pedal is held
/// trigger=release_key  note-off, regardless of pedals
/// trigger=first        note-on with no other note held in the key range
/// trigger=legato       note-on while another note is held in the key range
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trigger {
    #[default]
    Attack,
    Release,
    ReleaseKey,
    First,
    Legato,
}

impl FromStr for Trigger {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "attack" => Ok(Trigger::Attack),
            "release" => Ok(Trigger::Release),
            "release_key" => Ok(Trigger::ReleaseKey),
            "first" => Ok(Trigger::First),
            "legato" => Ok(Trigger::Legato),
            _ => Err(invalid(s, "Trigger")),
        }
    }
}

impl Trigger {
    pub fn is_release(self) -> bool {
        matches!(self, Trigger::Release | Trigger::ReleaseKey)
    }
}

/// Sample looping behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    NoLoop,
    /// Plays to the end and ignores note-off
    OneShot,
    LoopContinuous,
    LoopSustain,
}

impl FromStr for LoopMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "no_loop" => Ok(LoopMode::NoLoop),
            "one_shot" => Ok(LoopMode::OneShot),
            "loop_continuous" => Ok(LoopMode::LoopContinuous),
            "loop_sustain" => Ok(LoopMode::LoopSustain),
            _ => Err(invalid(s, "LoopMode")),
        }
    }
}

/// How a voice is stopped when its region is choked through `off_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffMode {
    #[default]
    Fast,
    Normal,
}

impl FromStr for OffMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(OffMode::Fast),
            "normal" => Ok(OffMode::Normal),
            _ => Err(invalid(s, "OffMode")),
        }
    }
}

/// Velocity a region reads when it is triggered (`sw_vel`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VelocityOverride {
    #[default]
    Current,
    Previous,
}

impl FromStr for VelocityOverride {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "current" => Ok(VelocityOverride::Current),
            "previous" => Ok(VelocityOverride::Previous),
            _ => Err(invalid(s, "VelocityOverride")),
        }
    }
}

/// Shape of a crossfade ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossfadeCurve {
    /// Linear in amplitude
    Gain,
    /// Constant power (square root of the position)
    #[default]
    Power,
}

impl FromStr for CrossfadeCurve {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gain" => Ok(CrossfadeCurve::Gain),
            "power" => Ok(CrossfadeCurve::Power),
            _ => Err(invalid(s, "CrossfadeCurve")),
        }
    }
}

/// Voice chosen for release when `note_polyphony` is exceeded.
///
/// With `Mask` a new note only steals from an earlier note of equal or
/// lower velocity; with `DontMask` the oldest voice is always released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelfMask {
    #[default]
    Mask,
    DontMask,
}

impl FromStr for SelfMask {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "on" | "mask" => Ok(SelfMask::Mask),
            "off" | "dontmask" => Ok(SelfMask::DontMask),
            _ => Err(invalid(s, "SelfMask")),
        }
    }
}

/// Filter topology handed to the external kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    #[default]
    Lpf2p,
    Lpf1p,
    Lpf4p,
    Hpf1p,
    Hpf2p,
    Hpf4p,
    Bpf2p,
    Brf2p,
    Lsh,
    Hsh,
    Peq,
}

impl FromStr for FilterType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "lpf_1p" => Ok(FilterType::Lpf1p),
            "lpf_2p" => Ok(FilterType::Lpf2p),
            "lpf_4p" => Ok(FilterType::Lpf4p),
            "hpf_1p" => Ok(FilterType::Hpf1p),
            "hpf_2p" => Ok(FilterType::Hpf2p),
            "hpf_4p" => Ok(FilterType::Hpf4p),
            "bpf_2p" => Ok(FilterType::Bpf2p),
            "brf_2p" => Ok(FilterType::Brf2p),
            "lsh" => Ok(FilterType::Lsh),
            "hsh" => Ok(FilterType::Hsh),
            "peq" => Ok(FilterType::Peq),
            _ => Err(invalid(s, "FilterType")),
        }
    }
}

/// EQ band shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EqType {
    #[default]
    Peak,
    LowShelf,
    HighShelf,
}

impl FromStr for EqType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "peak" => Ok(EqType::Peak),
            "lshelf" => Ok(EqType::LowShelf),
            "hshelf" => Ok(EqType::HighShelf),
            _ => Err(invalid(s, "EqType")),
        }
    }
}

opcode_value_from_str!(
    Trigger,
    LoopMode,
    OffMode,
    VelocityOverride,
    CrossfadeCurve,
    SelfMask,
    FilterType,
    EqType,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_parsing() {
        assert_eq!(Trigger::parse_opcode("release_key").unwrap(), Trigger::ReleaseKey);
        assert_eq!(Trigger::parse_opcode("Legato").unwrap(), Trigger::Legato);
        assert!(Trigger::parse_opcode("sometimes").is_err());
        assert!(Trigger::Release.is_release());
        assert!(!Trigger::First.is_release());
    }

    #[test]
    fn test_self_mask_spellings() {
        assert_eq!(SelfMask::parse_opcode("off").unwrap(), SelfMask::DontMask);
        assert_eq!(SelfMask::parse_opcode("on").unwrap(), SelfMask::Mask);
        assert_eq!(SelfMask::default(), SelfMask::Mask);
    }

    #[test]
    fn test_other_values() {
        assert_eq!(LoopMode::parse_opcode("one_shot").unwrap(), LoopMode::OneShot);
        assert_eq!(OffMode::parse_opcode("normal").unwrap(), OffMode::Normal);
        assert_eq!(CrossfadeCurve::parse_opcode("gain").unwrap(), CrossfadeCurve::Gain);
        assert_eq!(VelocityOverride::parse_opcode("previous").unwrap(), VelocityOverride::Previous);
        assert_eq!(FilterType::parse_opcode("hpf_2p").unwrap(), FilterType::Hpf2p);
        assert_eq!(EqType::parse_opcode("hshelf").unwrap(), EqType::HighShelf);
        assert!(EqType::parse_opcode("notch").is_err());
    }
}
