//! Opcode names, parameters and value conversion.
//!
//! Region opcodes often embed numbers in their names: `locc64`,
//! `eq2_gaincc7`, `amp_velcurve_100`. An [`Opcode`] separates those numbers
//! from the name so that matching can be done on a normalised form:
//!
//! ```text
//! locc64          -> loccN          [64]
//! eq2_gaincc7     -> eqN_gainccN    [2, 7]
//! ampeg_vel2decay -> ampeg_vel2decay []
//! ```
//!
//! Digits directly following `vel` and followed by a letter are part of the
//! name (`vel2attack`, `vel2freq`) and are not extracted.

use super::range::Range;
use crate::error::{Error, Result};

/// One `name=value` pair with its numeric parameters extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct Opcode {
    /// Name as written
    pub name: String,
    /// Name with every numeric parameter replaced by `N`
    pub normalized: String,
    /// Numeric parameters in order of appearance
    pub parameters: Vec<u32>,
    /// Raw value
    pub value: String,
}

impl Opcode {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let (normalized, parameters) = normalize_name(&name);
        Self {
            name,
            normalized,
            parameters,
            value: value.into().trim().to_string(),
        }
    }

    /// Parameter at `index`, if present.
    pub fn parameter(&self, index: usize) -> Option<u32> {
        self.parameters.get(index).copied()
    }

    /// Last parameter, which is the controller number of `*_onccN` opcodes.
    pub fn last_parameter(&self) -> Option<u32> {
        self.parameters.last().copied()
    }

    /// Parse the value as `T`.
    pub fn read<T: OpcodeValue>(&self) -> Result<T> {
        T::parse_opcode(&self.value)
    }

    /// Parse the value and clamp it into `bounds`.
    pub fn read_bounded<T>(&self, bounds: Range<T>) -> Result<T>
    where
        T: OpcodeValue + PartialOrd + Copy,
    {
        Ok(bounds.clamp(self.read::<T>()?))
    }

    /// Parse a MIDI key, accepting note names such as `c4` or `f#3`.
    pub fn read_key(&self) -> Result<i32> {
        match self.read::<i32>() {
            Ok(key) => Ok(key.clamp(-1, 127)),
            Err(_) => parse_note_name(&self.value)
                .ok_or_else(|| Error::InvalidOpcodeValue(self.value.clone(), "key".to_string())),
        }
    }

    pub fn invalid_parameter(&self, parameter: u32) -> Error {
        Error::InvalidParameter {
            opcode: self.name.clone(),
            parameter,
        }
    }
}

fn normalize_name(name: &str) -> (String, Vec<u32>) {
    let chars: Vec<char> = name.chars().collect();
    let mut normalized = String::with_capacity(name.len());
    let mut parameters = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            normalized.push(chars[i]);
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }

        let after_vel = normalized.ends_with("vel");
        let followed_by_letter = chars.get(i).is_some_and(|c| c.is_ascii_alphabetic());
        let digits: String = chars[start..i].iter().collect();
        if after_vel && followed_by_letter {
            normalized.push_str(&digits);
        } else {
            normalized.push('N');
            parameters.push(digits.parse::<u32>().unwrap_or(u32::MAX));
        }
    }

    (normalized, parameters)
}

/// Convert a note name (`c4` = 60, `c#4` = 61, `db4` = 61) into a MIDI key.
pub fn parse_note_name(text: &str) -> Option<i32> {
    let text = text.trim().to_ascii_lowercase();
    let mut chars = text.chars();
    let base = match chars.next()? {
        'c' => 0,
        'd' => 2,
        'e' => 4,
        'f' => 5,
        'g' => 7,
        'a' => 9,
        'b' => 11,
        _ => return None,
    };

    let rest = chars.as_str();
    let (accidental, octave) = if let Some(octave) = rest.strip_prefix('#') {
        (1, octave)
    } else if let Some(octave) = rest.strip_prefix('b') {
        (-1, octave)
    } else {
        (0, rest)
    };

    let octave: i32 = octave.parse().ok()?;
    let key = (octave + 1) * 12 + base + accidental;
    (0..=127).contains(&key).then_some(key)
}

/// Conversion of a raw opcode value into a typed value.
pub trait OpcodeValue: Sized {
    fn parse_opcode(s: &str) -> Result<Self>;
}

impl OpcodeValue for String {
    fn parse_opcode(s: &str) -> Result<Self> {
        Ok(s.to_string())
    }
}

impl OpcodeValue for f32 {
    fn parse_opcode(s: &str) -> Result<Self> {
        s.trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| Error::InvalidOpcodeValue(s.to_string(), "float".to_string()))
    }
}

impl OpcodeValue for i32 {
    /// Integers written with a fractional part are truncated.
    fn parse_opcode(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(value) = trimmed.parse::<i32>() {
            return Ok(value);
        }
        trimmed
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v as i32)
            .ok_or_else(|| Error::InvalidOpcodeValue(s.to_string(), "integer".to_string()))
    }
}

impl OpcodeValue for u32 {
    fn parse_opcode(s: &str) -> Result<Self> {
        i32::parse_opcode(s).map(|v| v.max(0) as u32)
    }
}

impl OpcodeValue for u8 {
    fn parse_opcode(s: &str) -> Result<Self> {
        i32::parse_opcode(s).map(|v| v.clamp(0, 255) as u8)
    }
}

impl OpcodeValue for bool {
    fn parse_opcode(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "yes" | "true" | "1" | "on" => Ok(true),
            "no" | "false" | "0" | "off" => Ok(false),
            _ => Err(Error::InvalidOpcodeValue(s.to_string(), "boolean".to_string())),
        }
    }
}
