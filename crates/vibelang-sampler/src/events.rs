//! Host events.
//!
//! [`HostEvent`] is what a host adapter hands to the audio thread: one MIDI
//! or transport event with its frame offset inside the current block.

use crate::sampler::Sampler;

/// Pitch bend center for 14-bit MIDI values.
const BEND_CENTER: i32 = 8192;

/// An event with its frame offset in the current block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostEvent {
    NoteOn { delay: i32, key: u8, velocity: u8 },
    NoteOff { delay: i32, key: u8, velocity: u8 },
    /// Controller change, value normalized to [0, 1]
    Cc { delay: i32, cc: u16, value: f32 },
    /// Pitch bend in [-1, 1]
    PitchBend { delay: i32, value: f32 },
    /// Channel pressure in [0, 1]
    Aftertouch { delay: i32, value: f32 },
    /// Per-note pressure in [0, 1]
    PolyAftertouch { delay: i32, key: u8, value: f32 },
    Tempo { delay: i32, seconds_per_quarter: f32 },
}

impl HostEvent {
    /// Parse raw MIDI bytes. The channel nibble is ignored, and a note-on
    /// with velocity 0 is a note-off.
    pub fn from_midi_bytes(bytes: &[u8], delay: i32) -> Option<Self> {
        let status = *bytes.first()?;
        let data = |index: usize| bytes.get(index).map(|b| b & 0x7F);

        match status & 0xF0 {
            0x90 => {
                let (key, velocity) = (data(1)?, data(2)?);
                if velocity == 0 {
                    Some(HostEvent::NoteOff { delay, key, velocity })
                } else {
                    Some(HostEvent::NoteOn { delay, key, velocity })
                }
            }
            0x80 => Some(HostEvent::NoteOff {
                delay,
                key: data(1)?,
                velocity: data(2)?,
            }),
            0xB0 => Some(HostEvent::Cc {
                delay,
                cc: data(1)? as u16,
                value: data(2)? as f32 / 127.0,
            }),
            0xE0 => {
                let value = ((data(2)? as i32) << 7) | data(1)? as i32;
                let bend = (value - BEND_CENTER) as f32 / BEND_CENTER as f32;
                Some(HostEvent::PitchBend {
                    delay,
                    value: bend.clamp(-1.0, 1.0),
                })
            }
            0xD0 => Some(HostEvent::Aftertouch {
                delay,
                value: data(1)? as f32 / 127.0,
            }),
            0xA0 => Some(HostEvent::PolyAftertouch {
                delay,
                key: data(1)?,
                value: data(2)? as f32 / 127.0,
            }),
            _ => None,
        }
    }

    /// Frame offset inside the block.
    pub fn delay(&self) -> i32 {
        match *self {
            HostEvent::NoteOn { delay, .. }
            | HostEvent::NoteOff { delay, .. }
            | HostEvent::Cc { delay, .. }
            | HostEvent::PitchBend { delay, .. }
            | HostEvent::Aftertouch { delay, .. }
            | HostEvent::PolyAftertouch { delay, .. }
            | HostEvent::Tempo { delay, .. } => delay,
        }
    }

    /// Same event at another frame offset.
    pub fn with_delay(mut self, new_delay: i32) -> Self {
        match &mut self {
            HostEvent::NoteOn { delay, .. }
            | HostEvent::NoteOff { delay, .. }
            | HostEvent::Cc { delay, .. }
            | HostEvent::PitchBend { delay, .. }
            | HostEvent::Aftertouch { delay, .. }
            | HostEvent::PolyAftertouch { delay, .. }
            | HostEvent::Tempo { delay, .. } => *delay = new_delay,
        }
        self
    }

    /// Feed the event to the engine.
    pub fn apply(&self, sampler: &mut Sampler) {
        match *self {
            HostEvent::NoteOn { delay, key, velocity } => sampler.note_on(delay, key, velocity),
            HostEvent::NoteOff { delay, key, velocity } => sampler.note_off(delay, key, velocity),
            HostEvent::Cc { delay, cc, value } => sampler.cc(delay, cc, value),
            HostEvent::PitchBend { delay, value } => sampler.pitch_wheel(delay, value),
            HostEvent::Aftertouch { delay, value } => sampler.aftertouch(delay, value),
            HostEvent::PolyAftertouch { delay, key, value } => {
                sampler.poly_aftertouch(delay, key, value)
            }
            HostEvent::Tempo {
                delay,
                seconds_per_quarter,
            } => sampler.tempo(delay, seconds_per_quarter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_note_on() {
        let event = HostEvent::from_midi_bytes(&[0x93, 60, 100], 12);
        assert_eq!(
            event,
            Some(HostEvent::NoteOn {
                delay: 12,
                key: 60,
                velocity: 100
            })
        );
    }

    #[test]
    fn test_parse_note_on_velocity_zero() {
        let event = HostEvent::from_midi_bytes(&[0x90, 60, 0], 0);
        assert_eq!(
            event,
            Some(HostEvent::NoteOff {
                delay: 0,
                key: 60,
                velocity: 0
            })
        );
    }

    #[test]
    fn test_parse_cc_and_pressure() {
        match HostEvent::from_midi_bytes(&[0xB0, 64, 127], 3) {
            Some(HostEvent::Cc { cc, value, .. }) => {
                assert_eq!(cc, 64);
                assert_relative_eq!(value, 1.0);
            }
            other => panic!("Expected Cc, got {:?}", other),
        }
        match HostEvent::from_midi_bytes(&[0xA0, 61, 0], 3) {
            Some(HostEvent::PolyAftertouch { key, value, .. }) => {
                assert_eq!(key, 61);
                assert_relative_eq!(value, 0.0);
            }
            other => panic!("Expected PolyAftertouch, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pitch_bend() {
        let center = HostEvent::from_midi_bytes(&[0xE0, 0, 64], 0);
        assert_eq!(center, Some(HostEvent::PitchBend { delay: 0, value: 0.0 }));

        match HostEvent::from_midi_bytes(&[0xE0, 0, 0], 0) {
            Some(HostEvent::PitchBend { value, .. }) => assert_relative_eq!(value, -1.0),
            other => panic!("Expected PitchBend, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_and_unsupported() {
        assert_eq!(HostEvent::from_midi_bytes(&[], 0), None);
        assert_eq!(HostEvent::from_midi_bytes(&[0x90, 60], 0), None);
        assert_eq!(HostEvent::from_midi_bytes(&[0xF8], 0), None);
        assert_eq!(HostEvent::from_midi_bytes(&[0xC0, 5], 0), None);
    }

    #[test]
    fn test_with_delay() {
        let event = HostEvent::Tempo {
            delay: 0,
            seconds_per_quarter: 0.5,
        };
        assert_eq!(event.with_delay(40).delay(), 40);
    }
}
