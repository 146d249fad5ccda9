//! Scripted event lists.
//!
//! ```toml
//! [[event]]
//! type = "note_on"
//! frame = 0
//! key = 60
//! velocity = 100
//!
//! [[automation]]
//! frame = 4800
//! param = 0
//! value = 0.5
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use vibelang_sampler::{HostEvent, PointQueue};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptEvent {
    NoteOn {
        frame: u64,
        key: u8,
        velocity: u8,
    },
    NoteOff {
        frame: u64,
        key: u8,
        #[serde(default)]
        velocity: u8,
    },
    Cc {
        frame: u64,
        cc: u16,
        value: f32,
    },
    PitchBend {
        frame: u64,
        value: f32,
    },
    Aftertouch {
        frame: u64,
        value: f32,
    },
    PolyAftertouch {
        frame: u64,
        key: u8,
        value: f32,
    },
    Tempo {
        frame: u64,
        bpm: f32,
    },
    /// Raw MIDI bytes
    Midi {
        frame: u64,
        bytes: [u8; 3],
    },
}

impl ScriptEvent {
    pub fn frame(&self) -> u64 {
        match *self {
            ScriptEvent::NoteOn { frame, .. }
            | ScriptEvent::NoteOff { frame, .. }
            | ScriptEvent::Cc { frame, .. }
            | ScriptEvent::PitchBend { frame, .. }
            | ScriptEvent::Aftertouch { frame, .. }
            | ScriptEvent::PolyAftertouch { frame, .. }
            | ScriptEvent::Tempo { frame, .. }
            | ScriptEvent::Midi { frame, .. } => frame,
        }
    }

    /// Host event at `delay` frames into its block.
    pub fn to_host_event(&self, delay: i32) -> Option<HostEvent> {
        let event = match *self {
            ScriptEvent::NoteOn { key, velocity, .. } => HostEvent::NoteOn { delay, key, velocity },
            ScriptEvent::NoteOff { key, velocity, .. } => HostEvent::NoteOff { delay, key, velocity },
            ScriptEvent::Cc { cc, value, .. } => HostEvent::Cc { delay, cc, value },
            ScriptEvent::PitchBend { value, .. } => HostEvent::PitchBend { delay, value },
            ScriptEvent::Aftertouch { value, .. } => HostEvent::Aftertouch { delay, value },
            ScriptEvent::PolyAftertouch { key, value, .. } => {
                HostEvent::PolyAftertouch { delay, key, value }
            }
            ScriptEvent::Tempo { bpm, .. } if bpm > 0.0 => HostEvent::Tempo {
                delay,
                seconds_per_quarter: 60.0 / bpm,
            },
            ScriptEvent::Tempo { .. } => return None,
            ScriptEvent::Midi { bytes, .. } => return HostEvent::from_midi_bytes(&bytes, delay),
        };
        Some(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AutomationPoint {
    pub frame: u64,
    pub param: u32,
    pub value: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub event: Vec<ScriptEvent>,
    #[serde(default)]
    pub automation: Vec<AutomationPoint>,
}

/// Events and automation for one block.
#[derive(Debug, Default)]
pub struct Block {
    pub events: Vec<HostEvent>,
    pub parameters: Vec<PointQueue>,
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid script {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut script: Script = toml::from_str(text)?;
        script.event.sort_by_key(ScriptEvent::frame);
        script.automation.sort_by_key(|p| p.frame);
        Ok(script)
    }

    /// Frame just after the last scripted change.
    pub fn end_frame(&self) -> u64 {
        let events = self.event.iter().map(|e| e.frame() + 1);
        let points = self.automation.iter().map(|p| p.frame + 1);
        events.chain(points).max().unwrap_or(0)
    }

    /// Everything in `[start, start + frames)`, with offsets relative to
    /// `start`.
    pub fn block(&self, start: u64, frames: usize) -> Block {
        let end = start + frames as u64;
        let in_block = |frame: u64| frame >= start && frame < end;

        let events = self
            .event
            .iter()
            .filter(|e| in_block(e.frame()))
            .filter_map(|e| e.to_host_event((e.frame() - start) as i32))
            .collect();

        let mut parameters: Vec<PointQueue> = Vec::new();
        for point in self.automation.iter().filter(|p| in_block(p.frame)) {
            let offset = (point.frame - start) as u32;
            match parameters.iter_mut().find(|q| q.id == point.param) {
                Some(queue) => queue.points.push((offset, point.value)),
                None => parameters.push(PointQueue::new(point.param).with_point(offset, point.value)),
            }
        }

        Block { events, parameters }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"
        [[event]]
        type = "note_off"
        frame = 300
        key = 60

        [[event]]
        type = "note_on"
        frame = 10
        key = 60
        velocity = 100

        [[event]]
        type = "midi"
        frame = 130
        bytes = [176, 64, 127]

        [[automation]]
        frame = 140
        param = 0
        value = 0.5

        [[automation]]
        frame = 150
        param = 0
        value = 0.25
    "#;

    #[test]
    fn test_parse_sorts_by_frame() {
        let script = Script::parse(SCRIPT).unwrap();
        assert_eq!(script.event[0].frame(), 10);
        assert_eq!(script.event[2].frame(), 300);
        assert_eq!(script.end_frame(), 301);
    }

    #[test]
    fn test_blocks_use_relative_offsets() {
        let script = Script::parse(SCRIPT).unwrap();

        let first = script.block(0, 128);
        assert_eq!(
            first.events,
            vec![HostEvent::NoteOn {
                delay: 10,
                key: 60,
                velocity: 100
            }]
        );
        assert!(first.parameters.is_empty());

        let second = script.block(128, 128);
        assert_eq!(second.events.len(), 1);
        assert_eq!(second.events[0].delay(), 2);
        assert_eq!(second.parameters.len(), 1);
        assert_eq!(second.parameters[0].points, vec![(12, 0.5), (22, 0.25)]);
    }

    #[test]
    fn test_tempo_in_bpm() {
        let event = ScriptEvent::Tempo { frame: 0, bpm: 120.0 };
        assert_eq!(
            event.to_host_event(0),
            Some(HostEvent::Tempo {
                delay: 0,
                seconds_per_quarter: 0.5
            })
        );
        assert_eq!(ScriptEvent::Tempo { frame: 0, bpm: 0.0 }.to_host_event(0), None);
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        assert!(Script::parse("[[event]]\ntype = \"sysex\"\nframe = 0\n").is_err());
    }
}
