//! Header inheritance.
//!
//! Opcodes cascade down the header hierarchy: `<global>` applies to every
//! region, `<master>` to the groups below it, `<group>` to the regions below
//! it, and `<region>` opcodes are applied last so they win. Opening a header
//! clears every level below it.
//!
//! ```text
//! <control> note_offset=12
//! <global>  volume=-6
//! <group>   trigger=release
//! <region>  key=48        -> key 60, volume -6, trigger release
//! ```

use std::str::FromStr;

use super::opcode::Opcode;
use super::{Range, Region};
use crate::error::Error;

const NOTE_OFFSET_RANGE: Range<i32> = Range::new(-127, 127);
const OCTAVE_OFFSET_RANGE: Range<i32> = Range::new(-10, 10);

/// Opcode block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    Control,
    Global,
    Master,
    Group,
    Region,
}

impl FromStr for Header {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches('<').trim_end_matches('>');
        match name.to_ascii_lowercase().as_str() {
            "control" => Ok(Header::Control),
            "global" => Ok(Header::Global),
            "master" => Ok(Header::Master),
            "group" => Ok(Header::Group),
            "region" => Ok(Header::Region),
            _ => Err(Error::InvalidOpcodeValue(s.to_string(), "Header".to_string())),
        }
    }
}

/// Builds regions from a sequence of header blocks.
#[derive(Debug, Clone, Default)]
pub struct RegionBuilder {
    global: Vec<Opcode>,
    master: Vec<Opcode>,
    group: Vec<Opcode>,
    default_path: String,
    note_offset: i32,
    octave_offset: i32,
    regions: Vec<Region>,
}

impl RegionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a header block. `<region>` blocks produce a region immediately.
    pub fn header(&mut self, header: Header, opcodes: Vec<Opcode>) {
        match header {
            Header::Control => self.control(&opcodes),
            Header::Global => {
                self.global = opcodes;
                self.master.clear();
                self.group.clear();
            }
            Header::Master => {
                self.master = opcodes;
                self.group.clear();
            }
            Header::Group => self.group = opcodes,
            Header::Region => {
                self.region(&opcodes);
            }
        }
    }

    /// Build one region from the current inherited state plus `opcodes`.
    /// Returns the new region's id.
    pub fn region(&mut self, opcodes: &[Opcode]) -> usize {
        let id = self.regions.len();
        let mut region = Region::new(id);

        let inherited = self.global.iter().chain(&self.master).chain(&self.group);
        let mut unknown = 0;
        for opcode in inherited.chain(opcodes) {
            if !region.parse_opcode(opcode) {
                unknown += 1;
            }
        }
        if unknown > 0 {
            log::debug!("Region {}: {} opcodes were not applied", id, unknown);
        }

        if !self.default_path.is_empty() && !region.sample.is_empty() && !region.is_generator() {
            region.sample = format!("{}{}", self.default_path, region.sample);
        }
        region.offset_all_keys(self.key_offset());

        self.regions.push(region);
        id
    }

    /// Semitone shift applied to every key-valued field.
    pub fn key_offset(&self) -> i32 {
        self.note_offset + 12 * self.octave_offset
    }

    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn build(self) -> Vec<Region> {
        log::info!("Built {} regions", self.regions.len());
        self.regions
    }

    fn control(&mut self, opcodes: &[Opcode]) {
        for opcode in opcodes {
            let result = match opcode.normalized.as_str() {
                "note_offset" => opcode
                    .read_bounded(NOTE_OFFSET_RANGE)
                    .map(|v| self.note_offset = v),
                "octave_offset" => opcode
                    .read_bounded(OCTAVE_OFFSET_RANGE)
                    .map(|v| self.octave_offset = v),
                "default_path" => {
                    let mut path = opcode.value.replace('\\', "/");
                    if !path.is_empty() && !path.ends_with('/') {
                        path.push('/');
                    }
                    self.default_path = path;
                    Ok(())
                }
                _ => Err(Error::UnknownOpcode(opcode.name.clone())),
            };
            match result {
                Ok(()) => {}
                Err(Error::UnknownOpcode(name)) => {
                    log::debug!("Unknown control opcode '{}'", name)
                }
                Err(e) => log::warn!("Ignoring control opcode '{}': {}", opcode.name, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Trigger;

    fn opcodes(pairs: &[(&str, &str)]) -> Vec<Opcode> {
        pairs.iter().map(|(n, v)| Opcode::new(*n, *v)).collect()
    }

    #[test]
    fn test_header_names() {
        assert_eq!("<region>".parse::<Header>().unwrap(), Header::Region);
        assert_eq!("Global".parse::<Header>().unwrap(), Header::Global);
        assert!("<curve>".parse::<Header>().is_err());
    }

    #[test]
    fn test_inheritance_order() {
        let mut builder = RegionBuilder::new();
        builder.header(Header::Global, opcodes(&[("volume", "-6"), ("pan", "10")]));
        builder.header(Header::Master, opcodes(&[("volume", "-3")]));
        builder.header(Header::Group, opcodes(&[("trigger", "release"), ("pan", "20")]));
        builder.header(Header::Region, opcodes(&[("key", "60"), ("pan", "30")]));
        builder.header(Header::Region, opcodes(&[("key", "62")]));

        let regions = builder.build();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].id, 0);
        assert_eq!(regions[0].volume, -3.0);
        assert_eq!(regions[0].pan, 30.0);
        assert_eq!(regions[0].trigger, Trigger::Release);
        assert_eq!(regions[1].id, 1);
        assert_eq!(regions[1].pan, 20.0);
        assert_eq!(regions[1].key_range, Range::new(62, 62));
    }

    #[test]
    fn test_new_header_clears_lower_levels() {
        let mut builder = RegionBuilder::new();
        builder.header(Header::Group, opcodes(&[("trigger", "release")]));
        builder.header(Header::Master, opcodes(&[("volume", "-3")]));
        builder.region(&[]);
        builder.header(Header::Global, Vec::new());
        builder.region(&[]);

        let regions = builder.build();
        assert_eq!(regions[0].trigger, Trigger::Attack);
        assert_eq!(regions[0].volume, -3.0);
        assert_eq!(regions[1].volume, 0.0);
    }

    #[test]
    fn test_key_offsets() {
        let mut builder = RegionBuilder::new();
        builder.header(
            Header::Control,
            opcodes(&[("note_offset", "2"), ("octave_offset", "-1")]),
        );
        assert_eq!(builder.key_offset(), -10);
        builder.region(&opcodes(&[("lokey", "60"), ("hikey", "64"), ("sw_last", "36")]));
        builder.region(&opcodes(&[("hikey", "-1"), ("on_locc1", "64")]));

        let regions = builder.build();
        assert_eq!(regions[0].key_range, Range::new(50, 54));
        assert_eq!(regions[0].pitch_keycenter, 50);
        assert_eq!(regions[0].last_keyswitch, Some(26));
        assert_eq!(regions[1].key_range.end, -1);
    }

    #[test]
    fn test_default_path() {
        let mut builder = RegionBuilder::new();
        builder.header(Header::Control, opcodes(&[("default_path", "samples\\piano")]));
        builder.region(&opcodes(&[("sample", "c4.wav")]));
        builder.region(&opcodes(&[("sample", "*sine")]));

        let regions = builder.build();
        assert_eq!(regions[0].sample, "samples/piano/c4.wav");
        assert_eq!(regions[1].sample, "*sine");
    }

    #[test]
    fn test_bad_opcodes_do_not_abort() {
        let mut builder = RegionBuilder::new();
        builder.header(Header::Control, opcodes(&[("note_offset", "lots"), ("label_cc1", "x")]));
        builder.region(&opcodes(&[("lokey", "nope"), ("bogus", "1"), ("hikey", "70")]));

        assert_eq!(builder.key_offset(), 0);
        let regions = builder.build();
        assert_eq!(regions[0].key_range, Range::new(0, 70));
    }
}
