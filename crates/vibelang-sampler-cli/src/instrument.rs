//! TOML instrument files.
//!
//! An instrument is a list of `[[header]]` tables. `kind` names the header
//! (`control`, `global`, `master`, `group` or `region`) and every other key
//! is an opcode:
//!
//! ```toml
//! [[header]]
//! kind = "global"
//! ampeg_release = 0.3
//!
//! [[header]]
//! kind = "region"
//! sample = "*sine"
//! lokey = 48
//! hikey = 72
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use vibelang_sampler::{Header, InstrumentLoader, Opcode, Region, RegionBuilder};

#[derive(Debug, Deserialize)]
struct InstrumentFile {
    #[serde(default)]
    header: Vec<toml::Table>,
}

/// Loads instruments from TOML files.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlInstrumentLoader;

impl InstrumentLoader for TomlInstrumentLoader {
    fn load(&self, path: &Path) -> Result<Vec<Region>> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        parse_instrument(&text).with_context(|| format!("Invalid instrument {}", path.display()))
    }
}

/// Build regions from instrument text.
pub fn parse_instrument(text: &str) -> Result<Vec<Region>> {
    let file: InstrumentFile = toml::from_str(text)?;
    let mut builder = RegionBuilder::new();

    for (index, mut table) in file.header.into_iter().enumerate() {
        let kind = table
            .remove("kind")
            .with_context(|| format!("header #{} has no kind", index + 1))?;
        let header: Header = kind
            .as_str()
            .with_context(|| format!("header #{}: kind must be a string", index + 1))?
            .parse()?;

        let opcodes = table
            .into_iter()
            .map(|(name, value)| {
                opcode_value(&value)
                    .map(|value| Opcode::new(name.as_str(), value))
                    .with_context(|| format!("header #{}: unsupported value for {}", index + 1, name))
            })
            .collect::<Result<Vec<_>>>()?;
        builder.header(header, opcodes);
    }

    Ok(builder.build())
}

fn opcode_value(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(if *b { "on" } else { "off" }.to_string()),
        _ => None,
    }
}
