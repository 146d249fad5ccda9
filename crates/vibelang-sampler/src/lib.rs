//! SFZ trigger and modulation engine for VibeLang.
//!
//! This crate decides, for every incoming MIDI event and every audio block,
//! which regions of an instrument sound, at what gain, and with which
//! envelope and filter modulation:
//! - Region model built from already-tokenised opcodes, with header
//!   inheritance
//! - Per-region activation gates (key, velocity, CC, bend, aftertouch, tempo,
//!   random, round robin, keyswitches) and pedal-aware release triggers
//! - Time-aware MIDI state with per-block event histories
//! - Envelope, filter and EQ parameter resolution at control rate
//! - Fixed voice pool with polyphony limits and off-group choking
//! - Ordered dispatch of events and parameter automation
//! - A background worker fed through lock-free framed queues
//!
//! # Architecture
//!
//! Nothing on the audio path allocates or waits. Filter DSP and sample
//! streaming live outside the crate: filters are reached through the
//! [`modulation::FilterKernel`] trait and instrument files through
//! [`worker::InstrumentLoader`].
//!
//! # Example
//!
//! ```ignore
//! use vibelang_sampler::{Header, HostEvent, Opcode, RegionBuilder, Sampler, SamplerConfig};
//!
//! let mut builder = RegionBuilder::new();
//! builder.header(Header::Region, vec![Opcode::new("sample", "*sine"), Opcode::new("key", "60")]);
//!
//! let mut sampler = Sampler::new(&SamplerConfig::default());
//! sampler.load_regions(builder.build());
//!
//! HostEvent::NoteOn { delay: 0, key: 60, velocity: 100 }.apply(&mut sampler);
//! let (mut left, mut right) = (vec![0.0; 1024], vec![0.0; 1024]);
//! sampler.render_block(&mut left, &mut right);
//! ```

pub mod config;
pub mod error;
pub mod event_processor;
pub mod events;
pub mod midi_state;
pub mod modulation;
pub mod params;
pub mod processor;
pub mod region;
pub mod sampler;
pub mod voice;
pub mod worker;

pub use config::{Oversampling, SamplerConfig};
pub use error::{Error, Result};
pub use event_processor::{OrderedEventProcessor, OrderedReceiver, ParameterQueue, PointQueue};
pub use events::HostEvent;
pub use midi_state::MidiState;
pub use params::{param_range, ParamChange, ParamRange};
pub use processor::{SamplerController, SamplerProcessor};
pub use region::{Header, Opcode, Region, RegionBuilder};
pub use sampler::Sampler;
pub use voice::{TriggerEvent, TriggerKind, Voice, VoiceState};
pub use worker::{InstrumentLoader, Notification};
