//! Messages exchanged with the worker thread.
//!
//! [`Message`] frames travel to the worker and [`Response`] frames come back
//! to the audio thread, both through the framed byte queues in
//! [`super::queue`]. [`Notification`]s go to the host thread over a plain
//! channel.

use std::path::PathBuf;

use crate::config::Oversampling;
use crate::error::{Error, Result};

/// A value that can travel through a frame queue.
pub trait Frame: Sized {
    fn type_id(&self) -> u32;
    fn payload_len(&self) -> usize;
    fn write_payload(&self, out: &mut FrameWriter<'_>);
    fn decode(type_id: u32, payload: &[u8]) -> Result<Self>;

    /// Reject values that cannot be encoded. Called before anything is written.
    fn check(&self) -> Result<()> {
        Ok(())
    }
}

/// Writes a payload into a queue region that may wrap around.
pub struct FrameWriter<'a> {
    first: &'a mut [u8],
    second: &'a mut [u8],
    position: usize,
}

impl<'a> FrameWriter<'a> {
    pub fn new(first: &'a mut [u8], second: &'a mut [u8]) -> Self {
        Self {
            first,
            second,
            position: 0,
        }
    }

    /// Append `bytes`, silently stopping at the end of the region.
    pub fn put(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            let split = self.first.len();
            let slot = if self.position < split {
                self.first.get_mut(self.position)
            } else {
                self.second.get_mut(self.position - split)
            };
            if let Some(slot) = slot {
                *slot = byte;
            }
            self.position += 1;
        }
    }

    pub fn put_u32(&mut self, value: u32) {
        self.put(&value.to_le_bytes());
    }

    pub fn written(&self) -> usize {
        self.position
    }
}

fn read_u32(payload: &[u8], index: usize) -> Result<u32> {
    let bytes = payload
        .get(index * 4..index * 4 + 4)
        .ok_or_else(|| Error::QueueDesync(format!("payload of {} bytes is too short", payload.len())))?;
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(word))
}

/// Requests for the worker thread.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    SetNumVoices(u32),
    SetOversampling(Oversampling),
    SetPreloadSize(u32),
    /// Reload the instrument if its file changed
    CheckShouldReload,
    NotifyPlayState { active_voices: u32 },
    LoadInstrument(PathBuf),
}

impl Message {
    const SET_NUM_VOICES: u32 = 1;
    const SET_OVERSAMPLING: u32 = 2;
    const SET_PRELOAD_SIZE: u32 = 3;
    const CHECK_SHOULD_RELOAD: u32 = 4;
    const NOTIFY_PLAY_STATE: u32 = 5;
    const LOAD_INSTRUMENT: u32 = 6;

    fn path_bytes(path: &std::path::Path) -> &[u8] {
        path.to_str().map(str::as_bytes).unwrap_or_default()
    }
}

impl Frame for Message {
    fn type_id(&self) -> u32 {
        match self {
            Message::SetNumVoices(_) => Self::SET_NUM_VOICES,
            Message::SetOversampling(_) => Self::SET_OVERSAMPLING,
            Message::SetPreloadSize(_) => Self::SET_PRELOAD_SIZE,
            Message::CheckShouldReload => Self::CHECK_SHOULD_RELOAD,
            Message::NotifyPlayState { .. } => Self::NOTIFY_PLAY_STATE,
            Message::LoadInstrument(_) => Self::LOAD_INSTRUMENT,
        }
    }

    fn check(&self) -> Result<()> {
        match self {
            Message::LoadInstrument(path) if path.to_str().is_none() => {
                Err(Error::InvalidPath(path.clone()))
            }
            _ => Ok(()),
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            Message::CheckShouldReload => 0,
            Message::LoadInstrument(path) => Self::path_bytes(path).len(),
            _ => 4,
        }
    }

    fn write_payload(&self, out: &mut FrameWriter<'_>) {
        match self {
            Message::SetNumVoices(value) | Message::SetPreloadSize(value) => out.put_u32(*value),
            Message::SetOversampling(factor) => out.put_u32(factor.factor()),
            Message::CheckShouldReload => {}
            Message::NotifyPlayState { active_voices } => out.put_u32(*active_voices),
            Message::LoadInstrument(path) => out.put(Self::path_bytes(path)),
        }
    }

    fn decode(type_id: u32, payload: &[u8]) -> Result<Self> {
        let message = match type_id {
            Self::SET_NUM_VOICES => Message::SetNumVoices(read_u32(payload, 0)?),
            Self::SET_OVERSAMPLING => Message::SetOversampling(read_u32(payload, 0)?.try_into()?),
            Self::SET_PRELOAD_SIZE => Message::SetPreloadSize(read_u32(payload, 0)?),
            Self::CHECK_SHOULD_RELOAD => Message::CheckShouldReload,
            Self::NOTIFY_PLAY_STATE => Message::NotifyPlayState {
                active_voices: read_u32(payload, 0)?,
            },
            Self::LOAD_INSTRUMENT => {
                let path = std::str::from_utf8(payload)
                    .map_err(|e| Error::QueueDesync(format!("instrument path: {}", e)))?;
                Message::LoadInstrument(PathBuf::from(path))
            }
            other => return Err(Error::UnknownMessage(other)),
        };
        Ok(message)
    }
}

/// Answers from the worker to the audio thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    ReloadChecked { reloaded: bool, ok: bool },
}

impl Response {
    const RELOAD_CHECKED: u32 = 100;
}

impl Frame for Response {
    fn type_id(&self) -> u32 {
        match self {
            Response::ReloadChecked { .. } => Self::RELOAD_CHECKED,
        }
    }

    fn payload_len(&self) -> usize {
        2
    }

    fn write_payload(&self, out: &mut FrameWriter<'_>) {
        match *self {
            Response::ReloadChecked { reloaded, ok } => out.put(&[reloaded as u8, ok as u8]),
        }
    }

    fn decode(type_id: u32, payload: &[u8]) -> Result<Self> {
        match (type_id, payload) {
            (Self::RELOAD_CHECKED, [reloaded, ok]) => Ok(Response::ReloadChecked {
                reloaded: *reloaded != 0,
                ok: *ok != 0,
            }),
            (Self::RELOAD_CHECKED, _) => Err(Error::QueueDesync(format!(
                "reload response of {} bytes",
                payload.len()
            ))),
            (other, _) => Err(Error::UnknownMessage(other)),
        }
    }
}

/// Events reported to the host thread.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    PlayState { active_voices: u32 },
    ReloadChecked { reloaded: bool, ok: bool },
    InstrumentLoaded { path: PathBuf, regions: usize },
    LoadFailed { path: PathBuf, reason: String },
}
