//! Instrument loading and reload checks.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use super::bridge::MessageHandler;
use super::messages::{Message, Notification, Response};
use super::queue::FrameSender;
use crate::error::{Error, Result};
use crate::region::Region;
use crate::sampler::Sampler;

/// Turns an instrument file into regions.
pub trait InstrumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> anyhow::Result<Vec<Region>>;

    /// Last modification time of `path`.
    fn modified(&self, path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LoadedInstrument {
    path: PathBuf,
    modified: Option<SystemTime>,
}

/// The shared engine together with the instrument it was loaded from.
///
/// Cloned handles are used by the worker thread and the host thread; the
/// engine lock is the same one the audio thread tries.
#[derive(Clone)]
pub struct InstrumentSlot {
    sampler: Arc<Mutex<Sampler>>,
    loader: Arc<dyn InstrumentLoader>,
    current: Arc<Mutex<Option<LoadedInstrument>>>,
}

impl InstrumentSlot {
    pub fn new(sampler: Arc<Mutex<Sampler>>, loader: Arc<dyn InstrumentLoader>) -> Self {
        Self {
            sampler,
            loader,
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn sampler(&self) -> &Arc<Mutex<Sampler>> {
        &self.sampler
    }

    /// Path of the instrument currently loaded.
    pub fn path(&self) -> Option<PathBuf> {
        self.current.lock().as_ref().map(|c| c.path.clone())
    }

    /// Load `path` and install its regions. On failure the previous
    /// instrument stays in place.
    pub fn load(&self, path: &Path) -> Result<usize> {
        let modified = self.loader.modified(path);
        let regions = self.loader.load(path).map_err(|e| Error::InstrumentLoad {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        })?;
        let count = regions.len();

        self.sampler.lock().load_regions(regions);
        *self.current.lock() = Some(LoadedInstrument {
            path: path.to_path_buf(),
            modified,
        });
        log::info!("Loaded instrument {} ({} regions)", path.display(), count);
        Ok(count)
    }

    /// True if the loaded file changed on disk since it was loaded.
    pub fn should_reload(&self) -> bool {
        let current = self.current.lock().clone();
        match current {
            Some(LoadedInstrument {
                path,
                modified: Some(loaded),
            }) => self
                .loader
                .modified(&path)
                .is_some_and(|modified| modified > loaded),
            _ => false,
        }
    }

    /// Reload if the file changed. Returns `(reloaded, ok)`.
    pub fn reload_if_modified(&self) -> (bool, bool) {
        if !self.should_reload() {
            return (false, true);
        }
        let Some(path) = self.path() else {
            return (false, true);
        };
        log::info!("Instrument {} changed on disk, reloading", path.display());
        match self.load(&path) {
            Ok(_) => (true, true),
            Err(e) => {
                log::warn!("{}", e);
                (false, false)
            }
        }
    }
}

/// Worker-side handler for every [`Message`].
pub struct SamplerWorker {
    slot: InstrumentSlot,
    notifications: Sender<Notification>,
}

impl SamplerWorker {
    pub fn new(slot: InstrumentSlot, notifications: Sender<Notification>) -> Self {
        Self {
            slot,
            notifications,
        }
    }

    fn notify(&self, notification: Notification) {
        // The host may have dropped its receiver; the engine keeps going.
        let _ = self.notifications.send(notification);
    }
}

impl MessageHandler for SamplerWorker {
    fn handle(&mut self, message: Message, responses: &FrameSender<Response>) {
        match message {
            Message::SetNumVoices(voices) => self.slot.sampler.lock().set_num_voices(voices as usize),
            Message::SetOversampling(factor) => self.slot.sampler.lock().set_oversampling(factor),
            Message::SetPreloadSize(size) => self.slot.sampler.lock().set_preload_size(size),
            Message::CheckShouldReload => {
                let (reloaded, ok) = self.slot.reload_if_modified();
                if let Err(e) = responses.send(&Response::ReloadChecked { reloaded, ok }) {
                    log::warn!("Could not answer reload check: {}", e);
                }
                if reloaded || !ok {
                    self.notify(Notification::ReloadChecked { reloaded, ok });
                }
            }
            Message::NotifyPlayState { active_voices } => {
                self.notify(Notification::PlayState { active_voices })
            }
            Message::LoadInstrument(path) => match self.slot.load(&path) {
                Ok(regions) => self.notify(Notification::InstrumentLoaded { path, regions }),
                Err(e) => {
                    log::warn!("{}", e);
                    self.notify(Notification::LoadFailed {
                        reason: e.to_string(),
                        path,
                    });
                }
            },
        }
    }
}
