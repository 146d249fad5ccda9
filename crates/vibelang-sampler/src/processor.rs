//! Audio-thread processor and host-thread controller.
//!
//! [`SamplerProcessor`] is what an audio callback drives: it takes the
//! engine lock without waiting, replays the block's events and automation
//! in order, renders, and keeps the worker informed. [`SamplerController`]
//! lives on the host thread and shares the same engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};
use parking_lot::Mutex;

use crate::config::{Oversampling, SamplerConfig};
use crate::error::Result;
use crate::event_processor::{OrderedEventProcessor, OrderedReceiver, ParameterQueue};
use crate::events::HostEvent;
use crate::params::{ParamChange, PARAM_COUNT};
use crate::sampler::Sampler;
use crate::worker::{
    FrameSender, InstrumentLoader, InstrumentSlot, Message, Notification, Response, SamplerWorker,
    WorkerBridge,
};

/// Settings that only the worker may apply.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct WorkerRequests {
    num_voices: Option<usize>,
    oversampling: Option<Oversampling>,
    preload_size: Option<u32>,
}

/// Feeds the ordered stream to the engine.
struct Dispatcher<'a> {
    sampler: &'a mut Sampler,
    requests: &'a mut WorkerRequests,
}

impl OrderedReceiver<HostEvent> for Dispatcher<'_> {
    fn receive_event(&mut self, event: &HostEvent) {
        event.apply(self.sampler);
    }

    fn receive_parameter(&mut self, id: u32, value: f32, offset: u32) {
        let Some(change) = ParamChange::from_normalized(id, value) else {
            log::trace!("Ignoring unknown parameter {}", id);
            return;
        };
        match change {
            ParamChange::Volume(db) => self.sampler.set_volume(db),
            ParamChange::Cc(cc, value) => self.sampler.cc(offset as i32, cc, value),
            ParamChange::NumVoices(voices) => {
                self.requests.num_voices = (voices != self.sampler.num_voices()).then_some(voices)
            }
            ParamChange::Oversampling(factor) => {
                self.requests.oversampling =
                    (factor != self.sampler.oversampling()).then_some(factor)
            }
            ParamChange::PreloadSize(size) => {
                self.requests.preload_size = (size != self.sampler.preload_size()).then_some(size)
            }
        }
    }
}

/// Reload-check periods a check may stay unanswered before another is posted.
const MAX_UNANSWERED_CHECK_PERIODS: u32 = 4;

/// When to post `CheckShouldReload`: once per period, at most one
/// outstanding, and again after a check went unanswered for too long.
#[derive(Debug, Clone, Copy)]
struct ReloadCheckSchedule {
    period: u64,
    elapsed: u64,
    /// Periods since the outstanding check was posted
    outstanding: Option<u32>,
}

impl ReloadCheckSchedule {
    fn new(period: u64) -> Self {
        Self {
            period,
            elapsed: 0,
            outstanding: None,
        }
    }

    /// Advance by `frames`. Returns true when a check should be posted.
    fn tick(&mut self, frames: u64) -> bool {
        self.elapsed += frames;
        if self.elapsed < self.period {
            return false;
        }
        self.elapsed = 0;
        match self.outstanding {
            None => true,
            Some(periods) if periods + 1 >= MAX_UNANSWERED_CHECK_PERIODS => {
                log::warn!("Reload check unanswered for {} periods, posting again", periods + 1);
                self.outstanding = None;
                true
            }
            Some(periods) => {
                self.outstanding = Some(periods + 1);
                false
            }
        }
    }

    fn posted(&mut self) {
        self.outstanding = Some(0);
    }

    fn answered(&mut self) {
        self.outstanding = None;
    }
}

pub struct SamplerProcessor {
    sampler: Arc<Mutex<Sampler>>,
    ordered: OrderedEventProcessor,
    bridge: WorkerBridge,
    requests: WorkerRequests,
    reload_check: ReloadCheckSchedule,
    play_state_period: u64,
    frames_since_play_state: u64,
    active_voices: u32,
}

impl SamplerProcessor {
    /// Build an engine from `config` and start its worker.
    pub fn create(
        config: &SamplerConfig,
        loader: Arc<dyn InstrumentLoader>,
    ) -> Result<(SamplerProcessor, SamplerController)> {
        let mut config = config.clone();
        config.validate();
        let sampler = Sampler::new(&config);
        Self::with_sampler(&config, sampler, loader)
    }

    /// Wrap an existing engine and start the worker.
    pub fn with_sampler(
        config: &SamplerConfig,
        sampler: Sampler,
        loader: Arc<dyn InstrumentLoader>,
    ) -> Result<(SamplerProcessor, SamplerController)> {
        let sampler = Arc::new(Mutex::new(sampler));
        let slot = InstrumentSlot::new(sampler.clone(), loader);
        let (notify_tx, notify_rx) = unbounded();
        let bridge = WorkerBridge::spawn(
            config.queue_capacity,
            SamplerWorker::new(slot.clone(), notify_tx),
        )?;

        let controller = SamplerController {
            slot,
            notifications: notify_rx,
            to_worker: bridge.sender(),
        };
        let processor = SamplerProcessor {
            sampler,
            ordered: OrderedEventProcessor::new(config.sub_block_size, PARAM_COUNT),
            bridge,
            requests: WorkerRequests::default(),
            reload_check: ReloadCheckSchedule::new(config.file_check_period_frames()),
            play_state_period: config.play_state_period_frames(),
            frames_since_play_state: 0,
            active_voices: 0,
        };
        log::debug!(
            "Processor ready: file check every {} frames, play state every {} frames",
            processor.reload_check.period,
            processor.play_state_period
        );
        Ok((processor, controller))
    }

    /// Render one block. `events` must be sorted by delay. Returns false
    /// when the engine was busy and silence was written instead.
    pub fn process<Q: ParameterQueue>(
        &mut self,
        events: &[HostEvent],
        parameters: &[Q],
        left: &mut [f32],
        right: &mut [f32],
    ) -> bool {
        while let Some(response) = self.bridge.poll() {
            match response {
                Response::ReloadChecked { reloaded, ok } => {
                    self.reload_check.answered();
                    log::trace!("Reload check done (reloaded: {}, ok: {})", reloaded, ok);
                }
            }
        }

        let frames = left.len().min(right.len());
        let rendered = match self.sampler.try_lock() {
            Some(mut sampler) => {
                let mut dispatcher = Dispatcher {
                    sampler: &mut sampler,
                    requests: &mut self.requests,
                };
                self.ordered
                    .process(frames, events, parameters, &mut dispatcher);
                sampler.render_block(left, right);
                self.active_voices = sampler.num_active_voices() as u32;
                true
            }
            None => {
                left.fill(0.0);
                right.fill(0.0);
                false
            }
        };

        self.post_requests();
        self.tick(frames as u64);
        rendered
    }

    /// Voices playing after the last rendered block.
    pub fn active_voices(&self) -> u32 {
        self.active_voices
    }

    /// Messages waiting for the worker.
    pub fn pending_messages(&self) -> usize {
        self.bridge.pending()
    }

    pub fn sampler(&self) -> &Arc<Mutex<Sampler>> {
        &self.sampler
    }

    /// Stop the worker thread. Unprocessed messages are discarded.
    pub fn stop(&mut self) -> usize {
        self.bridge.stop()
    }

    fn post_requests(&mut self) {
        if let Some(voices) = self.requests.num_voices {
            if self.post(Message::SetNumVoices(voices as u32)) {
                self.requests.num_voices = None;
            }
        }
        if let Some(factor) = self.requests.oversampling {
            if self.post(Message::SetOversampling(factor)) {
                self.requests.oversampling = None;
            }
        }
        if let Some(size) = self.requests.preload_size {
            if self.post(Message::SetPreloadSize(size)) {
                self.requests.preload_size = None;
            }
        }
    }

    fn tick(&mut self, frames: u64) {
        if self.reload_check.tick(frames) && self.post(Message::CheckShouldReload) {
            self.reload_check.posted();
        }

        self.frames_since_play_state += frames;
        if self.frames_since_play_state >= self.play_state_period {
            self.frames_since_play_state = 0;
            self.post(Message::NotifyPlayState {
                active_voices: self.active_voices,
            });
        }
    }

    /// Post without blocking; failures leave the request for a later block.
    fn post(&self, message: Message) -> bool {
        match self.bridge.post(&message) {
            Ok(()) => true,
            Err(e) => {
                log::trace!("Could not post {:?}: {}", message, e);
                false
            }
        }
    }
}

/// Host-thread handle on the engine.
pub struct SamplerController {
    slot: InstrumentSlot,
    notifications: Receiver<Notification>,
    to_worker: FrameSender<Message>,
}

impl SamplerController {
    /// Load an instrument now, blocking until the engine is free.
    pub fn load_instrument(&self, path: impl AsRef<Path>) -> Result<usize> {
        self.slot.load(path.as_ref())
    }

    /// Ask the worker to load an instrument. The result arrives as a
    /// [`Notification`].
    pub fn request_load(&self, path: impl AsRef<Path>) -> Result<()> {
        self.to_worker
            .send(&Message::LoadInstrument(path.as_ref().to_path_buf()))
    }

    pub fn instrument_path(&self) -> Option<PathBuf> {
        self.slot.path()
    }

    pub fn with_sampler<R>(&self, f: impl FnOnce(&Sampler) -> R) -> R {
        f(&self.slot.sampler().lock())
    }

    pub fn with_sampler_mut<R>(&self, f: impl FnOnce(&mut Sampler) -> R) -> R {
        f(&mut self.slot.sampler().lock())
    }

    pub fn notifications(&self) -> &Receiver<Notification> {
        &self.notifications
    }

    pub fn try_recv_notification(&self) -> Option<Notification> {
        self.notifications.try_recv().ok()
    }

    pub fn wait_notification(&self, timeout: Duration) -> Option<Notification> {
        self.notifications.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_processor::PointQueue;
    use crate::params::{FIRST_CC_PARAM, NUM_VOICES_PARAM, VOLUME_PARAM};
    use crate::worker::loader::tests::MemoryLoader;
    use std::time::SystemTime;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn config() -> SamplerConfig {
        SamplerConfig {
            num_voices: 8,
            sample_rate: 1000.0,
            samples_per_block: 100,
            file_check_interval_ms: 200,
            play_state_interval_ms: 100,
            seed: Some(7),
            ..Default::default()
        }
    }

    fn setup() -> (SamplerProcessor, SamplerController, Arc<MemoryLoader>) {
        let loader = Arc::new(MemoryLoader::default());
        loader.put("kit", &[60, 62], SystemTime::UNIX_EPOCH);
        let (processor, controller) = SamplerProcessor::create(&config(), loader.clone()).unwrap();
        controller.load_instrument("kit").unwrap();
        (processor, controller, loader)
    }

    fn block(processor: &mut SamplerProcessor, events: &[HostEvent], params: &[PointQueue]) -> (bool, Vec<f32>) {
        let mut left = vec![0.0; 100];
        let mut right = vec![0.0; 100];
        let rendered = processor.process(events, params, &mut left, &mut right);
        (rendered, left)
    }

    fn wait_for(controller: &SamplerController, wanted: impl Fn(&Notification) -> bool) -> Option<Notification> {
        while let Some(notification) = controller.wait_notification(TIMEOUT) {
            if wanted(&notification) {
                return Some(notification);
            }
        }
        None
    }

    #[test]
    fn test_unanswered_reload_check_is_posted_again() {
        let mut schedule = ReloadCheckSchedule::new(100);
        assert!(!schedule.tick(50));
        assert!(schedule.tick(50));
        schedule.posted();

        for _ in 1..MAX_UNANSWERED_CHECK_PERIODS {
            assert!(!schedule.tick(100));
        }
        assert!(schedule.tick(100));
        schedule.posted();

        schedule.answered();
        assert!(schedule.tick(100));
    }

    #[test]
    fn test_renders_events() {
        let (mut processor, _controller, _loader) = setup();
        let events = [HostEvent::NoteOn {
            delay: 10,
            key: 60,
            velocity: 100,
        }];
        let (rendered, left) = block(&mut processor, &events, &[]);
        assert!(rendered);
        assert_eq!(processor.active_voices(), 1);
        assert!(left[..10].iter().all(|s| *s == 0.0));
        assert!(left[10..].iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_busy_engine_renders_silence() {
        let (mut processor, controller, _loader) = setup();
        let events = [HostEvent::NoteOn {
            delay: 0,
            key: 60,
            velocity: 100,
        }];
        let (rendered, left) = controller.with_sampler(|_| block(&mut processor, &events, &[]));
        assert!(!rendered);
        assert!(left.iter().all(|s| *s == 0.0));
        assert_eq!(controller.with_sampler(|s| s.num_active_voices()), 0);
    }

    #[test]
    fn test_parameters_reach_engine_and_worker() {
        let (mut processor, controller, _loader) = setup();
        let params = [
            PointQueue::new(VOLUME_PARAM).with_point(0, 1.0),
            PointQueue::new(FIRST_CC_PARAM + 7).with_point(5, 0.5),
            PointQueue::new(NUM_VOICES_PARAM).with_point(0, 0.0),
        ];
        block(&mut processor, &[], &params);

        controller.with_sampler(|s| {
            assert_eq!(s.volume(), 6.0);
            assert_eq!(s.midi_state().cc_value(7), 0.5);
        });

        let mut voices = 0;
        for _ in 0..500 {
            voices = controller.with_sampler(|s| s.num_voices());
            if voices == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(voices, 1);
    }

    #[test]
    fn test_play_state_notifications() {
        let (mut processor, controller, _loader) = setup();
        let events = [HostEvent::NoteOn {
            delay: 0,
            key: 62,
            velocity: 90,
        }];
        block(&mut processor, &events, &[]);
        let notification = wait_for(&controller, |n| matches!(n, Notification::PlayState { .. }));
        assert_eq!(notification, Some(Notification::PlayState { active_voices: 1 }));
    }

    #[test]
    fn test_modified_instrument_is_reloaded() {
        let (mut processor, controller, loader) = setup();
        loader.put("kit", &[60, 62, 64], SystemTime::UNIX_EPOCH + Duration::from_secs(1));

        block(&mut processor, &[], &[]);
        block(&mut processor, &[], &[]);
        let notification = wait_for(&controller, |n| matches!(n, Notification::ReloadChecked { .. }));
        assert_eq!(
            notification,
            Some(Notification::ReloadChecked {
                reloaded: true,
                ok: true
            })
        );
        assert_eq!(controller.with_sampler(|s| s.num_regions()), 3);
    }

    #[test]
    fn test_requested_load_through_worker() {
        let (mut processor, controller, loader) = setup();
        loader.put("other", &[40], SystemTime::UNIX_EPOCH);
        controller.request_load("other").unwrap();
        let notification = wait_for(&controller, |n| {
            matches!(n, Notification::InstrumentLoaded { .. })
        });
        assert_eq!(
            notification,
            Some(Notification::InstrumentLoaded {
                path: PathBuf::from("other"),
                regions: 1
            })
        );
        assert_eq!(controller.instrument_path(), Some(PathBuf::from("other")));
        processor.stop();
        assert_eq!(processor.pending_messages(), 0);
    }
}
