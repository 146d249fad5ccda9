//! The background worker thread.
//!
//! The audio thread owns a [`WorkerBridge`]: it posts [`Message`] frames and
//! polls [`Response`] frames, never waiting on either. The worker thread
//! blocks on its queue, handles one frame at a time and may answer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::messages::{Message, Response};
use super::queue::{self, FrameReceiver, FrameSender, Waker};
use crate::error::{Error, Result};

/// Work performed on the worker thread.
pub trait MessageHandler: Send + 'static {
    fn handle(&mut self, message: Message, responses: &FrameSender<Response>);
}

/// Audio-thread side of the worker.
pub struct WorkerBridge {
    to_worker: FrameSender<Message>,
    from_worker: FrameReceiver<Response>,
    waker: Waker,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<usize>>,
}

impl WorkerBridge {
    /// Start the worker thread with queues of `capacity` bytes each way.
    pub fn spawn<H: MessageHandler>(capacity: usize, mut handler: H) -> Result<Self> {
        let (to_worker, mut worker_rx) = queue::channel::<Message>(capacity);
        let (responses, from_worker) = queue::channel::<Response>(capacity);
        let waker = worker_rx.wake_handle();
        let running = Arc::new(AtomicBool::new(true));

        let thread_running = running.clone();
        let thread = thread::Builder::new()
            .name("sampler-worker".to_string())
            .spawn(move || {
                log::info!("Sampler worker started");
                while thread_running.load(Ordering::Acquire) {
                    match worker_rx.recv_blocking() {
                        Ok(Some(message)) => handler.handle(message, &responses),
                        Ok(None) => {}
                        Err(e) => log::warn!("Worker queue: {}", e),
                    }
                }
                let discarded = worker_rx.drain();
                log::info!("Sampler worker stopped, {} pending messages discarded", discarded);
                discarded
            })
            .map_err(|e| Error::Worker(format!("failed to spawn worker thread: {}", e)))?;

        Ok(Self {
            to_worker,
            from_worker,
            waker,
            running,
            thread: Some(thread),
        })
    }

    /// Post a message without blocking.
    pub fn post(&self, message: &Message) -> Result<()> {
        self.to_worker.try_send(message)
    }

    /// A sender for threads other than the audio thread.
    pub fn sender(&self) -> FrameSender<Message> {
        self.to_worker.clone()
    }

    /// Next response, if any. Never blocks.
    pub fn poll(&mut self) -> Option<Response> {
        match self.from_worker.try_recv() {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Dropping worker response: {}", e);
                None
            }
        }
    }

    /// Messages posted and not yet taken by the worker.
    pub fn pending(&self) -> usize {
        self.to_worker.pending()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop the worker and wait for it. Messages it has not taken yet are
    /// discarded; returns how many.
    pub fn stop(&mut self) -> usize {
        let Some(thread) = self.thread.take() else {
            return 0;
        };
        self.running.store(false, Ordering::Release);
        self.waker.wake();
        match thread.join() {
            Ok(discarded) => discarded,
            Err(_) => {
                log::error!("Sampler worker panicked");
                0
            }
        }
    }
}

impl Drop for WorkerBridge {
    fn drop(&mut self) {
        self.stop();
    }
}
