//! Framed byte queues.
//!
//! Each direction of the worker bridge is a lock-free byte ring carrying
//! `(type: u32, size: u32, payload)` frames, paired with a semaphore that
//! counts complete frames. A frame is committed in one piece before the
//! semaphore is posted, so a receiver that obtained a count always finds a
//! whole frame.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};

use super::messages::{Frame, FrameWriter};
use super::semaphore::Semaphore;
use crate::error::{Error, Result};

/// Bytes taken by the type and size header.
pub const HEADER_SIZE: usize = 8;
/// Receive buffer preallocated by every receiver.
const RECEIVE_BUFFER_SIZE: usize = 1024;

/// Create a frame queue of `capacity` bytes.
pub fn channel<M: Frame>(capacity: usize) -> (FrameSender<M>, FrameReceiver<M>) {
    let (producer, consumer) = RingBuffer::new(capacity.max(HEADER_SIZE));
    let semaphore = Arc::new(Semaphore::new(0));
    let sender = FrameSender {
        capacity: producer.slots(),
        producer: Arc::new(Mutex::new(producer)),
        semaphore: semaphore.clone(),
        _frame: PhantomData,
    };
    let receiver = FrameReceiver {
        consumer,
        semaphore,
        buffer: Vec::with_capacity(RECEIVE_BUFFER_SIZE),
        _frame: PhantomData,
    };
    (sender, receiver)
}

/// Sending end. Clones share the same queue.
pub struct FrameSender<M> {
    capacity: usize,
    producer: Arc<Mutex<Producer<u8>>>,
    semaphore: Arc<Semaphore>,
    _frame: PhantomData<fn(M)>,
}

impl<M> Clone for FrameSender<M> {
    fn clone(&self) -> Self {
        Self {
            capacity: self.capacity,
            producer: self.producer.clone(),
            semaphore: self.semaphore.clone(),
            _frame: PhantomData,
        }
    }
}

impl<M: Frame> FrameSender<M> {
    /// Enqueue without ever blocking. Fails with [`Error::QueueBusy`] if
    /// another sender holds the queue and [`Error::QueueFull`] if the frame
    /// does not fit.
    pub fn try_send(&self, frame: &M) -> Result<()> {
        let mut producer = self.producer.try_lock().ok_or(Error::QueueBusy)?;
        self.write(&mut producer, frame)
    }

    /// Enqueue, waiting for other senders. Never waits for free space.
    ///
    /// A frame larger than the whole queue is a programming error and
    /// panics in debug builds.
    pub fn send(&self, frame: &M) -> Result<()> {
        let size = HEADER_SIZE + frame.payload_len();
        debug_assert!(
            size <= self.capacity,
            "frame of {} bytes can never fit in a {} byte queue",
            size,
            self.capacity
        );
        let mut producer = self.producer.lock();
        self.write(&mut producer, frame)
    }

    /// Frames sent and not yet received.
    pub fn pending(&self) -> usize {
        self.semaphore.count()
    }

    fn write(&self, producer: &mut Producer<u8>, frame: &M) -> Result<()> {
        frame.check()?;
        let payload_len = frame.payload_len();
        let size = HEADER_SIZE + payload_len;
        let free = producer.slots();
        if size > free {
            return Err(Error::QueueFull { size, free });
        }

        let mut chunk = producer
            .write_chunk(size)
            .map_err(|_| Error::QueueFull { size, free })?;
        let (first, second) = chunk.as_mut_slices();
        let mut writer = FrameWriter::new(first, second);
        writer.put_u32(frame.type_id());
        writer.put_u32(payload_len as u32);
        frame.write_payload(&mut writer);
        if writer.written() != size {
            return Err(Error::QueueDesync(format!(
                "frame type {} wrote {} of {} bytes",
                frame.type_id(),
                writer.written(),
                size
            )));
        }
        chunk.commit_all();
        self.semaphore.post();
        Ok(())
    }
}

/// Receiving end.
pub struct FrameReceiver<M> {
    consumer: Consumer<u8>,
    semaphore: Arc<Semaphore>,
    buffer: Vec<u8>,
    _frame: PhantomData<fn() -> M>,
}

impl<M: Frame> FrameReceiver<M> {
    /// Receive one frame if one is ready.
    pub fn try_recv(&mut self) -> Result<Option<M>> {
        if !self.semaphore.try_wait() {
            return Ok(None);
        }
        self.read_frame()
    }

    /// Block until the semaphore is posted, then receive. Returns `None`
    /// when woken without a frame.
    pub fn recv_blocking(&mut self) -> Result<Option<M>> {
        self.semaphore.wait();
        self.read_frame()
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<M>> {
        if !self.semaphore.wait_timeout(timeout) {
            return Ok(None);
        }
        self.read_frame()
    }

    /// Post the semaphore without a frame, releasing a blocked
    /// [`FrameReceiver::recv_blocking`].
    pub fn wake_handle(&self) -> Waker {
        Waker(self.semaphore.clone())
    }

    /// Discard every queued frame and clear the semaphore. Returns the
    /// number of frames discarded.
    pub fn drain(&mut self) -> usize {
        let mut discarded = 0;
        loop {
            match self.read_raw() {
                Ok(Some(_)) => discarded += 1,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Dropping queue content: {}", e);
                    let remaining = self.consumer.slots();
                    if let Ok(chunk) = self.consumer.read_chunk(remaining) {
                        chunk.commit_all();
                    }
                    break;
                }
            }
        }
        self.semaphore.reset();
        discarded
    }

    /// Frames sent and not yet received.
    pub fn pending(&self) -> usize {
        self.semaphore.count()
    }

    fn read_frame(&mut self) -> Result<Option<M>> {
        match self.read_raw()? {
            Some(type_id) => M::decode(type_id, &self.buffer).map(Some),
            None => Ok(None),
        }
    }

    /// Copy the next frame's payload into the receive buffer and return
    /// its type.
    fn read_raw(&mut self) -> Result<Option<u32>> {
        let available = self.consumer.slots();
        if available == 0 {
            return Ok(None);
        }
        if available < HEADER_SIZE {
            return Err(Error::QueueDesync(format!(
                "{} bytes left, less than a frame header",
                available
            )));
        }

        let mut header = [0u8; HEADER_SIZE];
        let chunk = self
            .consumer
            .read_chunk(HEADER_SIZE)
            .map_err(|e| Error::QueueDesync(e.to_string()))?;
        let (first, second) = chunk.as_slices();
        header[..first.len()].copy_from_slice(first);
        header[first.len()..].copy_from_slice(second);
        chunk.commit_all();

        let [t0, t1, t2, t3, s0, s1, s2, s3] = header;
        let type_id = u32::from_le_bytes([t0, t1, t2, t3]);
        let size = u32::from_le_bytes([s0, s1, s2, s3]) as usize;

        let chunk = self.consumer.read_chunk(size).map_err(|_| {
            Error::QueueDesync(format!("frame type {} announces {} bytes", type_id, size))
        })?;
        let (first, second) = chunk.as_slices();
        self.buffer.clear();
        self.buffer.extend_from_slice(first);
        self.buffer.extend_from_slice(second);
        chunk.commit_all();

        Ok(Some(type_id))
    }
}

/// Wakes a receiver blocked in [`FrameReceiver::recv_blocking`].
#[derive(Clone)]
pub struct Waker(Arc<Semaphore>);

impl Waker {
    pub fn wake(&self) {
        self.0.post();
    }
}
