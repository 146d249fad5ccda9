//! Background worker.
//!
//! Work the audio thread must not do itself (voice pool changes, instrument
//! reloads, host notifications) is posted as framed messages to a dedicated
//! thread:
//!
//! ```text
//! audio thread --Message frames--> worker thread --Notification--> host
//!              <--Response frames--
//! ```

pub mod bridge;
pub mod loader;
pub mod messages;
pub mod queue;
pub mod semaphore;

pub use bridge::{MessageHandler, WorkerBridge};
pub use loader::{InstrumentLoader, InstrumentSlot, SamplerWorker};
pub use messages::{Frame, Message, Notification, Response};
pub use queue::{FrameReceiver, FrameSender};
pub use semaphore::Semaphore;
