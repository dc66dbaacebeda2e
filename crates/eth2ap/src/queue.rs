//! The Relay Queue
//!
//! The wired link delivers frames far faster than the radio can send them.
//! The relay queue sits between the two and absorbs bursts, up to a fixed
//! number of frames. When it is full, new frames are turned away instead of
//! growing the queue: unbounded buffering under a sustained rate mismatch
//! would grow latency (and memory) without limit.
//!
//! The queue is split into two halves:
//!
//! * [`RelayProducer`] can be cloned and shared between any number of
//!   receive paths.
//! * [`RelayConsumer`] is unique, and is owned by the relay worker.
//!
//! Both ends block only for a bounded time.

use core::num::NonZeroUsize;
use core::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};

use crate::frame::FrameBuffer;

/// Default number of frames the relay queue can hold
pub const DEFAULT_QUEUE_LEN: usize = 40;
/// Default bounded wait for enqueueing on a full queue
pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// An enqueue attempt failed, ownership of the frame is handed back
#[derive(Debug)]
#[non_exhaustive]
pub enum EnqueueError {
    /// The queue stayed full for the whole enqueue timeout
    Full(FrameBuffer),
    /// The consumer side is gone, nothing will ever dequeue this frame
    Closed(FrameBuffer),
}

impl EnqueueError {
    /// Take back the rejected frame, so it can be released
    pub fn into_frame(self) -> FrameBuffer {
        match self {
            EnqueueError::Full(f) => f,
            EnqueueError::Closed(f) => f,
        }
    }
}

/// Create a new relay queue holding at most `capacity` frames.
///
/// Producers wait at most `enqueue_timeout` for a free slot.
pub fn relay_queue(
    capacity: NonZeroUsize,
    enqueue_timeout: Duration,
) -> (RelayProducer, RelayConsumer) {
    let (tx, rx) = bounded(capacity.get());
    let prod = RelayProducer {
        tx,
        timeout: enqueue_timeout,
    };
    let cons = RelayConsumer { rx };
    (prod, cons)
}

/// The enqueueing half of the relay queue
#[derive(Clone)]
pub struct RelayProducer {
    tx: Sender<FrameBuffer>,
    timeout: Duration,
}

impl RelayProducer {
    /// Append a frame, waiting up to the enqueue timeout for space.
    ///
    /// On failure the frame is returned inside the error, and the caller is
    /// responsible for releasing it.
    pub fn enqueue(&self, frame: FrameBuffer) -> Result<(), EnqueueError> {
        match self.tx.send_timeout(frame, self.timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(f)) => Err(EnqueueError::Full(f)),
            Err(SendTimeoutError::Disconnected(f)) => Err(EnqueueError::Closed(f)),
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        // always Some for a bounded channel
        self.tx.capacity().unwrap_or_default()
    }
}

/// The dequeueing half of the relay queue
///
/// There is only ever one of these per queue.
pub struct RelayConsumer {
    rx: Receiver<FrameBuffer>,
}

impl RelayConsumer {
    /// Wait up to `timeout` for the next frame, in FIFO order.
    ///
    /// `None` is not an error, there was simply nothing to do.
    pub fn dequeue(&self, timeout: Duration) -> Option<FrameBuffer> {
        match self.rx.recv_timeout(timeout) {
            Ok(f) => Some(f),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                // All producers are gone. Keep the bounded wait so the
                // worker loop doesn't spin until it is told to stop.
                std::thread::sleep(timeout);
                None
            }
        }
    }

    /// Release every frame currently queued, returning how many there were.
    pub fn drain(&self) -> usize {
        self.rx.try_iter().map(FrameBuffer::release).count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or_default()
    }
}
