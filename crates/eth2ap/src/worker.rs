//! The Relay Worker
//!
//! A single dedicated thread drains the relay queue and sends each frame
//! out the wireless interface. The worker is always in one of three
//! states:
//!
//! ```text
//!            dequeue      peer present && len > 0
//!   ┌──────┐ ───────▶ ┌─────────┐  tx fails  ┌─────────┐
//!   │ Idle │          │ Sending │ ─────────▶ │ Backoff │
//!   └──────┘ ◀─────── └─────────┘            └─────────┘
//!      ▲      tx ok                               │
//!      └──────────── tx ok, or budget spent ──────┘
//! ```
//!
//! Frames which can't be sent are dropped, never requeued. Requeueing would
//! reorder later frames, and a frame that keeps failing could retry
//! forever.

use core::time::Duration;
use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use portable_atomic::{AtomicBool, AtomicU8, Ordering};

use crate::{
    context::BridgeContext,
    debug,
    driver::{TxError, WirelessDriver},
    error,
    frame::FrameBuffer,
    queue::RelayConsumer,
    stats::{bump, bump_by},
    trace,
};

/// Default wait on an empty queue before checking for shutdown
pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

const THREAD_NAME: &str = "eth2wifi-relay";

/// Linear backoff for failed wireless transmits
///
/// After a failed send the worker sleeps `0, step, 2*step, ...` and retries
/// after each sleep. It stops once the next sleep would push the total time
/// slept past `budget`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub step: Duration,
    pub budget: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(2),
            budget: Duration::from_millis(100),
        }
    }
}

impl BackoffPolicy {
    /// The sleeps to perform, one per retry
    pub fn delays(&self) -> Delays {
        Delays {
            step: self.step,
            budget: self.budget,
            next: Duration::ZERO,
            spent: Duration::ZERO,
            done: false,
        }
    }
}

/// Iterator over backoff sleeps, see [`BackoffPolicy::delays`]
#[derive(Debug, Clone)]
pub struct Delays {
    step: Duration,
    budget: Duration,
    next: Duration,
    spent: Duration,
    done: bool,
}

impl Iterator for Delays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.done {
            return None;
        }
        let spent = self.spent + self.next;
        if spent > self.budget {
            self.done = true;
            return None;
        }
        let delay = self.next;
        self.spent = spent;
        self.next += self.step;
        // a zero step would never exhaust the budget, allow a single retry
        self.done = self.step.is_zero();
        Some(delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Sending = 1,
    Backoff = 2,
}

impl WorkerState {
    fn from_u8(val: u8) -> Self {
        match val {
            1 => WorkerState::Sending,
            2 => WorkerState::Backoff,
            _ => WorkerState::Idle,
        }
    }
}

/// State shared between the worker thread and its handle
#[derive(Default)]
struct Shared {
    stop: AtomicBool,
    state: AtomicU8,
}

pub struct RelayWorker<A: WirelessDriver> {
    consumer: RelayConsumer,
    wireless: Arc<A>,
    ctx: Arc<BridgeContext>,
    policy: BackoffPolicy,
    dequeue_timeout: Duration,
    shared: Arc<Shared>,
}

impl<A: WirelessDriver> RelayWorker<A> {
    pub fn new(consumer: RelayConsumer, wireless: Arc<A>, ctx: Arc<BridgeContext>) -> Self {
        Self {
            consumer,
            wireless,
            ctx,
            policy: BackoffPolicy::default(),
            dequeue_timeout: DEFAULT_DEQUEUE_TIMEOUT,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Move the worker onto its own thread
    pub fn spawn(self) -> io::Result<WorkerHandle> {
        let shared = self.shared.clone();
        let thread = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || self.run())?;
        Ok(WorkerHandle {
            shared,
            thread: Some(thread),
        })
    }

    /// Relay frames until asked to stop, then release whatever is left queued
    pub fn run(self) {
        debug!("relay worker running");
        while !self.shared.stop.load(Ordering::Acquire) {
            self.poll();
        }
        let left = self.consumer.drain();
        if left != 0 {
            debug!("released {left} queued frames on shutdown");
            bump_by(&self.ctx.stats().dropped_shutdown, left as u64);
        }
        debug!("relay worker stopped");
    }

    /// One Idle cycle: wait for a frame and relay it.
    ///
    /// Returns whether a frame was dequeued.
    pub fn poll(&self) -> bool {
        match self.consumer.dequeue(self.dequeue_timeout) {
            Some(frame) => {
                self.relay(frame);
                true
            }
            None => false,
        }
    }

    fn relay(&self, frame: FrameBuffer) {
        let stats = self.ctx.stats();

        if !self.ctx.gates().wireless_peer_present() || frame.is_empty() {
            trace!("dropping stale {} byte frame", frame.len());
            bump(&stats.dropped_stale);
            frame.release();
            return;
        }

        self.set_state(WorkerState::Sending);
        let mut res = self.wireless.transmit(frame.as_slice());
        if let Err(first) = res {
            res = self.backoff(&frame, first);
        }

        match res {
            Ok(()) => bump(&stats.wifi_tx_ok),
            Err(e) => {
                error!("WiFi send packet failed: {e:?}");
                bump(&stats.dropped_wifi_tx);
            }
        }
        frame.release();
        self.set_state(WorkerState::Idle);
    }

    fn backoff(&self, frame: &FrameBuffer, first: TxError) -> Result<(), TxError> {
        self.set_state(WorkerState::Backoff);
        let mut res = Err(first);
        for delay in self.policy.delays() {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            bump(&self.ctx.stats().wifi_retries);
            res = self.wireless.transmit(frame.as_slice());
            if res.is_ok() {
                break;
            }
        }
        res
    }

    fn set_state(&self, state: WorkerState) {
        self.shared.state.store(state as u8, Ordering::Release);
    }
}

/// Handle to a spawned [`RelayWorker`]
///
/// Dropping the handle stops the worker and waits for it to exit.
pub struct WorkerHandle {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Ask the worker to stop after its current cycle
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Stop the worker and wait for it to drain and exit
    pub fn join(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("relay worker panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
