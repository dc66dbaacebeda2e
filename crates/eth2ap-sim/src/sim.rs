//! Simulated interface drivers
//!
//! Both sides are lossy: each transmit fails with a configurable
//! probability, the way a real radio reports a full TX buffer.

use std::sync::Arc;

use eth2ap::{
    FrameBuffer, MacAddr, ReceiveSink, WiredDriver, WirelessDriver,
    config::AccessPointConfig,
    driver::{DriverError, TxError},
    forward::ForwardError,
    frame::Release,
};
use log::{debug, trace};
use mutex::{BlockingMutex, raw_impls::cs::CriticalSectionRawMutex};
use portable_atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use rand::Rng;

pub const SIM_ETHERTYPE: u16 = 0x88B5;

type SinkSlot = BlockingMutex<CriticalSectionRawMutex, Option<Arc<dyn ReceiveSink>>>;

/// Hands out receive buffers and tracks how many are still in flight
pub struct FramePool {
    name: &'static str,
    outstanding: AtomicUsize,
    allocated: AtomicU64,
}

impl FramePool {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            outstanding: AtomicUsize::new(0),
            allocated: AtomicU64::new(0),
        })
    }

    pub fn alloc(self: &Arc<Self>, data: Vec<u8>) -> FrameBuffer {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        self.allocated.fetch_add(1, Ordering::Relaxed);
        let hook: Arc<dyn Release> = self.clone();
        FrameBuffer::with_release(data, hook)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Buffers handed out and not yet returned
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl Release for FramePool {
    fn release(&self, _data: Vec<u8>) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Build a small Ethernet II frame carrying a sequence number
pub fn ethernet_frame(dst: MacAddr, src: MacAddr, seq: u32, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len.max(18));
    out.extend_from_slice(&dst.octets());
    out.extend_from_slice(&src.octets());
    out.extend_from_slice(&SIM_ETHERTYPE.to_be_bytes());
    out.extend_from_slice(&seq.to_be_bytes());
    out.resize(len.max(18), 0);
    out
}

fn lossy(rate: f64) -> bool {
    rate > 0.0 && rand::rng().random_bool(rate)
}

// ---- SimWired ----

pub struct SimWired {
    mac: MacAddr,
    loss: f64,
    sink: SinkSlot,
    running: AtomicBool,
    sent: AtomicU64,
    pub pool: Arc<FramePool>,
}

impl SimWired {
    pub fn new(mac: MacAddr, loss: f64) -> Arc<Self> {
        Arc::new(Self {
            mac,
            loss: loss.clamp(0.0, 1.0),
            sink: BlockingMutex::new(None),
            running: AtomicBool::new(false),
            sent: AtomicU64::new(0),
            pool: FramePool::new("wired"),
        })
    }

    /// A frame arrives on the wire.
    ///
    /// Returns `None` if nobody was listening; the buffer is freed then.
    pub fn inject(&self, data: Vec<u8>) -> Option<Result<(), ForwardError>> {
        if !self.running.load(Ordering::Acquire) {
            return None;
        }
        let sink = self.sink.with_lock(|s| s.clone())?;
        Some(sink.receive(self.pool.alloc(data)))
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl WiredDriver for SimWired {
    fn transmit(&self, frame: &[u8]) -> Result<(), TxError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(TxError::NotStarted);
        }
        if lossy(self.loss) {
            return Err(TxError::Driver(-1));
        }
        trace!("wired tx {} bytes", frame.len());
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn hardware_address(&self) -> MacAddr {
        self.mac
    }

    fn set_promiscuous(&self, enabled: bool) -> Result<(), DriverError> {
        debug!("wired promiscuous: {enabled}");
        Ok(())
    }

    fn set_rx_sink(&self, sink: Option<Arc<dyn ReceiveSink>>) {
        self.sink.with_lock(|s| *s = sink);
    }

    fn start(&self) -> Result<(), DriverError> {
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) -> Result<(), DriverError> {
        self.running.store(false, Ordering::Release);
        Ok(())
    }
}

// ---- SimWireless ----

pub struct SimWireless {
    mac: BlockingMutex<CriticalSectionRawMutex, MacAddr>,
    busy_rate: f64,
    sink: SinkSlot,
    running: AtomicBool,
    sent: AtomicU64,
    pub pool: Arc<FramePool>,
}

impl SimWireless {
    pub fn new(factory_mac: MacAddr, busy_rate: f64) -> Arc<Self> {
        Arc::new(Self {
            mac: BlockingMutex::new(factory_mac),
            busy_rate: busy_rate.clamp(0.0, 1.0),
            sink: BlockingMutex::new(None),
            running: AtomicBool::new(false),
            sent: AtomicU64::new(0),
            pool: FramePool::new("wireless"),
        })
    }

    /// A peer sends a frame to the access point
    pub fn inject(&self, data: Vec<u8>) -> Option<Result<(), ForwardError>> {
        if !self.running.load(Ordering::Acquire) {
            return None;
        }
        let sink = self.sink.with_lock(|s| s.clone())?;
        Some(sink.receive(self.pool.alloc(data)))
    }

    pub fn mac(&self) -> MacAddr {
        self.mac.with_lock(|m| *m)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl WirelessDriver for SimWireless {
    fn transmit(&self, frame: &[u8]) -> Result<(), TxError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(TxError::NotStarted);
        }
        if lossy(self.busy_rate) {
            return Err(TxError::Busy);
        }
        trace!("wireless tx {} bytes", frame.len());
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn configure(&self, ap: &AccessPointConfig) -> Result<(), DriverError> {
        debug!(
            "AP ssid={} channel={} auth={:?} max_connections={}",
            ap.ssid, ap.channel, ap.auth, ap.max_connections
        );
        Ok(())
    }

    fn set_mac(&self, mac: MacAddr) -> Result<(), DriverError> {
        if self.running.load(Ordering::Acquire) {
            return Err(DriverError::InvalidState);
        }
        self.mac.with_lock(|m| *m = mac);
        Ok(())
    }

    fn set_rx_sink(&self, sink: Option<Arc<dyn ReceiveSink>>) {
        self.sink.with_lock(|s| *s = sink);
    }

    fn start(&self) -> Result<(), DriverError> {
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) -> Result<(), DriverError> {
        self.running.store(false, Ordering::Release);
        Ok(())
    }
}
