//! Mock drivers and allocators for exercising the bridge
//!
//! Every frame handed out by a [`TestAlloc`] is tagged, and every release is
//! recorded, so tests can check that each frame comes back exactly once.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use crate::{
    config::AccessPointConfig,
    driver::{DriverError, MacAddr, TxError, WiredDriver, WirelessDriver},
    forward::{ForwardError, ReceiveSink},
    frame::{FrameBuffer, Release},
};

pub const WIRED_MAC: MacAddr = MacAddr::new([0x02, 0xE7, 0x40, 0x00, 0x00, 0x01]);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Wait up to a second for `f` to hold
pub fn wait_for(mut f: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(1) {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    f()
}

/// An allocator that records every release
#[derive(Default)]
pub struct TestAlloc {
    released: Mutex<Vec<Vec<u8>>>,
}

impl Release for TestAlloc {
    fn release(&self, data: Vec<u8>) {
        self.released.lock().unwrap().push(data);
    }
}

impl TestAlloc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A frame whose payload is `tag` repeated `len` times
    pub fn frame(self: &Arc<Self>, tag: u8, len: usize) -> FrameBuffer {
        let hook: Arc<dyn Release> = self.clone();
        FrameBuffer::with_release(vec![tag; len], hook)
    }

    pub fn released_count(&self) -> usize {
        self.released.lock().unwrap().len()
    }

    /// Tags of released frames, in release order
    pub fn released_tags(&self) -> Vec<u8> {
        self.released
            .lock()
            .unwrap()
            .iter()
            .filter_map(|f| f.first().copied())
            .collect()
    }
}

/// Shared recording of a transmit primitive
#[derive(Default)]
pub struct TxLog {
    sent: Mutex<Vec<Vec<u8>>>,
    attempts: Mutex<usize>,
    /// Results to return, in order, before falling back to `fallback`
    script: Mutex<VecDeque<Result<(), TxError>>>,
    fallback: Mutex<Option<TxError>>,
}

impl TxLog {
    fn transmit(&self, frame: &[u8]) -> Result<(), TxError> {
        *self.attempts.lock().unwrap() += 1;
        let res = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| match *self.fallback.lock().unwrap() {
                Some(e) => Err(e),
                None => Ok(()),
            });
        if res.is_ok() {
            self.sent.lock().unwrap().push(frame.to_vec());
        }
        res
    }

    /// Tags of successfully transmitted frames, in order
    pub fn sent_tags(&self) -> Vec<u8> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|f| f.first().copied())
            .collect()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    /// Queue up results for the next transmits
    pub fn script(&self, results: impl IntoIterator<Item = Result<(), TxError>>) {
        self.script.lock().unwrap().extend(results);
    }

    /// Fail every unscripted transmit with `err`
    pub fn always_fail(&self, err: TxError) {
        *self.fallback.lock().unwrap() = Some(err);
    }
}

#[derive(Default)]
pub struct MockWired {
    pub tx: TxLog,
    pub sink: Mutex<Option<Arc<dyn ReceiveSink>>>,
    pub promiscuous: Mutex<Option<bool>>,
    pub started: Mutex<usize>,
    pub stopped: Mutex<usize>,
    pub fail_start: Mutex<Option<DriverError>>,
}

impl MockWired {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Feed a frame into whatever sink the bridge installed.
    ///
    /// Without a sink the "driver" frees the frame itself.
    pub fn deliver(&self, frame: FrameBuffer) -> Option<Result<(), ForwardError>> {
        let sink = self.sink.lock().unwrap().clone();
        sink.map(|s| s.receive(frame))
    }

    pub fn has_sink(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }
}

impl WiredDriver for MockWired {
    fn transmit(&self, frame: &[u8]) -> Result<(), TxError> {
        self.tx.transmit(frame)
    }

    fn hardware_address(&self) -> MacAddr {
        WIRED_MAC
    }

    fn set_promiscuous(&self, enabled: bool) -> Result<(), DriverError> {
        *self.promiscuous.lock().unwrap() = Some(enabled);
        Ok(())
    }

    fn set_rx_sink(&self, sink: Option<Arc<dyn ReceiveSink>>) {
        *self.sink.lock().unwrap() = sink;
    }

    fn start(&self) -> Result<(), DriverError> {
        if let Some(e) = *self.fail_start.lock().unwrap() {
            return Err(e);
        }
        *self.started.lock().unwrap() += 1;
        Ok(())
    }

    fn stop(&self) -> Result<(), DriverError> {
        *self.stopped.lock().unwrap() += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct MockWireless {
    pub tx: TxLog,
    pub sink: Mutex<Option<Arc<dyn ReceiveSink>>>,
    pub ap: Mutex<Option<AccessPointConfig>>,
    pub mac: Mutex<Option<MacAddr>>,
    pub running: Mutex<bool>,
    pub starts: Mutex<usize>,
    pub stops: Mutex<usize>,
    pub fail_configure: Mutex<Option<DriverError>>,
    pub fail_start: Mutex<Option<DriverError>>,
    pub fail_set_mac: Mutex<Option<DriverError>>,
}

impl MockWireless {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deliver(&self, frame: FrameBuffer) -> Option<Result<(), ForwardError>> {
        let sink = self.sink.lock().unwrap().clone();
        sink.map(|s| s.receive(frame))
    }

    pub fn has_sink(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock().unwrap()
    }
}

impl WirelessDriver for MockWireless {
    fn transmit(&self, frame: &[u8]) -> Result<(), TxError> {
        self.tx.transmit(frame)
    }

    fn configure(&self, ap: &AccessPointConfig) -> Result<(), DriverError> {
        if let Some(e) = *self.fail_configure.lock().unwrap() {
            return Err(e);
        }
        *self.ap.lock().unwrap() = Some(ap.clone());
        Ok(())
    }

    fn set_mac(&self, mac: MacAddr) -> Result<(), DriverError> {
        if let Some(e) = *self.fail_set_mac.lock().unwrap() {
            return Err(e);
        }
        *self.mac.lock().unwrap() = Some(mac);
        Ok(())
    }

    fn set_rx_sink(&self, sink: Option<Arc<dyn ReceiveSink>>) {
        *self.sink.lock().unwrap() = sink;
    }

    fn start(&self) -> Result<(), DriverError> {
        if let Some(e) = *self.fail_start.lock().unwrap() {
            return Err(e);
        }
        *self.starts.lock().unwrap() += 1;
        *self.running.lock().unwrap() = true;
        Ok(())
    }

    fn stop(&self) -> Result<(), DriverError> {
        *self.stops.lock().unwrap() += 1;
        *self.running.lock().unwrap() = false;
        Ok(())
    }
}
