//! Forwarding Sinks
//!
//! A [`ReceiveSink`] is what an interface driver feeds received frames
//! into. The bridge implements one per direction:
//!
//! * [`EthToWifi`], fed by the wired receive path. It only ever enqueues,
//!   and the relay worker does the actual wireless transmit.
//! * [`WifiToEth`], fed by the wireless receive path. It transmits on the
//!   wired side directly, with no queue: the radio is the slower producer
//!   and can't overrun the wire.
//!
//! Either way, a sink takes ownership of the frame. Before returning, it
//! has either moved the frame onwards (into the queue) or released it.

use std::sync::Arc;

use crate::{
    context::BridgeContext,
    driver::WiredDriver,
    error,
    frame::FrameBuffer,
    queue::{EnqueueError, RelayProducer},
    stats::bump,
    trace,
};

/// Why a sink could not take a frame any further
///
/// The frame has already been released by the time this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ForwardError {
    /// The relay queue stayed full for the whole enqueue timeout
    QueueFull,
    /// The relay worker has shut down
    Closed,
}

/// The receive side of the bridge, as seen by an interface driver
pub trait ReceiveSink: Send + Sync {
    /// Take ownership of a received frame.
    ///
    /// Must decide synchronously whether to forward or release.
    fn receive(&self, frame: FrameBuffer) -> Result<(), ForwardError>;
}

/// Wired to wireless: push received frames onto the relay queue
///
/// This sink does not look at any gate. Wired to wireless forwarding is
/// gated by the relay worker, which drops frames whose peers have left.
pub struct EthToWifi {
    queue: RelayProducer,
    ctx: Arc<BridgeContext>,
}

impl EthToWifi {
    pub fn new(queue: RelayProducer, ctx: Arc<BridgeContext>) -> Self {
        Self { queue, ctx }
    }
}

impl ReceiveSink for EthToWifi {
    fn receive(&self, frame: FrameBuffer) -> Result<(), ForwardError> {
        let stats = self.ctx.stats();
        bump(&stats.eth_rx);

        let err = match self.queue.enqueue(frame) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        let kind = match &err {
            EnqueueError::Full(_) => ForwardError::QueueFull,
            EnqueueError::Closed(_) => ForwardError::Closed,
        };
        let frame = err.into_frame();
        error!("relay enqueue failed ({kind:?}), dropping {} byte frame", frame.len());
        bump(&stats.dropped_queue_full);
        frame.release();
        Err(kind)
    }
}

/// Wireless to wired: transmit received frames on the wired link
///
/// Frames are only forwarded while the wired link is up. Each frame gets a
/// single transmit attempt, since retrying would stall the wireless receive
/// path. Whatever happens, the frame goes back to the wireless driver's
/// allocator before `receive` returns.
pub struct WifiToEth<W: WiredDriver> {
    wired: Arc<W>,
    ctx: Arc<BridgeContext>,
}

impl<W: WiredDriver> WifiToEth<W> {
    pub fn new(wired: Arc<W>, ctx: Arc<BridgeContext>) -> Self {
        Self { wired, ctx }
    }
}

impl<W: WiredDriver> ReceiveSink for WifiToEth<W> {
    fn receive(&self, frame: FrameBuffer) -> Result<(), ForwardError> {
        let stats = self.ctx.stats();
        bump(&stats.wifi_rx);

        if self.ctx.gates().wired_connected() {
            match self.wired.transmit(frame.as_slice()) {
                Ok(()) => bump(&stats.eth_tx_ok),
                Err(e) => {
                    error!("Ethernet send packet failed: {e:?}");
                    bump(&stats.eth_tx_failed);
                }
            }
        } else {
            trace!("wired link down, dropping {} byte frame", frame.len());
            bump(&stats.dropped_wired_down);
        }

        frame.release();
        Ok(())
    }
}
