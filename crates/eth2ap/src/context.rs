//! The Bridge Context
//!
//! All of the state shared between the forwarding sinks, the relay worker
//! and the link controller lives here, in one place, shared by `Arc`.
//!
//! While the bridge runs, every field has a single writer, the
//! [`LinkController`]. Everyone else only reads. Shutdown sets the shutdown
//! flag first, after which the controller writes nothing and shutdown takes
//! over. Reads and writes are atomic, but there is no cross-field
//! consistency: a reader may briefly see one gate newer than the other. The
//! worst that can cause is one extra dropped or stale frame.
//!
//! [`LinkController`]: crate::controller::LinkController

use mutex::{BlockingMutex, raw_impls::cs::CriticalSectionRawMutex};
use portable_atomic::{AtomicBool, AtomicU8, Ordering};

use crate::{driver::MacAddr, stats::RelayStats};

/// The two forwarding gates, one per destination interface
#[derive(Debug, Default)]
pub struct LinkGates {
    wired_connected: AtomicBool,
    wireless_peer_present: AtomicBool,
}

impl LinkGates {
    /// Is the wired link up? Gates wireless to wired forwarding.
    pub fn wired_connected(&self) -> bool {
        self.wired_connected.load(Ordering::Acquire)
    }

    /// Is at least one wireless peer associated? Gates wired to wireless
    /// forwarding.
    pub fn wireless_peer_present(&self) -> bool {
        self.wireless_peer_present.load(Ordering::Acquire)
    }

    /// Returns the previous value
    pub(crate) fn set_wired_connected(&self, val: bool) -> bool {
        self.wired_connected.swap(val, Ordering::AcqRel)
    }

    pub(crate) fn set_wireless_peer_present(&self, val: bool) {
        self.wireless_peer_present.store(val, Ordering::Release);
    }
}

pub struct BridgeContext {
    gates: LinkGates,
    shut_down: AtomicBool,
    peers: AtomicU8,
    hw_addr: BlockingMutex<CriticalSectionRawMutex, Option<MacAddr>>,
    stats: RelayStats,
}

impl BridgeContext {
    pub fn new() -> Self {
        Self {
            gates: LinkGates::default(),
            shut_down: AtomicBool::new(false),
            peers: AtomicU8::new(0),
            hw_addr: BlockingMutex::new(None),
            stats: RelayStats::default(),
        }
    }

    pub fn gates(&self) -> &LinkGates {
        &self.gates
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Has the bridge started shutting down? Link events are ignored from
    /// then on.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Returns whether shutdown had already begun
    pub(crate) fn mark_shut_down(&self) -> bool {
        self.shut_down.swap(true, Ordering::AcqRel)
    }

    /// Number of wireless peers currently associated
    pub fn peer_count(&self) -> u8 {
        self.peers.load(Ordering::Acquire)
    }

    /// The wired hardware address captured on the latest wired link up
    pub fn hardware_address(&self) -> Option<MacAddr> {
        self.hw_addr.with_lock(|addr| *addr)
    }

    pub(crate) fn set_hardware_address(&self, mac: MacAddr) {
        self.hw_addr.with_lock(|addr| *addr = Some(mac));
    }

    /// Count a peer in, returns true on the 0 -> 1 transition
    pub(crate) fn peer_associated(&self) -> bool {
        let prev = self
            .peers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_add(1))
            })
            .unwrap_or_else(|n| n);
        prev == 0
    }

    /// Count a peer out, returns true on the 1 -> 0 transition
    ///
    /// Saturates at zero, a disassociate we never saw associate is ignored.
    pub(crate) fn peer_disassociated(&self) -> bool {
        let res = self
            .peers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        res == Ok(1)
    }

    /// Forget every peer, returning how many there were
    pub(crate) fn reset_peers(&self) -> u8 {
        self.peers.swap(0, Ordering::AcqRel)
    }
}

impl Default for BridgeContext {
    fn default() -> Self {
        Self::new()
    }
}
