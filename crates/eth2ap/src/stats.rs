//! Relay counters
//!
//! Per-frame failures never propagate past the bridge, they only show up
//! here (and in the logs).

use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;

macro_rules! relay_counters {
    ($( $(#[$meta:meta])* $name:ident ),+ $(,)?) => {
        /// Live counters, shared by every stage of the bridge
        #[derive(Debug, Default)]
        pub struct RelayStats {
            $( pub(crate) $name: AtomicU64, )+
        }

        /// A point in time copy of [`RelayStats`]
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
        pub struct StatsSnapshot {
            $( $(#[$meta])* pub $name: u64, )+
        }

        impl RelayStats {
            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $( $name: self.$name.load(Ordering::Relaxed), )+
                }
            }
        }
    };
}

relay_counters! {
    /// Frames handed to the wired to wireless sink
    eth_rx,
    /// Frames the wireless interface accepted
    wifi_tx_ok,
    /// Wireless transmit retries made while backing off
    wifi_retries,
    /// Frames turned away by a full (or closed) relay queue
    dropped_queue_full,
    /// Queued frames whose wireless peers left before they were sent
    dropped_stale,
    /// Frames dropped after the wireless backoff budget ran out
    dropped_wifi_tx,
    /// Frames still queued when the relay worker shut down
    dropped_shutdown,
    /// Frames handed to the wireless to wired sink
    wifi_rx,
    /// Frames the wired interface accepted
    eth_tx_ok,
    /// Frames the wired interface refused (never retried)
    eth_tx_failed,
    /// Wireless frames dropped because the wired link was down
    dropped_wired_down,
}

#[inline]
pub(crate) fn bump(ctr: &AtomicU64) {
    ctr.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn bump_by(ctr: &AtomicU64, n: u64) {
    ctr.fetch_add(n, Ordering::Relaxed);
}

impl StatsSnapshot {
    /// Every frame that entered the bridge and was not delivered
    pub fn dropped(&self) -> u64 {
        self.dropped_queue_full
            + self.dropped_stale
            + self.dropped_wifi_tx
            + self.dropped_shutdown
            + self.eth_tx_failed
            + self.dropped_wired_down
    }
}
