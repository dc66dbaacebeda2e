//! Driver Interfaces
//!
//! The bridge never talks to hardware directly. Each side of the bridge is
//! reached through a narrow driver trait, implemented by the platform:
//!
//! * [`WiredDriver`] for the wired (Ethernet) interface
//! * [`WirelessDriver`] for the wireless interface, running as an access point
//!
//! Transmit primitives borrow the frame and never take ownership: the
//! caller keeps the [`FrameBuffer`] and releases it afterwards, whatever the
//! outcome.
//!
//! Receive paths are wired up the other way around: each driver is handed a
//! [`ReceiveSink`] and pushes owned frames into it.
//!
//! [`FrameBuffer`]: crate::frame::FrameBuffer

use core::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{config::AccessPointConfig, forward::ReceiveSink};

/// A six-octet hardware (MAC) address
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(value: [u8; 6]) -> Self {
        Self(value)
    }
}

/// A transmit primitive refused or failed to send a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TxError {
    /// The interface is momentarily busy, e.g. radio contention. Worth a retry.
    Busy,
    /// The interface is not running
    NotStarted,
    /// The frame doesn't fit the interface
    TooLarge,
    /// Any other driver specific failure
    Driver(i32),
}

/// A driver control operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DriverError {
    /// The driver is in the wrong state for this operation
    InvalidState,
    /// The driver rejected an argument
    InvalidArg,
    /// Any other driver specific failure
    Other(i32),
}

/// The wired side of the bridge
pub trait WiredDriver: Send + Sync + 'static {
    /// Send one frame. Does not take ownership, and is never retried.
    fn transmit(&self, frame: &[u8]) -> Result<(), TxError>;
    /// The hardware address burned into (or configured on) the wired port
    fn hardware_address(&self) -> MacAddr;
    fn set_promiscuous(&self, enabled: bool) -> Result<(), DriverError>;
    /// Install (or remove, with `None`) the sink fed by the receive path
    fn set_rx_sink(&self, sink: Option<Arc<dyn ReceiveSink>>);
    fn start(&self) -> Result<(), DriverError>;
    fn stop(&self) -> Result<(), DriverError>;
}

/// The wireless access point side of the bridge
pub trait WirelessDriver: Send + Sync + 'static {
    /// Send one frame. Does not take ownership, and may fail transiently.
    fn transmit(&self, frame: &[u8]) -> Result<(), TxError>;
    /// Apply access point settings. Only called before the service starts.
    fn configure(&self, ap: &AccessPointConfig) -> Result<(), DriverError>;
    fn set_mac(&self, mac: MacAddr) -> Result<(), DriverError>;
    /// Install (or remove, with `None`) the sink fed by the receive path
    fn set_rx_sink(&self, sink: Option<Arc<dyn ReceiveSink>>);
    /// Start the access point service, allowing peers to associate
    fn start(&self) -> Result<(), DriverError>;
    /// Stop the access point service, evicting any associated peers
    fn stop(&self) -> Result<(), DriverError>;
}
