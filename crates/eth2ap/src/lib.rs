#![doc = include_str!("../README.md")]

pub mod bridge;
pub mod config;
pub mod context;
pub mod controller;
pub mod driver;
pub mod forward;
pub mod frame;
pub mod queue;
pub mod stats;
pub mod worker;

#[cfg(test)]
mod conformance;

pub use bridge::{Bridge, StartupError};
pub use config::BridgeConfig;
pub use context::BridgeContext;
pub use controller::{LinkController, LinkEvent};
pub use driver::{MacAddr, WiredDriver, WirelessDriver};
pub use forward::ReceiveSink;
pub use frame::FrameBuffer;

// logging re-exports

#[allow(unused_imports)]
pub(crate) use log::{debug, error, info, trace, warn};
