//! The Link State Controller
//!
//! Interface drivers report connectivity changes as [`LinkEvent`]s. The
//! controller turns them into gate updates and driver calls. It tracks two
//! independent state machines:
//!
//! * The wired link, `Down` or `Up`. The access point is only started once
//!   the wired link comes up, wearing the wired port's hardware address. It
//!   is stopped again (evicting all peers) when the wired link goes down.
//! * The wireless peer count. The first peer to associate opens the
//!   wireless to wired direction by registering the receive sink. The last
//!   peer to leave closes it again.
//!
//! The two only interact through the gates read by the forwarding sinks and
//! the relay worker.
//!
//! Events are expected to be delivered one at a time, from whatever thread
//! the platform's event loop runs on. Once the bridge has begun shutting
//! down, events are logged and otherwise ignored.
//!
//! If the access point fails to start when the wired link comes up, the
//! next `WiredUp` retries the start instead of being treated as a
//! duplicate.

use std::sync::Arc;

use portable_atomic::{AtomicBool, Ordering};

use crate::{
    context::BridgeContext,
    debug,
    driver::{DriverError, WiredDriver, WirelessDriver},
    error,
    forward::{ReceiveSink, WifiToEth},
    info, warn,
};

/// Connectivity events from either interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    WiredStarted,
    WiredStopped,
    /// Wired link established
    WiredUp,
    /// Wired link lost
    WiredDown,
    WirelessStarted,
    WirelessStopped,
    /// A wireless peer associated with the access point
    PeerAssociated,
    /// A wireless peer left the access point
    PeerDisassociated,
}

/// The state of a single link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Down,
    Up,
}

/// A driver call made while handling a link event failed
///
/// The gates have already been updated to match the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ControlError {
    /// Starting the access point failed
    WirelessStart(DriverError),
    /// Stopping the access point failed
    WirelessStop(DriverError),
}

pub struct LinkController<W: WiredDriver, A: WirelessDriver> {
    wired: Arc<W>,
    wireless: Arc<A>,
    ctx: Arc<BridgeContext>,
    wifi_sink: Arc<WifiToEth<W>>,
    ap_started: AtomicBool,
}

impl<W: WiredDriver, A: WirelessDriver> LinkController<W, A> {
    pub fn new(wired: Arc<W>, wireless: Arc<A>, ctx: Arc<BridgeContext>) -> Self {
        let wifi_sink = Arc::new(WifiToEth::new(wired.clone(), ctx.clone()));
        Self {
            wired,
            wireless,
            ctx,
            wifi_sink,
            ap_started: AtomicBool::new(false),
        }
    }

    pub fn wired_state(&self) -> LinkState {
        if self.ctx.gates().wired_connected() {
            LinkState::Up
        } else {
            LinkState::Down
        }
    }

    pub fn handle(&self, event: LinkEvent) -> Result<(), ControlError> {
        if self.ctx.is_shut_down() {
            debug!("bridge shut down, ignoring {event:?}");
            return Ok(());
        }
        match event {
            LinkEvent::WiredStarted => {
                info!("Ethernet Started");
                Ok(())
            }
            LinkEvent::WiredStopped => {
                info!("Ethernet Stopped");
                Ok(())
            }
            LinkEvent::WiredUp => self.wired_up(),
            LinkEvent::WiredDown => self.wired_down(),
            LinkEvent::WirelessStarted => {
                info!("Wi-Fi AP started");
                Ok(())
            }
            LinkEvent::WirelessStopped => {
                info!("Wi-Fi AP stopped");
                self.ap_started.store(false, Ordering::Release);
                self.forget_peers();
                Ok(())
            }
            LinkEvent::PeerAssociated => {
                info!("Wi-Fi AP got a station connected");
                self.peer_associated();
                Ok(())
            }
            LinkEvent::PeerDisassociated => {
                info!("Wi-Fi AP got a station disconnected");
                self.peer_disassociated();
                Ok(())
            }
        }
    }

    fn wired_up(&self) -> Result<(), ControlError> {
        if self.ctx.gates().set_wired_connected(true) {
            if self.ap_started.load(Ordering::Acquire) {
                debug!("Ethernet already up");
                return Ok(());
            }
            info!("Ethernet still up, retrying Wi-Fi AP start");
            return self.start_ap();
        }
        info!("Ethernet Link Up");

        let mac = self.wired.hardware_address();
        self.ctx.set_hardware_address(mac);
        if let Err(e) = self.wireless.set_mac(mac) {
            // the AP still comes up, just with its own address
            warn!("setting AP address to {mac} failed: {e:?}");
        } else {
            debug!("AP address set to {mac}");
        }

        self.start_ap()
    }

    fn start_ap(&self) -> Result<(), ControlError> {
        self.wireless.start().map_err(|e| {
            error!("starting Wi-Fi AP failed: {e:?}");
            ControlError::WirelessStart(e)
        })?;
        self.ap_started.store(true, Ordering::Release);
        Ok(())
    }

    fn wired_down(&self) -> Result<(), ControlError> {
        if !self.ctx.gates().set_wired_connected(false) {
            debug!("Ethernet already down");
            return Ok(());
        }
        info!("Ethernet Link Down");

        self.ap_started.store(false, Ordering::Release);
        let res = self.wireless.stop().map_err(|e| {
            error!("stopping Wi-Fi AP failed: {e:?}");
            ControlError::WirelessStop(e)
        });
        // A stopped AP has no peers, whether or not the driver also
        // reports it
        self.forget_peers();
        res
    }

    fn peer_associated(&self) {
        if self.ctx.peer_associated() {
            self.ctx.gates().set_wireless_peer_present(true);
            let sink: Arc<dyn ReceiveSink> = self.wifi_sink.clone();
            self.wireless.set_rx_sink(Some(sink));
            debug!("wireless to wired forwarding enabled");
        }
    }

    fn peer_disassociated(&self) {
        if self.ctx.peer_disassociated() {
            self.close_wireless();
        }
    }

    fn forget_peers(&self) {
        let n = self.ctx.reset_peers();
        if n != 0 {
            debug!("forgetting {n} peers");
            self.close_wireless();
        }
    }

    fn close_wireless(&self) {
        self.ctx.gates().set_wireless_peer_present(false);
        self.wireless.set_rx_sink(None);
        debug!("wireless to wired forwarding disabled");
    }
}
