//! Bringing the bridge up and down
//!
//! [`Bridge::start`] wires everything together, in this order:
//!
//! 1. The config is validated, then the relay queue and relay worker are
//!    created. Without them the bridge has no wired to wireless path at
//!    all. Any failure here aborts startup before either interface is
//!    touched.
//! 2. The wireless access point is configured, but not started. That waits
//!    for the wired link to come up.
//! 3. The wired driver gets its receive sink and is started.
//!
//! After that, the platform feeds link and peer events into
//! [`Bridge::controller`].

use std::sync::Arc;

use crate::{
    config::{BridgeConfig, ConfigError},
    context::BridgeContext,
    controller::LinkController,
    driver::{DriverError, WiredDriver, WirelessDriver},
    forward::{EthToWifi, ReceiveSink},
    info,
    queue::relay_queue,
    stats::StatsSnapshot,
    warn,
    worker::{RelayWorker, WorkerHandle, WorkerState},
};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("spawning relay worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
    #[error("configuring access point: {0:?}")]
    WirelessConfig(DriverError),
    #[error("starting wired interface: {0:?}")]
    WiredStart(DriverError),
}

pub struct Bridge<W: WiredDriver, A: WirelessDriver> {
    wired: Arc<W>,
    wireless: Arc<A>,
    ctx: Arc<BridgeContext>,
    controller: Arc<LinkController<W, A>>,
    worker: Option<WorkerHandle>,
}

impl<W: WiredDriver, A: WirelessDriver> Bridge<W, A> {
    pub fn start(
        config: &BridgeConfig,
        wired: Arc<W>,
        wireless: Arc<A>,
    ) -> Result<Self, StartupError> {
        config.validate()?;
        let ctx = Arc::new(BridgeContext::new());
        let relay = &config.relay;

        let capacity = relay.capacity()?;
        let (producer, consumer) = relay_queue(capacity, relay.enqueue_timeout());
        let worker = RelayWorker::new(consumer, wireless.clone(), ctx.clone())
            .with_backoff(relay.backoff())
            .with_dequeue_timeout(relay.dequeue_timeout())
            .spawn()?;

        // From here on, an early return drops `worker`, which stops it
        wireless
            .configure(&config.access_point())
            .map_err(StartupError::WirelessConfig)?;

        let eth_sink: Arc<dyn ReceiveSink> = Arc::new(EthToWifi::new(producer, ctx.clone()));
        wired.set_rx_sink(Some(eth_sink));
        if let Err(e) = wired.set_promiscuous(config.ethernet.promiscuous) {
            warn!("setting promiscuous mode failed: {e:?}");
        }
        if let Err(e) = wired.start() {
            wired.set_rx_sink(None);
            return Err(StartupError::WiredStart(e));
        }

        let controller = Arc::new(LinkController::new(
            wired.clone(),
            wireless.clone(),
            ctx.clone(),
        ));
        info!("bridge up, relay queue holds {} frames", relay.queue_len);

        Ok(Self {
            wired,
            wireless,
            ctx,
            controller,
            worker: Some(worker),
        })
    }

    /// The link controller, to be fed by the platform's event loop
    pub fn controller(&self) -> Arc<LinkController<W, A>> {
        self.controller.clone()
    }

    pub fn context(&self) -> &BridgeContext {
        &self.ctx
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats().snapshot()
    }

    pub fn worker_state(&self) -> Option<WorkerState> {
        self.worker.as_ref().map(WorkerHandle::state)
    }

    /// Detach from both interfaces, stop the relay worker, and release
    /// every frame still queued.
    ///
    /// Returns the final counters, including frames released by the drain.
    pub fn shutdown(mut self) -> StatsSnapshot {
        self.shutdown_inner();
        self.ctx.stats().snapshot()
    }

    fn shutdown_inner(&mut self) {
        // stop taking link events before touching the drivers
        if self.ctx.mark_shut_down() {
            return;
        }
        info!("bridge shutting down");

        self.wired.set_rx_sink(None);
        self.wireless.set_rx_sink(None);
        if let Err(e) = self.wired.stop() {
            warn!("stopping wired interface failed: {e:?}");
        }
        if let Err(e) = self.wireless.stop() {
            warn!("stopping Wi-Fi AP failed: {e:?}");
        }
        self.ctx.gates().set_wired_connected(false);
        self.ctx.gates().set_wireless_peer_present(false);
        self.ctx.reset_peers();

        // drains the queue on the way out
        if let Some(worker) = self.worker.take() {
            worker.join();
        }
    }
}

impl<W: WiredDriver, A: WirelessDriver> Drop for Bridge<W, A> {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}
