//! Runs a bridge between two simulated interfaces and prints what happened.
//!
//! Usage: `eth2ap-sim [config.toml]`

mod sim;

use std::{env, sync::Arc, thread, time::Duration};

use color_eyre::{
    Result,
    eyre::{WrapErr, bail},
};
use eth2ap::{Bridge, BridgeConfig, LinkController, LinkEvent, MacAddr};
use log::{info, warn};

use crate::sim::{SimWired, SimWireless, ethernet_frame};

const WIRED_MAC: MacAddr = MacAddr::new([0x02, 0x00, 0x00, 0xE7, 0x40, 0x01]);
const FACTORY_MAC: MacAddr = MacAddr::new([0x02, 0x00, 0x00, 0xE7, 0x40, 0xAA]);
const PEER_MAC: MacAddr = MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x42]);

const WIRED_LOSS: f64 = 0.02;
const WIRELESS_BUSY: f64 = 0.10;
const FRAMES_PER_PHASE: u32 = 100;

type SimController = LinkController<SimWired, SimWireless>;

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = match env::args_os().nth(1) {
        Some(path) => BridgeConfig::load(&path)
            .wrap_err_with(|| format!("loading {}", path.to_string_lossy()))?,
        None => BridgeConfig::default(),
    };

    let wired = SimWired::new(WIRED_MAC, WIRED_LOSS);
    let wireless = SimWireless::new(FACTORY_MAC, WIRELESS_BUSY);
    let bridge = Bridge::start(&cfg, wired.clone(), wireless.clone())?;
    let ctl = bridge.controller();

    event(&ctl, LinkEvent::WiredStarted);
    // nobody on the wireless side yet, these all go nowhere
    traffic(&wired, &wireless, 10);

    event(&ctl, LinkEvent::WiredUp);
    event(&ctl, LinkEvent::WirelessStarted);
    info!("AP is using {}", wireless.mac());
    event(&ctl, LinkEvent::PeerAssociated);
    traffic(&wired, &wireless, FRAMES_PER_PHASE);

    // peer roams away for a bit
    event(&ctl, LinkEvent::PeerDisassociated);
    traffic(&wired, &wireless, FRAMES_PER_PHASE / 4);
    event(&ctl, LinkEvent::PeerAssociated);
    traffic(&wired, &wireless, FRAMES_PER_PHASE);

    // cable pulled: the AP goes down with it
    event(&ctl, LinkEvent::WiredDown);
    traffic(&wired, &wireless, FRAMES_PER_PHASE / 4);
    event(&ctl, LinkEvent::WiredUp);
    event(&ctl, LinkEvent::PeerAssociated);
    traffic(&wired, &wireless, FRAMES_PER_PHASE);

    let stats = bridge.shutdown();

    println!("{}", toml::to_string_pretty(&stats)?);
    println!(
        "wired: {} sent, wireless: {} sent",
        wired.sent(),
        wireless.sent()
    );

    for pool in [&wired.pool, &wireless.pool] {
        info!(
            "{} pool: {} allocated, {} outstanding",
            pool.name(),
            pool.allocated(),
            pool.outstanding()
        );
        if pool.outstanding() != 0 {
            bail!("{} frames leaked from the {} pool", pool.outstanding(), pool.name());
        }
    }
    Ok(())
}

fn event(ctl: &SimController, ev: LinkEvent) {
    if let Err(e) = ctl.handle(ev) {
        warn!("handling {ev:?}: {e:?}");
    }
}

/// Push `n` frames in each direction, concurrently
fn traffic(wired: &Arc<SimWired>, wireless: &Arc<SimWireless>, n: u32) {
    thread::scope(|s| {
        s.spawn(|| {
            for seq in 0..n {
                let frame = ethernet_frame(PEER_MAC, WIRED_MAC, seq, 64);
                if let Some(Err(e)) = wired.inject(frame) {
                    warn!("wired frame {seq} dropped: {e:?}");
                }
                thread::sleep(Duration::from_micros(500));
            }
        });
        s.spawn(|| {
            for seq in 0..n {
                let frame = ethernet_frame(WIRED_MAC, PEER_MAC, seq, 128);
                _ = wireless.inject(frame);
                thread::sleep(Duration::from_millis(1));
            }
        });
    });
    // let the relay worker catch up
    thread::sleep(Duration::from_millis(50));
}
