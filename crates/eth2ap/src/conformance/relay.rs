use std::{
    num::NonZeroUsize,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use super::mocks::{MockWired, MockWireless, TestAlloc, init_logging, wait_for};
use crate::{
    context::BridgeContext,
    driver::TxError,
    forward::{EthToWifi, ForwardError, ReceiveSink, WifiToEth},
    queue::relay_queue,
    worker::{BackoffPolicy, RelayWorker, WorkerState},
};

struct Rig {
    ctx: Arc<BridgeContext>,
    wired: Arc<MockWired>,
    wireless: Arc<MockWireless>,
    eth: Arc<EthToWifi>,
    wifi: WifiToEth<MockWired>,
    worker: RelayWorker<MockWireless>,
    alloc: Arc<TestAlloc>,
}

fn rig(capacity: usize) -> Rig {
    init_logging();
    let ctx = Arc::new(BridgeContext::new());
    let wired = MockWired::new();
    let wireless = MockWireless::new();
    let (prod, cons) = relay_queue(
        NonZeroUsize::new(capacity).unwrap(),
        Duration::from_millis(10),
    );
    let eth = Arc::new(EthToWifi::new(prod, ctx.clone()));
    let wifi = WifiToEth::new(wired.clone(), ctx.clone());
    let worker = RelayWorker::new(cons, wireless.clone(), ctx.clone())
        .with_dequeue_timeout(Duration::from_millis(5));
    Rig {
        ctx,
        wired,
        wireless,
        eth,
        wifi,
        worker,
        alloc: TestAlloc::new(),
    }
}

#[test]
fn five_frames_relayed_in_order() {
    let r = rig(40);
    r.ctx.gates().set_wireless_peer_present(true);

    for tag in b"ABCDE" {
        r.eth.receive(r.alloc.frame(*tag, 60)).unwrap();
    }
    // nothing is released while the frames sit in the queue
    assert_eq!(r.alloc.released_count(), 0);

    for _ in 0..5 {
        assert!(r.worker.poll());
    }
    assert!(!r.worker.poll());

    assert_eq!(r.wireless.tx.sent_tags(), b"ABCDE".to_vec());
    assert_eq!(r.alloc.released_tags(), b"ABCDE".to_vec());
    assert_eq!(r.worker.state(), WorkerState::Idle);

    let stats = r.ctx.stats().snapshot();
    assert_eq!(stats.eth_rx, 5);
    assert_eq!(stats.wifi_tx_ok, 5);
    assert_eq!(stats.dropped(), 0);
}

#[test]
fn full_queue_rejects_and_releases() {
    let r = rig(2);
    r.ctx.gates().set_wireless_peer_present(true);

    // worker stalled: nobody polls
    assert_eq!(r.eth.receive(r.alloc.frame(1, 10)), Ok(()));
    assert_eq!(r.eth.receive(r.alloc.frame(2, 10)), Ok(()));
    assert_eq!(
        r.eth.receive(r.alloc.frame(3, 10)),
        Err(ForwardError::QueueFull)
    );

    assert_eq!(r.alloc.released_tags(), vec![3]);
    assert_eq!(r.wireless.tx.attempts(), 0);
    assert_eq!(r.ctx.stats().snapshot().dropped_queue_full, 1);

    // once the worker catches up, the two queued frames still go out
    assert!(r.worker.poll());
    assert!(r.worker.poll());
    assert_eq!(r.wireless.tx.sent_tags(), vec![1, 2]);
    assert_eq!(r.alloc.released_tags(), vec![3, 1, 2]);
}

#[test]
fn closed_queue_releases() {
    let r = rig(4);
    let Rig {
        eth, worker, alloc, ..
    } = r;
    drop(worker);
    assert_eq!(eth.receive(alloc.frame(9, 10)), Err(ForwardError::Closed));
    assert_eq!(alloc.released_tags(), vec![9]);
}

#[test]
fn frame_goes_stale_when_peer_leaves() {
    let r = rig(4);
    r.ctx.gates().set_wireless_peer_present(true);
    r.eth.receive(r.alloc.frame(b'F', 32)).unwrap();

    // peer disassociates between enqueue and dequeue
    r.ctx.gates().set_wireless_peer_present(false);
    assert!(r.worker.poll());

    assert_eq!(r.wireless.tx.attempts(), 0);
    assert_eq!(r.alloc.released_tags(), vec![b'F']);
    assert_eq!(r.ctx.stats().snapshot().dropped_stale, 1);
}

#[test]
fn empty_frames_are_never_sent() {
    let r = rig(4);
    r.ctx.gates().set_wireless_peer_present(true);
    r.eth.receive(r.alloc.frame(0, 0)).unwrap();
    assert!(r.worker.poll());
    assert_eq!(r.wireless.tx.attempts(), 0);
    assert_eq!(r.alloc.released_count(), 1);
}

#[test]
fn backoff_gives_up_within_budget() {
    let r = rig(4);
    r.ctx.gates().set_wireless_peer_present(true);
    r.wireless.tx.always_fail(TxError::Busy);

    r.eth.receive(r.alloc.frame(7, 100)).unwrap();
    r.eth.receive(r.alloc.frame(8, 100)).unwrap();

    let start = Instant::now();
    assert!(r.worker.poll());
    let took = start.elapsed();

    // one send, then a retry after each of 0, 2, ..., 18 ms
    assert_eq!(r.wireless.tx.attempts(), 11);
    let slept: Duration = BackoffPolicy::default().delays().sum();
    assert!(slept <= Duration::from_millis(100));
    assert!(took >= slept);
    assert!(took < Duration::from_millis(500), "backoff took {took:?}");

    // dropped, not requeued: the next frame is up next
    assert_eq!(r.alloc.released_tags(), vec![7]);
    assert_eq!(r.worker.state(), WorkerState::Idle);
    let stats = r.ctx.stats().snapshot();
    assert_eq!(stats.dropped_wifi_tx, 1);
    assert_eq!(stats.wifi_retries, 10);

    r.wireless.tx.script([Ok(())]);
    assert!(r.worker.poll());
    assert_eq!(r.wireless.tx.sent_tags(), vec![8]);
    assert_eq!(r.alloc.released_tags(), vec![7, 8]);
}

#[test]
fn backoff_recovers_after_transient_failure() {
    let r = rig(4);
    r.ctx.gates().set_wireless_peer_present(true);
    r.wireless
        .tx
        .script([Err(TxError::Busy), Err(TxError::Busy), Ok(())]);

    r.eth.receive(r.alloc.frame(5, 64)).unwrap();
    assert!(r.worker.poll());

    assert_eq!(r.wireless.tx.attempts(), 3);
    assert_eq!(r.wireless.tx.sent_tags(), vec![5]);
    assert_eq!(r.alloc.released_count(), 1);
    let stats = r.ctx.stats().snapshot();
    assert_eq!(stats.wifi_retries, 2);
    assert_eq!(stats.wifi_tx_ok, 1);
}

#[test]
fn wireless_frames_need_wired_link() {
    let r = rig(4);

    // wired link down: dropped, never transmitted
    assert_eq!(r.wifi.receive(r.alloc.frame(1, 20)), Ok(()));
    assert_eq!(r.wired.tx.attempts(), 0);
    assert_eq!(r.alloc.released_tags(), vec![1]);

    r.ctx.gates().set_wired_connected(true);
    assert_eq!(r.wifi.receive(r.alloc.frame(2, 20)), Ok(()));
    assert_eq!(r.wired.tx.sent_tags(), vec![2]);
    assert_eq!(r.alloc.released_tags(), vec![1, 2]);

    let stats = r.ctx.stats().snapshot();
    assert_eq!(stats.wifi_rx, 2);
    assert_eq!(stats.dropped_wired_down, 1);
    assert_eq!(stats.eth_tx_ok, 1);
}

#[test]
fn wired_transmit_failure_is_not_retried() {
    let r = rig(4);
    r.ctx.gates().set_wired_connected(true);
    r.wired.tx.always_fail(TxError::Driver(-1));

    // still Ok towards the wireless driver
    assert_eq!(r.wifi.receive(r.alloc.frame(3, 20)), Ok(()));
    assert_eq!(r.wired.tx.attempts(), 1);
    assert_eq!(r.alloc.released_tags(), vec![3]);
    assert_eq!(r.ctx.stats().snapshot().eth_tx_failed, 1);
}

#[test]
fn threaded_producers_keep_order_and_release_everything() {
    const PER_PRODUCER: u8 = 50;

    let r = rig(8);
    r.ctx.gates().set_wireless_peer_present(true);
    let Rig {
        ctx,
        wireless,
        eth,
        worker,
        alloc,
        ..
    } = r;
    let handle = worker.spawn().unwrap();

    let producers: Vec<_> = [0u8, 100u8]
        .into_iter()
        .map(|base| {
            let eth = eth.clone();
            let alloc = alloc.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    // full-queue drops are fine here, the release count
                    // below still has to add up
                    let _ = eth.receive(alloc.frame(base + i, 64));
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    let total = 2 * PER_PRODUCER as usize;
    assert!(wait_for(|| alloc.released_count() == total));
    handle.join();
    assert_eq!(alloc.released_count(), total);

    // each producer's frames went out in the order it sent them
    let sent = wireless.tx.sent_tags();
    for base in [0u8, 100u8] {
        let mine: Vec<u8> = sent
            .iter()
            .copied()
            .filter(|t| (base..base + PER_PRODUCER).contains(t))
            .collect();
        assert!(mine.windows(2).all(|w| w[0] < w[1]), "{mine:?}");
    }

    let stats = ctx.stats().snapshot();
    assert_eq!(stats.eth_rx, total as u64);
    assert_eq!(stats.wifi_tx_ok + stats.dropped(), total as u64);
}

#[test]
fn shutdown_releases_queued_frames() {
    let r = rig(16);
    let Rig {
        ctx,
        wireless,
        eth,
        worker,
        alloc,
        ..
    } = r;
    ctx.gates().set_wireless_peer_present(true);
    wireless.tx.always_fail(TxError::Busy);
    for tag in 0..10 {
        eth.receive(alloc.frame(tag, 64)).unwrap();
    }

    let handle = worker.spawn().unwrap();
    assert!(!handle.is_finished());
    handle.stop();
    assert!(wait_for(|| handle.is_finished()));
    handle.join();

    // whether sent, dropped after backoff or drained, each one comes back once
    assert_eq!(alloc.released_count(), 10);
    let mut tags = alloc.released_tags();
    tags.sort_unstable();
    assert_eq!(tags, (0..10).collect::<Vec<u8>>());
    assert_eq!(eth.receive(alloc.frame(99, 8)), Err(ForwardError::Closed));
    assert_eq!(alloc.released_count(), 11);
}
