//! Integration tests for AsyncDeferredScheduler on a paused Tokio clock.

use orderflow::config::SchedulerConfig;
use orderflow::core::SchedulerState;
use orderflow::runtime::AsyncDeferredScheduler;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn config() -> SchedulerConfig {
    SchedulerConfig {
        thread_name: "async-scheduler-it".into(),
        shutdown_timeout_ms: 1_000,
    }
}

#[tokio::test(start_paused = true)]
async fn test_fires_in_deadline_order() {
    let scheduler = AsyncDeferredScheduler::start(&config()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    for (secs, label) in [(3, "3s"), (1, "1s"), (2, "2s")] {
        let log = Arc::clone(&log);
        scheduler.call_later(Duration::from_secs(secs), move || {
            log.lock().push(label);
            Ok(())
        });
    }

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(*log.lock(), vec!["1s"]);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(*log.lock(), vec!["1s", "2s", "3s"]);

    scheduler.shutdown().await;
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_fast_entry_overtakes_slow_one() {
    let scheduler = AsyncDeferredScheduler::start(&config()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let start = Instant::now();

    for (millis, label) in [(50, "slow"), (10, "fast")] {
        let log = Arc::clone(&log);
        scheduler.call_later(Duration::from_millis(millis), move || {
            log.lock().push((label, start.elapsed()));
            Ok(())
        });
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    let log = log.lock().clone();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].0, "fast");
    assert!(log[0].1 >= Duration::from_millis(10));
    assert_eq!(log[1].0, "slow");
    assert!(log[1].1 >= Duration::from_millis(50));

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_isolated() {
    let scheduler = AsyncDeferredScheduler::start(&config()).unwrap();

    scheduler.call_later_secs(0.001, || anyhow::bail!("publish failed"));
    scheduler.call_later_secs(0.002, || panic!("handler bug"));
    scheduler.call_later_secs(0.003, || Ok(()));

    tokio::time::sleep(Duration::from_millis(10)).await;
    scheduler.shutdown().await;

    let stats = scheduler.stats();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.executed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_discards_and_rejects() {
    let scheduler = AsyncDeferredScheduler::start(&config()).unwrap();
    let fired = Arc::new(Mutex::new(0_u32));

    for _ in 0..3 {
        let fired = Arc::clone(&fired);
        scheduler.call_later(Duration::from_secs(60), move || {
            *fired.lock() += 1;
            Ok(())
        });
    }
    assert_eq!(scheduler.pending(), 3);
    scheduler.shutdown().await;

    let late = Arc::clone(&fired);
    scheduler.call_later(Duration::ZERO, move || {
        *late.lock() += 1;
        Ok(())
    });
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(*fired.lock(), 0);
    assert_eq!(scheduler.stats().discarded, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_runs_on_real_time_multi_thread_runtime() {
    let scheduler = AsyncDeferredScheduler::start(&config()).unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();

    scheduler.call_later(Duration::from_millis(20), move || {
        tx.send(()).map_err(|()| anyhow::anyhow!("receiver dropped"))
    });

    tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .expect("task did not fire")
        .unwrap();
    scheduler.shutdown().await;
}
