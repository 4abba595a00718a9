//! Timer multiplexer ordering, cancellation and shutdown on paused time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use daily_nudge::clock::{Clock, TokioClock};
use daily_nudge::timer::TimerMultiplexer;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().unwrap()
}

fn start() -> (TimerMultiplexer, DateTime<Utc>) {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::anchored_at(epoch()));
    (TimerMultiplexer::spawn(clock, CancellationToken::new()), epoch())
}

fn recorder() -> Arc<Mutex<Vec<&'static str>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn at(t0: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    t0 + chrono::Duration::seconds(secs)
}

#[tokio::test(start_paused = true)]
async fn fires_in_deadline_order_regardless_of_insertion() {
    let (timers, t0) = start();
    let log = recorder();
    let token = CancellationToken::new();

    for (secs, name) in [(30, "c"), (10, "a"), (20, "b")] {
        let log = Arc::clone(&log);
        timers.schedule(&token, at(t0, secs), async move {
            log.lock().unwrap().push(name);
        });
    }

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(*log.lock().unwrap(), vec!["a"]);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    assert_eq!(timers.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn equal_deadlines_fire_in_insertion_order() {
    let (timers, t0) = start();
    let log = recorder();
    let token = CancellationToken::new();

    for name in ["first", "second", "third"] {
        let log = Arc::clone(&log);
        timers.schedule(&token, at(t0, 5), async move {
            log.lock().unwrap().push(name);
        });
    }

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(log.lock().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn cancelled_entries_never_run() {
    let (timers, t0) = start();
    let log = recorder();
    let keep = CancellationToken::new();
    let drop_me = CancellationToken::new();

    {
        let log = Arc::clone(&log);
        timers.schedule(&drop_me, at(t0, 10), async move {
            log.lock().unwrap().push("cancelled");
        });
    }
    {
        let log = Arc::clone(&log);
        timers.schedule(&keep, at(t0, 20), async move {
            log.lock().unwrap().push("kept");
        });
    }
    drop_me.cancel();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(*log.lock().unwrap(), vec!["kept"]);
}

#[tokio::test(start_paused = true)]
async fn scheduling_with_cancelled_token_is_ignored() {
    let (timers, t0) = start();
    let token = CancellationToken::new();
    token.cancel();

    timers.schedule(&token, at(t0, 1), async {});
    assert_eq!(timers.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn past_deadline_fires_immediately() {
    let (timers, t0) = start();
    let log = recorder();
    let token = CancellationToken::new();

    let inner = Arc::clone(&log);
    timers.schedule(&token, at(t0, -60), async move {
        inner.lock().unwrap().push("late");
    });

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(*log.lock().unwrap(), vec!["late"]);
}

#[tokio::test(start_paused = true)]
async fn earlier_insert_wakes_a_sleeping_dispatcher() {
    let (timers, t0) = start();
    let log = recorder();
    let token = CancellationToken::new();

    let far = Arc::clone(&log);
    timers.schedule(&token, at(t0, 3600), async move {
        far.lock().unwrap().push("far");
    });
    tokio::time::sleep(Duration::from_secs(1)).await;

    let near = Arc::clone(&log);
    timers.schedule(&token, at(t0, 5), async move {
        near.lock().unwrap().push("near");
    });

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(*log.lock().unwrap(), vec!["near"]);
}

#[tokio::test(start_paused = true)]
async fn firing_task_can_reschedule_itself() {
    let (timers, t0) = start();
    let count = Arc::new(Mutex::new(0u32));
    let token = CancellationToken::new();

    fn arm(
        timers: TimerMultiplexer,
        token: CancellationToken,
        at: DateTime<Utc>,
        count: Arc<Mutex<u32>>,
    ) {
        let next = at + chrono::Duration::seconds(10);
        let handle = timers.clone();
        let cancel = token.clone();
        timers.schedule(&cancel, at, async move {
            *count.lock().unwrap() += 1;
            arm(handle, token, next, count);
        });
    }
    arm(timers.clone(), token.clone(), at(t0, 10), Arc::clone(&count));

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(*count.lock().unwrap(), 3);

    token.cancel();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(*count.lock().unwrap(), 3);
}

#[tokio::test(start_paused = true)]
async fn heap_compacts_cancelled_entries() {
    let (timers, t0) = start();

    for i in 0..200 {
        let token = CancellationToken::new();
        timers.schedule(&token, at(t0, 1000 + i), async {});
        token.cancel();
    }
    assert!(
        timers.pending_len() < 200,
        "cancelled entries should be compacted, got {}",
        timers.pending_len()
    );
}

#[tokio::test(start_paused = true)]
async fn stuck_firing_does_not_delay_later_ones() {
    let (timers, t0) = start();
    let log = recorder();
    let token = CancellationToken::new();

    timers.schedule(&token, at(t0, 1), std::future::pending::<()>());
    let fast = Arc::clone(&log);
    timers.schedule(&token, at(t0, 2), async move {
        fast.lock().unwrap().push("fast");
    });

    tokio::time::sleep(Duration::from_secs(3)).await;
    tokio::task::yield_now().await;
    assert_eq!(*log.lock().unwrap(), vec!["fast"]);
    assert_eq!(timers.in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_in_flight_firings_and_drops_the_rest() {
    let (timers, t0) = start();
    let log = recorder();
    let token = CancellationToken::new();

    let slow = Arc::clone(&log);
    timers.schedule(&token, at(t0, 1), async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        slow.lock().unwrap().push("slow");
    });
    let never = Arc::clone(&log);
    timers.schedule(&token, at(t0, 3600), async move {
        never.lock().unwrap().push("never");
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(timers.in_flight(), 1);

    timers.shutdown().await;
    assert_eq!(*log.lock().unwrap(), vec!["slow"]);
    assert_eq!(timers.pending_len(), 0);
    assert_eq!(timers.in_flight(), 0);
}
