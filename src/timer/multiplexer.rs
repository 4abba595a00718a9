//! Deadline-ordered timer multiplexer.
//!
//! Holds any number of pending "run this future at time T" requests in a
//! binary min-heap and drives them from a single dispatch task. Each
//! request carries a [`CancellationToken`] owned by the caller; a request
//! whose token has been cancelled is dropped without ever being polled.
//!
//! Due requests are spawned onto a [`TaskTracker`] so a slow callback
//! never delays unrelated firings, and [`TimerMultiplexer::shutdown`] can
//! wait for in-flight callbacks to drain.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, Instrument};

use crate::clock::Clock;

/// Heap size below which cancelled entries are never compacted eagerly.
const MIN_COMPACT_LEN: usize = 64;

/// One pending request.
struct Entry {
    deadline: DateTime<Utc>,
    seq: u64,
    cancel: CancellationToken,
    task: BoxFuture<'static, ()>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    /// Reversed so that `BinaryHeap` (a max-heap) pops the earliest
    /// deadline first, ties going to the earlier registration.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    compact_at: usize,
}

impl Queue {
    fn push(
        &mut self,
        deadline: DateTime<Utc>,
        cancel: CancellationToken,
        task: BoxFuture<'static, ()>,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            deadline,
            seq,
            cancel,
            task,
        });

        if self.heap.len() >= self.compact_at.max(MIN_COMPACT_LEN) {
            self.heap.retain(|entry| !entry.cancel.is_cancelled());
            self.compact_at = self.heap.len() * 2;
        }
    }

    /// Pop every entry due at `now`, discarding cancelled ones, and report
    /// how long until the next live deadline.
    fn take_due(&mut self, now: DateTime<Utc>) -> (Vec<Entry>, Option<Duration>) {
        let mut due = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.cancel.is_cancelled() {
                self.heap.pop();
                continue;
            }
            if top.deadline > now {
                let wait = (top.deadline - now).to_std().unwrap_or(Duration::ZERO);
                return (due, Some(wait));
            }
            if let Some(entry) = self.heap.pop() {
                due.push(entry);
            }
        }
        (due, None)
    }
}

struct Inner {
    queue: Mutex<Queue>,
    wake: Notify,
    clock: Arc<dyn Clock>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle to a running timer multiplexer.
#[derive(Clone)]
pub struct TimerMultiplexer {
    inner: Arc<Inner>,
}

impl TimerMultiplexer {
    /// Start the dispatch task.
    ///
    /// The task stops when `cancel` fires or [`shutdown`](Self::shutdown)
    /// is called.
    #[must_use]
    pub fn spawn(clock: Arc<dyn Clock>, cancel: CancellationToken) -> Self {
        let inner = Arc::new(Inner {
            queue: Mutex::new(Queue::default()),
            wake: Notify::new(),
            clock,
            tracker: TaskTracker::new(),
            shutdown: cancel,
            dispatcher: Mutex::new(None),
        });

        let handle = tokio::spawn(
            Self::run(Arc::clone(&inner)).instrument(info_span!("timer_dispatch")),
        );
        *inner
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        Self { inner }
    }

    /// Register `task` to run at or after `deadline`.
    ///
    /// Never blocks and may be called from inside a firing task. If
    /// `cancel` is cancelled before the task starts, it never starts.
    pub fn schedule<F>(&self, cancel: &CancellationToken, deadline: DateTime<Utc>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return;
        }
        self.inner
            .queue()
            .push(deadline, cancel.clone(), task.boxed());
        // notify_one stores a permit, so a wake-up is never lost even if the
        // dispatcher is between its queue check and its wait.
        self.inner.wake.notify_one();
    }

    /// Number of entries currently held, including cancelled ones not yet
    /// discarded.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.queue().heap.len()
    }

    /// Number of firings currently executing.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Stop dispatching and wait for every in-flight firing to finish.
    ///
    /// Entries that have not fired yet are dropped.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let handle = self
            .inner
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.inner.tracker.close();
        self.inner.tracker.wait().await;

        let dropped = {
            let mut queue = self.inner.queue();
            let dropped = queue.heap.len();
            queue.heap.clear();
            dropped
        };
        info!(dropped, "timer multiplexer drained");
    }

    async fn run(inner: Arc<Inner>) {
        loop {
            let (due, wait) = {
                let now = inner.clock.now();
                inner.queue().take_due(now)
            };

            for entry in due {
                let cancel = entry.cancel;
                let task = entry.task;
                let deadline = entry.deadline;
                inner.tracker.spawn(async move {
                    if cancel.is_cancelled() {
                        debug!(%deadline, "timer cancelled before start");
                        return;
                    }
                    task.await;
                });
            }

            let sleep = async {
                match wait {
                    Some(wait) => tokio::time::sleep(wait).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                () = inner.shutdown.cancelled() => {
                    debug!("timer dispatch loop cancelled");
                    return;
                }
                () = inner.wake.notified() => {}
                () = sleep => {}
            }
        }
    }
}
