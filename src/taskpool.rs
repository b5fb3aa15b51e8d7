use crate::error::{Result, ScrapeError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Higher values are admitted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Priority(pub i32);

impl Priority {
    pub const LOW: Priority = Priority(0);
    pub const NORMAL: Priority = Priority(5);
    pub const HIGH: Priority = Priority(10);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub concurrency: usize,
    pub running: usize,
    pub queued: usize,
}

/// Hands out at most `concurrency` running slots; work runs inside the
/// caller's future. A freed slot goes straight to the highest-priority waiter,
/// FIFO among equals.
pub struct TaskPool {
    concurrency: usize,
    state: Mutex<PoolState>,
}

#[derive(Default)]
struct PoolState {
    running: usize,
    queue: BinaryHeap<Waiting>,
    next_seq: u64,
}

struct Waiting {
    priority: Priority,
    seq: u64,
    admit: oneshot::Sender<()>,
}

impl PartialEq for Waiting {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Waiting {}

impl PartialOrd for Waiting {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiting {
    // Max-heap: higher priority first, then the earlier arrival.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A running slot; releasing it admits the next waiter.
struct Slot<'a> {
    pool: &'a TaskPool,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.pool.release();
    }
}

/// A queued claim on a slot. Dropped before it is claimed, it withdraws the
/// waiter, or passes on a slot that was already granted to it.
struct Admission<'a> {
    pool: &'a TaskPool,
    seq: u64,
    admitted: oneshot::Receiver<()>,
    claimed: bool,
}

impl<'a> Admission<'a> {
    fn claim(mut self) -> Slot<'a> {
        self.claimed = true;
        Slot { pool: self.pool }
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.claimed {
            return;
        }
        // Closing first makes the grant and our withdrawal mutually exclusive.
        self.admitted.close();
        if self.admitted.try_recv().is_ok() {
            trace!("[TASKPOOL] task #{} left with a granted slot", self.seq);
            self.pool.release();
        } else {
            self.pool.withdraw(self.seq);
        }
    }
}

impl TaskPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            concurrency: self.concurrency,
            running: state.running,
            queued: state.queue.iter().filter(|w| !w.admit.is_closed()).count(),
        }
    }

    /// Schedules `work` and resolves with its outcome.
    ///
    /// `work` receives the task's token so it can hand it to the network layer.
    /// If `cancel` fires while queued, `work` is never invoked; if it fires while
    /// running, the work future is dropped and its partial output discarded.
    pub async fn add<T, F, Fut>(&self, work: F, priority: Priority, cancel: CancellationToken) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if cancel.is_cancelled() {
            debug!("[TASKPOOL] task cancelled before admission");
            return Err(ScrapeError::Cancelled);
        }

        let _slot = self.acquire(priority, &cancel).await?;
        trace!("[TASKPOOL] {:?} -> {:?} (priority {})", TaskState::Queued, TaskState::Running, priority.0);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ScrapeError::Cancelled),
            result = work(cancel.clone()) => result,
        };

        let settled = match &outcome {
            Ok(_) => TaskState::Succeeded,
            Err(e) if e.is_cancelled() => TaskState::Cancelled,
            Err(_) => TaskState::Failed,
        };
        trace!("[TASKPOOL] {:?} -> {:?}", TaskState::Running, settled);

        outcome
    }

    async fn acquire(&self, priority: Priority, cancel: &CancellationToken) -> Result<Slot<'_>> {
        let (admitted, seq) = {
            let mut state = self.lock();
            if state.running < self.concurrency && state.queue.is_empty() {
                state.running += 1;
                return Ok(Slot { pool: self });
            }

            let (admit, admitted) = oneshot::channel();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queue.push(Waiting { priority, seq, admit });
            trace!("[TASKPOOL] queued task #{} (priority {}, {} waiting)", seq, priority.0, state.queue.len());
            (admitted, seq)
        };

        let mut pending = Admission {
            pool: self,
            seq,
            admitted,
            claimed: false,
        };

        let granted = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = &mut pending.admitted => Some(result.is_ok()),
        };

        match granted {
            Some(true) => Ok(pending.claim()),
            Some(false) => Err(ScrapeError::Cancelled),
            None => {
                debug!("[TASKPOOL] task #{} cancelled while queued", seq);
                Err(ScrapeError::Cancelled)
            }
        }
    }

    fn withdraw(&self, seq: u64) {
        self.lock().queue.retain(|w| w.seq != seq);
    }

    fn release(&self) {
        let mut state = self.lock();
        while let Some(next) = state.queue.pop() {
            // Waiters whose future was dropped are skipped.
            if next.admit.send(()).is_ok() {
                trace!("[TASKPOOL] slot handed to task #{}", next.seq);
                return;
            }
        }
        state.running = state.running.saturating_sub(1);
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
