//! Time sources and deferred execution
//!
//! Temporal operators never read the wall clock directly; they go through
//! a [`Scheduler`], so the same pipeline runs on tokio timers in production
//! and on a [`VirtualScheduler`] in tests.

use crate::stream::lock;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

/// Source of "now" for detection and derivation timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub type SharedClock = Arc<dyn Clock>;

pub type Task = Box<dyn FnOnce() + Send>;
pub type RepeatingTask = Box<dyn FnMut() + Send>;

/// Deferred and periodic execution.
pub trait Scheduler: Clock {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;

    /// Run `task` after `initial`, then every `period`.
    fn schedule_repeating(
        &self,
        initial: Duration,
        period: Duration,
        task: RepeatingTask,
    ) -> TimerHandle;
}

pub type SharedScheduler = Arc<dyn Scheduler>;

/// `t + d`, saturating at the largest representable instant.
pub(crate) fn add_duration(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(d)
        .ok()
        .and_then(|delta| t.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Cancellation handle for a scheduled task. Cancelling twice is harmless.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl TimerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Scheduler backed by the tokio timer wheel
#[derive(Clone)]
pub struct TokioScheduler {
    runtime: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self { runtime }
    }

    /// Bind to the runtime of the calling context.
    pub fn current() -> Result<Self, tokio::runtime::TryCurrentError> {
        tokio::runtime::Handle::try_current().map(Self::new)
    }
}

impl Clock for TokioScheduler {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let cancelled = Arc::clone(&handle.cancelled);
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !cancelled.load(Ordering::Acquire) {
                task();
            }
        });
        handle.with_abort(join.abort_handle())
    }

    fn schedule_repeating(
        &self,
        initial: Duration,
        period: Duration,
        mut task: RepeatingTask,
    ) -> TimerHandle {
        let handle = TimerHandle::new();
        let cancelled = Arc::clone(&handle.cancelled);
        let period = period.max(Duration::from_nanos(1));
        let join = self.runtime.spawn(async move {
            let start = tokio::time::Instant::now() + initial;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            debug!("repeating timer started with period {:?}", period);
            loop {
                ticker.tick().await;
                if cancelled.load(Ordering::Acquire) {
                    break;
                }
                task();
            }
        });
        handle.with_abort(join.abort_handle())
    }
}

enum Job {
    Once(Task),
    Repeating {
        period: Duration,
        task: RepeatingTask,
    },
}

struct Pending {
    handle: TimerHandle,
    job: Job,
}

struct VirtualState {
    now: DateTime<Utc>,
    seq: u64,
    queue: BTreeMap<(DateTime<Utc>, u64), Pending>,
}

impl VirtualState {
    fn insert(&mut self, due: DateTime<Utc>, pending: Pending) {
        let seq = self.seq;
        self.seq += 1;
        self.queue.insert((due, seq), pending);
    }
}

/// Manually advanced scheduler for deterministic tests.
///
/// Tasks due at the same instant run in the order they were scheduled;
/// while a task runs, `now()` reports its due time.
#[derive(Clone)]
pub struct VirtualScheduler {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualScheduler {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(VirtualState {
                now: start,
                seq: 0,
                queue: BTreeMap::new(),
            })),
        }
    }

    pub fn advance_by(&self, delta: Duration) {
        let target = add_duration(self.now(), delta);
        self.advance_to(target);
    }

    /// Run every task due at or before `target`, then park the clock there.
    pub fn advance_to(&self, target: DateTime<Utc>) {
        loop {
            let next = {
                let mut state = lock(&self.state);
                match state.queue.first_key_value() {
                    Some((&(due, _), _)) if due <= target => {
                        state.now = state.now.max(due);
                        state.queue.pop_first()
                    }
                    _ => None,
                }
            };
            let Some(((due, _), pending)) = next else { break };
            if pending.handle.is_cancelled() {
                continue;
            }
            match pending.job {
                Job::Once(task) => task(),
                Job::Repeating { period, mut task } => {
                    task();
                    if !pending.handle.is_cancelled() {
                        let again = add_duration(due, period);
                        lock(&self.state).insert(
                            again,
                            Pending {
                                handle: pending.handle,
                                job: Job::Repeating { period, task },
                            },
                        );
                    }
                }
            }
        }
        let mut state = lock(&self.state);
        state.now = state.now.max(target);
    }

    /// Number of scheduled, not yet cancelled tasks.
    pub fn pending(&self) -> usize {
        lock(&self.state)
            .queue
            .values()
            .filter(|p| !p.handle.is_cancelled())
            .count()
    }
}

impl Clock for VirtualScheduler {
    fn now(&self) -> DateTime<Utc> {
        lock(&self.state).now
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut state = lock(&self.state);
        let due = add_duration(state.now, delay);
        state.insert(
            due,
            Pending {
                handle: handle.clone(),
                job: Job::Once(task),
            },
        );
        handle
    }

    fn schedule_repeating(
        &self,
        initial: Duration,
        period: Duration,
        task: RepeatingTask,
    ) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut state = lock(&self.state);
        let due = add_duration(state.now, initial);
        state.insert(
            due,
            Pending {
                handle: handle.clone(),
                job: Job::Repeating {
                    period: period.max(Duration::from_nanos(1)),
                    task,
                },
            },
        );
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |label: &str| -> Task {
            let sink = Arc::clone(&sink);
            let label = label.to_string();
            Box::new(move || sink.lock().unwrap().push(label))
        };
        (log, make)
    }

    #[test]
    fn test_virtual_runs_in_due_order() {
        let scheduler = VirtualScheduler::new(start());
        let (log, task) = recorder();
        scheduler.schedule(Duration::from_secs(2), task("late"));
        scheduler.schedule(Duration::from_secs(1), task("early"));
        scheduler.schedule(Duration::from_secs(1), task("early-2"));

        scheduler.advance_by(Duration::from_millis(999));
        assert!(log.lock().unwrap().is_empty());
        scheduler.advance_by(Duration::from_secs(5));
        assert_eq!(*log.lock().unwrap(), vec!["early", "early-2", "late"]);
        assert_eq!(scheduler.now(), start() + TimeDelta::milliseconds(5999));
    }

    #[test]
    fn test_cancelled_task_never_runs() {
        let scheduler = VirtualScheduler::new(start());
        let (log, task) = recorder();
        let handle = scheduler.schedule(Duration::from_secs(1), task("x"));
        handle.cancel();
        handle.cancel();
        scheduler.advance_by(Duration::from_secs(2));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_repeating_sees_due_time() {
        let scheduler = VirtualScheduler::new(start());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (sink, clock) = (Arc::clone(&seen), scheduler.clone());
        let handle = scheduler.schedule_repeating(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Box::new(move || sink.lock().unwrap().push(clock.now())),
        );
        scheduler.advance_by(Duration::from_millis(3500));
        handle.cancel();
        scheduler.advance_by(Duration::from_secs(10));
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                start() + TimeDelta::seconds(1),
                start() + TimeDelta::seconds(2),
                start() + TimeDelta::seconds(3),
            ]
        );
    }

    #[test]
    fn test_task_scheduled_from_task_runs_in_same_advance() {
        let scheduler = VirtualScheduler::new(start());
        let (log, task) = recorder();
        let inner = scheduler.clone();
        let follow_up = task("follow-up");
        scheduler.schedule(
            Duration::from_secs(1),
            Box::new(move || {
                inner.schedule(Duration::from_secs(1), follow_up);
            }),
        );
        scheduler.advance_by(Duration::from_secs(2));
        assert_eq!(*log.lock().unwrap(), vec!["follow-up"]);
    }

    #[tokio::test]
    async fn test_tokio_schedule_and_cancel() {
        let scheduler = TokioScheduler::current().unwrap();
        let (log, task) = recorder();
        scheduler.schedule(Duration::from_millis(10), task("fired"));
        let cancelled = scheduler.schedule(Duration::from_millis(10), task("cancelled"));
        cancelled.cancel();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(*log.lock().unwrap(), vec!["fired"]);
    }

    #[test]
    fn test_tokio_current_outside_runtime_is_err() {
        assert!(TokioScheduler::current().is_err());
    }
}
