//! Deadline-queue job scheduler
//!
//! A single tokio task owns a binary heap of `(deadline, job id)` pairs and
//! sleeps until the earliest deadline or until the job set changes. Due jobs
//! are spawned as their own tasks, so a slow job never delays the others.

mod cron;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Local};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

pub use cron::{CronError, CronSchedule};

pub type JobId = u64;

type JobAction = Arc<dyn Fn(JobId) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
enum Trigger {
    Every(Duration),
    Once,
    Cron {
        schedule: CronSchedule,
        fire_at: DateTime<Local>,
    },
}

struct Job {
    name: String,
    trigger: Trigger,
    action: JobAction,
}

#[derive(Default)]
struct State {
    queue: BinaryHeap<Reverse<(Instant, JobId)>>,
    jobs: HashMap<JobId, Job>,
    next_id: JobId,
}

struct Inner {
    state: Mutex<State>,
    wakeup: Notify,
    stopped: AtomicBool,
}

/// Handle to the scheduler; clones share the same job set
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                wakeup: Notify::new(),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Run `f` every `period`, first after one period
    pub fn every<F, Fut>(&self, name: &str, period: Duration, f: F) -> JobId
    where
        F: Fn(JobId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.insert(name, Trigger::Every(period), Instant::now() + period, f)
    }

    /// Run `f` once after `delay`
    pub fn once<F, Fut>(&self, name: &str, delay: Duration, f: F) -> JobId
    where
        F: Fn(JobId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.insert(name, Trigger::Once, Instant::now() + delay, f)
    }

    /// Run `f` on every fire time of `schedule`
    ///
    /// Returns `None` when the schedule never fires.
    pub fn cron<F, Fut>(&self, name: &str, schedule: CronSchedule, f: F) -> Option<JobId>
    where
        F: Fn(JobId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (fire_at, first) = next_cron_fire(&schedule, Local::now())?;
        Some(self.insert(name, Trigger::Cron { schedule, fire_at }, first, f))
    }

    /// Remove a job; safe to call from inside the job itself
    pub fn remove(&self, id: JobId) -> bool {
        let removed = self.inner.state.lock().jobs.remove(&id);
        if let Some(job) = &removed {
            debug!("Scheduler: job '{}' ({}) removed", job.name, id);
            self.inner.wakeup.notify_one();
        }
        removed.is_some()
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.inner.state.lock().jobs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the run loop on the current tokio runtime
    pub fn start(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move { run(inner).await })
    }

    /// Stop the run loop; queued jobs no longer fire
    pub fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.wakeup.notify_one();
    }

    fn insert<F, Fut>(&self, name: &str, trigger: Trigger, first: Instant, f: F) -> JobId
    where
        F: Fn(JobId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: JobAction = Arc::new(move |id| f(id).boxed());

        let id = {
            let mut state = self.inner.state.lock();
            state.next_id += 1;
            let id = state.next_id;
            state.jobs.insert(
                id,
                Job {
                    name: name.to_string(),
                    trigger,
                    action,
                },
            );
            state.queue.push(Reverse((first, id)));
            id
        };

        debug!("Scheduler: job '{}' ({}) added", name, id);
        self.inner.wakeup.notify_one();
        id
    }
}

/// Next fire time after both `fired_at` and the wall clock, with its deadline
///
/// Starting from the previous fire time keeps a job from firing twice in the
/// same second when the wall clock lags the monotonic deadline.
fn next_cron_fire(
    schedule: &CronSchedule,
    fired_at: DateTime<Local>,
) -> Option<(DateTime<Local>, Instant)> {
    let now = Local::now();
    let next = schedule.next_after(fired_at.max(now))?;
    let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
    Some((next, Instant::now() + delay))
}

/// Pop every due job, queue its next run, and return the actions to spawn
fn take_due(state: &mut State, now: Instant) -> Vec<(JobId, JobAction)> {
    let mut due = Vec::new();

    while let Some(&Reverse((at, id))) = state.queue.peek() {
        if !state.jobs.contains_key(&id) {
            state.queue.pop();
            continue;
        }
        if at > now {
            break;
        }
        state.queue.pop();

        let Some(job) = state.jobs.get_mut(&id) else {
            continue;
        };
        trace!("Scheduler: job '{}' ({}) is due", job.name, id);
        let action = job.action.clone();
        let next = match &mut job.trigger {
            Trigger::Every(period) => Some(now + *period),
            Trigger::Once => None,
            Trigger::Cron { schedule, fire_at } => {
                next_cron_fire(schedule, *fire_at).map(|(at, deadline)| {
                    *fire_at = at;
                    deadline
                })
            }
        };

        match next {
            Some(at) => state.queue.push(Reverse((at, id))),
            None => {
                state.jobs.remove(&id);
            }
        }
        due.push((id, action));
    }

    due
}

async fn run(inner: Arc<Inner>) {
    loop {
        if inner.stopped.load(Ordering::SeqCst) {
            debug!("Scheduler stopped");
            return;
        }

        let (due, next_deadline) = {
            let mut state = inner.state.lock();
            let due = take_due(&mut state, Instant::now());
            let next = state.queue.peek().map(|Reverse((at, _))| *at);
            (due, next)
        };

        for (id, action) in due {
            tokio::spawn(action(id));
        }

        match next_deadline {
            Some(at) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(at) => {}
                    _ = inner.wakeup.notified() => {}
                }
            }
            None => inner.wakeup.notified().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_once_fires_once_and_is_removed() {
        let scheduler = Scheduler::new();
        let handle = scheduler.start();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let id = scheduler.once("once", Duration::from_millis(20), move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert!(scheduler.contains(id));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!scheduler.contains(id));

        scheduler.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_every_repeats_until_removed() {
        let scheduler = Scheduler::new();
        scheduler.start();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let id = scheduler.every("tick", Duration::from_millis(20), move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(scheduler.remove(id));
        let seen = hits.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected repeated runs, got {}", seen);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(hits.load(Ordering::SeqCst) <= seen + 1);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_job_can_remove_itself() {
        let scheduler = Scheduler::new();
        scheduler.start();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let handle = scheduler.clone();
        scheduler.every("self-removing", Duration::from_millis(10), move |id| {
            let counter = counter.clone();
            let handle = handle.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                handle.remove(id);
            }
        });

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_empty());
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_later_job_does_not_block_earlier_one() {
        let scheduler = Scheduler::new();
        scheduler.start();
        let hits = Arc::new(AtomicUsize::new(0));

        scheduler.once("late", Duration::from_secs(3600), |_| async {});
        let counter = hits.clone();
        scheduler.once("early", Duration::from_millis(20), move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.len(), 1);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_cron_job_is_queued() {
        let scheduler = Scheduler::new();
        let schedule = CronSchedule::parse("0 0 1 1 *").unwrap();
        let id = scheduler.cron("new-year", schedule, |_| async {});
        assert!(id.is_some());

        let never = CronSchedule::parse("0 0 31 2 *").unwrap();
        assert!(scheduler.cron("never", never, |_| async {}).is_none());
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_cron_next_fire_follows_previous_fire() {
        let schedule = CronSchedule::parse("* * * * * *").unwrap();

        // 墙上时钟落后于上次触发时间时，不能再次得到同一秒
        let fired_at = Local::now() + chrono::TimeDelta::seconds(5);
        let (next, deadline) = next_cron_fire(&schedule, fired_at).unwrap();
        assert!(next > fired_at);
        assert!(deadline > Instant::now() + Duration::from_secs(4));

        let past = Local::now() - chrono::TimeDelta::seconds(30);
        let (next, _) = next_cron_fire(&schedule, past).unwrap();
        assert!(next > Local::now() - chrono::TimeDelta::seconds(1));
    }

    #[tokio::test]
    async fn test_cron_job_advances_fire_time() {
        let scheduler = Scheduler::new();
        let schedule = CronSchedule::parse("* * * * * *").unwrap();
        let id = scheduler.cron("every-second", schedule, |_| async {}).unwrap();

        let first = {
            let state = scheduler.inner.state.lock();
            match &state.jobs[&id].trigger {
                Trigger::Cron { fire_at, .. } => *fire_at,
                _ => unreachable!(),
            }
        };

        let due = {
            let mut state = scheduler.inner.state.lock();
            take_due(&mut state, Instant::now() + Duration::from_secs(1))
        };
        assert!(!due.is_empty());

        let state = scheduler.inner.state.lock();
        match &state.jobs[&id].trigger {
            Trigger::Cron { fire_at, .. } => assert!(*fire_at > first),
            _ => unreachable!(),
        }
        assert_eq!(state.queue.len(), 1);
    }
}
