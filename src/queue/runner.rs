// src/queue/runner.rs
use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{FlushStats, RunContext, RunRecord, ScheduledTask, Task, TaskHandler, TaskScheduler};
use crate::config::QueueConfig;

#[derive(Debug, Clone)]
struct Job {
    task: Task,
    attempt: u32,
}

struct Delayed {
    job: Job,
    delay: Duration,
}

#[derive(Default)]
struct QueueState {
    seq: u64,
    // Keyed by due instant, then insertion order.
    scheduled: BTreeMap<(Instant, u64), Delayed>,
    pending: VecDeque<Job>,
    results: VecDeque<RunRecord>,
}

struct Shared {
    cfg: QueueConfig,
    state: Mutex<QueueState>,
    timer_wake: Notify,
    work_ready: Notify,
    closed: AtomicBool,
}

impl Shared {
    fn push_delayed(&self, job: Job, delay: Duration) {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(task = %job.task, "queue closed, dropping schedule");
            return;
        }
        let due = Instant::now() + delay;
        {
            let mut st = self.state.lock();
            st.seq += 1;
            let seq = st.seq;
            st.scheduled.insert((due, seq), Delayed { job, delay });
            gauge!("task_queue_scheduled").set(st.scheduled.len() as f64);
        }
        self.timer_wake.notify_one();
    }

    /// Move everything due by `now` to the pending queue; returns the next due instant.
    fn promote_due(&self, now: Instant) -> Option<Instant> {
        let (moved, next) = {
            let mut st = self.state.lock();
            let mut moved = 0usize;
            while let Some(entry) = st.scheduled.first_entry() {
                if entry.key().0 > now {
                    break;
                }
                let delayed = entry.remove();
                st.pending.push_back(delayed.job);
                moved += 1;
            }
            if moved > 0 {
                gauge!("task_queue_scheduled").set(st.scheduled.len() as f64);
            }
            (moved, st.scheduled.keys().next().map(|(at, _)| *at))
        };
        for _ in 0..moved {
            self.work_ready.notify_one();
        }
        next
    }

    fn record(&self, rec: RunRecord) {
        let cap = self.cfg.results_capacity;
        if cap == 0 {
            return;
        }
        let mut st = self.state.lock();
        st.results.push_back(rec);
        while st.results.len() > cap {
            st.results.pop_front();
        }
    }
}

/// Cloneable front of the queue: scheduling, inspection and flushing.
#[derive(Clone)]
pub struct QueueHandle {
    shared: Arc<Shared>,
}

impl QueueHandle {
    pub fn scheduled(&self) -> Vec<ScheduledTask> {
        let now = Instant::now();
        self.shared
            .state
            .lock()
            .scheduled
            .iter()
            .map(|((due, _), d)| ScheduledTask {
                task: d.job.task.clone(),
                attempt: d.job.attempt,
                delay: d.delay,
                due_in_ms: due.saturating_duration_since(now).as_millis() as u64,
            })
            .collect()
    }

    pub fn pending(&self) -> Vec<Task> {
        self.shared
            .state
            .lock()
            .pending
            .iter()
            .map(|j| j.task.clone())
            .collect()
    }

    /// Most recent run records, oldest first.
    pub fn results(&self) -> Vec<RunRecord> {
        self.shared.state.lock().results.iter().cloned().collect()
    }

    pub fn flush_pending(&self) -> usize {
        let mut st = self.shared.state.lock();
        let n = st.pending.len();
        st.pending.clear();
        n
    }

    pub fn flush_scheduled(&self) -> usize {
        let mut st = self.shared.state.lock();
        let n = st.scheduled.len();
        st.scheduled.clear();
        gauge!("task_queue_scheduled").set(0.0);
        n
    }

    pub fn flush_results(&self) -> usize {
        let mut st = self.shared.state.lock();
        let n = st.results.len();
        st.results.clear();
        n
    }

    pub fn flush_all(&self) -> FlushStats {
        FlushStats {
            pending: self.flush_pending(),
            scheduled: self.flush_scheduled(),
            results: self.flush_results(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl TaskScheduler for QueueHandle {
    fn schedule(&self, task: Task, delay: Duration) {
        tracing::trace!(task = %task, delay_secs = delay.as_secs_f64(), "schedule");
        self.shared.push_delayed(Job { task, attempt: 1 }, delay);
    }
}

/// Owns the dispatcher and worker tasks.
pub struct TaskQueue {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl TaskQueue {
    pub fn new(cfg: QueueConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                cfg,
                state: Mutex::new(QueueState::default()),
                timer_wake: Notify::new(),
                work_ready: Notify::new(),
                closed: AtomicBool::new(false),
            }),
            shutdown,
            tasks: Vec::new(),
        }
    }

    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Spawn the dispatcher and `workers` workers. Calling it twice is a no-op.
    pub fn start(&mut self, handler: Arc<dyn TaskHandler>) {
        if !self.tasks.is_empty() {
            tracing::warn!("task queue already started");
            return;
        }
        let workers = self.shared.cfg.workers.max(1);
        self.tasks.push(tokio::spawn(dispatch(
            Arc::clone(&self.shared),
            self.shutdown.subscribe(),
        )));
        for id in 0..workers {
            self.tasks.push(tokio::spawn(work(
                id,
                Arc::clone(&self.shared),
                Arc::clone(&handler),
                self.shutdown.subscribe(),
            )));
        }
        tracing::info!(workers, "task queue started");
    }

    /// Flush pending, scheduled and stored results, then stop. Runs already executing
    /// are allowed to finish.
    pub async fn shutdown(mut self) -> FlushStats {
        self.shared.closed.store(true, Ordering::Release);
        let stats = self.handle().flush_all();
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        tracing::info!(
            pending = stats.pending,
            scheduled = stats.scheduled,
            results = stats.results,
            "task queue flushed"
        );
        stats
    }
}

async fn dispatch(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let next = shared.promote_due(Instant::now());
        let timer = async move {
            match next {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = timer => {}
            _ = shared.timer_wake.notified() => {}
            res = shutdown.changed() => {
                if res.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!("dispatcher stopped");
}

async fn work(
    id: usize,
    shared: Arc<Shared>,
    handler: Arc<dyn TaskHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let job = shared.state.lock().pending.pop_front();
        let Some(job) = job else {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shared.work_ready.notified() => {}
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
            continue;
        };
        run_job(&shared, &handler, job).await;
    }
    tracing::debug!(worker = id, "worker stopped");
}

async fn run_job(shared: &Arc<Shared>, handler: &Arc<dyn TaskHandler>, job: Job) {
    let ctx = RunContext {
        attempt: job.attempt,
        max_attempts: shared.cfg.max_attempts.max(1),
    };

    // A panicking run must not take the worker down with it.
    let result = {
        let handler = Arc::clone(handler);
        let task = job.task.clone();
        match tokio::spawn(async move { handler.run(&task, ctx).await }).await {
            Ok(res) => res,
            Err(join) => Err(anyhow::anyhow!("run panicked: {join}")),
        }
    };

    let kind = job.task.kind();
    let error = match &result {
        Ok(()) => {
            counter!("task_runs_total", "kind" => kind, "result" => "ok").increment(1);
            None
        }
        Err(e) => {
            counter!("task_runs_total", "kind" => kind, "result" => "error").increment(1);
            if ctx.is_last_attempt() {
                tracing::error!(
                    task = %job.task,
                    attempt = ctx.attempt,
                    error = %format!("{e:#}"),
                    "task failed, retries exhausted"
                );
            } else {
                tracing::warn!(
                    task = %job.task,
                    attempt = ctx.attempt,
                    error = %format!("{e:#}"),
                    "task failed, retrying"
                );
                counter!("task_retries_total").increment(1);
                shared.push_delayed(
                    Job {
                        task: job.task.clone(),
                        attempt: job.attempt + 1,
                    },
                    shared.cfg.retry_delay(),
                );
            }
            Some(format!("{e:#}"))
        }
    };

    shared.record(RunRecord {
        task: job.task,
        attempt: ctx.attempt,
        ok: error.is_none(),
        error,
        finished_at: chrono::Utc::now(),
    });
}
