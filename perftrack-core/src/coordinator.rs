use parking_lot::Mutex;
use perftrack_common::{ExecutionPolicy, PerfError, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::WORKER_THREAD_PREFIX;
use crate::tracker::{Invoker, PerformanceTracker};

/// Shared between the workers of one run.
struct RunState {
    remaining: AtomicU64,
    deadline: Option<Instant>,
    abort: AtomicBool,
    first_error: Mutex<Option<PerfError>>,
}

impl RunState {
    /// Claim the next invocation slot. No two workers get the same slot.
    fn claim(&self) -> bool {
        if self.abort.load(Ordering::Acquire) {
            return false;
        }
        match self.deadline {
            Some(deadline) => Instant::now() < deadline,
            None => self
                .remaining
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok(),
        }
    }

    /// Keep the first failure and stop further calls from being started.
    fn fail(&self, err: PerfError) {
        let mut first = self.first_error.lock();
        if first.is_none() {
            *first = Some(err);
        }
        self.abort.store(true, Ordering::Release);
    }
}

/// Runs a fixed number of calls (or calls until a duration elapses) across worker threads.
pub struct Coordinator {
    threads: usize,
    invocations: u64,
    duration: Option<Duration>,
    workers: Mutex<HashSet<ThreadId>>,
    started: AtomicU64,
}

impl Coordinator {
    pub fn new(policy: &ExecutionPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            threads: policy.threads,
            invocations: policy.invocations,
            duration: policy.run_duration(),
            workers: Mutex::new(HashSet::new()),
            started: AtomicU64::new(0),
        })
    }

    /// Drive `tracker` to completion and return the run's outcome.
    ///
    /// The first failing call aborts the run: calls in flight finish, no new call starts, and
    /// that failure is returned as is without judging the requirements. Otherwise the outcome
    /// is whatever [`PerformanceTracker::stop_tracking`] decides.
    pub fn run<I: Invoker>(&self, tracker: &PerformanceTracker<I>) -> Result<()> {
        self.workers.lock().clear();
        self.started.store(0, Ordering::Relaxed);

        let run = RunState {
            remaining: AtomicU64::new(self.invocations),
            deadline: self.duration.map(|d| Instant::now() + d),
            abort: AtomicBool::new(false),
            first_error: Mutex::new(None),
        };
        info!(
            service_id = tracker.id(),
            threads = self.threads,
            invocations = self.invocations,
            "run starting"
        );

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.threads);
            for index in 0..self.threads {
                let spawned = thread::Builder::new()
                    .name(format!("{WORKER_THREAD_PREFIX}-{index}"))
                    .spawn_scoped(scope, || self.work(tracker, &run));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(err) => {
                        let message = format!("cannot spawn worker thread: {err}");
                        run.fail(PerfError::Unexpected(message));
                        break;
                    }
                }
            }
            for handle in handles {
                if handle.join().is_err() {
                    run.fail(PerfError::Unexpected("worker thread panicked".to_string()));
                }
            }
        });

        info!(
            service_id = tracker.id(),
            started = self.invocations_started(),
            workers = self.worker_count(),
            "run finished"
        );

        match run.first_error.into_inner() {
            Some(err) => {
                if let Err(stop_err) = tracker.abort_tracking() {
                    warn!(
                        service_id = tracker.id(),
                        %stop_err,
                        "cannot stop tracking after failure"
                    );
                }
                Err(err)
            }
            None => tracker.stop_tracking(),
        }
    }

    /// Distinct threads that executed at least one call in the last run.
    pub fn worker_ids(&self) -> HashSet<ThreadId> {
        self.workers.lock().clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Calls started in the last run, warm-up included.
    pub fn invocations_started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    fn work<I: Invoker>(&self, tracker: &PerformanceTracker<I>, run: &RunState) {
        let me = thread::current().id();
        while run.claim() {
            self.workers.lock().insert(me);
            self.started.fetch_add(1, Ordering::Relaxed);
            if let Err(err) = tracker.invoke() {
                run.fail(err);
                break;
            }
        }
    }
}
