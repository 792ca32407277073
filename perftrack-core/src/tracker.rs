//! Measured invocation of a unit of work.
//!
//! [`PerformanceTracker`] wraps an [`Invoker`] and times every call with each configured clock.
//! Calls that start before the warm-up deadline run but are not recorded. The first call at or
//! after the deadline starts tracking; that check-and-transition is the only lock taken on the
//! hot path besides the counters' own.

use parking_lot::Mutex;
use perftrack_common::{
    ExecutionPolicy, InvocationError, PerfError, RequirementSet, Result, DEFAULT_SAMPLE_CAPACITY,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::{Clock, MonotonicClock, SystemClock};
use crate::report::ReportContext;
use crate::stat::LatencyCounter;
use crate::verdict::{self, Evaluation};

/// The unit of work under measurement.
pub trait Invoker: Send + Sync {
    type Output;

    /// Identifies the unit of work in reports and messages.
    fn id(&self) -> &str;

    fn invoke(&self) -> std::result::Result<Self::Output, InvocationError>;
}

/// [`Invoker`] backed by a closure.
pub struct FnInvoker<F> {
    id: String,
    f: F,
}

impl<F> FnInvoker<F> {
    pub fn new(id: impl Into<String>, f: F) -> Self {
        Self { id: id.into(), f }
    }
}

impl<F, T> Invoker for FnInvoker<F>
where
    F: Fn() -> std::result::Result<T, InvocationError> + Send + Sync,
{
    type Output = T;

    fn id(&self) -> &str {
        &self.id
    }

    fn invoke(&self) -> std::result::Result<T, InvocationError> {
        (self.f)()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    Unstarted,
    Tracking,
    Stopped,
}

struct TrackerState {
    phase: TrackerPhase,
    warm_up_deadline: Option<i64>,
    counters: Option<Arc<Vec<LatencyCounter>>>,
}

pub struct TrackerBuilder<I> {
    invoker: I,
    policy: ExecutionPolicy,
    requirement: Option<RequirementSet>,
    context: ReportContext,
    clocks: Vec<Arc<dyn Clock>>,
    timer: Arc<dyn Clock>,
    default_capacity: usize,
}

impl<I: Invoker> TrackerBuilder<I> {
    pub fn policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn requirement(mut self, requirement: RequirementSet) -> Self {
        self.requirement = Some(requirement);
        self
    }

    pub fn context(mut self, context: ReportContext) -> Self {
        self.context = context;
        self
    }

    /// Clocks to measure with; the first one is primary and drives the verdicts.
    pub fn clocks(mut self, clocks: Vec<Arc<dyn Clock>>) -> Self {
        self.clocks = clocks;
        self
    }

    /// Clock for warm-up deadlines, call start times and run start/stop timestamps.
    /// Defaults to a [`MonotonicClock`] created with the builder.
    pub fn timer(mut self, timer: Arc<dyn Clock>) -> Self {
        self.timer = timer;
        self
    }

    /// Sample capacity when the requirement set declares no `max`.
    pub fn default_capacity(mut self, capacity: usize) -> Self {
        self.default_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<PerformanceTracker<I>> {
        if self.clocks.is_empty() {
            return Err(PerfError::InvalidConfig("at least one clock is required".to_string()));
        }
        self.policy.validate()?;
        if let Some(requirement) = &self.requirement {
            requirement.validate()?;
        }
        Ok(PerformanceTracker {
            invoker: self.invoker,
            policy: self.policy,
            requirement: self.requirement,
            context: self.context,
            clocks: self.clocks,
            timer: self.timer,
            default_capacity: self.default_capacity,
            state: Mutex::new(TrackerState {
                phase: TrackerPhase::Unstarted,
                warm_up_deadline: None,
                counters: None,
            }),
        })
    }
}

/// Times each call of an [`Invoker`], feeds the latency counters, and decides the run's
/// verdict when tracking stops. Shared by reference across worker threads.
pub struct PerformanceTracker<I> {
    invoker: I,
    policy: ExecutionPolicy,
    requirement: Option<RequirementSet>,
    context: ReportContext,
    clocks: Vec<Arc<dyn Clock>>,
    timer: Arc<dyn Clock>,
    default_capacity: usize,
    state: Mutex<TrackerState>,
}

impl<I: Invoker> PerformanceTracker<I> {
    pub fn builder(invoker: I) -> TrackerBuilder<I> {
        TrackerBuilder {
            invoker,
            policy: ExecutionPolicy::default(),
            requirement: None,
            context: ReportContext::default(),
            clocks: vec![Arc::new(SystemClock)],
            timer: Arc::new(MonotonicClock::new()),
            default_capacity: DEFAULT_SAMPLE_CAPACITY,
        }
    }

    pub fn id(&self) -> &str {
        self.invoker.id()
    }

    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    pub fn requirement(&self) -> Option<&RequirementSet> {
        self.requirement.as_ref()
    }

    pub fn timer(&self) -> &dyn Clock {
        self.timer.as_ref()
    }

    pub fn phase(&self) -> TrackerPhase {
        self.state.lock().phase
    }

    pub fn is_tracking(&self) -> bool {
        self.phase() == TrackerPhase::Tracking
    }

    /// One counter per clock, primary first. `None` until tracking starts.
    pub fn counters(&self) -> Option<Arc<Vec<LatencyCounter>>> {
        self.state.lock().counters.clone()
    }

    pub fn start_tracking(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.start_locked(&mut state)
    }

    /// Run the unit of work once. Returns `Ok(None)` when the call failed and the failure was
    /// suppressed because the requirement set allows errors.
    pub fn invoke(&self) -> Result<Option<I::Output>> {
        let clock_starts: Vec<i64> = self.clocks.iter().map(|c| c.now()).collect();
        let call_start = self.timer.now();
        let counters = self.check_state(call_start)?;

        let (output, failure) = match self.invoker.invoke() {
            Ok(output) => (Some(output), None),
            Err(err @ InvocationError::Unexpected(_)) => return Err(err.into()),
            Err(err) => (None, Some(err)),
        };

        let latencies: Vec<u64> = self
            .clocks
            .iter()
            .zip(&clock_starts)
            .map(|(clock, start)| (clock.now() - start).max(0) as u64)
            .collect();
        let latency = latencies[0];

        if let Some(counters) = &counters {
            for (counter, sample) in counters.iter().zip(&latencies) {
                counter.add_sample(*sample, call_start, failure.as_ref())?;
            }
        }
        for module in self.context.modules() {
            module.invoked(self.id(), latency, call_start);
        }

        if let Some(err) = failure {
            if !self.allows_errors() {
                return Err(err.to_failure());
            }
            for module in self.context.modules() {
                module.error(self.id());
            }
        }

        if let Some(max) = self.requirement.as_ref().and_then(|r| r.max) {
            if latency > max && self.policy.cancel_on_violation {
                warn!(service_id = self.id(), latency, max, "time limit exceeded, cancelling run");
                return Err(PerfError::RequirementViolation(format!(
                    "Method {} exceeded time limit of {max} ms running {latency} ms",
                    self.id()
                )));
            }
        }
        Ok(output)
    }

    /// Stop the counters, notify the report modules and decide the run's outcome: the first
    /// recorded assertion failure when errors are not allowed, otherwise the first violated
    /// requirement.
    pub fn stop_tracking(&self) -> Result<()> {
        let counters = self.finish()?;
        let main = counters[0].snapshot()?;
        if !self.allows_errors() {
            if let Some(first) = main.failures.first() {
                return Err(first.to_failure());
            }
        }
        if let Some(requirement) = &self.requirement {
            verdict::check_requirements(self.id(), &main, requirement)?;
        }
        Ok(())
    }

    /// Stop the counters and notify the report modules without judging the run.
    /// Does nothing unless tracking is active.
    pub fn abort_tracking(&self) -> Result<()> {
        if !self.is_tracking() {
            return Ok(());
        }
        self.finish().map(|_| ())
    }

    /// Verdicts of the primary counter against the requirement set (an empty set if none).
    pub fn evaluate(&self) -> Result<Evaluation> {
        let counters = self.counters().ok_or_else(|| {
            PerfError::InvalidState(format!("tracking of {} was never started", self.id()))
        })?;
        let snapshot = counters[0].snapshot()?;
        let empty = RequirementSet::default();
        Ok(verdict::evaluate(&snapshot, self.requirement.as_ref().unwrap_or(&empty)))
    }

    fn allows_errors(&self) -> bool {
        self.requirement.as_ref().is_some_and(|r| r.allow_error)
    }

    /// Fix the warm-up deadline on the first call, start tracking on the first call past it,
    /// and return the counters this call records into.
    fn check_state(&self, call_start: i64) -> Result<Option<Arc<Vec<LatencyCounter>>>> {
        let mut state = self.state.lock();
        let deadline = *state
            .warm_up_deadline
            .get_or_insert(call_start + self.policy.warm_up_millis as i64);
        if call_start < deadline {
            return Ok(None);
        }
        if state.phase == TrackerPhase::Unstarted {
            self.start_locked(&mut state)?;
        }
        Ok(match state.phase {
            TrackerPhase::Tracking => state.counters.clone(),
            _ => None,
        })
    }

    fn start_locked(&self, state: &mut TrackerState) -> Result<()> {
        if state.phase != TrackerPhase::Unstarted {
            return Err(PerfError::InvalidState(format!(
                "tracking of {} was already started",
                self.id()
            )));
        }
        for module in self.context.modules() {
            module.starting(self.id());
        }
        let capacity = self
            .requirement
            .as_ref()
            .and_then(|r| r.max)
            .map(|max| usize::try_from(max).unwrap_or(usize::MAX))
            .unwrap_or(self.default_capacity);
        let counters: Vec<LatencyCounter> = self
            .clocks
            .iter()
            .map(|clock| LatencyCounter::new(self.id(), clock.name(), capacity, self.timer.clone()))
            .collect();
        for counter in &counters {
            counter.start()?;
        }
        state.counters = Some(Arc::new(counters));
        state.phase = TrackerPhase::Tracking;
        info!(service_id = self.id(), clocks = self.clocks.len(), "tracking started");
        Ok(())
    }

    fn finish(&self) -> Result<Arc<Vec<LatencyCounter>>> {
        let counters = {
            let mut state = self.state.lock();
            let counters = match (state.phase, &state.counters) {
                (TrackerPhase::Tracking, Some(counters)) => counters.clone(),
                _ => {
                    return Err(PerfError::InvalidState(format!(
                        "trying to stop tracking of {} before it was started",
                        self.id()
                    )))
                }
            };
            state.phase = TrackerPhase::Stopped;
            counters
        };
        for counter in counters.iter() {
            counter.stop()?;
        }
        info!(
            service_id = self.id(),
            samples = counters[0].sample_count(),
            errors = counters[0].error_count(),
            "tracking stopped"
        );
        for module in self.context.modules() {
            module.completed(self.id(), &counters, &self.policy, self.requirement.as_ref());
        }
        Ok(counters)
    }
}
