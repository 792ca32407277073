use perftrack_common::{Config, ExecutionPolicy, RequirementSet, Result};
use tracing::info;

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod report;
pub mod stat;
pub mod tracker;
pub mod verdict;

pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use coordinator::Coordinator;
pub use report::{ReportContext, ReportModule};
pub use stat::{CounterSnapshot, LatencyCounter, Sample};
pub use tracker::{FnInvoker, Invoker, PerformanceTracker, TrackerPhase};
pub use verdict::Evaluation;

/// What a finished run measured.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// `false` when measurement was switched off and the unit ran once, unmeasured.
    pub measured: bool,
    pub invocations_started: u64,
    pub workers: usize,
    /// Primary-clock statistics; `None` when nothing was tracked.
    pub snapshot: Option<CounterSnapshot>,
}

/// Measure `invoker` under `policy` and check it against `requirement`.
///
/// With `config.active == false` the unit of work is invoked exactly once, directly.
pub fn run_perf_test<I: Invoker>(
    config: &Config,
    invoker: I,
    policy: ExecutionPolicy,
    requirement: Option<RequirementSet>,
    context: ReportContext,
) -> Result<RunSummary> {
    if !config.active {
        info!(service_id = invoker.id(), "measurement inactive, invoking once");
        invoker.invoke().map_err(|err| err.to_failure())?;
        return Ok(RunSummary {
            measured: false,
            invocations_started: 1,
            workers: 1,
            snapshot: None,
        });
    }

    let coordinator = Coordinator::new(&policy)?;
    let mut builder = PerformanceTracker::builder(invoker)
        .policy(policy)
        .context(context)
        .default_capacity(config.default_capacity);
    if let Some(requirement) = requirement {
        builder = builder.requirement(requirement);
    }
    let tracker = builder.build()?;

    coordinator.run(&tracker)?;

    let snapshot = match tracker.counters() {
        Some(counters) => Some(counters[0].snapshot()?),
        None => None,
    };
    Ok(RunSummary {
        measured: true,
        invocations_started: coordinator.invocations_started(),
        workers: coordinator.worker_count(),
        snapshot,
    })
}
