//! Latency sample aggregation.
//!
//! A [`LatencyCounter`] collects one [`Sample`] per measured call and derives the statistics
//! that requirements are checked against. Every mutation and every derived read takes the same
//! lock, so a statistic never sees a partially appended sample. [`LatencyCounter::snapshot`]
//! copies the state once when several statistics must agree with each other.

use parking_lot::Mutex;
use perftrack_common::{InvocationError, PerfError, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::{MAX_PREALLOCATED_SAMPLES, SUMMARY_PERCENTILES};

/// One recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub latency: u64,
    pub start_time: i64,
    pub failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Active,
    Stopped,
}

struct CounterState {
    phase: Phase,
    start_time: i64,
    stop_time: i64,
    samples: Vec<Sample>,
    error_count: u64,
    failures: Vec<InvocationError>,
}

/// Thread-safe latency sample store for one clock of one run.
pub struct LatencyCounter {
    service_id: String,
    clock_name: String,
    capacity: usize,
    timer: Arc<dyn Clock>,
    state: Mutex<CounterState>,
}

impl LatencyCounter {
    /// `capacity` pre-sizes the sample buffer, up to [`MAX_PREALLOCATED_SAMPLES`]. Samples
    /// beyond it are still recorded.
    /// `timer` supplies the run start and stop timestamps.
    pub fn new(
        service_id: impl Into<String>,
        clock_name: impl Into<String>,
        capacity: usize,
        timer: Arc<dyn Clock>,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            clock_name: clock_name.into(),
            capacity,
            timer,
            state: Mutex::new(CounterState {
                phase: Phase::Created,
                start_time: 0,
                stop_time: 0,
                samples: Vec::with_capacity(capacity.min(MAX_PREALLOCATED_SAMPLES)),
                error_count: 0,
                failures: Vec::new(),
            }),
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn clock_name(&self) -> &str {
        &self.clock_name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Created => {
                state.start_time = self.timer.now();
                state.phase = Phase::Active;
                Ok(())
            }
            Phase::Active => Err(PerfError::InvalidState(format!(
                "counter {} is already started",
                self.label()
            ))),
            Phase::Stopped => Err(PerfError::InvalidState(format!(
                "counter {} was already stopped",
                self.label()
            ))),
        }
    }

    /// Record one call. A failure counts toward the error rate; assertion failures are also
    /// kept, in insertion order, for [`assertion_errors`](Self::assertion_errors).
    pub fn add_sample(
        &self,
        latency: u64,
        start_time: i64,
        failure: Option<&InvocationError>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.phase != Phase::Active {
            return Err(PerfError::InvalidState(format!(
                "sample added to counter {} while it is not active",
                self.label()
            )));
        }
        state.samples.push(Sample {
            latency,
            start_time,
            failed: failure.is_some(),
        });
        if let Some(err) = failure {
            state.error_count += 1;
            if err.is_assertion() {
                state.failures.push(err.clone());
            }
        }
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Active => {
                state.stop_time = self.timer.now();
                state.phase = Phase::Stopped;
                Ok(())
            }
            Phase::Created => Err(PerfError::InvalidState(format!(
                "counter {} was never started",
                self.label()
            ))),
            Phase::Stopped => Err(PerfError::InvalidState(format!(
                "counter {} was already stopped",
                self.label()
            ))),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().phase == Phase::Active
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().phase == Phase::Stopped
    }

    pub fn start_time(&self) -> Result<i64> {
        let state = self.state.lock();
        self.require_started(&state)?;
        Ok(state.start_time)
    }

    /// Elapsed ms: fixed once stopped, still growing while active.
    pub fn duration(&self) -> Result<i64> {
        let state = self.state.lock();
        self.duration_of(&state)
    }

    pub fn sample_count(&self) -> usize {
        self.state.lock().samples.len()
    }

    pub fn error_count(&self) -> u64 {
        self.state.lock().error_count
    }

    pub fn min_latency(&self) -> Result<u64> {
        min_latency(&self.state.lock().samples)
    }

    pub fn max_latency(&self) -> Result<u64> {
        max_latency(&self.state.lock().samples)
    }

    pub fn average_latency(&self) -> Result<f64> {
        average_latency(&self.state.lock().samples)
    }

    pub fn percentile_latency(&self, percentage: u32) -> Result<u64> {
        percentile_latency(&self.state.lock().samples, percentage)
    }

    /// Calls per second over the elapsed duration; 0 while the duration is 0.
    pub fn throughput(&self) -> Result<u64> {
        let state = self.state.lock();
        let duration = self.duration_of(&state)?;
        Ok(throughput(state.samples.len(), duration))
    }

    pub fn errors_rate(&self) -> Result<f64> {
        let state = self.state.lock();
        errors_rate(state.error_count, state.samples.len())
    }

    pub fn assertion_errors(&self) -> Vec<InvocationError> {
        self.state.lock().failures.clone()
    }

    /// Copy of the full state under a single lock acquisition.
    pub fn snapshot(&self) -> Result<CounterSnapshot> {
        let state = self.state.lock();
        let duration = self.duration_of(&state)?;
        Ok(CounterSnapshot {
            service_id: self.service_id.clone(),
            clock_name: self.clock_name.clone(),
            start_time: state.start_time,
            duration,
            stopped: state.phase == Phase::Stopped,
            samples: state.samples.clone(),
            error_count: state.error_count,
            failures: state.failures.clone(),
        })
    }

    fn duration_of(&self, state: &CounterState) -> Result<i64> {
        self.require_started(state)?;
        let end = match state.phase {
            Phase::Stopped => state.stop_time,
            _ => self.timer.now(),
        };
        Ok(end - state.start_time)
    }

    fn require_started(&self, state: &CounterState) -> Result<()> {
        if state.phase == Phase::Created {
            return Err(PerfError::InvalidState(format!(
                "counter {} was never started",
                self.label()
            )));
        }
        Ok(())
    }

    fn label(&self) -> String {
        format!("{}/{}", self.service_id, self.clock_name)
    }
}

/// Immutable copy of a counter's state, with the same derived reads.
#[derive(Debug, Clone, Serialize)]
pub struct CounterSnapshot {
    pub service_id: String,
    pub clock_name: String,
    pub start_time: i64,
    pub duration: i64,
    pub stopped: bool,
    pub samples: Vec<Sample>,
    pub error_count: u64,
    pub failures: Vec<InvocationError>,
}

impl CounterSnapshot {
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn min_latency(&self) -> Result<u64> {
        min_latency(&self.samples)
    }

    pub fn max_latency(&self) -> Result<u64> {
        max_latency(&self.samples)
    }

    pub fn average_latency(&self) -> Result<f64> {
        average_latency(&self.samples)
    }

    pub fn percentile_latency(&self, percentage: u32) -> Result<u64> {
        percentile_latency(&self.samples, percentage)
    }

    pub fn throughput(&self) -> u64 {
        throughput(self.samples.len(), self.duration)
    }

    pub fn errors_rate(&self) -> Result<f64> {
        errors_rate(self.error_count, self.samples.len())
    }

    pub fn has_assertion_errors(&self) -> bool {
        !self.failures.is_empty()
    }
}

impl fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{}]", self.service_id, self.clock_name)?;
        writeln!(f, "samples: {}", self.sample_count())?;
        writeln!(f, "max:     {}", display_or_dash(self.max_latency()))?;
        match self.average_latency() {
            Ok(avg) => writeln!(f, "average: {avg:.1}")?,
            Err(_) => writeln!(f, "average: -")?,
        }
        for p in SUMMARY_PERCENTILES {
            writeln!(f, "{p}%:     {}", display_or_dash(self.percentile_latency(p)))?;
        }
        write!(f, "duration: {} ms, throughput: {}/s", self.duration, self.throughput())
    }
}

fn display_or_dash(value: Result<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|_| "-".to_string())
}

fn min_latency(samples: &[Sample]) -> Result<u64> {
    samples.iter().map(|s| s.latency).min().ok_or(PerfError::EmptyStatistics)
}

fn max_latency(samples: &[Sample]) -> Result<u64> {
    samples.iter().map(|s| s.latency).max().ok_or(PerfError::EmptyStatistics)
}

fn average_latency(samples: &[Sample]) -> Result<f64> {
    if samples.is_empty() {
        return Err(PerfError::EmptyStatistics);
    }
    let total: u128 = samples.iter().map(|s| s.latency as u128).sum();
    Ok(total as f64 / samples.len() as f64)
}

/// Nearest-rank percentile: sort ascending and take index `ceil(p / 100 * n) - 1`,
/// clamped to the sample range.
fn percentile_latency(samples: &[Sample], percentage: u32) -> Result<u64> {
    if samples.is_empty() {
        return Err(PerfError::EmptyStatistics);
    }
    let mut sorted: Vec<u64> = samples.iter().map(|s| s.latency).collect();
    sorted.sort_unstable();
    let n = sorted.len();
    let rank = (percentage as usize * n).div_ceil(100);
    let idx = rank.saturating_sub(1).min(n - 1);
    Ok(sorted[idx])
}

fn throughput(count: usize, duration: i64) -> u64 {
    if duration <= 0 {
        return 0;
    }
    count as u64 * 1000 / duration as u64
}

fn errors_rate(error_count: u64, count: usize) -> Result<f64> {
    if count == 0 {
        return Err(PerfError::EmptyStatistics);
    }
    Ok(error_count as f64 / count as f64)
}
