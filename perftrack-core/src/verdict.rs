//! Checks measured statistics against a [`RequirementSet`].
//!
//! Every function here is pure over a [`CounterSnapshot`]: evaluating the same snapshot twice
//! gives the same verdicts. Performance verdicts are [`Verdict::Ignored`] while the snapshot
//! holds an assertion failure, since functional correctness is judged first.

use perftrack_common::{PercentileRequirement, PerfError, RequirementSet, Result, Verdict};
use serde::Serialize;

use crate::stat::CounterSnapshot;

pub fn max_verdict(snapshot: &CounterSnapshot, requirement: &RequirementSet) -> Verdict {
    match requirement.max {
        Some(max) if !snapshot.has_assertion_errors() => match snapshot.max_latency() {
            Ok(measured) => Verdict::from_check(measured <= max),
            Err(_) => Verdict::Ignored,
        },
        _ => Verdict::Ignored,
    }
}

pub fn total_time_verdict(snapshot: &CounterSnapshot, requirement: &RequirementSet) -> Verdict {
    match requirement.total_time {
        Some(total) if !snapshot.has_assertion_errors() => {
            Verdict::from_check(snapshot.duration <= total as i64)
        }
        _ => Verdict::Ignored,
    }
}

pub fn throughput_verdict(snapshot: &CounterSnapshot, requirement: &RequirementSet) -> Verdict {
    match requirement.throughput {
        Some(required) if !snapshot.has_assertion_errors() && snapshot.duration > 0 => {
            Verdict::from_check(snapshot.throughput() >= required)
        }
        _ => Verdict::Ignored,
    }
}

pub fn average_verdict(snapshot: &CounterSnapshot, requirement: &RequirementSet) -> Verdict {
    match requirement.average {
        Some(average) if !snapshot.has_assertion_errors() => match snapshot.average_latency() {
            Ok(measured) => Verdict::from_check(measured <= average as f64),
            Err(_) => Verdict::Ignored,
        },
        _ => Verdict::Ignored,
    }
}

pub fn percentile_verdict(
    snapshot: &CounterSnapshot,
    percentile: &PercentileRequirement,
) -> Verdict {
    if snapshot.has_assertion_errors() {
        return Verdict::Ignored;
    }
    match snapshot.percentile_latency(percentile.percentage) {
        Ok(measured) => Verdict::from_check(measured <= percentile.millis),
        Err(_) => Verdict::Ignored,
    }
}

/// Functional verdict. With errors allowed the error rate decides; otherwise any recorded
/// assertion failure is a failure.
pub fn errors_verdict(snapshot: &CounterSnapshot, requirement: &RequirementSet) -> Verdict {
    if requirement.allow_error {
        match snapshot.errors_rate() {
            Ok(rate) => Verdict::from_check(rate <= requirement.allowed_errors_rate),
            Err(_) => Verdict::Success,
        }
    } else {
        Verdict::from_check(!snapshot.has_assertion_errors())
    }
}

/// Per-requirement verdicts of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub max: Verdict,
    pub total_time: Verdict,
    pub throughput: Verdict,
    pub average: Verdict,
    pub percentiles: Vec<(PercentileRequirement, Verdict)>,
    pub errors: Verdict,
}

impl Evaluation {
    /// `true` unless some requirement failed. Ignored requirements do not count.
    pub fn success(&self) -> bool {
        let fixed = [self.max, self.total_time, self.throughput, self.average, self.errors];
        !fixed.iter().any(|v| v.is_failure())
            && !self.percentiles.iter().any(|(_, v)| v.is_failure())
    }
}

pub fn evaluate(snapshot: &CounterSnapshot, requirement: &RequirementSet) -> Evaluation {
    Evaluation {
        max: max_verdict(snapshot, requirement),
        total_time: total_time_verdict(snapshot, requirement),
        throughput: throughput_verdict(snapshot, requirement),
        average: average_verdict(snapshot, requirement),
        percentiles: requirement
            .percentiles
            .iter()
            .map(|p| (*p, percentile_verdict(snapshot, p)))
            .collect(),
        errors: errors_verdict(snapshot, requirement),
    }
}

/// Fail with a message naming the first violated requirement, checked in the order
/// max, total time, throughput, average, percentiles, errors.
pub fn check_requirements(
    service_id: &str,
    snapshot: &CounterSnapshot,
    requirement: &RequirementSet,
) -> Result<()> {
    if max_verdict(snapshot, requirement).is_failure() {
        return Err(PerfError::RequirementViolation(format!(
            "The maximum latency of {} ms was exceeded by {service_id}, measured: {} ms",
            requirement.max.unwrap_or_default(),
            snapshot.max_latency()?
        )));
    }
    if total_time_verdict(snapshot, requirement).is_failure() {
        return Err(PerfError::RequirementViolation(format!(
            "Test run {service_id} exceeded the total time of {} ms, running {} ms",
            requirement.total_time.unwrap_or_default(),
            snapshot.duration
        )));
    }
    if throughput_verdict(snapshot, requirement).is_failure() {
        return Err(PerfError::RequirementViolation(format!(
            "Test {service_id} had a throughput of only {} calls per second, \
             required: {} calls per second",
            snapshot.throughput(),
            requirement.throughput.unwrap_or_default()
        )));
    }
    if average_verdict(snapshot, requirement).is_failure() {
        return Err(PerfError::RequirementViolation(format!(
            "Average latency of {service_id} exceeded the requirement of {} ms, measured {:.1} ms",
            requirement.average.unwrap_or_default(),
            snapshot.average_latency()?
        )));
    }
    for percentile in &requirement.percentiles {
        if percentile_verdict(snapshot, percentile).is_failure() {
            return Err(PerfError::RequirementViolation(format!(
                "{}-percentile of {service_id} exceeded the requirement of {} ms, measured {} ms",
                percentile.percentage,
                percentile.millis,
                snapshot.percentile_latency(percentile.percentage)?
            )));
        }
    }
    if errors_verdict(snapshot, requirement).is_failure() {
        if !requirement.allow_error {
            if let Some(first) = snapshot.failures.first() {
                return Err(first.to_failure());
            }
        }
        return Err(PerfError::RequirementViolation(format!(
            "The maximum error rate of {}% was exceeded by {service_id}, measured: {}%",
            requirement.allowed_errors_rate * 100.0,
            snapshot.errors_rate()? * 100.0
        )));
    }
    Ok(())
}
