use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{PerfError, Result};

/// Outcome of checking one requirement against the measured statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Success,
    Failure,
    /// The requirement is not configured, or an assertion failure makes it meaningless.
    Ignored,
}

impl Verdict {
    pub fn from_check(passed: bool) -> Self {
        if passed {
            Verdict::Success
        } else {
            Verdict::Failure
        }
    }

    pub fn is_failure(self) -> bool {
        self == Verdict::Failure
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Success => "SUCCESS",
            Verdict::Failure => "FAILURE",
            Verdict::Ignored => "IGNORED",
        };
        f.write_str(name)
    }
}

/// Upper bound on the latency of a given percentile, e.g. 90% of calls within 50 ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentileRequirement {
    pub percentage: u32,
    pub millis: u64,
}

impl PercentileRequirement {
    pub fn new(percentage: u32, millis: u64) -> Self {
        Self { percentage, millis }
    }

    /// Parse a comma-separated list of `percentage:millis` pairs, e.g. `"90:50,95:80"`.
    /// Blank input yields an empty list.
    pub fn parse_list(list: &str) -> Result<Vec<PercentileRequirement>> {
        list.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Self::parse_one)
            .collect()
    }

    fn parse_one(part: &str) -> Result<PercentileRequirement> {
        let (percentage, millis) = part.split_once(':').ok_or_else(|| {
            PerfError::InvalidConfig(format!(
                "percentile requirement {part:?} must be percentage:millis"
            ))
        })?;
        let percentage: u32 = percentage.trim().parse().map_err(|_| {
            PerfError::InvalidConfig(format!("invalid percentage in {part:?}"))
        })?;
        if !(1..=100).contains(&percentage) {
            return Err(PerfError::InvalidConfig(format!(
                "percentage must be between 1 and 100, got {percentage}"
            )));
        }
        let millis: u64 = millis.trim().parse().map_err(|_| {
            PerfError::InvalidConfig(format!("invalid millis in {part:?}"))
        })?;
        Ok(PercentileRequirement { percentage, millis })
    }
}

/// Declared performance thresholds for one measured run. `None` means "not configured".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequirementSet {
    /// Maximum latency of any single call (ms).
    pub max: Option<u64>,
    /// Maximum average latency (ms).
    pub average: Option<u64>,
    /// Maximum elapsed time of the whole run (ms).
    pub total_time: Option<u64>,
    /// Minimum calls per second.
    pub throughput: Option<u64>,
    pub percentiles: Vec<PercentileRequirement>,
    pub allowed_errors_rate: f64,
    pub allow_error: bool,
}

impl RequirementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max(mut self, millis: u64) -> Self {
        self.max = Some(millis);
        self
    }

    pub fn with_average(mut self, millis: u64) -> Self {
        self.average = Some(millis);
        self
    }

    pub fn with_total_time(mut self, millis: u64) -> Self {
        self.total_time = Some(millis);
        self
    }

    pub fn with_throughput(mut self, calls_per_sec: u64) -> Self {
        self.throughput = Some(calls_per_sec);
        self
    }

    /// Shorthand for a 50th-percentile requirement.
    pub fn with_median(self, millis: u64) -> Self {
        self.with_percentile(50, millis)
    }

    pub fn with_percentile(mut self, percentage: u32, millis: u64) -> Self {
        self.percentiles.push(PercentileRequirement::new(percentage, millis));
        self
    }

    /// Allow errors up to `rate` (0.0..=1.0). A rate of 0 leaves errors disallowed.
    pub fn with_allowed_errors_rate(mut self, rate: f64) -> Self {
        self.allowed_errors_rate = rate;
        self.allow_error = rate > 0.0;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.allowed_errors_rate) {
            return Err(PerfError::InvalidConfig(format!(
                "allowed errors rate must be within [0, 1], got {}",
                self.allowed_errors_rate
            )));
        }
        if let Some(p) = self.percentiles.iter().find(|p| p.percentage == 0 || p.percentage > 100) {
            return Err(PerfError::InvalidConfig(format!(
                "percentage must be between 1 and 100, got {}",
                p.percentage
            )));
        }
        Ok(())
    }

    /// Returns `true` if none of the thresholds is configured.
    pub fn is_empty(&self) -> bool {
        self.max.is_none()
            && self.average.is_none()
            && self.total_time.is_none()
            && self.throughput.is_none()
            && self.percentiles.is_empty()
            && !self.allow_error
    }
}
