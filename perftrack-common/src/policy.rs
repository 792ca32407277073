use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{PerfError, Result};

/// How a measured run is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionPolicy {
    /// Calls started within this many ms of the first call are executed but not measured.
    pub warm_up_millis: u64,
    /// Fail the run as soon as one call exceeds the `max` requirement.
    pub cancel_on_violation: bool,
    pub threads: usize,
    /// Total number of calls; 0 means "until `duration_millis` elapses".
    pub invocations: u64,
    pub duration_millis: u64,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            warm_up_millis: 0,
            cancel_on_violation: true,
            threads: 1,
            invocations: 1,
            duration_millis: 0,
        }
    }
}

impl ExecutionPolicy {
    pub fn invocations(invocations: u64) -> Self {
        Self {
            invocations,
            ..Self::default()
        }
    }

    /// Run for `millis` instead of a fixed number of calls.
    pub fn duration(millis: u64) -> Self {
        Self {
            invocations: 0,
            duration_millis: millis,
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_warm_up(mut self, millis: u64) -> Self {
        self.warm_up_millis = millis;
        self
    }

    pub fn with_cancel_on_violation(mut self, cancel: bool) -> Self {
        self.cancel_on_violation = cancel;
        self
    }

    /// `Some` when the run is bounded by time rather than by call count.
    pub fn run_duration(&self) -> Option<Duration> {
        (self.invocations == 0).then(|| Duration::from_millis(self.duration_millis))
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(PerfError::InvalidConfig("threads must be at least 1".to_string()));
        }
        if self.invocations == 0 && self.duration_millis == 0 {
            return Err(PerfError::InvalidConfig(
                "either invocations or duration must be set".to_string(),
            ));
        }
        Ok(())
    }
}
