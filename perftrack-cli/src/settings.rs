use perftrack_common::{ExecutionPolicy, PerfError, RequirementSet, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Policy and requirements of a run, as read from a `--config` JSON file.
/// Missing sections and fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub policy: ExecutionPolicy,
    pub requirement: RequirementSet,
}

impl RunSettings {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| PerfError::InvalidConfig(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| PerfError::InvalidConfig(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// Switch the policy to a fixed number of invocations.
    pub fn set_invocations(&mut self, invocations: u64) {
        self.policy.invocations = invocations;
        self.policy.duration_millis = 0;
    }

    /// Switch the policy to running for `millis`, however many invocations that takes.
    pub fn set_duration(&mut self, millis: u64) {
        self.policy.invocations = 0;
        self.policy.duration_millis = millis;
    }

    pub fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        self.requirement.validate()
    }
}
