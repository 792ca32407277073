use perftrack_common::InvocationError;
use perftrack_core::Invoker;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// What one synthetic call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub delay_millis: u64,
    pub fails: bool,
}

/// Latency shapes the synthetic unit of work can take.
///
/// | Profile  | Delay                                   | Fails        |
/// |----------|-----------------------------------------|--------------|
/// | Steady   | base                                    | never        |
/// | Jittery  | base for 90% of calls, 10x base for 10% | never        |
/// | Ramp     | base + 1 ms per 10 calls                | never        |
/// | Flaky    | base                                    | 10% of calls |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadProfile {
    Steady,
    Jittery,
    Ramp,
    Flaky,
}

impl WorkloadProfile {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "steady" => Some(WorkloadProfile::Steady),
            "jittery" => Some(WorkloadProfile::Jittery),
            "ramp" => Some(WorkloadProfile::Ramp),
            "flaky" => Some(WorkloadProfile::Flaky),
            _ => None,
        }
    }

    pub fn as_name(&self) -> &'static str {
        match self {
            WorkloadProfile::Steady => "steady",
            WorkloadProfile::Jittery => "jittery",
            WorkloadProfile::Ramp => "ramp",
            WorkloadProfile::Flaky => "flaky",
        }
    }

    /// Draw the step for the `call`-th invocation using `rng`.
    pub fn sample(&self, rng: &mut impl Rng, call: u64, base_millis: u64) -> Step {
        let roll: u32 = rng.gen_range(0..100);
        Step {
            delay_millis: self.delay_for_roll(roll, call, base_millis),
            fails: self.fails_for_roll(roll),
        }
    }

    /// Map a roll in `0..100` to a delay. Exposed for deterministic testing.
    pub fn delay_for_roll(&self, roll: u32, call: u64, base_millis: u64) -> u64 {
        match self {
            WorkloadProfile::Jittery if roll >= 90 => base_millis * 10,
            WorkloadProfile::Ramp => base_millis + call / 10,
            _ => base_millis,
        }
    }

    pub fn fails_for_roll(&self, roll: u32) -> bool {
        matches!(self, WorkloadProfile::Flaky) && roll < 10
    }
}

/// Sleeping unit of work following a [`WorkloadProfile`]. Each call seeds its own generator
/// from `seed` and the call index, so a run is reproducible for a given seed.
pub struct SyntheticWorkload {
    id: String,
    profile: WorkloadProfile,
    base_millis: u64,
    seed: u64,
    calls: AtomicU64,
}

impl SyntheticWorkload {
    pub fn new(profile: WorkloadProfile, base_millis: u64, seed: u64) -> Self {
        Self {
            id: format!("synthetic-{}", profile.as_name()),
            profile,
            base_millis,
            seed,
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Invoker for SyntheticWorkload {
    type Output = Step;

    fn id(&self) -> &str {
        &self.id
    }

    fn invoke(&self) -> Result<Step, InvocationError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(call));
        let step = self.profile.sample(&mut rng, call, self.base_millis);
        if step.delay_millis > 0 {
            thread::sleep(Duration::from_millis(step.delay_millis));
        }
        if step.fails {
            return Err(InvocationError::execution(format!("synthetic failure on call {call}")));
        }
        Ok(step)
    }
}
