use perftrack_common::{ExecutionPolicy, PerfError, RequirementSet, Result, Verdict};
use perftrack_core::{CounterSnapshot, Evaluation};
use std::fmt;

/// Process exit code for a run outcome: 0 pass, 1 requirement failure,
/// 2 execution or assertion failure, 3 setup error.
pub fn exit_code(outcome: &Result<()>) -> i32 {
    match outcome {
        Ok(()) => 0,
        Err(PerfError::RequirementViolation(_)) => 1,
        Err(
            PerfError::Execution(_) | PerfError::AssertionFailed(_) | PerfError::Unexpected(_),
        ) => 2,
        Err(
            PerfError::InvalidConfig(_) | PerfError::InvalidState(_) | PerfError::EmptyStatistics,
        ) => 3,
    }
}

pub fn mark(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Success => "✓",
        Verdict::Failure => "✗",
        Verdict::Ignored => "-",
    }
}

pub fn format_thousands(n: u64) -> String {
    if n >= 1_000_000 {
        format!("~{}M", n / 1_000_000)
    } else if n >= 1_000 {
        format!("~{}K", n / 1_000)
    } else {
        n.to_string()
    }
}

/// Results table printed after a run.
pub struct RunReport<'a> {
    pub workload: &'a str,
    pub policy: &'a ExecutionPolicy,
    pub requirement: &'a RequirementSet,
    pub snapshot: Option<&'a CounterSnapshot>,
    pub evaluation: Option<&'a Evaluation>,
    pub outcome: &'a Result<()>,
}

impl fmt::Display for RunReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Perftrack Results")?;
        writeln!(f, "=================")?;
        writeln!(f, "Workload:              {}", self.workload)?;
        writeln!(f, "Threads:               {}", self.policy.threads)?;
        match self.policy.run_duration() {
            Some(duration) => writeln!(f, "Duration:              {} ms", duration.as_millis())?,
            None => writeln!(f, "Invocations:           {}", self.policy.invocations)?,
        }
        if self.policy.warm_up_millis > 0 {
            writeln!(f, "Warm-up:               {} ms", self.policy.warm_up_millis)?;
        }
        writeln!(f)?;

        let Some(snapshot) = self.snapshot else {
            writeln!(f, "Nothing was measured.")?;
            return self.write_result(f);
        };
        let ms = |v: Result<u64>| {
            v.map(|v| format!("{v} ms"))
                .unwrap_or_else(|_| "n/a".to_string())
        };
        let samples = format_thousands(snapshot.sample_count() as u64);
        writeln!(f, "Samples:               {samples}")?;
        writeln!(f, "Errors:                {}", snapshot.error_count)?;
        writeln!(f, "Elapsed:               {} ms", snapshot.duration)?;
        writeln!(f, "Throughput:            {} calls/s", snapshot.throughput())?;
        writeln!(f, "Min latency:           {}", ms(snapshot.min_latency()))?;
        match snapshot.average_latency() {
            Ok(average) => writeln!(f, "Average latency:       {average:.1} ms")?,
            Err(_) => writeln!(f, "Average latency:       n/a")?,
        }
        writeln!(f, "Median latency:        {}", ms(snapshot.percentile_latency(50)))?;
        writeln!(f, "P90 latency:           {}", ms(snapshot.percentile_latency(90)))?;
        writeln!(f, "P99 latency:           {}", ms(snapshot.percentile_latency(99)))?;
        writeln!(f, "Max latency:           {}", ms(snapshot.max_latency()))?;

        if let Some(evaluation) = self.evaluation {
            writeln!(f)?;
            self.write_verdicts(f, evaluation)?;
        }
        self.write_result(f)
    }
}

impl RunReport<'_> {
    fn write_verdicts(&self, f: &mut fmt::Formatter<'_>, evaluation: &Evaluation) -> fmt::Result {
        let req = self.requirement;
        if req.is_empty() {
            writeln!(f, "Requirements:          none declared")?;
        }
        if let Some(max) = req.max {
            let verdict = mark(evaluation.max);
            writeln!(f, "Max:                   [threshold: {max} ms]  {verdict}")?;
        }
        if let Some(average) = req.average {
            let verdict = mark(evaluation.average);
            writeln!(f, "Average:               [threshold: {average} ms]  {verdict}")?;
        }
        if let Some(total) = req.total_time {
            let verdict = mark(evaluation.total_time);
            writeln!(f, "Total time:            [threshold: {total} ms]  {verdict}")?;
        }
        if let Some(throughput) = req.throughput {
            writeln!(
                f,
                "Throughput:            [threshold: {throughput} calls/s]  {}",
                mark(evaluation.throughput)
            )?;
        }
        for (percentile, verdict) in &evaluation.percentiles {
            let label = format!("P{}:", percentile.percentage);
            writeln!(
                f,
                "{label:<23}[threshold: {} ms]  {}",
                percentile.millis,
                mark(*verdict)
            )?;
        }
        if req.allow_error {
            writeln!(
                f,
                "Error rate:            [threshold: {:.3}%]  {}",
                req.allowed_errors_rate * 100.0,
                mark(evaluation.errors)
            )?;
        } else {
            writeln!(f, "Errors:                [none allowed]  {}", mark(evaluation.errors))?;
        }
        Ok(())
    }

    fn write_result(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        match self.outcome {
            Ok(()) => write!(f, "Result: PASS"),
            Err(err) => write!(f, "Result: FAIL ({err})"),
        }
    }
}
