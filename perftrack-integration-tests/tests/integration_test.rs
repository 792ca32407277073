use perftrack_common::{Config, ExecutionPolicy, InvocationError, PerfError, RequirementSet};
use perftrack_core::report::{ListReportModule, ReportFiles};
use perftrack_core::{
    run_perf_test, Coordinator, Invoker, PerformanceTracker, ReportContext, RunSummary,
};
use perftrack_integration_tests::{always_failing, scripted, sleeping};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn measure<I: Invoker>(
    invoker: I,
    policy: ExecutionPolicy,
    requirement: RequirementSet,
) -> (Result<(), PerfError>, RunSummary) {
    let context = ReportContext::new("unused").with_module(Arc::new(ListReportModule::new()));
    let coordinator = Coordinator::new(&policy).expect("valid policy");
    let tracker = PerformanceTracker::builder(invoker)
        .policy(policy)
        .requirement(requirement)
        .context(context)
        .build()
        .expect("valid tracker");
    let outcome = coordinator.run(&tracker);
    let snapshot = tracker.counters().map(|c| c[0].snapshot().expect("started counter"));
    let summary = RunSummary {
        measured: true,
        invocations_started: coordinator.invocations_started(),
        workers: coordinator.worker_count(),
        snapshot,
    };
    (outcome, summary)
}

fn is_violation(outcome: &Result<(), PerfError>, fragment: &str) -> bool {
    matches!(outcome, Err(PerfError::RequirementViolation(m)) if m.contains(fragment))
}

// --- Concurrency ---

#[test]
fn test_three_threads_share_ten_invocations() {
    let (outcome, summary) = measure(
        sleeping("threads3", vec![20]),
        ExecutionPolicy::invocations(10).with_threads(3),
        RequirementSet::new(),
    );
    assert_eq!(outcome, Ok(()));
    assert_eq!(summary.invocations_started, 10);
    assert_eq!(summary.workers, 3);
    assert_eq!(summary.snapshot.expect("measured").sample_count(), 10);
}

#[test]
fn test_duration_mode() {
    let (outcome, summary) = measure(
        sleeping("timed", vec![10]),
        ExecutionPolicy::duration(200),
        RequirementSet::new(),
    );
    assert_eq!(outcome, Ok(()));
    let snapshot = summary.snapshot.expect("measured");
    assert!(snapshot.duration >= 190, "ran only {} ms", snapshot.duration);
    assert!((5..=21).contains(&snapshot.sample_count()), "{} samples", snapshot.sample_count());
}

#[test]
fn test_warm_up_calls_are_excluded() {
    let (outcome, summary) = measure(
        sleeping("warm", vec![10]),
        ExecutionPolicy::invocations(20).with_warm_up(50),
        RequirementSet::new(),
    );
    assert_eq!(outcome, Ok(()));
    assert_eq!(summary.invocations_started, 20);
    let snapshot = summary.snapshot.expect("measured");
    assert!(snapshot.sample_count() < 20);
    assert!(snapshot.sample_count() >= 10, "{} samples", snapshot.sample_count());
}

// --- Max and cancel on violation ---

#[test]
fn test_cancel_on_violation_stops_the_run() {
    let (outcome, summary) = measure(
        sleeping("cancel", vec![150, 300, 450]),
        ExecutionPolicy::invocations(3),
        RequirementSet::new().with_max(200),
    );
    assert!(is_violation(&outcome, "exceeded time limit of 200 ms"), "{outcome:?}");
    assert_eq!(summary.invocations_started, 2);
}

#[test]
fn test_without_cancel_all_calls_run_and_max_fails_at_stop() {
    let (outcome, summary) = measure(
        sleeping("dont-cancel", vec![150, 300, 450]),
        ExecutionPolicy::invocations(3).with_cancel_on_violation(false),
        RequirementSet::new().with_max(200),
    );
    assert!(is_violation(&outcome, "maximum latency of 200 ms"), "{outcome:?}");
    assert_eq!(summary.invocations_started, 3);
    assert_eq!(summary.snapshot.expect("measured").sample_count(), 3);
}

// --- Errors ---

#[test]
fn test_error_fails_the_run_when_not_allowed() {
    let (outcome, summary) = measure(
        always_failing("no-errors", 1),
        ExecutionPolicy::invocations(10),
        RequirementSet::new().with_allowed_errors_rate(0.0),
    );
    assert_eq!(outcome, Err(PerfError::Execution("call 0 failed".to_string())));
    assert_eq!(summary.invocations_started, 1);
}

#[test]
fn test_error_rate_above_allowance_fails_at_stop() {
    let (outcome, summary) = measure(
        always_failing("some-errors", 1),
        ExecutionPolicy::invocations(5),
        RequirementSet::new().with_allowed_errors_rate(0.1),
    );
    assert!(is_violation(&outcome, "maximum error rate of"), "{outcome:?}");
    assert_eq!(summary.invocations_started, 5);
}

#[test]
fn test_all_errors_allowed() {
    let (outcome, summary) = measure(
        always_failing("all-errors", 0),
        ExecutionPolicy::invocations(100),
        RequirementSet::new().with_allowed_errors_rate(1.0),
    );
    assert_eq!(outcome, Ok(()));
    let snapshot = summary.snapshot.expect("measured");
    assert_eq!(snapshot.sample_count(), 100);
    assert_eq!(snapshot.errors_rate(), Ok(1.0));
}

#[test]
fn test_assertion_failure_ends_the_run() {
    let (outcome, summary) = measure(
        scripted("asserting", vec![5], |n| {
            if n == 2 {
                Err(InvocationError::Assertion("expected 3, got 4".to_string()))
            } else {
                Ok(())
            }
        }),
        ExecutionPolicy::invocations(10).with_cancel_on_violation(false),
        RequirementSet::new().with_max(1),
    );
    assert_eq!(outcome, Err(PerfError::AssertionFailed("expected 3, got 4".to_string())));
    assert_eq!(summary.invocations_started, 3);
}

#[test]
fn test_assertions_within_error_allowance_pass() {
    let (outcome, summary) = measure(
        scripted("tolerated", vec![1], |n| {
            if n == 0 {
                Err(InvocationError::Assertion("flaky check".to_string()))
            } else {
                Ok(())
            }
        }),
        ExecutionPolicy::invocations(4),
        RequirementSet::new().with_allowed_errors_rate(0.5).with_average(1),
    );
    // the average requirement is not judged while an assertion failure is on record
    assert_eq!(outcome, Ok(()));
    assert_eq!(summary.snapshot.expect("measured").failures.len(), 1);
}

#[test]
fn test_unexpected_error_propagates_unchanged() {
    let (outcome, _) = measure(
        scripted("bug", vec![1], |_| {
            Err(InvocationError::Unexpected("index out of range".to_string()))
        }),
        ExecutionPolicy::invocations(3).with_threads(2),
        RequirementSet::new().with_allowed_errors_rate(1.0),
    );
    assert_eq!(outcome, Err(PerfError::Unexpected("index out of range".to_string())));
}

// --- Statistics requirements ---

#[test]
fn test_throughput() {
    let policy = ExecutionPolicy::invocations(20);
    let req = RequirementSet::new().with_throughput(10);
    let (outcome, summary) = measure(sleeping("fast", vec![10]), policy.clone(), req);
    assert_eq!(outcome, Ok(()));
    // 10 ms per call is 100 calls/s, less whatever each sleep overshoots
    let throughput = summary.snapshot.expect("measured").throughput();
    assert!((90..110).contains(&throughput), "throughput {throughput}");

    let req = RequirementSet::new().with_throughput(150);
    let (outcome, _) = measure(sleeping("slow", vec![10]), policy, req);
    assert!(is_violation(&outcome, "throughput of only"), "{outcome:?}");
}

#[test]
fn test_total_time() {
    let policy = ExecutionPolicy::invocations(10);
    let req = RequirementSet::new().with_total_time(5_000);
    let (outcome, _) = measure(sleeping("quick", vec![10]), policy.clone(), req);
    assert_eq!(outcome, Ok(()));

    let req = RequirementSet::new().with_total_time(50);
    let (outcome, _) = measure(sleeping("long", vec![10]), policy, req);
    assert!(is_violation(&outcome, "exceeded the total time of 50 ms"), "{outcome:?}");
}

#[test]
fn test_percentiles() {
    let policy = ExecutionPolicy::invocations(10);
    let within = RequirementSet::new().with_percentile(90, 200);
    let (outcome, _) = measure(sleeping("p90-ok", vec![10]), policy.clone(), within);
    assert_eq!(outcome, Ok(()));

    let beyond = RequirementSet::new().with_percentile(90, 5);
    let (outcome, _) = measure(sleeping("p90-slow", vec![10]), policy, beyond);
    assert!(is_violation(&outcome, "90-percentile of p90-slow"), "{outcome:?}");
}

#[test]
fn test_median_and_average() {
    let policy = ExecutionPolicy::invocations(5);
    let (outcome, _) = measure(
        sleeping("fine", vec![10]),
        policy.clone(),
        RequirementSet::new().with_median(200).with_average(200),
    );
    assert_eq!(outcome, Ok(()));

    let req = RequirementSet::new().with_median(1);
    let (outcome, _) = measure(sleeping("median", vec![10]), policy.clone(), req);
    assert!(is_violation(&outcome, "50-percentile"), "{outcome:?}");

    let req = RequirementSet::new().with_average(1);
    let (outcome, _) = measure(sleeping("average", vec![10]), policy, req);
    assert!(is_violation(&outcome, "Average latency of average"), "{outcome:?}");
}

// --- run_perf_test ---

#[test]
fn test_inactive_config_invokes_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let invoker = scripted("inactive", vec![0], move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let config = Config {
        active: false,
        ..Config::default()
    };

    let summary = run_perf_test(
        &config,
        invoker,
        ExecutionPolicy::invocations(50).with_threads(4),
        Some(RequirementSet::new().with_max(0)),
        ReportContext::default(),
    )
    .expect("single call succeeds");

    assert!(!summary.measured);
    assert!(summary.snapshot.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_run_perf_test_writes_csv_reports() {
    let dir = TempDir::new().expect("tempdir");
    let config = Config {
        report_folder: dir.path().to_path_buf(),
        ..Config::default()
    };
    let context = ReportContext::new(&config.report_folder)
        .with_csv_reports(Arc::new(ReportFiles::new()));

    let summary = run_perf_test(
        &config,
        sleeping("reported", vec![2]),
        ExecutionPolicy::invocations(5),
        None,
        context,
    )
    .expect("run passes");
    assert!(summary.measured);
    assert_eq!(summary.invocations_started, 5);

    let summary_csv = fs::read_to_string(dir.path().join("summary.csv")).expect("summary written");
    let rows: Vec<&str> = summary_csv.lines().collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[1].starts_with("reported,"));

    let invocations =
        fs::read_to_string(dir.path().join("reported.inv.csv")).expect("invocations written");
    assert_eq!(invocations.lines().count(), 6);
}
