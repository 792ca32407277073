use perftrack_common::{ExecutionPolicy, PercentileRequirement, PerfError, RequirementSet, Verdict};

#[test]
fn test_empty_requirement_set() {
    let req = RequirementSet::new();
    assert!(req.is_empty());
    assert!(!req.allow_error);
    assert!(req.validate().is_ok());
}

#[test]
fn test_builder_sets_thresholds() {
    let req = RequirementSet::new()
        .with_max(200)
        .with_average(50)
        .with_total_time(1_000)
        .with_throughput(10)
        .with_median(40)
        .with_percentile(90, 80);
    assert_eq!(req.max, Some(200));
    assert_eq!(req.average, Some(50));
    assert_eq!(req.total_time, Some(1_000));
    assert_eq!(req.throughput, Some(10));
    assert_eq!(
        req.percentiles,
        vec![PercentileRequirement::new(50, 40), PercentileRequirement::new(90, 80)]
    );
    assert!(!req.is_empty());
}

#[test]
fn test_allowed_errors_rate_zero_disallows_errors() {
    assert!(!RequirementSet::new().with_allowed_errors_rate(0.0).allow_error);
    assert!(RequirementSet::new().with_allowed_errors_rate(0.1).allow_error);
}

#[test]
fn test_allowed_errors_rate_out_of_range_rejected() {
    let req = RequirementSet::new().with_allowed_errors_rate(1.5);
    assert!(matches!(req.validate(), Err(PerfError::InvalidConfig(_))));
}

#[test]
fn test_parse_percentile_list() {
    let parsed = PercentileRequirement::parse_list("90:50, 95:80,99:200").unwrap();
    assert_eq!(
        parsed,
        vec![
            PercentileRequirement::new(90, 50),
            PercentileRequirement::new(95, 80),
            PercentileRequirement::new(99, 200),
        ]
    );
    assert!(PercentileRequirement::parse_list("  ").unwrap().is_empty());
}

#[test]
fn test_parse_percentile_list_rejects_garbage() {
    for bad in ["90", "abc:10", "90:-5", "0:10", "101:10"] {
        assert!(
            matches!(PercentileRequirement::parse_list(bad), Err(PerfError::InvalidConfig(_))),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn test_requirement_set_from_json_with_missing_fields() {
    let json = r#"{"max": 200, "percentiles": [{"percentage": 90, "millis": 50}]}"#;
    let req: RequirementSet = serde_json::from_str(json).unwrap();
    assert_eq!(req.max, Some(200));
    assert_eq!(req.average, None);
    assert_eq!(req.percentiles, vec![PercentileRequirement::new(90, 50)]);
    assert!(!req.allow_error);
}

#[test]
fn test_policy_defaults() {
    let policy = ExecutionPolicy::default();
    assert_eq!(policy.invocations, 1);
    assert_eq!(policy.threads, 1);
    assert_eq!(policy.warm_up_millis, 0);
    assert!(policy.cancel_on_violation);
    assert!(policy.run_duration().is_none());
    assert!(policy.validate().is_ok());
}

#[test]
fn test_policy_validation() {
    assert!(ExecutionPolicy::invocations(10).with_threads(0).validate().is_err());
    assert!(ExecutionPolicy::invocations(0).validate().is_err());
    let timed = ExecutionPolicy::duration(500);
    assert!(timed.validate().is_ok());
    assert_eq!(timed.run_duration(), Some(std::time::Duration::from_millis(500)));
}

#[test]
fn test_verdict_helpers() {
    assert_eq!(Verdict::from_check(true), Verdict::Success);
    assert_eq!(Verdict::from_check(false), Verdict::Failure);
    assert!(Verdict::Failure.is_failure());
    assert!(!Verdict::Ignored.is_failure());
    assert_eq!(Verdict::Ignored.to_string(), "IGNORED");
}
