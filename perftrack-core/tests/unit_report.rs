use perftrack_common::{ExecutionPolicy, InvocationError};
use perftrack_core::report::{
    format_average, summary_row, CsvInvocationReportModule, CsvSummaryReportModule,
    ListReportModule, ReportEvent, ReportFiles, INVOCATION_HEADER, SUMMARY_HEADER,
};
use perftrack_core::{
    Clock, FnInvoker, LatencyCounter, ManualClock, PerformanceTracker, ReportContext, ReportModule,
};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn stopped_counter(latencies: &[u64]) -> LatencyCounter {
    let clock = Arc::new(ManualClock::new(1_000));
    let counter = LatencyCounter::new("svc", "system", 16, clock.clone());
    counter.start().unwrap();
    for (i, latency) in latencies.iter().enumerate() {
        counter.add_sample(*latency, 1_000 + i as i64, None).unwrap();
    }
    clock.advance(250);
    counter.stop().unwrap();
    counter
}

#[test]
fn test_format_average() {
    assert_eq!(format_average(12.0), "12");
    assert_eq!(format_average(12.24), "12.2");
    assert_eq!(format_average(12.26), "12.3");
    assert_eq!(format_average(0.0), "0");
}

#[test]
fn test_summary_row() {
    let counter = stopped_counter(&[10, 20, 30, 40]);
    let row = summary_row("svc", &counter.snapshot().unwrap());
    assert_eq!(row, "svc,1000,250,4,10,25,20,40,40,40,40");
    assert_eq!(row.split(',').count(), SUMMARY_HEADER.split(',').count());
}

#[test]
fn test_summary_row_of_empty_run_leaves_statistics_blank() {
    let counter = stopped_counter(&[]);
    let row = summary_row("svc", &counter.snapshot().unwrap());
    assert_eq!(row, "svc,1000,250,0,,,,,,,");
}

#[test]
fn test_report_files_replace_stale_file_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("summary.csv");
    fs::write(&path, "left over from an earlier process\n").unwrap();

    let files = ReportFiles::new();
    files.prepare(&path, "a,b").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n");
    assert!(files.is_used(&path));

    fs::write(&path, "a,b\n1,2\n").unwrap();
    files.prepare(&path, "a,b").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n1,2\n", "file in use is kept");

    files.clear();
    assert!(!files.is_used(&path));
    files.prepare(&path, "a,b").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n");
}

#[test]
fn test_csv_summary_appends_one_row_per_run() {
    let dir = TempDir::new().unwrap();
    let files = Arc::new(ReportFiles::new());
    let module = CsvSummaryReportModule::new(dir.path(), files);
    let policy = ExecutionPolicy::default();

    for _ in 0..2 {
        module.starting("svc");
        module.completed("svc", &[stopped_counter(&[5, 15])], &policy, None);
    }

    let content = fs::read_to_string(module.path()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], SUMMARY_HEADER);
    assert_eq!(lines[1], "svc,1000,250,2,5,10,5,15,15,15,15");
    assert_eq!(lines[1], lines[2]);
}

#[test]
fn test_csv_invocation_writes_every_call() {
    let dir = TempDir::new().unwrap();
    let module = CsvInvocationReportModule::new(dir.path().join("nested"));
    let policy = ExecutionPolicy::default();

    module.starting("svc");
    module.invoked("svc", 12, 1_000);
    module.invoked("svc", 7, 1_012);
    module.completed("svc", &[], &policy, None);

    let content = fs::read_to_string(module.path_for("svc")).unwrap();
    assert_eq!(content, format!("{INVOCATION_HEADER}\n12,1000\n7,1012\n"));
}

#[test]
fn test_csv_reports_through_a_tracker() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(0));
    let ticking = clock.clone();
    let invoker = FnInvoker::new("tracked", move || {
        ticking.advance(3);
        Ok::<_, InvocationError>(())
    });
    let context = ReportContext::new(dir.path()).with_csv_reports(Arc::new(ReportFiles::new()));
    let clocks: Vec<Arc<dyn Clock>> = vec![clock.clone()];
    let tracker = PerformanceTracker::builder(invoker)
        .context(context)
        .clocks(clocks)
        .timer(clock)
        .build()
        .unwrap();

    for _ in 0..3 {
        tracker.invoke().unwrap();
    }
    tracker.stop_tracking().unwrap();

    let summary = fs::read_to_string(dir.path().join("summary.csv")).unwrap();
    assert_eq!(summary.lines().nth(1), Some("tracked,0,9,3,3,3,3,3,3,3,3"));
    let invocations = fs::read_to_string(dir.path().join("tracked.inv.csv")).unwrap();
    assert_eq!(invocations.lines().skip(1).collect::<Vec<_>>(), vec!["3,0", "3,3", "3,6"]);
}

#[test]
fn test_list_report_module_counts_events() {
    let list = ListReportModule::new();
    let policy = ExecutionPolicy::default();
    list.starting("svc");
    list.invoked("svc", 1, 0);
    list.invoked("svc", 2, 1);
    list.error("svc");
    list.completed("svc", &[stopped_counter(&[1, 2])], &policy, None);

    assert_eq!(list.invocation_count(), 2);
    assert_eq!(list.error_count(), 1);
    assert_eq!(list.completed_count(), 1);
    assert_eq!(list.events()[0], ReportEvent::Starting { service_id: "svc".to_string() });
}
