//! Report collaborators notified over the lifecycle of a measured run.

use parking_lot::Mutex;
use perftrack_common::{ExecutionPolicy, RequirementSet};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{INVOCATION_FILE_SUFFIX, SUMMARY_FILE_NAME};
use crate::stat::{CounterSnapshot, LatencyCounter};

/// Receives run events. `invoked` is called concurrently from worker threads.
pub trait ReportModule: Send + Sync {
    fn starting(&self, _service_id: &str) {}

    fn invoked(&self, _service_id: &str, _latency: u64, _start_time: i64) {}

    /// A call failed and the failure was suppressed because errors are allowed.
    fn error(&self, _service_id: &str) {}

    /// `counters[0]` belongs to the primary clock.
    fn completed(
        &self,
        _service_id: &str,
        _counters: &[LatencyCounter],
        _policy: &ExecutionPolicy,
        _requirement: Option<&RequirementSet>,
    ) {
    }
}

/// Report folder plus the modules registered for a run.
#[derive(Clone, Default)]
pub struct ReportContext {
    report_folder: PathBuf,
    modules: Vec<Arc<dyn ReportModule>>,
}

impl ReportContext {
    pub fn new(report_folder: impl Into<PathBuf>) -> Self {
        Self {
            report_folder: report_folder.into(),
            modules: Vec::new(),
        }
    }

    pub fn with_module(mut self, module: Arc<dyn ReportModule>) -> Self {
        self.modules.push(module);
        self
    }

    /// Register the CSV summary and invocation modules writing into this context's folder.
    pub fn with_csv_reports(self, files: Arc<ReportFiles>) -> Self {
        let folder = self.report_folder.clone();
        self.with_module(Arc::new(CsvSummaryReportModule::new(folder.clone(), files)))
            .with_module(Arc::new(CsvInvocationReportModule::new(folder)))
    }

    pub fn report_folder(&self) -> &Path {
        &self.report_folder
    }

    pub fn modules(&self) -> &[Arc<dyn ReportModule>] {
        &self.modules
    }
}

// --- In-memory ---

#[derive(Debug, Clone, PartialEq)]
pub enum ReportEvent {
    Starting { service_id: String },
    Invoked {
        service_id: String,
        latency: u64,
        start_time: i64,
    },
    Error { service_id: String },
    Completed {
        service_id: String,
        sample_count: usize,
        clocks: Vec<String>,
    },
}

/// Keeps every event in memory, in arrival order.
#[derive(Default)]
pub struct ListReportModule {
    events: Mutex<Vec<ReportEvent>>,
}

impl ListReportModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.count(|e| matches!(e, ReportEvent::Invoked { .. }))
    }

    pub fn error_count(&self) -> usize {
        self.count(|e| matches!(e, ReportEvent::Error { .. }))
    }

    pub fn completed_count(&self) -> usize {
        self.count(|e| matches!(e, ReportEvent::Completed { .. }))
    }

    fn count(&self, pred: impl Fn(&ReportEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(*e)).count()
    }
}

impl ReportModule for ListReportModule {
    fn starting(&self, service_id: &str) {
        self.events.lock().push(ReportEvent::Starting {
            service_id: service_id.to_string(),
        });
    }

    fn invoked(&self, service_id: &str, latency: u64, start_time: i64) {
        self.events.lock().push(ReportEvent::Invoked {
            service_id: service_id.to_string(),
            latency,
            start_time,
        });
    }

    fn error(&self, service_id: &str) {
        self.events.lock().push(ReportEvent::Error {
            service_id: service_id.to_string(),
        });
    }

    fn completed(
        &self,
        service_id: &str,
        counters: &[LatencyCounter],
        _policy: &ExecutionPolicy,
        _requirement: Option<&RequirementSet>,
    ) {
        self.events.lock().push(ReportEvent::Completed {
            service_id: service_id.to_string(),
            sample_count: counters.first().map(|c| c.sample_count()).unwrap_or(0),
            clocks: counters.iter().map(|c| c.clock_name().to_string()).collect(),
        });
    }
}

// --- tracing ---

/// Emits run events as `tracing` events.
pub struct LoggerReportModule;

impl ReportModule for LoggerReportModule {
    fn starting(&self, service_id: &str) {
        info!(service_id, "tracking started");
    }

    fn invoked(&self, service_id: &str, latency: u64, start_time: i64) {
        debug!(service_id, latency, start_time, "invocation");
    }

    fn error(&self, service_id: &str) {
        warn!(service_id, "invocation failed, error suppressed");
    }

    fn completed(
        &self,
        service_id: &str,
        counters: &[LatencyCounter],
        _policy: &ExecutionPolicy,
        _requirement: Option<&RequirementSet>,
    ) {
        for counter in counters {
            match counter.snapshot() {
                Ok(snapshot) => info!(
                    service_id,
                    clock = counter.clock_name(),
                    samples = snapshot.sample_count(),
                    duration = snapshot.duration,
                    "{snapshot}"
                ),
                Err(err) => warn!(service_id, %err, "no summary available"),
            }
        }
    }
}

// --- CSV ---

/// Report files this process has already written to. Created once per process and shared by
/// every module that appends to a common file; a file found on disk that this process has not
/// used yet is left over from an earlier process and is replaced.
#[derive(Default)]
pub struct ReportFiles {
    used: Mutex<HashSet<PathBuf>>,
}

impl ReportFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `path` ready for appending: delete a stale copy on first use, then write `header`
    /// if the file does not exist.
    pub fn prepare(&self, path: &Path, header: &str) -> io::Result<()> {
        let mut used = self.used.lock();
        if used.insert(path.to_path_buf()) && path.exists() {
            fs::remove_file(path)?;
        }
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(path)?;
            writeln!(file, "{header}")?;
        }
        Ok(())
    }

    pub fn is_used(&self, path: &Path) -> bool {
        self.used.lock().contains(path)
    }

    /// Forget every file, as at the start of a new process.
    pub fn clear(&self) {
        self.used.lock().clear();
    }
}

pub const SUMMARY_HEADER: &str =
    "serviceId,startTime,duration,invocations,min,average,median,90%,95%,99%,max";

/// Appends one row per completed run to `summary.csv`.
pub struct CsvSummaryReportModule {
    path: PathBuf,
    files: Arc<ReportFiles>,
}

impl CsvSummaryReportModule {
    pub fn new(report_folder: impl AsRef<Path>, files: Arc<ReportFiles>) -> Self {
        Self {
            path: report_folder.as_ref().join(SUMMARY_FILE_NAME),
            files,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, row: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().append(true).create(true).open(&self.path)?;
        writeln!(file, "{row}")
    }
}

impl ReportModule for CsvSummaryReportModule {
    fn starting(&self, service_id: &str) {
        if let Err(err) = self.files.prepare(&self.path, SUMMARY_HEADER) {
            error!(service_id, path = %self.path.display(), %err, "cannot prepare summary report");
        }
    }

    fn completed(
        &self,
        service_id: &str,
        counters: &[LatencyCounter],
        _policy: &ExecutionPolicy,
        _requirement: Option<&RequirementSet>,
    ) {
        let Some(main) = counters.first() else {
            return;
        };
        let row = match main.snapshot() {
            Ok(snapshot) => summary_row(service_id, &snapshot),
            Err(err) => {
                error!(service_id, %err, "cannot summarize run");
                return;
            }
        };
        if let Err(err) = self.append(&row) {
            error!(service_id, path = %self.path.display(), %err, "cannot write summary report");
        }
    }
}

/// One `summary.csv` row. Statistics of an empty run are left blank.
pub fn summary_row(service_id: &str, snapshot: &CounterSnapshot) -> String {
    let cell = |v: perftrack_common::Result<u64>| v.map(|v| v.to_string()).unwrap_or_default();
    let average = snapshot.average_latency().map(format_average).unwrap_or_default();
    [
        service_id.to_string(),
        snapshot.start_time.to_string(),
        snapshot.duration.to_string(),
        snapshot.sample_count().to_string(),
        cell(snapshot.min_latency()),
        average,
        cell(snapshot.percentile_latency(50)),
        cell(snapshot.percentile_latency(90)),
        cell(snapshot.percentile_latency(95)),
        cell(snapshot.percentile_latency(99)),
        cell(snapshot.max_latency()),
    ]
    .join(",")
}

/// At most one decimal, no trailing `.0`.
pub fn format_average(value: f64) -> String {
    let formatted = format!("{value:.1}");
    match formatted.strip_suffix(".0") {
        Some(whole) => whole.to_string(),
        None => formatted,
    }
}

pub const INVOCATION_HEADER: &str = "latency,startTime";

/// Writes every invocation of a run to `<serviceId>.inv.csv`.
pub struct CsvInvocationReportModule {
    report_folder: PathBuf,
    out: Mutex<Option<BufWriter<File>>>,
}

impl CsvInvocationReportModule {
    pub fn new(report_folder: impl Into<PathBuf>) -> Self {
        Self {
            report_folder: report_folder.into(),
            out: Mutex::new(None),
        }
    }

    pub fn path_for(&self, service_id: &str) -> PathBuf {
        self.report_folder.join(format!("{service_id}{INVOCATION_FILE_SUFFIX}"))
    }

    fn create(&self, service_id: &str) -> io::Result<BufWriter<File>> {
        fs::create_dir_all(&self.report_folder)?;
        let mut out = BufWriter::new(File::create(self.path_for(service_id))?);
        writeln!(out, "{INVOCATION_HEADER}")?;
        Ok(out)
    }
}

impl ReportModule for CsvInvocationReportModule {
    fn starting(&self, service_id: &str) {
        match self.create(service_id) {
            Ok(out) => *self.out.lock() = Some(out),
            Err(err) => error!(service_id, %err, "cannot create invocation report"),
        }
    }

    fn invoked(&self, service_id: &str, latency: u64, start_time: i64) {
        if let Some(out) = self.out.lock().as_mut() {
            if let Err(err) = writeln!(out, "{latency},{start_time}") {
                error!(service_id, %err, "cannot write invocation report");
            }
        }
    }

    fn completed(
        &self,
        service_id: &str,
        _counters: &[LatencyCounter],
        _policy: &ExecutionPolicy,
        _requirement: Option<&RequirementSet>,
    ) {
        if let Some(mut out) = self.out.lock().take() {
            if let Err(err) = out.flush() {
                error!(service_id, %err, "cannot flush invocation report");
            }
        }
    }
}
