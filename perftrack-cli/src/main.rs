use clap::Parser;
use perftrack_cli::settings::RunSettings;
use perftrack_cli::summary::{exit_code, RunReport};
use perftrack_cli::workload::{SyntheticWorkload, WorkloadProfile};
use perftrack_common::{Config, ExecutionPolicy, PercentileRequirement, Result};
use perftrack_core::report::{LoggerReportModule, ReportFiles};
use perftrack_core::verdict::evaluate;
use perftrack_core::{Coordinator, PerformanceTracker, ReportContext};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "perftrack",
    about = "Measure a synthetic workload against performance requirements"
)]
struct Args {
    /// Workload profile: steady | jittery | ramp | flaky
    #[arg(long, default_value = "steady")]
    workload: String,

    /// Base latency of one synthetic call (ms)
    #[arg(long, default_value_t = 5)]
    base_delay: u64,

    /// Seed for the workload's random rolls
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// JSON file with `policy` and `requirement` sections; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Total number of calls
    #[arg(long, conflicts_with = "duration")]
    invocations: Option<u64>,

    /// Run for this long (ms) instead of a fixed number of calls
    #[arg(long)]
    duration: Option<u64>,

    #[arg(long)]
    threads: Option<usize>,

    /// Calls started within this many ms of the first one are not measured
    #[arg(long)]
    warm_up: Option<u64>,

    /// Maximum latency of any call (ms)
    #[arg(long)]
    max: Option<u64>,

    /// Maximum average latency (ms)
    #[arg(long)]
    average: Option<u64>,

    /// Maximum median latency (ms)
    #[arg(long)]
    median: Option<u64>,

    /// Maximum elapsed time of the whole run (ms)
    #[arg(long)]
    total_time: Option<u64>,

    /// Minimum calls per second
    #[arg(long)]
    throughput: Option<u64>,

    /// Percentile limits, e.g. "90:50,99:120"
    #[arg(long)]
    percentiles: Option<String>,

    /// Fraction of calls allowed to fail, 0.0 to 1.0
    #[arg(long)]
    allowed_errors_rate: Option<f64>,

    /// Keep running after a call exceeds --max
    #[arg(long)]
    no_cancel_on_violation: bool,

    /// Write summary.csv and per-invocation CSV files
    #[arg(long)]
    csv: bool,

    /// Folder for CSV reports (default: PERFTRACK_REPORT_DIR or the target folder)
    #[arg(long)]
    report_dir: Option<PathBuf>,
}

fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();

    let args = Args::parse();

    let profile = WorkloadProfile::from_name(&args.workload).unwrap_or_else(|| {
        eprintln!(
            "Unknown workload {:?}. Valid values: steady, jittery, ramp, flaky",
            args.workload
        );
        process::exit(3);
    });

    let settings = build_settings(&args).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(3);
    });

    let config = Config::from_env();
    let folder = args.report_dir.clone().unwrap_or(config.report_folder.clone());
    let mut context = ReportContext::new(folder).with_module(Arc::new(LoggerReportModule));
    if args.csv {
        context = context.with_csv_reports(Arc::new(ReportFiles::new()));
    }
    let report_folder = context.report_folder().to_path_buf();

    let coordinator = Coordinator::new(&settings.policy).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(3);
    });
    let workload = SyntheticWorkload::new(profile, args.base_delay, args.seed);
    let tracker = PerformanceTracker::builder(workload)
        .policy(settings.policy.clone())
        .requirement(settings.requirement.clone())
        .context(context)
        .default_capacity(config.default_capacity)
        .build()
        .unwrap_or_else(|e| {
            eprintln!("{e}");
            process::exit(3);
        });

    info!(
        workload = profile.as_name(),
        threads = settings.policy.threads,
        invocations = settings.policy.invocations,
        "starting run"
    );
    let outcome = coordinator.run(&tracker);

    let snapshot = tracker.counters().and_then(|counters| counters[0].snapshot().ok());
    let evaluation = snapshot.as_ref().map(|s| evaluate(s, &settings.requirement));
    println!(
        "{}",
        RunReport {
            workload: profile.as_name(),
            policy: &settings.policy,
            requirement: &settings.requirement,
            snapshot: snapshot.as_ref(),
            evaluation: evaluation.as_ref(),
            outcome: &outcome,
        }
    );
    if args.csv {
        println!("Reports:               {}", report_folder.display());
    }

    process::exit(exit_code(&outcome));
}

/// Start from the `--config` file (or 100 invocations on one thread) and apply the flags.
fn build_settings(args: &Args) -> Result<RunSettings> {
    let mut settings = match &args.config {
        Some(path) => RunSettings::load(path)?,
        None => RunSettings {
            policy: ExecutionPolicy::invocations(100),
            ..RunSettings::default()
        },
    };

    if let Some(invocations) = args.invocations {
        settings.set_invocations(invocations);
    }
    if let Some(duration) = args.duration {
        settings.set_duration(duration);
    }
    if let Some(threads) = args.threads {
        settings.policy.threads = threads;
    }
    if let Some(warm_up) = args.warm_up {
        settings.policy.warm_up_millis = warm_up;
    }
    if args.no_cancel_on_violation {
        settings.policy.cancel_on_violation = false;
    }

    let mut req = settings.requirement;
    if let Some(max) = args.max {
        req = req.with_max(max);
    }
    if let Some(average) = args.average {
        req = req.with_average(average);
    }
    if let Some(median) = args.median {
        req = req.with_median(median);
    }
    if let Some(total) = args.total_time {
        req = req.with_total_time(total);
    }
    if let Some(throughput) = args.throughput {
        req = req.with_throughput(throughput);
    }
    if let Some(list) = &args.percentiles {
        req.percentiles.extend(PercentileRequirement::parse_list(list)?);
    }
    if let Some(rate) = args.allowed_errors_rate {
        req = req.with_allowed_errors_rate(rate);
    }
    settings.requirement = req;

    settings.validate()?;
    Ok(settings)
}
