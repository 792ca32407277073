/// Name prefix of the coordinator's worker threads; the worker index is appended.
pub const WORKER_THREAD_PREFIX: &str = "perftrack-worker";

/// Percentiles listed in summaries, in report column order.
pub const SUMMARY_PERCENTILES: [u32; 4] = [50, 90, 95, 99];

/// File name of the CSV summary inside the report folder.
pub const SUMMARY_FILE_NAME: &str = "summary.csv";

/// Suffix of per-service invocation CSV files.
pub const INVOCATION_FILE_SUFFIX: &str = ".inv.csv";

/// Upper bound on the samples a counter allocates room for up front. Larger capacities still
/// record every sample, growing the buffer as needed.
pub const MAX_PREALLOCATED_SAMPLES: usize = 100_000;
