use std::path::{Path, PathBuf};

use crate::DEFAULT_SAMPLE_CAPACITY;

pub const ENV_ACTIVE: &str = "PERFTRACK_ACTIVE";
pub const ENV_REPORT_DIR: &str = "PERFTRACK_REPORT_DIR";
pub const DEFAULT_REPORT_FOLDER_NAME: &str = "perftrack-report";

/// Process-wide settings, read once at startup and passed to whatever needs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// When `false` the unit of work runs once, unmeasured.
    pub active: bool,
    pub report_folder: PathBuf,
    pub default_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            active: true,
            report_folder: default_report_folder(Path::new("target")),
            default_capacity: DEFAULT_SAMPLE_CAPACITY,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let active = lookup(ENV_ACTIVE)
            .map(|v| !v.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(true);
        let report_folder = match lookup(ENV_REPORT_DIR) {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
            _ => default_report_folder(Path::new("target")),
        };
        Self {
            active,
            report_folder,
            default_capacity: DEFAULT_SAMPLE_CAPACITY,
        }
    }
}

/// `<target_dir>/perftrack-report` if `target_dir` exists, else `perftrack-report`.
pub fn default_report_folder(target_dir: &Path) -> PathBuf {
    if target_dir.is_dir() {
        target_dir.join(DEFAULT_REPORT_FOLDER_NAME)
    } else {
        PathBuf::from(DEFAULT_REPORT_FOLDER_NAME)
    }
}
