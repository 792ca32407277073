use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of time for measuring calls, in milliseconds.
pub trait Clock: Send + Sync {
    fn name(&self) -> &str;
    fn now(&self) -> i64;
}

/// Wall clock: milliseconds since the Unix epoch.
pub struct SystemClock;

impl Clock for SystemClock {
    fn name(&self) -> &str {
        "system"
    }

    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// Milliseconds elapsed since the clock was created. Never goes backwards.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn name(&self) -> &str {
        "monotonic"
    }

    fn now(&self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }
}

/// CPU time consumed by the calling thread, in milliseconds.
#[cfg(unix)]
pub struct ThreadCpuClock;

#[cfg(unix)]
impl Clock for ThreadCpuClock {
    fn name(&self) -> &str {
        "cpu"
    }

    fn now(&self) -> i64 {
        // SAFETY: an all-zero timespec is valid, and `ts` stays writable for the whole call.
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &mut ts) };
        if rc != 0 {
            return 0;
        }
        ts.tv_sec as i64 * 1_000 + ts.tv_nsec as i64 / 1_000_000
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    name: String,
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self::named("manual", start)
    }

    pub fn named(name: impl Into<String>, start: i64) -> Self {
        Self {
            name: name.into(),
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn name(&self) -> &str {
        &self.name
    }

    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
