use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::{GIB, KIB, MIB};

/// Counts bytes of finished chunks during one dispatch.
///
/// The counter is the only state chunk workers share; every update is a
/// single atomic add-and-read, and all derived figures are computed from the
/// value that add returned.
#[derive(Debug)]
pub struct ProgressTracker {
    total_bytes: u64,
    done_bytes: AtomicU64,
    started: Instant,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            done_bytes: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Records a finished chunk whose successful attempt began at
    /// `attempt_started`.
    pub fn add(&self, chunk_index: u32, bytes: u64, attempt_started: Instant) -> ProgressReport {
        let done_bytes = self.done_bytes.fetch_add(bytes, Ordering::AcqRel) + bytes;
        let now = Instant::now();
        ProgressReport {
            chunk_index,
            chunk_bytes: bytes,
            done_bytes,
            total_bytes: self.total_bytes,
            chunk_elapsed: now.saturating_duration_since(attempt_started),
            elapsed: now.saturating_duration_since(self.started),
        }
    }

    pub fn done_bytes(&self) -> u64 {
        self.done_bytes.load(Ordering::Acquire)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

/// Snapshot taken right after one chunk completed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    pub chunk_index: u32,
    pub chunk_bytes: u64,
    pub done_bytes: u64,
    pub total_bytes: u64,
    /// Duration of the chunk's successful attempt.
    pub chunk_elapsed: Duration,
    /// Time since dispatch started.
    pub elapsed: Duration,
}

impl ProgressReport {
    /// Transfer rate of this chunk in bytes per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.chunk_elapsed.as_secs_f64().max(1e-6);
        self.chunk_bytes as f64 / secs
    }

    /// Completed share of the dispatch, `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.done_bytes as f64 / self.total_bytes as f64).min(1.0)
    }

    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }

    /// Extrapolated time to completion; `None` until some bytes are done or
    /// when the estimate does not fit a `Duration`.
    pub fn eta(&self) -> Option<Duration> {
        if self.done_bytes == 0 {
            return None;
        }
        let progress = self.fraction();
        let remaining = self.elapsed.as_secs_f64() * (1.0 - progress) / progress;
        Duration::try_from_secs_f64(remaining.max(0.0)).ok()
    }
}

/// Renders `current of total` in a unit that suits `total`.
pub fn absolute_progress(current: u64, total: u64) -> String {
    if total < KIB {
        format!("{} of {} bytes", current, total)
    } else if total < 10 * MIB {
        format!("{} of {} kByte", current / KIB, total / KIB)
    } else if total < 10 * GIB {
        format!("{} of {} MB", current / MIB, total / MIB)
    } else {
        format!("{} of {} GB", current / GIB, total / GIB)
    }
}

/// `h:mm:ss`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

fn finish_time(remaining: Duration) -> Option<String> {
    let remaining = chrono::Duration::from_std(remaining).ok()?;
    let finish = chrono::Local::now().checked_add_signed(remaining)?;
    Some(finish.format("%Y-%m-%d %H:%M:%S").to_string())
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes_per_sec = self.throughput();
        write!(
            f,
            "Uploaded {} ({:.3} %) with {:.0} kB/sec ({:.1} MB/min), ",
            absolute_progress(self.done_bytes, self.total_bytes),
            self.percent(),
            bytes_per_sec / KIB as f64,
            bytes_per_sec * 60.0 / MIB as f64,
        )?;

        match self.eta() {
            None => write!(f, "unknown time"),
            Some(remaining) => {
                write!(f, "{} remaining", format_duration(remaining))?;
                match finish_time(remaining) {
                    Some(at) => write!(f, ", (expect to finish by {} local time)", at),
                    None => Ok(()),
                }
            }
        }
    }
}
