//! Run statistics - shared counters and final throughput figures

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters shared by the pipeline tasks.
///
/// All counters are monotonic during a run and use relaxed ordering; they
/// carry no ownership information.
#[derive(Debug, Default)]
pub struct RunStats {
    push_count: AtomicU64,
    readout_count: AtomicU64,
    error_count: AtomicU64,
    hammer_writes: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record pages handed from the channel to the readout queue.
    pub fn add_pushed(&self, pages: u64) {
        self.push_count.fetch_add(pages, Ordering::Relaxed);
    }

    /// Record one page consumed by the readout task. Returns the page's
    /// zero-based event number.
    pub fn add_read(&self) -> u64 {
        self.readout_count.fetch_add(1, Ordering::Relaxed)
    }

    /// Record verification mismatches.
    pub fn add_errors(&self, errors: u64) {
        if errors > 0 {
            self.error_count.fetch_add(errors, Ordering::Relaxed);
        }
    }

    /// Record completed BAR writes.
    pub fn add_hammer_writes(&self, writes: u64) {
        self.hammer_writes.fetch_add(writes, Ordering::Relaxed);
    }

    pub fn push_count(&self) -> u64 {
        self.push_count.load(Ordering::Relaxed)
    }

    pub fn readout_count(&self) -> u64 {
        self.readout_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn hammer_writes(&self) -> u64 {
        self.hammer_writes.load(Ordering::Relaxed)
    }

    /// Point-in-time copy.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            push_count: self.push_count(),
            readout_count: self.readout_count(),
            error_count: self.error_count(),
            hammer_writes: self.hammer_writes(),
        }
    }
}

/// Plain copy of [`RunStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub push_count: u64,
    pub readout_count: u64,
    pub error_count: u64,
    pub hammer_writes: u64,
}

/// Size of one BAR write in bytes.
pub const BAR_WRITE_SIZE: usize = std::mem::size_of::<u32>();

/// Derived throughput figures (decimal units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Throughput {
    pub seconds: f64,
    pub pages: u64,
    pub bytes: f64,
    pub gigabytes: f64,
    pub gigabytes_per_second: f64,
    pub gigabits_per_second: f64,
}

impl Throughput {
    /// Readout throughput of `pages` pages of `page_size` bytes over `elapsed`.
    pub fn compute(pages: u64, page_size: usize, elapsed: Duration) -> Self {
        let seconds = elapsed.as_secs_f64();
        let bytes = pages as f64 * page_size as f64;
        let gigabytes = bytes / 1e9;
        let gigabytes_per_second = if seconds > 0.0 { gigabytes / seconds } else { 0.0 };
        Self {
            seconds,
            pages,
            bytes,
            gigabytes,
            gigabytes_per_second,
            gigabits_per_second: gigabytes_per_second * 8.0,
        }
    }
}

/// Register stress throughput.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HammerThroughput {
    pub writes: u64,
    pub write_size: usize,
    pub megabytes: f64,
    pub megabytes_per_second: f64,
}

impl HammerThroughput {
    pub fn compute(writes: u64, elapsed: Duration) -> Self {
        let seconds = elapsed.as_secs_f64();
        let megabytes = writes as f64 * BAR_WRITE_SIZE as f64 / 1e6;
        Self {
            writes,
            write_size: BAR_WRITE_SIZE,
            megabytes,
            megabytes_per_second: if seconds > 0.0 { megabytes / seconds } else { 0.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = RunStats::new();
        stats.add_pushed(128);
        stats.add_pushed(128);
        assert_eq!(stats.add_read(), 0);
        assert_eq!(stats.add_read(), 1);
        stats.add_errors(0);
        stats.add_errors(3);
        stats.add_hammer_writes(10_000);
        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                push_count: 256,
                readout_count: 2,
                error_count: 3,
                hammer_writes: 10_000,
            }
        );
    }

    #[test]
    fn test_throughput() {
        let t = Throughput::compute(1_000_000, 8000, Duration::from_secs(2));
        assert_eq!(t.bytes, 8e9);
        assert!((t.gigabytes - 8.0).abs() < 1e-9);
        assert!((t.gigabytes_per_second - 4.0).abs() < 1e-9);
        assert!((t.gigabits_per_second - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_throughput_zero_time() {
        let t = Throughput::compute(10, 8192, Duration::ZERO);
        assert_eq!(t.gigabytes_per_second, 0.0);
    }

    #[test]
    fn test_hammer_throughput() {
        let h = HammerThroughput::compute(500_000, Duration::from_secs(1));
        assert_eq!(h.write_size, 4);
        assert!((h.megabytes - 2.0).abs() < 1e-9);
        assert!((h.megabytes_per_second - 2.0).abs() < 1e-9);
    }
}
