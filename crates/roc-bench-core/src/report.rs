//! End-of-run report: statistics table, error log and JSON summary.

use crate::card::CardFamily;
use crate::error::Result;
use crate::stats::{HammerThroughput, StatsSnapshot, Throughput};
use crate::verify::ErrorLog;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File the full error log is written to.
pub const ERROR_LOG_FILE: &str = "readout_errors.txt";

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub card_family: CardFamily,
    pub page_size: usize,
    pub elapsed: Duration,
    pub stats: StatsSnapshot,
    pub error_check: bool,
    pub bar_hammer: bool,
    /// Pages popped from the channel at shutdown without being read.
    pub drained_pages: u64,
    /// Superpages the buffer was divided into.
    pub superpages: usize,
    /// Offsets found on the Free queue after shutdown, sorted.
    pub reclaimed_offsets: Vec<usize>,
    pub error_log: ErrorLog,
    pub dump_file: Option<PathBuf>,
    pub error_file: Option<PathBuf>,
}

/// Serializable subset of [`RunReport`] for `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub card_family: CardFamily,
    #[serde(flatten)]
    pub throughput: Throughput,
    pub pushed_pages: u64,
    /// `None` when error checking was disabled.
    pub errors: Option<u64>,
    pub drained_pages: u64,
    pub superpages: usize,
    pub reclaimed_superpages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bar_hammer: Option<HammerThroughput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_file: Option<PathBuf>,
}

impl RunReport {
    /// Readout throughput.
    pub fn throughput(&self) -> Throughput {
        Throughput::compute(self.stats.readout_count, self.page_size, self.elapsed)
    }

    /// Register stress throughput, if the stress task ran.
    pub fn hammer(&self) -> Option<HammerThroughput> {
        self.bar_hammer
            .then(|| HammerThroughput::compute(self.stats.hammer_writes, self.elapsed))
    }

    /// Whether every superpage ended up back on the Free queue exactly once.
    pub fn partition_complete(&self, superpage_size: usize) -> bool {
        self.reclaimed_offsets.len() == self.superpages
            && self
                .reclaimed_offsets
                .iter()
                .enumerate()
                .all(|(i, &offset)| offset == i * superpage_size)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            card_family: self.card_family,
            throughput: self.throughput(),
            pushed_pages: self.stats.push_count,
            errors: self.error_check.then_some(self.stats.error_count),
            drained_pages: self.drained_pages,
            superpages: self.superpages,
            reclaimed_superpages: self.reclaimed_offsets.len(),
            bar_hammer: self.hammer(),
            dump_file: self.dump_file.clone(),
            error_file: self.error_file.clone(),
        }
    }

    /// Final statistics table.
    pub fn render_stats(&self) -> String {
        let mut out = String::from("\n");
        let mut put = |label: &str, value: String| {
            let _ = writeln!(out, "  {label:<10}  {value:<10}");
        };

        let t = self.throughput();
        put("Seconds", format!("{:.3}", t.seconds));
        put("Pages", t.pages.to_string());
        if t.bytes > 0.0 {
            put("Bytes", format!("{:.0}", t.bytes));
            put("GB", format!("{:.6}", t.gigabytes));
            put("GB/s", format!("{:.6}", t.gigabytes_per_second));
            put("Gb/s", format!("{:.6}", t.gigabits_per_second));
            if self.error_check {
                put("Errors", self.stats.error_count.to_string());
            } else {
                put("Errors", "n/a".to_string());
            }
        }
        if let Some(h) = self.hammer() {
            put("BAR writes", h.writes.to_string());
            put("BAR write size (bytes)", h.write_size.to_string());
            put("BAR MB", format!("{:.6}", h.megabytes));
            put("BAR MB/s", format!("{:.6}", h.megabytes_per_second));
        }
        out.push('\n');
        out
    }

    /// Error log for the console, truncated to `max_chars` characters.
    /// `None` when there is nothing to show.
    pub fn console_errors(&self, max_chars: usize) -> Option<String> {
        let text = self.error_log.as_str();
        if text.is_empty() {
            return None;
        }
        let mut out = String::from("Errors:\n");
        match text.char_indices().nth(max_chars) {
            Some((cut, _)) => {
                out.push_str(&text[..cut]);
                let _ = write!(out, "\n... more follow ({} characters)\n", text.len() - cut);
            }
            None => out.push_str(text),
        }
        Some(out)
    }

    /// Write the full error log to [`ERROR_LOG_FILE`] in `dir`.
    pub fn write_error_file(&self, dir: &Path) -> Result<PathBuf> {
        write_error_log(&self.error_log, dir)
    }
}

/// Write `log` to [`ERROR_LOG_FILE`] in `dir`.
pub fn write_error_log(log: &ErrorLog, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(ERROR_LOG_FILE);
    std::fs::write(&path, log.as_str())?;
    Ok(path)
}
