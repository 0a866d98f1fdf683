//! Monitor task: interrupt detection and the live status line.

use super::CancelToken;
use crate::card::Bar;
use crate::error::Result;
use crate::stats::{RunStats, StatsSnapshot};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Single-line status display rewritten with `\r`.
#[derive(Debug)]
pub struct StatusDisplay<W: Write> {
    out: W,
    error_check: bool,
    newline_interval_secs: u64,
    header_printed: bool,
    newline_pending: bool,
}

impl<W: Write> StatusDisplay<W> {
    pub fn new(out: W, error_check: bool, newline_interval: Duration) -> Self {
        Self {
            out,
            error_check,
            newline_interval_secs: newline_interval.as_secs().max(1),
            header_printed: false,
            newline_pending: false,
        }
    }

    fn print_header(&mut self) -> std::io::Result<()> {
        write!(
            self.out,
            "\n  {:<8}   {:<12}  {:<12}  {:<12}  {:<5}",
            "Time", "Pushed", "Read", "Errors", "°C"
        )?;
        write!(
            self.out,
            "\n  00:00:00   {:<12}  {:<12}  {:<12}  {:<5}",
            "-", "-", "-", "-"
        )
    }

    /// Rewrite the status line.
    pub fn update(
        &mut self,
        elapsed: Duration,
        stats: StatsSnapshot,
        temperature: Option<f32>,
    ) -> std::io::Result<()> {
        if !self.header_printed {
            self.print_header()?;
            self.header_printed = true;
        }

        let secs = elapsed.as_secs();
        let errors = if self.error_check {
            stats.error_count.to_string()
        } else {
            "n/a".to_string()
        };
        let temperature = temperature.map_or_else(|| "n/a".to_string(), |t| format!("{t:.1}"));
        write!(
            self.out,
            "\r  {:02}:{:02}:{:02}   {:<12}  {:<12}  {:<12}  {:<5}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            stats.push_count,
            stats.readout_count,
            errors,
            temperature
        )?;

        // Scroll one line per interval so the history stays visible
        let phase = secs % self.newline_interval_secs;
        if self.newline_pending && phase == 0 {
            writeln!(self.out)?;
            self.newline_pending = false;
        }
        if phase >= 1 {
            self.newline_pending = true;
        }
        self.out.flush()
    }

    /// Underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Periodic low-priority work.
pub struct MonitorTask<'a, W: Write> {
    stats: &'a RunStats,
    stop: CancelToken,
    interrupt: &'a AtomicBool,
    interval: Duration,
    bar: Option<Arc<dyn Bar>>,
    display: Option<StatusDisplay<W>>,
}

impl<'a, W: Write> MonitorTask<'a, W> {
    pub fn new(
        stats: &'a RunStats,
        stop: CancelToken,
        interrupt: &'a AtomicBool,
        interval: Duration,
    ) -> Self {
        Self {
            stats,
            stop,
            interrupt,
            interval,
            bar: None,
            display: None,
        }
    }

    /// Show the live status line, with temperature read from `bar`.
    pub fn with_display(mut self, display: StatusDisplay<W>, bar: Arc<dyn Bar>) -> Self {
        self.display = Some(display);
        self.bar = Some(bar);
        self
    }

    /// Run on an absolute schedule until the stop token is cancelled.
    ///
    /// A failing display is dropped; interrupt detection keeps running.
    pub fn run(mut self) -> Result<Option<StatusDisplay<W>>> {
        let start = Instant::now();
        let mut next = start;
        while !self.stop.is_cancelled() {
            self.tick(start.elapsed());
            next += self.interval;
            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
            }
        }
        Ok(self.display)
    }

    fn tick(&mut self, elapsed: Duration) {
        if self.interrupt.load(Ordering::Relaxed) {
            tracing::info!("Interrupted");
            self.stop.cancel();
            return;
        }
        if let Some(display) = self.display.as_mut() {
            let temperature = self.bar.as_ref().and_then(|bar| bar.temperature());
            if let Err(e) = display.update(elapsed, self.stats.snapshot(), temperature) {
                tracing::warn!(error = %e, "status display failed, disabling it");
                self.display = None;
            }
        }
    }
}
