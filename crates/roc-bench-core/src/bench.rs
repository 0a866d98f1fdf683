//! Run controller.
//!
//! [`DmaBench`] owns the validated configuration, sets up the buffer and the
//! channel, runs the pipeline tasks and tears everything down again:
//!
//! 1. start DMA and launch monitor, push and (optional) BAR hammer threads,
//!    reading out on the calling thread
//! 2. join, then drain superpages the channel completed meanwhile
//! 3. stop DMA, move every remaining offset back onto the Free queue
//! 4. check that the Free queue again holds every superpage exactly once
//!
//! DMA is stopped on every path out of the task phase.

use crate::buffer::DmaBuffer;
use crate::card::{open_channel, ChannelParams, DmaChannel};
use crate::config::BenchConfig;
use crate::dump::PageDump;
use crate::error::{Error, Result};
use crate::pause::RandomPauses;
use crate::queue::{superpage_queue, QueueConsumer, QueueProducer};
use crate::report::{write_error_log, RunReport};
use crate::stats::RunStats;
use crate::superpage::SuperpageLayout;
use crate::tasks::{BarHammer, CancelToken, MonitorTask, PushTask, ReadoutTask, StatusDisplay};
use crate::verify::{ErrorLog, Verifier};
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// DMA benchmark run controller.
#[derive(Debug, Clone)]
pub struct DmaBench {
    config: BenchConfig,
    layout: SuperpageLayout,
}

impl DmaBench {
    /// Validate `config`. Nothing is mapped or opened yet.
    pub fn new(config: BenchConfig) -> Result<Self> {
        config.validate()?;
        let layout =
            SuperpageLayout::new(config.buffer.bytes, config.superpage_size, config.page_size)?;
        if config.error_check && !config.pattern.is_verifiable() {
            return Err(Error::UnsupportedPattern(config.pattern));
        }
        if let Some(family) = config.card_id.known_family() {
            if config.bar_hammer && !family.supports_bar_hammer() {
                return Err(Error::Capability(format!(
                    "BAR hammer is only supported for CRU, not {family}"
                )));
            }
        }
        Ok(Self { config, layout })
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn layout(&self) -> SuperpageLayout {
        self.layout
    }

    /// Map the DMA buffer. Emulated cards without an explicit path use
    /// anonymous memory.
    pub fn map_buffer(&self) -> Result<DmaBuffer> {
        let bytes = self.config.buffer.bytes;
        match (&self.config.buffer_path, self.config.card_id.known_family()) {
            (None, Some(_)) => {
                info!(bytes, "using anonymous DMA buffer");
                DmaBuffer::anonymous(bytes)
            }
            _ => {
                let path = self.config.buffer_file_path();
                info!(path = %path.display(), bytes, "mapping DMA buffer");
                DmaBuffer::map_file(&path, bytes, self.config.remove_pages_file)
            }
        }
    }

    /// Map the buffer, open the channel, run, and write the error log file.
    pub fn execute(&self, interrupt: &AtomicBool) -> Result<RunReport> {
        let buffer = Arc::new(self.map_buffer()?);
        let mut channel = open_channel(ChannelParams {
            card_id: self.config.card_id.clone(),
            channel: self.config.channel,
            page_size: self.config.page_size,
            pattern: self.config.pattern,
            readout_mode: self.config.readout_mode,
            buffer: buffer.clone(),
            lock_dir: std::env::temp_dir(),
        })?;

        if self.config.reset_channel {
            info!("resetting channel");
            channel.reset_channel()?;
        }

        self.run_logged(channel.as_mut(), &buffer, interrupt)
    }

    /// Run the pipeline and write the error log to the output directory.
    /// The log is written for failed runs too, before the error is returned.
    pub fn run_logged(
        &self,
        channel: &mut dyn DmaChannel,
        buffer: &DmaBuffer,
        interrupt: &AtomicBool,
    ) -> Result<RunReport> {
        let dir = &self.config.output_dir;
        let mut verifier = None;
        match self.run_with(channel, buffer, interrupt, &mut verifier) {
            Ok(mut report) => {
                report.error_file = Some(report.write_error_file(dir)?);
                Ok(report)
            }
            Err(e) => {
                let log = verifier.map_or_else(ErrorLog::default, Verifier::into_log);
                match write_error_log(&log, dir) {
                    Ok(path) => info!(path = %path.display(), errors = log.total(), "wrote error log of failed run"),
                    Err(write) => warn!(error = %write, "failed to write error log"),
                }
                Err(e)
            }
        }
    }

    /// Run the pipeline on an already opened channel.
    pub fn run(
        &self,
        channel: &mut dyn DmaChannel,
        buffer: &DmaBuffer,
        interrupt: &AtomicBool,
    ) -> Result<RunReport> {
        self.run_with(channel, buffer, interrupt, &mut None)
    }

    /// The verifier is left in `verifier` so its log survives a failed run.
    fn run_with(
        &self,
        channel: &mut dyn DmaChannel,
        buffer: &DmaBuffer,
        interrupt: &AtomicBool,
        verifier: &mut Option<Verifier>,
    ) -> Result<RunReport> {
        let config = &self.config;
        let limits = &config.limits;
        let layout = self.layout;
        let family = channel.card_family();

        if layout.count() * layout.superpage_size() > buffer.len() {
            return Err(Error::Config(format!(
                "buffer of {} bytes cannot hold {} superpages",
                buffer.len(),
                layout.count()
            )));
        }

        // Everything that can be rejected is checked before DMA starts
        *verifier = if config.error_check {
            Some(Verifier::new(
                family,
                config.pattern,
                config.resync,
                limits.max_recorded_errors,
            )?)
        } else {
            None
        };

        let stats = RunStats::new();
        let stop = CancelToken::new();
        let bar = channel.bar();
        let hammer = if config.bar_hammer {
            Some(BarHammer::new(
                family,
                bar.clone(),
                &stats,
                stop.clone(),
                limits.hammer_multiplier,
            )?)
        } else {
            None
        };
        let (dump, dump_file) = match PageDump::create(config.dump, &config.output_dir)? {
            Some((dump, path)) => (Some(dump), Some(path)),
            None => (None, None),
        };

        let slots = layout.count() + 1;
        let (mut free_tx, mut free_rx) = superpage_queue::<usize>(slots);
        let (mut readout_tx, mut readout_rx) = superpage_queue::<usize>(slots);
        for offset in layout.offsets() {
            free_tx.push(offset).map_err(|offset| {
                Error::QueueInvariant(format!("free queue cannot hold initial offset {offset}"))
            })?;
        }

        info!(
            family = %family,
            superpages = layout.count(),
            pages_per_superpage = layout.pages_per_superpage(),
            max_pages = ?config.max_pages,
            "starting DMA"
        );
        channel.start_dma()?;
        let start = Instant::now();

        let task_result = thread::scope(|s| {
            let mut monitor =
                MonitorTask::new(&stats, stop.clone(), interrupt, limits.monitor_interval);
            if config.verbose {
                let display = StatusDisplay::new(
                    io::stdout(),
                    config.error_check,
                    limits.display_newline_interval,
                );
                monitor = monitor.with_display(display, bar.clone());
            }
            let monitor = s.spawn(move || monitor.run());

            let hammer = hammer.map(|hammer| s.spawn(move || hammer.run()));

            let push = PushTask::new(
                &mut *channel,
                &mut free_rx,
                &mut readout_tx,
                &stats,
                stop.clone(),
                layout,
            )
            .with_page_limit(config.max_pages)
            .with_pauses(config.random_pause.then(|| RandomPauses::new(limits.pause)));
            let push = s.spawn(move || push.run());

            let readout = ReadoutTask::new(
                buffer,
                &mut readout_rx,
                &mut free_tx,
                &stats,
                stop.clone(),
                layout,
            )
            .with_page_limit(config.max_pages)
            .with_verifier(verifier.as_mut())
            .with_dump(dump)
            .with_page_reset(config.page_reset)
            .with_pauses(config.random_pause.then(|| RandomPauses::new(limits.pause)))
            .run();

            // The readout task only returns once stop is set, except on its
            // own error paths which set it too
            stop.cancel();

            let push = join(push);
            if let Some(hammer) = hammer {
                let writes = join(hammer);
                debug!(writes, "BAR hammer joined");
            }
            let monitor = join(monitor);

            let dump = readout?;
            push?;
            monitor?;
            Ok::<_, Error>(dump)
        });
        let elapsed = start.elapsed();

        let shutdown = self.shutdown(channel, &mut free_tx, &mut free_rx, &mut readout_rx);
        let dump = task_result?;
        let (drained_pages, reclaimed_offsets) = shutdown?;

        if let Some(dump) = dump {
            dump.finish()?;
        }

        let report = RunReport {
            card_family: family,
            page_size: layout.page_size(),
            elapsed,
            stats: stats.snapshot(),
            error_check: config.error_check,
            bar_hammer: config.bar_hammer,
            drained_pages,
            superpages: layout.count(),
            reclaimed_offsets,
            error_log: verifier
                .as_ref()
                .map_or_else(ErrorLog::default, |verifier| verifier.log().clone()),
            dump_file,
            error_file: None,
        };
        if !report.partition_complete(layout.superpage_size()) {
            warn!(
                expected = layout.count(),
                reclaimed = report.reclaimed_offsets.len(),
                "superpages unaccounted for after shutdown"
            );
        }
        info!(
            pages = report.stats.readout_count,
            errors = report.stats.error_count,
            seconds = elapsed.as_secs_f64(),
            "run finished"
        );
        Ok(report)
    }

    /// Drain, stop DMA, reclaim. Always stops DMA; returns the first error.
    fn shutdown(
        &self,
        channel: &mut dyn DmaChannel,
        free_tx: &mut QueueProducer<usize>,
        free_rx: &mut QueueConsumer<usize>,
        readout_rx: &mut QueueConsumer<usize>,
    ) -> Result<(u64, Vec<usize>)> {
        let drained = self.drain(channel, free_tx);

        let mut leftover = Ok(());
        for offset in readout_rx.drain() {
            if let Err(offset) = free_tx.push(offset) {
                leftover = Err(Error::QueueInvariant(format!(
                    "free queue full when reclaiming offset {offset} from readout queue"
                )));
            }
        }

        let stopped = channel.stop_dma();
        if let Err(e) = &stopped {
            warn!(error = %e, "failed to stop DMA");
        }

        // Superpages completed by the stop may be partially filled
        let mut partial_pages = 0;
        let mut reclaimed = Ok(());
        while let Some(superpage) = channel.pop_superpage() {
            partial_pages += (superpage.received / self.layout.page_size()) as u64;
            if let Err(offset) = free_tx.push(superpage.offset) {
                reclaimed = Err(Error::QueueInvariant(format!(
                    "free queue full when reclaiming offset {offset} from channel"
                )));
            }
        }

        let drained = drained?;
        leftover?;
        stopped?;
        reclaimed?;

        if partial_pages > 0 {
            debug!(partial_pages, "pages received by superpages reclaimed after stop");
        }
        let mut offsets = free_rx.drain();
        offsets.sort_unstable();
        Ok((drained + partial_pages, offsets))
    }

    /// Pop superpages the channel completed after the tasks stopped, for at
    /// most the drain timeout. Counts pages actually received, not
    /// `pages_per_superpage`.
    fn drain(&self, channel: &mut dyn DmaChannel, free_tx: &mut QueueProducer<usize>) -> Result<u64> {
        let page_size = self.layout.page_size();
        let timeout = self.config.limits.drain_timeout;
        let start = Instant::now();
        let mut pages = 0;

        while start.elapsed() < timeout && channel.superpage_queue_count() > 0 {
            channel.fill_superpages();
            let filled = channel.superpage().is_some_and(|sp| sp.is_filled());
            if !filled {
                std::hint::spin_loop();
                continue;
            }
            let Some(superpage) = channel.pop_superpage() else {
                continue;
            };
            pages += (superpage.received / page_size) as u64;
            free_tx.push(superpage.offset).map_err(|offset| {
                Error::QueueInvariant(format!(
                    "free queue full when draining offset {offset}"
                ))
            })?;
        }
        info!(drained_pages = pages, "popped excess pages");
        Ok(pages)
    }
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
    match handle.join() {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
