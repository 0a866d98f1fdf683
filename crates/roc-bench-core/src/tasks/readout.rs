//! Readout task: consumes completed superpages page by page.

use super::CancelToken;
use crate::buffer::DmaBuffer;
use crate::dump::PageDump;
use crate::error::{Error, Result};
use crate::pause::RandomPauses;
use crate::queue::{QueueConsumer, QueueProducer};
use crate::stats::RunStats;
use crate::superpage::SuperpageLayout;
use crate::verify::Verifier;
use std::io::Write;

/// Word stamped over a page after it is read, with page reset enabled.
pub const PAGE_RESET_WORD: u32 = 0xCCCC_CCCC;

/// Reads superpages from the Readout queue and returns them to the Free queue.
pub struct ReadoutTask<'a, W: Write> {
    buffer: &'a DmaBuffer,
    readout: &'a mut QueueConsumer<usize>,
    free: &'a mut QueueProducer<usize>,
    stats: &'a RunStats,
    stop: CancelToken,
    layout: SuperpageLayout,
    max_pages: Option<u64>,
    verifier: Option<&'a mut Verifier>,
    dump: Option<PageDump<W>>,
    page_reset: bool,
    pauses: Option<RandomPauses>,
}

impl<'a, W: Write> ReadoutTask<'a, W> {
    pub fn new(
        buffer: &'a DmaBuffer,
        readout: &'a mut QueueConsumer<usize>,
        free: &'a mut QueueProducer<usize>,
        stats: &'a RunStats,
        stop: CancelToken,
        layout: SuperpageLayout,
    ) -> Self {
        Self {
            buffer,
            readout,
            free,
            stats,
            stop,
            layout,
            max_pages: None,
            verifier: None,
            dump: None,
            page_reset: false,
            pauses: None,
        }
    }

    /// Stop the run once this many pages were read.
    pub fn with_page_limit(mut self, max_pages: Option<u64>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Verify every page. The caller keeps the verifier, and with it the
    /// error log, whatever the outcome of the run.
    pub fn with_verifier(mut self, verifier: Option<&'a mut Verifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Copy every page to `dump`.
    pub fn with_dump(mut self, dump: Option<PageDump<W>>) -> Self {
        self.dump = dump;
        self
    }

    /// Stamp pages with [`PAGE_RESET_WORD`] after reading them.
    pub fn with_page_reset(mut self, page_reset: bool) -> Self {
        self.page_reset = page_reset;
        self
    }

    /// Inject random pauses.
    pub fn with_pauses(mut self, pauses: Option<RandomPauses>) -> Self {
        self.pauses = pauses;
        self
    }

    fn limit_reached(&self) -> bool {
        self.max_pages
            .is_some_and(|max| self.stats.readout_count() >= max)
    }

    /// Run until stopped or the page limit is reached, then hand back the
    /// dump. Signals stop when the limit is reached and on error.
    pub fn run(mut self) -> Result<Option<PageDump<W>>> {
        match self.run_loop() {
            Ok(()) => Ok(self.dump),
            Err(e) => {
                tracing::error!(error = %e, "readout task failed");
                self.stop.cancel();
                Err(e)
            }
        }
    }

    fn run_loop(&mut self) -> Result<()> {
        while !self.stop.is_cancelled() {
            if self.limit_reached() {
                tracing::debug!(pages = self.stats.readout_count(), "page limit reached");
                self.stop.cancel();
                break;
            }
            if let Some(pauses) = self.pauses.as_mut() {
                pauses.maybe_pause("readout");
            }

            let Some(offset) = self.readout.pop() else {
                std::hint::spin_loop();
                continue;
            };

            let result = self.read_superpage(offset);
            self.free.push(offset).map_err(|offset| {
                Error::QueueInvariant(format!(
                    "free queue full when returning superpage at offset {offset}"
                ))
            })?;
            result?;
        }
        Ok(())
    }

    fn read_superpage(&mut self, offset: usize) -> Result<()> {
        let page_size = self.layout.page_size();
        for index in 0..self.layout.pages_per_superpage() {
            if self.limit_reached() {
                break;
            }
            let page = self.buffer.view(offset + index * page_size, page_size)?;
            let event = self.stats.add_read();

            if let Some(verifier) = self.verifier.as_deref_mut() {
                let errors = verifier.check_page(event, &page);
                self.stats.add_errors(u64::from(errors));
            }
            if let Some(dump) = self.dump.as_mut() {
                dump.write_page(event, &page)?;
            }
            if self.page_reset {
                page.fill(PAGE_RESET_WORD);
            }
            if let Some(verifier) = self.verifier.as_deref_mut() {
                verifier.advance();
            }
        }
        Ok(())
    }
}
