//! Push/poll task: keeps the channel fed and collects completed superpages.

use super::CancelToken;
use crate::card::DmaChannel;
use crate::error::{Error, Result};
use crate::pause::RandomPauses;
use crate::queue::{QueueConsumer, QueueProducer};
use crate::stats::RunStats;
use crate::superpage::{Superpage, SuperpageLayout};

/// Moves superpages Free queue -> channel -> Readout queue.
pub struct PushTask<'a> {
    channel: &'a mut dyn DmaChannel,
    free: &'a mut QueueConsumer<usize>,
    readout: &'a mut QueueProducer<usize>,
    stats: &'a RunStats,
    stop: CancelToken,
    layout: SuperpageLayout,
    max_pages: Option<u64>,
    pauses: Option<RandomPauses>,
}

impl<'a> PushTask<'a> {
    pub fn new(
        channel: &'a mut dyn DmaChannel,
        free: &'a mut QueueConsumer<usize>,
        readout: &'a mut QueueProducer<usize>,
        stats: &'a RunStats,
        stop: CancelToken,
        layout: SuperpageLayout,
    ) -> Self {
        Self {
            channel,
            free,
            readout,
            stats,
            stop,
            layout,
            max_pages: None,
            pauses: None,
        }
    }

    /// Stop once this many pages were handed to the readout queue.
    pub fn with_page_limit(mut self, max_pages: Option<u64>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Inject random pauses.
    pub fn with_pauses(mut self, pauses: Option<RandomPauses>) -> Self {
        self.pauses = pauses;
        self
    }

    /// Run until stopped or the page limit is reached. Cancels the stop
    /// token on error so the other tasks wind down.
    pub fn run(mut self) -> Result<()> {
        let result = self.run_loop();
        if let Err(e) = &result {
            tracing::error!(error = %e, "push task failed");
            self.stop.cancel();
        }
        result
    }

    fn limit_reached(&self) -> bool {
        self.max_pages
            .is_some_and(|max| self.stats.push_count() >= max)
    }

    fn run_loop(&mut self) -> Result<()> {
        let pages_per_superpage = self.layout.pages_per_superpage() as u64;

        while !self.stop.is_cancelled() && !self.limit_reached() {
            if let Some(pauses) = self.pauses.as_mut() {
                pauses.maybe_pause("push");
            }

            self.channel.fill_superpages();

            while self.channel.superpage_queue_available() > 0 {
                let Some(offset) = self.free.pop() else {
                    break;
                };
                if let Err(e) = self
                    .channel
                    .push_superpage(Superpage::new(offset, self.layout.superpage_size()))
                {
                    tracing::error!(offset, "channel rejected superpage");
                    return Err(e);
                }
            }

            if self.channel.superpage_queue_count() == 0 {
                continue;
            }
            let Some(head) = self.channel.superpage() else {
                continue;
            };
            if !head.is_filled() || self.readout.push(head.offset).is_err() {
                continue;
            }
            match self.channel.pop_superpage() {
                Some(popped) if popped.offset == head.offset => {
                    self.stats.add_pushed(pages_per_superpage);
                }
                Some(popped) => {
                    return Err(Error::QueueInvariant(format!(
                        "channel popped superpage {} but {} was at the head",
                        popped.offset, head.offset
                    )));
                }
                None => {
                    return Err(Error::QueueInvariant(format!(
                        "filled superpage {} could not be popped",
                        head.offset
                    )));
                }
            }
        }
        Ok(())
    }
}
