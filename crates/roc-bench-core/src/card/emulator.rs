//! Software card emulator.
//!
//! Implements [`DmaChannel`] and [`Bar`] in process. Pushed superpages are
//! filled with the generator pattern when the push task calls
//! [`fill_superpages`](DmaChannel::fill_superpages), one event counter value
//! per page, so the whole readout pipeline and the verifier can run without
//! hardware.

use super::{Bar, CardFamily, ChannelLock, DmaChannel};
use crate::buffer::{DmaBuffer, WORD_SIZE};
use crate::error::{Error, Result};
use crate::pattern::GeneratorPattern;
use crate::superpage::Superpage;
use crate::verify::{generated_word, PATTERN_STRIDE};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Superpage descriptors the emulated channel accepts at once.
pub const DEFAULT_CHANNEL_QUEUE_CAPACITY: usize = 128;

/// Registers in the emulated BAR.
const REGISTER_COUNT: usize = 1024;

/// Temperature reported by an emulated CRU.
const EMULATED_TEMPERATURE: f32 = 45.0;

/// In-memory register file.
#[derive(Debug)]
pub struct EmulatedBar {
    family: CardFamily,
    registers: Box<[AtomicU32]>,
}

impl EmulatedBar {
    /// Zeroed register file.
    pub fn new(family: CardFamily) -> Self {
        Self {
            family,
            registers: (0..REGISTER_COUNT).map(|_| AtomicU32::new(0)).collect(),
        }
    }
}

impl Bar for EmulatedBar {
    fn read_register(&self, index: usize) -> u32 {
        self.registers
            .get(index)
            .map_or(u32::MAX, |r| r.load(Ordering::Relaxed))
    }

    fn write_register(&self, index: usize, value: u32) {
        if let Some(register) = self.registers.get(index) {
            register.store(value, Ordering::Relaxed);
        }
    }

    fn temperature(&self) -> Option<f32> {
        match self.family {
            CardFamily::Cru => Some(EMULATED_TEMPERATURE),
            CardFamily::Crorc => None,
        }
    }
}

/// Emulated DMA channel.
#[derive(Debug)]
pub struct EmulatedChannel {
    family: CardFamily,
    buffer: Arc<DmaBuffer>,
    page_size: usize,
    pattern: GeneratorPattern,
    queue: VecDeque<Superpage>,
    capacity: usize,
    running: bool,
    counter: u32,
    pages_generated: u64,
    fault_interval: Option<u64>,
    bar: Arc<EmulatedBar>,
    rng: SmallRng,
    _lock: Option<ChannelLock>,
}

impl EmulatedChannel {
    /// Channel writing `pattern` into `buffer` in pages of `page_size` bytes.
    pub fn new(
        family: CardFamily,
        buffer: Arc<DmaBuffer>,
        page_size: usize,
        pattern: GeneratorPattern,
    ) -> Result<Self> {
        if page_size == 0 || page_size % WORD_SIZE != 0 {
            return Err(Error::Config(format!("invalid DMA page size {page_size}")));
        }
        Ok(Self {
            family,
            buffer,
            page_size,
            pattern,
            queue: VecDeque::with_capacity(DEFAULT_CHANNEL_QUEUE_CAPACITY),
            capacity: DEFAULT_CHANNEL_QUEUE_CAPACITY,
            running: false,
            counter: 0,
            pages_generated: 0,
            fault_interval: None,
            bar: Arc::new(EmulatedBar::new(family)),
            rng: SmallRng::from_rng(&mut rand::rng()),
            _lock: None,
        })
    }

    /// Hold `lock` for the lifetime of the channel.
    pub fn with_lock(mut self, lock: ChannelLock) -> Self {
        self._lock = Some(lock);
        self
    }

    /// Limit the number of superpages the channel accepts.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Corrupt one checked word in every `interval`th generated page.
    pub fn with_fault_interval(mut self, interval: u64) -> Self {
        self.fault_interval = (interval > 0).then_some(interval);
        self
    }

    /// Pages written so far.
    pub fn pages_generated(&self) -> u64 {
        self.pages_generated
    }

    fn generate_page(&mut self, offset: usize) {
        let page = match self.buffer.view(offset, self.page_size) {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(offset, error = %e, "emulator page outside buffer");
                return;
            }
        };
        for index in 0..page.len_words() {
            let word = match generated_word(self.family, self.pattern, self.counter, index) {
                Some(word) => word,
                None => self.rng.random(),
            };
            page.write_word(index, word);
        }

        self.pages_generated += 1;
        if let Some(interval) = self.fault_interval {
            // First checked body word on both families
            if self.pages_generated % interval == 0 && page.len_words() > PATTERN_STRIDE {
                page.write_word(PATTERN_STRIDE, !page.word(PATTERN_STRIDE));
            }
        }
        self.counter = self.counter.wrapping_add(1);
    }
}

impl DmaChannel for EmulatedChannel {
    fn card_family(&self) -> CardFamily {
        self.family
    }

    fn start_dma(&mut self) -> Result<()> {
        if self.running {
            return Err(Error::Channel("DMA already started".to_string()));
        }
        self.running = true;
        tracing::debug!(family = %self.family, "emulated DMA started");
        Ok(())
    }

    fn stop_dma(&mut self) -> Result<()> {
        if self.running {
            self.running = false;
            tracing::debug!(pending = self.queue.len(), "emulated DMA stopped");
        }
        Ok(())
    }

    fn reset_channel(&mut self) -> Result<()> {
        if self.running {
            return Err(Error::Channel("cannot reset channel while DMA is running".to_string()));
        }
        self.counter = 0;
        Ok(())
    }

    fn fill_superpages(&mut self) {
        if !self.running {
            return;
        }
        for slot in 0..self.queue.len() {
            let superpage = self.queue[slot];
            let mut received = superpage.received;
            while received + self.page_size <= superpage.size {
                self.generate_page(superpage.offset + received);
                received += self.page_size;
            }
            self.queue[slot].received = received;
        }
    }

    fn superpage_queue_available(&self) -> usize {
        self.capacity.saturating_sub(self.queue.len())
    }

    fn superpage_queue_count(&self) -> usize {
        self.queue.len()
    }

    fn superpage(&self) -> Option<Superpage> {
        self.queue.front().copied()
    }

    fn push_superpage(&mut self, superpage: Superpage) -> Result<()> {
        if self.queue.len() >= self.capacity {
            return Err(Error::Channel("superpage queue full".to_string()));
        }
        let end = superpage.offset.checked_add(superpage.size);
        if superpage.size == 0
            || superpage.size % self.page_size != 0
            || end.map_or(true, |end| end > self.buffer.len())
        {
            return Err(Error::Channel(format!(
                "superpage {}+{} does not fit the buffer in whole pages",
                superpage.offset, superpage.size
            )));
        }
        self.queue.push_back(Superpage::new(superpage.offset, superpage.size));
        Ok(())
    }

    fn pop_superpage(&mut self) -> Option<Superpage> {
        match self.queue.front() {
            Some(head) if head.is_filled() || !self.running => self.queue.pop_front(),
            _ => None,
        }
    }

    fn bar(&self) -> Arc<dyn Bar> {
        self.bar.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::Verifier;

    const PAGE: usize = 8192;
    const SUPERPAGE: usize = 4 * PAGE;

    fn channel(family: CardFamily) -> EmulatedChannel {
        let buffer = Arc::new(DmaBuffer::anonymous(4 * SUPERPAGE).unwrap());
        EmulatedChannel::new(family, buffer, PAGE, GeneratorPattern::Incremental).unwrap()
    }

    #[test]
    fn test_fill_produces_verifiable_pages() {
        for family in [CardFamily::Cru, CardFamily::Crorc] {
            let mut ch = channel(family);
            ch.start_dma().unwrap();
            ch.push_superpage(Superpage::new(0, SUPERPAGE)).unwrap();
            ch.push_superpage(Superpage::new(SUPERPAGE, SUPERPAGE)).unwrap();
            ch.fill_superpages();
            assert_eq!(ch.pages_generated(), 8);

            let mut verifier = Verifier::new(family, GeneratorPattern::Incremental, true, 10).unwrap();
            let buffer = ch.buffer.clone();
            for event in 0..8u64 {
                let page = buffer.view(event as usize * PAGE, PAGE).unwrap();
                assert_eq!(verifier.check_page(event, &page), 0, "{family} page {event}");
                verifier.advance();
            }
        }
    }

    #[test]
    fn test_shrunk_capacity_reports_no_room() {
        let mut ch = channel(CardFamily::Cru);
        ch.push_superpage(Superpage::new(0, SUPERPAGE)).unwrap();
        ch.push_superpage(Superpage::new(SUPERPAGE, SUPERPAGE)).unwrap();
        let mut ch = ch.with_queue_capacity(1);
        assert_eq!(ch.superpage_queue_available(), 0);
        assert!(ch.push_superpage(Superpage::new(2 * SUPERPAGE, SUPERPAGE)).is_err());
        assert_eq!(ch.superpage_queue_count(), 2);
    }

    #[test]
    fn test_pop_only_filled_while_running() {
        let mut ch = channel(CardFamily::Cru);
        ch.push_superpage(Superpage::new(0, SUPERPAGE)).unwrap();
        ch.start_dma().unwrap();
        assert!(ch.pop_superpage().is_none());
        ch.fill_superpages();
        let sp = ch.pop_superpage().unwrap();
        assert!(sp.is_filled());
        assert_eq!(sp.received, SUPERPAGE);
    }

    #[test]
    fn test_stop_releases_unfilled() {
        let mut ch = channel(CardFamily::Cru);
        ch.start_dma().unwrap();
        ch.push_superpage(Superpage::new(SUPERPAGE, SUPERPAGE)).unwrap();
        ch.stop_dma().unwrap();
        ch.fill_superpages();
        let sp = ch.pop_superpage().unwrap();
        assert_eq!(sp.offset, SUPERPAGE);
        assert_eq!(sp.received, 0);
        assert_eq!(ch.superpage_queue_count(), 0);
    }

    #[test]
    fn test_push_validation() {
        let mut ch = channel(CardFamily::Cru).with_queue_capacity(2);
        assert_eq!(ch.superpage_queue_available(), 2);
        assert!(ch.push_superpage(Superpage::new(4 * SUPERPAGE, SUPERPAGE)).is_err());
        assert!(ch.push_superpage(Superpage::new(0, PAGE + 4)).is_err());
        ch.push_superpage(Superpage::new(0, SUPERPAGE)).unwrap();
        ch.push_superpage(Superpage::new(SUPERPAGE, SUPERPAGE)).unwrap();
        assert_eq!(ch.superpage_queue_available(), 0);
        assert!(ch.push_superpage(Superpage::new(2 * SUPERPAGE, SUPERPAGE)).is_err());
        assert_eq!(ch.superpage().map(|sp| sp.offset), Some(0));
    }

    #[test]
    fn test_reset_only_when_stopped() {
        let mut ch = channel(CardFamily::Crorc);
        ch.reset_channel().unwrap();
        ch.start_dma().unwrap();
        assert!(ch.reset_channel().is_err());
        assert!(ch.start_dma().is_err());
    }

    #[test]
    fn test_fault_injection() {
        let mut ch = channel(CardFamily::Cru).with_fault_interval(2);
        ch.start_dma().unwrap();
        ch.push_superpage(Superpage::new(0, SUPERPAGE)).unwrap();
        ch.fill_superpages();
        let mut verifier = Verifier::new(CardFamily::Cru, GeneratorPattern::Incremental, true, 10).unwrap();
        let buffer = ch.buffer.clone();
        let errors: u32 = (0..4)
            .map(|n| {
                let found = verifier.check_page(n, &buffer.view(n as usize * PAGE, PAGE).unwrap());
                verifier.advance();
                found
            })
            .sum();
        assert_eq!(errors, 2);
    }

    #[test]
    fn test_bar_registers() {
        let bar = EmulatedBar::new(CardFamily::Cru);
        bar.write_register(super::super::DEBUG_READ_WRITE, 99);
        assert_eq!(bar.read_register(super::super::DEBUG_READ_WRITE), 99);
        assert_eq!(bar.read_register(REGISTER_COUNT), u32::MAX);
        bar.write_register(REGISTER_COUNT, 1);
        assert_eq!(bar.temperature(), Some(45.0));
        assert_eq!(EmulatedBar::new(CardFamily::Crorc).temperature(), None);
    }
}
