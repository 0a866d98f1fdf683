//! Page content verification against the card's data generator.
//!
//! Two algorithms, one per card family:
//!
//! - **CRU** checks every [`PATTERN_STRIDE`]th word. With the incremental
//!   pattern word `i` holds `counter * 256 + i / 8`.
//! - **C-RORC** expects the event counter in word 0, then checks every word
//!   after the [`CRORC_HEADER_WORDS`]-word header. With the incremental
//!   pattern word `i` holds `i - 1`.
//!
//! A page reports at most one body mismatch. The verifier keeps the expected
//! counter, seeded from the first page it sees, and can re-derive it from
//! the page's leading word after a mismatch (resync).

use crate::buffer::PageView;
use crate::card::CardFamily;
use crate::error::{Error, Result};
use crate::pattern::GeneratorPattern;
use std::fmt;

/// Distance between checked words on a CRU page.
pub const PATTERN_STRIDE: usize = 8;

/// Header words at the start of a C-RORC page.
pub const CRORC_HEADER_WORDS: usize = 8;

/// Word the generator writes at `index` of the page with event `counter`.
///
/// Returns `None` for [`GeneratorPattern::Random`].
pub fn generated_word(
    family: CardFamily,
    pattern: GeneratorPattern,
    counter: u32,
    index: usize,
) -> Option<u32> {
    if family == CardFamily::Crorc && index < CRORC_HEADER_WORDS {
        return Some(if index == 0 { counter } else { 0 });
    }
    match pattern {
        GeneratorPattern::Random => None,
        GeneratorPattern::Alternating | GeneratorPattern::Constant => pattern.fixed_word(),
        GeneratorPattern::Incremental => Some(match family {
            CardFamily::Cru => counter
                .wrapping_mul(256)
                .wrapping_add((index / PATTERN_STRIDE) as u32),
            CardFamily::Crorc => (index as u32).wrapping_sub(1),
        }),
    }
}

/// Event counter encoded in a page's leading word.
pub fn leading_counter(family: CardFamily, page: &PageView<'_>) -> u32 {
    if page.len_words() == 0 {
        return 0;
    }
    match family {
        CardFamily::Cru => page.word(0) / 256,
        CardFamily::Crorc => page.word(0),
    }
}

/// One data mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    /// Readout page number.
    pub event: u64,
    /// Word index within the page.
    pub index: usize,
    /// Expected event counter at the time of the check.
    pub counter: u32,
    /// Expected word.
    pub expected: u32,
    /// Word found in the page.
    pub actual: u32,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "event:{} i:{} cnt:{} exp:0x{:x} val:0x{:x}",
            self.event, self.index, self.counter, self.expected, self.actual
        )
    }
}

/// Text log of mismatches, capped in size. The total is not capped.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    text: String,
    recorded: usize,
    max_recorded: usize,
    total: u64,
}

impl ErrorLog {
    /// Log retaining at most `max_recorded` lines.
    pub fn new(max_recorded: usize) -> Self {
        Self {
            max_recorded,
            ..Self::default()
        }
    }

    /// Count a mismatch and keep its line if there is room.
    pub fn record(&mut self, mismatch: &Mismatch) {
        use std::fmt::Write as _;
        self.total += 1;
        if self.recorded < self.max_recorded {
            // Writing to a String cannot fail
            let _ = writeln!(self.text, "{mismatch}");
            self.recorded += 1;
        }
    }

    /// All mismatches seen.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Lines retained.
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Retained lines, newline-terminated.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether no mismatch was recorded.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Per-run page verifier.
#[derive(Debug, Clone)]
pub struct Verifier {
    family: CardFamily,
    pattern: GeneratorPattern,
    resync: bool,
    counter: Option<u32>,
    log: ErrorLog,
}

impl Verifier {
    /// Create a verifier. Fails for patterns that cannot be checked.
    pub fn new(
        family: CardFamily,
        pattern: GeneratorPattern,
        resync: bool,
        max_recorded: usize,
    ) -> Result<Self> {
        if !pattern.is_verifiable() {
            return Err(Error::UnsupportedPattern(pattern));
        }
        Ok(Self {
            family,
            pattern,
            resync,
            counter: None,
            log: ErrorLog::new(max_recorded),
        })
    }

    /// Check one page. Returns the number of mismatches found (0 to 2).
    pub fn check_page(&mut self, event: u64, page: &PageView<'_>) -> u32 {
        let family = self.family;
        let counter = *self
            .counter
            .get_or_insert_with(|| leading_counter(family, page));

        let mut found = 0;
        let body = match self.family {
            CardFamily::Cru => {
                self.scan(event, counter, page, (0..page.len_words()).step_by(PATTERN_STRIDE))
            }
            CardFamily::Crorc => {
                if page.len_words() > 0 && page.word(0) != counter {
                    self.log.record(&Mismatch {
                        event,
                        index: 0,
                        counter,
                        expected: counter,
                        actual: page.word(0),
                    });
                    found += 1;
                }
                self.scan(event, counter, page, CRORC_HEADER_WORDS..page.len_words())
            }
        };

        // Only a body mismatch moves the counter; a bad header is just counted
        if let Some(m) = body {
            self.log.record(&m);
            found += 1;
        }
        if body.is_some() && self.resync {
            let resynced = leading_counter(self.family, page);
            tracing::trace!(event, from = counter, to = resynced, "resync");
            self.counter = Some(resynced);
        }
        found
    }

    fn scan(
        &self,
        event: u64,
        counter: u32,
        page: &PageView<'_>,
        indices: impl Iterator<Item = usize>,
    ) -> Option<Mismatch> {
        for index in indices {
            let expected = generated_word(self.family, self.pattern, counter, index)?;
            let actual = page.word(index);
            if actual != expected {
                return Some(Mismatch {
                    event,
                    index,
                    counter,
                    expected,
                    actual,
                });
            }
        }
        None
    }

    /// Move on to the next page.
    pub fn advance(&mut self) {
        if let Some(counter) = self.counter.as_mut() {
            *counter = counter.wrapping_add(1);
        }
    }

    /// Expected counter for the next page, once seeded.
    pub fn counter(&self) -> Option<u32> {
        self.counter
    }

    /// Total mismatches so far.
    pub fn error_count(&self) -> u64 {
        self.log.total()
    }

    /// The mismatch log.
    pub fn log(&self) -> &ErrorLog {
        &self.log
    }

    /// Consume the verifier, keeping its log.
    pub fn into_log(self) -> ErrorLog {
        self.log
    }
}
