//! Benchmark configuration.
//!
//! [`BenchConfig`] is the immutable snapshot handed to the run controller.
//! It is built once from the command line (or directly in tests) and
//! validated before any buffer is mapped or any channel is opened.

use crate::card::CardId;
use crate::error::{Error, Result};
use crate::pattern::{GeneratorPattern, ReadoutMode};
use crate::pause::PauseRange;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Bytes in one MiB.
pub const MIB: usize = 1024 * 1024;

/// Bytes in one GiB.
pub const GIB: usize = 1024 * MIB;

/// Default DMA page size.
pub const DEFAULT_PAGE_SIZE: usize = 8 * 1024;

/// Directory under which hugetlbfs mounts are expected.
pub const HUGETLBFS_ROOT: &str = "/var/lib/hugetlbfs/global";

/// Hugepage granularity backing the DMA buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HugePageSize {
    /// 2 MiB pages, selected by an `MB` buffer size.
    Size2M,
    /// 1 GiB pages, selected by a `GB` buffer size.
    Size1G,
}

impl HugePageSize {
    /// Size of one hugepage in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            HugePageSize::Size2M => 2 * MIB,
            HugePageSize::Size1G => GIB,
        }
    }

    /// Label used in hugetlbfs mount directory names.
    pub const fn label(self) -> &'static str {
        match self {
            HugePageSize::Size2M => "2MB",
            HugePageSize::Size1G => "1GB",
        }
    }
}

/// DMA buffer size together with the hugepage size that backs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSize {
    /// Total buffer size in bytes.
    pub bytes: usize,
    /// Hugepage granularity.
    pub hugepage: HugePageSize,
}

impl FromStr for BufferSize {
    type Err = Error;

    /// Parse `<N>MB` or `<N>GB`.
    ///
    /// `MB` values are rounded down to a multiple of 2 (minimum 2) and use
    /// 2 MiB hugepages. `GB` values use 1 GiB hugepages.
    fn from_str(s: &str) -> Result<Self> {
        let input = s.trim();
        if input.len() < 3 {
            return Err(Error::Config(format!("invalid buffer size '{s}'")));
        }
        let split = input.len() - 2;
        let (number, unit) = match (input.get(..split), input.get(split..)) {
            (Some(number), Some(unit)) => (number, unit),
            _ => return Err(Error::Config(format!("invalid buffer size '{s}'"))),
        };

        let hugepage = if unit.eq_ignore_ascii_case("MB") {
            HugePageSize::Size2M
        } else if unit.eq_ignore_ascii_case("GB") {
            HugePageSize::Size1G
        } else {
            return Err(Error::Config(format!(
                "invalid buffer size unit '{unit}', expected MB or GB"
            )));
        };

        let value: usize = number
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid buffer size argument '{s}'")))?;

        let bytes = match hugepage {
            HugePageSize::Size2M => {
                let value = value.max(2);
                (value - value % 2).checked_mul(MIB)
            }
            HugePageSize::Size1G => value.checked_mul(GIB),
        }
        .ok_or_else(|| Error::Config(format!("buffer size '{s}' overflows")))?;

        Ok(BufferSize { bytes, hugepage })
    }
}

impl fmt::Display for BufferSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hugepage {
            HugePageSize::Size2M => write!(f, "{}MB", self.bytes / MIB),
            HugePageSize::Size1G => write!(f, "{}GB", self.bytes / GIB),
        }
    }
}

/// Where read-out pages are copied, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpMode {
    /// No page dump.
    #[default]
    None,
    /// `readout_data.txt`, decimal words.
    Ascii,
    /// `readout_data.bin`, raw page bytes.
    Binary,
}

impl DumpMode {
    /// Combine the two mutually exclusive dump flags.
    pub fn from_flags(ascii: bool, binary: bool) -> Result<Self> {
        match (ascii, binary) {
            (true, true) => Err(Error::Config(
                "file output can't be both ASCII and binary".to_string(),
            )),
            (true, false) => Ok(DumpMode::Ascii),
            (false, true) => Ok(DumpMode::Binary),
            (false, false) => Ok(DumpMode::None),
        }
    }

    /// File name the dump is written to.
    pub const fn file_name(self) -> Option<&'static str> {
        match self {
            DumpMode::None => None,
            DumpMode::Ascii => Some("readout_data.txt"),
            DumpMode::Binary => Some("readout_data.bin"),
        }
    }
}

/// Tunables that used to be hard-wired constants.
#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    /// Mismatch lines retained in the error log. The error total is unbounded.
    pub max_recorded_errors: usize,
    /// BAR writes per stress round.
    pub hammer_multiplier: u64,
    /// Monitor task period.
    pub monitor_interval: Duration,
    /// The status display scrolls one line per this interval.
    pub display_newline_interval: Duration,
    /// How long the controller keeps draining filled superpages at shutdown.
    pub drain_timeout: Duration,
    /// Characters of the error log printed to the console.
    pub console_error_chars: usize,
    /// Random pause scheduling.
    pub pause: PauseRange,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_recorded_errors: 1000,
            hammer_multiplier: 10_000,
            monitor_interval: Duration::from_millis(10),
            display_newline_interval: Duration::from_secs(60),
            drain_timeout: Duration::from_millis(10),
            console_error_chars: 2000,
            pause: PauseRange::default(),
        }
    }
}

/// Immutable benchmark configuration.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub card_id: CardId,
    pub channel: u32,
    /// `None` runs until interrupted.
    pub max_pages: Option<u64>,
    pub buffer: BufferSize,
    pub superpage_size: usize,
    pub page_size: usize,
    pub reset_channel: bool,
    pub dump: DumpMode,
    pub error_check: bool,
    pub pattern: GeneratorPattern,
    pub readout_mode: Option<ReadoutMode>,
    pub resync: bool,
    pub page_reset: bool,
    pub bar_hammer: bool,
    pub random_pause: bool,
    pub remove_pages_file: bool,
    pub verbose: bool,
    /// Overrides the hugetlbfs buffer file.
    pub buffer_path: Option<PathBuf>,
    /// Directory for `readout_data.*` and `readout_errors.txt`.
    pub output_dir: PathBuf,
    pub limits: Limits,
}

impl BenchConfig {
    /// Configuration with the command-line defaults.
    pub fn new(card_id: CardId, channel: u32) -> Self {
        Self {
            card_id,
            channel,
            max_pages: Some(1500),
            buffer: BufferSize {
                bytes: 10 * MIB,
                hugepage: HugePageSize::Size2M,
            },
            superpage_size: MIB,
            page_size: DEFAULT_PAGE_SIZE,
            reset_channel: false,
            dump: DumpMode::None,
            error_check: true,
            pattern: GeneratorPattern::Incremental,
            readout_mode: None,
            resync: true,
            page_reset: false,
            bar_hammer: false,
            random_pause: false,
            remove_pages_file: false,
            verbose: false,
            buffer_path: None,
            output_dir: PathBuf::from("."),
            limits: Limits::default(),
        }
    }

    /// Check the invariants that can be checked without hardware.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size % 4 != 0 {
            return Err(Error::Config(format!(
                "DMA page size {} must be a non-zero multiple of 4 bytes",
                self.page_size
            )));
        }
        if self.superpage_size < self.page_size || self.superpage_size % self.page_size != 0 {
            return Err(Error::Config(format!(
                "superpage size {} must be a multiple of the DMA page size {}",
                self.superpage_size, self.page_size
            )));
        }
        if self.buffer.bytes < self.superpage_size {
            return Err(Error::Config(format!(
                "buffer size {} smaller than superpage size {}",
                self.buffer.bytes, self.superpage_size
            )));
        }
        if self.limits.hammer_multiplier == 0 {
            return Err(Error::Config("BAR hammer multiplier must be > 0".to_string()));
        }
        if self.limits.monitor_interval.is_zero() {
            return Err(Error::Config("monitor interval must be > 0".to_string()));
        }
        self.limits.pause.validate()
    }

    /// Pages per superpage.
    pub fn pages_per_superpage(&self) -> usize {
        self.superpage_size / self.page_size
    }

    /// Buffer file used for the DMA buffer.
    pub fn buffer_file_path(&self) -> PathBuf {
        self.buffer_path
            .clone()
            .unwrap_or_else(|| default_buffer_path(self.buffer.hugepage, &self.card_id, self.channel))
    }
}

/// Convert the CLI page count (`<= 0` means unbounded) to a limit.
pub fn page_limit(pages: i64) -> Option<u64> {
    u64::try_from(pages).ok().filter(|&p| p > 0)
}

/// Hugetlbfs file for a card/channel pair.
pub fn default_buffer_path(hugepage: HugePageSize, card_id: &CardId, channel: u32) -> PathBuf {
    PathBuf::from(format!(
        "{HUGETLBFS_ROOT}/pagesize-{}/roc-dma-bench_id={card_id}_chan={channel}_pages",
        hugepage.label()
    ))
}
