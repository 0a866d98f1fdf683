//! Command-line interface.

use clap::{Parser, ValueEnum};
use roc_bench_core::config::{page_limit, MIB};
use roc_bench_core::{BenchConfig, BufferSize, CardId, DumpMode, Error, GeneratorPattern, ReadoutMode};
use std::path::PathBuf;

/// Test readout card DMA performance
#[derive(Parser, Debug)]
#[command(name = "roc-dma-bench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Card: PCI address (42:00.0), serial number, emu-cru or emu-crorc
    #[arg(long = "id")]
    pub card_id: String,

    /// DMA channel
    #[arg(long)]
    pub channel: u32,

    /// Pages to read out; 0 or less runs until interrupted
    #[arg(long, default_value_t = 1500, allow_negative_numbers = true)]
    pub pages: i64,

    /// DMA buffer size, e.g. 10MB (2 MiB hugepages) or 1GB (1 GiB hugepages)
    #[arg(long, default_value = "10MB")]
    pub buffer_size: String,

    /// Superpage size in MiB
    #[arg(long, default_value_t = 1)]
    pub superpage_size: usize,

    /// DMA page size in KiB
    #[arg(long, default_value_t = 8)]
    pub dma_page_size: usize,

    /// Reset the channel before starting DMA
    #[arg(long)]
    pub reset: bool,

    /// Dump pages to readout_data.txt
    #[arg(long)]
    pub to_file_ascii: bool,

    /// Dump pages to readout_data.bin
    #[arg(long)]
    pub to_file_bin: bool,

    /// Skip data error checking
    #[arg(long)]
    pub no_errorcheck: bool,

    /// Data generator pattern
    #[arg(long, value_enum, ignore_case = true, default_value = "incremental")]
    pub pattern: Pattern,

    /// Readout mode
    #[arg(long, value_enum, ignore_case = true)]
    pub readout_mode: Option<Mode>,

    /// Keep the expected counter running after a mismatch
    #[arg(long)]
    pub no_resync: bool,

    /// Stamp every page with 0xCCCCCCCC after reading it
    #[arg(long)]
    pub page_reset: bool,

    /// Stress the BAR with register writes during readout (CRU only)
    #[arg(long)]
    pub bar_hammer: bool,

    /// Inject random pauses into the push and readout loops
    #[arg(long)]
    pub random_pause: bool,

    /// Remove the hugetlbfs pages file at exit
    #[arg(long)]
    pub rm_pages_file: bool,

    /// Live status display and console error log
    #[arg(short, long)]
    pub verbose: bool,

    /// Use this file for the DMA buffer instead of the hugetlbfs default
    #[arg(long)]
    pub buffer_path: Option<PathBuf>,

    /// Directory for readout_data.* and readout_errors.txt
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Generator pattern selection
#[derive(Clone, Copy, Debug, ValueEnum, Default, PartialEq, Eq)]
pub enum Pattern {
    /// Counter-derived words (default)
    #[default]
    Incremental,
    /// 0xA5A5A5A5
    Alternating,
    /// 0x12345678
    Constant,
    /// Random data, cannot be checked
    Random,
}

impl Pattern {
    pub fn to_core(self) -> GeneratorPattern {
        match self {
            Pattern::Incremental => GeneratorPattern::Incremental,
            Pattern::Alternating => GeneratorPattern::Alternating,
            Pattern::Constant => GeneratorPattern::Constant,
            Pattern::Random => GeneratorPattern::Random,
        }
    }
}

/// Readout mode selection
#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum Mode {
    /// Free-running data flow
    Continuous,
}

impl Mode {
    pub fn to_core(self) -> ReadoutMode {
        match self {
            Mode::Continuous => ReadoutMode::Continuous,
        }
    }
}

impl Cli {
    /// Translate the arguments into a benchmark configuration.
    pub fn to_config(&self) -> roc_bench_core::Result<BenchConfig> {
        let card_id: CardId = self.card_id.parse()?;
        let mut config = BenchConfig::new(card_id, self.channel);

        config.max_pages = page_limit(self.pages);
        config.buffer = self.buffer_size.parse::<BufferSize>()?;
        config.superpage_size = self
            .superpage_size
            .checked_mul(MIB)
            .filter(|&size| size > 0)
            .ok_or_else(|| Error::Config(format!("invalid superpage size {} MiB", self.superpage_size)))?;
        config.page_size = self
            .dma_page_size
            .checked_mul(1024)
            .filter(|&size| size > 0)
            .ok_or_else(|| Error::Config(format!("invalid DMA page size {} KiB", self.dma_page_size)))?;
        config.reset_channel = self.reset;
        config.dump = DumpMode::from_flags(self.to_file_ascii, self.to_file_bin)?;
        config.error_check = !self.no_errorcheck;
        config.pattern = self.pattern.to_core();
        config.readout_mode = self.readout_mode.map(Mode::to_core);
        config.resync = !self.no_resync;
        config.page_reset = self.page_reset;
        config.bar_hammer = self.bar_hammer;
        config.random_pause = self.random_pause;
        config.remove_pages_file = self.rm_pages_file;
        config.verbose = self.verbose;
        config.buffer_path = self.buffer_path.clone();
        config.output_dir = self.output_dir.clone();
        Ok(config)
    }
}
