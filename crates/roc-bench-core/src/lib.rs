//! Superpage-based DMA streaming and verification engine for readout cards.
//!
//! The buffer is divided into superpages that circulate between two
//! lock-free SPSC queues and the card's DMA channel:
//!
//! ```text
//!            push task                     readout task
//! Free queue ─────────▶ channel ─────────▶ Readout queue ─┐
//!     ▲                                                   │
//!     └───────────── verified / dumped pages ◀────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use roc_bench_core::{BenchConfig, CardFamily, CardId, DmaBench};
//! use std::sync::atomic::AtomicBool;
//!
//! let mut config = BenchConfig::new(CardId::Emulated(CardFamily::Cru), 0);
//! config.max_pages = Some(256);
//! config.output_dir = std::env::temp_dir();
//!
//! let bench = DmaBench::new(config).unwrap();
//! let report = bench.execute(&AtomicBool::new(false)).unwrap();
//!
//! assert_eq!(report.stats.readout_count, 256);
//! assert_eq!(report.stats.error_count, 0);
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bench;
pub mod buffer;
pub mod card;
pub mod config;
pub mod dump;
mod error;
pub mod pattern;
pub mod pause;
pub mod queue;
pub mod report;
pub mod stats;
pub mod superpage;
pub mod tasks;
pub mod verify;

pub use bench::DmaBench;
pub use buffer::{DmaBuffer, PageView};
pub use card::{open_channel, Bar, CardFamily, CardId, ChannelParams, DmaChannel};
pub use config::{BenchConfig, BufferSize, DumpMode, HugePageSize, Limits};
pub use error::{Error, Result};
pub use pattern::{GeneratorPattern, ReadoutMode};
pub use queue::{superpage_queue, QueueConsumer, QueueProducer};
pub use report::{RunReport, RunSummary};
pub use stats::{RunStats, StatsSnapshot, Throughput};
pub use superpage::{Superpage, SuperpageLayout};
pub use verify::{ErrorLog, Mismatch, Verifier};
