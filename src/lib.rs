//! # roc-bench
//!
//! Superpage DMA streaming and data-integrity benchmark for readout cards.
//!
//! This is the workspace root crate that re-exports core functionality.
//! For direct usage, depend on individual sub-crates:
//!
//! - [`roc-bench-core`] - Buffer, queues, emulated card, verifier and run controller
//! - [`roc-dma-bench`] - CLI tool (`roc-dma-bench` binary)
//!
//! [`roc-bench-core`]: roc_bench_core

pub use roc_bench_core::*;
