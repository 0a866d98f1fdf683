//! Error types for roc-bench-core.

use crate::pattern::GeneratorPattern;
use thiserror::Error;

/// Errors that can occur while configuring or running a DMA benchmark.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration, detected before any hardware is touched.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The card family (or build) does not support the requested feature.
    #[error("unsupported by card: {0}")]
    Capability(String),

    /// The generator pattern cannot be verified.
    #[error("error checking is not supported for the {0} pattern")]
    UnsupportedPattern(GeneratorPattern),

    /// Superpage bookkeeping went out of sync. Always a bug, never bad data.
    #[error("internal error: superpage queue invariant violated: {0}")]
    QueueInvariant(String),

    /// The DMA buffer could not be mapped or accessed.
    #[error("DMA buffer error: {message}")]
    Buffer {
        /// What was being attempted.
        message: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The DMA channel rejected an operation.
    #[error("DMA channel error: {0}")]
    Channel(String),

    /// I/O error (dump files, error log).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for errors that are reported before the channel is opened.
    #[inline]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true for errors that indicate a bug in the pipeline itself.
    #[inline]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::QueueInvariant(_))
    }

    pub(crate) fn buffer(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Buffer {
            message: message.into(),
            source,
        }
    }
}

/// Result type for benchmark operations.
pub type Result<T> = std::result::Result<T, Error>;
