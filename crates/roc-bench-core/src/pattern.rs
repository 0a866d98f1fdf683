//! Data generator patterns and readout modes.
//!
//! The card's internal data generator writes one of a few deterministic
//! sequences so that software can check the transport end to end.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Word written by the generator in alternating mode.
pub const ALTERNATING_WORD: u32 = 0xA5A5_A5A5;

/// Word written by the generator in constant mode.
pub const CONSTANT_WORD: u32 = 0x1234_5678;

/// Sequence written by the card's data generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeneratorPattern {
    /// Counter-derived words, different for every page.
    #[default]
    Incremental,
    /// Every checked word is [`ALTERNATING_WORD`].
    Alternating,
    /// Every checked word is [`CONSTANT_WORD`].
    Constant,
    /// Pseudo-random data. Cannot be verified.
    Random,
}

impl GeneratorPattern {
    /// All patterns, in CLI order.
    pub const ALL: [GeneratorPattern; 4] = [
        GeneratorPattern::Incremental,
        GeneratorPattern::Alternating,
        GeneratorPattern::Constant,
        GeneratorPattern::Random,
    ];

    /// Upper-case name used on the command line and in reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            GeneratorPattern::Incremental => "INCREMENTAL",
            GeneratorPattern::Alternating => "ALTERNATING",
            GeneratorPattern::Constant => "CONSTANT",
            GeneratorPattern::Random => "RANDOM",
        }
    }

    /// Whether pages written with this pattern can be checked.
    pub const fn is_verifiable(self) -> bool {
        !matches!(self, GeneratorPattern::Random)
    }

    /// The fixed word for patterns that do not depend on position.
    pub const fn fixed_word(self) -> Option<u32> {
        match self {
            GeneratorPattern::Alternating => Some(ALTERNATING_WORD),
            GeneratorPattern::Constant => Some(CONSTANT_WORD),
            GeneratorPattern::Incremental | GeneratorPattern::Random => None,
        }
    }
}

impl fmt::Display for GeneratorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeneratorPattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::Config(format!("unknown generator pattern '{s}'")))
    }
}

/// How the card produces data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadoutMode {
    /// Data flows without waiting for triggers.
    #[default]
    Continuous,
}

impl ReadoutMode {
    /// Upper-case name used on the command line.
    pub const fn as_str(self) -> &'static str {
        match self {
            ReadoutMode::Continuous => "CONTINUOUS",
        }
    }
}

impl fmt::Display for ReadoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadoutMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case(ReadoutMode::Continuous.as_str()) {
            Ok(ReadoutMode::Continuous)
        } else {
            Err(Error::Config(format!("unknown readout mode '{s}'")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_from_str_case_insensitive() {
        assert_eq!("INCREMENTAL".parse::<GeneratorPattern>().unwrap(), GeneratorPattern::Incremental);
        assert_eq!("alternating".parse::<GeneratorPattern>().unwrap(), GeneratorPattern::Alternating);
        assert_eq!(" Constant ".parse::<GeneratorPattern>().unwrap(), GeneratorPattern::Constant);
        assert_eq!("RANDOM".parse::<GeneratorPattern>().unwrap(), GeneratorPattern::Random);
    }

    #[test]
    fn test_pattern_from_str_unknown() {
        let err = "SAWTOOTH".parse::<GeneratorPattern>().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_pattern_display_roundtrips() {
        for pattern in GeneratorPattern::ALL {
            assert_eq!(pattern.to_string().parse::<GeneratorPattern>().unwrap(), pattern);
        }
    }

    #[test]
    fn test_pattern_fixed_words() {
        assert_eq!(GeneratorPattern::Alternating.fixed_word(), Some(0xa5a5a5a5));
        assert_eq!(GeneratorPattern::Constant.fixed_word(), Some(0x12345678));
        assert_eq!(GeneratorPattern::Incremental.fixed_word(), None);
        assert!(!GeneratorPattern::Random.is_verifiable());
    }

    #[test]
    fn test_readout_mode_parse() {
        assert_eq!("continuous".parse::<ReadoutMode>().unwrap(), ReadoutMode::Continuous);
        assert!("TRIGGERED".parse::<ReadoutMode>().is_err());
    }
}
