//! BAR register stress task.

use super::CancelToken;
use crate::card::{Bar, CardFamily, DEBUG_READ_WRITE};
use crate::error::{Error, Result};
use crate::stats::RunStats;
use std::sync::Arc;

/// Writes an incrementing value to the debug register as fast as possible.
pub struct BarHammer<'a> {
    bar: Arc<dyn Bar>,
    stats: &'a RunStats,
    stop: CancelToken,
    multiplier: u64,
}

impl<'a> BarHammer<'a> {
    /// Fails with a capability error on families without the debug register.
    pub fn new(
        family: CardFamily,
        bar: Arc<dyn Bar>,
        stats: &'a RunStats,
        stop: CancelToken,
        multiplier: u64,
    ) -> Result<Self> {
        if !family.supports_bar_hammer() {
            return Err(Error::Capability(format!(
                "BAR hammer is only supported for CRU, not {family}"
            )));
        }
        Ok(Self {
            bar,
            stats,
            stop,
            multiplier,
        })
    }

    /// Write rounds of `multiplier` values until stopped. Returns the number
    /// of writes performed.
    pub fn run(self) -> u64 {
        let mut value: u32 = 0;
        let mut rounds: u64 = 0;
        while !self.stop.is_cancelled() {
            for _ in 0..self.multiplier {
                self.bar.write_register(DEBUG_READ_WRITE, value);
                value = value.wrapping_add(1);
            }
            rounds += 1;
            self.stats.add_hammer_writes(self.multiplier);
        }
        let writes = rounds * self.multiplier;
        tracing::debug!(rounds, writes, "BAR hammer stopped");
        writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::EmulatedBar;
    use std::time::Duration;

    #[test]
    fn test_crorc_rejected() {
        let stats = RunStats::new();
        let bar = Arc::new(EmulatedBar::new(CardFamily::Crorc));
        let err = BarHammer::new(CardFamily::Crorc, bar, &stats, CancelToken::new(), 10).err().unwrap();
        assert!(matches!(err, Error::Capability(_)));
    }

    #[test]
    fn test_writes_are_whole_rounds() {
        let stats = RunStats::new();
        let bar: Arc<dyn Bar> = Arc::new(EmulatedBar::new(CardFamily::Cru));
        let stop = CancelToken::new();
        let hammer = BarHammer::new(CardFamily::Cru, bar.clone(), &stats, stop.clone(), 100).unwrap();

        let writes = std::thread::scope(|s| {
            let handle = s.spawn(|| hammer.run());
            std::thread::sleep(Duration::from_millis(10));
            stop.cancel();
            handle.join().unwrap()
        });
        assert!(writes > 0);
        assert_eq!(writes % 100, 0);
        assert_eq!(stats.hammer_writes(), writes);
        assert_eq!(bar.read_register(DEBUG_READ_WRITE), (writes - 1) as u32);
    }
}
