//! Independently advancing tick counters.

use fsm_relay_core::{ConfigurationError, Tick, TimerId};

/// Bank of named clocks, each an unbounded tick accumulator.
#[derive(Clone, Debug)]
pub(crate) struct TimerBank {
    ticks: Vec<Tick>,
}

impl TimerBank {
    /// Creates a bank of `count` timers, all reading zero.
    pub(crate) fn new(count: usize) -> Self {
        Self {
            ticks: vec![0; count],
        }
    }

    /// Adds `delta` ticks to the timer and returns its new reading.
    pub(crate) fn advance(
        &mut self,
        timer: TimerId,
        delta: Tick,
    ) -> Result<Tick, ConfigurationError> {
        let count = self.ticks.len();
        let slot = self
            .ticks
            .get_mut(timer.index())
            .ok_or(ConfigurationError::TimerOutOfRange { timer, count })?;
        *slot = slot.saturating_add(delta);
        Ok(*slot)
    }

    /// Current reading of the timer, or `None` when the id is out of range.
    pub(crate) fn read(&self, timer: TimerId) -> Option<Tick> {
        self.ticks.get(timer.index()).copied()
    }

    /// Validates that the timer exists.
    pub(crate) fn check(&self, timer: TimerId) -> Result<(), ConfigurationError> {
        if timer.index() < self.ticks.len() {
            Ok(())
        } else {
            Err(ConfigurationError::TimerOutOfRange {
                timer,
                count: self.ticks.len(),
            })
        }
    }

    pub(crate) fn reset(&mut self) {
        self.ticks.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_start_at_zero_and_advance_independently() {
        let mut bank = TimerBank::new(2);
        assert_eq!(bank.read(TimerId::new(0)), Some(0));

        assert_eq!(bank.advance(TimerId::new(0), 16), Ok(16));
        assert_eq!(bank.advance(TimerId::new(0), 4), Ok(20));

        assert_eq!(bank.read(TimerId::new(0)), Some(20));
        assert_eq!(bank.read(TimerId::new(1)), Some(0));
    }

    #[test]
    fn out_of_range_timer_is_rejected() {
        let mut bank = TimerBank::new(1);
        assert_eq!(bank.read(TimerId::new(1)), None);
        assert_eq!(
            bank.advance(TimerId::new(1), 5),
            Err(ConfigurationError::TimerOutOfRange {
                timer: TimerId::new(1),
                count: 1,
            })
        );
        assert!(bank.check(TimerId::new(0)).is_ok());
        assert!(bank.check(TimerId::new(1)).is_err());
    }

    #[test]
    fn advancing_saturates_instead_of_wrapping() {
        let mut bank = TimerBank::new(1);
        let _ = bank.advance(TimerId::PRIMARY, Tick::MAX - 1);
        assert_eq!(bank.advance(TimerId::PRIMARY, 10), Ok(Tick::MAX));
    }

    #[test]
    fn reset_zeroes_every_timer() {
        let mut bank = TimerBank::new(3);
        let _ = bank.advance(TimerId::new(2), 99);
        bank.reset();
        assert_eq!(bank.read(TimerId::new(2)), Some(0));
    }
}
