//! Simulation clock
//!
//! Owns simulated time for one run. Real elapsed time is accumulated as an
//! absolute integer nanosecond counter and converted to simulated time with
//! a single multiplication by the time scale, so rounding error never
//! compounds across ticks. Time never moves backward.

use std::time::Duration;

use crate::core::error::{Result, SimError};
use crate::core::time::SimTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockStatus {
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SimClock {
    start: SimTime,
    /// Simulated seconds per real second
    time_scale: f64,
    /// Real nanoseconds accumulated while running
    real_nanos: u128,
    status: ClockStatus,
}

impl SimClock {
    pub fn new(start: SimTime, time_scale: f64) -> Self {
        Self {
            start,
            time_scale,
            real_nanos: 0,
            status: ClockStatus::Running,
        }
    }

    /// Advance the clock by real elapsed time, returning simulated elapsed
    /// time. A no-op (zero) while paused; rejected once stopped.
    pub fn advance(&mut self, real_elapsed: Duration) -> Result<Duration> {
        match self.status {
            ClockStatus::Stopped => Err(SimError::ClockMisuse("advance on a stopped clock")),
            ClockStatus::Paused => Ok(Duration::ZERO),
            ClockStatus::Running => {
                let before = self.sim_elapsed_millis();
                self.real_nanos += real_elapsed.as_nanos();
                let after = self.sim_elapsed_millis();
                Ok(Duration::from_millis(after - before))
            }
        }
    }

    pub fn pause(&mut self) {
        if self.status == ClockStatus::Running {
            self.status = ClockStatus::Paused;
        }
    }

    pub fn resume(&mut self) -> Result<()> {
        match self.status {
            ClockStatus::Stopped => Err(SimError::ClockMisuse("resume on a stopped clock")),
            _ => {
                self.status = ClockStatus::Running;
                Ok(())
            }
        }
    }

    /// Terminal and idempotent
    pub fn stop(&mut self) {
        self.status = ClockStatus::Stopped;
    }

    pub fn now(&self) -> SimTime {
        SimTime(self.start.0 + self.sim_elapsed_millis())
    }

    pub fn start_time(&self) -> SimTime {
        self.start
    }

    pub fn status(&self) -> ClockStatus {
        self.status
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    /// Simulated milliseconds elapsed since the run start.
    ///
    /// Derived from the absolute real-time counter in one multiplication;
    /// the counter only grows, so this is monotonic.
    fn sim_elapsed_millis(&self) -> u64 {
        (self.real_nanos as f64 * self.time_scale / 1e6) as u64
    }
}
