//! # Sensor polling
//!
//! Every device driven by `sens_exec` implements [`Sensor`]. The executable hands the device to
//! [`run_loop`], which samples it at a fixed period until the running flag is cleared.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    fmt::Display,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant}
};
use log::{info, warn};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A device that is read (or actuated) once per cycle.
pub trait Sensor {
    /// The value produced by one cycle.
    type Reading: Display;

    /// An error which can occur during one cycle.
    type Error: Display;

    /// Human readable name used in the log.
    fn name(&self) -> &'static str;

    /// Perform one cycle.
    fn sample(&mut self) -> Result<Self::Reading, Self::Error>;
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Sample `sensor` every `period` until `running` is cleared.
///
/// Readings are logged at `INFO`, failed cycles at `WARN`; a failed cycle never stops the loop.
/// The period is measured from the start of one sample to the start of the next, so a slow
/// sample eats into the sleep rather than adding to it.
///
/// Returns the number of cycles performed.
pub fn run_loop<S: Sensor>(sensor: &mut S, period: Duration, running: &AtomicBool) -> u64 {
    let mut num_cycles = 0;

    info!("Polling {} every {:.3} s", sensor.name(), period.as_secs_f64());

    while running.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();

        match sensor.sample() {
            Ok(r) => info!("{}", r),
            Err(e) => warn!("{} cycle failed: {}", sensor.name(), e)
        }
        num_cycles += 1;

        sleep_while_running(period.checked_sub(cycle_start.elapsed()), running);
    }

    info!("{} stopped after {} cycles", sensor.name(), num_cycles);

    num_cycles
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Sleep in short steps so that an interrupt isn't held up by a long period.
fn sleep_while_running(duration: Option<Duration>, running: &AtomicBool) {
    const STEP: Duration = Duration::from_millis(50);

    let mut remaining = match duration {
        Some(d) => d,
        None => return
    };

    while running.load(Ordering::SeqCst) && remaining > Duration::from_secs(0) {
        let step = remaining.min(STEP);
        thread::sleep(step);
        remaining -= step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    struct Counter<'a> {
        count: u32,
        fail_on: u32,
        stop_after: u32,
        running: &'a AtomicBool
    }

    struct CountError;

    impl fmt::Display for CountError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "count error")
        }
    }

    impl<'a> Sensor for Counter<'a> {
        type Reading = u32;
        type Error = CountError;

        fn name(&self) -> &'static str {
            "counter"
        }

        fn sample(&mut self) -> Result<u32, CountError> {
            self.count += 1;
            if self.count >= self.stop_after {
                self.running.store(false, Ordering::SeqCst);
            }
            if self.count == self.fail_on {
                return Err(CountError)
            }
            Ok(self.count)
        }
    }

    #[test]
    fn test_loop_runs_until_stopped() {
        let running = AtomicBool::new(true);
        let mut counter = Counter {
            count: 0,
            fail_on: 2,
            stop_after: 4,
            running: &running
        };

        let cycles = run_loop(&mut counter, Duration::from_millis(1), &running);

        // A failed cycle doesn't end the loop
        assert_eq!(cycles, 4);
        assert_eq!(counter.count, 4);
    }

    #[test]
    fn test_loop_not_started_when_stopped() {
        let running = AtomicBool::new(false);
        let flag = AtomicBool::new(true);
        let mut counter = Counter {
            count: 0,
            fail_on: 0,
            stop_after: 100,
            running: &flag
        };

        assert_eq!(run_loop(&mut counter, Duration::from_millis(1), &running), 0);
    }
}
