//! Bounded polling
//!
//! Every wait on hardware in the software goes through [`poll_until`] so that a disconnected
//! device shows up as a timeout rather than a hang.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{thread, time::{Duration, Instant}};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The way a poll finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition was met.
    Complete,

    /// The timeout elapsed before the condition was met.
    TimedOut,

    /// Something newer took over the wait, the condition is no longer of interest.
    Superseded,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Poll `is_complete` every `interval` until it returns `true`, `timeout` elapses, or
/// `is_superseded` returns `true`.
///
/// The condition is always checked at least once, and `is_superseded` is checked after every
/// sleep and before reporting completion, so a superseded wait never reports `Complete`.
///
/// An `interval` of zero spins without sleeping, which is what edge timing on a GPIO pin needs.
///
/// Errors from `is_complete` end the poll immediately.
pub fn poll_until<E, C, S>(
    timeout: Duration,
    interval: Duration,
    mut is_complete: C,
    mut is_superseded: S
) -> Result<PollOutcome, E>
where
    C: FnMut() -> Result<bool, E>,
    S: FnMut() -> bool
{
    let start = Instant::now();

    loop {
        if is_complete()? {
            if is_superseded() {
                return Ok(PollOutcome::Superseded)
            }
            return Ok(PollOutcome::Complete)
        }

        if start.elapsed() >= timeout {
            return Ok(PollOutcome::TimedOut)
        }

        if interval > Duration::from_secs(0) {
            thread::sleep(interval);
        }

        if is_superseded() {
            return Ok(PollOutcome::Superseded)
        }
    }
}

/// Poll an infallible condition with no supersession.
///
/// Returns `true` if the condition was met before the timeout.
pub fn wait_for<C>(timeout: Duration, interval: Duration, mut condition: C) -> bool
where
    C: FnMut() -> bool
{
    let outcome: Result<PollOutcome, std::convert::Infallible> = poll_until(
        timeout,
        interval,
        || Ok(condition()),
        || false
    );

    matches!(outcome, Ok(PollOutcome::Complete))
}
