//! # Relay Module
//!
//! Toggles a relay module (KY-019 style) between its normally open and normally closed contacts
//! once per cycle. There is no feedback from the relay.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{convert::Infallible, fmt};
use embedded_hal::digital::v2::OutputPin;

use crate::Sensor;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Relay<P> {
    pin: P,
    state: RelayState
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Coil energised, NO contact connected
    On,

    /// Coil off, NC contact connected
    Off
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<P: OutputPin<Error = Infallible>> Relay<P> {
    /// Create the relay, switched off.
    pub fn new(pin: P) -> Self {
        let mut relay = Self {
            pin,
            state: RelayState::Off
        };
        relay.set(RelayState::Off);

        relay
    }

    pub fn set(&mut self, state: RelayState) {
        match state {
            RelayState::On => self.pin.set_high().ok(),
            RelayState::Off => self.pin.set_low().ok()
        };
        self.state = state;
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Switch the relay off and give back the pin.
    pub fn release(mut self) -> P {
        self.set(RelayState::Off);
        self.pin
    }
}

impl<P: OutputPin<Error = Infallible>> Sensor for Relay<P> {
    type Reading = RelayState;
    type Error = Infallible;

    fn name(&self) -> &'static str {
        "relay"
    }

    /// Flip the relay.
    fn sample(&mut self) -> Result<RelayState, Infallible> {
        let next = match self.state {
            RelayState::On => RelayState::Off,
            RelayState::Off => RelayState::On
        };
        self.set(next);

        Ok(next)
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayState::On => write!(f, "Relay on, NO connected"),
            RelayState::Off => write!(f, "Relay off, NC connected")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockPin {
        high: bool,
        writes: u32
    }

    impl OutputPin for MockPin {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            self.writes += 1;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_starts_off() {
        let relay = Relay::new(MockPin { high: true, writes: 0 });
        assert_eq!(relay.state(), RelayState::Off);
        assert!(!relay.pin.high);
    }

    #[test]
    fn test_toggles() {
        let mut relay = Relay::new(MockPin::default());
        assert_eq!(relay.sample(), Ok(RelayState::On));
        assert!(relay.pin.high);
        assert_eq!(relay.sample(), Ok(RelayState::Off));
        assert!(!relay.pin.high);
        assert_eq!(relay.sample(), Ok(RelayState::On));
    }

    #[test]
    fn test_release_switches_off() {
        let mut relay = Relay::new(MockPin::default());
        relay.sample().ok();

        let pin = relay.release();
        assert!(!pin.high);
        assert_eq!(pin.writes, 3);
    }
}
