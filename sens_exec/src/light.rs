//! # LDR Light Sensor
//!
//! The LDR is wired in series with a capacitor on a single GPIO pin. Driving the pin low empties
//! the capacitor; once the pin is released the capacitor charges through the LDR and the pin
//! reads high after a time which shrinks as the light grows. The number of polls spent low is used
//! as a relative measure of darkness. It is not calibrated to lux.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{fmt, thread, time::Duration};
use rppal::gpio::{IoPin, Mode};
use util::poll::wait_for;

use crate::Sensor;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A pin which can be switched between driving low and floating as an input.
pub trait RcPin {
    /// Switch to output and drive low, discharging the capacitor.
    fn discharge(&mut self);

    /// Switch to input so the capacitor can charge.
    fn release(&mut self);

    fn is_low(&self) -> bool;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An LDR/capacitor pair on one pin.
pub struct Ldr<P> {
    pin: P,

    /// How long the capacitor is held discharged
    discharge_time: Duration,

    /// Maximum time to wait for the capacitor to charge
    charge_timeout: Duration,
}

/// Number of polls spent waiting for the capacitor to charge. Higher is darker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeCount(pub u64);

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum LightError {
    #[error("Capacitor did not charge within the timeout ({0} polls), is it too dark or unplugged?")]
    ChargeTimeout(u64)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<P: RcPin> Ldr<P> {
    pub fn new(pin: P, discharge_time: Duration, charge_timeout: Duration) -> Self {
        Self {
            pin,
            discharge_time,
            charge_timeout
        }
    }

    /// Discharge the capacitor and count the polls until the pin reads high.
    pub fn rc_time(&mut self) -> Result<ChargeCount, LightError> {
        self.pin.discharge();
        thread::sleep(self.discharge_time);
        self.pin.release();

        let pin = &self.pin;
        let mut count = 0;
        let charged = wait_for(self.charge_timeout, Duration::from_secs(0), || {
            if pin.is_low() {
                count += 1;
                false
            }
            else {
                true
            }
        });

        match charged {
            true => Ok(ChargeCount(count)),
            false => Err(LightError::ChargeTimeout(count))
        }
    }
}

impl<P: RcPin> Sensor for Ldr<P> {
    type Reading = ChargeCount;
    type Error = LightError;

    fn name(&self) -> &'static str {
        "LDR"
    }

    fn sample(&mut self) -> Result<ChargeCount, LightError> {
        self.rc_time()
    }
}

impl RcPin for IoPin {
    fn discharge(&mut self) {
        self.set_mode(Mode::Output);
        self.set_low();
    }

    fn release(&mut self) {
        self.set_mode(Mode::Input);
    }

    fn is_low(&self) -> bool {
        IoPin::is_low(self)
    }
}

impl fmt::Display for ChargeCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Light (RC charge count): {}", self.0)
    }
}
