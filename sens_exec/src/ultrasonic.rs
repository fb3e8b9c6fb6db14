//! # HC-SR04 Ultrasonic Distance Sensor
//!
//! A 10 µs pulse on the trigger pin starts a measurement. The sensor then raises the echo pin for
//! as long as the sound took to travel to the obstacle and back.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    convert::Infallible,
    fmt,
    thread,
    time::{Duration, Instant}
};
use embedded_hal::digital::v2::{InputPin, OutputPin};
use util::poll::wait_for;

use crate::Sensor;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Speed of sound in air at roughly 20 °C.
///
/// Units: centimeters/second
pub const SPEED_OF_SOUND_CM_S: f64 = 34_300.0;

/// Length of the trigger pulse.
const TRIGGER_PULSE: Duration = Duration::from_micros(10);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An HC-SR04 on two GPIO pins.
pub struct HcSr04<T, E> {
    trigger: T,
    echo: E,

    /// Maximum time to wait for each edge of the echo pulse
    echo_timeout: Duration,

    /// Valid measurement range.
    ///
    /// Units: centimeters
    range_cm: (f64, f64),
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Result of a distance measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distance {
    /// Units: centimeters
    InRange(f64),

    /// The measured distance is outside of what the sensor can reliably see.
    ///
    /// Units: centimeters
    OutOfRange(f64)
}

/// Which edge of the echo pulse never came.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoEdge {
    Rising,
    Falling
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum UltrasonicError {
    #[error("Timed out waiting for the {0:?} edge of the echo, is the sensor connected?")]
    EchoTimeout(EchoEdge)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T, E> HcSr04<T, E>
where
    T: OutputPin<Error = Infallible>,
    E: InputPin<Error = Infallible>
{
    /// Create the sensor, driving the trigger low.
    pub fn new(mut trigger: T, echo: E, echo_timeout: Duration, range_cm: (f64, f64)) -> Self {
        trigger.set_low().ok();

        Self {
            trigger,
            echo,
            echo_timeout,
            range_cm
        }
    }

    /// Trigger a measurement and time the echo pulse.
    pub fn measure_echo(&mut self) -> Result<Duration, UltrasonicError> {
        self.trigger.set_high().ok();
        thread::sleep(TRIGGER_PULSE);
        self.trigger.set_low().ok();

        let echo = &self.echo;

        // The start is the last instant the echo was seen low, the end the last instant it was
        // seen high
        let mut start = Instant::now();
        let rose = wait_for(self.echo_timeout, Duration::from_secs(0), || {
            if echo.is_low().unwrap_or(true) {
                start = Instant::now();
                false
            }
            else {
                true
            }
        });
        if !rose {
            return Err(UltrasonicError::EchoTimeout(EchoEdge::Rising))
        }

        let mut finish = start;
        let fell = wait_for(self.echo_timeout, Duration::from_secs(0), || {
            if echo.is_high().unwrap_or(false) {
                finish = Instant::now();
                false
            }
            else {
                true
            }
        });
        if !fell {
            return Err(UltrasonicError::EchoTimeout(EchoEdge::Falling))
        }

        Ok(finish.saturating_duration_since(start))
    }
}

impl<T, E> Sensor for HcSr04<T, E>
where
    T: OutputPin<Error = Infallible>,
    E: InputPin<Error = Infallible>
{
    type Reading = Distance;
    type Error = UltrasonicError;

    fn name(&self) -> &'static str {
        "HC-SR04"
    }

    fn sample(&mut self) -> Result<Distance, UltrasonicError> {
        let echo = self.measure_echo()?;

        Ok(classify(echo_to_distance_cm(echo), self.range_cm))
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distance::InRange(d) => write!(f, "The distance is: {:.2} cm", d),
            Distance::OutOfRange(_) => write!(f, "Distance is not in the permitted range")
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert the echo pulse length into the distance to the obstacle.
pub fn echo_to_distance_cm(echo: Duration) -> f64 {
    echo.as_secs_f64() * SPEED_OF_SOUND_CM_S / 2.0
}

/// Check a distance against the valid range.
///
/// The upper bound is compared against the distance rounded to the nearest centimeter, so 300.4
/// is still in range for an upper bound of 300.
pub fn classify(distance_cm: f64, range_cm: (f64, f64)) -> Distance {
    if distance_cm < range_cm.0 || distance_cm.round() > range_cm.1 {
        Distance::OutOfRange(distance_cm)
    }
    else {
        Distance::InRange(distance_cm)
    }
}
