//! # Servo Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;
use std::time::Duration;
use util::time::seconds_to_std;

use crate::servo_ctrl::MotionTiming;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct ServoExecParams {

    /// Serial port of the Maestro, for instance `/dev/ttyACM0`
    pub port: String,

    pub baud_rate: u32,

    /// Pololu protocol device number as a hex string, the factory default is `"0x0C"`
    pub device_number: String,

    /// Maestro Control Center settings export, relative to the params directory
    pub settings_file: String,

    /// Per channel user limits, relative to the params directory
    pub limits_file: String,

    /// Endpoint for the requests (REP) socket
    pub requests_endpoint: String,

    /// Endpoint for the publications (PUB) socket
    pub publish_endpoint: String,

    /// Maximum time the main loop blocks waiting for a request.
    ///
    /// Units: milliseconds
    pub request_timeout_ms: i32,

    /// Time between motion completion queries.
    ///
    /// Units: seconds
    pub poll_interval_s: f64,

    /// Time after which a motion still in progress is reported as not completed.
    ///
    /// Units: seconds
    pub motion_timeout_s: f64,

    /// Rate at which channel states are published.
    ///
    /// Units: Hertz
    pub state_rate_hz: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParamsError {
    #[error("Device number {0:?} is not a hex byte such as \"0x0C\"")]
    InvalidDeviceNumber(String),

    #[error("The state rate must be positive, got {0} Hz")]
    InvalidStateRate(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ServoExecParams {
    /// Parse the device number, with or without a `0x` prefix.
    pub fn device_number(&self) -> Result<u8, ParamsError> {
        let s = self.device_number.trim();
        let digits = s.strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        u8::from_str_radix(digits, 16)
            .map_err(|_| ParamsError::InvalidDeviceNumber(self.device_number.clone()))
    }

    pub fn motion_timing(&self) -> MotionTiming {
        MotionTiming {
            poll_interval: seconds_to_std(self.poll_interval_s),
            motion_timeout: seconds_to_std(self.motion_timeout_s),
        }
    }

    /// Period between two state publications.
    pub fn state_period(&self) -> Result<Duration, ParamsError> {
        match self.state_rate_hz > 0.0 && self.state_rate_hz.is_finite() {
            true => Ok(seconds_to_std(1.0 / self.state_rate_hz)),
            false => Err(ParamsError::InvalidStateRate(self.state_rate_hz))
        }
    }
}
