//! # Sensor library.
//!
//! Drivers for the single-board computer's GPIO sensors and actuators, and the polling loop that
//! the `sens_exec` executable runs them in.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// ADS1015/ADS1115 analog to digital converter on I2C
pub mod adc;

/// LDR light sensor read through RC charge timing
pub mod light;

/// Parameters for the sensor executable
pub mod params;

/// Relay toggling
pub mod relay;

/// The `Sensor` trait and the loop which polls it
pub mod sensor;

/// DS18B20 temperature sensor on the 1-Wire bus
pub mod temperature;

/// HC-SR04 ultrasonic distance sensor
pub mod ultrasonic;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use sensor::{Sensor, run_loop};
