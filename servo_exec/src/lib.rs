//! # Servo library.
//!
//! Control of the servos attached to a Pololu Maestro, and the request handling of the servo
//! node which exposes them over the network.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Request dispatch to the channels and motion completion events
pub mod node;

/// Parameters for the servo executable
pub mod params;

/// Servo driver and channel control
pub mod servo_ctrl;
