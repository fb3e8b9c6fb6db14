//! # Servo Controller Module
//!
//! This module provides the servo control interface used by the servo executable. Every channel
//! talks to the hardware through a [`ServoTransport`], which is shared between all channels of a
//! board behind a single lock.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Per channel control: unit conversion, enable/disable, motion and completion polling.
pub mod channel;

/// Loading of the channel configuration from the Maestro settings and limits XML files.
pub mod config;

/// [`ServoTransport`] implementation for the Pololu Maestro USB servo controllers.
pub mod maestro;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex};

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use channel::{ChannelError, Motion, ServoChannel, MotionTiming};
pub use config::{ChannelConfig, ConfigError};
pub use maestro::{Maestro, MaestroError};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// A transport shared by all the channels of one board.
///
/// Hold the lock for one logical operation (for example set acceleration, set speed, set target)
/// and never across a sleep.
pub type SharedTransport<T> = Arc<Mutex<T>>;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for accessing servo driver boards.
///
/// Positions are in the board's target units, quarter-microseconds for the Maestro.
pub trait ServoTransport: Send {

    /// Set the target of a channel.
    ///
    /// The target is clamped into the range installed with [`ServoTransport::set_range`], the
    /// return value is `false` if clamping happened. A target of 0 switches the channel's pulses
    /// off and is never clamped.
    fn set_target(&mut self, channel: u8, target: u16) -> Result<bool, MaestroError>;

    /// Set the speed limit of a channel, 0 is unlimited.
    fn set_speed(&mut self, channel: u8, speed: u16) -> Result<(), MaestroError>;

    /// Set the acceleration limit of a channel, 0 is unlimited.
    fn set_accel(&mut self, channel: u8, accel: u16) -> Result<(), MaestroError>;

    /// Get the current position of a channel.
    fn get_position(&mut self, channel: u8) -> Result<u16, MaestroError>;

    /// Whether a channel is still moving towards its target.
    fn is_moving(&mut self, channel: u8) -> Result<bool, MaestroError>;

    /// Whether any channel on the board is moving.
    fn get_moving_state(&mut self) -> Result<bool, MaestroError>;

    /// Read and clear the board's error register.
    fn get_errors(&mut self) -> Result<u16, MaestroError>;

    /// Install the range targets are clamped into for a channel.
    fn set_range(&mut self, channel: u8, min: u16, max: u16);
}

/// Create a [`SharedTransport`].
pub fn share<T: ServoTransport>(transport: T) -> SharedTransport<T> {
    Arc::new(Mutex::new(transport))
}
