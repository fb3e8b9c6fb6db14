//! # Pololu Maestro Driver
//!
//! Drives a Micro/Mini Maestro over its USB virtual serial port using the Pololu protocol, where
//! every command is framed as
//!
//! ```text
//! 0xAA, device number, command & 0x7F, data...
//! ```
//!
//! so that several boards can share one serial line. Positions and targets are in
//! quarter-microseconds, 6000 being a 1.5 ms pulse.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;
use log::debug;
use rppal::uart::{Parity, Uart};

use super::ServoTransport;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default device number of a Maestro.
pub const DEFAULT_DEVICE_NUMBER: u8 = 0x0C;

/// Largest number of channels on a Maestro (Mini Maestro 24).
pub const MAX_CHANNELS: usize = 24;

/// Maximum time to wait for a reply from the board.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

const POLOLU_PROTOCOL_START: u8 = 0xAA;

const CMD_SET_TARGET: u8 = 0x84;
const CMD_SET_SPEED: u8 = 0x87;
const CMD_SET_ACCEL: u8 = 0x89;
const CMD_GET_POSITION: u8 = 0x90;
const CMD_GET_MOVING_STATE: u8 = 0x93;
const CMD_GET_ERRORS: u8 = 0xA1;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A byte link to the board.
pub trait SerialLink: Send {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), MaestroError>;

    /// Fill `buf` or fail with [`MaestroError::ShortRead`].
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), MaestroError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A Maestro servo controller.
pub struct Maestro<S> {
    link: S,

    /// Pololu protocol device number of the board
    device: u8,

    /// Last target sent to each channel, 0 if none
    targets: [u16; MAX_CHANNELS],

    /// Software range of each channel, 0 disables the bound
    mins: [u16; MAX_CHANNELS],
    maxs: [u16; MAX_CHANNELS],
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum MaestroError {
    #[error("Serial port error: {0}")]
    Uart(#[from] rppal::uart::Error),

    #[error("The serial port accepted no bytes")]
    WriteStalled,

    #[error("Expected {expected} bytes from the board, got {got}")]
    ShortRead {
        expected: usize,
        got: usize
    },

    #[error("Channel {0} does not exist")]
    InvalidChannel(u8),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Maestro<Uart> {
    /// Open the board on a serial port, for instance `/dev/ttyACM0`.
    pub fn open(port: &str, baud_rate: u32, device: u8) -> Result<Self, MaestroError> {
        let mut uart = Uart::with_path(port, baud_rate, Parity::None, 8, 1)?;
        uart.set_write_mode(true)?;

        debug!("Opened Maestro 0x{:02X} on {} at {} baud", device, port, baud_rate);

        Ok(Self::new(uart, device))
    }
}

impl<S: SerialLink> Maestro<S> {
    /// Use an already open link.
    pub fn new(link: S, device: u8) -> Self {
        Self {
            link,
            device,
            targets: [0; MAX_CHANNELS],
            mins: [0; MAX_CHANNELS],
            maxs: [0; MAX_CHANNELS],
        }
    }

    /// The last target sent to a channel.
    pub fn target(&self, channel: u8) -> Option<u16> {
        self.targets.get(channel as usize).copied()
    }

    /// Send a command with its data bytes.
    fn send(&mut self, cmd: u8, data: &[u8]) -> Result<(), MaestroError> {
        let mut frame = Vec::with_capacity(3 + data.len());
        frame.push(POLOLU_PROTOCOL_START);
        frame.push(self.device);
        frame.push(cmd & 0x7F);
        frame.extend_from_slice(data);

        self.link.write_all(&frame)
    }

    /// Read a little endian 16 bit reply.
    fn read_u16(&mut self) -> Result<u16, MaestroError> {
        let mut buf = [0u8; 2];
        self.link.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Send a command taking a channel and a 14 bit value, low 7 bits first.
    fn send_channel_value(&mut self, cmd: u8, channel: u8, value: u16) -> Result<(), MaestroError> {
        let index = check_channel(channel)?;
        self.send(cmd, &[index as u8, (value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8])
    }
}

impl<S: SerialLink> ServoTransport for Maestro<S> {
    fn set_target(&mut self, channel: u8, target: u16) -> Result<bool, MaestroError> {
        let index = check_channel(channel)?;
        let (min, max) = (self.mins[index], self.maxs[index]);

        let mut clamped = target;
        if target != 0 {
            if min > 0 && target < min {
                clamped = min;
            }
            if max > 0 && target > max {
                clamped = max;
            }
        }

        self.send_channel_value(CMD_SET_TARGET, channel, clamped)?;
        self.targets[index] = clamped;

        Ok(clamped == target)
    }

    fn set_speed(&mut self, channel: u8, speed: u16) -> Result<(), MaestroError> {
        self.send_channel_value(CMD_SET_SPEED, channel, speed)
    }

    fn set_accel(&mut self, channel: u8, accel: u16) -> Result<(), MaestroError> {
        self.send_channel_value(CMD_SET_ACCEL, channel, accel)
    }

    fn get_position(&mut self, channel: u8) -> Result<u16, MaestroError> {
        let index = check_channel(channel)?;
        self.send(CMD_GET_POSITION, &[index as u8])?;
        self.read_u16()
    }

    /// A channel which has never been given a target, or which is off, is not moving.
    fn is_moving(&mut self, channel: u8) -> Result<bool, MaestroError> {
        let index = check_channel(channel)?;
        let target = self.targets[index];

        if target == 0 {
            return Ok(false)
        }

        Ok(self.get_position(channel)? != target)
    }

    fn get_moving_state(&mut self) -> Result<bool, MaestroError> {
        self.send(CMD_GET_MOVING_STATE, &[])?;

        let mut buf = [0u8; 1];
        self.link.read_exact(&mut buf)?;

        Ok(buf[0] != 0)
    }

    fn get_errors(&mut self) -> Result<u16, MaestroError> {
        self.send(CMD_GET_ERRORS, &[])?;
        self.read_u16()
    }

    fn set_range(&mut self, channel: u8, min: u16, max: u16) {
        if let Some(m) = self.mins.get_mut(channel as usize) {
            *m = min;
        }
        if let Some(m) = self.maxs.get_mut(channel as usize) {
            *m = max;
        }
    }
}

impl SerialLink for Uart {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), MaestroError> {
        let mut written = 0;

        while written < bytes.len() {
            match self.write(&bytes[written..])? {
                0 => return Err(MaestroError::WriteStalled),
                n => written += n
            }
        }

        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), MaestroError> {
        self.set_read_mode(buf.len() as u8, READ_TIMEOUT)?;

        let got = self.read(buf)?;
        if got < buf.len() {
            return Err(MaestroError::ShortRead { expected: buf.len(), got })
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn check_channel(channel: u8) -> Result<usize, MaestroError> {
    match (channel as usize) < MAX_CHANNELS {
        true => Ok(channel as usize),
        false => Err(MaestroError::InvalidChannel(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct MockLink {
        written: Vec<Vec<u8>>,
        replies: VecDeque<u8>
    }

    impl SerialLink for MockLink {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), MaestroError> {
            self.written.push(bytes.to_vec());
            Ok(())
        }

        fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), MaestroError> {
            let expected = buf.len();
            for (got, b) in buf.iter_mut().enumerate() {
                *b = self.replies.pop_front()
                    .ok_or(MaestroError::ShortRead { expected, got })?;
            }
            Ok(())
        }
    }

    fn maestro(replies: &[u8]) -> Maestro<MockLink> {
        Maestro::new(
            MockLink { written: Vec::new(), replies: replies.iter().copied().collect() },
            DEFAULT_DEVICE_NUMBER
        )
    }

    #[test]
    fn test_set_target_frame() {
        let mut m = maestro(&[]);

        // 6000 = 0b101110_1110000
        assert!(m.set_target(2, 6000).unwrap());
        assert_eq!(m.link.written[0], vec![0xAA, 0x0C, 0x04, 2, 0x70, 0x2E]);
        assert_eq!(m.target(2), Some(6000));
    }

    #[test]
    fn test_speed_accel_frames() {
        let mut m = maestro(&[]);
        m.set_speed(0, 140).unwrap();
        m.set_accel(5, 10).unwrap();

        assert_eq!(m.link.written[0], vec![0xAA, 0x0C, 0x07, 0, 0x0C, 0x01]);
        assert_eq!(m.link.written[1], vec![0xAA, 0x0C, 0x09, 5, 10, 0]);
    }

    #[test]
    fn test_range_clamping() {
        let mut m = maestro(&[]);
        m.set_range(1, 4000, 8000);

        assert!(!m.set_target(1, 3000).unwrap());
        assert_eq!(m.target(1), Some(4000));

        assert!(!m.set_target(1, 9000).unwrap());
        assert_eq!(m.target(1), Some(8000));

        assert!(m.set_target(1, 5000).unwrap());

        // Off is never clamped
        assert!(m.set_target(1, 0).unwrap());
        assert_eq!(m.target(1), Some(0));
    }

    #[test]
    fn test_get_position() {
        let mut m = maestro(&[0x70, 0x17]);
        assert_eq!(m.get_position(3).unwrap(), 6000);
        assert_eq!(m.link.written[0], vec![0xAA, 0x0C, 0x10, 3]);
    }

    #[test]
    fn test_is_moving() {
        // Position reads 5000 then 6000
        let mut m = maestro(&[0x88, 0x13, 0x70, 0x17]);

        // Never targeted
        assert!(!m.is_moving(0).unwrap());
        assert!(m.link.written.is_empty());

        m.set_target(0, 6000).unwrap();
        assert!(m.is_moving(0).unwrap());
        assert!(!m.is_moving(0).unwrap());
    }

    #[test]
    fn test_errors_and_moving_state() {
        let mut m = maestro(&[0x40, 0x00, 0x01]);
        assert_eq!(m.get_errors().unwrap(), 0x0040);
        assert!(m.get_moving_state().unwrap());
        assert_eq!(m.link.written[0], vec![0xAA, 0x0C, 0x21]);
        assert_eq!(m.link.written[1], vec![0xAA, 0x0C, 0x13]);
    }

    #[test]
    fn test_no_reply() {
        let mut m = maestro(&[0x01]);
        assert!(matches!(
            m.get_errors(),
            Err(MaestroError::ShortRead { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn test_invalid_channel() {
        let mut m = maestro(&[]);
        assert!(matches!(m.set_target(24, 6000), Err(MaestroError::InvalidChannel(24))));
    }
}
