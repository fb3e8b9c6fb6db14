//! Shared fixtures for the servo integration tests.

#![allow(dead_code)]

use std::time::Duration;
use servo_lib::servo_ctrl::{
    self, ChannelConfig, MaestroError, MotionTiming, ServoChannel, ServoTransport, SharedTransport
};

/// A transport call, in the order they were made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Accel(u8, u16),
    Speed(u8, u16),
    Target(u8, u16),
    Position(u8),
    IsMoving(u8),
    MovingState,
    Errors,
}

/// Transport which records every call and reports the servo at its target once a number of
/// "is moving" queries have been made.
#[derive(Default)]
pub struct MockTransport {
    pub calls: Vec<Call>,
    pub ranges: Vec<(u8, u16, u16)>,
    pub targets: [u16; 24],

    /// "Is moving" queries answered with `true` after each new target
    pub moving_polls: usize,
    remaining_moving_polls: usize,

    /// Answer every query with `true`
    pub always_moving: bool,

    /// Fail every read
    pub unplugged: bool,
}

impl MockTransport {
    pub fn new(moving_polls: usize) -> Self {
        Self {
            moving_polls,
            ..Default::default()
        }
    }

    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    /// Calls which change the servo's motion.
    pub fn motion_calls(&self) -> Vec<Call> {
        self.calls.iter()
            .copied()
            .filter(|c| matches!(c, Call::Accel(..) | Call::Speed(..) | Call::Target(..)))
            .collect()
    }

    fn read(&self) -> Result<(), MaestroError> {
        match self.unplugged {
            true => Err(MaestroError::ShortRead { expected: 2, got: 0 }),
            false => Ok(())
        }
    }
}

impl ServoTransport for MockTransport {
    fn set_target(&mut self, channel: u8, target: u16) -> Result<bool, MaestroError> {
        self.calls.push(Call::Target(channel, target));

        let mut clamped = target;
        if target != 0 {
            if let Some(&(_, min, max)) = self.ranges.iter().rev().find(|r| r.0 == channel) {
                clamped = target.max(min).min(max);
            }
        }

        self.targets[channel as usize] = clamped;
        self.remaining_moving_polls = self.moving_polls;

        Ok(clamped == target)
    }

    fn set_speed(&mut self, channel: u8, speed: u16) -> Result<(), MaestroError> {
        self.calls.push(Call::Speed(channel, speed));
        Ok(())
    }

    fn set_accel(&mut self, channel: u8, accel: u16) -> Result<(), MaestroError> {
        self.calls.push(Call::Accel(channel, accel));
        Ok(())
    }

    fn get_position(&mut self, channel: u8) -> Result<u16, MaestroError> {
        self.calls.push(Call::Position(channel));
        self.read()?;
        Ok(self.targets[channel as usize])
    }

    fn is_moving(&mut self, channel: u8) -> Result<bool, MaestroError> {
        self.calls.push(Call::IsMoving(channel));
        self.read()?;

        if self.always_moving {
            return Ok(true)
        }
        if self.remaining_moving_polls > 0 {
            self.remaining_moving_polls -= 1;
            return Ok(true)
        }
        Ok(false)
    }

    fn get_moving_state(&mut self) -> Result<bool, MaestroError> {
        self.calls.push(Call::MovingState);
        self.read()?;
        Ok(false)
    }

    fn get_errors(&mut self) -> Result<u16, MaestroError> {
        self.calls.push(Call::Errors);
        self.read()?;
        Ok(0)
    }

    fn set_range(&mut self, channel: u8, min: u16, max: u16) {
        self.ranges.push((channel, min, max));
    }
}

/// The channel used throughout: home 6000, travel 2432-8832 over 180 degrees.
pub fn head_config() -> ChannelConfig {
    ChannelConfig {
        id: "head".into(),
        channel: 0,
        home_us: 6000,
        min_possible_us: 2432,
        max_possible_us: 8832,
        user_min_rad: -0.7,
        user_max_rad: 0.7,
        range_deg: 180.0,
        default_velocity: 20.0,
        default_acceleration: 0,
        vel_min: 5,
        vel_max: 150,
    }
}

pub fn fast_timing() -> MotionTiming {
    MotionTiming {
        poll_interval: Duration::from_millis(1),
        motion_timeout: Duration::from_millis(200),
    }
}

pub fn head_channel(
    transport: MockTransport
) -> (ServoChannel<MockTransport>, SharedTransport<MockTransport>) {
    let transport = servo_ctrl::share(transport);
    let channel = ServoChannel::new(head_config(), transport.clone(), fast_timing()).unwrap();

    (channel, transport)
}
