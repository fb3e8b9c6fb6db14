//! # Servo Channel
//!
//! A [`ServoChannel`] drives one servo through the shared transport. Callers work in radians
//! about the home position and in speed percentages; the channel converts these into the board's
//! pulse widths and speed units.
//!
//! Motions are split in two so that a caller can acknowledge a request before the servo gets
//! there: [`ServoChannel::command`] sends the motion and returns a [`Motion`] token, and
//! [`ServoChannel::wait_motion`] polls the board until the motion ends. Each motion bumps the
//! channel's sequence number, a wait whose sequence number is no longer current is superseded and
//! stops polling. Superseding does not stop the servo, it carries on to the newest target.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
        MutexGuard
    },
    thread,
    time::Duration
};
use comms_if::eqpt::servo::{ChannelPhase, CmdMotor, JointState, ServoStatus, TestStatus};
use log::{debug, info, warn};
use util::{
    maths::{clamp, interp},
    poll::{poll_until, PollOutcome}
};

use super::{ChannelConfig, MaestroError, ServoTransport, SharedTransport};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Acceleration used while calibrating.
const CALIBRATION_ACCEL: u16 = 10;

/// Speed used while calibrating.
///
/// Units: percent
const CALIBRATION_VELOCITY: f64 = 30.0;

/// Largest acceleration the Maestro accepts.
const MAX_ACCEL: f64 = 255.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Timing of the motion completion polling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionTiming {
    /// Time between two "is moving" queries
    pub poll_interval: Duration,

    /// Time after which a motion still in progress is reported as timed out
    pub motion_timeout: Duration,
}

/// A motion sent to the board, to be waited on with [`ServoChannel::wait_motion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Motion {
    seq: u64
}

/// One servo channel.
pub struct ServoChannel<T> {
    config: ChannelConfig,

    transport: SharedTransport<T>,

    timing: MotionTiming,

    /// User range in board units, installed as the transport's range for this channel
    user_min_us: u16,
    user_max_us: u16,

    state: Mutex<ChannelState>,

    /// Sequence number of the latest motion. Only changed with `state` locked.
    seq: AtomicU64,
}

#[derive(Debug)]
struct ChannelState {
    phase: ChannelPhase,

    /// Units: radians
    last_goal_rad: f64,

    /// Last speed sent to the board, in board units
    last_velocity: u16,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    #[error("The channel is disabled")]
    Disabled,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Controller error: {0}")]
    Transport(#[from] MaestroError),

    #[error("A thread panicked while holding the {0} lock")]
    LockPoisoned(&'static str),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: ServoTransport> ServoChannel<T> {
    /// Create the channel and install its user range on the transport.
    ///
    /// The channel starts enabled, at whatever position the board is in.
    pub fn new(
        config: ChannelConfig,
        transport: SharedTransport<T>,
        timing: MotionTiming
    ) -> Result<Self, ChannelError> {
        let user_min_us = angle_to_pulse(&config, config.user_min_rad);
        let user_max_us = angle_to_pulse(&config, config.user_max_rad);

        let channel = Self {
            config,
            transport,
            timing,
            user_min_us,
            user_max_us,
            state: Mutex::new(ChannelState {
                phase: ChannelPhase::Enabled,
                last_goal_rad: 0.0,
                last_velocity: 0,
            }),
            seq: AtomicU64::new(0),
        };

        channel.lock_transport()?
            .set_range(channel.config.channel, user_min_us, user_max_us);

        channel.log_limits();

        Ok(channel)
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// The user range in board units.
    pub fn user_range_us(&self) -> (u16, u16) {
        (self.user_min_us, self.user_max_us)
    }

    pub fn phase(&self) -> Result<ChannelPhase, ChannelError> {
        Ok(self.lock_state()?.phase)
    }

    /// Sequence number of the latest motion.
    pub fn sequence(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Send the channel home with the neutral speed and acceleration, and accept motions again.
    pub fn enable(&self) -> Result<TestStatus, ChannelError> {
        let home = self.config.home_us;
        let speed = normalize_vel(&self.config, 0.0);

        {
            let mut transport = self.lock_transport()?;
            transport.set_accel(self.config.channel, 0)?;
            transport.set_speed(self.config.channel, speed)?;
            transport.set_target(self.config.channel, home)?;
        }

        self.start(ChannelPhase::Enabled, home, speed)?;

        info!("{} enabled", self.config.id);

        Ok(TestStatus {
            success: true,
            message: format!("Motor enabled and sent to {}", home)
        })
    }

    /// Stop the channel's pulses. Motions are rejected until the channel is enabled.
    pub fn disable(&self) -> Result<TestStatus, ChannelError> {
        self.lock_transport()?.set_target(self.config.channel, 0)?;

        {
            let mut state = self.lock_state()?;
            state.phase = ChannelPhase::Disabled;
            self.seq.fetch_add(1, Ordering::SeqCst);
        }

        info!("{} disabled", self.config.id);

        Ok(TestStatus {
            success: true,
            message: "Motor disabled".into()
        })
    }

    /// Send a motion to the board.
    ///
    /// A velocity of 0 selects the channel's default speed, an acceleration of 0 its default
    /// acceleration. Positions outside the user range are sent to the nearest user limit.
    pub fn command(&self, cmd: &CmdMotor) -> Result<Motion, ChannelError> {
        debug!(
            "{} (channel {}): position {}, velocity {}, acceleration {}",
            self.config.id, self.config.channel, cmd.position, cmd.velocity, cmd.acceleration
        );

        if !cmd.position.is_finite() || !cmd.velocity.is_finite() || !cmd.acceleration.is_finite() {
            return Err(ChannelError::InvalidCommand(format!("{:?} is not finite", cmd)))
        }

        let accel = match cmd.acceleration {
            a if a == 0.0 => self.config.default_acceleration,
            a => clamp(&a, &0.0, &MAX_ACCEL) as u16
        };
        let speed = match cmd.velocity {
            v if v == 0.0 => normalize_vel(&self.config, self.config.default_velocity),
            v => normalize_vel(&self.config, v)
        };

        self.move_to(angle_to_pulse(&self.config, cmd.position), speed, accel)
    }

    /// Send the channel home with the neutral speed and acceleration.
    pub fn default_position(&self) -> Result<Motion, ChannelError> {
        debug!("Sending {} home", self.config.id);

        self.move_to(self.config.home_us, normalize_vel(&self.config, 0.0), 0)
    }

    /// Wait for a motion to end.
    ///
    /// Returns `Complete` if the servo stopped moving, `Superseded` as soon as a newer motion (or
    /// an enable, disable or calibration) was started, and `TimedOut` if the servo was still
    /// moving after the motion timeout. The channel phase is only updated by the latest motion.
    pub fn wait_motion(&self, motion: Motion) -> Result<PollOutcome, ChannelError> {
        thread::sleep(self.timing.poll_interval * 2);

        let channel = self.config.channel;
        let outcome = poll_until(
            self.timing.motion_timeout,
            self.timing.poll_interval,
            || -> Result<bool, ChannelError> {
                Ok(!self.lock_transport()?.is_moving(channel)?)
            },
            || self.seq.load(Ordering::SeqCst) != motion.seq
        )?;

        {
            let mut state = self.lock_state()?;
            if self.seq.load(Ordering::SeqCst) == motion.seq {
                match outcome {
                    PollOutcome::Complete => state.phase = ChannelPhase::Arrived,
                    PollOutcome::TimedOut => state.phase = ChannelPhase::TimedOut,
                    PollOutcome::Superseded => ()
                }
            }
        }

        match outcome {
            PollOutcome::Complete => debug!("{} arrived", self.config.id),
            PollOutcome::Superseded => warn!(
                "{}: new command received before the previous movement finished", self.config.id
            ),
            PollOutcome::TimedOut => warn!(
                "{} still moving after {:.1} s",
                self.config.id, self.timing.motion_timeout.as_secs_f64()
            )
        }

        Ok(outcome)
    }

    /// Sweep to the user minimum, the user maximum and back home.
    ///
    /// The transport stays locked for the whole sweep, so every other channel waits for it.
    pub fn calibrate(&self) -> Result<TestStatus, ChannelError> {
        if self.phase()? == ChannelPhase::Disabled {
            return Ok(TestStatus {
                success: false,
                message: "Motor disabled".into()
            })
        }

        let channel = self.config.channel;
        let speed = normalize_vel(&self.config, CALIBRATION_VELOCITY);
        let home = self.config.home_us;
        let mut timed_out = None;

        let motion = {
            let mut transport = self.lock_transport()?;
            transport.set_accel(channel, CALIBRATION_ACCEL)?;
            transport.set_speed(channel, speed)?;

            let motion = self.start(ChannelPhase::Moving, home, speed)?;

            for &target in [self.user_min_us, self.user_max_us, home].iter() {
                transport.set_target(channel, target)?;

                let outcome = poll_until(
                    self.timing.motion_timeout,
                    self.timing.poll_interval,
                    || -> Result<bool, ChannelError> { Ok(!transport.is_moving(channel)?) },
                    || false
                )?;

                if outcome == PollOutcome::TimedOut && timed_out.is_none() {
                    timed_out = Some(target);
                }
            }

            motion
        };

        {
            let mut state = self.lock_state()?;
            if self.seq.load(Ordering::SeqCst) == motion.seq {
                state.phase = match timed_out {
                    None => ChannelPhase::Arrived,
                    Some(_) => ChannelPhase::TimedOut
                };
            }
        }

        debug!(
            "{} calibrated with speed {} and acceleration {}",
            self.config.id, speed, CALIBRATION_ACCEL
        );

        Ok(match timed_out {
            None => TestStatus {
                success: true,
                message: "Checked user limits".into()
            },
            Some(t) => TestStatus {
                success: false,
                message: format!("Timed out moving to {}", t)
            }
        })
    }

    /// Check that the board answers.
    ///
    /// A board which doesn't answer gives an unsuccessful status rather than an error.
    pub fn ping(&self) -> Result<TestStatus, ChannelError> {
        let mut transport = self.lock_transport()?;

        let reply = transport.get_errors()
            .and_then(|errors| Ok((errors, transport.get_moving_state()?)));

        Ok(match reply {
            Ok((errors, moving)) => TestStatus {
                success: true,
                message: format!(
                    "Controller answered, error register 0x{:04X}, servos moving: {}",
                    errors, moving
                )
            },
            Err(e) => TestStatus {
                success: false,
                message: e.to_string()
            }
        })
    }

    pub fn get_status(&self) -> Result<ServoStatus, ChannelError> {
        let (position_us, is_moving) = self.read_position()?;
        let state = self.lock_state()?;

        Ok(ServoStatus {
            id: self.config.id.clone(),
            position_us,
            position_rad: pulse_to_radians(&self.config, position_us as f64),
            velocity: velocity_percent(&self.config, state.last_velocity),
            goal_rad: state.last_goal_rad,
            is_moving,
            phase: state.phase
        })
    }

    /// State of the channel for periodic publication.
    pub fn joint_state(&self) -> Result<JointState, ChannelError> {
        let (position_us, is_moving) = self.read_position()?;
        let state = self.lock_state()?;

        Ok(JointState {
            name: self.config.id.clone(),
            goal_pos: state.last_goal_rad,
            current_pos: pulse_to_radians(&self.config, position_us as f64),
            velocity: velocity_percent(&self.config, state.last_velocity) as i32,
            is_moving
        })
    }

    fn move_to(&self, target: u16, speed: u16, accel: u16) -> Result<Motion, ChannelError> {
        if self.phase()? == ChannelPhase::Disabled {
            warn!("{} is not enabled, ignoring the motion", self.config.id);
            return Err(ChannelError::Disabled)
        }

        let in_range = {
            let mut transport = self.lock_transport()?;
            transport.set_accel(self.config.channel, accel)?;
            transport.set_speed(self.config.channel, speed)?;
            transport.set_target(self.config.channel, target)?
        };

        match in_range {
            true => debug!("{}: target {} inside the user range", self.config.id, target),
            false => warn!(
                "{}: angle outside the user range, going to the user limit", self.config.id
            )
        }

        let goal = clamp(&target, &self.user_min_us, &self.user_max_us);

        self.start(ChannelPhase::Moving, goal, speed)
    }

    /// Record a new goal and bump the sequence number.
    fn start(&self, phase: ChannelPhase, goal_us: u16, speed: u16) -> Result<Motion, ChannelError> {
        let mut state = self.lock_state()?;
        state.phase = phase;
        state.last_goal_rad = pulse_to_radians(&self.config, goal_us as f64);
        state.last_velocity = speed;

        Ok(Motion {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1
        })
    }

    fn read_position(&self) -> Result<(u16, bool), ChannelError> {
        let mut transport = self.lock_transport()?;
        let position = transport.get_position(self.config.channel)?;
        let is_moving = transport.is_moving(self.config.channel)?;

        Ok((position, is_moving))
    }

    fn lock_transport(&self) -> Result<MutexGuard<T>, ChannelError> {
        self.transport.lock().map_err(|_| ChannelError::LockPoisoned("transport"))
    }

    fn lock_state(&self) -> Result<MutexGuard<ChannelState>, ChannelError> {
        self.state.lock().map_err(|_| ChannelError::LockPoisoned("channel state"))
    }

    fn log_limits(&self) {
        let c = &self.config;
        let halfrange = c.halfrange_rad();

        debug!("---- {} (channel {}) ----", c.id, c.channel);
        debug!("amplitude (degrees): {}", c.range_deg);
        debug!("amplitude (radians): {:.4}", halfrange * 2.0);
        debug!("limits (radians): [{:.4}, {:.4}]", -halfrange, halfrange);
        debug!("user limits (radians): [{:.4}, {:.4}]", c.user_min_rad, c.user_max_rad);
        debug!("limits (quarter-us): [{}, {}]", c.min_possible_us, c.max_possible_us);
        debug!("user limits (quarter-us): [{}, {}]", self.user_min_us, self.user_max_us);
        debug!("home (quarter-us): {}", c.home_us);
        debug!("default velocity (0-100): {}", c.default_velocity);
        debug!("default acceleration: {}", c.default_acceleration);
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert an angle about home into a pulse width.
///
/// Negative angles map linearly onto `[min_possible_us, home]`, positive angles onto
/// `[home, max_possible_us]`. Angles beyond half the servo's range saturate.
pub fn angle_to_pulse(config: &ChannelConfig, angle_rad: f64) -> u16 {
    let halfrange = config.halfrange_rad();
    let home = config.home_us as f64;

    let pulse = match angle_rad > 0.0 {
        true => interp((0.0, halfrange), (home, config.max_possible_us as f64), angle_rad),
        false => interp((-halfrange, 0.0), (config.min_possible_us as f64, home), angle_rad)
    };

    pulse as u16
}

/// Convert a pulse width into an angle about home, the inverse of [`angle_to_pulse`].
pub fn pulse_to_radians(config: &ChannelConfig, pulse: f64) -> f64 {
    let halfrange = config.halfrange_rad();
    let home = config.home_us as f64;

    match pulse >= home {
        true => interp((home, config.max_possible_us as f64), (0.0, halfrange), pulse),
        false => interp((config.min_possible_us as f64, home), (-halfrange, 0.0), pulse)
    }
}

/// Convert a speed percentage into the board's speed units.
pub fn normalize_vel(config: &ChannelConfig, percent: f64) -> u16 {
    interp((0.0, 100.0), (config.vel_min as f64, config.vel_max as f64), percent) as u16
}

/// Convert a speed in the board's units back into a whole percentage.
pub fn velocity_percent(config: &ChannelConfig, velocity: u16) -> f64 {
    if config.vel_max <= config.vel_min {
        return 0.0
    }

    interp(
        (config.vel_min as f64, config.vel_max as f64),
        (0.0, 100.0),
        velocity as f64
    ).trunc()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChannelConfig {
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

    #[test]
    fn test_angle_to_pulse() {
        let c = config();

        assert_eq!(angle_to_pulse(&c, 0.7854), 7416);
        assert_eq!(angle_to_pulse(&c, 0.0), 6000);
        assert_eq!(angle_to_pulse(&c, std::f64::consts::FRAC_PI_2), 8832);
        assert_eq!(angle_to_pulse(&c, -std::f64::consts::FRAC_PI_2), 2432);

        // Saturates beyond the range
        assert_eq!(angle_to_pulse(&c, 3.0), 8832);
        assert_eq!(angle_to_pulse(&c, -3.0), 2432);
    }

    #[test]
    fn test_segments() {
        let c = config();

        for i in 1..100 {
            let a = i as f64 * 0.016;
            let pos = angle_to_pulse(&c, a);
            let neg = angle_to_pulse(&c, -a);
            assert!(pos >= c.home_us && pos <= c.max_possible_us);
            assert!(neg >= c.min_possible_us && neg <= c.home_us);
        }
    }

    #[test]
    fn test_monotonic() {
        let c = config();
        let mut last = 0;

        for i in -200..=200 {
            let pulse = angle_to_pulse(&c, i as f64 * 0.01);
            assert!(pulse >= last, "{} rad went backwards", i as f64 * 0.01);
            last = pulse;
        }
    }

    #[test]
    fn test_pulse_to_radians() {
        let c = config();

        assert_eq!(pulse_to_radians(&c, 6000.0), 0.0);
        assert!((pulse_to_radians(&c, 8832.0) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((pulse_to_radians(&c, 2432.0) + std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((pulse_to_radians(&c, 7416.0) - 0.7854).abs() < 1e-3);
    }

    #[test]
    fn test_normalize_vel() {
        let c = config();

        assert_eq!(normalize_vel(&c, 0.0), 5);
        assert_eq!(normalize_vel(&c, 100.0), 150);
        // 5 + 0.3 * 145 = 48.5
        assert_eq!(normalize_vel(&c, 30.0), 48);
        assert_eq!(normalize_vel(&c, 250.0), 150);

        assert_eq!(velocity_percent(&c, 150), 100.0);
        assert_eq!(velocity_percent(&c, 5), 0.0);
        assert_eq!(velocity_percent(&c, 48), 29.0);
    }
}
