//! Behaviour of a servo channel against a recording transport.

mod common;

use comms_if::eqpt::servo::{ChannelPhase, CmdMotor};
use servo_lib::servo_ctrl::{ChannelError, ServoChannel};
use util::poll::PollOutcome;

use common::{head_channel, Call, MockTransport};

fn cmd(position: f64, velocity: f64, acceleration: f64) -> CmdMotor {
    CmdMotor { position, velocity, acceleration }
}

#[test]
fn test_new_installs_user_range() {
    let (channel, transport) = head_channel(MockTransport::new(0));

    assert_eq!(channel.user_range_us(), (4409, 7262));
    assert_eq!(transport.lock().unwrap().ranges, vec![(0, 4409, 7262)]);

    // Nothing is sent to the servo until asked
    assert!(transport.lock().unwrap().calls.is_empty());
    assert_eq!(channel.phase().unwrap(), ChannelPhase::Enabled);
}

#[test]
fn test_command_uses_defaults() {
    let (channel, transport) = head_channel(MockTransport::new(2));

    let motion = channel.command(&cmd(0.7854, 0.0, 0.0)).unwrap();
    assert_eq!(channel.phase().unwrap(), ChannelPhase::Moving);

    // Default acceleration 0, default speed 20 % = 5 + 0.2 * 145, and pi/4 is 7416 which the
    // transport then clamps into the user range
    assert_eq!(
        transport.lock().unwrap().motion_calls(),
        vec![Call::Accel(0, 0), Call::Speed(0, 34), Call::Target(0, 7416)]
    );
    assert_eq!(transport.lock().unwrap().targets[0], 7262);

    assert_eq!(channel.wait_motion(motion).unwrap(), PollOutcome::Complete);
    assert_eq!(channel.phase().unwrap(), ChannelPhase::Arrived);
}

#[test]
fn test_command_explicit_speed_and_accel() {
    let (channel, transport) = head_channel(MockTransport::new(0));

    let motion = channel.command(&cmd(-0.5, 100.0, 20.0)).unwrap();

    assert_eq!(
        transport.lock().unwrap().motion_calls(),
        vec![Call::Accel(0, 20), Call::Speed(0, 150), Call::Target(0, 4864)]
    );

    let status = channel.get_status().unwrap();
    assert_eq!(status.velocity, 100.0);
    assert!((status.goal_rad + 0.5).abs() < 1e-3);

    assert_eq!(channel.wait_motion(motion).unwrap(), PollOutcome::Complete);
}

#[test]
fn test_command_outside_user_range_goes_to_limit() {
    let (channel, transport) = head_channel(MockTransport::new(0));

    let motion = channel.command(&cmd(1.0, 0.0, 0.0)).unwrap();

    // 1 rad is 7802, the transport clamps it to the user max
    assert_eq!(transport.lock().unwrap().targets[0], 7262);

    let status = channel.get_status().unwrap();
    assert!((status.goal_rad - 0.7).abs() < 1e-3);
    assert_eq!(status.position_us, 7262);

    channel.wait_motion(motion).unwrap();
}

#[test]
fn test_non_finite_command_rejected() {
    let (channel, transport) = head_channel(MockTransport::new(0));

    assert!(matches!(
        channel.command(&cmd(f64::NAN, 0.0, 0.0)),
        Err(ChannelError::InvalidCommand(_))
    ));
    assert!(transport.lock().unwrap().calls.is_empty());
}

#[test]
fn test_disabled_channel_ignores_commands() {
    let (channel, transport) = head_channel(MockTransport::new(0));

    let status = channel.disable().unwrap();
    assert!(status.success);
    assert_eq!(channel.phase().unwrap(), ChannelPhase::Disabled);
    assert_eq!(transport.lock().unwrap().take_calls(), vec![Call::Target(0, 0)]);

    assert!(matches!(channel.command(&cmd(0.3, 50.0, 0.0)), Err(ChannelError::Disabled)));
    assert!(matches!(channel.default_position(), Err(ChannelError::Disabled)));
    assert!(!channel.calibrate().unwrap().success);

    assert_eq!(channel.phase().unwrap(), ChannelPhase::Disabled);
    assert!(transport.lock().unwrap().calls.is_empty());
}

#[test]
fn test_enable_restores_home() {
    let (channel, transport) = head_channel(MockTransport::new(0));

    let motion = channel.command(&cmd(0.5, 80.0, 40.0)).unwrap();
    channel.wait_motion(motion).unwrap();
    channel.disable().unwrap();
    transport.lock().unwrap().take_calls();

    let status = channel.enable().unwrap();
    assert!(status.success);
    assert_eq!(status.message, "Motor enabled and sent to 6000");

    assert_eq!(
        transport.lock().unwrap().motion_calls(),
        vec![Call::Accel(0, 0), Call::Speed(0, 5), Call::Target(0, 6000)]
    );

    let status = channel.get_status().unwrap();
    assert_eq!(status.phase, ChannelPhase::Enabled);
    assert_eq!(status.goal_rad, 0.0);
    assert_eq!(status.velocity, 0.0);
    assert_eq!(status.position_rad, 0.0);

    // And motions are accepted again
    let motion = channel.command(&cmd(0.1, 0.0, 0.0)).unwrap();
    assert_eq!(channel.wait_motion(motion).unwrap(), PollOutcome::Complete);
}

#[test]
fn test_default_position() {
    let (channel, transport) = head_channel(MockTransport::new(1));

    let motion = channel.command(&cmd(0.4, 0.0, 0.0)).unwrap();
    channel.wait_motion(motion).unwrap();
    transport.lock().unwrap().take_calls();

    let motion = channel.default_position().unwrap();
    assert_eq!(
        transport.lock().unwrap().motion_calls(),
        vec![Call::Accel(0, 0), Call::Speed(0, 5), Call::Target(0, 6000)]
    );
    assert_eq!(channel.wait_motion(motion).unwrap(), PollOutcome::Complete);
    assert_eq!(channel.get_status().unwrap().goal_rad, 0.0);
}

#[test]
fn test_newer_command_supersedes() {
    let (channel, _transport) = head_channel(MockTransport::new(3));

    let first = channel.command(&cmd(0.2, 0.0, 0.0)).unwrap();
    let second = channel.command(&cmd(-0.2, 0.0, 0.0)).unwrap();
    assert!(channel.sequence() >= 2);

    assert_eq!(channel.wait_motion(first).unwrap(), PollOutcome::Superseded);

    // The superseded wait leaves the phase to the newer motion
    assert_eq!(channel.phase().unwrap(), ChannelPhase::Moving);

    assert_eq!(channel.wait_motion(second).unwrap(), PollOutcome::Complete);
    assert_eq!(channel.phase().unwrap(), ChannelPhase::Arrived);
}

#[test]
fn test_supersede_from_another_thread() {
    let mut mock = MockTransport::new(0);
    mock.always_moving = true;
    let (channel, _transport) = head_channel(mock);
    let channel = std::sync::Arc::new(channel);

    let first = channel.command(&cmd(0.2, 0.0, 0.0)).unwrap();

    let waiter = {
        let channel = channel.clone();
        std::thread::spawn(move || channel.wait_motion(first).unwrap())
    };

    std::thread::sleep(std::time::Duration::from_millis(20));
    let _second = channel.command(&cmd(0.3, 0.0, 0.0)).unwrap();

    assert_eq!(waiter.join().unwrap(), PollOutcome::Superseded);
}

#[test]
fn test_disable_supersedes_wait() {
    let mut mock = MockTransport::new(0);
    mock.always_moving = true;
    let (channel, _transport) = head_channel(mock);

    let motion = channel.command(&cmd(0.2, 0.0, 0.0)).unwrap();
    channel.disable().unwrap();

    assert_eq!(channel.wait_motion(motion).unwrap(), PollOutcome::Superseded);
    assert_eq!(channel.phase().unwrap(), ChannelPhase::Disabled);
}

#[test]
fn test_motion_timeout() {
    let mut mock = MockTransport::new(0);
    mock.always_moving = true;
    let (channel, _transport) = head_channel(mock);

    let motion = channel.command(&cmd(0.2, 0.0, 0.0)).unwrap();

    assert_eq!(channel.wait_motion(motion).unwrap(), PollOutcome::TimedOut);
    assert_eq!(channel.phase().unwrap(), ChannelPhase::TimedOut);
}

#[test]
fn test_calibrate_sweeps_user_range() {
    let (channel, transport) = head_channel(MockTransport::new(2));

    let before = channel.sequence();
    let status = channel.calibrate().unwrap();
    assert!(status.success);
    assert_eq!(status.message, "Checked user limits");
    assert!(channel.sequence() > before);

    // 30 % of the speed range is 48.5, truncated
    assert_eq!(
        transport.lock().unwrap().motion_calls(),
        vec![
            Call::Accel(0, 10),
            Call::Speed(0, 48),
            Call::Target(0, 4409),
            Call::Target(0, 7262),
            Call::Target(0, 6000)
        ]
    );

    let status = channel.get_status().unwrap();
    assert_eq!(status.phase, ChannelPhase::Arrived);
    assert_eq!(status.goal_rad, 0.0);
    assert_eq!(status.velocity, 29.0);
}

#[test]
fn test_calibrate_timeout() {
    let mut mock = MockTransport::new(0);
    mock.always_moving = true;
    let (channel, _transport) = head_channel(mock);

    let status = channel.calibrate().unwrap();
    assert!(!status.success);
    assert_eq!(status.message, "Timed out moving to 4409");
    assert_eq!(channel.phase().unwrap(), ChannelPhase::TimedOut);
}

#[test]
fn test_ping() {
    let (channel, transport) = head_channel(MockTransport::new(0));

    let status = channel.ping().unwrap();
    assert!(status.success);
    assert!(status.message.contains("0x0000"));
    assert_eq!(transport.lock().unwrap().calls, vec![Call::Errors, Call::MovingState]);

    transport.lock().unwrap().unplugged = true;
    assert!(!channel.ping().unwrap().success);
}

#[test]
fn test_joint_state() {
    let (channel, _transport) = head_channel(MockTransport::new(0));

    let motion = channel.command(&cmd(-0.5, 60.0, 0.0)).unwrap();
    channel.wait_motion(motion).unwrap();

    let state = channel.joint_state().unwrap();
    assert_eq!(state.name, "head");
    assert!((state.goal_pos + 0.5).abs() < 1e-3);
    assert!((state.current_pos + 0.5).abs() < 1e-3);
    assert_eq!(state.velocity, 60);
    assert!(!state.is_moving);
}

#[test]
fn test_status_reports_hardware_error() {
    let mut mock = MockTransport::new(0);
    mock.unplugged = true;
    let (channel, _transport) = head_channel(mock);

    assert!(matches!(channel.get_status(), Err(ChannelError::Transport(_))));
}

#[test]
fn test_channels_share_transport() {
    let (head, transport) = head_channel(MockTransport::new(0));

    let mut config = common::head_config();
    config.id = "neck".into();
    config.channel = 3;
    let neck = ServoChannel::new(config, transport.clone(), common::fast_timing()).unwrap();

    let m1 = head.command(&cmd(0.1, 0.0, 0.0)).unwrap();
    let m2 = neck.command(&cmd(0.1, 0.0, 0.0)).unwrap();

    // Independent sequence numbers, neither supersedes the other
    assert_eq!(head.wait_motion(m1).unwrap(), PollOutcome::Complete);
    assert_eq!(neck.wait_motion(m2).unwrap(), PollOutcome::Complete);

    let targets: Vec<Call> = transport.lock().unwrap().motion_calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Target(..)))
        .collect();
    assert_eq!(targets, vec![Call::Target(0, 6180), Call::Target(3, 6180)]);
}
