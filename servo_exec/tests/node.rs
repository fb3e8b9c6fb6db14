//! Request dispatch through the servo node.

mod common;

use std::time::Duration;
use comms_if::eqpt::servo::{ChannelPhase, CmdMotor, ServoRequest, ServoRequestKind, ServoResponse};
use servo_lib::{
    node::{NodeEvent, ServoNode},
    servo_ctrl::ServoChannel
};

use common::{head_channel, MockTransport};

fn request(id: &str, kind: ServoRequestKind) -> ServoRequest {
    ServoRequest { id: id.into(), kind }
}

fn head_node(mock: MockTransport) -> (ServoNode<MockTransport>, std::sync::mpsc::Receiver<NodeEvent>) {
    let (channel, _transport) = head_channel(mock);
    ServoNode::new(vec![channel])
}

#[test]
fn test_unknown_channel() {
    let (node, _events) = head_node(MockTransport::new(0));

    assert_eq!(
        node.handle(&request("tail", ServoRequestKind::Ping)),
        ServoResponse::UnknownChannel("tail".into())
    );
    assert!(node.channel("head").is_some());
    assert!(node.channel("tail").is_none());
}

#[test]
fn test_command_accepted_then_completed() {
    let (node, events) = head_node(MockTransport::new(2));

    let response = node.handle(&request(
        "head",
        ServoRequestKind::Command(CmdMotor { position: 0.3, velocity: 0.0, acceleration: 0.0 })
    ));
    assert_eq!(response, ServoResponse::Accepted);

    let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(event, NodeEvent::CommandCompleted { id: "head".into(), arrived: true });
}

#[test]
fn test_superseded_command_not_arrived() {
    let mut mock = MockTransport::new(0);
    mock.always_moving = true;
    let (node, events) = head_node(mock);

    let cmd = |position| ServoRequestKind::Command(CmdMotor {
        position,
        velocity: 0.0,
        acceleration: 0.0
    });
    assert_eq!(node.handle(&request("head", cmd(0.3))), ServoResponse::Accepted);
    assert_eq!(node.handle(&request("head", cmd(-0.3))), ServoResponse::Accepted);

    // The first wait is superseded, the second times out as the mock never arrives
    for _ in 0..2 {
        let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event, NodeEvent::CommandCompleted { id: "head".into(), arrived: false });
    }
    assert_eq!(
        node.channel("head").unwrap().phase().unwrap(),
        ChannelPhase::TimedOut
    );
}

#[test]
fn test_disabled_channel_rejects_motion() {
    let (node, events) = head_node(MockTransport::new(0));

    match node.handle(&request("head", ServoRequestKind::Disable)) {
        ServoResponse::TestStatus(s) => assert!(s.success),
        other => panic!("Unexpected response {:?}", other)
    }

    assert_eq!(
        node.handle(&request("head", ServoRequestKind::DefaultPosition)),
        ServoResponse::Rejected("Not enabled".into())
    );
    assert!(events.recv_timeout(Duration::from_millis(50)).is_err());

    match node.handle(&request("head", ServoRequestKind::Enable)) {
        ServoResponse::TestStatus(s) => assert!(s.success),
        other => panic!("Unexpected response {:?}", other)
    }
    assert_eq!(
        node.handle(&request("head", ServoRequestKind::DefaultPosition)),
        ServoResponse::Accepted
    );
}

#[test]
fn test_invalid_command() {
    let (node, _events) = head_node(MockTransport::new(0));

    let response = node.handle(&request(
        "head",
        ServoRequestKind::Command(CmdMotor {
            position: f64::INFINITY,
            velocity: 0.0,
            acceleration: 0.0
        })
    ));
    assert!(matches!(response, ServoResponse::InvalidRequest(_)));
}

#[test]
fn test_status_and_hardware_errors() {
    let (channel, transport) = head_channel(MockTransport::new(0));

    let mut config = common::head_config();
    config.id = "neck".into();
    config.channel = 1;
    let neck = ServoChannel::new(config, transport.clone(), common::fast_timing()).unwrap();

    let (node, _events) = ServoNode::new(vec![channel, neck]);
    assert_eq!(node.channels().len(), 2);

    match node.handle(&request("neck", ServoRequestKind::GetStatus)) {
        ServoResponse::Status(s) => {
            assert_eq!(s.id, "neck");
            assert_eq!(s.phase, ChannelPhase::Enabled);
            assert!(!s.is_moving);
        },
        other => panic!("Unexpected response {:?}", other)
    }

    transport.lock().unwrap().unplugged = true;

    assert!(matches!(
        node.handle(&request("neck", ServoRequestKind::GetStatus)),
        ServoResponse::HardwareError(_)
    ));
    match node.handle(&request("neck", ServoRequestKind::Ping)) {
        ServoResponse::TestStatus(s) => assert!(!s.success),
        other => panic!("Unexpected response {:?}", other)
    }
}
