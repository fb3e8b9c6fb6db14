//! # Servo Equipment Interface
//!
//! Requests and responses exchanged with the servo node over its REP socket, and the data it
//! publishes on its PUB socket.
//!
//! Publications are single frame strings of the form `"<channel id>/<topic> <json payload>"` so
//! that subscribers can filter on a channel (`"head/"`) or a single topic (`"head/state"`) with
//! `set_subscribe`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A request addressed to one channel of the servo node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServoRequest {
    /// Name of the channel, as given in the Maestro settings file.
    pub id: String,

    /// What to do.
    pub kind: ServoRequestKind
}

/// A motion command.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct CmdMotor {
    /// Goal position.
    ///
    /// Units: radians, 0 is the home position
    pub position: f64,

    /// Speed as a percentage of the channel's speed range. 0 selects the channel's default.
    pub velocity: f64,

    /// Maestro acceleration value (0-255). 0 selects the channel's default.
    pub acceleration: f64
}

/// Reply to a test style request (calibrate, ping, enable, disable).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestStatus {
    pub success: bool,
    pub message: String
}

/// Snapshot of a channel returned by [`ServoRequestKind::GetStatus`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServoStatus {
    pub id: String,

    /// Position reported by the controller, in Maestro target units (quarter-microseconds).
    pub position_us: u16,

    /// Position reported by the controller.
    ///
    /// Units: radians
    pub position_rad: f64,

    /// Last commanded velocity, 0-100.
    pub velocity: f64,

    /// Last commanded goal.
    ///
    /// Units: radians
    pub goal_rad: f64,

    pub is_moving: bool,

    pub phase: ChannelPhase
}

/// State of a channel, published periodically on the `state` topic.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JointState {
    pub name: String,

    /// Units: radians
    pub goal_pos: f64,

    /// Units: radians
    pub current_pos: f64,

    /// Last commanded velocity, 0-100.
    pub velocity: i32,

    pub is_moving: bool
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The operations a channel supports.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum ServoRequestKind {
    /// Move to a position. Acknowledged immediately, completion is published on
    /// `command_completed`.
    Command(CmdMotor),

    /// Move to the home position. Completes like `Command`.
    DefaultPosition,

    /// Run through min, max, and home. Blocks the whole controller until done.
    Calibrate,

    Ping,

    Enable,

    Disable,

    GetStatus
}

/// Response from the servo node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ServoResponse {
    /// A motion request was accepted and is being executed.
    Accepted,

    /// A motion request was rejected, for instance because the channel is disabled.
    Rejected(String),

    TestStatus(TestStatus),

    Status(ServoStatus),

    /// No channel has the requested id.
    UnknownChannel(String),

    /// The request could not be understood.
    InvalidRequest(String),

    /// The request could not be carried out because of a controller error.
    HardwareError(String)
}

/// Lifecycle of a channel.
///
/// A motion that is superseded by a newer one leaves the phase to the newer motion, so only the
/// latest command's outcome is ever reported here.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    /// Target set to 0, motion requests are rejected
    Disabled,

    /// Holding position, no motion has been requested since enabling
    Enabled,

    Moving,

    Arrived,

    /// The controller still reported motion when the timeout elapsed
    TimedOut
}

/// Topics published by the servo node, per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoTopic {
    /// `bool`, `true` if the last motion arrived, `false` if it was superseded or timed out
    CommandCompleted,

    /// [`JointState`]
    State,

    /// `f64`, last goal in radians
    PlotGoal,

    /// `f64`, current position in radians
    PlotCurrentPos,

    /// `i8`, 1 if moving
    PlotIsMoving
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ServoTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServoTopic::CommandCompleted => "command_completed",
            ServoTopic::State => "state_lowfreq",
            ServoTopic::PlotGoal => "plot_goal",
            ServoTopic::PlotCurrentPos => "plot_current_pos",
            ServoTopic::PlotIsMoving => "plot_is_moving",
        }
    }

    pub fn parse(topic: &str) -> Option<Self> {
        match topic {
            "command_completed" => Some(ServoTopic::CommandCompleted),
            "state_lowfreq" => Some(ServoTopic::State),
            "plot_goal" => Some(ServoTopic::PlotGoal),
            "plot_current_pos" => Some(ServoTopic::PlotCurrentPos),
            "plot_is_moving" => Some(ServoTopic::PlotIsMoving),
            _ => None
        }
    }
}

impl ServoRequest {
    pub fn new(id: &str, kind: ServoRequestKind) -> Self {
        Self {
            id: id.to_string(),
            kind
        }
    }
}

impl Default for ChannelPhase {
    fn default() -> Self {
        ChannelPhase::Enabled
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build the publication string for a channel topic.
pub fn format_publication(id: &str, topic: ServoTopic, payload: &str) -> String {
    format!("{}/{} {}", id, topic.as_str(), payload)
}

/// Split a publication string into channel id, topic, and payload.
///
/// Returns `None` if the string isn't a well formed publication.
pub fn parse_publication(msg: &str) -> Option<(&str, ServoTopic, &str)> {
    let (prefix, payload) = msg.split_at(msg.find(' ')?);
    let (id, topic) = prefix.split_at(prefix.rfind('/')?);

    Some((id, ServoTopic::parse(&topic[1..])?, &payload[1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publication_format() {
        let msg = format_publication("head", ServoTopic::CommandCompleted, "true");
        assert_eq!(msg, "head/command_completed true");

        let (id, topic, payload) = parse_publication(&msg).unwrap();
        assert_eq!(id, "head");
        assert_eq!(topic, ServoTopic::CommandCompleted);
        assert_eq!(payload, "true");
    }

    #[test]
    fn test_parse_bad_publication() {
        assert!(parse_publication("no_space").is_none());
        assert!(parse_publication("noslash true").is_none());
        assert!(parse_publication("head/unknown_topic 1").is_none());
    }

    #[test]
    fn test_request_json() {
        let req = ServoRequest::new("neck", ServoRequestKind::Command(CmdMotor {
            position: 0.5,
            velocity: 20.0,
            acceleration: 0.0
        }));

        let json = serde_json::to_string(&req).unwrap();
        let back: ServoRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req, back);

        let enable: ServoRequest = serde_json::from_str(r#"{"id":"head","kind":"Enable"}"#)
            .unwrap();
        assert_eq!(enable.kind, ServoRequestKind::Enable);
    }
}
