//! # Servo Node
//!
//! Dispatches requests to the channels. Motions are acknowledged as soon as they have been sent
//! to the board, and each one is then waited on in its own thread so that a newer motion on the
//! same channel can supersede it. When a wait ends a [`NodeEvent`] is sent to the owner of the
//! node, which publishes it.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{mpsc::{channel, Receiver, Sender}, Arc},
    thread
};
use comms_if::eqpt::servo::{ServoRequest, ServoRequestKind, ServoResponse, TestStatus};
use log::{debug, error, warn};
use util::poll::PollOutcome;

use crate::servo_ctrl::{ChannelError, Motion, ServoChannel, ServoTransport};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// All the channels of one board.
pub struct ServoNode<T> {
    channels: Vec<Arc<ServoChannel<T>>>,

    events_tx: Sender<NodeEvent>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Something that happened in the background.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// A motion wait ended. `arrived` is `false` if it was superseded, timed out, or failed.
    CommandCompleted {
        id: String,
        arrived: bool
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: ServoTransport + 'static> ServoNode<T> {
    /// Create the node, returning the receiving end of its events.
    pub fn new(channels: Vec<ServoChannel<T>>) -> (Self, Receiver<NodeEvent>) {
        let (events_tx, events_rx) = channel();

        let node = Self {
            channels: channels.into_iter().map(Arc::new).collect(),
            events_tx
        };

        (node, events_rx)
    }

    pub fn channels(&self) -> &[Arc<ServoChannel<T>>] {
        &self.channels
    }

    pub fn channel(&self, id: &str) -> Option<&Arc<ServoChannel<T>>> {
        self.channels.iter().find(|c| c.id() == id)
    }

    /// Handle one request and build its response.
    ///
    /// Calibration blocks until the sweep is done, every other request returns promptly.
    pub fn handle(&self, request: &ServoRequest) -> ServoResponse {
        let channel = match self.channel(&request.id) {
            Some(c) => c,
            None => {
                warn!("Request for unknown channel {:?}", request.id);
                return ServoResponse::UnknownChannel(request.id.clone())
            }
        };

        debug!("{}: {:?}", request.id, request.kind);

        match request.kind {
            ServoRequestKind::Command(ref cmd) => self.start_motion(channel, channel.command(cmd)),
            ServoRequestKind::DefaultPosition => {
                self.start_motion(channel, channel.default_position())
            },
            ServoRequestKind::Calibrate => test_status(channel.calibrate()),
            ServoRequestKind::Ping => test_status(channel.ping()),
            ServoRequestKind::Enable => test_status(channel.enable()),
            ServoRequestKind::Disable => test_status(channel.disable()),
            ServoRequestKind::GetStatus => match channel.get_status() {
                Ok(s) => ServoResponse::Status(s),
                Err(e) => ServoResponse::HardwareError(e.to_string())
            }
        }
    }

    fn start_motion(
        &self,
        channel: &Arc<ServoChannel<T>>,
        motion: Result<Motion, ChannelError>
    ) -> ServoResponse {
        let motion = match motion {
            Ok(m) => m,
            Err(ChannelError::Disabled) => return ServoResponse::Rejected("Not enabled".into()),
            Err(ChannelError::InvalidCommand(m)) => return ServoResponse::InvalidRequest(m),
            Err(e) => {
                error!("{}: could not start the motion: {}", channel.id(), e);
                return ServoResponse::HardwareError(e.to_string())
            }
        };

        let channel = channel.clone();
        let events_tx = self.events_tx.clone();

        thread::spawn(move || {
            let arrived = match channel.wait_motion(motion) {
                Ok(outcome) => outcome == PollOutcome::Complete,
                Err(e) => {
                    error!("{}: lost track of the motion: {}", channel.id(), e);
                    false
                }
            };

            // The receiver is gone only when the node is shutting down
            events_tx.send(NodeEvent::CommandCompleted {
                id: channel.id().to_string(),
                arrived
            }).ok();
        });

        ServoResponse::Accepted
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn test_status(result: Result<TestStatus, ChannelError>) -> ServoResponse {
    match result {
        Ok(s) => ServoResponse::TestStatus(s),
        Err(e) => ServoResponse::HardwareError(e.to_string())
    }
}
