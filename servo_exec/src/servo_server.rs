//! # Servo Server Module
//!
//! This module abstracts over the networking side of the servo executable. Requests arrive on a
//! REP socket and must each be answered before the next one can be read. Channel states and
//! motion completions are sent out on a PUB socket.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::servo::{format_publication, ServoRequest, ServoResponse, ServoTopic},
    net::{zmq, MessageError, MonitoredSocket, MonitoredSocketError, SocketOptions}
};
use log::warn;
use serde::Serialize;

use servo_lib::params::ServoExecParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct ServoServer {

    /// REP socket which accepts requests from clients
    req_socket: MonitoredSocket,

    /// PUB socket which sends channel data to subscribers
    pub_socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the [`ServoServer`]
#[derive(thiserror::Error, Debug)]
pub enum ServoServerError {
    #[error("Socket error: {0}")]
    SocketError(#[from] MonitoredSocketError),

    #[error("Could not exchange a message: {0}")]
    MessageError(#[from] MessageError),

    #[error("Could not serialize a publication: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not publish: {0}")]
    PublishError(zmq::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ServoServer {

    /// Create a new instance of the servo server.
    ///
    /// This function will not wait for a client before returning.
    pub fn new(params: &ServoExecParams) -> Result<Self, ServoServerError> {

        // Create the zmq context
        let ctx = zmq::Context::new();

        // Create the socket options
        let req_socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            recv_timeout: params.request_timeout_ms,
            send_timeout: 10,
            ..Default::default()
        };
        let pub_socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            linger: 0,
            ..Default::default()
        };

        // Create the sockets
        let req_socket = MonitoredSocket::new(
            &ctx,
            zmq::REP,
            req_socket_options,
            &params.requests_endpoint
        )?;
        let pub_socket = MonitoredSocket::new(
            &ctx,
            zmq::PUB,
            pub_socket_options,
            &params.publish_endpoint
        )?;

        Ok(Self {
            req_socket,
            pub_socket
        })
    }

    /// Wait up to the request timeout for a request.
    ///
    /// Returns `None` if nothing arrived. A request which can't be understood is answered with
    /// [`ServoResponse::InvalidRequest`] here, and `None` is returned. Every request returned
    /// MUST be answered with [`ServoServer::send_response`].
    pub fn get_request(&mut self) -> Result<Option<ServoRequest>, ServoServerError> {
        match self.req_socket.try_recv_json::<ServoRequest>() {
            Ok(r) => Ok(r),
            Err(MessageError::RecvError(e)) => Err(MessageError::RecvError(e).into()),
            Err(e) => {
                warn!("Invalid request: {}", e);
                self.send_response(&ServoResponse::InvalidRequest(e.to_string()))?;
                Ok(None)
            }
        }
    }

    /// Answer the last request.
    pub fn send_response(&mut self, response: &ServoResponse) -> Result<(), ServoServerError> {
        self.req_socket.send_json(response)?;
        Ok(())
    }

    /// Publish a value on one of a channel's topics.
    pub fn publish<V: Serialize>(
        &mut self,
        id: &str,
        topic: ServoTopic,
        value: &V
    ) -> Result<(), ServoServerError> {
        let payload = serde_json::to_string(value)
            .map_err(ServoServerError::SerializationError)?;

        self.pub_socket
            .send(&format_publication(id, topic, &payload), 0)
            .map_err(ServoServerError::PublishError)
    }
}
