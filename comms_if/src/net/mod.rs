//! # Network Module
//!
//! ZeroMQ sockets used between the executables and their clients. A [`MonitoredSocket`] is a plain
//! zmq socket plus a monitor thread keeping track of whether the peer is connected, and helpers to
//! exchange single frame JSON messages.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc
    },
    thread
};
use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};
use zmq::{Context, Socket, SocketEvent, SocketType};

pub use zmq;

// ------------------------------------------------------------------------------------------------
// MACROS
// ------------------------------------------------------------------------------------------------

/// Call a list of zmq setters, naming the failing option in the error.
macro_rules! apply_opts {
    ($socket:expr, $(($setter:ident, $value:expr)),+ $(,)?) => {
        $(
            $socket.$setter($value).map_err(|e| {
                MonitoredSocketError::SocketOptionError(stringify!($setter).into(), e)
            })?;
        )+
    };
}

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// How long the monitor thread blocks on an event before checking for shutdown.
const MONITOR_POLL_MS: i32 = 100;

/// Counter giving each monitor its own inproc endpoint.
static MONITOR_COUNT: AtomicUsize = AtomicUsize::new(0);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A zmq socket watched by a background thread.
///
/// The socket itself is reachable through `Deref`, so all the usual zmq calls are available.
pub struct MonitoredSocket {
    socket: Socket,

    monitor: Option<thread::JoinHandle<()>>,

    monitor_endpoint: String,

    stop_monitor: Arc<AtomicBool>,

    connected: Arc<AtomicBool>
}

/// Options applied to a [`MonitoredSocket`] before it binds or connects.
///
/// Timeouts are in milliseconds and follow the meaning given in the `zmq_setsockopt`
/// documentation, `-1` being infinite.
pub struct SocketOptions {
    /// Bind to the endpoint (servers) rather than connect to it (clients).
    ///
    /// Default: `false`
    pub bind: bool,

    /// Wait in [`MonitoredSocket::new`] until the first connection is made. Only meaningful for
    /// clients, which then fail with [`MonitoredSocketError::CouldNotConnect`] if the server can't
    /// be reached within `connect_timeout`.
    ///
    /// Default: `true`
    pub block_on_first_connect: bool,

    /// `ZMQ_REQ_CORRELATE`, REQ sockets only
    pub req_correlate: bool,

    /// `ZMQ_REQ_RELAXED`, REQ sockets only. Lets a client send a new request after a reply timed
    /// out.
    pub req_relaxed: bool,

    /// `ZMQ_LINGER`
    pub linger: i32,

    /// `ZMQ_RECONNECT_IVL`
    pub reconnect_ivl: i32,

    /// `ZMQ_CONNECT_TIMEOUT`
    pub connect_timeout: i32,

    /// `ZMQ_RCVTIMEO`, after which a receive fails with `EAGAIN`
    pub recv_timeout: i32,

    /// `ZMQ_SNDTIMEO`, after which a send fails with `EAGAIN`
    pub send_timeout: i32,

    /// Prefixes a SUB socket subscribes to. An empty prefix receives everything.
    pub subscriptions: Vec<String>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum MonitoredSocketError {
    #[error("Error creating the socket: {0}")]
    CreateSocketError(zmq::Error),

    #[error("Error enabling monitoring for the socket: {0}")]
    MonitoringEnableError(zmq::Error),

    #[error("Could not connect the socket: {0:?}")]
    CouldNotConnect(Option<zmq::Error>),

    #[error("Could not read event from monitor socket: {0}")]
    EventReadError(zmq::Error),

    #[error("Could not set the {0} socket option: {1}")]
    SocketOptionError(String, zmq::Error)
}

/// Errors which can occur while exchanging JSON messages on a socket.
#[derive(thiserror::Error, Debug)]
pub enum MessageError {
    #[error("Could not send the message: {0}")]
    SendError(zmq::Error),

    #[error("Could not receive a message: {0}")]
    RecvError(zmq::Error),

    #[error("The received message is not valid UTF-8")]
    NotUtf8,

    #[error("Could not serialize the message: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not deserialize the message: {0}")]
    DeserializeError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MonitoredSocket {
    /// Create the socket, apply `options`, then bind or connect it to `endpoint` (for example
    /// `"tcp://*:5040"` for a server or `"tcp://localhost:5040"` for a client).
    pub fn new(
        ctx: &Context,
        socket_type: SocketType,
        options: SocketOptions,
        endpoint: &str
    ) -> Result<Self, MonitoredSocketError> {
        let socket = ctx.socket(socket_type)
            .map_err(MonitoredSocketError::CreateSocketError)?;

        // The monitor has to be connected before the socket so no event is missed
        let monitor_endpoint = format!(
            "inproc://monitor_{}",
            MONITOR_COUNT.fetch_add(1, Ordering::Relaxed)
        );
        socket.monitor(&monitor_endpoint, SocketEvent::ALL as i32)
            .map_err(MonitoredSocketError::MonitoringEnableError)?;
        let monitor = ctx.socket(zmq::PAIR)
            .map_err(MonitoredSocketError::CreateSocketError)?;
        monitor.connect(&monitor_endpoint)
            .map_err(|e| MonitoredSocketError::CouldNotConnect(Some(e)))?;

        options.apply(&socket)?;

        let attach = match options.bind {
            true => socket.bind(endpoint),
            false => socket.connect(endpoint)
        };
        attach.map_err(|e| MonitoredSocketError::CouldNotConnect(Some(e)))?;

        let connected = Arc::new(AtomicBool::new(false));

        if options.block_on_first_connect && !options.bind {
            wait_first_connect(&monitor)?;
            connected.store(true, Ordering::Relaxed);
        }

        apply_opts!(monitor, (set_rcvtimeo, MONITOR_POLL_MS));

        let stop_monitor = Arc::new(AtomicBool::new(false));
        let monitor = {
            let endpoint = monitor_endpoint.clone();
            let stop = stop_monitor.clone();
            let connected = connected.clone();
            thread::spawn(move || run_monitor(monitor, endpoint, stop, connected))
        };

        debug!("{} socket ready on {}", type_name(socket_type), endpoint);

        Ok(Self {
            socket,
            monitor: Some(monitor),
            monitor_endpoint,
            stop_monitor,
            connected
        })
    }

    /// Whether a peer is currently connected.
    ///
    /// Servers only learn of a connection when the first peer arrives, so this starts `false`
    /// for a bound socket.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Serialize `value` to JSON and send it as a single frame.
    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<(), MessageError> {
        let msg = serde_json::to_string(value)
            .map_err(MessageError::SerializationError)?;

        self.socket.send(&msg, 0).map_err(MessageError::SendError)
    }

    /// Receive a single frame and deserialize it from JSON.
    ///
    /// When the receive timeout elapses this fails with
    /// `MessageError::RecvError(zmq::Error::EAGAIN)`, see [`MonitoredSocket::try_recv_json`].
    pub fn recv_json<T: DeserializeOwned>(&self) -> Result<T, MessageError> {
        let msg = self.socket.recv_msg(0).map_err(MessageError::RecvError)?;
        let text = msg.as_str().ok_or(MessageError::NotUtf8)?;

        serde_json::from_str(text).map_err(MessageError::DeserializeError)
    }

    /// Like [`MonitoredSocket::recv_json`], but an elapsed receive timeout gives `Ok(None)`.
    pub fn try_recv_json<T: DeserializeOwned>(&self) -> Result<Option<T>, MessageError> {
        match self.recv_json() {
            Ok(v) => Ok(Some(v)),
            Err(MessageError::RecvError(zmq::Error::EAGAIN)) => Ok(None),
            Err(e) => Err(e)
        }
    }
}

impl Drop for MonitoredSocket {
    fn drop(&mut self) {
        self.stop_monitor.store(true, Ordering::Relaxed);

        if let Some(handle) = self.monitor.take() {
            if handle.join().is_err() {
                warn!("Monitor thread for {} panicked", self.monitor_endpoint);
            }
        }
    }
}

impl std::ops::Deref for MonitoredSocket {
    type Target = Socket;

    fn deref(&self) -> &Self::Target {
        &self.socket
    }
}

impl std::ops::DerefMut for MonitoredSocket {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.socket
    }
}

impl SocketOptions {
    /// Apply the options to a socket which is not yet bound or connected.
    pub fn apply(&self, socket: &Socket) -> Result<(), MonitoredSocketError> {
        apply_opts!(
            socket,
            (set_connect_timeout, self.connect_timeout),
            (set_linger, self.linger),
            (set_reconnect_ivl, self.reconnect_ivl),
            (set_rcvtimeo, self.recv_timeout),
            (set_sndtimeo, self.send_timeout),
        );

        match socket.get_socket_type() {
            Ok(SocketType::REQ) => {
                apply_opts!(
                    socket,
                    (set_req_correlate, self.req_correlate),
                    (set_req_relaxed, self.req_relaxed)
                );
            },
            Ok(SocketType::SUB) => {
                for prefix in self.subscriptions.iter() {
                    apply_opts!(socket, (set_subscribe, prefix.as_bytes()));
                }
            },
            _ => ()
        }

        Ok(())
    }
}

impl Default for SocketOptions {
    fn default() -> Self {
        // zmq's own defaults, except for the blocking connect
        Self {
            bind: false,
            block_on_first_connect: true,
            req_correlate: false,
            req_relaxed: false,
            linger: 30_000,
            reconnect_ivl: 100,
            connect_timeout: 0,
            recv_timeout: -1,
            send_timeout: -1,
            subscriptions: Vec::new()
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn wait_first_connect(monitor: &Socket) -> Result<(), MonitoredSocketError> {
    loop {
        match read_event(monitor).map_err(MonitoredSocketError::EventReadError)? {
            SocketEvent::CONNECTED => return Ok(()),
            SocketEvent::CONNECT_DELAYED | SocketEvent::CONNECT_RETRIED => continue,
            _ => return Err(MonitoredSocketError::CouldNotConnect(None))
        }
    }
}

/// Read one monitor event. Events are two frames: the event id and value, then the peer address.
fn read_event(monitor: &Socket) -> Result<SocketEvent, zmq::Error> {
    let header = monitor.recv_msg(0)?;
    if header.len() < 2 || !monitor.get_rcvmore()? {
        return Err(zmq::Error::EPROTO)
    }
    monitor.recv_msg(0)?;

    Ok(SocketEvent::from_raw(u16::from_ne_bytes([header[0], header[1]])))
}

fn run_monitor(
    monitor: Socket,
    endpoint: String,
    stop: Arc<AtomicBool>,
    connected: Arc<AtomicBool>
) {
    while !stop.load(Ordering::Relaxed) {
        let event = match read_event(&monitor) {
            Ok(e) => e,
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                debug!("Monitor {} stopping: {}", endpoint, e);
                return
            }
        };

        match event {
            SocketEvent::CONNECTED | SocketEvent::ACCEPTED => {
                connected.store(true, Ordering::Relaxed)
            },
            SocketEvent::DISCONNECTED => connected.store(false, Ordering::Relaxed),
            _ => ()
        }
    }
}

fn type_name(socket_type: SocketType) -> &'static str {
    match socket_type {
        SocketType::REQ => "REQ",
        SocketType::REP => "REP",
        SocketType::PUB => "PUB",
        SocketType::SUB => "SUB",
        _ => "zmq"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Ping {
        id: String,
        count: u32
    }

    fn server_options(recv_timeout: i32) -> SocketOptions {
        SocketOptions {
            bind: true,
            block_on_first_connect: false,
            recv_timeout,
            linger: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_json_round_trip() {
        let ctx = zmq::Context::new();

        let rep = MonitoredSocket::new(
            &ctx, zmq::REP, server_options(1000), "inproc://test_json_round_trip"
        ).unwrap();
        let req = MonitoredSocket::new(
            &ctx,
            zmq::REQ,
            SocketOptions {
                block_on_first_connect: false,
                recv_timeout: 1000,
                linger: 0,
                ..Default::default()
            },
            "inproc://test_json_round_trip"
        ).unwrap();

        req.send_json(&Ping { id: "head".into(), count: 3 }).unwrap();
        let got: Ping = rep.recv_json().unwrap();
        assert_eq!(got, Ping { id: "head".into(), count: 3 });

        rep.send("not json", 0).unwrap();
        assert!(matches!(req.recv_json::<Ping>(), Err(MessageError::DeserializeError(_))));
    }

    #[test]
    fn test_recv_timeout() {
        let ctx = zmq::Context::new();

        let rep = MonitoredSocket::new(
            &ctx, zmq::REP, server_options(10), "inproc://test_recv_timeout"
        ).unwrap();

        assert!(matches!(rep.try_recv_json::<Ping>(), Ok(None)));
        assert!(matches!(
            rep.recv_json::<Ping>(),
            Err(MessageError::RecvError(zmq::Error::EAGAIN))
        ));
        assert!(!rep.connected());
    }
}
