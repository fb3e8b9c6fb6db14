//! # Servo Command Line
//!
//! Interactive client for the servo executable. Each line is parsed into a request, sent to the
//! server, and the response printed. With `--watch` motion completions published by the server are
//! printed as they arrive.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{atomic::{AtomicBool, Ordering}, Arc},
    thread
};
use color_eyre::{Result, eyre::{eyre, WrapErr}};
use comms_if::{
    eqpt::servo::{
        parse_publication, CmdMotor, JointState, ServoRequest, ServoRequestKind, ServoResponse,
        ServoTopic
    },
    net::{zmq, MonitoredSocket, SocketOptions}
};
use rustyline::{error::ReadlineError, DefaultEditor};
use structopt::{clap::AppSettings, StructOpt};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "Servo $ ";
const HISTORY_PATH: &str = "data/servo_history.txt";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "servo_cli", about = "Send requests to the servo executable")]
struct Opts {
    /// Endpoint of the server's request socket
    #[structopt(long, default_value = "tcp://localhost:5040")]
    requests: String,

    /// Endpoint of the server's publish socket
    #[structopt(long, default_value = "tcp://localhost:5041")]
    publish: String,

    /// Print motion completions (and with `--states`, channel states) as they are published
    #[structopt(short, long)]
    watch: bool,

    /// Also print the periodic channel states
    #[structopt(long)]
    states: bool,
}

/// One line typed at the prompt.
#[derive(Debug, StructOpt)]
#[structopt(name = "servo", no_version)]
enum Line {
    /// Move a channel to a position
    #[structopt(setting = AppSettings::AllowNegativeNumbers)]
    Cmd {
        id: String,

        /// Units: radians
        position: f64,

        /// Percentage of the speed range, 0 uses the channel default
        #[structopt(short, long, default_value = "0")]
        velocity: f64,

        /// Maestro acceleration (0-255), 0 uses the channel default
        #[structopt(short, long, default_value = "0")]
        acceleration: f64,
    },

    /// Send a channel to its home position
    Home { id: String },

    /// Sweep a channel through its user limits
    Calibrate { id: String },

    Ping { id: String },

    Enable { id: String },

    Disable { id: String },

    Status { id: String },

    /// Leave the command line
    Exit,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    let ctx = zmq::Context::new();

    let req_options = SocketOptions {
        block_on_first_connect: false,
        connect_timeout: 1000,
        linger: 1,
        recv_timeout: 5000,
        send_timeout: 100,
        req_correlate: true,
        req_relaxed: true,
        ..Default::default()
    };
    let socket = MonitoredSocket::new(&ctx, zmq::REQ, req_options, &opts.requests)
        .wrap_err("Could not create the request socket")?;

    let running = Arc::new(AtomicBool::new(true));
    let watcher = match opts.watch {
        true => {
            let ctx = ctx.clone();
            let endpoint = opts.publish.clone();
            let states = opts.states;
            let running = running.clone();
            Some(thread::spawn(move || watch(ctx, &endpoint, states, running)))
        },
        false => None
    };

    let mut rl = DefaultEditor::new().wrap_err("Could not start the line editor")?;
    if rl.load_history(HISTORY_PATH).is_err() {
        println!("No history detected");
    }

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                println!("Unhandled Error: {:?}", e);
                break
            }
        };

        if line.trim().is_empty() {
            continue
        }
        rl.add_history_entry(line.as_str()).ok();

        let request = match parse(&line) {
            Ok(Some(r)) => r,
            Ok(None) => break,
            Err(e) => {
                println!("{}", e);
                continue
            }
        };

        match send(&socket, &request) {
            Ok(response) => print_response(&response),
            Err(e) => println!("Error: {:#}", e)
        }
    }

    println!("Exiting...");
    running.store(false, Ordering::Relaxed);

    if let Some(w) = watcher {
        match w.join() {
            Ok(Err(e)) => println!("Watcher stopped: {:#}", e),
            Err(_) => println!("Watcher panicked"),
            Ok(Ok(())) => ()
        }
    }

    if let Some(parent) = std::path::Path::new(HISTORY_PATH).parent() {
        std::fs::create_dir_all(parent).ok();
    }
    rl.save_history(HISTORY_PATH).wrap_err("Could not save the history")?;

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse one line into a request. `Ok(None)` asks to exit.
fn parse(line: &str) -> Result<Option<ServoRequest>, structopt::clap::Error> {
    let args = std::iter::once("servo").chain(line.split_whitespace());

    let (id, kind) = match Line::from_iter_safe(args)? {
        Line::Cmd { id, position, velocity, acceleration } => (
            id,
            ServoRequestKind::Command(CmdMotor { position, velocity, acceleration })
        ),
        Line::Home { id } => (id, ServoRequestKind::DefaultPosition),
        Line::Calibrate { id } => (id, ServoRequestKind::Calibrate),
        Line::Ping { id } => (id, ServoRequestKind::Ping),
        Line::Enable { id } => (id, ServoRequestKind::Enable),
        Line::Disable { id } => (id, ServoRequestKind::Disable),
        Line::Status { id } => (id, ServoRequestKind::GetStatus),
        Line::Exit => return Ok(None)
    };

    Ok(Some(ServoRequest::new(&id, kind)))
}

fn send(socket: &MonitoredSocket, request: &ServoRequest) -> Result<ServoResponse> {
    if !socket.connected() {
        return Err(eyre!("Not connected to the server"))
    }

    socket.send_json(request).wrap_err("Could not send the request")?;
    socket.recv_json().wrap_err("No valid response from the server")
}

fn print_response(response: &ServoResponse) {
    match response {
        ServoResponse::Accepted => println!("Accepted"),
        ServoResponse::Rejected(m) => println!("Rejected: {}", m),
        ServoResponse::TestStatus(s) => println!(
            "{}: {}",
            if s.success { "OK" } else { "FAILED" },
            s.message
        ),
        ServoResponse::Status(s) => println!(
            "{}: {:?}, at {:.4} rad ({}), goal {:.4} rad, velocity {} %, moving: {}",
            s.id, s.phase, s.position_rad, s.position_us, s.goal_rad, s.velocity, s.is_moving
        ),
        ServoResponse::UnknownChannel(id) => println!("No channel named {:?}", id),
        ServoResponse::InvalidRequest(m) => println!("Invalid request: {}", m),
        ServoResponse::HardwareError(m) => println!("Hardware error: {}", m)
    }
}

/// Print publications until `running` is cleared.
fn watch(ctx: zmq::Context, endpoint: &str, states: bool, running: Arc<AtomicBool>) -> Result<()> {
    let options = SocketOptions {
        block_on_first_connect: false,
        recv_timeout: 200,
        subscriptions: vec![String::new()],
        ..Default::default()
    };
    let socket = MonitoredSocket::new(&ctx, zmq::SUB, options, endpoint)
        .wrap_err("Could not create the subscriber socket")?;

    while running.load(Ordering::Relaxed) {
        let msg = match socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => continue,
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => return Err(e).wrap_err("Could not receive a publication")
        };

        let (id, topic, payload) = match parse_publication(&msg) {
            Some(p) => p,
            None => continue
        };

        match topic {
            ServoTopic::CommandCompleted => {
                let arrived: bool = serde_json::from_str(payload).unwrap_or(false);
                println!("\n[{}] motion {}", id, if arrived { "completed" } else { "not completed" });
            },
            ServoTopic::State if states => {
                if let Ok(s) = serde_json::from_str::<JointState>(payload) {
                    println!(
                        "\n[{}] goal {:.4} rad, at {:.4} rad, velocity {} %, moving: {}",
                        s.name, s.goal_pos, s.current_pos, s.velocity, s.is_moving
                    );
                }
            },
            _ => ()
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines() {
        assert_eq!(
            parse("cmd head -0.5 -v 40").unwrap(),
            Some(ServoRequest::new("head", ServoRequestKind::Command(CmdMotor {
                position: -0.5,
                velocity: 40.0,
                acceleration: 0.0
            })))
        );
        assert_eq!(
            parse("home neck").unwrap(),
            Some(ServoRequest::new("neck", ServoRequestKind::DefaultPosition))
        );
        assert_eq!(
            parse("  status   head ").unwrap(),
            Some(ServoRequest::new("head", ServoRequestKind::GetStatus))
        );
        assert_eq!(parse("exit").unwrap(), None);

        assert!(parse("cmd head").is_err());
        assert!(parse("spin head").is_err());
    }
}
