//! # Servo Executable
//!
//! This executable exposes the servos attached to a Pololu Maestro over the network:
//! - Requests (command, default position, calibrate, ping, enable, disable, get status) are
//!   served on a REP socket, one channel per request
//! - The state of every channel is published at a fixed rate on a PUB socket, along with the
//!   completion of each motion
//!
//! The channels are read from the Maestro settings export and the motor limits file in the params
//! directory. Channels without a name are not used.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Servo server abstraction.
mod servo_server;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::{
    sync::{atomic::{AtomicBool, Ordering}, Arc},
    time::Instant
};
use color_eyre::{Result, eyre::WrapErr};
use comms_if::eqpt::servo::ServoTopic;
use log::{info, warn, trace};
use structopt::StructOpt;

// Internal
use servo_lib::{
    node::{NodeEvent, ServoNode},
    params::ServoExecParams,
    servo_ctrl::{self, config, Maestro, ServoChannel, ServoTransport}
};
use servo_server::ServoServer;
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "servo_exec", about = "Serve the servos of a Pololu Maestro")]
struct Opts {
    /// Log at DEBUG level and below, including the limits of each channel
    #[structopt(short, long)]
    verbose: bool,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {

    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    let opts = Opts::from_args();

    // Initialise session
    let session = Session::new(
        "servo_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    let level = match opts.verbose {
        true => LevelFilter::Trace,
        false => LevelFilter::Info
    };
    logger_init(level, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Servo Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: ServoExecParams = util::params::load("servo_exec.toml")
        .wrap_err("Could not load parameters")?;

    let channel_configs = config::load(
        util::params::param_path(&params.settings_file)?,
        util::params::param_path(&params.limits_file)?
    ).wrap_err("Could not load the channel configuration")?;

    info!("Parameters loaded, {} channels configured", channel_configs.len());

    // ---- HARDWARE INITIALISATION ----

    let device_number = params.device_number()?;
    let maestro = Maestro::open(&params.port, params.baud_rate, device_number)
        .wrap_err_with(|| format!("Could not open the Maestro on {}", params.port))?;
    let transport = servo_ctrl::share(maestro);

    let channels = channel_configs
        .into_iter()
        .map(|c| ServoChannel::new(c, transport.clone(), params.motion_timing()))
        .collect::<Result<Vec<_>, _>>()
        .wrap_err("Could not initialise the channels")?;

    let (node, events_rx) = ServoNode::new(channels);

    info!("Channels initialised");

    // ---- SERVER INITIALISATION ----

    let mut server = ServoServer::new(&params)
        .wrap_err("Failed to initialise server")?;

    info!("Server initialised");

    // ---- SHUTDOWN HANDLER ----

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }).wrap_err("Failed to set the Ctrl-C handler")?;

    // ---- MAIN LOOP ----

    info!("Initialisation complete, entering main loop");

    let state_period = params.state_period()?;
    let mut next_state_time = Instant::now();

    while running.load(Ordering::SeqCst) {

        // Serve at most one request per cycle, the socket's timeout paces the loop
        match server.get_request() {
            Ok(Some(request)) => {
                let response = node.handle(&request);
                trace!("Response to {:?}: {:?}", request, response);

                if let Err(e) = server.send_response(&response) {
                    warn!("Couldn't send response to client: {}", e);
                }
            },
            Ok(None) => (),
            Err(e) => warn!("Couldn't read request: {}", e)
        }

        // Publish completed motions
        for event in events_rx.try_iter() {
            match event {
                NodeEvent::CommandCompleted { id, arrived } => {
                    if let Err(e) = server.publish(&id, ServoTopic::CommandCompleted, &arrived) {
                        warn!("Couldn't publish completion of {}: {}", id, e);
                    }
                }
            }
        }

        // Publish states
        if Instant::now() >= next_state_time {
            next_state_time += state_period;
            if next_state_time < Instant::now() {
                next_state_time = Instant::now() + state_period;
            }

            for channel in node.channels() {
                if let Err(e) = publish_state(&mut server, channel) {
                    warn!("Couldn't publish the state of {}: {}", channel.id(), e);
                }
            }
        }
    }

    info!("End of execution");

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Publish the state and plot topics of one channel.
fn publish_state<T: ServoTransport>(
    server: &mut ServoServer,
    channel: &ServoChannel<T>
) -> Result<()> {
    let state = channel.joint_state()?;
    let id = channel.id();

    server.publish(id, ServoTopic::State, &state)?;
    server.publish(id, ServoTopic::PlotGoal, &state.goal_pos)?;
    server.publish(id, ServoTopic::PlotCurrentPos, &state.current_pos)?;
    server.publish(id, ServoTopic::PlotIsMoving, &(state.is_moving as i8))?;

    Ok(())
}
