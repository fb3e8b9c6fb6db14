//! # Sensor Executable
//!
//! Runs one of the GPIO sensors or actuators in a fixed period loop, logging each reading, until
//! interrupted with Ctrl-C:
//! - DS18B20 temperature on the 1-Wire bus
//! - HC-SR04 ultrasonic distance
//! - LDR light level by RC charge timing
//! - Relay toggling
//! - ADS1015/ADS1115 analog inputs
//!
//! Pins are released on exit.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc
};
use color_eyre::{Result, eyre::WrapErr};
use log::info;
use rppal::{gpio::{Gpio, Mode}, i2c::I2c};
use structopt::StructOpt;

// Internal
use sens_lib::{
    adc::Ads1x15,
    light::Ldr,
    params::SensExecParams,
    relay::Relay,
    run_loop,
    temperature::Ds18b20,
    ultrasonic::HcSr04
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
    time::seconds_to_std
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "sens_exec", about = "Poll a GPIO sensor or actuator")]
struct Opts {
    /// Log at DEBUG level and below
    #[structopt(short, long)]
    verbose: bool,

    #[structopt(subcommand)]
    device: Device,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
enum Device {
    /// DS18B20 temperature sensor
    #[structopt(name = "temp")]
    Temperature,

    /// HC-SR04 ultrasonic distance sensor
    #[structopt(name = "ultrasonic")]
    Ultrasonic,

    /// LDR light sensor
    #[structopt(name = "light")]
    Light,

    /// Relay, toggled every period
    #[structopt(name = "relay")]
    Relay,

    /// ADS1x15 analog to digital converter
    #[structopt(name = "adc")]
    Adc,
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
        "sens_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    let level = match opts.verbose {
        true => LevelFilter::Trace,
        false => LevelFilter::Info
    };
    logger_init(level, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Sensor Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: SensExecParams = util::params::load("sens_exec.toml")
        .wrap_err("Could not load parameters")?;

    info!("Parameters loaded");

    // ---- SHUTDOWN HANDLER ----

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }).wrap_err("Failed to set the Ctrl-C handler")?;

    // ---- RUN ----

    match opts.device {
        Device::Temperature => run_temperature(&params, &running)?,
        Device::Ultrasonic => run_ultrasonic(&params, &running)?,
        Device::Light => run_light(&params, &running)?,
        Device::Relay => run_relay(&params, &running)?,
        Device::Adc => run_adc(&params, &running)?,
    }

    info!("End of execution");

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn run_temperature(params: &SensExecParams, running: &AtomicBool) -> Result<()> {
    let p = &params.temperature;

    info!(
        "Waiting for a DS18B20 on the 1-Wire bus (GPIO {}) in {}",
        p.one_wire_pin, p.devices_dir
    );

    let mut sensor = Ds18b20::discover(
        &p.devices_dir,
        seconds_to_std(p.device_wait_timeout_s),
        seconds_to_std(p.crc_retry_interval_s),
        seconds_to_std(p.crc_timeout_s)
    ).wrap_err("Could not find the temperature sensor")?;

    run_loop(&mut sensor, seconds_to_std(p.period_s), running);

    Ok(())
}

fn run_ultrasonic(params: &SensExecParams, running: &AtomicBool) -> Result<()> {
    let p = &params.ultrasonic;
    let gpio = Gpio::new().wrap_err("Could not access the GPIO")?;

    let trigger = gpio.get(p.trigger_pin)
        .wrap_err_with(|| format!("Could not get trigger pin {}", p.trigger_pin))?
        .into_output();
    let echo = gpio.get(p.echo_pin)
        .wrap_err_with(|| format!("Could not get echo pin {}", p.echo_pin))?
        .into_input();

    let mut sensor = HcSr04::new(
        trigger,
        echo,
        seconds_to_std(p.echo_timeout_s),
        (p.min_range_cm, p.max_range_cm)
    );

    run_loop(&mut sensor, seconds_to_std(p.period_s), running);

    Ok(())
}

fn run_light(params: &SensExecParams, running: &AtomicBool) -> Result<()> {
    let p = &params.light;
    let gpio = Gpio::new().wrap_err("Could not access the GPIO")?;

    let pin = gpio.get(p.pin)
        .wrap_err_with(|| format!("Could not get LDR pin {}", p.pin))?
        .into_io(Mode::Input);

    let mut sensor = Ldr::new(
        pin,
        seconds_to_std(p.discharge_time_s),
        seconds_to_std(p.charge_timeout_s)
    );

    run_loop(&mut sensor, seconds_to_std(p.period_s), running);

    Ok(())
}

fn run_relay(params: &SensExecParams, running: &AtomicBool) -> Result<()> {
    let p = &params.relay;
    let gpio = Gpio::new().wrap_err("Could not access the GPIO")?;

    let pin = gpio.get(p.pin)
        .wrap_err_with(|| format!("Could not get relay pin {}", p.pin))?
        .into_output();

    let mut relay = Relay::new(pin);

    run_loop(&mut relay, seconds_to_std(p.period_s), running);

    relay.release();
    info!("Relay switched off");

    Ok(())
}

fn run_adc(params: &SensExecParams, running: &AtomicBool) -> Result<()> {
    let p = &params.adc;

    let i2c = I2c::with_bus(p.i2c_bus)
        .wrap_err_with(|| format!("Could not open I2C bus {}", p.i2c_bus))?;

    let mut adc = Ads1x15::new(i2c, p.address, p.ic, p.gain_mv, p.sps, p.channels.clone())
        .wrap_err("Could not configure the ADC")?;

    info!(
        "{:?} at 0x{:02X}: ±{} mV, {} SPS",
        p.ic, p.address, adc.gain_mv(), adc.sps()
    );

    run_loop(&mut adc, seconds_to_std(p.period_s), running);

    Ok(())
}
