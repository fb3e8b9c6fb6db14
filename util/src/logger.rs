//! Logger initialisation shared by all executables
//!
//! Records are written to stdout with coloured level tags and to the
//! session's log file without colours. Every line starts with the seconds
//! elapsed since the session began.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::fmt::Display;
use colored::{ColoredString, Colorize};
use log::{info, Level};
use thiserror::Error;

use crate::session::{self, Session};

pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Crates whose chatter is capped at INFO whatever the requested level.
const QUIET_TARGETS: [&str; 2] = ["zmq", "rppal"];

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Logging cannot be switched off entirely, use at least `ERROR`")]
    LoggingDisabled,

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution. Must only be called once.
pub fn logger_init(
    min_level: LevelFilter,
    session: &Session
) -> Result<(), LoggerInitError> {

    if min_level == LevelFilter::Off {
        return Err(LoggerInitError::LoggingDisabled)
    }

    let log_file = fern::log_file(&session.log_file_path)
        .map_err(LoggerInitError::LogFileInitError)?;

    let stdout = fern::Dispatch::new()
        .format(|out, message, record| {
            let tag = coloured_tag(record.level());
            out.finish(format_args!(
                "{}",
                format_line(&tag, record.level(), record.target(), message)
            ))
        })
        .chain(std::io::stdout());

    let file = fern::Dispatch::new()
        .format(|out, message, record| {
            let tag = plain_tag(record.level());
            out.finish(format_args!(
                "{}",
                format_line(&tag, record.level(), record.target(), message)
            ))
        })
        .chain(log_file);

    let mut dispatch = fern::Dispatch::new().level(min_level);
    for target in QUIET_TARGETS.iter() {
        dispatch = dispatch.level_for(*target, min_level.min(LevelFilter::Info));
    }

    dispatch
        .chain(stdout)
        .chain(file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised for {}", session.exec_name);
    if let Some(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Log level: {:?}", min_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Build one log line. Debug and trace lines also name their target.
fn format_line(tag: &dyn Display, level: Level, target: &str, message: &dyn Display) -> String {
    let elapsed = session::get_elapsed_seconds();

    match level > Level::Info {
        true => format!("[{:10.6} {}] {}: {}", elapsed, tag, target, message),
        false => format!("[{:10.6} {}] {}", elapsed, tag, message)
    }
}

fn plain_tag(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRC",
        Level::Debug => "DBG",
        Level::Info  => "INF",
        Level::Warn  => "WRN",
        Level::Error => "ERR"
    }
}

fn coloured_tag(level: Level) -> ColoredString {
    let tag = plain_tag(level);

    match level {
        Level::Trace => tag.dimmed().italic(),
        Level::Debug => tag.dimmed(),
        Level::Info  => tag.normal(),
        Level::Warn  => tag.yellow(),
        Level::Error => tag.red().bold()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        let line = format_line(&"INF", Level::Info, "sens_lib::ultrasonic", &"distance 12.50 cm");
        assert!(line.ends_with("INF] distance 12.50 cm"), "{}", line);

        let line = format_line(&"DBG", Level::Debug, "servo_lib::node", &"head: Ping");
        assert!(line.ends_with("DBG] servo_lib::node: head: Ping"), "{}", line);

        assert_eq!(plain_tag(Level::Warn), "WRN");
    }
}
