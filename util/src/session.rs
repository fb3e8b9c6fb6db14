//! Session management
//!
//! A session is one run of an executable. It owns a directory named
//! `<exec>_<timestamp>` holding the run's log file. The first session of a
//! process also fixes the epoch that log timestamps count from.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{fs, path::{Path, PathBuf}};
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use thiserror::Error;

use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// chrono format of the timestamp in session directory names.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Session {
    /// Name of the executable which owns the session
    pub exec_name: String,

    pub session_root: PathBuf,

    pub log_file_path: PathBuf,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable (LOWCOST_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot create the session directory {0:?}: {1}")]
    CannotCreateDir(PathBuf, std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start a session under `$LOWCOST_SW_ROOT/<sessions_dir>`.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        let root = crate::host::get_sw_root()
            .map_err(|_| SessionError::SwRootNotSet)?;

        Self::in_dir(root.join(sessions_dir), exec_name)
    }

    /// Start a session in the given directory, which is created if needed.
    pub fn in_dir<P: AsRef<Path>>(
        sessions_dir: P,
        exec_name: &str
    ) -> Result<Self, SessionError> {
        let epoch = SESSION_EPOCH.get_or_init(Utc::now);

        let session_root = sessions_dir.as_ref().join(format!(
            "{}_{}",
            exec_name,
            epoch.format(TIMESTAMP_FORMAT)
        ));

        fs::create_dir_all(&session_root)
            .map_err(|e| SessionError::CannotCreateDir(session_root.clone(), e))?;

        Ok(Session {
            exec_name: exec_name.to_string(),
            log_file_path: session_root.join(format!("{}.log", exec_name)),
            session_root,
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Seconds elapsed since the first session started, `NaN` before that.
pub fn get_elapsed_seconds() -> f64 {
    get_epoch()
        .and_then(|e| time::duration_to_seconds(Utc::now() - *e))
        .unwrap_or(std::f64::NAN)
}

/// The session epoch, if a session was started.
pub fn get_epoch() -> Option<&'static DateTime<Utc>> {
    SESSION_EPOCH.get()
}
