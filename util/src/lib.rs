//! Utility library shared by the lowcost hardware executables

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Information about the machine running the software
pub mod host;

/// Logging to stdout and the session log file
pub mod logger;

/// Interpolation and clamping
pub mod maths;

/// Loading of TOML parameter files
pub mod params;

/// Bounded waits on hardware conditions
pub mod poll;

/// Per-run session directories
pub mod session;

pub mod time;
