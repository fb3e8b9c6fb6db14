//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Request, response and publication definitions for equipment (like the servo node)
pub mod eqpt;

/// Network module
pub mod net;
