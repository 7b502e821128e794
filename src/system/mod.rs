//! System-level modules
//!
//! - Lifecycle management (startup, shutdown)
//! - Logging initialization
//! - Execution mode routing (server, cli)

pub mod lifetime;
pub mod logging;
pub mod modes;
