//! JSON-RPC API for daemon IPC.
//!
//! This module provides a JSON-RPC interface for communication between
//! the release-radar CLI and the release-radard daemon.

pub mod handlers;
pub mod server;
pub mod types;

pub use handlers::{ApiState, RadarApiImpl, RadarApiServer};
pub use server::{ServerHandle, start_server};
pub use types::*;
