//! Release Radar Daemon Library
//!
//! This library exposes the daemon's API, configuration bootstrap and
//! scheduler for testing and potential embedding in other applications.

pub mod api;
pub mod config;
pub mod scheduler;

pub use api::{ApiState, ServerHandle, start_server};
pub use config::load_config;
pub use scheduler::{DailySchedule, run_scheduler};
