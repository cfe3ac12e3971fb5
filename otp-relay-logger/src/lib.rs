//! Shared `tracing` setup for the OTP relay binaries.
pub mod logging;

pub use logging::{init, LogConfig, LogFormat, LogOutput};
