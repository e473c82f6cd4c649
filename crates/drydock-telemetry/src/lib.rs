//! Logging initialization for the drydock binaries.

pub mod logging;

pub use logging::{init_logging, LogConfig};
