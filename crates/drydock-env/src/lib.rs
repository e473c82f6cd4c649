//! Execution-environment implementation backed by a per-run scratch
//! directory on the local machine.

pub mod local;

pub use local::{LocalEnv, LocalEnvFactory};
