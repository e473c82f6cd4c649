use drydock_core::errors::{EnvError, ProviderError};

use crate::gateway::ToolError;

/// Engine-level failures. Only provider and environment failures are fatal
/// to a run; tool errors stay local to one call.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("environment error: {0}")]
    Env(#[from] EnvError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("{0}")]
    Internal(String),
}
