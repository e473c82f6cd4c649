//! Completion-capability implementations: an Anthropic HTTP client, a
//! retrying wrapper, and a mock provider for deterministic tests.

pub mod anthropic;
pub mod mock;
pub mod retry;
