use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::EnvError;

/// Output of one command execution inside the environment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry from a recursive tree enumeration. Enumeration order is
/// unspecified.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
}

/// The execution-environment capability: an ephemeral, isolated place where
/// agent-issued commands and file operations run.
///
/// At most one instance is logically active per session. `destroy` has
/// at-most-once effect; operations after destroy fail with
/// [`EnvError::Destroyed`].
#[async_trait]
pub trait ExecutionEnv: Send + Sync {
    /// Run a shell command, returning stdout, stderr and exit code.
    async fn exec(&self, command: &str) -> Result<ExecOutput, EnvError>;

    /// Read a file as UTF-8 text.
    async fn read_file(&self, path: &str) -> Result<String, EnvError>;

    /// Read a file as raw bytes.
    async fn read_file_bytes(&self, path: &str) -> Result<Vec<u8>, EnvError>;

    /// Write a file, creating parent directories as needed.
    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), EnvError>;

    /// Recursively enumerate files and directories under `path`.
    async fn list_tree(&self, path: &str) -> Result<Vec<TreeEntry>, EnvError>;

    /// Collision-resistant content hash (hex SHA-256) of a file.
    async fn file_hash(&self, path: &str) -> Result<String, EnvError>;

    /// Tear the environment down. Idempotent.
    async fn destroy(&self) -> Result<(), EnvError>;
}

/// Creates environments. Injected into the loop so tests can substitute
/// failing or scripted environments.
#[async_trait]
pub trait EnvFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn ExecutionEnv>, EnvError>;
}
