use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use drydock_core::env::{EntryKind, EnvFactory, ExecOutput, ExecutionEnv, TreeEntry};
use drydock_core::errors::EnvError;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Ephemeral sandbox rooted at a scratch directory.
///
/// Environment paths map onto the scratch tree by stripping the leading
/// slash, so `/workspace/src/main.rs` lives at `<root>/workspace/src/main.rs`.
/// Commands run with the workspace directory as their working directory.
/// `destroy` removes the scratch tree exactly once; later operations fail
/// with [`EnvError::Destroyed`].
pub struct LocalEnv {
    root: PathBuf,
    workspace: PathBuf,
    command_timeout: Duration,
    destroyed: AtomicBool,
}

impl LocalEnv {
    pub async fn create() -> Result<Self, EnvError> {
        Self::create_with_timeout(DEFAULT_COMMAND_TIMEOUT).await
    }

    pub async fn create_with_timeout(command_timeout: Duration) -> Result<Self, EnvError> {
        let root = std::env::temp_dir().join(format!("drydock_env_{}", uuid::Uuid::now_v7()));
        let workspace = root.join("workspace");
        tokio::fs::create_dir_all(&workspace)
            .await
            .map_err(|e| EnvError::Create(format!("{}: {e}", root.display())))?;
        debug!(root = %root.display(), "environment created");
        Ok(Self {
            root,
            workspace,
            command_timeout,
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_live(&self) -> Result<(), EnvError> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(EnvError::Destroyed)
        } else {
            Ok(())
        }
    }

    /// Map an environment path onto the scratch tree. Rejects traversal
    /// outside the root.
    fn host_path(&self, env_path: &str) -> Result<PathBuf, EnvError> {
        let relative = env_path.trim_start_matches('/');
        let candidate = Path::new(relative);
        for component in candidate.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(EnvError::Io(format!(
                        "path escapes environment: {env_path}"
                    )))
                }
            }
        }
        Ok(self.root.join(candidate))
    }
}

#[async_trait]
impl ExecutionEnv for LocalEnv {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn exec(&self, command: &str) -> Result<ExecOutput, EnvError> {
        self.ensure_live()?;

        let output = tokio::time::timeout(
            self.command_timeout,
            tokio::process::Command::new("bash")
                .arg("-c")
                .arg(command)
                .current_dir(&self.workspace)
                .output(),
        )
        .await
        .map_err(|_| EnvError::Timeout(self.command_timeout))?
        .map_err(|e| EnvError::CommandFailed(e.to_string()))?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn read_file(&self, path: &str) -> Result<String, EnvError> {
        self.ensure_live()?;
        let host = self.host_path(path)?;
        Ok(tokio::fs::read_to_string(&host).await?)
    }

    async fn read_file_bytes(&self, path: &str) -> Result<Vec<u8>, EnvError> {
        self.ensure_live()?;
        let host = self.host_path(path)?;
        Ok(tokio::fs::read(&host).await?)
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), EnvError> {
        self.ensure_live()?;
        let host = self.host_path(path)?;
        if let Some(parent) = host.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&host, contents).await?;
        Ok(())
    }

    async fn list_tree(&self, path: &str) -> Result<Vec<TreeEntry>, EnvError> {
        self.ensure_live()?;
        let host = self.host_path(path)?;
        if !host.exists() {
            return Err(EnvError::NotFound(path.to_string()));
        }

        let root = self.root.clone();
        let entries = tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            for entry in WalkDir::new(&host).min_depth(1).into_iter().flatten() {
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let Ok(meta) = entry.metadata() else {
                    continue;
                };
                let kind = if meta.is_dir() {
                    EntryKind::Directory
                } else if meta.is_file() {
                    EntryKind::File
                } else {
                    continue;
                };
                entries.push(TreeEntry {
                    path: format!("/{}", relative.display()),
                    kind,
                    size: meta.len(),
                });
            }
            entries
        })
        .await
        .map_err(|e| EnvError::Io(format!("enumeration task failed: {e}")))?;

        Ok(entries)
    }

    async fn file_hash(&self, path: &str) -> Result<String, EnvError> {
        self.ensure_live()?;
        let host = self.host_path(path)?;
        let bytes = tokio::fs::read(&host).await?;
        let digest = Sha256::digest(&bytes);
        Ok(format!("{digest:x}"))
    }

    async fn destroy(&self) -> Result<(), EnvError> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(root = %self.root.display(), "environment destroyed");
        tokio::fs::remove_dir_all(&self.root).await?;
        Ok(())
    }
}

impl Drop for LocalEnv {
    fn drop(&mut self) {
        // Last-resort cleanup if destroy was never reached.
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            if let Err(e) = std::fs::remove_dir_all(&self.root) {
                warn!(root = %self.root.display(), error = %e, "scratch cleanup failed");
            }
        }
    }
}

/// Creates [`LocalEnv`] instances.
pub struct LocalEnvFactory {
    command_timeout: Duration,
}

impl LocalEnvFactory {
    pub fn new() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_command_timeout(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }
}

impl Default for LocalEnvFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnvFactory for LocalEnvFactory {
    async fn create(&self) -> Result<Arc<dyn ExecutionEnv>, EnvError> {
        Ok(Arc::new(LocalEnv::create_with_timeout(self.command_timeout).await?))
    }
}
