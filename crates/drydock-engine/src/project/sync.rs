use std::path::Path;

use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use drydock_core::env::{EntryKind, ExecutionEnv};
use drydock_core::errors::EnvError;
use drydock_core::project::Snapshot;

use crate::gateway::MOUNT_POINT;
use crate::project::ignore::IgnoreSet;

/// Outcome of one project sync. Partial sync is an accepted outcome:
/// per-file copy failures are counted, not fatal.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct SyncReport {
    pub copied: usize,
    pub skipped: usize,
}

/// Copy a local project tree into the environment at the mount point,
/// honoring ignore rules and preserving relative structure. Ignored
/// directories are pruned before descent.
#[instrument(skip(env), fields(root = %local_root.display()))]
pub async fn attach(
    env: &dyn ExecutionEnv,
    local_root: &Path,
) -> Result<SyncReport, EnvError> {
    if !local_root.is_dir() {
        return Err(EnvError::NotFound(local_root.display().to_string()));
    }

    let ignore = IgnoreSet::load(local_root);
    let mut report = SyncReport::default();

    let walker = WalkDir::new(local_root).min_depth(1).into_iter().filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy();
        !ignore.matches(&name)
    });

    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(local_root) else {
            continue;
        };
        let env_path = format!("{MOUNT_POINT}/{}", relative.display());

        let contents = match tokio::fs::read(entry.path()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                report.skipped += 1;
                continue;
            }
        };
        match env.write_file(&env_path, &contents).await {
            Ok(()) => report.copied += 1,
            Err(e) => {
                warn!(path = %env_path, error = %e, "skipping file that failed to copy");
                report.skipped += 1;
            }
        }
    }

    debug!(copied = report.copied, skipped = report.skipped, "project synced");
    Ok(report)
}

/// Record a content hash for every file now present under the mount point.
/// The resulting snapshot is the sole baseline for change detection.
pub async fn snapshot(env: &dyn ExecutionEnv) -> Result<Snapshot, EnvError> {
    let mut snap = Snapshot::new();
    for entry in env.list_tree(MOUNT_POINT).await? {
        if entry.kind != EntryKind::File {
            continue;
        }
        match env.file_hash(&entry.path).await {
            Ok(hash) => snap.record(entry.path, hash),
            Err(e) => warn!(path = entry.path, error = %e, "skipping unhashable file"),
        }
    }
    Ok(snap)
}
