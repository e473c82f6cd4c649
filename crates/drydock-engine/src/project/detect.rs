use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, instrument, warn};

use drydock_core::env::{EntryKind, ExecutionEnv};
use drydock_core::errors::EnvError;
use drydock_core::project::{FileChange, Snapshot};

use crate::gateway::MOUNT_POINT;
use crate::project::diff::unified_diff;

/// Compare current environment state against the snapshot and classify
/// per-file drift.
///
/// Classification is snapshot-hash authoritative; diff content for a
/// modified file compares the on-disk local file (re-read now) against the
/// environment content. Entries whose local reference cannot be read are
/// skipped, never fatal. Result order is unspecified. Idempotent for an
/// unchanged environment.
#[instrument(skip(env, snapshot), fields(baseline = snapshot.len()))]
pub async fn detect(
    env: &dyn ExecutionEnv,
    snapshot: &Snapshot,
    local_root: &Path,
) -> Result<Vec<FileChange>, EnvError> {
    let current: HashSet<String> = env
        .list_tree(MOUNT_POINT)
        .await?
        .into_iter()
        .filter(|e| e.kind == EntryKind::File)
        .map(|e| e.path)
        .collect();

    let mut changes = Vec::new();

    // Modified and deleted: snapshot paths checked against the environment.
    for env_path in snapshot.paths() {
        let relative = relative_path(env_path);
        if current.contains(env_path) {
            let hash = match env.file_hash(env_path).await {
                Ok(h) => h,
                Err(e) => {
                    warn!(path = env_path, error = %e, "skipping unhashable entry");
                    continue;
                }
            };
            if snapshot.hash_of(env_path) == Some(hash.as_str()) {
                continue;
            }
            let Ok(original) = std::fs::read_to_string(local_root.join(relative)) else {
                warn!(path = relative, "skipping modified entry with unreadable local file");
                continue;
            };
            let new_content = match env.read_file(env_path).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = env_path, error = %e, "skipping unreadable modified entry");
                    continue;
                }
            };
            let diff = unified_diff(relative, &original, &new_content);
            changes.push(FileChange::modified(relative, original, new_content, diff));
        } else {
            let original = match std::fs::read_to_string(local_root.join(relative)) {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!(path = relative, error = %e, "skipping deleted entry with unreadable local file");
                    continue;
                }
            };
            changes.push(FileChange::deleted(relative, original));
        }
    }

    // Created: environment paths the snapshot has never seen.
    for env_path in &current {
        if snapshot.contains(env_path) {
            continue;
        }
        let new_content = match env.read_file(env_path).await {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %env_path, error = %e, "skipping unreadable created entry");
                continue;
            }
        };
        changes.push(FileChange::created(relative_path(env_path), new_content));
    }

    debug!(count = changes.len(), "drift classified");
    Ok(changes)
}

/// Strip the mount-point prefix from an environment path.
fn relative_path(env_path: &str) -> &str {
    env_path
        .strip_prefix(MOUNT_POINT)
        .map(|p| p.trim_start_matches('/'))
        .unwrap_or(env_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::sync::{attach, snapshot};
    use drydock_core::project::ChangeKind;
    use drydock_env::LocalEnv;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn scratch_project(files: &[(&str, &str)]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("drydock_detect_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        for (path, content) in files {
            let full = dir.join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        dir
    }

    async fn attached(files: &[(&str, &str)]) -> (LocalEnv, Snapshot, PathBuf) {
        let root = scratch_project(files);
        let env = LocalEnv::create().await.unwrap();
        attach(&env, &root).await.unwrap();
        let snap = snapshot(&env).await.unwrap();
        (env, snap, root)
    }

    fn by_path(changes: Vec<FileChange>) -> HashMap<String, FileChange> {
        changes.into_iter().map(|c| (c.path.clone(), c)).collect()
    }

    #[tokio::test]
    async fn unchanged_environment_yields_no_changes() {
        let (env, snap, root) = attached(&[("a.txt", "hi")]).await;
        let changes = detect(&env, &snap, &root).await.unwrap();
        assert!(changes.is_empty());
        env.destroy().await.unwrap();
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn modified_and_created_classified() {
        let (env, snap, root) = attached(&[("a.txt", "hi")]).await;

        env.write_file("/workspace/a.txt", b"hello").await.unwrap();
        env.write_file("/workspace/b.txt", b"new file").await.unwrap();

        let changes = by_path(detect(&env, &snap, &root).await.unwrap());
        assert_eq!(changes.len(), 2);

        let a = &changes["a.txt"];
        assert_eq!(a.kind, ChangeKind::Modified);
        assert_eq!(a.original_content.as_deref(), Some("hi"));
        assert_eq!(a.new_content.as_deref(), Some("hello"));
        let diff = a.diff.as_deref().unwrap();
        assert!(diff.contains("-hi"));
        assert!(diff.contains("+hello"));

        let b = &changes["b.txt"];
        assert_eq!(b.kind, ChangeKind::Created);
        assert_eq!(b.new_content.as_deref(), Some("new file"));
        assert!(b.diff.is_none());

        env.destroy().await.unwrap();
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn deleted_classified_with_original_content() {
        let (env, snap, root) = attached(&[("gone.txt", "bye")]).await;
        env.exec("rm gone.txt").await.unwrap();

        let changes = detect(&env, &snap, &root).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Deleted);
        assert_eq!(changes[0].path, "gone.txt");
        assert_eq!(changes[0].original_content.as_deref(), Some("bye"));

        env.destroy().await.unwrap();
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn detect_is_idempotent_without_mutation() {
        let (env, snap, root) = attached(&[("a.txt", "one"), ("b.txt", "two")]).await;
        env.write_file("/workspace/a.txt", b"changed").await.unwrap();
        env.write_file("/workspace/c.txt", b"brand new").await.unwrap();

        let first = detect(&env, &snap, &root).await.unwrap();
        let second = detect(&env, &snap, &root).await.unwrap();

        let classify = |changes: &[FileChange]| {
            let mut pairs: Vec<(String, ChangeKind)> =
                changes.iter().map(|c| (c.path.clone(), c.kind)).collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            pairs
        };
        assert_eq!(classify(&first), classify(&second));

        env.destroy().await.unwrap();
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn unreadable_local_reference_skips_that_entry_only() {
        let (env, snap, root) = attached(&[("a.txt", "aa"), ("b.txt", "bb")]).await;

        // Mutate both in the environment, then remove one local reference.
        env.write_file("/workspace/a.txt", b"AA").await.unwrap();
        env.write_file("/workspace/b.txt", b"BB").await.unwrap();
        std::fs::remove_file(root.join("a.txt")).unwrap();

        let changes = by_path(detect(&env, &snap, &root).await.unwrap());
        assert_eq!(changes.len(), 1, "only the readable entry survives");
        assert!(changes.contains_key("b.txt"));

        env.destroy().await.unwrap();
        std::fs::remove_dir_all(&root).ok();
    }
}
