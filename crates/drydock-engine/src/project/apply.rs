use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

use drydock_core::project::{ChangeKind, FileChange};

/// One per-path apply failure, isolated from the rest of the batch.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ApplyFailure {
    pub path: String,
    pub error: String,
}

/// Outcome of applying a change set. Partial application is a supported,
/// reported outcome.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct ApplyReport {
    pub applied: Vec<String>,
    pub failed: Vec<ApplyFailure>,
    pub backup_path: Option<PathBuf>,
}

/// Write an approved set of changes back to the local tree.
///
/// With `with_backup`, the whole tree is first copied to a timestamped
/// location; backup failure is logged and never blocks the apply.
#[instrument(skip(changes), fields(count = changes.len(), root = %local_root.display()))]
pub async fn apply(
    changes: &[FileChange],
    local_root: &Path,
    with_backup: bool,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    if with_backup {
        let root = local_root.to_path_buf();
        let backup = tokio::task::spawn_blocking(move || create_backup(&root)).await;
        match backup {
            Ok(Ok(path)) => {
                info!(backup = %path.display(), "backup created");
                report.backup_path = Some(path);
            }
            Ok(Err(e)) => warn!(error = %e, "backup failed, applying anyway"),
            Err(e) => warn!(error = %e, "backup task failed, applying anyway"),
        }
    }

    for change in changes {
        let local_path = local_root.join(&change.path);
        let result = match change.kind {
            ChangeKind::Created | ChangeKind::Modified => {
                write_change(&local_path, change).await.map(|_| true)
            }
            ChangeKind::Deleted => match tokio::fs::remove_file(&local_path).await {
                Ok(()) => Ok(true),
                // Already absent: nothing to record either way.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.to_string()),
            },
        };

        match result {
            Ok(true) => report.applied.push(change.path.clone()),
            Ok(false) => {}
            Err(error) => {
                warn!(path = %change.path, error = %error, "apply failed for path");
                report.failed.push(ApplyFailure {
                    path: change.path.clone(),
                    error,
                });
            }
        }
    }

    report
}

async fn write_change(local_path: &Path, change: &FileChange) -> Result<(), String> {
    let Some(content) = change.new_content.as_deref() else {
        return Err("change carries no new content".into());
    };
    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }
    tokio::fs::write(local_path, content)
        .await
        .map_err(|e| e.to_string())
}

/// Copy the project tree to `~/.drydock/backups/<name>_<timestamp>`.
fn create_backup(local_root: &Path) -> Result<PathBuf, std::io::Error> {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let name = local_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".into());
    let backup_dir = backups_home().join(format!("{name}_{timestamp}"));
    std::fs::create_dir_all(&backup_dir)?;

    for entry in WalkDir::new(local_root).min_depth(1) {
        let entry = entry.map_err(std::io::Error::other)?;
        // Symlinks are skipped, matching a plain tree copy.
        if entry.path_is_symlink() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(local_root)
            .map_err(std::io::Error::other)?;
        let dest = backup_dir.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(backup_dir)
}

fn backups_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir())
        .join(".drydock")
        .join("backups")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_project(files: &[(&str, &str)]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("drydock_apply_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        for (path, content) in files {
            let full = dir.join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn created_and_modified_written() {
        let root = scratch_project(&[("a.txt", "old")]);
        let changes = vec![
            FileChange::modified("a.txt", "old", "new", "@@"),
            FileChange::created("sub/b.txt", "fresh"),
        ];

        let report = apply(&changes, &root, false).await;
        assert_eq!(report.applied.len(), 2);
        assert!(report.failed.is_empty());
        assert!(report.backup_path.is_none());
        assert_eq!(std::fs::read_to_string(root.join("a.txt")).unwrap(), "new");
        assert_eq!(std::fs::read_to_string(root.join("sub/b.txt")).unwrap(), "fresh");

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn deleted_removes_existing_file() {
        let root = scratch_project(&[("gone.txt", "bye")]);
        let changes = vec![FileChange::deleted("gone.txt", Some("bye".into()))];

        let report = apply(&changes, &root, false).await;
        assert_eq!(report.applied, vec!["gone.txt".to_string()]);
        assert!(!root.join("gone.txt").exists());

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn deleting_absent_file_is_silent() {
        let root = scratch_project(&[]);
        let changes = vec![FileChange::deleted("never_there.txt", None)];

        let report = apply(&changes, &root, false).await;
        assert!(report.applied.is_empty());
        assert!(report.failed.is_empty());

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn one_failure_never_stops_the_batch() {
        let root = scratch_project(&[]);
        let mut broken = FileChange::created("broken.txt", "");
        broken.new_content = None; // nothing to write
        let changes = vec![broken, FileChange::created("fine.txt", "ok")];

        let report = apply(&changes, &root, false).await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, "broken.txt");
        assert_eq!(report.applied, vec!["fine.txt".to_string()]);
        assert_eq!(std::fs::read_to_string(root.join("fine.txt")).unwrap(), "ok");

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn backup_copies_tree_before_apply() {
        let root = scratch_project(&[("keep.txt", "original"), ("sub/deep.txt", "nested")]);
        let changes = vec![FileChange::modified("keep.txt", "original", "changed", "@@")];

        let report = apply(&changes, &root, true).await;
        let backup = report.backup_path.expect("backup should exist");
        assert_eq!(
            std::fs::read_to_string(backup.join("keep.txt")).unwrap(),
            "original"
        );
        assert_eq!(
            std::fs::read_to_string(backup.join("sub/deep.txt")).unwrap(),
            "nested"
        );
        assert_eq!(std::fs::read_to_string(root.join("keep.txt")).unwrap(), "changed");

        std::fs::remove_dir_all(&root).ok();
        std::fs::remove_dir_all(&backup).ok();
    }
}
