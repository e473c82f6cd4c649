use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::debug;

use drydock_core::ids::SessionId;
use drydock_core::project::FileChange;

use crate::project::{apply, ApplyReport};

/// Per-session context: the attached project and the change set cached by
/// the last run's finalization phase.
///
/// At most one environment and one attached project are active per session;
/// keeping runs non-overlapping is the caller's concern.
pub struct Session {
    id: SessionId,
    project_root: Mutex<Option<PathBuf>>,
    changes: Mutex<Vec<FileChange>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            project_root: Mutex::new(None),
            changes: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn project_root(&self) -> Option<PathBuf> {
        self.project_root.lock().clone()
    }

    pub(crate) fn set_project(&self, root: PathBuf) {
        *self.project_root.lock() = Some(root);
    }

    /// Replace the cached change set. Also clears stale results when a new
    /// run detects nothing.
    pub(crate) fn cache_changes(&self, changes: Vec<FileChange>) {
        debug!(session_id = %self.id, count = changes.len(), "caching change set");
        *self.changes.lock() = changes;
    }

    /// Pull-based view of the last detected change set.
    pub fn changes(&self) -> Vec<FileChange> {
        self.changes.lock().clone()
    }

    /// Apply the subset of cached changes whose relative paths the caller
    /// approved. `None` approves everything.
    pub async fn apply_changes(
        &self,
        approved_paths: Option<&[String]>,
        with_backup: bool,
    ) -> Option<ApplyReport> {
        let root = self.project_root()?;
        let selected: Vec<FileChange> = self
            .changes()
            .into_iter()
            .filter(|c| match approved_paths {
                Some(paths) => paths.iter().any(|p| p == &c.path),
                None => true,
            })
            .collect();
        Some(apply(&selected, &root, with_backup).await)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_core::project::ChangeKind;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("drydock_sess_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn fresh_session_has_no_project_or_changes() {
        let session = Session::new();
        assert!(session.id().as_str().starts_with("sess_"));
        assert!(session.project_root().is_none());
        assert!(session.changes().is_empty());
    }

    #[tokio::test]
    async fn apply_without_project_is_none() {
        let session = Session::new();
        assert!(session.apply_changes(None, false).await.is_none());
    }

    #[tokio::test]
    async fn apply_filters_by_approved_paths() {
        let root = scratch_dir();
        let session = Session::new();
        session.set_project(root.clone());
        session.cache_changes(vec![
            FileChange::created("yes.txt", "approved"),
            FileChange::created("no.txt", "not approved"),
        ]);

        let approved = vec!["yes.txt".to_string()];
        let report = session
            .apply_changes(Some(&approved), false)
            .await
            .unwrap();

        assert_eq!(report.applied, vec!["yes.txt".to_string()]);
        assert!(root.join("yes.txt").exists());
        assert!(!root.join("no.txt").exists());

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn apply_none_approves_everything() {
        let root = scratch_dir();
        let session = Session::new();
        session.set_project(root.clone());
        session.cache_changes(vec![
            FileChange::created("a.txt", "a"),
            FileChange::created("b.txt", "b"),
        ]);

        let report = session.apply_changes(None, false).await.unwrap();
        assert_eq!(report.applied.len(), 2);
        assert!(report.applied.iter().all(|p| {
            let change = session.changes().into_iter().find(|c| &c.path == p);
            change.map(|c| c.kind == ChangeKind::Created).unwrap_or(false)
        }));

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn cache_replaces_previous_set() {
        let session = Session::new();
        session.cache_changes(vec![FileChange::created("old.txt", "x")]);
        session.cache_changes(vec![]);
        assert!(session.changes().is_empty());
    }
}
