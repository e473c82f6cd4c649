use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-path content hashes recorded once after the initial project sync.
/// The sole baseline for change detection until a new sync occurs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    hashes: BTreeMap<String, String>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: impl Into<String>, hash: impl Into<String>) {
        self.hashes.insert(path.into(), hash.into());
    }

    pub fn hash_of(&self, path: &str) -> Option<&str> {
        self.hashes.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.hashes.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.hashes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// One detected drift entry, path relative to the project root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
    /// Unified diff text; only present for `Modified`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl FileChange {
    pub fn created(path: impl Into<String>, new_content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Created,
            original_content: None,
            new_content: Some(new_content.into()),
            diff: None,
        }
    }

    pub fn modified(
        path: impl Into<String>,
        original: impl Into<String>,
        new_content: impl Into<String>,
        diff: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Modified,
            original_content: Some(original.into()),
            new_content: Some(new_content.into()),
            diff: Some(diff.into()),
        }
    }

    pub fn deleted(path: impl Into<String>, original: Option<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Deleted,
            original_content: original,
            new_content: None,
            diff: None,
        }
    }
}
