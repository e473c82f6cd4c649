use std::path::Path;

use tracing::debug;

/// Always-ignored names: version control internals, dependency and build
/// output trees, editor state, secrets.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    "venv",
    "env",
    "__pycache__",
    "target",
    ".DS_Store",
    "Thumbs.db",
    "*.pyc",
    "*.pyo",
    "*.so",
    "*.dylib",
    ".env",
    ".env.local",
    "credentials.json",
    "dist",
    "build",
    ".next",
    "out",
    ".idea",
    ".vscode",
];

/// Effective ignore-pattern set for one project: the defaults plus one
/// pattern per non-blank, non-comment line of the project's `.gitignore`.
///
/// Patterns support a single leading OR trailing wildcard (suffix/prefix
/// match against the entry name), not full glob syntax.
#[derive(Clone, Debug)]
pub struct IgnoreSet {
    patterns: Vec<String>,
}

impl IgnoreSet {
    pub fn defaults() -> Self {
        Self {
            patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Defaults plus the project's `.gitignore` additions, if present.
    pub fn load(project_root: &Path) -> Self {
        let mut set = Self::defaults();
        let gitignore = project_root.join(".gitignore");
        if let Ok(contents) = std::fs::read_to_string(&gitignore) {
            let before = set.patterns.len();
            for line in contents.lines() {
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') {
                    set.patterns.push(line.to_string());
                }
            }
            debug!(
                added = set.patterns.len() - before,
                "loaded ignore patterns from .gitignore"
            );
        }
        set
    }

    /// Whether a file or directory name is ignored.
    pub fn matches(&self, name: &str) -> bool {
        for pattern in &self.patterns {
            if let Some(suffix) = pattern.strip_prefix('*') {
                if name.ends_with(suffix) {
                    return true;
                }
            } else if let Some(prefix) = pattern.strip_suffix('*') {
                if name.starts_with(prefix) {
                    return true;
                }
            } else if name == pattern {
                return true;
            }
        }
        false
    }
}
