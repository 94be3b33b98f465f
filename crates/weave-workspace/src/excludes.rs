// excludes.rs — Which entries never make it into a workspace copy.
//
// Patterns are matched against a single entry name (one path component),
// at any depth. Two forms are accepted:
//   - `name/`: a directory (or file) with exactly this name
//   - anything else is a glob over the name (`*.pyc`, `tmp*`, `.git*`)

use std::fs;
use std::path::{Component, Path};

use glob::Pattern;

use crate::error::WorkspaceError;

/// Version control metadata, dependency and vendor trees, build outputs,
/// logs and test binaries.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git*",
    "venv",
    "__pycache__",
    "*.pyc",
    "node_modules",
    "vendor",
    "tmp*",
    "build",
    "dist",
    "target",
    "*.log",
    "*.bak",
    "workspace",
    "debug_outputs",
    "*.exe",
    "*_test.go",
];

/// Name of the optional per-project ignore file.
pub const IGNORE_FILE: &str = ".weaveignore";

#[derive(Debug, Clone)]
pub struct ExcludePatterns {
    raw: Vec<String>,
    globs: Vec<Pattern>,
}

impl ExcludePatterns {
    /// Build from explicit patterns.
    pub fn new<I, S>(patterns: I) -> Result<Self, WorkspaceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut raw = Vec::new();
        let mut globs = Vec::new();
        for pattern in patterns {
            let pattern: String = pattern.into();
            let body = pattern.strip_suffix('/').unwrap_or(&pattern);
            let glob = Pattern::new(body).map_err(|e| WorkspaceError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            globs.push(glob);
            raw.push(pattern);
        }
        Ok(Self { raw, globs })
    }

    /// The built-in default set.
    pub fn defaults() -> Self {
        Self {
            raw: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            globs: DEFAULT_EXCLUDES
                .iter()
                .filter_map(|p| Pattern::new(p).ok())
                .collect(),
        }
    }

    pub fn none() -> Self {
        Self {
            raw: Vec::new(),
            globs: Vec::new(),
        }
    }

    /// Parse ignore-file content: one pattern per line, `#` comments and
    /// blank lines ignored.
    pub fn from_ignore_file(content: &str) -> Result<Self, WorkspaceError> {
        Self::new(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
    }

    /// Use `.weaveignore` from `project_dir` when present and valid,
    /// otherwise the defaults.
    pub fn load(project_dir: &Path) -> Self {
        let path = project_dir.join(IGNORE_FILE);
        let Ok(content) = fs::read_to_string(&path) else {
            return Self::defaults();
        };
        match Self::from_ignore_file(&content) {
            Ok(patterns) => patterns,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring invalid ignore file, using defaults");
                Self::defaults()
            }
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.raw
    }

    /// Does an entry with this name get skipped?
    pub fn should_exclude(&self, name: &str) -> bool {
        self.globs.iter().any(|g| g.matches(name))
    }

    /// Does any component of a relative path get skipped?
    pub fn should_skip_path(&self, rel_path: &str) -> bool {
        Path::new(rel_path).components().any(|c| match c {
            Component::Normal(name) => self.should_exclude(&name.to_string_lossy()),
            _ => false,
        })
    }
}

impl Default for ExcludePatterns {
    fn default() -> Self {
        Self::defaults()
    }
}
