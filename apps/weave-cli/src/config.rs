// config.rs — weave.toml loading and environment overrides.
//
// Every section is optional; a missing file means all defaults. A few
// settings can be overridden from the environment so the same file works
// across machines:
//   TARGET_PROJECT_PATH   → [project] target_path
//   OLLAMA_API_BASE       → [embedding] api_base
//   TARGET_BUILD_COMMAND  → [build] build_command
//   MAX_BUILD_RETRIES     → [build] max_attempts

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use weave_engine::{AgentConfig, BuildConfig, QualityConfig};
use weave_index::{EmbeddingConfig, EmbeddingStore, SelectionConfig};
use weave_workspace::{ExcludePatterns, WORKSPACE_SUBDIR};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeaveConfig {
    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    /// External agent processes by registry name.
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project the agents modify.
    #[serde(default)]
    pub target_path: Option<PathBuf>,

    /// Root for the inventory, embedding store, workspace copy and reports.
    #[serde(default = "default_workspace_path")]
    pub workspace_path: PathBuf,

    /// Relative to `workspace_path`.
    #[serde(default = "default_inventory_file")]
    pub inventory_file: String,

    /// Relative to `workspace_path`.
    #[serde(default = "default_embeddings_file")]
    pub embeddings_file: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            target_path: None,
            workspace_path: default_workspace_path(),
            inventory_file: default_inventory_file(),
            embeddings_file: default_embeddings_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Entry-name globs left out of the workspace copy. When unset, the
    /// target's `.weaveignore` or the built-in list applies.
    #[serde(default)]
    pub excludes: Option<Vec<String>>,

    #[serde(default = "default_subdir")]
    pub subdir: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            excludes: None,
            subdir: default_subdir(),
        }
    }
}

// Serde default functions
fn default_workspace_path() -> PathBuf {
    PathBuf::from("./workspace")
}

fn default_inventory_file() -> String {
    "fragments_manifest.json".to_string()
}

fn default_embeddings_file() -> String {
    "fragment_embeddings.json".to_string()
}

fn default_subdir() -> String {
    WORKSPACE_SUBDIR.to_string()
}

impl WeaveConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Defaults when the file does not exist; a file that exists but does
    /// not parse is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(target) = get("TARGET_PROJECT_PATH") {
            self.project.target_path = Some(PathBuf::from(target));
        }
        if let Some(api_base) = get("OLLAMA_API_BASE") {
            self.embedding.api_base = api_base;
        }
        if let Some(command) = get("TARGET_BUILD_COMMAND") {
            self.build.build_command = command;
        }
        if let Some(raw) = get("MAX_BUILD_RETRIES") {
            match raw.trim().parse::<u32>() {
                Ok(n) => self.build.max_attempts = n,
                Err(_) => {
                    tracing::warn!(value = %raw, "ignoring non-numeric MAX_BUILD_RETRIES")
                }
            }
        }
        self
    }

    /// The target project, which must be configured and exist.
    pub fn target_root(&self) -> anyhow::Result<PathBuf> {
        let Some(path) = self.project.target_path.as_ref() else {
            anyhow::bail!(
                "no target project configured; set [project] target_path or TARGET_PROJECT_PATH"
            );
        };
        path.canonicalize()
            .with_context(|| format!("target project {} is not accessible", path.display()))
    }

    pub fn workspace_root(&self) -> &Path {
        &self.project.workspace_path
    }

    pub fn inventory_path(&self) -> PathBuf {
        self.project.workspace_path.join(&self.project.inventory_file)
    }

    pub fn embedding_store(&self) -> EmbeddingStore {
        EmbeddingStore::new(self.project.workspace_path.join(&self.project.embeddings_file))
    }

    pub fn excludes(&self, target_root: &Path) -> anyhow::Result<ExcludePatterns> {
        match &self.workspace.excludes {
            Some(patterns) => Ok(ExcludePatterns::new(patterns.iter().cloned())?),
            None => Ok(ExcludePatterns::load(target_root)),
        }
    }
}
