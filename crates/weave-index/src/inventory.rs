// inventory.rs — The fragment inventory produced by static analysis.
//
// The inventory is an external, read-only input: a JSON document of the form
// `{"fragments": {id: FragmentInfo}}`. Every field of FragmentInfo is
// optional on the wire because different producers fill different subsets,
// and Go-style producers emit `null` for empty lists.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::digest::digest;
use crate::error::IndexError;
use crate::source::read_fragment_source;

/// The kind of code a fragment represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Function,
    Method,
    Type,
    Constant,
    Variable,
    Other,
}

impl FragmentKind {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.to_ascii_lowercase()).as_deref() {
            Some("function") => Self::Function,
            Some("method") => Self::Method,
            Some("type") => Self::Type,
            Some("constant") => Self::Constant,
            Some("variable") => Self::Variable,
            _ => Self::Other,
        }
    }

    /// Functions and methods share the "callable" context bucket.
    pub fn is_callable(self) -> bool {
        matches!(self, Self::Function | Self::Method)
    }
}

/// An import declared by the file that holds a fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentImport {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: String,
}

/// Metadata for one addressable unit of source code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentInfo {
    /// File the parser attributed the fragment to.
    pub original_path: Option<String>,
    /// File that actually holds the text (differs for generated sources).
    pub actual_source_path: Option<String>,
    /// Whole-file fragment (a template source) rather than a line range.
    pub is_templ_source: bool,
    pub package_name: Option<String>,
    pub fragment_type: Option<String>,
    pub identifier: Option<String>,
    pub receiver_type: Option<String>,
    pub signature: Option<String>,
    pub definition: Option<String>,
    pub docstring: Option<String>,
    /// 1-based, inclusive.
    pub start_line: Option<usize>,
    /// 1-based, inclusive.
    pub end_line: Option<usize>,
    #[serde(deserialize_with = "null_as_empty")]
    pub imports: Vec<FragmentImport>,
    pub code_digest: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub direct_calls_internal: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub types_used_internal: Vec<String>,
}

impl FragmentInfo {
    pub fn kind(&self) -> FragmentKind {
        FragmentKind::parse(self.fragment_type.as_deref())
    }

    /// Path of the file holding this fragment's text, relative to the
    /// project root.
    pub fn source_path(&self) -> Option<&str> {
        self.actual_source_path
            .as_deref()
            .or(self.original_path.as_deref())
            .filter(|p| !p.is_empty())
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A snapshot of every fragment known to the static analyser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub fragments: BTreeMap<String, FragmentInfo>,
}

impl Inventory {
    /// Load an inventory file. A missing file is a distinct error so callers
    /// can report "run the analyser first" instead of a parse failure.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        if !path.is_file() {
            return Err(IndexError::InventoryMissing {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path).map_err(|source| IndexError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| IndexError::InvalidInventory {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| IndexError::IoError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| IndexError::IoError {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn get(&self, id: &str) -> Option<&FragmentInfo> {
        self.fragments.get(id)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Recompute every fragment's `code_digest` from its current text under
    /// `project_root`. Fragments whose text cannot be located keep their
    /// previous digest. Returns the number of digests that changed.
    pub fn recompute_digests(&mut self, project_root: &Path) -> usize {
        let mut changed = 0;
        for (id, info) in self.fragments.iter_mut() {
            match read_fragment_source(project_root, id, info) {
                Ok(text) => {
                    let fresh = digest(&text);
                    if info.code_digest.as_deref() != Some(fresh.as_str()) {
                        info.code_digest = Some(fresh);
                        changed += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(fragment_id = %id, error = %e, "cannot recompute digest");
                }
            }
        }
        changed
    }
}
