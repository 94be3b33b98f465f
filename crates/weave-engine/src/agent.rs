// agent.rs — The agent contract and the name → constructor registry.
//
// Agents are external collaborators: they receive a JSON context and return
// a JSON response. The engine only relies on the response envelope
// (`status`, `message`, `modified_fragments`), validated here so that a
// malformed answer is a step failure rather than a crash.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agents::CommandAgent;
use crate::config::AgentConfig;
use crate::error::EngineError;

/// Something that can turn a context object into a response object.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Registry name (for logs and errors).
    fn name(&self) -> &str;

    /// Run once against `context`. The raw response is validated by the
    /// caller with [`AgentResponse::from_value`].
    async fn run(&self, context: &Value) -> Result<Value, EngineError>;
}

/// A file write proposed by an editing agent.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMutation {
    /// Relative to the workspace copy.
    pub path: String,
    /// Full new file content.
    pub content: String,
    /// Templated source; triggers the regenerate command.
    pub is_templ_source: bool,
}

/// One entry of `modified_fragments`.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationEntry {
    Valid(FileMutation),
    /// Skipped with a warning; the reason is for the log.
    Invalid(String),
}

/// The validated envelope of an agent response.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    pub status: String,
    pub message: Option<String>,
    modified_fragments: Option<Value>,
}

impl AgentResponse {
    /// A non-object response or one without a string `status` is invalid.
    pub fn from_value(agent: &str, value: Value) -> Result<Self, EngineError> {
        let invalid = |reason: String| EngineError::InvalidResponse {
            agent: agent.to_string(),
            reason,
        };
        let mut obj = match value {
            Value::Object(obj) => obj,
            other => {
                return Err(invalid(format!("expected an object, got {}", type_name(&other))))
            }
        };
        let status = match obj.get("status") {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(invalid("missing 'status'".to_string())),
        };
        let message = obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            status,
            message,
            modified_fragments: obj.remove("modified_fragments"),
        })
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// The proposed file writes. Absent, null or empty means none; anything
    /// other than a list is an invalid response.
    pub fn mutations(&self, agent: &str) -> Result<Vec<MutationEntry>, EngineError> {
        let items = match &self.modified_fragments {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(EngineError::InvalidResponse {
                    agent: agent.to_string(),
                    reason: format!("'modified_fragments' is {}, not a list", type_name(other)),
                })
            }
        };
        Ok(items.iter().map(parse_mutation).collect())
    }
}

fn parse_mutation(item: &Value) -> MutationEntry {
    let Some(obj) = item.as_object() else {
        return MutationEntry::Invalid(format!("entry is {}, not an object", type_name(item)));
    };
    let path = obj
        .get("path_to_modify")
        .and_then(Value::as_str)
        .filter(|p| !p.trim().is_empty());
    let content = obj.get("new_content").and_then(Value::as_str);
    match (path, content) {
        (Some(path), Some(content)) => MutationEntry::Valid(FileMutation {
            path: path.to_string(),
            content: content.to_string(),
            is_templ_source: obj
                .get("is_templ_source")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }),
        (None, _) => MutationEntry::Invalid("missing 'path_to_modify'".to_string()),
        (Some(path), None) => {
            MutationEntry::Invalid(format!("no 'new_content' for '{}'", path))
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

// ── Registry ────────────────────────────────────────────────────

type AgentFactory = Box<dyn Fn() -> Arc<dyn Agent> + Send + Sync>;

/// Stable agent names mapped to constructors, filled once at startup.
#[derive(Default)]
pub struct AgentRegistry {
    factories: BTreeMap<String, AgentFactory>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`CommandAgent`] per `[agents.<name>]` entry.
    pub fn from_config(agents: &BTreeMap<String, AgentConfig>) -> Self {
        let mut registry = Self::new();
        for (name, config) in agents {
            let name_for_agent = name.clone();
            let config = config.clone();
            registry.register(name.clone(), move || {
                Arc::new(CommandAgent::new(name_for_agent.clone(), config.clone())) as Arc<dyn Agent>
            });
        }
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Agent> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.insert(name.clone(), Box::new(factory)).is_some() {
            tracing::warn!(agent = %name, "agent registered twice, keeping the last one");
        }
    }

    /// Register an already-built agent under its own name.
    pub fn register_instance(&mut self, agent: Arc<dyn Agent>) {
        let name = agent.name().to_string();
        self.register(name, move || Arc::clone(&agent));
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Agent>, EngineError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| EngineError::UnknownAgent {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}
