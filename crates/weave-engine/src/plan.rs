// plan.rs — Workflow plans: ordered steps, each handed to one agent.
//
// Plans come either from the planner agent's response or from a file given
// on the command line. Both shapes are accepted on load: the full planner
// response (`status`, `plan_status`, `steps`, ...) or a bare `{"steps": [...]}`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::EngineError;

/// One unit of work for one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Planners emit numbers or strings here.
    #[serde(default, deserialize_with = "id_as_string")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Older planners name the agent `expert`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expert: Option<String>,
    #[serde(default)]
    pub instructions: String,
    /// Fragments the agent is expected to modify.
    #[serde(default)]
    pub target_fragment_ids: Vec<String>,
    /// Read-only fragments supplied as definitions.
    #[serde(default, deserialize_with = "lenient_ids")]
    pub context_fragment_ids: Vec<String>,
}

impl PlanStep {
    /// The agent to run: `agent`, falling back to `expert`.
    pub fn agent_name(&self) -> Option<&str> {
        self.agent
            .as_deref()
            .or(self.expert.as_deref())
            .filter(|name| !name.trim().is_empty())
    }

    pub fn id(&self) -> &str {
        self.step_id.as_deref().unwrap_or("?")
    }
}

fn id_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPlan {
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

impl WorkflowPlan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Load a plan file written by a planner or by hand.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.is_file() {
            return Err(EngineError::PlanMissing {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path).map_err(|source| EngineError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| EngineError::InvalidPlan {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Accept a planner response only when both `status` and `plan_status`
    /// are `"success"` and `steps` is a list.
    pub fn from_planner_response(response: &Value) -> Result<Self, EngineError> {
        let Some(obj) = response.as_object() else {
            return Err(EngineError::PlanningFailed(format!(
                "planner response is not an object: {}",
                preview(response)
            )));
        };
        let ok = |key: &str| obj.get(key).and_then(Value::as_str) == Some("success");
        if !(ok("status") && ok("plan_status")) {
            let message = obj
                .get("message")
                .or_else(|| obj.get("error_message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("planner reported failure: {}", preview(response)));
            return Err(EngineError::PlanningFailed(message));
        }
        if !obj.get("steps").is_some_and(Value::is_array) {
            return Err(EngineError::PlanningFailed(
                "planner reported success but 'steps' is missing or not a list".to_string(),
            ));
        }
        Ok(serde_json::from_value(response.clone())?)
    }
}

fn preview(value: &Value) -> String {
    let text = value.to_string();
    match text.char_indices().nth(200) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text,
    }
}
