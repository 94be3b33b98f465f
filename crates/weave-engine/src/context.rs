// context.rs — Building the JSON objects handed to agents.
//
// Two shapes exist. The planner gets the user request plus the code of the
// selected fragments, read from the real project; fragments that cannot be
// read are skipped. An executing agent gets its step instructions, the last
// build error and the current code of its target fragments read from the
// workspace copy, plus read-only definitions for its context fragments.
// Here anything missing is a hard failure: the agent was told to expect it.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use weave_index::{read_fragment_source, FragmentImport, FragmentKind, IndexError, Inventory};

use crate::error::EngineError;
use crate::plan::PlanStep;

// ── Executor context ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ExpertContext {
    pub step_instructions: String,
    pub previous_build_error: Option<String>,
    pub target_fragments_with_code: Vec<TargetFragment>,
    pub context_definitions: ContextDefinitions,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetFragment {
    pub fragment_id: String,
    /// Relative path the agent writes back to.
    pub path_to_modify: String,
    pub is_templ_source: bool,
    pub current_code_block: String,
    pub package_name: Option<String>,
    pub identifier: Option<String>,
    pub fragment_type: Option<String>,
    pub signature: Option<String>,
    pub receiver_type: Option<String>,
    pub docstring: Option<String>,
    pub imports_in_file: Vec<FragmentImport>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextDefinitions {
    pub types: Vec<TypeDefinition>,
    pub functions_or_methods: Vec<CallableSignature>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeDefinition {
    pub fragment_id: String,
    pub name: Option<String>,
    pub package_name: Option<String>,
    pub original_path: Option<String>,
    pub docstring: Option<String>,
    pub definition: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallableSignature {
    pub fragment_id: String,
    pub name: Option<String>,
    pub package_name: Option<String>,
    pub original_path: Option<String>,
    pub docstring: Option<String>,
    pub signature: String,
    pub receiver_type: Option<String>,
}

/// Paths the step's target fragments live in, as far as the inventory
/// knows them.
pub fn targeted_paths(step: &PlanStep, inventory: &Inventory) -> BTreeSet<String> {
    step.target_fragment_ids
        .iter()
        .filter_map(|id| inventory.get(id))
        .filter_map(|info| info.source_path().map(str::to_string))
        .collect()
}

/// Assemble the context for an executing agent. Code is read from
/// `workspace_dir`, so later steps see earlier steps' edits.
pub fn assemble_expert_context(
    step: &PlanStep,
    inventory: &Inventory,
    workspace_dir: &Path,
    previous_error: Option<&str>,
) -> Result<ExpertContext, EngineError> {
    let mut targets = Vec::with_capacity(step.target_fragment_ids.len());
    for id in &step.target_fragment_ids {
        let info = inventory
            .get(id)
            .ok_or_else(|| IndexError::FragmentNotFound { id: id.clone() })?;
        let code = read_fragment_source(workspace_dir, id, info)?;
        let path_to_modify = info.source_path().unwrap_or_default().to_string();
        targets.push(TargetFragment {
            fragment_id: id.clone(),
            path_to_modify,
            is_templ_source: info.is_templ_source,
            current_code_block: code,
            package_name: info.package_name.clone(),
            identifier: info.identifier.clone(),
            fragment_type: info.fragment_type.clone(),
            signature: info.signature.clone(),
            receiver_type: info.receiver_type.clone(),
            docstring: info.docstring.clone(),
            imports_in_file: info.imports.clone(),
        });
    }

    let mut definitions = ContextDefinitions::default();
    for id in &step.context_fragment_ids {
        let info = inventory
            .get(id)
            .ok_or_else(|| IndexError::FragmentNotFound { id: id.clone() })?;
        match info.kind() {
            FragmentKind::Type => {
                if let Some(definition) = info.definition.clone().filter(|d| !d.is_empty()) {
                    definitions.types.push(TypeDefinition {
                        fragment_id: id.clone(),
                        name: info.identifier.clone(),
                        package_name: info.package_name.clone(),
                        original_path: info.original_path.clone(),
                        docstring: info.docstring.clone(),
                        definition,
                    });
                } else {
                    tracing::debug!(fragment_id = %id, "type fragment has no definition, skipped");
                }
            }
            kind if kind.is_callable() => {
                if let Some(signature) = info.signature.clone().filter(|s| !s.is_empty()) {
                    definitions.functions_or_methods.push(CallableSignature {
                        fragment_id: id.clone(),
                        name: info.identifier.clone(),
                        package_name: info.package_name.clone(),
                        original_path: info.original_path.clone(),
                        docstring: info.docstring.clone(),
                        signature,
                        receiver_type: info.receiver_type.clone(),
                    });
                } else {
                    tracing::debug!(fragment_id = %id, "callable fragment has no signature, skipped");
                }
            }
            _ => {
                tracing::debug!(fragment_id = %id, "context fragment has no definition bucket, skipped");
            }
        }
    }

    tracing::info!(
        step = step.id(),
        targets = targets.len(),
        types = definitions.types.len(),
        callables = definitions.functions_or_methods.len(),
        "executor context assembled"
    );
    Ok(ExpertContext {
        step_instructions: step.instructions.clone(),
        previous_build_error: previous_error.map(str::to_string),
        target_fragments_with_code: targets,
        context_definitions: definitions,
    })
}

// ── Planner context ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct PlannerContext {
    pub user_request: String,
    pub selection_reasoning: Option<String>,
    pub relevant_code_fragments: Vec<PlannerFragment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannerFragment {
    pub fragment_id: String,
    pub path_for_llm: String,
    pub is_templ_source_file: bool,
    pub code_block: String,
    pub fragment_type: Option<String>,
    pub identifier: Option<String>,
    pub package_name: Option<String>,
    pub signature: Option<String>,
    pub receiver_type: Option<String>,
    pub definition: Option<String>,
    pub docstring: Option<String>,
}

/// Assemble the planner's context from the real project. Unreadable
/// fragments are logged and left out.
pub fn build_planner_context(
    user_request: &str,
    selection_reasoning: Option<&str>,
    fragment_ids: &[String],
    inventory: &Inventory,
    project_root: &Path,
) -> PlannerContext {
    let mut fragments = Vec::with_capacity(fragment_ids.len());
    for id in fragment_ids {
        let Some(info) = inventory.get(id) else {
            tracing::warn!(fragment_id = %id, "selected fragment missing from inventory, skipped");
            continue;
        };
        let code = match read_fragment_source(project_root, id, info) {
            Ok(code) => code,
            Err(e) => {
                tracing::warn!(fragment_id = %id, error = %e, "cannot read selected fragment, skipped");
                continue;
            }
        };
        fragments.push(PlannerFragment {
            fragment_id: id.clone(),
            path_for_llm: info.source_path().unwrap_or_default().to_string(),
            is_templ_source_file: info.is_templ_source,
            code_block: code,
            fragment_type: info.fragment_type.clone(),
            identifier: info.identifier.clone(),
            package_name: info.package_name.clone(),
            signature: info.signature.clone(),
            receiver_type: info.receiver_type.clone(),
            definition: info.definition.clone(),
            docstring: info.docstring.clone(),
        });
    }
    if fragments.is_empty() && !fragment_ids.is_empty() {
        tracing::error!(
            selected = fragment_ids.len(),
            "no code could be read for any selected fragment"
        );
    }
    tracing::info!(fragments = fragments.len(), "planner context assembled");
    PlannerContext {
        user_request: user_request.to_string(),
        selection_reasoning: selection_reasoning.map(str::to_string),
        relevant_code_fragments: fragments,
    }
}

/// Serialize a context for an agent call.
pub fn to_value<T: Serialize>(context: &T) -> Result<Value, EngineError> {
    Ok(serde_json::to_value(context)?)
}
