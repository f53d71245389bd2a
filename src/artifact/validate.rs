//! Structural + semantic validation of candidate artifacts.
//!
//! Structural checks (required keys, enum membership, type shapes) are done
//! by typed deserialization, with `serde_path_to_error` naming the failing
//! field. Semantic checks cover what serde cannot express: unique task ids,
//! payload/type agreement, and dependency acyclicity. Pure, no side effects.

use std::collections::HashMap;

use serde_json::Value;

use super::task::Task;
use super::types::ConsultationArtifact;
use super::{ValidationError, ValidationIssue};

/// Top-level keys a candidate must carry. `extraction_metadata` is absent on
/// purpose: provenance is stamped by the extraction contract afterwards.
const REQUIRED_KEYS: &[&str] = &[
    "version",
    "metadata",
    "patient_context",
    "soap_notes",
    "clinical_safety",
    "follow_up_tasks",
    "handover",
];

/// Accept or reject a candidate document.
///
/// Unknown additional fields are preserved, never rejected: the typed core
/// flattens them into extras maps.
pub fn validate(candidate: &Value) -> Result<ConsultationArtifact, ValidationError> {
    let obj = match candidate.as_object() {
        Some(o) => o,
        None => return Err(ValidationError::single("$", "expected a JSON object")),
    };

    let mut issues: Vec<ValidationIssue> = REQUIRED_KEYS
        .iter()
        .filter(|key| !obj.contains_key(**key))
        .map(|key| ValidationIssue {
            path: (*key).to_string(),
            message: "required key missing".into(),
        })
        .collect();

    let artifact: Option<ConsultationArtifact> =
        match serde_path_to_error::deserialize(candidate) {
            Ok(a) => Some(a),
            Err(e) => {
                let path = e.path().to_string();
                issues.push(ValidationIssue {
                    path: if path.is_empty() { ".".to_string() } else { path },
                    message: e.into_inner().to_string(),
                });
                None
            }
        };

    if let Some(artifact) = &artifact {
        issues.extend(check_tasks(&artifact.follow_up_tasks));
    }

    match (artifact, issues.is_empty()) {
        (Some(artifact), true) => Ok(artifact),
        (_, _) => Err(ValidationError { issues }),
    }
}

/// Semantic task checks: unique ids, payload discriminant agreement,
/// no self-dependencies, acyclic dependency graph.
fn check_tasks(tasks: &[Task]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut seen_ids: HashMap<&str, usize> = HashMap::new();

    for (index, task) in tasks.iter().enumerate() {
        if let Some(first) = seen_ids.insert(task.task_id.as_str(), index) {
            issues.push(ValidationIssue {
                path: format!("follow_up_tasks[{index}].task_id"),
                message: format!(
                    "duplicate task_id \"{}\" (first used by follow_up_tasks[{first}])",
                    task.task_id
                ),
            });
        }

        if let Some(inputs) = &task.required_inputs {
            if inputs.kind() != task.task_type {
                issues.push(ValidationIssue {
                    path: format!("follow_up_tasks[{index}].required_inputs"),
                    message: format!(
                        "payload kind \"{}\" does not match task_type \"{}\"",
                        inputs.kind().as_str(),
                        task.task_type.as_str()
                    ),
                });
            }
        }

        if task.dependencies.iter().any(|d| d == &task.task_id) {
            issues.push(ValidationIssue {
                path: format!("follow_up_tasks[{index}].dependencies"),
                message: format!("task \"{}\" depends on itself", task.task_id),
            });
        }
    }

    if let Some(cycle) = find_cycle(tasks) {
        issues.push(ValidationIssue {
            path: "follow_up_tasks".into(),
            message: format!("dependency cycle: {}", cycle.join(" -> ")),
        });
    }

    issues
}

#[derive(Clone, Copy, PartialEq)]
enum VisitState {
    InProgress,
    Done,
}

/// Depth-first cycle search over the dependency relation. Dependency ids
/// that name no task in the artifact are treated as satisfied, so they
/// cannot participate in a cycle.
fn find_cycle(tasks: &[Task]) -> Option<Vec<String>> {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.task_id.as_str(), t)).collect();
    let mut state: HashMap<&str, VisitState> = HashMap::new();

    for task in tasks {
        if state.contains_key(task.task_id.as_str()) {
            continue;
        }
        let mut path = Vec::new();
        if let Some(cycle) = visit(task, &by_id, &mut state, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    task: &'a Task,
    by_id: &HashMap<&'a str, &'a Task>,
    state: &mut HashMap<&'a str, VisitState>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    state.insert(&task.task_id, VisitState::InProgress);
    path.push(&task.task_id);

    for dep_id in &task.dependencies {
        let Some(dep) = by_id.get(dep_id.as_str()) else {
            continue;
        };
        match state.get(dep_id.as_str()) {
            Some(VisitState::InProgress) => {
                // Close the loop for the report.
                let start = path.iter().position(|id| *id == dep_id.as_str()).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(dep_id.clone());
                return Some(cycle);
            }
            Some(VisitState::Done) => continue,
            None => {
                if let Some(cycle) = visit(dep, by_id, state, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    state.insert(&task.task_id, VisitState::Done);
    None
}
