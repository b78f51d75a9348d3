//! Task definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::Action;
use crate::error::ValidationError;
use crate::ids::TaskId;

/// A named, ordered sequence of actions against a target URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique key of the definition.
    #[serde(rename = "_file")]
    pub id: TaskId,

    /// Display name.
    pub name: String,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// Page the engine opens before running the actions.
    pub url: String,

    /// Steps in execution order.
    #[serde(default)]
    pub actions: Vec<Action>,

    /// Disabled tasks cannot be started or added to a batch.
    #[serde(default)]
    pub disabled: bool,
}

impl Task {
    /// Build a validated task from an untyped draft.
    ///
    /// Actions are validated in order and the first error is returned.
    pub fn from_draft(draft: TaskDraft) -> Result<Self, ValidationError> {
        let id = required(draft.id, "_file")?;
        let name = required(draft.name, "name")?;
        let url = required(draft.url, "url")?;
        let actions = validate_actions(&draft.actions)?;

        Ok(Self {
            id: TaskId::new(id),
            name,
            description: draft.description.unwrap_or_default(),
            url,
            actions,
            disabled: draft.disabled.unwrap_or(false),
        })
    }

    /// Apply a patch, replacing every supplied field wholesale.
    ///
    /// The task is left untouched if the patch fails validation.
    pub fn apply(&mut self, patch: TaskPatch) -> Result<(), ValidationError> {
        let name = match patch.name {
            Some(name) => Some(required(Some(name), "name")?),
            None => None,
        };
        let url = match patch.url {
            Some(url) => Some(required(Some(url), "url")?),
            None => None,
        };
        let actions = match patch.actions {
            Some(raw) => Some(validate_actions(&raw)?),
            None => None,
        };

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(url) = url {
            self.url = url;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(actions) = actions {
            self.actions = actions;
        }
        Ok(())
    }
}

/// Untyped task as submitted by a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskDraft {
    #[serde(rename = "_file")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub actions: Vec<Value>,
    pub disabled: Option<bool>,
}

/// Partial update of a task. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub actions: Option<Vec<Value>>,
}

fn required(value: Option<String>, field: &str) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationError::missing(field)),
    }
}

fn validate_actions(raw: &[Value]) -> Result<Vec<Action>, ValidationError> {
    raw.iter().map(Action::validate).collect()
}
