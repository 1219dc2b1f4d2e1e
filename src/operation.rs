//! Operation record, progress, and result payloads.

use serde::{Deserialize, Serialize};

use crate::types::{OperationId, OperationStatus};

/// Progress of the step an operation is currently executing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CurrentStep {
    /// Human-readable step text.
    #[serde(default)]
    pub description: String,
    /// One-based step number.
    #[serde(default)]
    pub num: u32,
    /// Unit of the counters below, e.g. `bytes`.
    #[serde(default)]
    pub unit: Option<String>,
    /// Total units of work in this step.
    #[serde(default)]
    pub units_total: Option<u64>,
    /// Units done so far.
    #[serde(default)]
    pub units_done: Option<u64>,
    /// Units per second.
    #[serde(default)]
    pub rate: Option<u64>,
}

/// Outcome payload of a finished operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "ResultRepr")]
pub struct OperationResult {
    /// Numeric result code, when the backend reports one.
    pub code: Option<i32>,
    /// Result text; for create-instance this is the new instance id.
    pub message: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResultRepr {
    Text(String),
    Full {
        #[serde(default)]
        code: Option<i32>,
        #[serde(default)]
        message: String,
    },
}

impl From<ResultRepr> for OperationResult {
    fn from(value: ResultRepr) -> Self {
        match value {
            ResultRepr::Text(message) => Self {
                code: None,
                message,
            },
            ResultRepr::Full { code, message } => Self { code, message },
        }
    }
}

/// One backend-tracked unit of work, possibly owning child operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    /// Backend-assigned id.
    pub id: OperationId,
    /// Current state.
    #[serde(alias = "state")]
    pub status: OperationStatus,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Additional detail text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Total number of steps, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_steps: Option<u32>,
    /// Current step progress, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<CurrentStep>,
    /// Result once finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<OperationResult>,
    /// Child operations.
    #[serde(default)]
    pub subquests: Vec<OperationRecord>,
}

impl OperationRecord {
    /// Builds a childless record with the given status and description.
    pub fn new(id: OperationId, status: OperationStatus, description: impl Into<String>) -> Self {
        Self {
            id,
            status,
            description: description.into(),
            detail: None,
            num_steps: None,
            current_step: None,
            result: None,
            subquests: Vec::new(),
        }
    }

    /// Sets the result message.
    pub fn with_result(mut self, message: impl Into<String>) -> Self {
        self.result = Some(OperationResult {
            code: None,
            message: message.into(),
        });
        self
    }

    /// Appends a child operation.
    pub fn with_subquest(mut self, child: OperationRecord) -> Self {
        self.subquests.push(child);
        self
    }

    /// See [`OperationStatus::is_terminal`].
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// See [`OperationStatus::is_finished_ok`].
    pub fn is_finished_ok(&self) -> bool {
        self.status.is_finished_ok()
    }

    /// Result message, if any.
    pub fn result_message(&self) -> Option<&str> {
        self.result
            .as_ref()
            .map(|r| r.message.as_str())
            .filter(|m| !m.is_empty())
    }

    /// Ids of this record and all descendants, depth-first.
    pub fn tree_ids(&self) -> Vec<OperationId> {
        let mut out = vec![self.id];
        for child in &self.subquests {
            out.extend(child.tree_ids());
        }
        out
    }
}

/// Response body of every mutating request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMeta {
    /// Id of the operation created by the request.
    pub job_id: OperationId,
}
