//! Workflow State Records
//!
//! The repository layer treats records as opaque structured values: anything
//! serializable with a stable identifier can be persisted. The concrete
//! entities of the compliance workflow engine, control executions and the
//! action executions they fan out into, live here as well.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Bound for any entity the repositories can persist.
///
/// `KIND` names the relational table and the key namespace in Redis; it must
/// be a lowercase snake_case identifier. The identifier returned by `id` is
/// assigned when the record is constructed and must never change afterwards.
pub trait StorageRecord:
    Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    /// Table name / key namespace for this record type.
    const KIND: &'static str;

    /// Stable unique identifier of this record.
    fn id(&self) -> Uuid;
}

/// Lifecycle of a control execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlExecutionStatus {
    Pending,
    InProgress,
    Passed,
    Failed,
}

/// Compliance outcome of a control execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Pending,
    Compliant,
    NonCompliant,
}

/// Lifecycle of a single action within a control execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionExecutionStatus {
    Pending,
    InProgress,
    Passed,
    /// The action itself could not run (bad parameters, internal error).
    ActionRequired,
    /// The action ran but its result did not qualify.
    RemediationRequired,
    Failed,
}

/// One run of a compliance control against an entity.
///
/// Tracks the ordered actions the workflow engine schedules for the control,
/// the position of the execution head, and the accumulated outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlExecution {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub control_id: Uuid,
    pub entity_id: Uuid,
    pub compliance_instruction: String,
    pub current_action_index: i32,
    /// String ids to stay representable across all backends.
    pub action_execution_ids: Vec<String>,
    pub edges: Vec<Value>,
    pub status: ControlExecutionStatus,
    pub compliance_status: ComplianceStatus,
    pub output: Option<Value>,
    pub log: Vec<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ControlExecution {
    pub fn new(customer_id: Uuid, control_id: Uuid, entity_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            control_id,
            entity_id,
            compliance_instruction: String::new(),
            current_action_index: 0,
            action_execution_ids: Vec::new(),
            edges: Vec::new(),
            status: ControlExecutionStatus::Pending,
            compliance_status: ComplianceStatus::Pending,
            output: None,
            log: Vec::new(),
            error_message: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn mark_in_progress(&mut self) {
        self.status = ControlExecutionStatus::InProgress;
        self.touch();
    }

    pub fn mark_passed(&mut self, output: Value) {
        self.status = ControlExecutionStatus::Passed;
        self.compliance_status = ComplianceStatus::Compliant;
        self.output = Some(output);
        self.touch();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ControlExecutionStatus::Failed;
        self.compliance_status = ComplianceStatus::NonCompliant;
        self.error_message = Some(error.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

impl StorageRecord for ControlExecution {
    const KIND: &'static str = "control_execution";

    fn id(&self) -> Uuid {
        self.id
    }
}

/// One action run scheduled by a control execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionExecution {
    pub id: Uuid,
    pub control_execution_id: Uuid,
    pub action_prototype_name: String,
    pub order: i32,
    pub status: ActionExecutionStatus,
    pub log: Vec<Value>,
    pub output: Value,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ActionExecution {
    pub fn new(
        control_execution_id: Uuid,
        action_prototype_name: impl Into<String>,
        order: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            control_execution_id,
            action_prototype_name: action_prototype_name.into(),
            order,
            status: ActionExecutionStatus::Pending,
            log: Vec::new(),
            output: Value::Object(Default::default()),
            error_message: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn mark_in_progress(&mut self) {
        self.status = ActionExecutionStatus::InProgress;
        self.touch();
    }

    pub fn mark_passed(&mut self, output: Value) {
        self.status = ActionExecutionStatus::Passed;
        self.output = output;
        self.touch();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ActionExecutionStatus::Failed;
        self.error_message = Some(error.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

impl StorageRecord for ActionExecution {
    const KIND: &'static str = "action_execution";

    fn id(&self) -> Uuid {
        self.id
    }
}
