//! Tasks: the unit of work a subject performs in its current state
//!
//! Every subject that is not at an END state has exactly one task. A task
//! lists the transitions its subject may take next and the attribute schema
//! the data updates must satisfy.

use crate::{
    AttributeId, AttributeValue, InstanceId, ModelKey, SchemaNode, StateId, StateKind,
    SubjectId, Transition,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a task
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whoever drives a transition: a person, a provider, or the engine
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The actor used for transitions the engine applies itself
    pub fn system() -> Self {
        Self("system".into())
    }

    /// The actor an execution provider acts as
    pub fn provider(name: &str) -> Self {
        Self(format!("provider:{name}"))
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Task ─────────────────────────────────────────────────────────────

/// Where a task is in its lifecycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    /// RECEIVE task with no matching message yet
    Waiting,
    /// Ready to be fetched
    Open,
    /// Held by an actor until completed or released
    Claimed { by: ActorId, at: DateTime<Utc> },
    /// The subject left the state
    Closed,
}

impl TaskStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self, Self::Claimed { .. })
    }

    pub fn holder(&self) -> Option<&ActorId> {
        match self {
            Self::Claimed { by, .. } => Some(by),
            _ => None,
        }
    }
}

/// A unit of work for one subject of one instance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub instance_id: InstanceId,
    pub model: ModelKey,
    pub subject_id: SubjectId,
    pub state_id: StateId,
    pub state_kind: StateKind,
    pub status: TaskStatus,
    /// Legal next states
    pub options: Vec<TransitionOption>,
    /// Attribute schema the data updates are validated against
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<SchemaNode>,
    /// Instance version the task was opened at
    pub opened_at_version: u64,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// The option matching `target` and, when given, `event`
    pub fn option(&self, target: &StateId, event: Option<&str>) -> Option<&TransitionOption> {
        self.options.iter().find(|o| {
            &o.target == target && event.map_or(true, |e| o.event.as_deref() == Some(e))
        })
    }

    /// Options that can be taken right now
    pub fn available_options(&self) -> impl Iterator<Item = &TransitionOption> {
        self.options.iter().filter(|o| o.available)
    }
}

/// A transition a task's subject may take
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOption {
    pub target: StateId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    /// False for RECEIVE transitions whose message has not arrived
    pub available: bool,
}

impl TransitionOption {
    pub fn from_transition(transition: &Transition, available: bool) -> Self {
        Self {
            target: transition.target.clone(),
            event: transition.event.clone(),
            label: transition.label.clone(),
            available,
        }
    }

    /// A request to take this option
    pub fn to_next_state(&self) -> NextState {
        let next = NextState::to(self.target.0.clone());
        match &self.event {
            Some(event) => next.on(event.clone()),
            None => next,
        }
    }
}

// ── Next State ───────────────────────────────────────────────────────

/// A request to move a subject to another state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NextState {
    pub target: StateId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Attribute updates merged into the instance data
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub updates: BTreeMap<AttributeId, AttributeValue>,
    /// Reject the transition unless the instance is still at this version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

impl NextState {
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: StateId::new(target),
            event: None,
            updates: BTreeMap::new(),
            expected_version: None,
        }
    }

    pub fn on(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_update(mut self, attribute: impl Into<String>, value: AttributeValue) -> Self {
        self.updates.insert(AttributeId::new(attribute), value);
        self
    }

    pub fn expecting_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

// ── Filter ───────────────────────────────────────────────────────────

/// Narrows which tasks a fetch may return
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

impl TaskFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn model(name: impl Into<String>) -> Self {
        Self {
            model_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn instance(id: InstanceId) -> Self {
        Self {
            instance_id: Some(id),
            ..Default::default()
        }
    }

    pub fn task(id: TaskId) -> Self {
        Self {
            task_id: Some(id),
            ..Default::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.model_name.as_ref().map_or(true, |n| &task.model.name == n)
            && self.instance_id.as_ref().map_or(true, |i| &task.instance_id == i)
            && self.task_id.as_ref().map_or(true, |t| &task.id == t)
    }
}
