//! Process instances: running executions of process models
//!
//! An instance tracks where each subject currently is, the business data
//! collected so far, and the messages SEND states have handed over but no
//! RECEIVE state has consumed yet. Every applied transition bumps `version`.

use crate::{
    ActorId, AttributeId, AttributeValue, ModelKey, ProcessModel, ProcessModelId, StateId,
    StateKind, SubjectId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Instance Identifier ──────────────────────────────────────────────

/// Unique identifier for a process instance
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Process Instance ─────────────────────────────────────────────────

/// A running instance of a process model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: InstanceId,
    /// The model this instance was started from
    pub model_id: ProcessModelId,
    pub model: ModelKey,
    /// Who started the instance
    pub initiator: ActorId,
    /// Current state of every subject
    pub positions: BTreeMap<SubjectId, SubjectPosition>,
    /// Business data keyed by root attribute id
    #[serde(default)]
    pub data: BTreeMap<AttributeId, AttributeValue>,
    /// Emitted messages not yet consumed, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mailbox: Vec<PendingMessage>,
    /// Bumped by every applied transition
    pub version: u64,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessInstance {
    /// A fresh instance with every subject at its start state
    pub fn new(
        model: &ProcessModel,
        initiator: ActorId,
        data: BTreeMap<AttributeId, AttributeValue>,
    ) -> Self {
        let now = Utc::now();
        let positions = model
            .subjects()
            .iter()
            .filter_map(|subject| {
                let start = subject.start_state()?;
                Some((
                    subject.id().clone(),
                    SubjectPosition {
                        state: start.id().clone(),
                        kind: start.kind(),
                    },
                ))
            })
            .collect();

        Self {
            id: InstanceId::generate(),
            model_id: model.id().clone(),
            model: model.key(),
            initiator,
            positions,
            data,
            mailbox: Vec::new(),
            version: 0,
            status: InstanceStatus::Active,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == InstanceStatus::Active
    }

    pub fn is_completed(&self) -> bool {
        self.status == InstanceStatus::Completed
    }

    pub fn position(&self, subject: &SubjectId) -> Option<&SubjectPosition> {
        self.positions.get(subject)
    }

    /// Whether every subject has reached an END state
    pub fn all_subjects_terminated(&self) -> bool {
        self.positions.values().all(SubjectPosition::is_terminated)
    }

    /// Index of the oldest pending `event` sent by a subject other than
    /// `receiver`
    pub fn find_message(&self, event: &str, receiver: &SubjectId) -> Option<usize> {
        self.mailbox
            .iter()
            .position(|m| m.event == event && &m.sender != receiver)
    }

    pub fn has_message(&self, event: &str, receiver: &SubjectId) -> bool {
        self.find_message(event, receiver).is_some()
    }

    /// Mark the instance completed
    pub fn complete(&mut self) {
        let now = Utc::now();
        self.status = InstanceStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn summary(&self, open_tasks: usize) -> InstanceSummary {
        InstanceSummary {
            id: self.id.clone(),
            model: self.model.clone(),
            status: self.status,
            version: self.version,
            positions: self
                .positions
                .iter()
                .map(|(subject, pos)| (subject.clone(), pos.state.clone()))
                .collect(),
            open_tasks,
            updated_at: self.updated_at,
        }
    }
}

// ── Instance Status ──────────────────────────────────────────────────

/// Lifecycle of an instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InstanceStatus {
    #[default]
    Active,
    /// Every subject reached an END state
    Completed,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

// ── Subject Position ─────────────────────────────────────────────────

/// Where a subject currently is
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectPosition {
    pub state: StateId,
    pub kind: StateKind,
}

impl SubjectPosition {
    pub fn is_terminated(&self) -> bool {
        self.kind.is_terminal()
    }
}

/// A message emitted by leaving a SEND state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub event: String,
    pub sender: SubjectId,
    /// Instance version that emitted the message
    pub emitted_at_version: u64,
}

/// Compact view of an instance for listings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub id: InstanceId,
    pub model: ModelKey,
    pub status: InstanceStatus,
    pub version: u64,
    pub positions: BTreeMap<SubjectId, StateId>,
    pub open_tasks: usize,
    pub updated_at: DateTime<Utc>,
}
