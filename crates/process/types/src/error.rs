//! Error types for process models and attribute schemas.

use crate::{AttributeId, ProcessModelId, ScalarType, StateId, SubjectId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building an attribute schema tree
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaError {
    #[error("attribute '{0}' is declared more than once")]
    DuplicateAttribute(AttributeId),

    #[error("attribute '{attribute}' points to undeclared attribute '{target}'")]
    UnresolvedReference {
        attribute: AttributeId,
        target: AttributeId,
    },

    #[error("attribute '{0}' contains itself through nested fields")]
    CyclicNesting(AttributeId),

    #[error("reference chain through {} attributes forms a cycle: {}", .0.len(), join(.0))]
    CyclicReference(Vec<AttributeId>),

    #[error("attribute '{attribute}' nests {depth} levels deep (limit {limit})")]
    DepthExceeded {
        attribute: AttributeId,
        depth: usize,
        limit: usize,
    },
}

fn join(ids: &[AttributeId]) -> String {
    ids.iter()
        .map(AttributeId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A single attribute that failed validation
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("attribute '{attribute_id}': {reason}")]
pub struct SchemaViolation {
    pub attribute_id: AttributeId,
    pub reason: ViolationReason,
}

impl SchemaViolation {
    pub fn new(attribute_id: AttributeId, reason: ViolationReason) -> Self {
        Self {
            attribute_id,
            reason,
        }
    }
}

/// Why an attribute failed validation
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum ViolationReason {
    #[error("a value is required")]
    Required,

    #[error("value is read-only and already set")]
    ReadOnly,

    #[error("expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ScalarType,
        actual: String,
    },

    #[error("expected a record, got {0}")]
    NotARecord(String),

    #[error("not declared by the schema")]
    UnknownAttribute,

    #[error("value nests deeper than {0} levels")]
    DepthExceeded(usize),
}

/// A single structural problem found in a process model
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelViolation {
    #[error("model name must not be empty")]
    EmptyName,

    #[error("model declares no subjects")]
    NoSubjects,

    #[error("subject '{0}' is declared more than once")]
    DuplicateSubject(SubjectId),

    #[error("subject '{subject}' declares state '{state}' more than once")]
    DuplicateState { subject: SubjectId, state: StateId },

    #[error("subject '{0}' has no start state")]
    NoStartState(SubjectId),

    #[error("subject '{subject}' references undeclared state '{state}'")]
    UnknownState { subject: SubjectId, state: StateId },

    #[error("transition references undeclared subject '{0}'")]
    UnknownSubject(SubjectId),

    #[error("subject '{subject}': state '{state}' is not an END state but has no outgoing transition")]
    DeadEnd { subject: SubjectId, state: StateId },

    #[error("subject '{subject}': END state '{state}' has outgoing transitions")]
    EndHasTransitions { subject: SubjectId, state: StateId },

    #[error("subject '{subject}': state '{state}' is unreachable from the start state")]
    Unreachable { subject: SubjectId, state: StateId },

    #[error("subject '{subject}': transition {from} -> {to} is declared more than once")]
    DuplicateTransition {
        subject: SubjectId,
        from: StateId,
        to: StateId,
    },

    #[error("subject '{subject}': message transition {from} -> {to} has no event name")]
    MissingEvent {
        subject: SubjectId,
        from: StateId,
        to: StateId,
    },

    #[error("subject '{subject}': event '{event}' is received but no other subject sends it")]
    UnpairedReceive { subject: SubjectId, event: String },

    #[error("automated subject '{0}' names no execution provider")]
    MissingProvider(SubjectId),

    #[error("attribute schema: {0}")]
    Schema(#[from] SchemaError),
}

/// Errors raised when registering a process model
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("model '{name}' version {version} is already registered")]
    Conflict { name: String, version: u32 },

    #[error("model '{model}' is invalid ({} violations)", .violations.len())]
    Invalid {
        model: String,
        violations: Vec<ModelViolation>,
    },

    #[error("model not found: {0}")]
    NotFound(ProcessModelId),
}

impl ModelError {
    /// The violations behind an `Invalid` error, empty otherwise
    pub fn violations(&self) -> &[ModelViolation] {
        match self {
            Self::Invalid { violations, .. } => violations,
            _ => &[],
        }
    }
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;
