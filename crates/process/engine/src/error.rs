//! Runtime error types

use process_types::{ActorId, InstanceId, SchemaViolation, StateId, SubjectId, TaskId};
use thiserror::Error;

/// Errors raised while applying a transition to an instance
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransitionError {
    #[error("model not found: {name} (version {})", show_version(.version))]
    ModelNotFound { name: String, version: Option<u32> },

    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    #[error("instance {0} is closed")]
    InstanceClosed(InstanceId),

    #[error("subject '{0}' is not part of the model")]
    UnknownSubject(SubjectId),

    #[error("subject '{subject}' cannot move from '{from}' to '{to}'")]
    IllegalTransition {
        subject: SubjectId,
        from: StateId,
        to: StateId,
    },

    #[error("{} attribute violation(s): {}", .0.len(), join_violations(.0))]
    SchemaViolation(Vec<SchemaViolation>),

    #[error("instance changed concurrently (expected version {expected}, found {actual})")]
    ConcurrentModification { expected: u64, actual: u64 },

    #[error("audit trail unavailable: {0}")]
    AuditUnavailable(String),
}

impl TransitionError {
    /// The individual attribute violations, empty for other errors
    pub fn violations(&self) -> &[SchemaViolation] {
        match self {
            Self::SchemaViolation(v) => v,
            _ => &[],
        }
    }
}

fn show_version(version: &Option<u32>) -> String {
    version.map_or_else(|| "latest".to_string(), |v| v.to_string())
}

fn join_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for instance operations
pub type TransitionResult<T> = Result<T, TransitionError>;

/// Errors raised by the task dispatcher
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("task {task} is already claimed by {holder}")]
    AlreadyClaimed { task: TaskId, holder: ActorId },

    #[error("task {task} is not claimed by {actor}")]
    NotClaimant { task: TaskId, actor: ActorId },

    #[error("task {task} is not open")]
    NotReady { task: TaskId },

    #[error("subject '{0}' is not automated")]
    NotAutomated(SubjectId),

    #[error("no execution provider named '{0}'")]
    ProviderNotFound(String),

    #[error("provider '{provider}' failed: {message}")]
    ProviderExecution { provider: String, message: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors raised by an audit store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit storage unavailable: {0}")]
    Unavailable(String),

    #[error("instance {instance}: expected sequence {expected}, got {actual}")]
    OutOfOrder {
        instance: InstanceId,
        expected: u64,
        actual: u64,
    },
}

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;

/// Failure reported by an execution provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
