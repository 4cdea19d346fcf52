//! Audit entries: the append-only record of applied transitions

use crate::{ActorId, InstanceId, StateId, SubjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One applied transition.
///
/// Sequences start at 1 and are dense per instance. Entries are never
/// modified once appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub instance_id: InstanceId,
    pub sequence: u64,
    pub subject_id: SubjectId,
    pub from_state: StateId,
    pub to_state: StateId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub actor: ActorId,
    /// Instance version after the transition
    pub version: u64,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// `from -> to` for log lines
    pub fn describe(&self) -> String {
        format!(
            "{}: {} -> {}",
            self.subject_id, self.from_state, self.to_state
        )
    }
}
