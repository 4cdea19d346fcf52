//! Instance engine: the per-instance state machine
//!
//! The engine owns the authoritative state of every instance and is the only
//! component that mutates it. Each instance lives in its own slot behind an
//! async mutex, so calls on one instance serialize while calls on different
//! instances never wait on each other.
//!
//! A transition is prepared on a copy of the instance. Only after its audit
//! entry has been appended is the copy committed together with the task
//! changes. Any failure before that point leaves the instance untouched.

use crate::audit_recorder::{AuditQuery, AuditTrailRecorder};
use crate::error::{TransitionError, TransitionResult};
use crate::model_registry::ProcessModelRegistry;
use chrono::Utc;
use dashmap::DashMap;
use process_types::{
    ActorId, AttributeId, AttributeSchemaEngine, AttributeValue, AuditEntry, InstanceId,
    InstanceSummary, NextState, PendingMessage, ProcessInstance, ProcessModel, SchemaNode,
    State, StateKind, SubjectId, SubjectPosition, Task, TaskFilter, TaskId, TaskStatus,
    Transition, TransitionOption, ViolationReason,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

/// What an `advance` call did
#[derive(Clone, Debug, PartialEq)]
pub enum AdvanceOutcome {
    /// The transition was applied and recorded
    Applied {
        entry: AuditEntry,
        instance_completed: bool,
    },
    /// The subject sits in a RECEIVE state and the message it needs has not
    /// been sent yet. Nothing changed.
    AwaitingMessage { event: String },
}

impl AdvanceOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn entry(&self) -> Option<&AuditEntry> {
        match self {
            Self::Applied { entry, .. } => Some(entry),
            Self::AwaitingMessage { .. } => None,
        }
    }
}

// ── Instance slot ────────────────────────────────────────────────────

/// Everything the engine keeps for one instance. Guarded by the slot mutex.
pub(crate) struct InstanceSlot {
    pub(crate) model: Arc<ProcessModel>,
    pub(crate) instance: ProcessInstance,
    /// Current task per subject that has not reached END
    pub(crate) tasks: BTreeMap<SubjectId, Task>,
    attributes: Vec<SchemaNode>,
}

impl InstanceSlot {
    pub(crate) fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.values().find(|t| &t.id == id)
    }

    pub(crate) fn task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.values_mut().find(|t| &t.id == id)
    }

    fn open_task_count(&self) -> usize {
        self.tasks.values().filter(|t| t.is_open()).count()
    }

    fn build_task(&self, subject: &SubjectId, state: &State) -> Task {
        let options: Vec<TransitionOption> = state
            .transitions()
            .iter()
            .map(|t| TransitionOption::from_transition(t, self.is_available(subject, state, t)))
            .collect();
        let status = if state.kind() == StateKind::Receive
            && !options.iter().any(|o| o.available)
        {
            TaskStatus::Waiting
        } else {
            TaskStatus::Open
        };

        Task {
            id: TaskId::generate(),
            instance_id: self.instance.id.clone(),
            model: self.instance.model.clone(),
            subject_id: subject.clone(),
            state_id: state.id().clone(),
            state_kind: state.kind(),
            status,
            options,
            attributes: self.attributes.clone(),
            opened_at_version: self.instance.version,
            created_at: Utc::now(),
        }
    }

    /// RECEIVE transitions are only available once their message is pending
    fn is_available(&self, subject: &SubjectId, state: &State, transition: &Transition) -> bool {
        if state.kind() != StateKind::Receive {
            return true;
        }
        transition
            .event
            .as_deref()
            .is_some_and(|event| self.instance.has_message(event, subject))
    }

    /// Recompute availability of RECEIVE tasks after the mailbox changed.
    /// Claimed tasks keep their claim.
    fn refresh_receive_tasks(&mut self) {
        let model = self.model.clone();
        let mut updates = Vec::new();
        for (subject, task) in &self.tasks {
            if task.state_kind != StateKind::Receive {
                continue;
            }
            let Some(state) = model.state(subject, &task.state_id) else {
                continue;
            };
            let availability: Vec<bool> = state
                .transitions()
                .iter()
                .map(|t| self.is_available(subject, state, t))
                .collect();
            updates.push((subject.clone(), availability));
        }

        for (subject, availability) in updates {
            let Some(task) = self.tasks.get_mut(&subject) else {
                continue;
            };
            for (option, available) in task.options.iter_mut().zip(&availability) {
                option.available = *available;
            }
            let any = availability.iter().any(|a| *a);
            match task.status {
                TaskStatus::Waiting if any => {
                    task.status = TaskStatus::Open;
                    tracing::debug!(task_id = %task.id, subject = %subject, "Receive task ready");
                }
                TaskStatus::Open if !any => task.status = TaskStatus::Waiting,
                _ => {}
            }
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────

/// Drives process instances through their models
pub struct ProcessInstanceEngine {
    registry: Arc<ProcessModelRegistry>,
    audit: AuditTrailRecorder,
    schema: AttributeSchemaEngine,
    instances: DashMap<InstanceId, Arc<Mutex<InstanceSlot>>>,
    /// Which instance a task belongs to
    task_index: DashMap<TaskId, InstanceId>,
    /// Signalled whenever tasks are opened or released
    task_signal: Arc<Notify>,
}

impl ProcessInstanceEngine {
    pub fn new(registry: Arc<ProcessModelRegistry>, audit: AuditTrailRecorder) -> Self {
        let schema = AttributeSchemaEngine::new(registry.policy().clone());
        Self {
            registry,
            audit,
            schema,
            instances: DashMap::new(),
            task_index: DashMap::new(),
            task_signal: Arc::new(Notify::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ProcessModelRegistry> {
        &self.registry
    }

    pub fn audit(&self) -> &AuditTrailRecorder {
        &self.audit
    }

    // ── Instance lifecycle ───────────────────────────────────────────

    /// Start an instance of a registered model.
    ///
    /// Every subject is placed at its start state and gets its first task.
    /// `version = None` picks the latest registered version. Initial data is
    /// checked for shape and read-only rules; required attributes are only
    /// enforced once transitions are applied.
    pub async fn start(
        &self,
        model_name: &str,
        version: Option<u32>,
        initiator: ActorId,
        data: BTreeMap<AttributeId, AttributeValue>,
    ) -> TransitionResult<ProcessInstance> {
        let model = match version {
            Some(v) => self.registry.get(model_name, v),
            None => self.registry.latest(model_name),
        }
        .ok_or_else(|| TransitionError::ModelNotFound {
            name: model_name.to_string(),
            version,
        })?;

        let data: BTreeMap<AttributeId, AttributeValue> =
            data.into_iter().filter(|(_, v)| !v.is_null()).collect();
        if let Err(violations) = self.schema.validate(model.schema(), &data, &BTreeMap::new()) {
            let violations: Vec<_> = violations
                .into_iter()
                .filter(|v| v.reason != ViolationReason::Required)
                .collect();
            if !violations.is_empty() {
                tracing::warn!(model = %model.key(), violations = violations.len(), "Initial data rejected");
                return Err(TransitionError::SchemaViolation(violations));
            }
        }

        let mut slot = InstanceSlot {
            instance: ProcessInstance::new(&model, initiator, data),
            attributes: model.schema().describe(),
            tasks: BTreeMap::new(),
            model: model.clone(),
        };

        for subject in model.subjects() {
            let Some(start) = subject.start_state() else {
                continue;
            };
            if !start.kind().is_terminal() {
                let task = slot.build_task(subject.id(), start);
                slot.tasks.insert(subject.id().clone(), task);
            }
        }
        if slot.instance.all_subjects_terminated() {
            slot.instance.complete();
        }

        let instance = slot.instance.clone();
        for task in slot.tasks.values() {
            self.task_index.insert(task.id.clone(), instance.id.clone());
        }
        self.instances
            .insert(instance.id.clone(), Arc::new(Mutex::new(slot)));

        tracing::info!(
            instance_id = %instance.id,
            model = %instance.model,
            subjects = instance.positions.len(),
            "Process instance started"
        );
        self.task_signal.notify_waiters();

        Ok(instance)
    }

    /// Move `subject` of an instance along one transition.
    ///
    /// Rejections leave the instance exactly as it was. On success the
    /// subject's position, the instance data and version, the audit trail and
    /// the tasks change together.
    pub async fn advance(
        &self,
        instance_id: &InstanceId,
        subject: &SubjectId,
        next: NextState,
        actor: &ActorId,
    ) -> TransitionResult<AdvanceOutcome> {
        let slot = self.slot(instance_id)?;
        let mut slot = slot.lock().await;
        self.advance_locked(&mut slot, subject, next, actor).await
    }

    /// `advance` for a caller that already holds the instance lock
    pub(crate) async fn advance_locked(
        &self,
        slot: &mut InstanceSlot,
        subject: &SubjectId,
        next: NextState,
        actor: &ActorId,
    ) -> TransitionResult<AdvanceOutcome> {
        let instance_id = slot.instance.id.clone();
        let result = self.apply(slot, subject, next, actor).await;

        match &result {
            Ok(AdvanceOutcome::Applied {
                entry,
                instance_completed,
            }) => {
                tracing::info!(
                    instance_id = %instance_id,
                    subject = %subject,
                    from = %entry.from_state,
                    to = %entry.to_state,
                    sequence = entry.sequence,
                    actor = %actor,
                    "Transition applied"
                );
                if *instance_completed {
                    tracing::info!(instance_id = %instance_id, "Process instance completed");
                }
                self.task_signal.notify_waiters();
            }
            Ok(AdvanceOutcome::AwaitingMessage { event }) => {
                tracing::debug!(
                    instance_id = %instance_id,
                    subject = %subject,
                    event = %event,
                    "Waiting for message"
                );
            }
            Err(e) => {
                tracing::warn!(
                    instance_id = %instance_id,
                    subject = %subject,
                    error = %e,
                    "Transition rejected"
                );
            }
        }

        result
    }

    async fn apply(
        &self,
        slot: &mut InstanceSlot,
        subject: &SubjectId,
        next: NextState,
        actor: &ActorId,
    ) -> TransitionResult<AdvanceOutcome> {
        let current = &slot.instance;
        if !current.is_active() {
            return Err(TransitionError::InstanceClosed(current.id.clone()));
        }
        if let Some(expected) = next.expected_version {
            if expected != current.version {
                return Err(TransitionError::ConcurrentModification {
                    expected,
                    actual: current.version,
                });
            }
        }

        let position = current
            .position(subject)
            .ok_or_else(|| TransitionError::UnknownSubject(subject.clone()))?;
        let illegal = || TransitionError::IllegalTransition {
            subject: subject.clone(),
            from: position.state.clone(),
            to: next.target.clone(),
        };
        if position.is_terminated() {
            return Err(illegal());
        }

        let model = slot.model.clone();
        let source = model
            .state(subject, &position.state)
            .ok_or_else(illegal)?;

        // Pick the transition; a RECEIVE source also needs its message
        let mut consumed = None;
        let transition = if source.kind() == StateKind::Receive {
            let candidates: Vec<&Transition> = source
                .transitions()
                .iter()
                .filter(|t| {
                    t.target == next.target
                        && next
                            .event
                            .as_deref()
                            .map_or(true, |e| t.event.as_deref() == Some(e))
                })
                .collect();
            let Some(first) = candidates.first() else {
                return Err(illegal());
            };
            let ready = candidates.iter().find_map(|t| {
                let event = t.event.as_deref()?;
                current.find_message(event, subject).map(|idx| (*t, idx))
            });
            match ready {
                Some((t, idx)) => {
                    consumed = Some(idx);
                    t
                }
                None => {
                    return Ok(AdvanceOutcome::AwaitingMessage {
                        event: first.event.clone().unwrap_or_default(),
                    });
                }
            }
        } else {
            source
                .find_transition(&next.target, next.event.as_deref())
                .ok_or_else(illegal)?
        };

        let target = model
            .state(subject, &transition.target)
            .ok_or_else(illegal)?;

        // Candidate data: committed data with the updates merged in
        let mut data = current.data.clone();
        for (attribute, value) in next.updates {
            if value.is_null() {
                data.remove(&attribute);
            } else {
                data.insert(attribute, value);
            }
        }
        self.schema
            .validate(model.schema(), &data, &current.data)
            .map_err(TransitionError::SchemaViolation)?;

        // Prepare the successor on a copy
        let mut updated = current.clone();
        let from_state = position.state.clone();
        updated.data = data;
        updated.version += 1;
        updated.updated_at = Utc::now();
        updated.positions.insert(
            subject.clone(),
            SubjectPosition {
                state: target.id().clone(),
                kind: target.kind(),
            },
        );
        if let Some(idx) = consumed {
            let message = updated.mailbox.remove(idx);
            tracing::debug!(
                instance_id = %updated.id,
                event = %message.event,
                sender = %message.sender,
                receiver = %subject,
                "Message consumed"
            );
        }
        if source.kind() == StateKind::Send {
            if let Some(event) = &transition.event {
                updated.mailbox.push(PendingMessage {
                    event: event.clone(),
                    sender: subject.clone(),
                    emitted_at_version: updated.version,
                });
                tracing::debug!(instance_id = %updated.id, event = %event, sender = %subject, "Message emitted");
            }
        }
        if updated.all_subjects_terminated() {
            updated.complete();
        }

        let entry = AuditEntry {
            instance_id: updated.id.clone(),
            sequence: updated.version,
            subject_id: subject.clone(),
            from_state,
            to_state: target.id().clone(),
            event: transition.event.clone(),
            actor: actor.clone(),
            version: updated.version,
            timestamp: updated.updated_at,
        };

        // Append before committing: no entry, no transition
        self.audit
            .append(entry.clone())
            .await
            .map_err(|e| TransitionError::AuditUnavailable(e.to_string()))?;

        // Commit
        let instance_completed = updated.is_completed();
        slot.instance = updated;
        if let Some(old) = slot.tasks.remove(subject) {
            self.task_index.remove(&old.id);
            tracing::debug!(task_id = %old.id, subject = %subject, "Task closed");
        }
        if !target.kind().is_terminal() {
            let task = slot.build_task(subject, target);
            self.task_index.insert(task.id.clone(), slot.instance.id.clone());
            tracing::debug!(task_id = %task.id, subject = %subject, state = %task.state_id, "Task opened");
            slot.tasks.insert(subject.clone(), task);
        }
        slot.refresh_receive_tasks();

        Ok(AdvanceOutcome::Applied {
            entry,
            instance_completed,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Snapshot of an instance
    pub async fn instance(&self, instance_id: &InstanceId) -> TransitionResult<ProcessInstance> {
        let slot = self.slot(instance_id)?;
        let slot = slot.lock().await;
        Ok(slot.instance.clone())
    }

    pub async fn summary(&self, instance_id: &InstanceId) -> TransitionResult<InstanceSummary> {
        let slot = self.slot(instance_id)?;
        let slot = slot.lock().await;
        Ok(slot.instance.summary(slot.open_task_count()))
    }

    /// Summaries of every instance, oldest first
    pub async fn summaries(&self) -> Vec<InstanceSummary> {
        let mut summaries = Vec::new();
        for slot in self.slots() {
            let slot = slot.lock().await;
            summaries.push((slot.instance.created_at, slot.instance.summary(slot.open_task_count())));
        }
        summaries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        summaries.into_iter().map(|(_, s)| s).collect()
    }

    /// Current tasks of one instance, including waiting and claimed ones
    pub async fn tasks(&self, instance_id: &InstanceId) -> TransitionResult<Vec<Task>> {
        let slot = self.slot(instance_id)?;
        let slot = slot.lock().await;
        Ok(slot.tasks.values().cloned().collect())
    }

    /// Open tasks matching `filter`, across all instances
    pub async fn open_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        let slots = match &filter.instance_id {
            Some(id) => self.slot(id).into_iter().collect(),
            None => self.slots(),
        };
        let mut tasks = Vec::new();
        for slot in slots {
            let slot = slot.lock().await;
            tasks.extend(
                slot.tasks
                    .values()
                    .filter(|t| t.is_open() && filter.matches(t))
                    .cloned(),
            );
        }
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    /// The audit trail of an instance
    pub fn audit_trail(&self, instance_id: &InstanceId) -> AuditQuery {
        self.audit.query(instance_id)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    // ── Crate internals ──────────────────────────────────────────────

    pub(crate) fn slot(&self, instance_id: &InstanceId) -> TransitionResult<Arc<Mutex<InstanceSlot>>> {
        self.instances
            .get(instance_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| TransitionError::InstanceNotFound(instance_id.clone()))
    }

    /// All slots, cloned out so no map guard is held across an await
    pub(crate) fn slots(&self) -> Vec<Arc<Mutex<InstanceSlot>>> {
        self.instances.iter().map(|e| e.value().clone()).collect()
    }

    pub(crate) fn instance_of_task(&self, task_id: &TaskId) -> Option<InstanceId> {
        self.task_index.get(task_id).map(|i| i.value().clone())
    }

    pub(crate) fn task_signal(&self) -> &Arc<Notify> {
        &self.task_signal
    }
}

impl std::fmt::Debug for ProcessInstanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessInstanceEngine")
            .field("instances", &self.instances.len())
            .field("tasks", &self.task_index.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use process_types::{
        AttributeDefinition, ProcessModelBuilder, ScalarType, StateDefinition, StateId,
        SubjectDefinition, Transition,
    };

    fn engine_with(builder: ProcessModelBuilder) -> ProcessInstanceEngine {
        let registry = Arc::new(ProcessModelRegistry::default());
        registry.register(builder).unwrap();
        ProcessInstanceEngine::new(registry, AuditTrailRecorder::in_memory(16))
    }

    fn expense() -> ProcessModelBuilder {
        ProcessModelBuilder::new("Expense")
            .subject(SubjectDefinition::human("clerk").start("Enter"))
            .state("clerk", StateDefinition::function("Enter"))
            .state("clerk", StateDefinition::function("Check"))
            .state("clerk", StateDefinition::end("Filed"))
            .transition("clerk", Transition::new("Enter", "Check"))
            .transition("clerk", Transition::new("Check", "Filed"))
            .attribute(AttributeDefinition::simple("amount", ScalarType::Number).required())
            .attribute(AttributeDefinition::simple("reference", ScalarType::Text).read_only())
    }

    fn clerk() -> SubjectId {
        SubjectId::new("clerk")
    }

    fn alice() -> ActorId {
        ActorId::new("alice")
    }

    #[tokio::test]
    async fn test_start_opens_tasks() {
        let engine = engine_with(expense());
        let instance = engine
            .start("Expense", None, alice(), BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(instance.version, 0);
        let tasks = engine.tasks(&instance.id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].state_id, StateId::new("Enter"));
        assert!(tasks[0].is_open());
        assert_eq!(tasks[0].attributes.len(), 2);
    }

    #[tokio::test]
    async fn test_start_unknown_model() {
        let engine = engine_with(expense());
        let err = engine
            .start("Missing", Some(1), alice(), BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::ModelNotFound { .. }));
    }

    #[tokio::test]
    async fn test_advance_applies_and_records() {
        let engine = engine_with(expense());
        let instance = engine
            .start("Expense", None, alice(), BTreeMap::new())
            .await
            .unwrap();

        let outcome = engine
            .advance(
                &instance.id,
                &clerk(),
                NextState::to("Check").with_update("amount", AttributeValue::number(12.5)),
                &alice(),
            )
            .await
            .unwrap();
        let entry = outcome.entry().unwrap();
        assert_eq!(entry.sequence, 1);
        assert_eq!(entry.from_state, StateId::new("Enter"));
        assert_eq!(entry.to_state, StateId::new("Check"));

        let after = engine.instance(&instance.id).await.unwrap();
        assert_eq!(after.version, 1);
        assert_eq!(
            after.data.get(&AttributeId::new("amount")),
            Some(&AttributeValue::number(12.5))
        );
        let tasks = engine.tasks(&instance.id).await.unwrap();
        assert_eq!(tasks[0].state_id, StateId::new("Check"));
    }

    #[tokio::test]
    async fn test_illegal_transition_changes_nothing() {
        let engine = engine_with(expense());
        let instance = engine
            .start("Expense", None, alice(), BTreeMap::new())
            .await
            .unwrap();
        let tasks_before = engine.tasks(&instance.id).await.unwrap();

        let err = engine
            .advance(&instance.id, &clerk(), NextState::to("Filed"), &alice())
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::IllegalTransition { .. }));

        assert_eq!(engine.instance(&instance.id).await.unwrap(), instance);
        assert_eq!(engine.tasks(&instance.id).await.unwrap(), tasks_before);
        assert!(engine.audit_trail(&instance.id).collect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schema_violation_changes_nothing() {
        let engine = engine_with(expense());
        let instance = engine
            .start("Expense", None, alice(), BTreeMap::new())
            .await
            .unwrap();

        // amount is required and missing, reference has the wrong type
        let err = engine
            .advance(
                &instance.id,
                &clerk(),
                NextState::to("Check").with_update("reference", AttributeValue::integer(7)),
                &alice(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.violations().len(), 2);
        assert_eq!(engine.instance(&instance.id).await.unwrap(), instance);
    }

    #[tokio::test]
    async fn test_read_only_blocks_change() {
        let engine = engine_with(expense());
        let instance = engine
            .start(
                "Expense",
                None,
                alice(),
                BTreeMap::from([(AttributeId::new("reference"), AttributeValue::text("R-1"))]),
            )
            .await
            .unwrap();

        let err = engine
            .advance(
                &instance.id,
                &clerk(),
                NextState::to("Check")
                    .with_update("amount", AttributeValue::integer(3))
                    .with_update("reference", AttributeValue::text("R-2")),
                &alice(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.violations()[0].reason,
            ViolationReason::ReadOnly
        );
        assert_eq!(engine.instance(&instance.id).await.unwrap(), instance);
    }

    #[tokio::test]
    async fn test_stale_version_rejected() {
        let engine = engine_with(expense());
        let instance = engine
            .start("Expense", None, alice(), BTreeMap::new())
            .await
            .unwrap();

        let err = engine
            .advance(
                &instance.id,
                &clerk(),
                NextState::to("Check")
                    .with_update("amount", AttributeValue::integer(1))
                    .expecting_version(5),
                &alice(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::ConcurrentModification {
                expected: 5,
                actual: 0
            }
        );
    }

    #[tokio::test]
    async fn test_closed_instance_rejects_advance() {
        let engine = engine_with(expense());
        let instance = engine
            .start("Expense", None, alice(), BTreeMap::new())
            .await
            .unwrap();
        let amount = || NextState::to("Check").with_update("amount", AttributeValue::integer(1));

        engine.advance(&instance.id, &clerk(), amount(), &alice()).await.unwrap();
        let outcome = engine
            .advance(&instance.id, &clerk(), NextState::to("Filed"), &alice())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            AdvanceOutcome::Applied {
                instance_completed: true,
                ..
            }
        ));
        assert!(engine.tasks(&instance.id).await.unwrap().is_empty());

        let err = engine
            .advance(&instance.id, &clerk(), NextState::to("Check"), &alice())
            .await
            .unwrap_err();
        assert_eq!(err, TransitionError::InstanceClosed(instance.id.clone()));
    }

    #[tokio::test]
    async fn test_unknown_subject() {
        let engine = engine_with(expense());
        let instance = engine
            .start("Expense", None, alice(), BTreeMap::new())
            .await
            .unwrap();
        let err = engine
            .advance(&instance.id, &SubjectId::new("ghost"), NextState::to("Check"), &alice())
            .await
            .unwrap_err();
        assert_eq!(err, TransitionError::UnknownSubject(SubjectId::new("ghost")));
    }

    #[tokio::test]
    async fn test_summary_counts_open_tasks() {
        let engine = engine_with(expense());
        let instance = engine
            .start("Expense", None, alice(), BTreeMap::new())
            .await
            .unwrap();
        let summary = engine.summary(&instance.id).await.unwrap();
        assert_eq!(summary.open_tasks, 1);
        assert_eq!(summary.positions.get(&clerk()), Some(&StateId::new("Enter")));
        assert_eq!(engine.summaries().await.len(), 1);
    }
}
