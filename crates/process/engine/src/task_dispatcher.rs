//! Task dispatcher: hands tasks to actors and completes them
//!
//! Claims are made under the instance lock, so a task is held by at most one
//! actor at a time. Completing a task delegates to the instance engine while
//! still holding that lock.
//!
//! Automated subjects are resolved by their execution provider. The provider
//! runs outside the instance lock with the task claimed in its name; if it
//! fails, the claim is dropped and the task is left open for a retry.

use crate::config::DispatchConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::instance_engine::{AdvanceOutcome, InstanceSlot, ProcessInstanceEngine};
use crate::provider::ProviderRegistry;
use chrono::Utc;
use process_types::{ActorId, SubjectId, SubjectKind, Task, TaskFilter, TaskId, TaskStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tracing::{debug, error, info, warn};

/// Parameters added to every provider call
pub const INSTANCE_ID_PARAM: &str = "instance_id";
pub const SUBJECT_ID_PARAM: &str = "subject_id";
pub const STATE_ID_PARAM: &str = "state_id";

/// Offers tasks to actors and routes completions to the instance engine
pub struct TaskDispatcher {
    engine: Arc<ProcessInstanceEngine>,
    providers: ProviderRegistry,
    max_long_poll: Duration,
}

impl TaskDispatcher {
    pub fn new(
        engine: Arc<ProcessInstanceEngine>,
        providers: ProviderRegistry,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            engine,
            providers,
            max_long_poll: config.max_long_poll(),
        }
    }

    pub fn engine(&self) -> &Arc<ProcessInstanceEngine> {
        &self.engine
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    // ── Fetching ─────────────────────────────────────────────────────

    /// Claim the first open task of `subject` that matches `filter`.
    ///
    /// Never blocks on other actors. Naming a task in the filter that
    /// someone else holds fails with [`DispatchError::AlreadyClaimed`];
    /// fetching a task the caller already holds returns it again.
    pub async fn fetch(
        &self,
        subject: &SubjectId,
        filter: &TaskFilter,
        actor: &ActorId,
    ) -> DispatchResult<Option<Task>> {
        if let Some(task_id) = &filter.task_id {
            return self.fetch_by_id(task_id, subject, filter, actor).await;
        }

        let slots = match &filter.instance_id {
            Some(id) => self.engine.slot(id).into_iter().collect(),
            None => self.engine.slots(),
        };

        for slot in slots {
            let mut slot = slot.lock().await;
            let candidate = slot
                .tasks
                .values_mut()
                .find(|t| &t.subject_id == subject && t.is_open() && filter.matches(t));
            if let Some(task) = candidate {
                claim(task, actor);
                return Ok(Some(task.clone()));
            }
        }

        Ok(None)
    }

    async fn fetch_by_id(
        &self,
        task_id: &TaskId,
        subject: &SubjectId,
        filter: &TaskFilter,
        actor: &ActorId,
    ) -> DispatchResult<Option<Task>> {
        let Some(instance_id) = self.engine.instance_of_task(task_id) else {
            return Ok(None);
        };
        let slot = self.engine.slot(&instance_id)?;
        let mut slot = slot.lock().await;
        let Some(task) = slot.task_mut(task_id) else {
            return Ok(None);
        };
        if &task.subject_id != subject || !filter.matches(task) {
            return Ok(None);
        }

        match &task.status {
            TaskStatus::Open => {
                claim(task, actor);
                Ok(Some(task.clone()))
            }
            TaskStatus::Claimed { by, .. } if by == actor => Ok(Some(task.clone())),
            TaskStatus::Claimed { by, .. } => Err(DispatchError::AlreadyClaimed {
                task: task_id.clone(),
                holder: by.clone(),
            }),
            TaskStatus::Waiting | TaskStatus::Closed => Ok(None),
        }
    }

    /// Long-poll variant of [`fetch`](Self::fetch).
    ///
    /// Waits until a matching task opens, `timeout` elapses (capped by the
    /// configured maximum) or `cancel` turns true. Returns `None` on timeout
    /// or cancellation without claiming anything.
    pub async fn fetch_wait(
        &self,
        subject: &SubjectId,
        filter: &TaskFilter,
        actor: &ActorId,
        timeout: Duration,
        mut cancel: watch::Receiver<bool>,
    ) -> DispatchResult<Option<Task>> {
        let deadline = Instant::now() + timeout.min(self.max_long_poll);
        let signal = self.engine.task_signal().clone();

        loop {
            if *cancel.borrow() {
                return Ok(None);
            }

            // Register for wakeups before looking, so nothing slips in between
            let notified = signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = self.fetch(subject, filter, actor).await? {
                return Ok(Some(task));
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(subject = %subject, actor = %actor, "Long poll timed out");
                    return Ok(None);
                }
                _ = cancelled(&mut cancel) => {
                    debug!(subject = %subject, actor = %actor, "Long poll cancelled");
                    return Ok(None);
                }
            }
        }
    }

    // ── Claims ───────────────────────────────────────────────────────

    /// Claim a specific task
    pub async fn claim(&self, task_id: &TaskId, actor: &ActorId) -> DispatchResult<Task> {
        let slot = self.slot_of(task_id)?;
        let mut slot = slot.lock().await;
        let task = slot
            .task_mut(task_id)
            .ok_or_else(|| DispatchError::TaskNotFound(task_id.clone()))?;

        match &task.status {
            TaskStatus::Open => {
                claim(task, actor);
                Ok(task.clone())
            }
            TaskStatus::Claimed { by, .. } if by == actor => Ok(task.clone()),
            TaskStatus::Claimed { by, .. } => Err(DispatchError::AlreadyClaimed {
                task: task_id.clone(),
                holder: by.clone(),
            }),
            TaskStatus::Waiting | TaskStatus::Closed => Err(DispatchError::NotReady {
                task: task_id.clone(),
            }),
        }
    }

    /// Give a claimed task back
    pub async fn release(&self, task_id: &TaskId, actor: &ActorId) -> DispatchResult<Task> {
        let slot = self.slot_of(task_id)?;
        let mut slot = slot.lock().await;
        let task = unclaim(&mut slot, task_id, actor)?;
        self.engine.task_signal().notify_waiters();
        Ok(task)
    }

    // ── Completion ───────────────────────────────────────────────────

    /// Resolve a task by moving its subject to `next`.
    ///
    /// A task claimed by another actor cannot be completed. An unclaimed
    /// open task may be completed directly.
    pub async fn complete(
        &self,
        task_id: &TaskId,
        actor: &ActorId,
        next: process_types::NextState,
    ) -> DispatchResult<AdvanceOutcome> {
        let slot = self.slot_of(task_id)?;
        let mut slot = slot.lock().await;
        let task = slot
            .task(task_id)
            .ok_or_else(|| DispatchError::TaskNotFound(task_id.clone()))?;
        if let Some(holder) = task.status.holder() {
            if holder != actor {
                return Err(DispatchError::AlreadyClaimed {
                    task: task_id.clone(),
                    holder: holder.clone(),
                });
            }
        }
        let subject = task.subject_id.clone();

        let outcome = self
            .engine
            .advance_locked(&mut slot, &subject, next, actor)
            .await?;
        if outcome.is_applied() {
            debug!(task_id = %task_id, actor = %actor, "Task completed");
        }
        Ok(outcome)
    }

    // ── Automation ───────────────────────────────────────────────────

    /// Run the provider of an automated task and apply its answer.
    ///
    /// On provider failure the task is released unchanged and the failure is
    /// returned as [`DispatchError::ProviderExecution`].
    pub async fn execute_automated(&self, task_id: &TaskId) -> DispatchResult<AdvanceOutcome> {
        let slot_ref = self.slot_of(task_id)?;

        let (task, provider, actor, claimed_at_version, mut parameters) = {
            let mut slot = slot_ref.lock().await;
            let model = slot.model.clone();
            let task = slot
                .task_mut(task_id)
                .ok_or_else(|| DispatchError::TaskNotFound(task_id.clone()))?;
            let subject = model
                .subject(&task.subject_id)
                .ok_or_else(|| DispatchError::NotAutomated(task.subject_id.clone()))?;
            let SubjectKind::Automated {
                provider,
                parameters,
            } = subject.kind()
            else {
                return Err(DispatchError::NotAutomated(task.subject_id.clone()));
            };
            let provider = self
                .providers
                .get(provider)
                .ok_or_else(|| DispatchError::ProviderNotFound(provider.clone()))?;
            let actor = ActorId::provider(provider.name());

            match &task.status {
                TaskStatus::Open => claim(task, &actor),
                TaskStatus::Claimed { by, .. } => {
                    return Err(DispatchError::AlreadyClaimed {
                        task: task_id.clone(),
                        holder: by.clone(),
                    })
                }
                TaskStatus::Waiting | TaskStatus::Closed => {
                    return Err(DispatchError::NotReady {
                        task: task_id.clone(),
                    })
                }
            }
            let task = task.clone();
            let version = slot.instance.version;
            (task, provider, actor, version, parameters.clone())
        };

        parameters.insert(INSTANCE_ID_PARAM.into(), task.instance_id.to_string());
        parameters.insert(SUBJECT_ID_PARAM.into(), task.subject_id.to_string());
        parameters.insert(STATE_ID_PARAM.into(), task.state_id.to_string());

        let mut next = match provider.execute_task(&parameters, &task).await {
            Ok(next) => next,
            Err(e) => {
                warn!(
                    task_id = %task_id,
                    provider = %provider.name(),
                    error = %e,
                    "Provider execution failed"
                );
                let mut slot = slot_ref.lock().await;
                self.give_back(&mut slot, task_id, &actor);
                return Err(DispatchError::ProviderExecution {
                    provider: provider.name().to_string(),
                    message: e.message,
                });
            }
        };

        let mut slot = slot_ref.lock().await;

        // The subject may have moved while the provider ran
        match slot.task(task_id) {
            Some(current) if current.status.holder() == Some(&actor) => {}
            Some(_) => {
                warn!(task_id = %task_id, actor = %actor, "Provider lost its claim");
                return Err(DispatchError::NotReady {
                    task: task_id.clone(),
                });
            }
            None => {
                warn!(task_id = %task_id, actor = %actor, "Task closed while provider ran");
                return Err(DispatchError::TaskNotFound(task_id.clone()));
            }
        }
        if next.expected_version.is_none() {
            next = next.expecting_version(claimed_at_version);
        }

        let result = self
            .engine
            .advance_locked(&mut slot, &task.subject_id, next, &actor)
            .await;
        if !matches!(result, Ok(AdvanceOutcome::Applied { .. })) {
            self.give_back(&mut slot, task_id, &actor);
        }
        Ok(result?)
    }

    /// Drop a provider's claim after a failed run
    fn give_back(&self, slot: &mut InstanceSlot, task_id: &TaskId, actor: &ActorId) {
        match unclaim(slot, task_id, actor) {
            Ok(_) => self.engine.task_signal().notify_waiters(),
            Err(e) => warn!(
                task_id = %task_id,
                actor = %actor,
                error = %e,
                "Could not release task"
            ),
        }
    }

    /// Execute every open task of an automated subject once.
    pub async fn run_pending_automated(&self) -> Vec<(TaskId, DispatchResult<AdvanceOutcome>)> {
        let mut results = Vec::new();
        for task in self.engine.open_tasks(&TaskFilter::any()).await {
            if !self.is_automated(&task) {
                continue;
            }
            let result = self.execute_automated(&task.id).await;
            results.push((task.id, result));
        }
        results
    }

    fn is_automated(&self, task: &Task) -> bool {
        self.engine
            .registry()
            .get(&task.model.name, task.model.version)
            .and_then(|model| {
                model
                    .subject(&task.subject_id)
                    .map(|s| s.is_automated())
            })
            .unwrap_or(false)
    }

    fn slot_of(&self, task_id: &TaskId) -> DispatchResult<Arc<Mutex<InstanceSlot>>> {
        let instance_id = self
            .engine
            .instance_of_task(task_id)
            .ok_or_else(|| DispatchError::TaskNotFound(task_id.clone()))?;
        Ok(self.engine.slot(&instance_id)?)
    }
}

impl std::fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("providers", &self.providers)
            .field("max_long_poll", &self.max_long_poll)
            .finish_non_exhaustive()
    }
}

fn claim(task: &mut Task, actor: &ActorId) {
    task.status = TaskStatus::Claimed {
        by: actor.clone(),
        at: Utc::now(),
    };
    debug!(task_id = %task.id, actor = %actor, "Task claimed");
}

/// Drop `actor`'s claim; the task goes back to open, or waiting if its
/// message is no longer pending.
fn unclaim(slot: &mut InstanceSlot, task_id: &TaskId, actor: &ActorId) -> DispatchResult<Task> {
    let task = slot
        .task_mut(task_id)
        .ok_or_else(|| DispatchError::TaskNotFound(task_id.clone()))?;
    if task.status.holder() != Some(actor) {
        return Err(DispatchError::NotClaimant {
            task: task_id.clone(),
            actor: actor.clone(),
        });
    }
    task.status = if task.available_options().next().is_some() {
        TaskStatus::Open
    } else {
        TaskStatus::Waiting
    };
    debug!(task_id = %task_id, actor = %actor, "Task released");
    Ok(task.clone())
}

/// Resolves once the flag turns true. A dropped sender never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ── Automation worker ────────────────────────────────────────────────

/// Background loop that executes automated tasks.
///
/// # Lifecycle
///
/// 1. Wait for the next tick of `poll_interval`
/// 2. Execute every open automated task once
/// 3. Log failures; failed tasks stay open for the next tick
/// 4. Repeat until the shutdown signal turns true
pub struct AutomationWorker {
    dispatcher: Arc<TaskDispatcher>,
    poll_interval: Duration,
}

impl AutomationWorker {
    pub fn new(dispatcher: Arc<TaskDispatcher>, poll_interval: Duration) -> Self {
        Self {
            dispatcher,
            poll_interval,
        }
    }

    /// Run until `shutdown` turns true. The current pass finishes first.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let poll_interval_ms = self.poll_interval.as_millis() as u64;
        if *shutdown.borrow_and_update() {
            info!("Shutdown already requested, automation worker not started");
            return;
        }
        info!(poll_interval_ms, "Automation worker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_once().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Automation worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run_once(&self) {
        let mut by_outcome: HashMap<&'static str, usize> = HashMap::new();
        for (task_id, result) in self.dispatcher.run_pending_automated().await {
            let key = match &result {
                Ok(AdvanceOutcome::Applied { .. }) => "applied",
                Ok(AdvanceOutcome::AwaitingMessage { .. }) => "waiting",
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "Automated task failed");
                    "failed"
                }
            };
            *by_outcome.entry(key).or_default() += 1;
        }
        if !by_outcome.is_empty() {
            debug!(?by_outcome, "Automation pass finished");
        }
    }
}
