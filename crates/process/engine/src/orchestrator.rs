//! Process Orchestrator: the main entry point for the process engine
//!
//! The orchestrator wires the components together from one
//! [`EngineConfig`]:
//! 1. Registers process models
//! 2. Starts instances and advances subjects
//! 3. Hands tasks to human actors
//! 4. Runs automated subjects through their providers
//! 5. Serves the audit trail
//!
//! All instance state lives in the [`ProcessInstanceEngine`]. The
//! orchestrator adds no state of its own beyond the automation shutdown
//! signal.

use crate::audit_recorder::{AuditQuery, AuditStore, AuditTrailRecorder, InMemoryAuditStore};
use crate::config::{AutomationMode, EngineConfig};
use crate::error::{DispatchResult, TransitionResult};
use crate::instance_engine::{AdvanceOutcome, ProcessInstanceEngine};
use crate::model_registry::ProcessModelRegistry;
use crate::provider::{ExecutionProvider, ProviderRegistry};
use crate::task_dispatcher::{AutomationWorker, TaskDispatcher};
use process_types::{
    ActorId, AttributeId, AttributeValue, InstanceId, InstanceSummary, ModelKey, ModelResult,
    NextState, ProcessInstance, ProcessModel, ProcessModelBuilder, SubjectId, Task, TaskFilter,
    TaskId,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// The process engine, assembled
pub struct ProcessOrchestrator {
    config: EngineConfig,
    registry: Arc<ProcessModelRegistry>,
    instances: Arc<ProcessInstanceEngine>,
    dispatcher: Arc<TaskDispatcher>,
    shutdown: watch::Sender<bool>,
}

impl ProcessOrchestrator {
    /// Orchestrator with in-memory audit storage and the configured providers
    pub fn new(config: EngineConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: EngineConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            audit_store: None,
            providers: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProcessModelRegistry> {
        &self.registry
    }

    pub fn instances(&self) -> &Arc<ProcessInstanceEngine> {
        &self.instances
    }

    pub fn dispatcher(&self) -> &Arc<TaskDispatcher> {
        &self.dispatcher
    }

    // ── Model Management ─────────────────────────────────────────────

    /// Validate and register a process model
    pub fn register_model(&self, builder: ProcessModelBuilder) -> ModelResult<Arc<ProcessModel>> {
        self.registry.register(builder)
    }

    pub fn get_model(&self, name: &str, version: u32) -> Option<Arc<ProcessModel>> {
        self.registry.get(name, version)
    }

    pub fn list_models(&self) -> Vec<ModelKey> {
        self.registry.list()
    }

    // ── Instance Lifecycle ───────────────────────────────────────────

    /// Start an instance of a model; `None` picks the latest version
    pub async fn start_instance(
        &self,
        model_name: &str,
        version: Option<u32>,
        initiator: ActorId,
        data: BTreeMap<AttributeId, AttributeValue>,
    ) -> TransitionResult<ProcessInstance> {
        self.instances
            .start(model_name, version, initiator, data)
            .await
    }

    /// Advance a subject directly, bypassing task claims
    pub async fn advance(
        &self,
        instance_id: &InstanceId,
        subject: &SubjectId,
        next: NextState,
        actor: &ActorId,
    ) -> TransitionResult<AdvanceOutcome> {
        self.instances.advance(instance_id, subject, next, actor).await
    }

    pub async fn get_instance(&self, instance_id: &InstanceId) -> TransitionResult<ProcessInstance> {
        self.instances.instance(instance_id).await
    }

    pub async fn list_instances(&self) -> Vec<InstanceSummary> {
        self.instances.summaries().await
    }

    // ── Tasks ────────────────────────────────────────────────────────

    pub async fn open_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        self.instances.open_tasks(filter).await
    }

    pub async fn fetch_task(
        &self,
        subject: &SubjectId,
        filter: &TaskFilter,
        actor: &ActorId,
    ) -> DispatchResult<Option<Task>> {
        self.dispatcher.fetch(subject, filter, actor).await
    }

    /// Long-poll for a task. Returns `None` on timeout or once `cancel`
    /// turns true.
    pub async fn fetch_task_wait(
        &self,
        subject: &SubjectId,
        filter: &TaskFilter,
        actor: &ActorId,
        timeout: Duration,
        cancel: watch::Receiver<bool>,
    ) -> DispatchResult<Option<Task>> {
        self.dispatcher
            .fetch_wait(subject, filter, actor, timeout, cancel)
            .await
    }

    pub async fn complete_task(
        &self,
        task_id: &TaskId,
        actor: &ActorId,
        next: NextState,
    ) -> DispatchResult<AdvanceOutcome> {
        self.dispatcher.complete(task_id, actor, next).await
    }

    // ── Audit ────────────────────────────────────────────────────────

    pub fn audit_trail(&self, instance_id: &InstanceId) -> AuditQuery {
        self.instances.audit_trail(instance_id)
    }

    // ── Automation ───────────────────────────────────────────────────

    /// Spawn the automation worker when the configuration asks for
    /// background mode. Must be called from within a tokio runtime.
    pub fn start_automation(&self) -> Option<JoinHandle<()>> {
        if self.config.automation.mode != AutomationMode::Background {
            tracing::debug!("Automation is manual, no worker started");
            return None;
        }
        let worker = AutomationWorker::new(
            self.dispatcher.clone(),
            self.config.automation.poll_interval(),
        );
        Some(worker.spawn(self.shutdown.subscribe()))
    }

    /// Execute every open automated task once
    pub async fn run_automation_once(&self) -> usize {
        self.dispatcher
            .run_pending_automated()
            .await
            .iter()
            .filter(|(_, result)| matches!(result, Ok(outcome) if outcome.is_applied()))
            .count()
    }

    /// Ask the automation worker to stop after its current pass
    pub fn shutdown(&self) {
        // Kept even with no worker subscribed, so later workers see it
        self.shutdown.send_replace(true);
        tracing::info!("Process orchestrator shutting down");
    }
}

impl std::fmt::Debug for ProcessOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessOrchestrator")
            .field("models", &self.registry.count())
            .field("instances", &self.instances.instance_count())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// Assembles a [`ProcessOrchestrator`]
pub struct OrchestratorBuilder {
    config: EngineConfig,
    audit_store: Option<Arc<dyn AuditStore>>,
    providers: Vec<Arc<dyn ExecutionProvider>>,
}

impl OrchestratorBuilder {
    /// Store audit entries somewhere other than memory
    pub fn with_audit_store(mut self, store: Arc<dyn AuditStore>) -> Self {
        self.audit_store = Some(store);
        self
    }

    /// Add a provider next to the configured ones; same name replaces
    pub fn with_provider(mut self, provider: Arc<dyn ExecutionProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn build(self) -> ProcessOrchestrator {
        let config = self.config;
        let registry = Arc::new(ProcessModelRegistry::new(config.schema.policy()));

        let store: Arc<dyn AuditStore> = match self.audit_store {
            Some(store) => store,
            None => Arc::new(InMemoryAuditStore::new()),
        };
        let audit = AuditTrailRecorder::new(store, config.audit.page_size);
        let instances = Arc::new(ProcessInstanceEngine::new(registry.clone(), audit));

        let mut providers = ProviderRegistry::from_config(&config.automation.providers);
        for provider in self.providers {
            providers.register(provider);
        }
        let dispatcher = Arc::new(TaskDispatcher::new(
            instances.clone(),
            providers,
            &config.dispatch,
        ));

        let (shutdown, _) = watch::channel(false);

        tracing::info!(
            max_depth = config.schema.max_depth,
            automation = ?config.automation.mode,
            providers = ?dispatcher.providers().names(),
            "Process orchestrator ready"
        );

        ProcessOrchestrator {
            config,
            registry,
            instances,
            dispatcher,
            shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AutomationConfig, ProviderConfig, ProviderStrategy};
    use process_types::{StateDefinition, StateId, SubjectDefinition, Transition};

    fn screening() -> ProcessModelBuilder {
        ProcessModelBuilder::new("Screening")
            .subject(SubjectDefinition::automated("scanner", "first-option").start("Scan"))
            .state("scanner", StateDefinition::function("Scan"))
            .state("scanner", StateDefinition::end("Clean"))
            .transition("scanner", Transition::new("Scan", "Clean"))
    }

    #[tokio::test]
    async fn test_manual_automation() {
        let orchestrator = ProcessOrchestrator::new(EngineConfig::default());
        orchestrator.register_model(screening()).unwrap();
        assert!(orchestrator.start_automation().is_none());

        let instance = orchestrator
            .start_instance("Screening", None, ActorId::system(), BTreeMap::new())
            .await
            .unwrap();

        // No provider configured under that name yet
        assert_eq!(orchestrator.run_automation_once().await, 0);
        assert!(orchestrator
            .get_instance(&instance.id)
            .await
            .unwrap()
            .is_active());
    }

    #[tokio::test]
    async fn test_worker_started_after_shutdown_stops() {
        let config = EngineConfig {
            automation: AutomationConfig {
                mode: AutomationMode::Background,
                poll_interval_ms: 10,
                ..Default::default()
            },
            ..Default::default()
        };
        let orchestrator = ProcessOrchestrator::new(config);
        orchestrator.shutdown();

        let worker = orchestrator.start_automation().expect("background mode");
        tokio::time::timeout(std::time::Duration::from_secs(5), worker)
            .await
            .expect("worker stops")
            .unwrap();
    }

    #[tokio::test]
    async fn test_configured_provider_completes_instance() {
        let config = EngineConfig {
            automation: AutomationConfig {
                providers: vec![ProviderConfig {
                    name: "first-option".into(),
                    strategy: ProviderStrategy::FirstOption,
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        let orchestrator = ProcessOrchestrator::new(config);
        orchestrator.register_model(screening()).unwrap();
        let instance = orchestrator
            .start_instance("Screening", None, ActorId::system(), BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(orchestrator.run_automation_once().await, 1);

        let instance = orchestrator.get_instance(&instance.id).await.unwrap();
        assert!(instance.is_completed());
        let trail = orchestrator.audit_trail(&instance.id).collect().await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].to_state, StateId::new("Clean"));
        assert_eq!(trail[0].actor, ActorId::provider("first-option"));
    }
}
