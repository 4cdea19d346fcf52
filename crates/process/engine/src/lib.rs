//! Process Engine Runtime
//!
//! The runtime executes subject-oriented process models. It registers
//! models, drives instances through their subjects' state machines, hands
//! tasks to people and providers, and records every applied transition.
//!
//! # Key Principle
//!
//! **Only the instance engine mutates an instance.**
//!
//! The dispatcher, providers and the orchestrator all go through it, and
//! every change it makes is either applied whole (with its audit entry) or
//! not at all.
//!
//! # Architecture
//!
//! The [`ProcessOrchestrator`] composes specialized components:
//!
//! - [`ProcessModelRegistry`]: Validates and stores immutable models
//! - [`ProcessInstanceEngine`]: Owns instance state and applies transitions
//! - [`TaskDispatcher`]: Claims, long-polls and completes tasks
//! - [`ProviderRegistry`]: Execution providers for automated subjects
//! - [`AuditTrailRecorder`]: Append-only history of applied transitions
//!
//! # Example
//!
//! ```rust
//! use process_engine::{EngineConfig, ProcessOrchestrator};
//! use process_types::*;
//! use std::collections::BTreeMap;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = ProcessOrchestrator::new(EngineConfig::default());
//!
//! orchestrator.register_model(
//!     ProcessModelBuilder::new("Leave")
//!         .subject(SubjectDefinition::human("employee").start("Request"))
//!         .state("employee", StateDefinition::function("Request"))
//!         .state("employee", StateDefinition::end("Done"))
//!         .transition("employee", Transition::new("Request", "Done")),
//! )?;
//!
//! let instance = orchestrator
//!     .start_instance("Leave", None, ActorId::new("ann"), BTreeMap::new())
//!     .await?;
//!
//! let task = orchestrator
//!     .fetch_task(&SubjectId::new("employee"), &TaskFilter::any(), &ActorId::new("ann"))
//!     .await?
//!     .expect("task is open");
//! orchestrator
//!     .complete_task(&task.id, &ActorId::new("ann"), NextState::to("Done"))
//!     .await?;
//!
//! assert!(orchestrator.get_instance(&instance.id).await?.is_completed());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod audit_recorder;
pub mod config;
pub mod error;
pub mod instance_engine;
pub mod model_registry;
pub mod orchestrator;
pub mod provider;
pub mod task_dispatcher;
pub mod telemetry;

// Re-export main types
pub use audit_recorder::{AuditQuery, AuditStore, AuditTrailRecorder, InMemoryAuditStore};
pub use config::EngineConfig;
pub use error::{
    AuditError, AuditResult, DispatchError, DispatchResult, ProviderError, TransitionError,
    TransitionResult,
};
pub use instance_engine::{AdvanceOutcome, ProcessInstanceEngine};
pub use model_registry::ProcessModelRegistry;
pub use orchestrator::{OrchestratorBuilder, ProcessOrchestrator};
pub use provider::{
    ExecutionProvider, FirstOptionProvider, InMemoryResourceService, ParameterDrivenProvider,
    ProviderRegistry, ResourceService,
};
pub use task_dispatcher::{AutomationWorker, TaskDispatcher};
pub use telemetry::init_tracing;
