//! Execution providers: automated actors that resolve tasks
//!
//! An automated subject names a provider. When one of its tasks is open the
//! dispatcher hands the subject's parameters and the task to the provider,
//! which answers with the [`NextState`] to take. Providers never touch
//! instance state themselves.

use crate::config::{ProviderConfig, ProviderStrategy};
use crate::error::ProviderError;
use async_trait::async_trait;
use process_types::{AttributeValue, NextState, Resource, Task};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Parameter naming the target state for [`ParameterDrivenProvider`]
pub const NEXT_STATE_PARAM: &str = "next_state";
/// Parameter naming the event for [`ParameterDrivenProvider`]
pub const EVENT_PARAM: &str = "event";
/// Prefix of parameters turned into text attribute updates
pub const SET_PARAM_PREFIX: &str = "set.";

/// An automated actor.
///
/// # Results
///
/// | Result | Meaning |
/// |--------|---------|
/// | `Ok(next)` | Take `next`; the dispatcher completes the task with it |
/// | `Err(_)` | The task stays open and unclaimed for a later retry |
#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn execute_task(
        &self,
        parameters: &HashMap<String, String>,
        task: &Task,
    ) -> Result<NextState, ProviderError>;

    /// Artifacts attached to this provider, if it keeps any
    fn resources(&self) -> Option<Arc<dyn ResourceService>> {
        None
    }
}

// ── Resources ────────────────────────────────────────────────────────

/// Artifacts a provider works with
#[async_trait]
pub trait ResourceService: Send + Sync {
    async fn list_resources(&self) -> Vec<Resource>;

    /// Fails if a resource with the same name exists
    async fn add_resource(&self, resource: Resource) -> Result<(), ProviderError>;
}

/// In-memory resource service
#[derive(Debug, Default)]
pub struct InMemoryResourceService {
    resources: RwLock<Vec<Resource>>,
}

impl InMemoryResourceService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceService for InMemoryResourceService {
    async fn list_resources(&self) -> Vec<Resource> {
        self.resources.read().await.clone()
    }

    async fn add_resource(&self, resource: Resource) -> Result<(), ProviderError> {
        let mut resources = self.resources.write().await;
        if resources.iter().any(|r| r.name == resource.name) {
            return Err(ProviderError::new(format!(
                "resource '{}' already exists",
                resource.name
            )));
        }
        resources.push(resource);
        Ok(())
    }
}

// ── Built-in providers ───────────────────────────────────────────────

/// Takes the first transition that is available right now
pub struct FirstOptionProvider {
    name: String,
    resources: Option<Arc<dyn ResourceService>>,
}

impl FirstOptionProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: None,
        }
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceService>) -> Self {
        self.resources = Some(resources);
        self
    }
}

#[async_trait]
impl ExecutionProvider for FirstOptionProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute_task(
        &self,
        _parameters: &HashMap<String, String>,
        task: &Task,
    ) -> Result<NextState, ProviderError> {
        task.available_options()
            .next()
            .map(|option| option.to_next_state())
            .ok_or_else(|| {
                ProviderError::new(format!(
                    "no available transition from '{}'",
                    task.state_id
                ))
            })
    }

    fn resources(&self) -> Option<Arc<dyn ResourceService>> {
        self.resources.clone()
    }
}

/// Takes the transition named by the `next_state` parameter.
///
/// `event` selects among transitions to the same target. Parameters named
/// `set.<attribute>` become text updates of that attribute.
pub struct ParameterDrivenProvider {
    name: String,
}

impl ParameterDrivenProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ExecutionProvider for ParameterDrivenProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute_task(
        &self,
        parameters: &HashMap<String, String>,
        task: &Task,
    ) -> Result<NextState, ProviderError> {
        let target = parameters
            .get(NEXT_STATE_PARAM)
            .ok_or_else(|| ProviderError::new(format!("missing '{NEXT_STATE_PARAM}' parameter")))?;
        let event = parameters.get(EVENT_PARAM).map(String::as_str);

        let option = task
            .options
            .iter()
            .find(|o| o.target.0 == *target && event.map_or(true, |e| o.event.as_deref() == Some(e)))
            .ok_or_else(|| {
                ProviderError::new(format!(
                    "'{}' is not a legal next state from '{}'",
                    target, task.state_id
                ))
            })?;

        let mut next = option.to_next_state();
        for (key, value) in parameters {
            if let Some(attribute) = key.strip_prefix(SET_PARAM_PREFIX) {
                next = next.with_update(attribute, AttributeValue::text(value.clone()));
            }
        }
        Ok(next)
    }
}

// ── Registry ─────────────────────────────────────────────────────────

/// Providers by name, resolved once at startup
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ExecutionProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate the configured built-in strategies
    pub fn from_config(configs: &[ProviderConfig]) -> Self {
        let mut registry = Self::new();
        for config in configs {
            let provider: Arc<dyn ExecutionProvider> = match config.strategy {
                ProviderStrategy::FirstOption => Arc::new(FirstOptionProvider::new(&config.name)),
                ProviderStrategy::ParameterDriven => {
                    Arc::new(ParameterDrivenProvider::new(&config.name))
                }
            };
            tracing::info!(provider = %config.name, strategy = ?config.strategy, "Execution provider registered");
            registry.register(provider);
        }
        registry
    }

    /// Register a provider, replacing any with the same name
    pub fn register(&mut self, provider: Arc<dyn ExecutionProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn with_provider(mut self, provider: Arc<dyn ExecutionProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExecutionProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
