//! Model registry: validates and stores process models
//!
//! Models are immutable once registered. To change a model, register a new
//! version. Registration either stores the whole model or nothing.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use process_types::{
    ModelError, ModelKey, ModelResult, ProcessModel, ProcessModelBuilder, ProcessModelId,
    SchemaPolicy,
};
use std::sync::Arc;

/// Registry of process models, addressed by (name, version)
#[derive(Debug)]
pub struct ProcessModelRegistry {
    models: DashMap<ModelKey, Arc<ProcessModel>>,
    by_id: DashMap<ProcessModelId, ModelKey>,
    policy: SchemaPolicy,
}

impl ProcessModelRegistry {
    pub fn new(policy: SchemaPolicy) -> Self {
        Self {
            models: DashMap::new(),
            by_id: DashMap::new(),
            policy,
        }
    }

    /// Validate and register a model.
    ///
    /// Every violation is reported in [`ModelError::Invalid`]. A (name,
    /// version) pair that is already taken yields [`ModelError::Conflict`].
    pub fn register(&self, builder: ProcessModelBuilder) -> ModelResult<Arc<ProcessModel>> {
        let key = builder.key();
        if self.models.contains_key(&key) {
            tracing::warn!(model = %key, "Model already registered");
            return Err(ModelError::Conflict {
                name: key.name,
                version: key.version,
            });
        }

        let model = match builder.build(&self.policy) {
            Ok(model) => Arc::new(model),
            Err(e) => {
                tracing::warn!(
                    model = %key,
                    violations = e.violations().len(),
                    error = %e,
                    "Model rejected"
                );
                return Err(e);
            }
        };

        // Re-check under the shard lock: two registrations may race
        match self.models.entry(key.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!(model = %key, "Model already registered");
                Err(ModelError::Conflict {
                    name: key.name,
                    version: key.version,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(model.clone());
                self.by_id.insert(model.id().clone(), key.clone());
                tracing::info!(
                    model = %key,
                    model_id = %model.id(),
                    subjects = model.subjects().len(),
                    states = model.state_count(),
                    "Process model registered"
                );
                Ok(model)
            }
        }
    }

    /// Get a model by name and version
    pub fn get(&self, name: &str, version: u32) -> Option<Arc<ProcessModel>> {
        self.models
            .get(&ModelKey::new(name, version))
            .map(|m| m.value().clone())
    }

    /// Get a model by id
    pub fn get_by_id(&self, id: &ProcessModelId) -> ModelResult<Arc<ProcessModel>> {
        self.by_id
            .get(id)
            .and_then(|key| self.models.get(key.value()).map(|m| m.value().clone()))
            .ok_or_else(|| ModelError::NotFound(id.clone()))
    }

    /// Highest registered version of a model
    pub fn latest(&self, name: &str) -> Option<Arc<ProcessModel>> {
        self.models
            .iter()
            .filter(|entry| entry.key().name == name)
            .max_by_key(|entry| entry.key().version)
            .map(|entry| entry.value().clone())
    }

    /// All registered versions of a model, oldest first
    pub fn versions(&self, name: &str) -> Vec<u32> {
        let mut versions: Vec<u32> = self
            .models
            .iter()
            .filter(|entry| entry.key().name == name)
            .map(|entry| entry.key().version)
            .collect();
        versions.sort_unstable();
        versions
    }

    /// Keys of every registered model
    pub fn list(&self) -> Vec<ModelKey> {
        let mut keys: Vec<ModelKey> = self.models.iter().map(|e| e.key().clone()).collect();
        keys.sort_by(|a, b| a.name.cmp(&b.name).then(a.version.cmp(&b.version)));
        keys
    }

    pub fn count(&self) -> usize {
        self.models.len()
    }

    pub fn policy(&self) -> &SchemaPolicy {
        &self.policy
    }
}

impl Default for ProcessModelRegistry {
    fn default() -> Self {
        Self::new(SchemaPolicy::default())
    }
}
