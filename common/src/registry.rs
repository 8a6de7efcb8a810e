// Executor registry: maps a migration type to its executor
//
// Built once at startup and shared by Arc with the dispatcher and the API
// layer. Registration normally finishes before the first lookup, but the two
// may interleave safely.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, instrument};

use crate::errors::RegistryError;
use crate::executor::MigrationExecutor;
use crate::models::ExecutorDescriptor;

#[derive(Default)]
struct RegistryInner {
    executors: HashMap<String, Arc<dyn MigrationExecutor>>,
    order: Vec<String>,
}

/// ExecutorRegistry owns the set of known executors
#[derive(Default)]
pub struct ExecutorRegistry {
    inner: RwLock<RegistryInner>,
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("types", &self.types())
            .finish()
    }
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under its own `executor_type()`
    pub fn register(&self, executor: Arc<dyn MigrationExecutor>) -> Result<(), RegistryError> {
        let executor_type = executor.executor_type().to_string();
        self.register_as(executor_type, executor)
    }

    /// Register an executor under an explicit type key
    #[instrument(skip(self, executor))]
    pub fn register_as(
        &self,
        executor_type: String,
        executor: Arc<dyn MigrationExecutor>,
    ) -> Result<(), RegistryError> {
        let phases = executor.phases();
        if phases.is_empty() {
            return Err(RegistryError::NoPhases(executor_type));
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.executors.contains_key(&executor_type) {
            return Err(RegistryError::DuplicateType(executor_type));
        }

        inner.order.push(executor_type.clone());
        inner.executors.insert(executor_type.clone(), executor);

        info!(
            executor_type = %executor_type,
            phase_count = phases.len(),
            "Registered migration executor"
        );
        Ok(())
    }

    /// Resolve a type to the exact executor instance that was registered
    pub fn lookup(&self, executor_type: &str) -> Result<Arc<dyn MigrationExecutor>, RegistryError> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .executors
            .get(executor_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownType(executor_type.to_string()))
    }

    pub fn contains(&self, executor_type: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .executors
            .contains_key(executor_type)
    }

    /// Registered types in registration order
    pub fn types(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .clone()
    }

    /// Discovery metadata in registration order
    pub fn list_types(&self) -> Vec<ExecutorDescriptor> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .order
            .iter()
            .filter_map(|key| {
                inner.executors.get(key).map(|executor| ExecutorDescriptor {
                    executor_type: key.clone(),
                    phases: executor.phases(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
