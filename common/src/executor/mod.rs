// Executor module for migration execution
// Provides the capability trait every migration path implements, plus the
// built-in executors

pub mod http_export;

use crate::errors::{ExecutionError, ExecutorFault};
use crate::job::MigrationJob;
use crate::models::{ExecutorDescriptor, MigrationConfig, ValidationResult};
use async_trait::async_trait;

/// MigrationExecutor implements one source→destination migration path.
///
/// Implementations hold no per-run state and may be invoked concurrently for
/// any number of jobs.
#[async_trait]
pub trait MigrationExecutor: Send + Sync {
    /// Stable identifier used as the registry key
    fn executor_type(&self) -> &str;

    /// Ordered, non-empty phase labels emitted on every run
    fn phases(&self) -> Vec<String>;

    /// Inspect the configuration and report every problem in one pass.
    ///
    /// Must not perform side effects. `Err` is reserved for internal faults;
    /// bad input is reported through `ValidationResult::errors`.
    async fn validate(&self, config: &MigrationConfig) -> Result<ValidationResult, ExecutorFault>;

    /// Run the declared phases in order, emitting events into `job`.
    ///
    /// Must emit a phase-change before each phase's work, check
    /// `job.checkpoint()` between phases and return
    /// `ExecutionError::Cancelled` once cancellation is observed.
    async fn execute(
        &self,
        job: &MigrationJob,
        config: &MigrationConfig,
    ) -> Result<(), ExecutionError>;

    fn descriptor(&self) -> ExecutorDescriptor {
        ExecutorDescriptor {
            executor_type: self.executor_type().to_string(),
            phases: self.phases(),
        }
    }
}
