// Error handling framework for the migration orchestrator

use thiserror::Error;

/// Executor registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown migration type: {0}")]
    UnknownType(String),

    #[error("Migration type already registered: {0}")]
    DuplicateType(String),

    #[error("Executor '{0}' declares no phases")]
    NoPhases(String),
}

/// Errors returned by `MigrationExecutor::execute`
///
/// `Cancelled` is kept apart from the failure variants so the dispatcher can
/// mark the run `Cancelled` instead of `Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Migration cancelled")]
    Cancelled,

    #[error("Required dependency '{dependency}' failed: {message}")]
    ExternalDependency { dependency: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Internal executor error: {0}")]
    Internal(String),
}

impl ExecutionError {
    pub fn external(dependency: impl Into<String>, message: impl Into<String>) -> Self {
        ExecutionError::ExternalDependency {
            dependency: dependency.into(),
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionError::Cancelled)
    }
}

/// Unexpected internal fault raised by `MigrationExecutor::validate`.
///
/// Ordinary bad input is never reported through this type; it goes into
/// `ValidationResult::errors`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation fault in '{executor_type}': {message}")]
pub struct ExecutorFault {
    pub executor_type: String,
    pub message: String,
}

impl ExecutorFault {
    pub fn new(executor_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            executor_type: executor_type.into(),
            message: message.into(),
        }
    }
}

/// Configuration problems, rendered into `ValidationResult::errors`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFieldValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Dispatcher errors surfaced to the caller of submit/remove
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    ValidationFault(#[from] ExecutorFault),

    #[error("Migration job not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("Migration job {0} is still running")]
    StillRunning(uuid::Uuid),
}
