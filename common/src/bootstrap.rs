// Bootstrap utilities for binary initialization
// Wires the built-in executors into a registry and builds the dispatcher

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::Settings;
use crate::dispatcher::Dispatcher;
use crate::executor::http_export::HttpExportExecutor;
use crate::registry::ExecutorRegistry;

/// Build a registry holding every built-in executor
///
/// # Errors
/// Returns error if an executor cannot be constructed or registered
#[tracing::instrument(skip(settings))]
pub fn init_registry(settings: &Settings) -> Result<Arc<ExecutorRegistry>> {
    let registry = ExecutorRegistry::new();

    let http_export = HttpExportExecutor::new(&settings.executors.http_export)
        .context("Failed to create http_to_filesystem executor")?;
    registry
        .register(Arc::new(http_export))
        .context("Failed to register http_to_filesystem executor")?;

    info!(types = ?registry.types(), "Executor registry initialized");
    Ok(Arc::new(registry))
}

/// Build the dispatcher over a registry
#[tracing::instrument(skip(settings, registry))]
pub fn init_dispatcher(settings: &Settings, registry: Arc<ExecutorRegistry>) -> Arc<Dispatcher> {
    info!(
        status_log_tail = settings.dispatcher.status_log_tail,
        event_channel_capacity = settings.dispatcher.event_channel_capacity,
        job_timeout_seconds = ?settings.dispatcher.job_timeout_seconds,
        "Dispatcher initialized"
    );
    Arc::new(Dispatcher::new(registry, settings.dispatcher.clone()))
}
