// Migration dispatcher
// Resolves a migration type to its executor, validates the configuration,
// and runs each accepted migration as an independent tokio task

use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::errors::{DispatchError, ExecutionError, ExecutorFault};
use crate::executor::MigrationExecutor;
use crate::job::{JobSubscription, MigrationJob};
use crate::models::{
    ExecutorDescriptor, JobSnapshot, JobState, JobSummary, MigrationConfig, Severity,
    ValidationResult,
};
use crate::registry::ExecutorRegistry;
use crate::telemetry;

/// Handle returned by `Dispatcher::submit`
#[derive(Debug, Clone)]
pub struct JobHandle {
    job: Arc<MigrationJob>,
    validation: ValidationResult,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.job.id()
    }

    pub fn state(&self) -> JobState {
        self.job.state()
    }

    pub fn validation(&self) -> &ValidationResult {
        &self.validation
    }

    /// Whether `execute` was started for this submission
    pub fn is_started(&self) -> bool {
        self.validation.valid
    }

    pub fn job(&self) -> &Arc<MigrationJob> {
        &self.job
    }

    pub fn subscribe(&self) -> JobSubscription {
        self.job.subscribe()
    }

    /// Wait for the run to reach a terminal state
    pub async fn wait(&self) -> JobState {
        self.job.wait_for_terminal().await
    }
}

/// State shared between the dispatcher and the tasks it spawns
#[derive(Debug, Clone)]
struct Shared {
    config: DispatcherConfig,
    jobs: Arc<RwLock<HashMap<Uuid, Arc<MigrationJob>>>>,
    running: Arc<AtomicUsize>,
}

impl Shared {
    fn insert(&self, job: Arc<MigrationJob>) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job.id(), job);
    }

    fn forget(&self, id: Uuid) -> Option<Arc<MigrationJob>> {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    /// Validate `config` and either mark the job `Invalid` or start it.
    ///
    /// Runs on its own task so the job leaves `Validating` even when the
    /// caller of `submit` goes away mid-validation.
    async fn admit(
        self,
        executor: Arc<dyn MigrationExecutor>,
        job: Arc<MigrationJob>,
        config: MigrationConfig,
    ) -> Result<ValidationResult, DispatchError> {
        let outcome = AssertUnwindSafe(executor.validate(&config))
            .catch_unwind()
            .await;

        let validation = match outcome {
            Ok(Ok(validation)) => validation,
            Ok(Err(fault)) => {
                error!(error = %fault, "Executor validation fault");
                self.forget(job.id());
                return Err(fault.into());
            }
            Err(panic) => {
                let fault = ExecutorFault::new(
                    job.executor_type(),
                    format!("validate panicked: {}", panic_message(&*panic)),
                );
                error!(error = %fault, "Executor validation fault");
                self.forget(job.id());
                return Err(fault.into());
            }
        };
        job.set_validation(validation.clone());

        for warning in &validation.warnings {
            job.log_warning(warning.clone());
        }

        if !validation.valid {
            for problem in &validation.errors {
                job.emit_log(Severity::Error, problem.clone());
            }
            job.transition(JobState::Invalid);
            telemetry::record_invalid(job.executor_type());
            info!(
                error_count = validation.errors.len(),
                "Migration rejected by validation"
            );
            return Ok(validation);
        }

        job.transition(JobState::Running);
        self.spawn_execution(executor, job, Arc::new(config));

        info!("Migration started");
        Ok(validation)
    }

    fn spawn_execution(
        &self,
        executor: Arc<dyn MigrationExecutor>,
        job: Arc<MigrationJob>,
        config: Arc<MigrationConfig>,
    ) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        telemetry::update_running(running.fetch_add(1, Ordering::SeqCst) + 1);

        let watchdog = self
            .config
            .job_timeout()
            .map(|timeout| spawn_watchdog(Arc::clone(&job), timeout));

        let span = info_span!(
            "migration",
            job_id = %job.id(),
            executor_type = %job.executor_type()
        );

        tokio::spawn(
            async move {
                let started = Instant::now();
                let outcome = AssertUnwindSafe(executor.execute(&job, &config))
                    .catch_unwind()
                    .await;

                if let Some(watchdog) = watchdog {
                    watchdog.abort();
                }

                match outcome {
                    Ok(Ok(())) => {
                        job.transition(JobState::Completed);
                    }
                    Ok(Err(ExecutionError::Cancelled)) => {
                        job.log_warning("Migration cancelled");
                        job.transition(JobState::Cancelled);
                    }
                    Ok(Err(err)) => {
                        job.fail(err.to_string());
                    }
                    Err(panic) => {
                        job.fail(format!("Executor panicked: {}", panic_message(&*panic)));
                    }
                }

                let state = job.state();
                telemetry::record_finished(
                    job.executor_type(),
                    state,
                    started.elapsed().as_secs_f64(),
                );
                telemetry::update_running(running.fetch_sub(1, Ordering::SeqCst) - 1);

                info!(state = %state, phase = job.phase(), progress = job.progress(), "Migration finished");
            }
            .instrument(span),
        )
    }
}

/// Dispatcher ties the registry, validation and job execution together
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<ExecutorRegistry>,
    shared: Shared,
}

impl Dispatcher {
    pub fn new(registry: Arc<ExecutorRegistry>, config: DispatcherConfig) -> Self {
        Self {
            registry,
            shared: Shared {
                config,
                jobs: Arc::new(RwLock::new(HashMap::new())),
                running: Arc::new(AtomicUsize::new(0)),
            },
        }
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    pub fn list_types(&self) -> Vec<ExecutorDescriptor> {
        self.registry.list_types()
    }

    /// Validate and, if valid, start a migration.
    ///
    /// Returns as soon as the run is spawned; an invalid configuration yields
    /// a handle already in state `Invalid`. Dropping the returned future does
    /// not abandon the job: validation and start-up finish on their own task.
    #[instrument(skip(self, config))]
    pub async fn submit(
        &self,
        executor_type: &str,
        config: MigrationConfig,
    ) -> Result<JobHandle, DispatchError> {
        let executor = self.registry.lookup(executor_type)?;
        telemetry::record_submission(executor_type);

        let job = Arc::new(MigrationJob::with_capacity(
            executor_type,
            executor.phases(),
            self.shared.config.event_channel_capacity,
        ));
        job.transition(JobState::Validating);
        self.shared.insert(Arc::clone(&job));

        let span = info_span!(
            "admission",
            job_id = %job.id(),
            executor_type = %executor_type
        );
        let admission = self
            .shared
            .clone()
            .admit(executor, Arc::clone(&job), config);
        let (tx, rx) = oneshot::channel();
        tokio::spawn(
            async move {
                // The submitter may be gone; the job is settled either way
                let _ = tx.send(admission.await);
            }
            .instrument(span),
        );

        match rx.await {
            Ok(result) => result.map(|validation| JobHandle { job, validation }),
            Err(_) => Err(DispatchError::ValidationFault(ExecutorFault::new(
                executor_type,
                "admission task ended without a result",
            ))),
        }
    }

    pub fn job(&self, id: Uuid) -> Option<Arc<MigrationJob>> {
        self.shared
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Non-blocking status snapshot
    pub fn status(&self, id: Uuid) -> Option<JobSnapshot> {
        self.job(id)
            .map(|job| job.snapshot(self.shared.config.status_log_tail))
    }

    /// Request cancellation; true when a non-terminal job with `id` exists
    #[instrument(skip(self))]
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.job(id) {
            Some(job) if !job.state().is_terminal() => {
                job.cancel();
                true
            }
            Some(job) => {
                info!(state = %job.state(), "Cancel ignored for finished migration");
                false
            }
            None => false,
        }
    }

    pub fn subscribe(&self, id: Uuid) -> Option<JobSubscription> {
        self.job(id).map(|job| job.subscribe())
    }

    /// All tracked jobs, oldest first
    pub fn list_jobs(&self) -> Vec<JobSummary> {
        let mut summaries: Vec<JobSummary> = self
            .shared
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|job| job.summary())
            .collect();
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    /// Drop a finished job from the table
    pub fn remove(&self, id: Uuid) -> Result<JobSnapshot, DispatchError> {
        let mut jobs = self
            .shared
            .jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get(&id).ok_or(DispatchError::NotFound(id))?;
        if !job.state().is_terminal() {
            return Err(DispatchError::StillRunning(id));
        }
        let snapshot = job.snapshot(self.shared.config.status_log_tail);
        jobs.remove(&id);
        Ok(snapshot)
    }

    pub fn running_count(&self) -> usize {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Cancel every non-terminal job; returns how many were signalled
    pub fn cancel_all(&self) -> usize {
        let jobs: Vec<Arc<MigrationJob>> = self
            .shared
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|job| !job.state().is_terminal())
            .cloned()
            .collect();
        for job in &jobs {
            job.cancel();
        }
        if !jobs.is_empty() {
            warn!(count = jobs.len(), "Cancelled all running migrations");
        }
        jobs.len()
    }
}

fn spawn_watchdog(job: Arc<MigrationJob>, timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = job.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                if !job.state().is_terminal() {
                    job.log_warning(format!(
                        "Migration exceeded timeout of {}s, cancelling",
                        timeout.as_secs()
                    ));
                    job.cancel();
                }
            }
        }
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
