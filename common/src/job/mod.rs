// Migration job: per-run state, event log and cancellation handle
//
// The executing task is the only writer of phase/progress/log; status readers
// and cancellers run concurrently. Every mutation goes through one lock per
// job, and broadcast sends happen under that lock so live subscribers see the
// same order as the log.

pub mod subscription;

pub use subscription::JobSubscription;

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::ExecutionError;
use crate::models::{
    EventKind, JobEvent, JobSnapshot, JobState, JobSummary, Severity, ValidationResult,
};

/// Default capacity of the live event channel per job
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
struct JobInner {
    state: JobState,
    phase: usize,
    progress: u8,
    events: Vec<JobEvent>,
    validation: Option<ValidationResult>,
    finished_at: Option<DateTime<Utc>>,
}

/// MigrationJob is the mutable record of one executor invocation
#[derive(Debug)]
pub struct MigrationJob {
    id: Uuid,
    executor_type: String,
    phases: Vec<String>,
    created_at: DateTime<Utc>,
    cancel_token: CancellationToken,
    inner: RwLock<JobInner>,
    events_tx: broadcast::Sender<JobEvent>,
    state_tx: watch::Sender<JobState>,
}

impl MigrationJob {
    /// Create a job in state `Created` with the executor's phase list
    pub fn new(executor_type: impl Into<String>, phases: Vec<String>) -> Self {
        Self::with_capacity(executor_type, phases, DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    /// Create a job whose live event channel holds `capacity` events per subscriber
    pub fn with_capacity(
        executor_type: impl Into<String>,
        phases: Vec<String>,
        capacity: usize,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(capacity.max(1));
        let (state_tx, _) = watch::channel(JobState::Created);

        Self {
            id: Uuid::new_v4(),
            executor_type: executor_type.into(),
            phases,
            created_at: Utc::now(),
            cancel_token: CancellationToken::new(),
            inner: RwLock::new(JobInner {
                state: JobState::Created,
                phase: 0,
                progress: 0,
                events: Vec::new(),
                validation: None,
                finished_at: None,
            }),
            events_tx,
            state_tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn executor_type(&self) -> &str {
        &self.executor_type
    }

    pub fn phases(&self) -> &[String] {
        &self.phases
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // A panic while holding the lock leaves the data consistent (every write
    // is a single assignment or push), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, JobInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, JobInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_event(&self, inner: &mut JobInner, kind: EventKind) {
        let event = JobEvent {
            sequence: inner.events.len() as u64 + 1,
            timestamp: Utc::now(),
            kind,
        };
        inner.events.push(event.clone());
        // No receivers is fine
        let _ = self.events_tx.send(event);
    }

    /// Append an event unless the job already reached a terminal state
    fn emit(&self, apply: impl FnOnce(&mut JobInner) -> EventKind) {
        let mut inner = self.write();
        if inner.state.is_terminal() {
            debug!(job_id = %self.id, state = %inner.state, "Dropping event emitted after terminal state");
            return;
        }
        let kind = apply(&mut inner);
        self.push_event(&mut inner, kind);
    }

    // ------------------------------------------------------------------
    // Event sink used by executors
    // ------------------------------------------------------------------

    /// Record entering phase `index` (1-based). Out-of-range indices are
    /// clamped into `1..=phases.len()`.
    pub fn emit_phase(&self, name: impl Into<String>, index: usize) {
        let name = name.into();
        let max = self.phases.len();
        let clamped = index.clamp(1, max.max(1)).min(max);
        if clamped != index {
            warn!(
                job_id = %self.id,
                phase = %name,
                index,
                clamped,
                "Phase index out of range, clamping"
            );
        }

        info!(job_id = %self.id, phase = %name, index = clamped, "Phase started");
        self.emit(|inner| {
            inner.phase = clamped;
            EventKind::PhaseChanged {
                index: clamped,
                name,
            }
        });
    }

    /// Record a progress update. Values above 100 are clamped to 100 and a
    /// regression is clamped up to the current value.
    pub fn emit_progress(&self, percent: u8, message: impl Into<String>) {
        let message = message.into();
        self.emit(|inner| {
            let percent = percent.min(100).max(inner.progress);
            inner.progress = percent;
            EventKind::Progress { percent, message }
        });
    }

    /// Append a log-message event
    pub fn emit_log(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Debug => debug!(job_id = %self.id, "{}", message),
            Severity::Info => info!(job_id = %self.id, "{}", message),
            Severity::Warning => warn!(job_id = %self.id, "{}", message),
            Severity::Error => tracing::error!(job_id = %self.id, "{}", message),
        }
        self.emit(|_| EventKind::Log { severity, message });
    }

    pub fn log_info(&self, message: impl Into<String>) {
        self.emit_log(Severity::Info, message);
    }

    pub fn log_warning(&self, message: impl Into<String>) {
        self.emit_log(Severity::Warning, message);
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Request cancellation. Idempotent.
    ///
    /// This only signals the running executor. An executor that awaits an
    /// external call outside `run_cancellable` observes the request when that
    /// call returns, so the worst-case latency is the remaining duration of
    /// the call in flight.
    pub fn cancel(&self) {
        let mut inner = self.write();
        if self.cancel_token.is_cancelled() {
            return;
        }
        self.cancel_token.cancel();
        if !inner.state.is_terminal() {
            info!(job_id = %self.id, "Cancellation requested");
            self.push_event(
                &mut inner,
                EventKind::Log {
                    severity: Severity::Warning,
                    message: "Cancellation requested".to_string(),
                },
            );
        }
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        self.cancel_token.cancelled().await
    }

    /// Child token for forwarding into external calls
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Return `Err(Cancelled)` if cancellation has been requested
    pub fn checkpoint(&self) -> Result<(), ExecutionError> {
        if self.is_cancelled() {
            Err(ExecutionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Race `fut` against cancellation; the future is dropped if cancellation wins
    pub async fn run_cancellable<F>(&self, fut: F) -> Result<F::Output, ExecutionError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(ExecutionError::Cancelled),
            output = fut => Ok(output),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle, driven by the dispatcher
    // ------------------------------------------------------------------

    /// Move to `next` if the lifecycle allows it. Returns whether it moved.
    pub(crate) fn transition(&self, next: JobState) -> bool {
        let mut inner = self.write();
        if !inner.state.can_transition_to(next) {
            debug!(
                job_id = %self.id,
                from = %inner.state,
                to = %next,
                "Ignoring disallowed state transition"
            );
            return false;
        }

        if next == JobState::Completed && inner.progress < 100 {
            inner.progress = 100;
            self.push_event(
                &mut inner,
                EventKind::Progress {
                    percent: 100,
                    message: "Migration completed".to_string(),
                },
            );
        }

        inner.state = next;
        if next.is_terminal() {
            inner.finished_at = Some(Utc::now());
        }
        self.push_event(&mut inner, EventKind::StateChanged { state: next });
        self.state_tx.send_replace(next);
        true
    }

    pub(crate) fn set_validation(&self, validation: ValidationResult) {
        self.write().validation = Some(validation);
    }

    /// Record an error log and move to `Failed`
    pub(crate) fn fail(&self, message: impl Into<String>) -> bool {
        self.emit_log(Severity::Error, message);
        self.transition(JobState::Failed)
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    pub fn state(&self) -> JobState {
        self.read().state
    }

    pub fn phase(&self) -> usize {
        self.read().phase
    }

    pub fn progress(&self) -> u8 {
        self.read().progress
    }

    pub fn validation(&self) -> Option<ValidationResult> {
        self.read().validation.clone()
    }

    /// Full event log in emission order
    pub fn events(&self) -> Vec<JobEvent> {
        self.read().events.clone()
    }

    /// Events with a sequence number greater than `sequence`
    pub fn events_since(&self, sequence: u64) -> Vec<JobEvent> {
        let inner = self.read();
        let start = (sequence as usize).min(inner.events.len());
        inner.events[start..].to_vec()
    }

    /// Consistent view of the job with the last `tail` events
    pub fn snapshot(&self, tail: usize) -> JobSnapshot {
        let inner = self.read();
        let start = inner.events.len().saturating_sub(tail);
        JobSnapshot {
            id: self.id,
            executor_type: self.executor_type.clone(),
            state: inner.state,
            phase: inner.phase,
            phases: self.phases.clone(),
            progress: inner.progress,
            log_tail: inner.events[start..].to_vec(),
            validation: inner.validation.clone(),
            created_at: self.created_at,
            finished_at: inner.finished_at,
        }
    }

    pub fn summary(&self) -> JobSummary {
        let inner = self.read();
        JobSummary {
            id: self.id,
            executor_type: self.executor_type.clone(),
            state: inner.state,
            progress: inner.progress,
            created_at: self.created_at,
        }
    }

    /// Subscribe to the event stream: replays the log, then follows live events
    pub fn subscribe(self: &Arc<Self>) -> JobSubscription {
        // Holding the read lock blocks emitters, so nothing is sent between
        // the log copy and the receiver creation.
        let inner = self.read();
        let receiver = self.events_tx.subscribe();
        let backlog = inner.events.clone();
        drop(inner);
        JobSubscription::new(Arc::clone(self), receiver, backlog)
    }

    /// Wait until the job reaches a terminal state and return it
    pub async fn wait_for_terminal(&self) -> JobState {
        let mut rx = self.state_tx.subscribe();
        let state = match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn phases() -> Vec<String> {
        vec!["Export".to_string(), "Transform".to_string(), "Import".to_string()]
    }

    fn running_job() -> MigrationJob {
        let job = MigrationJob::new("test", phases());
        assert!(job.transition(JobState::Validating));
        assert!(job.transition(JobState::Running));
        job
    }

    #[test]
    fn test_new_job_is_created() {
        let job = MigrationJob::new("test", phases());
        assert_eq!(job.state(), JobState::Created);
        assert_eq!(job.phase(), 0);
        assert_eq!(job.progress(), 0);
        assert!(job.events().is_empty());
        assert!(!job.is_cancelled());
    }

    #[test]
    fn test_phase_index_is_clamped() {
        let job = running_job();
        job.emit_phase("Import", 7);
        assert_eq!(job.phase(), 3);
        job.emit_phase("Export", 0);
        assert_eq!(job.phase(), 1);
    }

    #[test]
    fn test_progress_never_regresses() {
        let job = running_job();
        job.emit_progress(40, "forty");
        job.emit_progress(10, "ten");
        assert_eq!(job.progress(), 40);
        job.emit_progress(250, "over");
        assert_eq!(job.progress(), 100);

        let percents: Vec<u8> = job
            .events()
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::Progress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![40, 40, 100]);
    }

    #[test]
    fn test_sequences_are_contiguous() {
        let job = running_job();
        job.emit_phase("Export", 1);
        job.log_info("hello");
        job.emit_progress(5, "start");
        let sequences: Vec<u64> = job.events().iter().map(|e| e.sequence).collect();
        let expected: Vec<u64> = (1..=sequences.len() as u64).collect();
        assert_eq!(sequences, expected);
    }

    #[test]
    fn test_terminal_state_is_final() {
        let job = running_job();
        assert!(job.transition(JobState::Failed));
        assert!(!job.transition(JobState::Completed));
        assert!(!job.transition(JobState::Cancelled));
        assert_eq!(job.state(), JobState::Failed);
    }

    #[test]
    fn test_events_after_terminal_are_dropped() {
        let job = running_job();
        assert!(job.transition(JobState::Completed));
        let before = job.events().len();
        job.log_info("late");
        job.emit_phase("Import", 3);
        assert_eq!(job.events().len(), before);
    }

    #[test]
    fn test_completion_forces_full_progress() {
        let job = running_job();
        job.emit_progress(60, "partial");
        assert!(job.transition(JobState::Completed));
        assert_eq!(job.progress(), 100);
        assert!(job.snapshot(1).log_tail[0].is_terminal());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let job = running_job();
        job.cancel();
        job.cancel();
        assert!(job.is_cancelled());
        assert_eq!(job.checkpoint(), Err(ExecutionError::Cancelled));

        let cancel_logs = job
            .events()
            .into_iter()
            .filter(|e| matches!(&e.kind, EventKind::Log { message, .. } if message == "Cancellation requested"))
            .count();
        assert_eq!(cancel_logs, 1);
    }

    #[test]
    fn test_snapshot_tail() {
        let job = running_job();
        for i in 0..10 {
            job.log_info(format!("line {}", i));
        }
        let snapshot = job.snapshot(3);
        assert_eq!(snapshot.log_tail.len(), 3);
        assert_eq!(snapshot.log_tail.last().map(|e| e.sequence), Some(12));
        assert_eq!(snapshot.phases.len(), 3);
    }

    #[test]
    fn test_events_since() {
        let job = running_job();
        job.log_info("a");
        job.log_info("b");
        let all = job.events();
        assert_eq!(job.events_since(0).len(), all.len());
        assert_eq!(job.events_since(all.len() as u64 - 1).len(), 1);
        assert!(job.events_since(1_000).is_empty());
    }

    #[tokio::test]
    async fn test_run_cancellable_aborts_pending_future() {
        let job = Arc::new(running_job());
        let canceller = Arc::clone(&job);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = job
            .run_cancellable(tokio::time::sleep(Duration::from_secs(30)))
            .await;
        assert_eq!(result, Err(ExecutionError::Cancelled));
    }

    #[tokio::test]
    async fn test_run_cancellable_returns_output() {
        let job = running_job();
        let result = job.run_cancellable(async { 7 }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_wait_for_terminal() {
        let job = Arc::new(running_job());
        let finisher = Arc::clone(&job);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            finisher.transition(JobState::Completed);
        });
        assert_eq!(job.wait_for_terminal().await, JobState::Completed);
    }
}
