// Ordered, lossless event subscription for a single job
//
// Backpressure policy: the job log grows without bound and is the source of
// truth. The live channel is bounded and drops the oldest entries for a slow
// subscriber; when that happens the subscription re-reads the missed range
// from the log, so the writer never waits and no event is skipped.

use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use super::MigrationJob;
use crate::models::JobEvent;

/// Stream of one job's events in emission order, ending after the terminal
/// state-change event
#[derive(Debug)]
pub struct JobSubscription {
    job: Arc<MigrationJob>,
    receiver: broadcast::Receiver<JobEvent>,
    backlog: VecDeque<JobEvent>,
    last_sequence: u64,
    finished: bool,
}

impl JobSubscription {
    pub(crate) fn new(
        job: Arc<MigrationJob>,
        receiver: broadcast::Receiver<JobEvent>,
        backlog: Vec<JobEvent>,
    ) -> Self {
        Self {
            job,
            receiver,
            backlog: backlog.into(),
            last_sequence: 0,
            finished: false,
        }
    }

    pub fn job_id(&self) -> uuid::Uuid {
        self.job.id()
    }

    /// Next event, or None once the terminal event has been delivered
    pub async fn recv(&mut self) -> Option<JobEvent> {
        loop {
            if self.finished {
                return None;
            }

            if let Some(event) = self.backlog.pop_front() {
                if event.sequence > self.last_sequence {
                    return Some(self.deliver(event));
                }
                continue;
            }

            match self.receiver.recv().await {
                Ok(event) => {
                    if event.sequence > self.last_sequence {
                        return Some(self.deliver(event));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(
                        job_id = %self.job.id(),
                        skipped,
                        last_sequence = self.last_sequence,
                        "Subscriber lagged, replaying from job log"
                    );
                    self.backlog
                        .extend(self.job.events_since(self.last_sequence));
                }
                Err(RecvError::Closed) => {
                    self.backlog
                        .extend(self.job.events_since(self.last_sequence));
                    if self.backlog.is_empty() {
                        self.finished = true;
                    }
                }
            }
        }
    }

    fn deliver(&mut self, event: JobEvent) -> JobEvent {
        self.last_sequence = event.sequence;
        if event.is_terminal() {
            self.finished = true;
        }
        event
    }

    pub fn into_stream(self) -> impl Stream<Item = JobEvent> + Send {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|event| (event, subscription))
        })
    }
}
