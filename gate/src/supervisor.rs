//! Races a gate run against a single overall deadline.
//!
//! The pipeline and the fuse timer run as separate tasks and both try to
//! claim the same [`Decision`]. Only the claimant delivers an outcome and runs
//! the commit side effects; the other side finds the decision taken and
//! discards its result.

use crate::errors::GateError;
use crate::gate::GateOutcome;
use crate::metrics_defs::LATE_RESULT_DISCARDED;
use parking_lot::Mutex;
use shared::counter;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

/// Claim-once flag shared by the racers.
#[derive(Debug, Default)]
pub struct Decision {
    decided: AtomicBool,
}

impl Decision {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for exactly one caller.
    pub fn try_claim(&self) -> bool {
        self.decided
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_decided(&self) -> bool {
        self.decided.load(Ordering::Acquire)
    }
}

/// Deadline timer. Dropping the handle cancels a fuse that has not fired.
pub struct Fuse {
    handle: JoinHandle<()>,
}

impl Fuse {
    pub fn arm<F>(deadline: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            on_fire();
        });
        Fuse { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Fuse {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The decision plus the single delivery slot for the outcome.
struct Commit {
    decision: Decision,
    tx: Mutex<Option<oneshot::Sender<GateOutcome>>>,
}

impl Commit {
    fn deliver(&self, outcome: GateOutcome) {
        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(outcome);
        }
    }
}

pub struct DeadlineSupervisor {
    deadline: Duration,
}

impl DeadlineSupervisor {
    pub fn new(deadline: Duration) -> Self {
        DeadlineSupervisor { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Runs `pipeline` under the deadline.
    ///
    /// `on_resolved` runs only when the pipeline wins with a URL, before the
    /// outcome is delivered. `on_timeout` runs only when the fuse wins. A
    /// pipeline that loses keeps running detached and its result is dropped.
    pub async fn run<P, R, T>(&self, pipeline: P, on_resolved: R, on_timeout: T) -> GateOutcome
    where
        P: Future<Output = Result<Url, GateError>> + Send + 'static,
        R: FnOnce(&Url) + Send + 'static,
        T: FnOnce() + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let commit = Arc::new(Commit {
            decision: Decision::new(),
            tx: Mutex::new(Some(tx)),
        });

        let pipeline_commit = commit.clone();
        tokio::spawn(async move {
            let result = pipeline.await;
            if !pipeline_commit.decision.try_claim() {
                counter!(LATE_RESULT_DISCARDED).increment(1);
                tracing::debug!(?result, "Pipeline finished after the deadline, discarding");
                return;
            }
            let outcome = match result {
                Ok(url) => {
                    on_resolved(&url);
                    GateOutcome::Remote(url)
                }
                Err(err) => GateOutcome::Failed(err),
            };
            pipeline_commit.deliver(outcome);
        });

        let fuse_commit = commit.clone();
        let deadline = self.deadline;
        let fuse = Fuse::arm(deadline, move || {
            if fuse_commit.decision.try_claim() {
                tracing::warn!(deadline_ms = deadline.as_millis() as u64, "Overall timeout");
                on_timeout();
                fuse_commit.deliver(GateOutcome::Failed(GateError::Timeout));
            }
        });

        // Both senders live in `commit`, which is kept alive here
        let outcome = rx.await.unwrap_or(GateOutcome::Failed(GateError::Timeout));
        drop(fuse);
        outcome
    }
}
