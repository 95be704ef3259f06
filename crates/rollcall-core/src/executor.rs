//! Bounded executor for deferred triggers
//!
//! Triggers wait for their fire time without holding a permit, then run
//! under one of `max_parallel` permits. Finished triggers are reaped into a
//! running tally whenever a new one is queued, so a long run holds only the
//! triggers still waiting or running. `settle` waits for the rest and reports
//! the tally; one trigger failing or panicking never affects the others.

use chrono::{DateTime, Local};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::{Clock, CoreResult};

pub type TriggerAction = Pin<Box<dyn Future<Output = CoreResult<()>> + Send + 'static>>;

/// A deferred action bound to the instant it should run
pub struct Trigger {
    pub label: String,
    pub fire_at: DateTime<Local>,
    pub action: TriggerAction,
}

impl Trigger {
    pub fn new<F>(label: impl Into<String>, fire_at: DateTime<Local>, action: F) -> Self
    where
        F: Future<Output = CoreResult<()>> + Send + 'static,
    {
        Self {
            label: label.into(),
            fire_at,
            action: Box::pin(action),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(String),
    Panicked(String),
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub label: String,
    pub outcome: TaskOutcome,
}

/// Tally of every trigger an executor ran.
///
/// Successful triggers are only counted; failed and panicked ones are kept
/// with their labels.
#[derive(Debug, Clone, Default)]
pub struct SettleReport {
    succeeded: usize,
    pub failures: Vec<TaskReport>,
}

impl SettleReport {
    pub fn len(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Failed(_)))
    }

    pub fn panicked(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Panicked(_)))
    }

    fn count(&self, pred: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.failures.iter().filter(|t| pred(&t.outcome)).count()
    }

    fn record(&mut self, task: TaskReport) {
        match task.outcome {
            TaskOutcome::Succeeded => self.succeeded += 1,
            _ => self.failures.push(task),
        }
    }
}

pub struct BoundedExecutor {
    name: &'static str,
    permits: Arc<Semaphore>,
    clock: Arc<dyn Clock>,
    tasks: Mutex<JoinSet<TaskReport>>,
    finished: Mutex<SettleReport>,
}

impl BoundedExecutor {
    pub fn new(name: &'static str, max_parallel: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            permits: Arc::new(Semaphore::new(max_parallel.max(1))),
            clock,
            tasks: Mutex::new(JoinSet::new()),
            finished: Mutex::new(SettleReport::default()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<TaskReport>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finished(&self) -> MutexGuard<'_, SettleReport> {
        self.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Triggers spawned and not yet reaped
    pub fn pending(&self) -> usize {
        self.tasks().len()
    }

    /// Triggers reaped into the tally and not yet reported by `settle`
    pub fn completed(&self) -> usize {
        self.finished().len()
    }

    /// Move every trigger that has already finished into the tally
    pub fn reap(&self) -> usize {
        let mut joined = Vec::new();
        {
            let mut tasks = self.tasks();
            while let Some(result) = tasks.try_join_next() {
                joined.push(result);
            }
        }

        let reaped = joined.len();
        for result in joined {
            self.record(result);
        }
        if reaped > 0 {
            debug!(executor = self.name, reaped, "Finished triggers reaped");
        }
        reaped
    }

    fn record(&self, joined: Result<TaskReport, JoinError>) {
        let task = match joined {
            Ok(task) => task,
            Err(e) => TaskReport {
                label: "<unknown>".into(),
                outcome: outcome_from_join_error(e),
            },
        };

        match &task.outcome {
            TaskOutcome::Succeeded => {
                debug!(executor = self.name, label = %task.label, "Trigger succeeded")
            }
            TaskOutcome::Failed(e) => {
                warn!(executor = self.name, label = %task.label, error = %e, "Trigger failed")
            }
            TaskOutcome::Panicked(e) => {
                error!(executor = self.name, label = %task.label, panic = %e, "Trigger panicked")
            }
        }
        self.finished().record(task);
    }

    /// Queue a trigger. Must be called from within a tokio runtime.
    pub fn spawn(&self, trigger: Trigger) {
        let Trigger {
            label,
            fire_at,
            action,
        } = trigger;
        let permits = self.permits.clone();
        let clock = self.clock.clone();
        let executor = self.name;

        self.reap();
        debug!(executor, label = %label, fire_at = %fire_at, "Trigger scheduled");

        self.tasks().spawn(async move {
            clock.sleep_until(fire_at).await;

            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return TaskReport {
                        label,
                        outcome: TaskOutcome::Failed("executor closed".into()),
                    };
                }
            };

            debug!(executor, label = %label, "Trigger fired");

            // The action runs as its own task so a panic surfaces as a JoinError
            let handle = tokio::spawn(action);
            let _abort = AbortOnDrop(handle.abort_handle());
            let outcome = match handle.await {
                Ok(Ok(())) => TaskOutcome::Succeeded,
                Ok(Err(e)) => TaskOutcome::Failed(e.to_string()),
                Err(e) => outcome_from_join_error(e),
            };

            TaskReport { label, outcome }
        });
    }

    /// Wait for every spawned trigger, including ones spawned while settling,
    /// and hand over the tally
    pub async fn settle(&self) -> SettleReport {
        loop {
            let mut batch = std::mem::take(&mut *self.tasks());
            if batch.is_empty() {
                break;
            }

            while let Some(joined) = batch.join_next().await {
                self.record(joined);
            }
        }

        let report = std::mem::take(&mut *self.finished());
        info!(
            executor = self.name,
            total = report.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            panicked = report.panicked(),
            "Executor settled"
        );
        report
    }
}

/// Aborts the action task when the trigger task itself is dropped
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn outcome_from_join_error(e: JoinError) -> TaskOutcome {
    if e.is_panic() {
        let payload = e.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".into());
        TaskOutcome::Panicked(message)
    } else {
        TaskOutcome::Failed(e.to_string())
    }
}
