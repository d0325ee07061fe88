//! Load-based admission for heavyweight work.
//!
//! The gate itself lives in `studydb_admission`; this module puts it behind an
//! actor so every caller in the process shares one budget.

use crate::config::AdmissionConfig;
use crate::error::StudyDbError;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::time::Instant;
use studydb_admission::{LoadGate, LoadSnapshot, Task};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum AdmissionMessage {
    /// Poll for permission to run; also keeps a waiting task alive.
    CanStart(Task, RpcReplyPort<bool>),

    /// Move a waiting task to the head of the queue.
    Bump(Task),

    /// The task finished, or gave up waiting.
    Complete(Task),

    IsResourceAvailable(f64, RpcReplyPort<bool>),

    Snapshot(RpcReplyPort<LoadSnapshot>),
}

#[derive(Clone)]
pub struct AdmissionHandle {
    actor: ActorRef<AdmissionMessage>,
    poll_interval: std::time::Duration,
}

impl AdmissionHandle {
    pub async fn can_start(&self, task: Task) -> Result<bool, StudyDbError> {
        ractor::call!(self.actor, AdmissionMessage::CanStart, task).map_err(|e| {
            StudyDbError::RactorError(format!("AdmissionActor CanStart RPC failed: {e}"))
        })
    }

    pub fn bump(&self, task: Task) {
        if let Err(e) = ractor::cast!(self.actor, AdmissionMessage::Bump(task)) {
            warn!(task_id = task.id(), error = %e, "AdmissionActor Bump cast failed");
        }
    }

    /// Must be called once for every task that ever polled `can_start`.
    pub fn complete(&self, task: Task) {
        if let Err(e) = ractor::cast!(self.actor, AdmissionMessage::Complete(task)) {
            warn!(task_id = task.id(), error = %e, "AdmissionActor Complete cast failed");
        }
    }

    /// Advisory only; the answer may be stale by the time it arrives.
    pub async fn is_resource_available(&self, load: f64) -> Result<bool, StudyDbError> {
        ractor::call!(self.actor, AdmissionMessage::IsResourceAvailable, load).map_err(|e| {
            StudyDbError::RactorError(format!("AdmissionActor IsResourceAvailable RPC failed: {e}"))
        })
    }

    pub async fn snapshot(&self) -> Result<LoadSnapshot, StudyDbError> {
        ractor::call!(self.actor, AdmissionMessage::Snapshot).map_err(|e| {
            StudyDbError::RactorError(format!("AdmissionActor Snapshot RPC failed: {e}"))
        })
    }

    /// Polls `can_start` on the configured interval until the task is admitted.
    ///
    /// Dropping the returned permit completes the task. Dropping this future
    /// while it waits completes the task as well.
    pub async fn wait_for_start(&self, task: Task) -> Result<AdmissionPermit, StudyDbError> {
        let permit = AdmissionPermit {
            handle: self.clone(),
            task,
        };

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let started = Instant::now();
        let mut polls = 0u64;

        loop {
            ticker.tick().await;
            polls += 1;
            if self.can_start(task).await? {
                debug!(
                    task_id = task.id(),
                    load = task.load(),
                    polls,
                    waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "task admitted"
                );
                return Ok(permit);
            }
            if polls == 1 {
                debug!(task_id = task.id(), load = task.load(), "task waiting for admission");
            }
        }
    }
}

/// An admitted task. Completes the task when dropped.
#[derive(Debug)]
pub struct AdmissionPermit {
    handle: AdmissionHandle,
    task: Task,
}

impl AdmissionPermit {
    pub fn task(&self) -> Task {
        self.task
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.handle.complete(self.task);
    }
}

impl std::fmt::Debug for AdmissionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionHandle")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

struct AdmissionActor;

#[ractor::async_trait]
impl Actor for AdmissionActor {
    type Msg = AdmissionMessage;
    type State = LoadGate;
    type Arguments = AdmissionConfig;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        config: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(
            max_load = config.max_load,
            max_wait_ms = config.max_wait_ms,
            "AdmissionActor initialized"
        );
        Ok(LoadGate::new(config.max_load, config.max_wait()))
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        gate: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            AdmissionMessage::CanStart(task, reply) => {
                let was_running = gate.is_running(task.id());
                let granted = gate.can_start(&task, Instant::now());
                if granted && !was_running && !task.is_untracked() {
                    debug!(
                        task_id = task.id(),
                        load = task.load(),
                        current_load = gate.current_load(),
                        "task started"
                    );
                }
                let _ = reply.send(granted);
            }
            AdmissionMessage::Bump(task) => {
                gate.bump(&task, Instant::now());
            }
            AdmissionMessage::Complete(task) => {
                gate.complete(&task);
                debug!(
                    task_id = task.id(),
                    current_load = gate.current_load(),
                    "task completed"
                );
            }
            AdmissionMessage::IsResourceAvailable(load, reply) => {
                let _ = reply.send(gate.is_resource_available(load));
            }
            AdmissionMessage::Snapshot(reply) => {
                let _ = reply.send(gate.snapshot());
            }
        }
        Ok(())
    }
}

/// Spawns a fresh admission actor.
pub async fn spawn(config: AdmissionConfig) -> Result<AdmissionHandle, StudyDbError> {
    let poll_interval = config.poll_interval();
    let (actor, _jh) = Actor::spawn(None, AdmissionActor, config)
        .await
        .map_err(|e| StudyDbError::RactorError(format!("failed to spawn AdmissionActor: {e}")))?;
    Ok(AdmissionHandle {
        actor,
        poll_interval,
    })
}
