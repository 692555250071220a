//! Run manager - one task per running instance
//!
//! Spawns a negotiation task per instance and fans its events out over a
//! broadcast channel so any number of observers can follow along. Exactly
//! one task may exist per instance id; the registry entry is the in-process
//! guard, while the store's `start` transition remains the cross-process
//! one. The overall wall-clock budget is enforced here by cancelling the
//! run's token when the deadline passes.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use parley_types::{Decision, Instance, InstanceStatus, Outcome, ProgressEvent};

use crate::engine::NegotiationEngine;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Negotiation already running for instance {0}")]
    AlreadyRunning(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

struct RunHandle {
    events: broadcast::Sender<ProgressEvent>,
    cancel: CancellationToken,
}

pub struct RunManager {
    engine: Arc<NegotiationEngine>,
    runs: DashMap<String, RunHandle>,
}

impl RunManager {
    pub fn new(engine: Arc<NegotiationEngine>) -> Self {
        Self {
            engine,
            runs: DashMap::new(),
        }
    }

    /// Spawn the negotiation task for an instance already transitioned to
    /// `running`. Returns a receiver that observes the run from its first
    /// event.
    pub fn start(
        self: &Arc<Self>,
        instance: Instance,
    ) -> EngineResult<broadcast::Receiver<ProgressEvent>> {
        let id = instance.id.clone();

        match self.runs.entry(id.clone()) {
            Entry::Occupied(_) => Err(EngineError::AlreadyRunning(id)),
            Entry::Vacant(slot) => {
                let (tx, rx) = broadcast::channel(self.engine.config().event_buffer);
                let cancel = CancellationToken::new();
                slot.insert(RunHandle {
                    events: tx.clone(),
                    cancel: cancel.clone(),
                });

                let manager = Arc::clone(self);
                let engine = self.engine.clone();
                let run_timeout = engine.config().run_timeout;

                tokio::spawn(async move {
                    let watchdog = {
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(run_timeout).await;
                            cancel.cancel();
                        })
                    };

                    let mut stream = engine.run(instance, cancel);
                    while let Some(event) = stream.next().await {
                        let terminal = event.is_terminal();
                        // A send error only means nobody is listening right now
                        let _ = tx.send(event);
                        if terminal {
                            break;
                        }
                    }

                    watchdog.abort();
                    manager.runs.remove(&id);
                    debug!(instance = %id, "run task finished");
                });

                Ok(rx)
            }
        }
    }

    /// Follow a live run. `None` when no task is active for the id; the
    /// caller should then consult the stored row (see
    /// [`terminal_event_for`]).
    pub fn subscribe(&self, id: &str) -> Option<broadcast::Receiver<ProgressEvent>> {
        self.runs.get(id).map(|handle| handle.events.subscribe())
    }

    /// Cooperatively abort a live run. Returns whether a run was found.
    pub fn abort(&self, id: &str) -> bool {
        match self.runs.get(id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.runs.contains_key(id)
    }

    /// Abort every live run (service shutdown)
    pub fn abort_all(&self) {
        for entry in self.runs.iter() {
            entry.value().cancel.cancel();
        }
    }
}

/// Synthesize the terminal event recorded in a finished instance row, so a
/// late observer still receives exactly one terminal event.
pub fn terminal_event_for(instance: &Instance) -> Option<ProgressEvent> {
    match instance.status {
        InstanceStatus::Completed => {
            let decision = instance.outcome?;
            let outcome = Outcome {
                decision,
                price: match decision {
                    Decision::Accept => instance.final_price,
                    Decision::Reject => None,
                },
                reasoning: instance.outcome_reasoning.clone().unwrap_or_default(),
            };
            Some(ProgressEvent::complete(&outcome))
        }
        InstanceStatus::Failed => Some(ProgressEvent::error(
            instance
                .outcome_reasoning
                .clone()
                .unwrap_or_else(|| "negotiation failed".to_string()),
        )),
        _ => None,
    }
}
