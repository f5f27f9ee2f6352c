//! Periodic container stats polling.
//!
//! The poller owns a registry mapping container identity to one live polling
//! task. Starting a poll for an identity that already has one cancels the old
//! task first; there are never two timers for the same identity. A tick whose
//! payload reports the container not running delivers that final update and
//! then retires its own handle, so a stopped container is not polled again.
//! Fetch errors are delivered to the subscriber and do not stop the loop.

use crate::gateway::{ApiError, ContainerApi, StatsPayload};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Updates pushed to poll subscribers.
#[derive(Debug)]
pub enum StatsEvent {
    /// One successful fetch. When `payload.running` is false this is the last
    /// event the poll delivers.
    Update {
        identity: String,
        payload: StatsPayload,
    },
    /// One failed fetch; the poll keeps running.
    Error { identity: String, error: ApiError },
    /// The poll was cancelled, either explicitly or by a replacement.
    Cancelled { identity: String },
}

struct PollTask {
    generation: u64,
    handle: JoinHandle<()>,
    events: mpsc::UnboundedSender<StatsEvent>,
}

#[derive(Default)]
struct Registry {
    tasks: Mutex<HashMap<String, PollTask>>,
    next_generation: AtomicU64,
    cancellations: AtomicU64,
}

impl Registry {
    /// Removes the identity's entry only if it still belongs to `generation`;
    /// a task that was already replaced must not retire its successor.
    fn remove_if_current(&self, identity: &str, generation: u64) {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks
            .get(identity)
            .is_some_and(|task| task.generation == generation)
        {
            tasks.remove(identity);
        }
    }

    fn cancel(&self, task: PollTask, identity: &str) {
        task.handle.abort();
        self.cancellations.fetch_add(1, Ordering::SeqCst);
        let _ = task.events.send(StatsEvent::Cancelled {
            identity: identity.to_string(),
        });
    }
}

/// Owns all polling tasks. Cheap to clone; clones share the registry.
#[derive(Clone, Default)]
pub struct StatsPoller {
    registry: Arc<Registry>,
}

impl StatsPoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts polling the identity at the given cadence, pushing events to
    /// `events`. Any live poll for the same identity is cancelled first. The
    /// first fetch happens immediately.
    pub fn begin(
        &self,
        identity: &str,
        interval: Duration,
        api: Arc<dyn ContainerApi>,
        events: mpsc::UnboundedSender<StatsEvent>,
    ) {
        let generation = self.registry.next_generation.fetch_add(1, Ordering::SeqCst);
        let handle = tokio::spawn(poll_loop(
            identity.to_string(),
            generation,
            interval,
            api,
            events.clone(),
            Arc::clone(&self.registry),
        ));

        let task = PollTask {
            generation,
            handle,
            events,
        };
        let previous = self
            .registry
            .tasks
            .lock()
            .unwrap()
            .insert(identity.to_string(), task);
        if let Some(previous) = previous {
            self.registry.cancel(previous, identity);
        }
    }

    /// Cancels the identity's poll. Returns false when none was live.
    pub fn stop(&self, identity: &str) -> bool {
        let removed = self.registry.tasks.lock().unwrap().remove(identity);
        match removed {
            Some(task) => {
                self.registry.cancel(task, identity);
                true
            }
            None => false,
        }
    }

    /// Whether a poll is currently live for the identity.
    pub fn is_active(&self, identity: &str) -> bool {
        self.registry.tasks.lock().unwrap().contains_key(identity)
    }

    /// Number of polls cancelled so far (explicit stops and replacements;
    /// self-termination on a not-running payload does not count).
    pub fn cancellation_count(&self) -> u64 {
        self.registry.cancellations.load(Ordering::SeqCst)
    }
}

async fn poll_loop(
    identity: String,
    generation: u64,
    interval: Duration,
    api: Arc<dyn ContainerApi>,
    events: mpsc::UnboundedSender<StatsEvent>,
    registry: Arc<Registry>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match api.container_stats(&identity).await {
            Ok(payload) => {
                let running = payload.running;
                if events
                    .send(StatsEvent::Update {
                        identity: identity.clone(),
                        payload,
                    })
                    .is_err()
                {
                    // Subscriber went away; nothing left to poll for.
                    registry.remove_if_current(&identity, generation);
                    return;
                }
                if !running {
                    registry.remove_if_current(&identity, generation);
                    return;
                }
            }
            Err(error) => {
                let _ = events.send(StatsEvent::Error {
                    identity: identity.clone(),
                    error,
                });
            }
        }
    }
}
