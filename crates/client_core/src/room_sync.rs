use std::{
    sync::{Arc, Mutex as StdMutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use shared::domain::{RoomId, RoomStatus};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::{AbortHandle, JoinHandle},
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{api::RoomApi, types::RoomView};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    RoomUpdated(RoomView),
    StatusChanged {
        from: RoomStatus,
        to: RoomStatus,
    },
    RoundAdvanced {
        from: u32,
        to: u32,
        round_start_time: Option<DateTime<Utc>>,
    },
    /// Terminal: the retry budget was exhausted and polling halted.
    SyncLost {
        room_id: RoomId,
        attempts: u32,
        reason: String,
    },
    /// Polling for `room_id` ended; no further events follow for that session.
    Stopped { room_id: RoomId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StaleUpdate {
    #[error("snapshot for room {fetched} while tracking room {held}")]
    ForeignRoom { held: RoomId, fetched: RoomId },
    #[error("status regressed from {held} to {fetched}")]
    StatusRegressed {
        held: RoomStatus,
        fetched: RoomStatus,
    },
    #[error("round regressed from {held} to {fetched}")]
    RoundRegressed { held: u32, fetched: u32 },
}

/// Reconciliation rules for fetched room views; needs no runtime.
#[derive(Debug, Default)]
pub struct RoomTracker {
    held: Option<RoomView>,
}

impl RoomTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held(&self) -> Option<&RoomView> {
        self.held.as_ref()
    }

    pub fn reset(&mut self) {
        self.held = None;
    }

    /// Replaces the held view with `fetched` unless it is older, returning the
    /// events the replacement produces.
    ///
    /// Status and round are checked independently; a regression in either
    /// discards the whole fetch.
    pub fn apply(&mut self, fetched: RoomView) -> Result<Vec<SyncEvent>, StaleUpdate> {
        let Some(held) = self.held.as_ref() else {
            self.held = Some(fetched.clone());
            return Ok(vec![SyncEvent::RoomUpdated(fetched)]);
        };

        if fetched.room_id != held.room_id {
            return Err(StaleUpdate::ForeignRoom {
                held: held.room_id.clone(),
                fetched: fetched.room_id,
            });
        }
        if fetched.status < held.status {
            return Err(StaleUpdate::StatusRegressed {
                held: held.status,
                fetched: fetched.status,
            });
        }
        if fetched.current_round < held.current_round {
            return Err(StaleUpdate::RoundRegressed {
                held: held.current_round,
                fetched: fetched.current_round,
            });
        }

        let mut events = Vec::new();
        if fetched.differs_from(held) {
            events.push(SyncEvent::RoomUpdated(fetched.clone()));
        }
        if fetched.status != held.status {
            events.push(SyncEvent::StatusChanged {
                from: held.status,
                to: fetched.status,
            });
        }
        if fetched.current_round > held.current_round {
            events.push(SyncEvent::RoundAdvanced {
                from: held.current_round,
                to: fetched.current_round,
                round_start_time: fetched.round_start_time,
            });
        }

        self.held = Some(fetched);
        Ok(events)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Consecutive fetch failures tolerated before sync is declared lost.
    pub max_retries: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

struct EngineState {
    /// Bumped on every start/stop; a poll result is applied only while its
    /// session's generation is current.
    generation: u64,
    tracker: RoomTracker,
    session: Option<PollSession>,
}

struct PollSession {
    room_id: RoomId,
    task: JoinHandle<()>,
}

pub struct RoomSyncEngine {
    api: Arc<dyn RoomApi>,
    options: SyncOptions,
    state: Arc<Mutex<EngineState>>,
    events: broadcast::Sender<SyncEvent>,
    /// Held outside `state` so `Drop` can abort the poller while it owns the lock.
    poller: StdMutex<Option<AbortHandle>>,
}

impl RoomSyncEngine {
    pub fn new(api: Arc<dyn RoomApi>, options: SyncOptions) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            api,
            options,
            state: Arc::new(Mutex::new(EngineState {
                generation: 0,
                tracker: RoomTracker::new(),
                session: None,
            })),
            events,
            poller: StdMutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Starts polling `room_id`, replacing any running session.
    pub async fn start(&self, room_id: RoomId, poll_interval: Duration) {
        let mut state = self.state.lock().await;
        if let Some(previous) = state.session.take() {
            previous.task.abort();
            info!(room_id = %previous.room_id, "sync: replacing running session");
            let _ = self.events.send(SyncEvent::Stopped {
                room_id: previous.room_id,
            });
        }
        state.generation += 1;
        state.tracker.reset();

        let poller = Poller {
            api: Arc::clone(&self.api),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            room_id: room_id.clone(),
            generation: state.generation,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            max_retries: self.options.max_retries,
        };
        info!(
            %room_id,
            poll_interval_ms = poller.poll_interval.as_millis() as u64,
            "sync: polling started"
        );
        let task = tokio::spawn(poller.run());
        self.replace_poller(Some(task.abort_handle()));
        state.session = Some(PollSession { room_id, task });
    }

    /// Stops polling. Once this returns no further `RoomUpdated` is emitted for
    /// the stopped session, even if a fetch was in flight.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.generation += 1;
        state.tracker.reset();
        self.replace_poller(None);
        if let Some(session) = state.session.take() {
            session.task.abort();
            info!(room_id = %session.room_id, "sync: polling stopped");
            let _ = self.events.send(SyncEvent::Stopped {
                room_id: session.room_id,
            });
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.session.is_some()
    }

    pub async fn current_view(&self) -> Option<RoomView> {
        self.state.lock().await.tracker.held().cloned()
    }

    fn replace_poller(&self, handle: Option<AbortHandle>) {
        let mut slot = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = std::mem::replace(&mut *slot, handle) {
            previous.abort();
        }
    }
}

impl Drop for RoomSyncEngine {
    fn drop(&mut self) {
        self.replace_poller(None);
        if let Ok(mut state) = self.state.try_lock() {
            state.generation += 1;
            if let Some(session) = state.session.take() {
                session.task.abort();
            }
        }
    }
}

struct Poller {
    api: Arc<dyn RoomApi>,
    state: Arc<Mutex<EngineState>>,
    events: broadcast::Sender<SyncEvent>,
    room_id: RoomId,
    generation: u64,
    poll_interval: Duration,
    max_retries: u32,
}

impl Poller {
    async fn run(self) {
        let mut ticker = time::interval(self.poll_interval);
        // ticks that elapse while a fetch is in flight are dropped
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut failures: u32 = 0;

        loop {
            ticker.tick().await;
            let result = self.api.fetch_room(&self.room_id).await;

            let mut state = self.state.lock().await;
            if state.generation != self.generation {
                debug!(room_id = %self.room_id, "sync: dropping result of cancelled session");
                return;
            }

            match result {
                Ok(snapshot) => {
                    failures = 0;
                    match state.tracker.apply(RoomView::from(snapshot)) {
                        Ok(events) => {
                            for event in events {
                                let _ = self.events.send(event);
                            }
                        }
                        Err(stale) => {
                            debug!(room_id = %self.room_id, %stale, "sync: discarding stale room update");
                        }
                    }
                    let finished = state
                        .tracker
                        .held()
                        .is_some_and(|view| view.status == RoomStatus::Finished);
                    if finished {
                        info!(room_id = %self.room_id, "sync: room finished; polling halted");
                        self.end_session(&mut state);
                        return;
                    }
                }
                Err(err) => {
                    failures += 1;
                    if failures > self.max_retries {
                        error!(
                            room_id = %self.room_id,
                            attempts = failures,
                            error = %err,
                            "sync: retry budget exhausted; sync lost"
                        );
                        let _ = self.events.send(SyncEvent::SyncLost {
                            room_id: self.room_id.clone(),
                            attempts: failures,
                            reason: err.to_string(),
                        });
                        self.end_session(&mut state);
                        return;
                    }
                    warn!(
                        room_id = %self.room_id,
                        attempt = failures,
                        max_retries = self.max_retries,
                        error = %err,
                        "sync: room fetch failed; retrying"
                    );
                }
            }
        }
    }

    fn end_session(&self, state: &mut EngineState) {
        // dropping our own JoinHandle detaches; the task returns right after
        state.session = None;
        let _ = self.events.send(SyncEvent::Stopped {
            room_id: self.room_id.clone(),
        });
    }
}

#[cfg(test)]
#[path = "tests/room_sync_tests.rs"]
mod tests;
