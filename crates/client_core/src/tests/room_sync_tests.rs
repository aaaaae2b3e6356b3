use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex as StdMutex,
    },
};

use async_trait::async_trait;
use chrono::TimeZone;
use shared::{
    domain::{GameConfig, PlayerId},
    protocol::{JoinGameResponse, RoomSnapshot, SelectPinRequest, SelectPinResponse},
};
use tokio::sync::{broadcast::error::TryRecvError, Notify};

use super::*;
use crate::error::RequestError;

const TICK: Duration = Duration::from_millis(5);

fn snapshot(status: RoomStatus, round: u32, scores: &[(&str, u32)]) -> RoomSnapshot {
    RoomSnapshot {
        id: RoomId::new("room-123"),
        status,
        current_round: round,
        total_rounds: 3,
        scores: Some(
            scores
                .iter()
                .map(|(id, score)| (PlayerId::new(*id), *score))
                .collect(),
        ),
        config: Some(GameConfig {
            player_name: "TestPlayer".into(),
            hints_enabled: true,
            pin_length: 5,
            timer_duration: 60,
            is_private: false,
        }),
        round_start_time: Utc.with_ymd_and_hms(2026, 1, 5, 10, round, 0).single(),
    }
}

fn view(status: RoomStatus, round: u32, scores: &[(&str, u32)]) -> RoomView {
    RoomView::from(snapshot(status, round, scores))
}

fn unavailable() -> RequestError {
    RequestError::Status {
        endpoint: "http://127.0.0.1/games/room-123".into(),
        status: 503,
        message: "unavailable".into(),
    }
}

/// Serves queued fetch results in order, then repeats the last snapshot.
struct ScriptedApi {
    queue: StdMutex<VecDeque<Result<RoomSnapshot, RequestError>>>,
    last: StdMutex<Option<RoomSnapshot>>,
    calls: AtomicUsize,
    gate: Option<FetchGate>,
}

struct FetchGate {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl ScriptedApi {
    fn new(script: Vec<Result<RoomSnapshot, RequestError>>) -> Self {
        Self {
            queue: StdMutex::new(script.into()),
            last: StdMutex::new(None),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    fn gated(script: Vec<Result<RoomSnapshot, RequestError>>) -> (Self, Arc<Notify>, Arc<Notify>) {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let mut api = Self::new(script);
        api.gate = Some(FetchGate {
            started: Arc::clone(&started),
            release: Arc::clone(&release),
        });
        (api, started, release)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoomApi for ScriptedApi {
    async fn create_game(
        &self,
        _player_name: &str,
        _config: &GameConfig,
    ) -> Result<JoinGameResponse, RequestError> {
        Err(unavailable())
    }

    async fn join_game(
        &self,
        _player_name: &str,
        _room_id: &RoomId,
    ) -> Result<JoinGameResponse, RequestError> {
        Err(unavailable())
    }

    async fn select_pins(
        &self,
        _room_id: &RoomId,
        _player_id: &PlayerId,
        _request: &SelectPinRequest,
    ) -> Result<SelectPinResponse, RequestError> {
        Err(unavailable())
    }

    async fn fetch_room(&self, _room_id: &RoomId) -> Result<RoomSnapshot, RequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        let next = self.queue.lock().expect("queue").pop_front();
        match next {
            Some(Ok(snapshot)) => {
                *self.last.lock().expect("last") = Some(snapshot.clone());
                Ok(snapshot)
            }
            Some(Err(err)) => Err(err),
            None => self.last.lock().expect("last").clone().ok_or_else(unavailable),
        }
    }
}

async fn next_event(rx: &mut broadcast::Receiver<SyncEvent>) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event before timeout")
        .expect("event channel open")
}

async fn wait_for_calls(api: &ScriptedApi, calls: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while api.calls() < calls {
            tokio::time::sleep(TICK).await;
        }
    })
    .await
    .expect("fetch calls before timeout");
}

fn engine(api: Arc<ScriptedApi>, max_retries: u32) -> RoomSyncEngine {
    RoomSyncEngine::new(api, SyncOptions { max_retries })
}

#[test]
fn tracker_emits_first_view_unconditionally() {
    let mut tracker = RoomTracker::new();
    let first = view(RoomStatus::Lobby, 1, &[]);
    let events = tracker.apply(first.clone()).expect("apply");
    assert_eq!(events, vec![SyncEvent::RoomUpdated(first.clone())]);
    assert_eq!(tracker.held(), Some(&first));
}

#[test]
fn tracker_reports_status_and_round_transitions_in_order() {
    let mut tracker = RoomTracker::new();
    tracker
        .apply(view(RoomStatus::PinsSelected, 1, &[]))
        .expect("apply");

    let next = view(RoomStatus::Playing, 2, &[("p1", 1)]);
    let events = tracker.apply(next.clone()).expect("apply");
    assert_eq!(
        events,
        vec![
            SyncEvent::RoomUpdated(next.clone()),
            SyncEvent::StatusChanged {
                from: RoomStatus::PinsSelected,
                to: RoomStatus::Playing,
            },
            SyncEvent::RoundAdvanced {
                from: 1,
                to: 2,
                round_start_time: next.round_start_time,
            },
        ]
    );
}

#[test]
fn tracker_discards_regressions_without_touching_held_view() {
    let mut tracker = RoomTracker::new();
    let held = view(RoomStatus::Playing, 2, &[("p1", 1)]);
    tracker.apply(held.clone()).expect("apply");

    assert_eq!(
        tracker.apply(view(RoomStatus::Playing, 1, &[("p1", 5)])),
        Err(StaleUpdate::RoundRegressed { held: 2, fetched: 1 })
    );
    // same round, earlier status
    assert_eq!(
        tracker.apply(view(RoomStatus::PinsSelected, 2, &[])),
        Err(StaleUpdate::StatusRegressed {
            held: RoomStatus::Playing,
            fetched: RoomStatus::PinsSelected,
        })
    );
    let mut foreign = held.clone();
    foreign.room_id = RoomId::new("room-999");
    assert!(matches!(
        tracker.apply(foreign),
        Err(StaleUpdate::ForeignRoom { .. })
    ));
    assert_eq!(tracker.held(), Some(&held));
}

#[test]
fn tracker_applies_later_status_in_same_round() {
    let mut tracker = RoomTracker::new();
    tracker
        .apply(view(RoomStatus::Playing, 3, &[("p1", 2)]))
        .expect("apply");
    let events = tracker
        .apply(view(RoomStatus::Finished, 3, &[("p1", 2)]))
        .expect("apply");
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[1],
        SyncEvent::StatusChanged {
            from: RoomStatus::Playing,
            to: RoomStatus::Finished
        }
    ));
}

#[test]
fn tracker_replaces_view_wholesale_but_skips_identical_emission() {
    let mut tracker = RoomTracker::new();
    tracker
        .apply(view(RoomStatus::Playing, 1, &[("p1", 0)]))
        .expect("apply");

    let mut refetched = view(RoomStatus::Playing, 1, &[("p1", 0)]);
    refetched.config.timer_duration = 30;
    let events = tracker.apply(refetched.clone()).expect("apply");
    assert!(events.is_empty());
    assert_eq!(tracker.held(), Some(&refetched));
}

#[tokio::test]
async fn engine_emits_round_transition_when_server_advances() {
    let api = Arc::new(ScriptedApi::new(vec![
        Ok(snapshot(RoomStatus::Playing, 1, &[("p1", 0)])),
        Ok(snapshot(RoomStatus::Playing, 2, &[("p1", 1)])),
    ]));
    let engine = engine(Arc::clone(&api), 3);
    let mut rx = engine.subscribe();
    engine.start(RoomId::new("room-123"), TICK).await;

    match next_event(&mut rx).await {
        SyncEvent::RoomUpdated(view) => assert_eq!(view.current_round, 1),
        other => panic!("unexpected event: {other:?}"),
    }
    match next_event(&mut rx).await {
        SyncEvent::RoomUpdated(view) => {
            assert_eq!(view.current_round, 2);
            assert_eq!(view.round_label(), "2 / 3");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(
        next_event(&mut rx).await,
        SyncEvent::RoundAdvanced { from: 1, to: 2, .. }
    ));
    assert_eq!(
        engine.current_view().await.map(|view| view.current_round),
        Some(2)
    );
    engine.stop().await;
}

#[tokio::test]
async fn engine_discards_out_of_order_round_and_keeps_polling() {
    let api = Arc::new(ScriptedApi::new(vec![
        Ok(snapshot(RoomStatus::Playing, 2, &[])),
        Ok(snapshot(RoomStatus::Playing, 1, &[])),
        Ok(snapshot(RoomStatus::Playing, 3, &[])),
    ]));
    let engine = engine(Arc::clone(&api), 3);
    let mut rx = engine.subscribe();
    engine.start(RoomId::new("room-123"), TICK).await;

    let mut rounds = Vec::new();
    loop {
        match next_event(&mut rx).await {
            SyncEvent::RoomUpdated(view) => rounds.push(view.current_round),
            SyncEvent::RoundAdvanced { from, to, .. } => {
                assert_eq!((from, to), (2, 3));
                break;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(rounds, vec![2, 3]);
    engine.stop().await;
}

#[tokio::test]
async fn engine_emits_score_only_changes_but_not_identical_polls() {
    let api = Arc::new(ScriptedApi::new(vec![
        Ok(snapshot(RoomStatus::Playing, 1, &[("p1", 0)])),
        Ok(snapshot(RoomStatus::Playing, 1, &[("p1", 0)])),
        Ok(snapshot(RoomStatus::Playing, 1, &[("p1", 1)])),
    ]));
    let engine = engine(Arc::clone(&api), 3);
    let mut rx = engine.subscribe();
    engine.start(RoomId::new("room-123"), TICK).await;

    assert!(matches!(next_event(&mut rx).await, SyncEvent::RoomUpdated(_)));
    match next_event(&mut rx).await {
        SyncEvent::RoomUpdated(view) => {
            assert_eq!(view.score_for(&PlayerId::new("p1")), 1);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    wait_for_calls(&api, 6).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    engine.stop().await;
}

#[tokio::test]
async fn engine_halts_when_room_finishes() {
    let api = Arc::new(ScriptedApi::new(vec![
        Ok(snapshot(RoomStatus::Playing, 3, &[("p1", 2), ("p2", 1)])),
        Ok(snapshot(RoomStatus::Finished, 3, &[("p1", 2), ("p2", 1)])),
    ]));
    let engine = engine(Arc::clone(&api), 3);
    let mut rx = engine.subscribe();
    engine.start(RoomId::new("room-123"), TICK).await;

    assert!(matches!(next_event(&mut rx).await, SyncEvent::RoomUpdated(_)));
    assert!(matches!(next_event(&mut rx).await, SyncEvent::RoomUpdated(_)));
    assert_eq!(
        next_event(&mut rx).await,
        SyncEvent::StatusChanged {
            from: RoomStatus::Playing,
            to: RoomStatus::Finished,
        }
    );
    assert_eq!(
        next_event(&mut rx).await,
        SyncEvent::Stopped {
            room_id: RoomId::new("room-123")
        }
    );

    assert!(!engine.is_running().await);
    let calls = api.calls();
    tokio::time::sleep(TICK * 10).await;
    assert_eq!(api.calls(), calls);
    assert_eq!(
        engine.current_view().await.map(|view| view.status),
        Some(RoomStatus::Finished)
    );
}

#[tokio::test]
async fn engine_reports_sync_lost_after_retry_budget() {
    let api = Arc::new(ScriptedApi::new(vec![
        Err(unavailable()),
        Err(unavailable()),
        Err(unavailable()),
    ]));
    let engine = engine(Arc::clone(&api), 2);
    let mut rx = engine.subscribe();
    engine.start(RoomId::new("room-123"), TICK).await;

    match next_event(&mut rx).await {
        SyncEvent::SyncLost {
            room_id,
            attempts,
            reason,
        } => {
            assert_eq!(room_id, RoomId::new("room-123"));
            assert_eq!(attempts, 3);
            assert!(reason.contains("503"), "unexpected reason: {reason}");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(next_event(&mut rx).await, SyncEvent::Stopped { .. }));
    assert!(!engine.is_running().await);
    assert_eq!(api.calls(), 3);
}

#[tokio::test]
async fn engine_resets_failure_count_after_success() {
    let api = Arc::new(ScriptedApi::new(vec![
        Err(unavailable()),
        Ok(snapshot(RoomStatus::Playing, 1, &[])),
        Err(unavailable()),
        Ok(snapshot(RoomStatus::Playing, 2, &[])),
    ]));
    let engine = engine(Arc::clone(&api), 1);
    let mut rx = engine.subscribe();
    engine.start(RoomId::new("room-123"), TICK).await;

    assert!(matches!(next_event(&mut rx).await, SyncEvent::RoomUpdated(_)));
    assert!(matches!(next_event(&mut rx).await, SyncEvent::RoomUpdated(_)));
    assert!(matches!(
        next_event(&mut rx).await,
        SyncEvent::RoundAdvanced { from: 1, to: 2, .. }
    ));
    assert!(engine.is_running().await);
    engine.stop().await;
}

#[tokio::test]
async fn stop_discards_in_flight_fetch() {
    let (api, started, release) =
        ScriptedApi::gated(vec![Ok(snapshot(RoomStatus::Playing, 2, &[]))]);
    let api = Arc::new(api);
    let engine = engine(Arc::clone(&api), 3);
    let mut rx = engine.subscribe();
    engine.start(RoomId::new("room-123"), TICK).await;

    tokio::time::timeout(Duration::from_secs(2), started.notified())
        .await
        .expect("fetch started");
    engine.stop().await;
    release.notify_waiters();
    tokio::time::sleep(TICK * 10).await;

    assert_eq!(
        next_event(&mut rx).await,
        SyncEvent::Stopped {
            room_id: RoomId::new("room-123")
        }
    );
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert!(engine.current_view().await.is_none());
    assert_eq!(api.calls(), 1);
}

#[tokio::test]
async fn restart_begins_a_fresh_session() {
    let api = Arc::new(ScriptedApi::new(vec![
        Ok(snapshot(RoomStatus::Playing, 3, &[])),
        Ok(snapshot(RoomStatus::Playing, 1, &[])),
    ]));
    let engine = engine(Arc::clone(&api), 3);
    let mut rx = engine.subscribe();
    engine.start(RoomId::new("room-123"), Duration::from_secs(60)).await;
    match next_event(&mut rx).await {
        SyncEvent::RoomUpdated(view) => assert_eq!(view.current_round, 3),
        other => panic!("unexpected event: {other:?}"),
    }

    engine.start(RoomId::new("room-123"), Duration::from_secs(60)).await;
    assert!(matches!(next_event(&mut rx).await, SyncEvent::Stopped { .. }));
    // the held view was discarded, so the lower round is accepted
    match next_event(&mut rx).await {
        SyncEvent::RoomUpdated(view) => assert_eq!(view.current_round, 1),
        other => panic!("unexpected event: {other:?}"),
    }
    engine.stop().await;
}

#[tokio::test]
async fn rounds_never_decrease_across_applied_updates() {
    let script: Vec<_> = [1, 2, 1, 2, 3, 2, 3]
        .iter()
        .map(|round| Ok(snapshot(RoomStatus::Playing, *round, &[])))
        .collect();
    let api = Arc::new(ScriptedApi::new(script));
    let engine = engine(Arc::clone(&api), 3);
    let mut rx = engine.subscribe();
    engine.start(RoomId::new("room-123"), TICK).await;

    let mut applied = HashMap::new();
    let mut last = 0;
    while last < 3 {
        if let SyncEvent::RoomUpdated(view) = next_event(&mut rx).await {
            assert!(view.current_round >= last);
            last = view.current_round;
            *applied.entry(last).or_insert(0) += 1;
        }
    }
    assert_eq!(applied.get(&1), Some(&1));
    assert_eq!(applied.get(&2), Some(&1));
    engine.stop().await;
}

#[tokio::test]
async fn dropping_engine_aborts_poller_holding_state_lock() {
    let api = Arc::new(ScriptedApi::new(vec![Ok(snapshot(RoomStatus::Playing, 1, &[]))]));
    let engine = engine(Arc::clone(&api), 3);
    engine.start(RoomId::new("room-123"), TICK).await;
    wait_for_calls(&api, 1).await;

    // the poller contends for this lock after every fetch
    let state = Arc::clone(&engine.state);
    let guard = state.lock().await;
    drop(engine);
    drop(guard);

    tokio::time::sleep(TICK * 4).await;
    let calls_after_drop = api.calls();
    tokio::time::sleep(TICK * 20).await;
    assert_eq!(api.calls(), calls_after_drop);
}
