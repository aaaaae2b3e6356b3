use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    domain::{GameConfig, Pin, PlayerId, RoomId, RoomStatus, DEFAULT_TOTAL_ROUNDS},
    rules::Hint,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub player_name: String,
    pub config: GameConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGameRequest {
    pub player_name: String,
    pub room_id: RoomId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStatus {
    /// A new room was created and is waiting for an opponent.
    Waiting,
    /// Matchmaking placed the player in an existing public room.
    Matched,
    /// The player joined a room by id.
    Joined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGameResponse {
    pub room_id: RoomId,
    pub player_id: PlayerId,
    pub status: JoinStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<GameConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectPinRequest {
    pub pins: Vec<Pin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectPinResponse {
    pub status: RoomStatus,
}

fn default_total_rounds() -> u32 {
    DEFAULT_TOTAL_ROUNDS
}

/// Body of `GET /games/{room_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub status: RoomStatus,
    #[serde(default)]
    pub current_round: u32,
    #[serde(default = "default_total_rounds")]
    pub total_rounds: u32,
    #[serde(default)]
    pub scores: Option<HashMap<PlayerId, u32>>,
    #[serde(default)]
    pub config: Option<GameConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_start_time: Option<DateTime<Utc>>,
}

/// Messages exchanged over the game websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum GameMessage {
    Guess {
        room_id: RoomId,
        player_id: PlayerId,
        guess: Pin,
        round: u32,
    },
    PlayerReady {
        room_id: RoomId,
        player_id: PlayerId,
    },
    GameStart {
        room_id: RoomId,
        status: RoomStatus,
    },
    RoundStart {
        room_id: RoomId,
        round: u32,
    },
    GuessResult {
        room_id: RoomId,
        player_id: PlayerId,
        guess: String,
        hints: Vec<Hint>,
    },
    RoundEnd {
        room_id: RoomId,
        #[serde(default, deserialize_with = "empty_as_none")]
        winner_id: Option<PlayerId>,
        round: u32,
        #[serde(default)]
        scores: Option<HashMap<PlayerId, u32>>,
    },
    GameEnd {
        room_id: RoomId,
        #[serde(default, deserialize_with = "empty_as_none")]
        winner_id: Option<PlayerId>,
        #[serde(default)]
        scores: Option<HashMap<PlayerId, u32>>,
        #[serde(default)]
        is_draw: bool,
    },
}

// The server sends "" when a round or game has no winner.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<PlayerId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|id| !id.is_empty()).map(PlayerId))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_room_snapshot_with_server_defaults() {
        let snapshot: RoomSnapshot = serde_json::from_str(
            r#"{
                "id": "room-123",
                "status": "playing",
                "current_round": 2,
                "scores": {"p1": 1},
                "config": {
                    "player_name": "TestPlayer",
                    "hints_enabled": true,
                    "pin_length": 5,
                    "timer_duration": 60
                },
                "round_start_time": "2026-01-05T10:00:00+00:00"
            }"#,
        )
        .expect("snapshot");

        assert_eq!(snapshot.id, RoomId::new("room-123"));
        assert_eq!(snapshot.status, RoomStatus::Playing);
        assert_eq!(snapshot.total_rounds, DEFAULT_TOTAL_ROUNDS);
        assert_eq!(
            snapshot.scores.as_ref().and_then(|s| s.get(&PlayerId::new("p1"))),
            Some(&1)
        );
        assert!(snapshot.round_start_time.is_some());
    }

    #[test]
    fn decodes_null_scores_and_config() {
        let snapshot: RoomSnapshot =
            serde_json::from_str(r#"{"id":"r","status":"waiting","scores":null,"config":null}"#)
                .expect("snapshot");
        assert_eq!(snapshot.status, RoomStatus::Lobby);
        assert_eq!(snapshot.current_round, 0);
        assert!(snapshot.scores.is_none());
        assert!(snapshot.config.is_none());
    }

    #[test]
    fn guess_message_uses_type_payload_envelope() {
        let message = GameMessage::Guess {
            room_id: RoomId::new("room-123"),
            player_id: PlayerId::new("p1"),
            guess: Pin::parse("12345").expect("pin"),
            round: 2,
        };
        let value = serde_json::to_value(&message).expect("json");
        assert_eq!(value["type"], "guess");
        assert_eq!(value["payload"]["guess"], "12345");
        assert_eq!(value["payload"]["round"], 2);
    }

    #[test]
    fn round_end_without_winner_decodes_to_none() {
        let message: GameMessage = serde_json::from_str(
            r#"{"type":"round_end","payload":{"room_id":"r","winner_id":"","round":1,"scores":{"p1":0}}}"#,
        )
        .expect("message");
        match message {
            GameMessage::RoundEnd { winner_id, .. } => assert!(winner_id.is_none()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn guess_result_hints_decode_from_integers() {
        let message: GameMessage = serde_json::from_str(
            r#"{"type":"guess_result","payload":{"room_id":"r","player_id":"p1","guess":"123","hints":[2,1,0]}}"#,
        )
        .expect("message");
        match message {
            GameMessage::GuessResult { hints, .. } => {
                assert_eq!(hints, vec![Hint::Correct, Hint::Misplaced, Hint::Absent]);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
