use std::collections::HashMap;

use chrono::{DateTime, Utc};
use shared::{
    domain::{GameConfig, PlayerId, RoomId, RoomStatus},
    protocol::RoomSnapshot,
};

/// The client's snapshot of server-authoritative room state.
///
/// Always replaced as a whole; fields are never merged across fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomView {
    pub room_id: RoomId,
    pub status: RoomStatus,
    /// 1-indexed.
    pub current_round: u32,
    pub total_rounds: u32,
    pub scores: HashMap<PlayerId, u32>,
    pub round_start_time: Option<DateTime<Utc>>,
    pub config: GameConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Winner(PlayerId),
    Draw,
}

impl From<RoomSnapshot> for RoomView {
    fn from(snapshot: RoomSnapshot) -> Self {
        Self {
            room_id: snapshot.id,
            status: snapshot.status,
            // the server reports 0 until the first round starts
            current_round: snapshot.current_round.max(1),
            total_rounds: snapshot.total_rounds.max(1),
            scores: snapshot.scores.unwrap_or_default(),
            round_start_time: snapshot.round_start_time,
            config: snapshot.config.unwrap_or_default(),
        }
    }
}

impl RoomView {
    pub fn score_for(&self, player_id: &PlayerId) -> u32 {
        self.scores.get(player_id).copied().unwrap_or(0)
    }

    pub fn round_label(&self) -> String {
        format!("{} / {}", self.current_round, self.total_rounds)
    }

    /// Winner of a finished room; `None` while the game is still running.
    pub fn outcome(&self) -> Option<Outcome> {
        if self.status != RoomStatus::Finished {
            return None;
        }
        let Some(top) = self.scores.values().copied().max() else {
            return Some(Outcome::Draw);
        };
        let mut leaders = self.scores.iter().filter(|(_, score)| **score == top);
        match (leaders.next(), leaders.next()) {
            (Some((player_id, _)), None) => Some(Outcome::Winner(player_id.clone())),
            _ => Some(Outcome::Draw),
        }
    }

    /// True when status, round or any score differs from `other`.
    pub fn differs_from(&self, other: &RoomView) -> bool {
        self.status != other.status
            || self.current_round != other.current_round
            || self.scores != other.scores
    }
}
