use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::RoomView;

/// Countdown for a timed round, anchored at the server's round start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTimer {
    started_at: DateTime<Utc>,
    duration: chrono::Duration,
}

impl RoundTimer {
    /// `None` for untimed rounds (`duration_secs == 0`).
    pub fn new(started_at: DateTime<Utc>, duration_secs: u32) -> Option<Self> {
        if duration_secs == 0 {
            return None;
        }
        Some(Self {
            started_at,
            duration: chrono::Duration::seconds(i64::from(duration_secs)),
        })
    }

    pub fn from_view(view: &RoomView) -> Option<Self> {
        Self::new(view.round_start_time?, view.config.timer_duration)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + self.duration
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.deadline() - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline()
    }
}
