use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::Pin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Hint {
    /// Digit does not occur in any unmatched secret position.
    Absent,
    /// Digit occurs in the secret at a different position.
    Misplaced,
    /// Digit is in the right position.
    Correct,
}

impl From<Hint> for u8 {
    fn from(value: Hint) -> Self {
        match value {
            Hint::Absent => 0,
            Hint::Misplaced => 1,
            Hint::Correct => 2,
        }
    }
}

impl TryFrom<u8> for Hint {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Hint::Absent),
            1 => Ok(Hint::Misplaced),
            2 => Ok(Hint::Correct),
            other => Err(format!("unknown hint value {other}")),
        }
    }
}

/// Compares `guess` with `secret` position by position.
///
/// Exact matches are marked first. Remaining guess digits are then matched
/// against unmatched secret positions, each secret position used at most once.
pub fn generate_hints(guess: &Pin, secret: &Pin) -> Vec<Hint> {
    let guess: Vec<u8> = guess.digits().collect();
    let secret: Vec<u8> = secret.digits().collect();
    if guess.len() != secret.len() {
        warn!(
            guess_len = guess.len(),
            secret_len = secret.len(),
            "rules: guess length does not match pin length"
        );
        return vec![Hint::Absent; guess.len()];
    }

    let mut hints = vec![Hint::Absent; guess.len()];
    let mut secret_used = vec![false; secret.len()];

    for (i, (g, s)) in guess.iter().zip(&secret).enumerate() {
        if g == s {
            hints[i] = Hint::Correct;
            secret_used[i] = true;
        }
    }

    for (i, g) in guess.iter().enumerate() {
        if hints[i] == Hint::Correct {
            continue;
        }
        if let Some(j) = (0..secret.len()).find(|&j| !secret_used[j] && secret[j] == *g) {
            hints[i] = Hint::Misplaced;
            secret_used[j] = true;
        }
    }

    hints
}

pub fn is_win(guess: &Pin, secret: &Pin) -> bool {
    guess == secret
}
