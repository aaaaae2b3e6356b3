use shared::error::PinError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinEntryError {
    #[error("invalid digit {input:?}: expected a single character 0-9")]
    InvalidDigit { input: String },
    #[error("slot {index} is out of range for a pin of length {pin_length}")]
    SlotOutOfRange { index: usize, pin_length: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinSelectionError {
    #[error("round {round} is out of range; the game has {rounds} rounds")]
    RoundOutOfRange { round: usize, rounds: usize },
    #[error("pin for round {round} is invalid: {source}")]
    InvalidPin {
        round: usize,
        #[source]
        source: PinError,
    },
    #[error("pin for round {round} has not been selected")]
    Missing { round: usize },
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid server url {url:?}: {reason}")]
    InvalidServerUrl { url: String, reason: String },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("game socket failure: {0}")]
    Socket(String),
}
