use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinError {
    #[error("pin must not be empty")]
    Empty,
    #[error("pin must contain only digits, found {found:?} at position {position}")]
    NonDigit { position: usize, found: char },
    #[error("pin must be {expected} digits long, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}
