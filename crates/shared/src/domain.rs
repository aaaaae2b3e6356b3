use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PinError;

pub const DEFAULT_PIN_LENGTH: usize = 5;
pub const DEFAULT_TOTAL_ROUNDS: u32 = 3;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(RoomId);
id_newtype!(PlayerId);

/// Lifecycle of a room as reported by the server.
///
/// Variants are declared in lifecycle order so `Ord` reflects progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    #[serde(alias = "waiting")]
    Lobby,
    PinsSelected,
    Playing,
    Finished,
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoomStatus::Lobby => "lobby",
            RoomStatus::PinsSelected => "pins_selected",
            RoomStatus::Playing => "playing",
            RoomStatus::Finished => "finished",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub player_name: String,
    pub hints_enabled: bool,
    pub pin_length: usize,
    /// Seconds per round; zero means the round is untimed.
    pub timer_duration: u32,
    pub is_private: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            player_name: String::new(),
            hints_enabled: true,
            pin_length: DEFAULT_PIN_LENGTH,
            timer_duration: 0,
            is_private: false,
        }
    }
}

/// A fixed-length sequence of decimal digits, used both for secret pins and guesses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pin(String);

impl Pin {
    pub fn parse(raw: &str) -> Result<Self, PinError> {
        if raw.is_empty() {
            return Err(PinError::Empty);
        }
        if let Some((position, found)) = raw.chars().enumerate().find(|(_, c)| !c.is_ascii_digit())
        {
            return Err(PinError::NonDigit { position, found });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn parse_with_length(raw: &str, expected: usize) -> Result<Self, PinError> {
        let pin = Self::parse(raw)?;
        if pin.len() != expected {
            return Err(PinError::LengthMismatch {
                expected,
                actual: pin.len(),
            });
        }
        Ok(pin)
    }

    /// Builds a pin from digit values; every value must be below ten.
    pub fn from_digits(digits: &[u8]) -> Result<Self, PinError> {
        let raw: String = digits
            .iter()
            .map(|d| char::from_digit(u32::from(*d), 10).unwrap_or('?'))
            .collect();
        Self::parse(&raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn digits(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.bytes().map(|b| b - b'0')
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Pin {
    type Error = PinError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Pin> for String {
    fn from(value: Pin) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_order_follows_lifecycle() {
        assert!(RoomStatus::Lobby < RoomStatus::PinsSelected);
        assert!(RoomStatus::PinsSelected < RoomStatus::Playing);
        assert!(RoomStatus::Playing < RoomStatus::Finished);
    }

    #[test]
    fn waiting_is_accepted_as_lobby() {
        let status: RoomStatus = serde_json::from_str("\"waiting\"").expect("status");
        assert_eq!(status, RoomStatus::Lobby);
        assert_eq!(
            serde_json::to_string(&RoomStatus::PinsSelected).expect("json"),
            "\"pins_selected\""
        );
    }

    #[test]
    fn pin_rejects_non_digits_and_wrong_length() {
        assert_eq!(
            Pin::parse("12a45"),
            Err(PinError::NonDigit {
                position: 2,
                found: 'a'
            })
        );
        assert_eq!(Pin::parse(""), Err(PinError::Empty));
        assert_eq!(
            Pin::parse_with_length("1234", 5),
            Err(PinError::LengthMismatch {
                expected: 5,
                actual: 4
            })
        );
        assert!(serde_json::from_str::<Pin>("\"12x\"").is_err());
    }

    #[test]
    fn pin_from_digits_keeps_slot_order() {
        let pin = Pin::from_digits(&[1, 2, 3, 4, 5]).expect("pin");
        assert_eq!(pin.as_str(), "12345");
        assert_eq!(pin.digits().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert!(Pin::from_digits(&[1, 12]).is_err());
    }

    #[test]
    fn config_fills_missing_fields_with_defaults() {
        let config: GameConfig =
            serde_json::from_str(r#"{"player_name":"TestPlayer","timer_duration":60}"#)
                .expect("config");
        assert_eq!(config.pin_length, DEFAULT_PIN_LENGTH);
        assert!(config.hints_enabled);
        assert_eq!(config.timer_duration, 60);
    }
}
