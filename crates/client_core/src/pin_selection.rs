use rand::Rng;
use shared::{
    domain::{Pin, DEFAULT_TOTAL_ROUNDS},
    protocol::SelectPinRequest,
};

use crate::error::PinSelectionError;

#[derive(Debug, Clone)]
pub struct PinSelection {
    pin_length: usize,
    pins: Vec<Option<Pin>>,
}

impl PinSelection {
    pub fn new(pin_length: usize, rounds: usize) -> Self {
        Self {
            pin_length: pin_length.max(1),
            pins: vec![None; rounds.max(1)],
        }
    }

    pub fn for_pin_length(pin_length: usize) -> Self {
        Self::new(pin_length, DEFAULT_TOTAL_ROUNDS as usize)
    }

    pub fn pin_length(&self) -> usize {
        self.pin_length
    }

    pub fn rounds(&self) -> usize {
        self.pins.len()
    }

    /// Rounds are 1-indexed, matching the server's round numbers.
    pub fn pin(&self, round: usize) -> Option<&Pin> {
        self.slot_index(round).ok().and_then(|i| self.pins[i].as_ref())
    }

    pub fn set(&mut self, round: usize, raw: &str) -> Result<(), PinSelectionError> {
        let index = self.slot_index(round)?;
        let pin = Pin::parse_with_length(raw.trim(), self.pin_length)
            .map_err(|source| PinSelectionError::InvalidPin { round, source })?;
        self.pins[index] = Some(pin);
        Ok(())
    }

    pub fn randomize(&mut self, round: usize) -> Result<(), PinSelectionError> {
        let raw = random_digits(self.pin_length, &mut rand::thread_rng());
        self.set(round, &raw)
    }

    pub fn randomize_all(&mut self) -> Result<(), PinSelectionError> {
        for round in 1..=self.pins.len() {
            self.randomize(round)?;
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.pins.iter().all(Option::is_some)
    }

    pub fn to_request(&self) -> Result<SelectPinRequest, PinSelectionError> {
        let pins = self
            .pins
            .iter()
            .enumerate()
            .map(|(i, pin)| pin.clone().ok_or(PinSelectionError::Missing { round: i + 1 }))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SelectPinRequest { pins })
    }

    fn slot_index(&self, round: usize) -> Result<usize, PinSelectionError> {
        if round == 0 || round > self.pins.len() {
            return Err(PinSelectionError::RoundOutOfRange {
                round,
                rounds: self.pins.len(),
            });
        }
        Ok(round - 1)
    }
}

fn random_digits(len: usize, rng: &mut impl Rng) -> String {
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
