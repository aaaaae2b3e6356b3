use shared::domain::{Pin, DEFAULT_PIN_LENGTH};
use tracing::debug;

use crate::error::PinEntryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinSlot {
    pub index: usize,
    pub digit: Option<u8>,
    /// Logical timestamp of the last write, for ordering only.
    pub modified_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// At least one slot is still empty.
    Pending,
    /// Every slot is filled but the guess needs an explicit confirm.
    AwaitingConfirm,
    /// The guess was submitted and the slots were cleared.
    Finalized(Pin),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinalizeTrigger {
    Auto,
    Confirm,
}

/// Filling the final slot in natural order submits the guess; any other way of
/// completing it waits for `on_confirm`.
#[derive(Debug, Clone)]
pub struct PinEntryController {
    slots: Vec<PinSlot>,
    dirty_since_complete: bool,
    clock: u64,
}

impl Default for PinEntryController {
    fn default() -> Self {
        Self::new(DEFAULT_PIN_LENGTH)
    }
}

impl PinEntryController {
    /// Creates a controller with `pin_length` empty slots (at least one).
    pub fn new(pin_length: usize) -> Self {
        let pin_length = pin_length.max(1);
        Self {
            slots: (0..pin_length)
                .map(|index| PinSlot {
                    index,
                    digit: None,
                    modified_at: 0,
                })
                .collect(),
            dirty_since_complete: false,
            clock: 0,
        }
    }

    pub fn pin_length(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[PinSlot] {
        &self.slots
    }

    pub fn digits(&self) -> Vec<Option<u8>> {
        self.slots.iter().map(|slot| slot.digit).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(|slot| slot.digit.is_some())
    }

    pub fn is_dirty_since_complete(&self) -> bool {
        self.dirty_since_complete
    }

    /// The natural fill cursor: the first empty slot, or `pin_length()` once
    /// every slot is filled.
    pub fn active_index(&self) -> usize {
        self.slots
            .iter()
            .position(|slot| slot.digit.is_none())
            .unwrap_or(self.slots.len())
    }

    /// Keyboard entry of `input` into slot `index`.
    pub fn on_digit_entered(
        &mut self,
        index: usize,
        input: &str,
    ) -> Result<EntryOutcome, PinEntryError> {
        let digit = parse_digit(input)?;
        self.check_index(index)?;

        let was_complete = self.is_complete();
        let natural = index == self.active_index();
        self.write(index, Some(digit));

        if !self.is_complete() {
            return Ok(EntryOutcome::Pending);
        }

        if !was_complete && natural && index == self.slots.len() - 1 {
            if let Some(pin) = self.finalize(FinalizeTrigger::Auto) {
                return Ok(EntryOutcome::Finalized(pin));
            }
        }

        if !self.dirty_since_complete {
            debug!(index, "pin entry: guess completed out of order; awaiting confirm");
        }
        self.dirty_since_complete = true;
        Ok(EntryOutcome::AwaitingConfirm)
    }

    /// Pin pad entry: writes into the first empty slot. Ignored once every
    /// slot is filled.
    pub fn press_pad_digit(&mut self, input: &str) -> Result<EntryOutcome, PinEntryError> {
        parse_digit(input)?;
        let index = self.active_index();
        if index >= self.slots.len() {
            return Ok(EntryOutcome::AwaitingConfirm);
        }
        self.on_digit_entered(index, input)
    }

    /// Explicit confirm. Submits only when every slot is filled.
    pub fn on_confirm(&mut self) -> Option<Pin> {
        if !self.is_complete() {
            return None;
        }
        self.finalize(FinalizeTrigger::Confirm)
    }

    pub fn clear_slot(&mut self, index: usize) -> Result<(), PinEntryError> {
        self.check_index(index)?;
        if self.slots[index].digit.is_some() {
            self.write(index, None);
        }
        Ok(())
    }

    /// Pin pad backspace: clears the highest filled slot.
    pub fn pad_backspace(&mut self) {
        if let Some(index) = self.slots.iter().rposition(|slot| slot.digit.is_some()) {
            self.write(index, None);
        }
    }

    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.digit = None;
        }
        self.dirty_since_complete = false;
    }

    /// Clears all slots for a new round, resizing when the round uses a
    /// different pin length.
    pub fn reset_for_round(&mut self, pin_length: usize) {
        if pin_length.max(1) != self.slots.len() {
            let clock = self.clock;
            *self = Self::new(pin_length);
            self.clock = clock;
        } else {
            self.reset();
        }
    }

    fn check_index(&self, index: usize) -> Result<(), PinEntryError> {
        if index >= self.slots.len() {
            return Err(PinEntryError::SlotOutOfRange {
                index,
                pin_length: self.slots.len(),
            });
        }
        Ok(())
    }

    fn write(&mut self, index: usize, digit: Option<u8>) {
        self.clock += 1;
        let slot = &mut self.slots[index];
        slot.digit = digit;
        slot.modified_at = self.clock;
        if digit.is_none() {
            self.dirty_since_complete = false;
        }
    }

    fn finalize(&mut self, trigger: FinalizeTrigger) -> Option<Pin> {
        let digits: Vec<u8> = self.slots.iter().filter_map(|slot| slot.digit).collect();
        let pin = Pin::from_digits(&digits).ok()?;
        debug!(?trigger, guess = %pin, "pin entry: guess finalized");
        self.reset();
        Some(pin)
    }
}

fn parse_digit(input: &str) -> Result<u8, PinEntryError> {
    let mut chars = input.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_digit() => Ok(c as u8 - b'0'),
        _ => Err(PinEntryError::InvalidDigit {
            input: input.to_string(),
        }),
    }
}

#[cfg(test)]
#[path = "tests/pin_entry_tests.rs"]
mod tests;
