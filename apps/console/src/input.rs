use anyhow::{anyhow, bail, Context, Result};
use client_core::{EntryOutcome, PinEntryController};
use shared::domain::Pin;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Digits pressed on the pin pad, one after another.
    Pad(String),
    Set { slot: usize, digit: String },
    Back,
    Clear { slot: usize },
    Enter,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  <digits>             press digits on the pin pad
  set <slot> <digit>   type a digit into a slot (slots start at 1)
  back                 erase the last filled slot
  clear <slot>         erase one slot
  enter                submit a completed guess
  quit";

/// Slots are 1-indexed for the player.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let command = match head {
        "set" => {
            let slot = parse_slot(words.next())?;
            let digit = words
                .next()
                .ok_or_else(|| anyhow!("usage: set <slot> <digit>"))?
                .to_string();
            Command::Set { slot, digit }
        }
        "clear" => Command::Clear {
            slot: parse_slot(words.next())?,
        },
        "back" => Command::Back,
        "enter" => Command::Enter,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        digits if digits.chars().all(|c| c.is_ascii_digit()) => Command::Pad(digits.to_string()),
        other => bail!("unknown command {other:?}; type help"),
    };
    if words.next().is_some() {
        bail!("too many arguments; type help");
    }
    Ok(Some(command))
}

fn parse_slot(raw: Option<&str>) -> Result<usize> {
    let raw = raw.ok_or_else(|| anyhow!("missing slot number"))?;
    let slot: usize = raw
        .parse()
        .with_context(|| format!("slot {raw:?} is not a number"))?;
    if slot == 0 {
        bail!("slots start at 1");
    }
    Ok(slot)
}

/// Applies an entry command, returning every guess it finalized.
pub fn apply(controller: &mut PinEntryController, command: &Command) -> Result<Vec<Pin>> {
    let mut finalized = Vec::new();
    match command {
        Command::Pad(digits) => {
            for c in digits.chars() {
                if let EntryOutcome::Finalized(pin) = controller.press_pad_digit(&c.to_string())? {
                    finalized.push(pin);
                }
            }
        }
        Command::Set { slot, digit } => {
            if let EntryOutcome::Finalized(pin) = controller.on_digit_entered(slot - 1, digit)? {
                finalized.push(pin);
            }
        }
        Command::Back => controller.pad_backspace(),
        Command::Clear { slot } => controller.clear_slot(slot - 1)?,
        Command::Enter => match controller.on_confirm() {
            Some(pin) => finalized.push(pin),
            None => bail!("fill every slot before submitting"),
        },
        Command::Help | Command::Quit => {}
    }
    Ok(finalized)
}

/// Slots as shown to the player, `_` for empty.
pub fn render(controller: &PinEntryController) -> String {
    controller
        .digits()
        .iter()
        .map(|digit| digit.map_or('_', |d| char::from(b'0' + d)))
        .collect()
}
