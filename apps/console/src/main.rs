use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    GameSocket, GuessSink, HttpRoomApi, Outcome, PinEntryController, PinSelection, RoomApi,
    RoomSyncEngine, RoomView, RoundTimer, SyncEvent,
};
use shared::{
    domain::{GameConfig, PlayerId, RoomId, RoomStatus, DEFAULT_TOTAL_ROUNDS},
    protocol::{GameMessage, JoinGameResponse},
    rules::Hint,
};
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod input;

use config::load_settings;
use input::Command as InputCommand;

#[derive(Parser, Debug)]
#[command(name = "lockpick", about = "Play lockpick from the terminal")]
struct Args {
    /// Overrides the configured server url.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long, default_value = "Player")]
    name: String,
    /// Secret pins for each round, comma separated. Random when omitted.
    #[arg(long, value_delimiter = ',')]
    pins: Vec<String>,
    #[arg(long)]
    poll_interval_ms: Option<u64>,
    #[command(subcommand)]
    command: GameCommand,
}

#[derive(Subcommand, Debug)]
enum GameCommand {
    /// Create a room, or get matched into an open public room.
    Create {
        #[arg(long)]
        private: bool,
        #[arg(long, default_value_t = shared::domain::DEFAULT_PIN_LENGTH)]
        pin_length: usize,
        /// Seconds per round; 0 disables the timer.
        #[arg(long, default_value_t = 0)]
        timer: u32,
        #[arg(long)]
        no_hints: bool,
    },
    /// Join a room by id.
    Join { room_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(server_url) = args.server_url.clone() {
        settings.server_url = server_url;
    }
    if let Some(poll_interval_ms) = args.poll_interval_ms {
        settings.poll_interval_ms = poll_interval_ms;
    }
    info!(server_url = %settings.server_url, "console: starting");

    let api = Arc::new(HttpRoomApi::new(&settings.server_url).context("invalid server url")?);

    let joined = match &args.command {
        GameCommand::Create {
            private,
            pin_length,
            timer,
            no_hints,
        } => {
            let config = GameConfig {
                player_name: args.name.clone(),
                hints_enabled: !no_hints,
                pin_length: *pin_length,
                timer_duration: *timer,
                is_private: *private,
            };
            api.create_game(&args.name, &config)
                .await
                .context("failed to create game")?
        }
        GameCommand::Join { room_id } => api
            .join_game(&args.name, &RoomId::new(room_id.as_str()))
            .await
            .context("failed to join game")?,
    };
    println!(
        "Room {} as player {} ({:?})",
        joined.room_id, joined.player_id, joined.status
    );

    let pin_length = match (&joined.config, &args.command) {
        (Some(config), _) => config.pin_length,
        (None, GameCommand::Create { pin_length, .. }) => *pin_length,
        (None, GameCommand::Join { .. }) => shared::domain::DEFAULT_PIN_LENGTH,
    };
    let selection = select_pins(pin_length, &args.pins)?;
    api.select_pins(
        &joined.room_id,
        &joined.player_id,
        &selection.to_request()?,
    )
    .await
    .context("failed to submit pins")?;
    println!("Pins submitted; waiting for the game to start.");

    let socket = GameSocket::connect(&settings.server_url)
        .await
        .context("failed to open game socket")?;
    socket.player_ready(&joined.room_id, &joined.player_id)?;

    let engine = RoomSyncEngine::new(api.clone(), settings.sync_options());
    let events = engine.subscribe();
    engine
        .start(joined.room_id.clone(), settings.poll_interval())
        .await;

    let result = play(&joined, pin_length, &socket, events).await;
    engine.stop().await;
    result
}

fn select_pins(pin_length: usize, pins: &[String]) -> Result<PinSelection> {
    let rounds = DEFAULT_TOTAL_ROUNDS as usize;
    if !pins.is_empty() && pins.len() != rounds {
        bail!("expected {rounds} pins, got {}", pins.len());
    }
    let mut selection = PinSelection::new(pin_length, rounds);
    if pins.is_empty() {
        selection.randomize_all()?;
        println!("Random pins selected.");
    } else {
        for (i, pin) in pins.iter().enumerate() {
            selection.set(i + 1, pin)?;
        }
    }
    Ok(selection)
}

async fn play(
    joined: &JoinGameResponse,
    pin_length: usize,
    socket: &GameSocket,
    mut events: tokio::sync::broadcast::Receiver<SyncEvent>,
) -> Result<()> {
    let mut messages = socket.subscribe();
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut controller = PinEntryController::new(pin_length);
    let mut view: Option<RoomView> = None;
    let mut started = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "console: missed room events");
                        continue;
                    }
                    Err(RecvError::Closed) => return Ok(()),
                };
                if !started && starts_play(&event) {
                    started = true;
                    println!("Game started. Crack the pin!\n{}", input::HELP);
                }
                match event {
                    SyncEvent::RoomUpdated(updated) => {
                        print_scoreboard(&updated, &joined.player_id);
                        view = Some(updated);
                    }
                    SyncEvent::StatusChanged { .. } => {}
                    SyncEvent::RoundAdvanced { to, .. } => {
                        let pin_length = view.as_ref().map_or(pin_length, |v| v.config.pin_length);
                        controller.reset_for_round(pin_length);
                        println!("Round {to} begins.");
                    }
                    SyncEvent::SyncLost { attempts, reason, .. } => {
                        bail!("lost contact with the server after {attempts} attempts: {reason}");
                    }
                    SyncEvent::Stopped { .. } => {
                        if let Some(outcome) = view.as_ref().and_then(RoomView::outcome) {
                            match outcome {
                                Outcome::Winner(winner) if winner == joined.player_id => println!("You win!"),
                                Outcome::Winner(winner) => println!("Player {winner} wins."),
                                Outcome::Draw => println!("It's a draw."),
                            }
                        }
                        return Ok(());
                    }
                }
            },
            _ = socket.closed() => bail!("game socket closed by the server"),
            message = messages.recv() => match message {
                Ok(message) => print_game_message(&message, &joined.player_id),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "console: missed game messages"),
                Err(RecvError::Closed) => bail!("game socket closed"),
            },
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    return Ok(());
                };
                let command = match input::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(err) => {
                        println!("{err}");
                        continue;
                    }
                };
                match command {
                    InputCommand::Quit => return Ok(()),
                    InputCommand::Help => println!("{}", input::HELP),
                    command => match input::apply(&mut controller, &command) {
                        Ok(guesses) => {
                            for guess in guesses {
                                let Some(current) = view.as_ref().filter(|v| v.status == RoomStatus::Playing) else {
                                    println!("The game has not started; guess {guess} discarded.");
                                    continue;
                                };
                                socket
                                    .submit_guess(&joined.room_id, &joined.player_id, current.current_round, &guess)
                                    .await?;
                            }
                            println!("[{}]", input::render(&controller));
                        }
                        Err(err) => println!("{err}"),
                    },
                }
            }
        }
    }
}

/// True for an event showing the room in play. The player whose pin
/// submission starts the game sees `playing` on the first fetch, with no
/// status change.
fn starts_play(event: &SyncEvent) -> bool {
    match event {
        SyncEvent::RoomUpdated(view) => view.status == RoomStatus::Playing,
        SyncEvent::StatusChanged { to, .. } => *to == RoomStatus::Playing,
        _ => false,
    }
}

fn print_scoreboard(view: &RoomView, me: &PlayerId) {
    let timer = RoundTimer::from_view(view)
        .map(|timer| {
            let remaining = timer.remaining_at(chrono::Utc::now());
            format!(", {}s left", remaining.as_secs())
        })
        .unwrap_or_default();
    println!(
        "Round {} [{}] score {}{timer}",
        view.round_label(),
        view.status,
        view.score_for(me)
    );
}

fn print_game_message(message: &GameMessage, me: &PlayerId) {
    match message {
        GameMessage::GuessResult {
            player_id,
            guess,
            hints,
            ..
        } if player_id == me => {
            let marks: String = hints
                .iter()
                .map(|hint| match hint {
                    Hint::Correct => '+',
                    Hint::Misplaced => '~',
                    Hint::Absent => '-',
                })
                .collect();
            println!("{guess}  {marks}");
        }
        GameMessage::RoundEnd {
            winner_id, round, ..
        } => match winner_id {
            Some(winner) if winner == me => println!("You cracked round {round}!"),
            Some(winner) => println!("Player {winner} cracked round {round}."),
            None => println!("Round {round} ended without a winner."),
        },
        _ => {}
    }
}
