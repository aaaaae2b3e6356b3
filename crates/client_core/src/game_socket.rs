use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::{
    domain::{Pin, PlayerId, RoomId},
    protocol::GameMessage,
};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::{api::parse_server_url, error::RequestError};

/// Receives finalized guesses for submission to the server.
#[async_trait]
pub trait GuessSink: Send + Sync {
    async fn submit_guess(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        round: u32,
        guess: &Pin,
    ) -> Result<(), RequestError>;
}

pub struct GameSocket {
    outbound: mpsc::UnboundedSender<GameMessage>,
    inbound: broadcast::Sender<GameMessage>,
    closed: watch::Receiver<bool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl GameSocket {
    pub async fn connect(server_url: &str) -> Result<Self, RequestError> {
        let ws_url = websocket_url(&parse_server_url(server_url)?)?;
        let (stream, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|err| RequestError::Socket(format!("failed to connect {ws_url}: {err}")))?;
        let (mut sink, mut source) = stream.split();
        info!(url = %ws_url, "socket: connected");

        let (inbound, _) = broadcast::channel(256);
        let reader_events = inbound.clone();
        let (closed_tx, closed) = watch::channel(false);
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<GameMessage>(&text) {
                        Ok(message) => {
                            debug!(?message, "socket: received game message");
                            let _ = reader_events.send(message);
                        }
                        Err(err) => warn!(error = %err, "socket: skipping undecodable frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "socket: receive failed");
                        break;
                    }
                }
            }
            info!("socket: reader closed");
            let _ = closed_tx.send(true);
        });

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<GameMessage>();
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "socket: failed to encode game message");
                        continue;
                    }
                };
                if let Err(err) = sink.send(Message::Text(text)).await {
                    warn!(error = %err, "socket: send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        Ok(Self {
            outbound,
            inbound,
            closed,
            reader,
            writer,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameMessage> {
        self.inbound.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the server closes the connection or reading fails.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    pub fn player_ready(&self, room_id: &RoomId, player_id: &PlayerId) -> Result<(), RequestError> {
        self.send(GameMessage::PlayerReady {
            room_id: room_id.clone(),
            player_id: player_id.clone(),
        })
    }

    fn send(&self, message: GameMessage) -> Result<(), RequestError> {
        self.outbound
            .send(message)
            .map_err(|_| RequestError::Socket("connection closed".into()))
    }
}

#[async_trait]
impl GuessSink for GameSocket {
    async fn submit_guess(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        round: u32,
        guess: &Pin,
    ) -> Result<(), RequestError> {
        info!(%room_id, %player_id, round, %guess, "socket: submitting guess");
        self.send(GameMessage::Guess {
            room_id: room_id.clone(),
            player_id: player_id.clone(),
            guess: guess.clone(),
            round,
        })
    }
}

impl Drop for GameSocket {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

fn websocket_url(server_url: &Url) -> Result<Url, RequestError> {
    let mut url = server_url.clone();
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    let invalid = || RequestError::InvalidServerUrl {
        url: server_url.to_string(),
        reason: "cannot derive websocket url".into(),
    };
    url.set_scheme(scheme).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .push("ws");
    Ok(url)
}

#[cfg(test)]
#[path = "tests/game_socket_tests.rs"]
mod tests;
