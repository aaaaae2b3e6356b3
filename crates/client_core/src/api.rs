use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{GameConfig, PlayerId, RoomId},
    protocol::{
        CreateGameRequest, JoinGameRequest, JoinGameResponse, RoomSnapshot, SelectPinRequest,
        SelectPinResponse,
    },
};
use tracing::{debug, info};
use url::Url;

use crate::error::RequestError;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait RoomApi: Send + Sync {
    async fn create_game(
        &self,
        player_name: &str,
        config: &GameConfig,
    ) -> Result<JoinGameResponse, RequestError>;
    async fn join_game(
        &self,
        player_name: &str,
        room_id: &RoomId,
    ) -> Result<JoinGameResponse, RequestError>;
    async fn select_pins(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        request: &SelectPinRequest,
    ) -> Result<SelectPinResponse, RequestError>;
    async fn fetch_room(&self, room_id: &RoomId) -> Result<RoomSnapshot, RequestError>;
}

pub struct HttpRoomApi {
    http: Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpRoomApi {
    pub fn new(server_url: &str) -> Result<Self, RequestError> {
        Ok(Self {
            http: Client::new(),
            base_url: parse_server_url(server_url)?,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn post_json<B, T>(&self, url: Url, body: &B) -> Result<T, RequestError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let endpoint = url.to_string();
        let response = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|source| RequestError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;
        decode(endpoint, response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, RequestError> {
        let endpoint = url.to_string();
        let response = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|source| RequestError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;
        decode(endpoint, response).await
    }
}

#[async_trait]
impl RoomApi for HttpRoomApi {
    async fn create_game(
        &self,
        player_name: &str,
        config: &GameConfig,
    ) -> Result<JoinGameResponse, RequestError> {
        let request = CreateGameRequest {
            player_name: player_name.to_string(),
            config: config.clone(),
        };
        let response: JoinGameResponse =
            self.post_json(self.endpoint(&["games"]), &request).await?;
        info!(
            room_id = %response.room_id,
            player_id = %response.player_id,
            status = ?response.status,
            "api: created game"
        );
        Ok(response)
    }

    async fn join_game(
        &self,
        player_name: &str,
        room_id: &RoomId,
    ) -> Result<JoinGameResponse, RequestError> {
        let request = JoinGameRequest {
            player_name: player_name.to_string(),
            room_id: room_id.clone(),
        };
        let response: JoinGameResponse = self
            .post_json(self.endpoint(&["games", "join"]), &request)
            .await?;
        info!(
            room_id = %response.room_id,
            player_id = %response.player_id,
            "api: joined game"
        );
        Ok(response)
    }

    async fn select_pins(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        request: &SelectPinRequest,
    ) -> Result<SelectPinResponse, RequestError> {
        let url = self.endpoint(&["games", room_id.as_str(), "players", player_id.as_str(), "pin"]);
        let response: SelectPinResponse = self.post_json(url, request).await?;
        info!(%room_id, %player_id, status = %response.status, "api: pins submitted");
        Ok(response)
    }

    async fn fetch_room(&self, room_id: &RoomId) -> Result<RoomSnapshot, RequestError> {
        let snapshot: RoomSnapshot = self
            .get_json(self.endpoint(&["games", room_id.as_str()]))
            .await?;
        debug!(
            %room_id,
            status = %snapshot.status,
            round = snapshot.current_round,
            "api: fetched room"
        );
        Ok(snapshot)
    }
}

/// Validates an `http(s)://` server base url.
pub fn parse_server_url(server_url: &str) -> Result<Url, RequestError> {
    let invalid = |reason: String| RequestError::InvalidServerUrl {
        url: server_url.to_string(),
        reason,
    };
    let url = Url::parse(server_url.trim()).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("server_url must start with http:// or https://".into()));
    }
    if url.cannot_be_a_base() {
        return Err(invalid("server_url cannot be used as a base".into()));
    }
    Ok(url)
}

async fn decode<T: DeserializeOwned>(endpoint: String, response: Response) -> Result<T, RequestError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default().trim().to_string();
        return Err(RequestError::Status {
            endpoint,
            status: status.as_u16(),
            message,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|source| RequestError::Decode { endpoint, source })
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
