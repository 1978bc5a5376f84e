use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use reqwest::{
    RequestBuilder,
    StatusCode,
};
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};

#[derive(Clone)]
pub struct HubClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayerStatus {
    pub name: String,
    pub bank_balance: u64,
    pub grapes_eaten: u32,
    pub is_dead: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GrapeOutcome {
    pub bank_balance: u64,
    pub grapes_eaten: u32,
    pub is_dead: bool,
    pub fatal: bool,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RankedPlayer {
    pub name: String,
    pub bank_balance: u64,
    pub grapes_eaten: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Leaderboard {
    pub alive: Vec<RankedPlayer>,
    pub dead: Vec<RankedPlayer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Rules {
    pub reward_per_grape: u64,
    pub currency_symbol: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Registered { player_id: String },
    NameTaken,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct RegisteredDto {
    player_id: String,
}

impl HubClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .wrap_err("failed to build HTTP client for grapehub")?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn register(&self, name: &str) -> Result<Registration> {
        let url = format!("{}/players", self.base_url);
        let request = self.http.post(url).json(&RegisterRequest { name });
        let (status, bytes) = self.send(request).await?;
        match status {
            StatusCode::CONFLICT => Ok(Registration::NameTaken),
            StatusCode::BAD_REQUEST => Err(eyre!(
                "name rejected: {}",
                String::from_utf8_lossy(&bytes)
            )),
            _ => {
                let dto: RegisteredDto =
                    decode(status, &bytes, "registering a player")?;
                Ok(Registration::Registered {
                    player_id: dto.player_id,
                })
            }
        }
    }

    /// `None` when the server no longer knows the player.
    pub async fn player(&self, player_id: &str) -> Result<Option<PlayerStatus>> {
        let url = format!("{}/players/{}", self.base_url, player_id);
        let (status, bytes) = self.send(self.http.get(url)).await?;
        if status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST {
            return Ok(None);
        }
        decode(status, &bytes, "fetching player").map(Some)
    }

    /// `None` when the server no longer knows the player.
    pub async fn eat_grape(&self, player_id: &str) -> Result<Option<GrapeOutcome>> {
        let url = format!("{}/players/{}/grapes", self.base_url, player_id);
        let (status, bytes) = self.send(self.http.post(url)).await?;
        if status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST {
            return Ok(None);
        }
        decode(status, &bytes, "eating a grape").map(Some)
    }

    pub async fn leaderboard(&self, limit: Option<usize>) -> Result<Leaderboard> {
        let url = format!("{}/leaderboard", self.base_url);
        let mut request = self.http.get(url);
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        let (status, bytes) = self.send(request).await?;
        decode(status, &bytes, "fetching leaderboard")
    }

    pub async fn rules(&self) -> Result<Rules> {
        let url = format!("{}/rules", self.base_url);
        let (status, bytes) = self.send(self.http.get(url)).await?;
        decode(status, &bytes, "fetching rules")
    }

    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, Vec<u8>)> {
        let res = request
            .send()
            .await
            .wrap_err_with(|| format!("grapehub request to {} failed", self.base_url))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .wrap_err("failed to read grapehub response body")?;
        tracing::debug!("grapehub responded with {status}");
        Ok((status, bytes.to_vec()))
    }
}

fn decode<T: DeserializeOwned>(status: StatusCode, bytes: &[u8], what: &str) -> Result<T> {
    if !status.is_success() {
        let body = String::from_utf8_lossy(bytes);
        return Err(eyre!("grapehub responded with {status} when {what}: {body}"));
    }
    serde_json::from_slice(bytes).wrap_err_with(|| format!("invalid payload when {what}"))
}
