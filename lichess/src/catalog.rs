//! Thin typed client over the broadcast catalog HTTP endpoints.

use chess::PgnGame;

use crate::types::{Broadcast, RoundBoards};

pub const DEFAULT_BASE_URL: &str = "https://lichess.org";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Catalog response was not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Catalog PGN export did not parse: {0}")]
    Pgn(#[from] chess::PgnError),
}

/// Read-only JSON client for the broadcast provider. All failures are
/// transient from the caller's point of view and retried there.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// All official broadcast tournaments, newline-delimited JSON.
    pub async fn list_tournaments(&self) -> Result<Vec<Broadcast>, CatalogError> {
        let url = format!("{}/api/broadcast", self.base_url);
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let mut tournaments = Vec::new();
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            tournaments.push(serde_json::from_str(line)?);
        }
        Ok(tournaments)
    }

    /// One tournament with its rounds.
    pub async fn get_tournament(&self, tour_id: &str) -> Result<Broadcast, CatalogError> {
        let url = format!("{}/api/broadcast/{}", self.base_url, tour_id);
        Ok(self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    /// The boards of one round, with players and status.
    pub async fn get_round(&self, round_id: &str) -> Result<RoundBoards, CatalogError> {
        let url = format!("{}/api/broadcast/-/-/{}", self.base_url, round_id);
        Ok(self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    /// One-shot concatenated PGN export of a round.
    pub async fn fetch_round_pgns(&self, round_id: &str) -> Result<Vec<PgnGame>, CatalogError> {
        let url = format!("{}/api/broadcast/round/{}.pgn", self.base_url, round_id);
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(chess::parse_games(&body)?)
    }

    /// The never-ending streaming PGN URL for a round, consumed by
    /// [`crate::PgnFeed`].
    pub fn stream_url(&self, round_id: &str) -> String {
        format!(
            "{}/api/stream/broadcast/round/{}.pgn",
            self.base_url, round_id
        )
    }

    /// Human-facing broadcast page for a game, shown on game cards.
    pub fn game_page_url(&self, round_id: &str, game_id: &str) -> String {
        format!("{}/broadcast/-/-/{}/{}", self.base_url, round_id, game_id)
    }
}

impl Default for CatalogClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = CatalogClient::default();
        assert_eq!(
            client.stream_url("abc123"),
            "https://lichess.org/api/stream/broadcast/round/abc123.pgn"
        );
        assert_eq!(
            client.game_page_url("abc123", "g9"),
            "https://lichess.org/broadcast/-/-/abc123/g9"
        );
    }
}
