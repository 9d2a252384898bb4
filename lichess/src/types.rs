//! Serde models for the broadcast catalog endpoints.

use serde::Deserialize;

/// One broadcast tournament with its rounds, as returned both by the
/// catalog listing (ND-JSON lines) and the single-tournament endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Broadcast {
    pub tour: Tour,
    #[serde(default)]
    pub rounds: Vec<Round>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tour {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tier: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub ongoing: bool,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub starts_at: Option<i64>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub starts_after_previous: bool,
    #[serde(default)]
    pub url: Option<String>,
}

/// The boards of one round.
#[derive(Debug, Clone, Deserialize)]
pub struct RoundBoards {
    pub round: Round,
    pub tour: Tour,
    #[serde(default)]
    pub games: Vec<BoardGame>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardGame {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub players: Vec<BoardPlayer>,
    /// `"*"` while the game is running.
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardPlayer {
    pub name: String,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub fide_id: Option<i64>,
    #[serde(default)]
    pub fed: Option<String>,
    /// Remaining clock in seconds.
    #[serde(default)]
    pub clock: Option<u64>,
}

impl BoardGame {
    pub fn is_ongoing(&self) -> bool {
        self.status.as_deref() == Some("*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_boards_deserialization() {
        let json = r#"{
            "round": {"id": "r1", "name": "Round 1", "ongoing": true, "url": "https://x"},
            "tour": {"id": "t1", "name": "Candidates", "tier": 5},
            "games": [{
                "id": "g1",
                "name": "Carlsen - Niemann",
                "players": [
                    {"name": "Carlsen", "rating": 2830, "fideId": 1503014, "fed": "NOR", "clock": 3544},
                    {"name": "Niemann", "rating": 2688}
                ],
                "status": "*"
            }]
        }"#;
        let boards: RoundBoards = serde_json::from_str(json).unwrap();
        assert!(boards.round.ongoing);
        assert!(!boards.round.finished);
        assert_eq!(boards.tour.tier, Some(5));
        let game = &boards.games[0];
        assert!(game.is_ongoing());
        assert_eq!(game.players[0].fide_id, Some(1503014));
        assert_eq!(game.players[0].clock, Some(3544));
        assert_eq!(game.players[1].fed, None);
    }

    #[test]
    fn test_broadcast_with_rounds() {
        let json = r#"{
            "tour": {"id": "t1", "name": "Candidates"},
            "rounds": [
                {"id": "r1", "name": "Round 1", "finished": true},
                {"id": "r2", "name": "Round 2", "ongoing": true, "startsAt": 1700000000000}
            ]
        }"#;
        let tournament: Broadcast = serde_json::from_str(json).unwrap();
        assert_eq!(tournament.rounds.len(), 2);
        assert!(tournament.rounds[0].finished);
        assert!(tournament.rounds[1].ongoing);
        assert_eq!(tournament.rounds[1].starts_at, Some(1700000000000));
    }
}
