//! Picks which live broadcast game an engine should follow next.

use lichess::{BoardGame, CatalogClient, CatalogError, Round};

use crate::persistence::{Game, NewGame, StoreError, Stores};

/// Clock value assumed for players whose remaining time is unknown, so that
/// games with known clocks sort ahead of them.
const UNKNOWN_CLOCK: u64 = 999_999;

/// Header keys copied into the game's filter set when they are present in
/// the matched PGN.
const FILTER_HEADERS: [&str; 12] = [
    "Event",
    "Date",
    "Round",
    "White",
    "Black",
    "WhiteElo",
    "BlackElo",
    "WhiteFideId",
    "BlackFideId",
    "WhiteFed",
    "BlackFed",
    "TimeControl",
];

#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    #[error("{count} PGNs matched broadcast game {game_id}")]
    AmbiguousGame { game_id: String, count: usize },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A live game that could be followed, with the context needed to persist it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub tournament_id: i64,
    pub round: Round,
    pub game: BoardGame,
}

/// Gather ongoing games from all unfinished tournaments. Tournaments whose
/// rounds have all finished are marked finished along the way (monotone).
pub async fn get_candidates(
    stores: &Stores,
    catalog: &CatalogClient,
) -> Result<Vec<Candidate>, SelectorError> {
    let mut candidates = Vec::new();

    for tournament in stores.tournaments.list_unfinished().await? {
        let broadcast = catalog.get_tournament(&tournament.lichess_id).await?;

        if broadcast.rounds.iter().all(|r| r.finished) {
            tracing::info!(
                tournament = tournament.id,
                name = %tournament.name,
                "Tournament is now finished"
            );
            stores.tournaments.mark_finished(tournament.id).await?;
            continue;
        }

        for round in broadcast.rounds.into_iter().filter(|r| r.ongoing) {
            let boards = catalog.get_round(&round.id).await?;
            for game in boards.games {
                if !game.is_ongoing() {
                    continue;
                }
                if game.players.len() < 2 {
                    tracing::warn!(game = %game.id, "Skipping board without two players");
                    continue;
                }
                candidates.push(Candidate {
                    tournament_id: tournament.id,
                    round: round.clone(),
                    game,
                });
            }
        }
    }
    Ok(candidates)
}

/// The most interesting candidate: the game closest to time trouble,
/// minimizing the better-off player's clock. Ties keep list order.
pub fn pick_best(candidates: &[Candidate]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| {
            c.game
                .players
                .iter()
                .map(|p| p.clock.unwrap_or(UNKNOWN_CLOCK))
                .max()
                .unwrap_or(UNKNOWN_CLOCK)
        })
        .map(|(idx, _)| idx)
}

/// Persist a selected candidate: find its unique PGN in the round export and
/// create the game row plus header-filter rows in one transaction.
pub async fn materialize(
    stores: &Stores,
    catalog: &CatalogClient,
    candidate: &Candidate,
) -> Result<Game, SelectorError> {
    let pgns = catalog.fetch_round_pgns(&candidate.round.id).await?;
    let matches: Vec<&chess::PgnGame> = pgns
        .iter()
        .filter(|pgn| pgn_matches_candidate(pgn, candidate))
        .collect();

    if matches.len() != 1 {
        return Err(SelectorError::AmbiguousGame {
            game_id: candidate.game.id.clone(),
            count: matches.len(),
        });
    }
    let pgn = matches[0];

    let white = &candidate.game.players[0];
    let black = &candidate.game.players[1];
    let new_game = NewGame {
        tournament_id: candidate.tournament_id,
        lichess_round_id: candidate.round.id.clone(),
        lichess_id: candidate.game.id.clone(),
        game_name: candidate.game.name.clone(),
        round_name: candidate.round.name.clone(),
        player1_name: white.name.clone(),
        player1_fide_id: white.fide_id,
        player1_rating: white.rating,
        player1_fed: white.fed.clone(),
        player2_name: black.name.clone(),
        player2_fide_id: black.fide_id,
        player2_rating: black.rating,
        player2_fed: black.fed.clone(),
        status: candidate.game.status.clone().unwrap_or_else(|| "*".to_string()),
    };

    let filters: Vec<(String, String)> = FILTER_HEADERS
        .iter()
        .filter_map(|key| pgn.tag(key).map(|value| (key.to_string(), value.to_string())))
        .collect();

    Ok(stores.games.create_with_filters(&new_game, &filters).await?)
}

/// Null-safe header comparison: a header only disqualifies a PGN when both
/// sides are known and disagree. The PGN must still be running.
fn pgn_matches_candidate(pgn: &chess::PgnGame, candidate: &Candidate) -> bool {
    let white = &candidate.game.players[0];
    let black = &candidate.game.players[1];

    lenient_eq(pgn.tag("White"), Some(white.name.clone()))
        && lenient_eq(pgn.tag("Black"), Some(black.name.clone()))
        && lenient_eq(pgn.tag("WhiteElo"), white.rating.map(|r| r.to_string()))
        && lenient_eq(pgn.tag("BlackElo"), black.rating.map(|r| r.to_string()))
        && lenient_eq(pgn.tag("WhiteFideId"), white.fide_id.map(|f| f.to_string()))
        && lenient_eq(pgn.tag("BlackFideId"), black.fide_id.map(|f| f.to_string()))
        && lenient_eq(pgn.tag("Result"), Some("*".to_string()))
}

fn lenient_eq(header: Option<&str>, value: Option<String>) -> bool {
    match (header, value) {
        (Some(header), Some(value)) => header == value,
        _ => true,
    }
}
