//! Top-level coordination: exclusive game assignment for the analyzers, the
//! WebSocket request servicing, and the periodic status broadcast.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use lichess::CatalogClient;

use crate::analyzer::NextGameSource;
use crate::frames::{self, StatusData, WsFrame};
use crate::notifier::{Notifier, SubscriberId};
use crate::persistence::{Game, StoreError, Stores};
use crate::selector::{self, SelectorError};

/// How long to wait when no assignable game exists, or after a transient
/// selection failure.
const ASSIGN_RETRY: Duration = Duration::from_secs(10);
const STATUS_INTERVAL: Duration = Duration::from_secs(33);

pub struct Supervisor {
    stores: Stores,
    catalog: CatalogClient,
    notifier: Arc<Notifier>,
    /// Serializes game selection so two analyzers never grab the same game.
    assignment_lock: tokio::sync::Mutex<()>,
    /// Which analyzer slot currently holds which game.
    active: std::sync::Mutex<HashMap<usize, i64>>,
    /// Front-end bundle hash, computed once at startup.
    js_hash: Option<String>,
}

impl Supervisor {
    pub fn new(
        stores: Stores,
        catalog: CatalogClient,
        notifier: Arc<Notifier>,
        static_dir: &Path,
    ) -> Self {
        Self {
            stores,
            catalog,
            notifier,
            assignment_lock: tokio::sync::Mutex::new(()),
            active: std::sync::Mutex::new(HashMap::new()),
            js_hash: asset_hash(&static_dir.join("main.js")),
        }
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn games_being_analyzed(&self) -> HashSet<i64> {
        self.active_lock().values().copied().collect()
    }

    /// One assignment attempt: an already-followed game that lost its
    /// analyzer, otherwise the best fresh candidate from the catalog.
    async fn try_assign(&self, slot: usize) -> Result<Option<Game>, SelectorError> {
        let games = self.stores.games.list_unfinished().await?;
        let analyzed = self.games_being_analyzed();
        if let Some(game) = games.into_iter().find(|g| !analyzed.contains(&g.id)) {
            tracing::info!(game = game.id, name = %game.game_name, "Resuming ongoing game");
            self.active_lock().insert(slot, game.id);
            return Ok(Some(game));
        }

        let mut candidates = selector::get_candidates(&self.stores, &self.catalog).await?;
        while let Some(idx) = selector::pick_best(&candidates) {
            let candidate = candidates.remove(idx);
            if self
                .stores
                .games
                .exists_for_broadcast(&candidate.round.id, &candidate.game.id)
                .await?
            {
                continue;
            }
            match selector::materialize(&self.stores, &self.catalog, &candidate).await {
                Ok(game) => {
                    tracing::info!(game = game.id, name = %game.game_name, "Will follow game");
                    self.active_lock().insert(slot, game.id);
                    return Ok(Some(game));
                }
                Err(e @ SelectorError::AmbiguousGame { .. }) => {
                    tracing::warn!(error = %e, "Skipping candidate");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Service one subscriber request: record the new interest and send the
    /// snapshots it entitles the subscriber to.
    pub async fn set_game_and_ply(&self, subscriber: SubscriberId, game_id: i64, ply: Option<i64>) {
        let game_changed = self.notifier.set_game_and_ply(subscriber, game_id, ply);

        if game_changed {
            match self.stores.positions.list_for_game(game_id).await {
                Ok(positions) => {
                    let frame = WsFrame {
                        positions: Some(frames::make_positions_update(game_id, &positions)),
                        ..WsFrame::default()
                    };
                    self.notifier.send_to(subscriber, &frame);
                }
                Err(e) => {
                    tracing::warn!(game = game_id, error = %e, "Positions snapshot failed")
                }
            }
        }

        if let Some(ply) = ply {
            match self.evaluations_snapshot(game_id, ply).await {
                Ok(Some(frame)) => self.notifier.send_to(subscriber, &frame),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(game = game_id, ply, error = %e, "Evaluations snapshot failed")
                }
            }
        }
    }

    async fn evaluations_snapshot(
        &self,
        game_id: i64,
        ply: i64,
    ) -> Result<Option<WsFrame>, StoreError> {
        let Some(position) = self.stores.positions.find_by_ply(game_id, ply).await? else {
            return Ok(None);
        };
        let bundles = self.stores.evaluations.list_for_position(position.id).await?;
        Ok(Some(WsFrame {
            evaluations: Some(frames::make_evaluations_update(game_id, ply, &bundles)),
            ..WsFrame::default()
        }))
    }

    /// The connect-time frame: global status plus all visible game cards.
    pub async fn send_initial_snapshot(&self, subscriber: SubscriberId) -> Result<(), StoreError> {
        let games = self.stores.games.list_visible().await?;
        let analyzed = self.games_being_analyzed();

        let mut tournament_names: HashMap<i64, String> = HashMap::new();
        let mut cards = Vec::with_capacity(games.len());
        for game in &games {
            let name = match tournament_names.get(&game.tournament_id) {
                Some(name) => name.clone(),
                None => {
                    let tournament = self.stores.tournaments.get(game.tournament_id).await?;
                    tournament_names.insert(game.tournament_id, tournament.name.clone());
                    tournament.name
                }
            };
            cards.push(frames::make_game_data(
                game,
                &name,
                analyzed.contains(&game.id),
                self.catalog
                    .game_page_url(&game.lichess_round_id, &game.lichess_id),
            ));
        }

        let frame = WsFrame {
            status: Some(self.status_data()),
            games: Some(cards),
            ..WsFrame::default()
        };
        self.notifier.send_to(subscriber, &frame);
        Ok(())
    }

    /// Broadcast a `status` frame every 33 seconds.
    pub async fn run_status_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(STATUS_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let frame = WsFrame {
                status: Some(self.status_data()),
                ..WsFrame::default()
            };
            self.notifier.notify(&frame, None, None);
        }
    }

    fn status_data(&self) -> StatusData {
        StatusData {
            message: None,
            num_viewers: self.notifier.num_subscribers(),
            js_hash: self.js_hash.clone(),
        }
    }

    fn active_lock(&self) -> std::sync::MutexGuard<'_, HashMap<usize, i64>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl NextGameSource for Supervisor {
    async fn next_game(&self, slot: usize) -> Game {
        let _guard = self.assignment_lock.lock().await;
        loop {
            match self.try_assign(slot).await {
                Ok(Some(game)) => return game,
                Ok(None) => {
                    tracing::info!(slot, "No games, waiting");
                }
                Err(e) => {
                    tracing::warn!(slot, error = %e, "Game selection failed, retrying");
                }
            }
            tokio::time::sleep(ASSIGN_RETRY).await;
        }
    }

    async fn release(&self, slot: usize) {
        self.active_lock().remove(&slot);
    }
}

/// Hash of the front-end bundle, cached for the lifetime of the process.
fn asset_hash(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let digest = Sha256::digest(&bytes);
            Some(
                digest
                    .iter()
                    .map(|b| format!("{b:02x}"))
                    .collect::<String>(),
            )
        }
        Err(_) => {
            tracing::debug!(path = %path.display(), "No front-end bundle to hash");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{Database, NewGame};
    use tokio::sync::mpsc;

    async fn setup() -> (Database, Arc<Supervisor>, Game) {
        let db = Database::new_in_memory().await.unwrap();
        let stores = Stores::new(db.pool());
        let tournament = stores.tournaments.insert("t1", "Open").await.unwrap();
        let game = stores
            .games
            .create_with_filters(
                &NewGame {
                    tournament_id: tournament.id,
                    lichess_round_id: "r1".to_string(),
                    lichess_id: "g1".to_string(),
                    game_name: "A - B".to_string(),
                    round_name: "Round 1".to_string(),
                    player1_name: "A".to_string(),
                    player1_fide_id: None,
                    player1_rating: None,
                    player1_fed: None,
                    player2_name: "B".to_string(),
                    player2_fide_id: None,
                    player2_rating: None,
                    player2_fed: None,
                    status: "*".to_string(),
                },
                &[],
            )
            .await
            .unwrap();
        let supervisor = Arc::new(Supervisor::new(
            stores,
            CatalogClient::default(),
            Arc::new(Notifier::new()),
            Path::new("does-not-exist"),
        ));
        (db, supervisor, game)
    }

    #[tokio::test]
    async fn test_existing_unfinished_game_is_assigned_once() {
        let (_db, supervisor, game) = setup().await;

        let assigned = supervisor.try_assign(0).await.unwrap().unwrap();
        assert_eq!(assigned.id, game.id);
        assert!(supervisor.games_being_analyzed().contains(&game.id));

        // The same game is not handed to a second slot; the next attempt
        // would go to the catalog, which has no candidates for this test.
        let games = supervisor.stores.games.list_unfinished().await.unwrap();
        let analyzed = supervisor.games_being_analyzed();
        assert!(games.iter().all(|g| analyzed.contains(&g.id)));
    }

    #[tokio::test]
    async fn test_release_frees_the_slot() {
        let (_db, supervisor, game) = setup().await;
        supervisor.try_assign(0).await.unwrap().unwrap();
        supervisor.release(0).await;
        assert!(supervisor.games_being_analyzed().is_empty());

        let reassigned = supervisor.try_assign(1).await.unwrap().unwrap();
        assert_eq!(reassigned.id, game.id);
    }

    #[tokio::test]
    async fn test_initial_snapshot_contains_status_and_games() {
        let (_db, supervisor, game) = setup().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = supervisor.notifier().register(tx);

        supervisor.send_initial_snapshot(subscriber).await.unwrap();
        let payload = rx.try_recv().unwrap();
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["status"]["numViewers"], 1);
        assert_eq!(json["games"][0]["gameId"], game.id);
        assert_eq!(json["games"][0]["isBeingAnalyzed"], false);
        assert!(json["games"][0]["name"]
            .as_str()
            .unwrap()
            .contains("--- Open"));
    }

    #[tokio::test]
    async fn test_subscriber_swap_gets_one_snapshot_per_game() {
        let (_db, supervisor, game) = setup().await;
        supervisor
            .stores
            .positions
            .get_or_create(game.id, 0, chess::STARTPOS_FEN, None, None, None, None)
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = supervisor.notifier().register(tx);

        supervisor.set_game_and_ply(subscriber, game.id, None).await;
        let first = rx.try_recv().unwrap();
        assert!(first.contains("\"positions\""));

        // Same game again: no snapshot resend.
        supervisor.set_game_and_ply(subscriber, game.id, None).await;
        assert!(rx.try_recv().is_err());

        // Requesting a ply sends the evaluations snapshot.
        supervisor
            .set_game_and_ply(subscriber, game.id, Some(0))
            .await;
        let evals = rx.try_recv().unwrap();
        assert!(evals.contains("\"evaluations\""));
    }
}
