//! Per-engine worker: follows one game at a time, keeps its positions
//! persisted as the PGN stream grows, and restarts engine analysis whenever
//! the leaf position changes.

pub mod bundle;
pub mod options;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use engine::{AnalysisHandle, EngineError, InfoRecord, UciEngine};
use lichess::{CatalogClient, PgnFeed};

use crate::config::AnalyzerConfig;
use crate::frames;
use crate::notifier::Notifier;
use crate::persistence::{
    Game, GamePosition, NewEvaluation, NewEvaluationMove, StoreError, Stores,
};

use bundle::BundleAccumulator;
use options::UciOptions;

/// Where an analyzer gets its work. The supervisor implements this; the
/// analyzer only sees the interface.
#[async_trait]
pub trait NextGameSource: Send + Sync {
    /// Block until a game is exclusively assigned to `slot`.
    async fn next_game(&self, slot: usize) -> Game;
    /// Return the slot's assignment after the game is done.
    async fn release(&self, slot: usize);
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Stored position does not parse: {0}")]
    Fen(#[from] chess::FenError),
}

pub struct Analyzer {
    slot: usize,
    config: AnalyzerConfig,
    base_options: UciOptions,
    stores: Stores,
    notifier: Arc<Notifier>,
    catalog: CatalogClient,
    source: Arc<dyn NextGameSource>,
}

/// The in-flight engine analysis for the current leaf position.
struct ActiveAnalysis {
    handle: AnalysisHandle,
    position: GamePosition,
    white_to_move: bool,
    accumulator: BundleAccumulator,
}

impl Analyzer {
    pub fn new(
        slot: usize,
        config: AnalyzerConfig,
        stores: Stores,
        notifier: Arc<Notifier>,
        catalog: CatalogClient,
        source: Arc<dyn NextGameSource>,
    ) -> Self {
        let base_options = UciOptions::Static(config.uci_options.clone());
        Self {
            slot,
            config,
            base_options,
            stores,
            notifier,
            catalog,
            source,
        }
    }

    /// The analyzer main loop. Only an engine startup failure is fatal; any
    /// per-game failure is logged and the analyzer asks for the next game.
    pub async fn run(self) -> Result<(), EngineError> {
        let mut engine = UciEngine::spawn(&self.config.spawn_spec()).await?;

        loop {
            let game = self.source.next_game(self.slot).await;
            tracing::info!(
                slot = self.slot,
                game = game.id,
                name = %game.game_name,
                "Following game"
            );
            if let Err(e) = self.run_game(&mut engine, &game).await {
                tracing::error!(
                    slot = self.slot,
                    game = game.id,
                    error = %e,
                    "Game worker failed"
                );
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
            self.source.release(self.slot).await;
        }
    }

    /// Follow one game to completion: a PGN feed task produces parsed games,
    /// this worker consumes them and drives the engine.
    async fn run_game(&self, engine: &mut UciEngine, game: &Game) -> Result<(), AnalyzerError> {
        let filters = self.stores.games.filters(game.id).await?;
        let url = self.catalog.stream_url(&game.lichess_round_id);
        let (tx, mut rx) = mpsc::channel::<chess::PgnGame>(16);
        let feed = tokio::spawn(PgnFeed::run(url, filters, tx));

        self.send_game_card(game.id, true).await?;

        let mut active: Option<ActiveAnalysis> = None;
        let mut current_position_id: Option<i64> = None;

        let outcome = loop {
            tokio::select! {
                maybe_pgn = rx.recv() => {
                    match maybe_pgn {
                        // Feed closed: the game is over.
                        None => break Ok(()),
                        Some(pgn) => {
                            if let Err(e) = self
                                .ingest(engine, game, pgn, &mut active, &mut current_position_id)
                                .await
                            {
                                break Err(e);
                            }
                        }
                    }
                }
                info = next_info(&mut active) => {
                    match info {
                        // The engine stopped by itself (terminal position).
                        None => active = None,
                        Some(record) => {
                            if let Err(e) = self.on_info(game, &mut active, record).await {
                                break Err(e);
                            }
                        }
                    }
                }
            }
        };

        if let Some(analysis) = active.take() {
            if let Err(e) = analysis.handle.cancel().await {
                tracing::warn!(error = %e, "Failed to cancel analysis during teardown");
            }
        }
        feed.abort();

        outcome?;
        self.stores.games.set_finished(game.id).await?;
        self.send_game_card(game.id, false).await?;
        tracing::info!(slot = self.slot, game = game.id, "Game finished");
        Ok(())
    }

    /// A new parsed PGN arrived: persist any new positions and, if the leaf
    /// changed, swap the engine onto it.
    async fn ingest(
        &self,
        engine: &mut UciEngine,
        game: &Game,
        pgn: chess::PgnGame,
        active: &mut Option<ActiveAnalysis>,
        current_position_id: &mut Option<i64>,
    ) -> Result<(), AnalyzerError> {
        let (leaf, created) = self.upsert_positions(game, &pgn).await?;
        if !created.is_empty() {
            self.notifier.send_game_update(
                game.id,
                Some(frames::make_positions_update(game.id, &created)),
                None,
            );
        }

        if *current_position_id == Some(leaf.id) {
            return Ok(());
        }
        *current_position_id = Some(leaf.id);

        if let Some(analysis) = active.take() {
            tracing::debug!(game = game.id, "Leaf changed, cancelling analysis");
            analysis.handle.cancel().await?;
        }

        let board = chess::parse_fen(&leaf.fen)?;
        let legal = chess::count_legal_moves(&board) as u32;
        if legal == 0 {
            tracing::debug!(
                game = game.id,
                ply = leaf.ply_number,
                "Terminal position, nothing to analyze"
            );
            return Ok(());
        }

        let multipv = legal.min(self.config.max_multipv);
        let analysis_options = options::analysis_options(&self.base_options, game, &leaf);
        let white_to_move = board.side_to_move() == cozy_chess::Color::White;
        let handle = engine.analyze(&leaf.fen, &analysis_options, multipv).await?;
        tracing::info!(
            game = game.id,
            ply = leaf.ply_number,
            multipv,
            "Analyzing position"
        );
        *active = Some(ActiveAnalysis {
            handle,
            position: leaf,
            white_to_move,
            accumulator: BundleAccumulator::new(multipv),
        });
        Ok(())
    }

    async fn on_info(
        &self,
        game: &Game,
        active: &mut Option<ActiveAnalysis>,
        record: InfoRecord,
    ) -> Result<(), AnalyzerError> {
        let Some(analysis) = active.as_mut() else {
            return Ok(());
        };
        let Some(records) = analysis.accumulator.push(record) else {
            return Ok(());
        };
        let position = analysis.position.clone();
        let white_to_move = analysis.white_to_move;
        self.persist_bundle(game, &position, white_to_move, &records)
            .await
    }

    /// Persist one complete bundle: an append-only evaluation row with its
    /// top PVs, the refreshed position columns, and the live update frame.
    async fn persist_bundle(
        &self,
        game: &Game,
        position: &GamePosition,
        white_to_move: bool,
        records: &[InfoRecord],
    ) -> Result<(), AnalyzerError> {
        let aggregates = bundle::aggregate(records, white_to_move);
        let new_evaluation = NewEvaluation {
            nodes: aggregates.nodes,
            time: aggregates.time,
            depth: aggregates.depth,
            seldepth: aggregates.seldepth,
            moves_left: aggregates.moves_left,
        };
        let variations: Vec<NewEvaluationMove> = records
            .iter()
            .take(self.config.show_pv as usize)
            .filter_map(|r| bundle::build_variation(r, &position.fen, white_to_move))
            .collect();

        let (evaluation, moves) = self
            .stores
            .evaluations
            .insert(position.id, &new_evaluation, &variations)
            .await?;
        self.stores
            .positions
            .update_evaluation_columns(position.id, &aggregates)
            .await?;

        let refreshed = self.stores.positions.get(position.id).await?;
        let ply = refreshed.ply_number;
        self.notifier.send_game_update(
            game.id,
            Some(frames::make_positions_update(
                game.id,
                std::slice::from_ref(&refreshed),
            )),
            Some((
                ply,
                frames::make_evaluations_update(game.id, ply, &[(evaluation, moves)]),
            )),
        );
        Ok(())
    }

    /// Walk the PGN mainline and get-or-create a position row per ply.
    /// Returns the leaf position and the rows created by this call.
    async fn upsert_positions(
        &self,
        game: &Game,
        pgn: &chess::PgnGame,
    ) -> Result<(GamePosition, Vec<GamePosition>), AnalyzerError> {
        let starting_fen = pgn.starting_fen();
        let start_board = chess::parse_fen(starting_fen)?;
        let mut white_to_move = start_board.side_to_move() == cozy_chess::Color::White;
        let mut white_clock: Option<i64> = None;
        let mut black_clock: Option<i64> = None;
        let mut created = Vec::new();

        let (mut last, was_created) = self
            .stores
            .positions
            .get_or_create(game.id, 0, starting_fen, None, None, None, None)
            .await?;
        if was_created {
            created.push(last.clone());
        }

        for (ply, m) in pgn.mainline() {
            if let Some(clock) = m.clock {
                if white_to_move {
                    white_clock = Some(clock as i64);
                } else {
                    black_clock = Some(clock as i64);
                }
            }
            let (position, was_created) = self
                .stores
                .positions
                .get_or_create(
                    game.id,
                    i64::from(ply),
                    &m.fen_after,
                    Some(&m.uci),
                    Some(&m.san),
                    white_clock,
                    black_clock,
                )
                .await?;
            if was_created {
                created.push(position.clone());
            }
            last = position;
            white_to_move = !white_to_move;
        }
        Ok((last, created))
    }

    async fn send_game_card(&self, game_id: i64, is_being_analyzed: bool) -> Result<(), StoreError> {
        let game = self.stores.games.get(game_id).await?;
        let tournament = self.stores.tournaments.get(game.tournament_id).await?;
        let feed_url = self
            .catalog
            .game_page_url(&game.lichess_round_id, &game.lichess_id);
        self.notifier.send_game_entry_update(frames::make_game_data(
            &game,
            &tournament.name,
            is_being_analyzed,
            feed_url,
        ));
        Ok(())
    }
}

async fn next_info(active: &mut Option<ActiveAnalysis>) -> Option<InfoRecord> {
    match active {
        Some(analysis) => analysis.handle.next().await,
        None => std::future::pending().await,
    }
}
