//! SQLite persistence: connection pool, schema migration and per-aggregate
//! stores over a shared pool.

pub mod database;
pub mod evaluations;
pub mod games;
pub mod models;
pub mod positions;
pub mod tournaments;

pub use database::Database;
pub use evaluations::{EvaluationStore, NewEvaluation, NewEvaluationMove};
pub use games::{GameStore, NewGame};
pub use models::{Evaluation, EvaluationMove, Game, GamePosition, Tournament};
pub use positions::{EvaluationColumns, PositionStore};
pub use tournaments::TournamentStore;

use sqlx::SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// All stores bundled for handing around; cheap to clone.
#[derive(Clone)]
pub struct Stores {
    pub tournaments: TournamentStore,
    pub games: GameStore,
    pub positions: PositionStore,
    pub evaluations: EvaluationStore,
}

impl Stores {
    pub fn new(pool: &SqlitePool) -> Self {
        Self {
            tournaments: TournamentStore::new(pool.clone()),
            games: GameStore::new(pool.clone()),
            positions: PositionStore::new(pool.clone()),
            evaluations: EvaluationStore::new(pool.clone()),
        }
    }
}
