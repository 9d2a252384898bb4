use sqlx::SqlitePool;

use super::models::Tournament;
use super::StoreError;

#[derive(Clone)]
pub struct TournamentStore {
    pool: SqlitePool,
}

impl TournamentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Seed a tournament to follow. Idempotent on the lichess id.
    pub async fn insert(&self, lichess_id: &str, name: &str) -> Result<Tournament, StoreError> {
        sqlx::query(
            "INSERT INTO tournaments (lichess_id, name) VALUES (?, ?) \
             ON CONFLICT(lichess_id) DO UPDATE SET name = excluded.name",
        )
        .bind(lichess_id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        let tournament = sqlx::query_as::<_, Tournament>(
            "SELECT * FROM tournaments WHERE lichess_id = ?",
        )
        .bind(lichess_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(tournament)
    }

    pub async fn get(&self, id: i64) -> Result<Tournament, StoreError> {
        Ok(
            sqlx::query_as::<_, Tournament>("SELECT * FROM tournaments WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    /// Tournaments still being polled for new games.
    pub async fn list_unfinished(&self) -> Result<Vec<Tournament>, StoreError> {
        Ok(sqlx::query_as::<_, Tournament>(
            "SELECT * FROM tournaments WHERE is_finished = 0 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Monotone: marks the tournament finished; never cleared.
    pub async fn mark_finished(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE tournaments SET is_finished = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
