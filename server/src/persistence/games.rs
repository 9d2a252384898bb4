use sqlx::SqlitePool;

use super::models::Game;
use super::StoreError;

#[derive(Clone)]
pub struct GameStore {
    pool: SqlitePool,
}

/// Column values for a game row about to be created.
#[derive(Debug, Clone)]
pub struct NewGame {
    pub tournament_id: i64,
    pub lichess_round_id: String,
    pub lichess_id: String,
    pub game_name: String,
    pub round_name: String,
    pub player1_name: String,
    pub player1_fide_id: Option<i64>,
    pub player1_rating: Option<i64>,
    pub player1_fed: Option<String>,
    pub player2_name: String,
    pub player2_fide_id: Option<i64>,
    pub player2_rating: Option<i64>,
    pub player2_fed: Option<String>,
    pub status: String,
}

impl GameStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the game row and its header-filter rows in one transaction.
    pub async fn create_with_filters(
        &self,
        new_game: &NewGame,
        filters: &[(String, String)],
    ) -> Result<Game, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO games (tournament_id, lichess_round_id, lichess_id, \
             game_name, round_name, \
             player1_name, player1_fide_id, player1_rating, player1_fed, \
             player2_name, player2_fide_id, player2_rating, player2_fed, \
             status) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new_game.tournament_id)
        .bind(&new_game.lichess_round_id)
        .bind(&new_game.lichess_id)
        .bind(&new_game.game_name)
        .bind(&new_game.round_name)
        .bind(&new_game.player1_name)
        .bind(new_game.player1_fide_id)
        .bind(new_game.player1_rating)
        .bind(&new_game.player1_fed)
        .bind(&new_game.player2_name)
        .bind(new_game.player2_fide_id)
        .bind(new_game.player2_rating)
        .bind(&new_game.player2_fed)
        .bind(&new_game.status)
        .execute(&mut *tx)
        .await?;
        let game_id = result.last_insert_rowid();

        for (key, value) in filters {
            sqlx::query("INSERT INTO game_filters (game_id, key, value) VALUES (?, ?, ?)")
                .bind(game_id)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.get(game_id).await
    }

    pub async fn get(&self, id: i64) -> Result<Game, StoreError> {
        Ok(sqlx::query_as::<_, Game>("SELECT * FROM games WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn list_unfinished(&self) -> Result<Vec<Game>, StoreError> {
        Ok(
            sqlx::query_as::<_, Game>("SELECT * FROM games WHERE is_finished = 0 ORDER BY id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Games shown to newly connected viewers: non-hidden games whose
    /// tournament is visible, plus unfinished games of hidden tournaments.
    pub async fn list_visible(&self) -> Result<Vec<Game>, StoreError> {
        Ok(sqlx::query_as::<_, Game>(
            "SELECT g.* FROM games g \
             JOIN tournaments t ON t.id = g.tournament_id \
             WHERE g.is_hidden = 0 AND (t.is_hidden = 0 OR g.is_finished = 0) \
             ORDER BY g.id",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// The header-filter rows captured when the game was created.
    pub async fn filters(&self, game_id: i64) -> Result<Vec<(String, String)>, StoreError> {
        Ok(sqlx::query_as::<_, (String, String)>(
            "SELECT key, value FROM game_filters WHERE game_id = ? ORDER BY id",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Whether this broadcast game was ever ingested.
    pub async fn exists_for_broadcast(
        &self,
        lichess_round_id: &str,
        lichess_id: &str,
    ) -> Result<bool, StoreError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM games WHERE lichess_round_id = ? AND lichess_id = ?",
        )
        .bind(lichess_round_id)
        .bind(lichess_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    pub async fn set_finished(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE games SET is_finished = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{Database, TournamentStore};

    pub(crate) fn sample_game(tournament_id: i64) -> NewGame {
        NewGame {
            tournament_id,
            lichess_round_id: "round1".to_string(),
            lichess_id: "game1".to_string(),
            game_name: "Carlsen - Niemann".to_string(),
            round_name: "Round 1".to_string(),
            player1_name: "Carlsen".to_string(),
            player1_fide_id: Some(1503014),
            player1_rating: Some(2830),
            player1_fed: Some("NOR".to_string()),
            player2_name: "Niemann".to_string(),
            player2_fide_id: None,
            player2_rating: Some(2688),
            player2_fed: None,
            status: "*".to_string(),
        }
    }

    async fn setup() -> (Database, TournamentStore, GameStore) {
        let db = Database::new_in_memory().await.unwrap();
        let tournaments = TournamentStore::new(db.pool().clone());
        let games = GameStore::new(db.pool().clone());
        (db, tournaments, games)
    }

    #[tokio::test]
    async fn test_create_with_filters_roundtrip() {
        let (_db, tournaments, games) = setup().await;
        let t = tournaments.insert("t1", "Open").await.unwrap();

        let filters = vec![
            ("White".to_string(), "Carlsen".to_string()),
            ("Black".to_string(), "Niemann".to_string()),
        ];
        let game = games
            .create_with_filters(&sample_game(t.id), &filters)
            .await
            .unwrap();

        assert!(!game.is_finished);
        assert_eq!(game.player1_rating, Some(2830));
        assert_eq!(games.filters(game.id).await.unwrap(), filters);
    }

    #[tokio::test]
    async fn test_set_finished_removes_from_unfinished() {
        let (_db, tournaments, games) = setup().await;
        let t = tournaments.insert("t1", "Open").await.unwrap();
        let game = games
            .create_with_filters(&sample_game(t.id), &[])
            .await
            .unwrap();

        assert_eq!(games.list_unfinished().await.unwrap().len(), 1);
        games.set_finished(game.id).await.unwrap();
        assert!(games.list_unfinished().await.unwrap().is_empty());
        assert!(games.get(game.id).await.unwrap().is_finished);
    }

    #[tokio::test]
    async fn test_list_visible_hides_hidden_tournaments_finished_games() {
        let (db, tournaments, games) = setup().await;
        let t = tournaments.insert("t1", "Open").await.unwrap();
        let visible = games
            .create_with_filters(&sample_game(t.id), &[])
            .await
            .unwrap();
        let finished = games
            .create_with_filters(&sample_game(t.id), &[])
            .await
            .unwrap();
        games.set_finished(finished.id).await.unwrap();

        // Both games visible while the tournament is not hidden.
        assert_eq!(games.list_visible().await.unwrap().len(), 2);

        // Hiding the tournament hides its finished games but keeps live ones.
        sqlx::query("UPDATE tournaments SET is_hidden = 1 WHERE id = ?")
            .bind(t.id)
            .execute(db.pool())
            .await
            .unwrap();
        let listed = games.list_visible().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, visible.id);

        // A hidden game never shows up.
        sqlx::query("UPDATE games SET is_hidden = 1 WHERE id = ?")
            .bind(visible.id)
            .execute(db.pool())
            .await
            .unwrap();
        assert!(games.list_visible().await.unwrap().is_empty());
    }
}
