use sqlx::SqlitePool;

use super::models::GamePosition;
use super::StoreError;

#[derive(Clone)]
pub struct PositionStore {
    pool: SqlitePool,
}

/// The engine-derived columns of a position, replaced wholesale whenever a
/// new bundle completes for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationColumns {
    pub nodes: i64,
    pub time: i64,
    pub depth: i64,
    pub seldepth: i64,
    pub q_score: i64,
    pub white_score: Option<i64>,
    pub draw_score: Option<i64>,
    pub black_score: Option<i64>,
    pub moves_left: Option<i64>,
}

impl PositionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent insert keyed on `(game_id, ply_number)`. Returns the row
    /// and whether it was created by this call.
    #[allow(clippy::too_many_arguments)]
    pub async fn get_or_create(
        &self,
        game_id: i64,
        ply_number: i64,
        fen: &str,
        move_uci: Option<&str>,
        move_san: Option<&str>,
        white_clock: Option<i64>,
        black_clock: Option<i64>,
    ) -> Result<(GamePosition, bool), StoreError> {
        let result = sqlx::query(
            "INSERT INTO game_positions \
             (game_id, ply_number, fen, move_uci, move_san, white_clock, black_clock) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(game_id, ply_number) DO NOTHING",
        )
        .bind(game_id)
        .bind(ply_number)
        .bind(fen)
        .bind(move_uci)
        .bind(move_san)
        .bind(white_clock)
        .bind(black_clock)
        .execute(&self.pool)
        .await?;
        let created = result.rows_affected() > 0;

        let position = self.get_by_ply(game_id, ply_number).await?;
        Ok((position, created))
    }

    pub async fn get(&self, id: i64) -> Result<GamePosition, StoreError> {
        Ok(
            sqlx::query_as::<_, GamePosition>("SELECT * FROM game_positions WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    pub async fn get_by_ply(&self, game_id: i64, ply_number: i64) -> Result<GamePosition, StoreError> {
        Ok(sqlx::query_as::<_, GamePosition>(
            "SELECT * FROM game_positions WHERE game_id = ? AND ply_number = ?",
        )
        .bind(game_id)
        .bind(ply_number)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn find_by_ply(
        &self,
        game_id: i64,
        ply_number: i64,
    ) -> Result<Option<GamePosition>, StoreError> {
        Ok(sqlx::query_as::<_, GamePosition>(
            "SELECT * FROM game_positions WHERE game_id = ? AND ply_number = ?",
        )
        .bind(game_id)
        .bind(ply_number)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn list_for_game(&self, game_id: i64) -> Result<Vec<GamePosition>, StoreError> {
        Ok(sqlx::query_as::<_, GamePosition>(
            "SELECT * FROM game_positions WHERE game_id = ? ORDER BY ply_number",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Mirror the latest bundle's aggregates onto the position row.
    pub async fn update_evaluation_columns(
        &self,
        position_id: i64,
        columns: &EvaluationColumns,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE game_positions SET nodes = ?, time = ?, depth = ?, seldepth = ?, \
             q_score = ?, white_score = ?, draw_score = ?, black_score = ?, moves_left = ? \
             WHERE id = ?",
        )
        .bind(columns.nodes)
        .bind(columns.time)
        .bind(columns.depth)
        .bind(columns.seldepth)
        .bind(columns.q_score)
        .bind(columns.white_score)
        .bind(columns.draw_score)
        .bind(columns.black_score)
        .bind(columns.moves_left)
        .bind(position_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{Database, GameStore, NewGame, TournamentStore};

    async fn setup_game() -> (Database, PositionStore, i64) {
        let db = Database::new_in_memory().await.unwrap();
        let t = TournamentStore::new(db.pool().clone())
            .insert("t1", "Open")
            .await
            .unwrap();
        let game = GameStore::new(db.pool().clone())
            .create_with_filters(
                &NewGame {
                    tournament_id: t.id,
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
        let positions = PositionStore::new(db.pool().clone());
        (db, positions, game.id)
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let (_db, positions, game_id) = setup_game().await;

        let (first, created) = positions
            .get_or_create(game_id, 0, chess::STARTPOS_FEN, None, None, None, None)
            .await
            .unwrap();
        assert!(created);

        let (second, created) = positions
            .get_or_create(game_id, 0, "ignored", None, None, None, None)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        // The original row wins; later values are not applied.
        assert_eq!(second.fen, chess::STARTPOS_FEN);
    }

    #[tokio::test]
    async fn test_plies_are_listed_in_order() {
        let (_db, positions, game_id) = setup_game().await;
        for ply in 0..4 {
            positions
                .get_or_create(game_id, ply, "fen", None, None, None, None)
                .await
                .unwrap();
        }
        let listed = positions.list_for_game(game_id).await.unwrap();
        let plies: Vec<i64> = listed.iter().map(|p| p.ply_number).collect();
        assert_eq!(plies, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_update_evaluation_columns() {
        let (_db, positions, game_id) = setup_game().await;
        let (pos, _) = positions
            .get_or_create(game_id, 0, chess::STARTPOS_FEN, None, None, None, None)
            .await
            .unwrap();
        assert_eq!(pos.nodes, None);

        let columns = EvaluationColumns {
            nodes: 4418,
            time: 930,
            depth: 8,
            seldepth: 21,
            q_score: 37,
            white_score: Some(251),
            draw_score: Some(537),
            black_score: Some(212),
            moves_left: Some(52),
        };
        positions
            .update_evaluation_columns(pos.id, &columns)
            .await
            .unwrap();

        let updated = positions.get(pos.id).await.unwrap();
        assert_eq!(updated.nodes, Some(4418));
        assert_eq!(updated.q_score, Some(37));
        assert_eq!(
            updated.white_score.unwrap()
                + updated.draw_score.unwrap()
                + updated.black_score.unwrap(),
            1000
        );
        assert_eq!(updated.moves_left, Some(52));
    }
}
