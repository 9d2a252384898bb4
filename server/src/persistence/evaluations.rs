use sqlx::SqlitePool;

use super::models::{Evaluation, EvaluationMove};
use super::StoreError;

#[derive(Clone)]
pub struct EvaluationStore {
    pool: SqlitePool,
}

/// Header values of a bundle about to be persisted.
#[derive(Debug, Clone)]
pub struct NewEvaluation {
    pub nodes: i64,
    pub time: i64,
    pub depth: i64,
    pub seldepth: i64,
    pub moves_left: Option<i64>,
}

/// One PV row of a bundle about to be persisted.
#[derive(Debug, Clone)]
pub struct NewEvaluationMove {
    pub nodes: i64,
    pub move_uci: String,
    pub move_san: String,
    pub q_score: i64,
    pub pv_san: String,
    pub pv_uci: String,
    pub mate_score: Option<i64>,
    pub white_score: Option<i64>,
    pub draw_score: Option<i64>,
    pub black_score: Option<i64>,
    pub moves_left: Option<i64>,
}

impl EvaluationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one bundle: the evaluation row plus its PV rows, atomically.
    pub async fn insert(
        &self,
        position_id: i64,
        evaluation: &NewEvaluation,
        moves: &[NewEvaluationMove],
    ) -> Result<(Evaluation, Vec<EvaluationMove>), StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO game_position_evaluations \
             (position_id, nodes, time, depth, seldepth, moves_left) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(position_id)
        .bind(evaluation.nodes)
        .bind(evaluation.time)
        .bind(evaluation.depth)
        .bind(evaluation.seldepth)
        .bind(evaluation.moves_left)
        .execute(&mut *tx)
        .await?;
        let evaluation_id = result.last_insert_rowid();

        for mv in moves {
            sqlx::query(
                "INSERT INTO game_position_evaluation_moves \
                 (evaluation_id, nodes, move_uci, move_san, q_score, pv_san, pv_uci, \
                  mate_score, white_score, draw_score, black_score, moves_left) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(evaluation_id)
            .bind(mv.nodes)
            .bind(&mv.move_uci)
            .bind(&mv.move_san)
            .bind(mv.q_score)
            .bind(&mv.pv_san)
            .bind(&mv.pv_uci)
            .bind(mv.mate_score)
            .bind(mv.white_score)
            .bind(mv.draw_score)
            .bind(mv.black_score)
            .bind(mv.moves_left)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        let evaluation = sqlx::query_as::<_, Evaluation>(
            "SELECT * FROM game_position_evaluations WHERE id = ?",
        )
        .bind(evaluation_id)
        .fetch_one(&self.pool)
        .await?;
        let moves = self.moves_for(evaluation_id).await?;
        Ok((evaluation, moves))
    }

    /// All bundles for a position in persistence order, with their PV rows.
    pub async fn list_for_position(
        &self,
        position_id: i64,
    ) -> Result<Vec<(Evaluation, Vec<EvaluationMove>)>, StoreError> {
        let evaluations = sqlx::query_as::<_, Evaluation>(
            "SELECT * FROM game_position_evaluations WHERE position_id = ? ORDER BY id",
        )
        .bind(position_id)
        .fetch_all(&self.pool)
        .await?;

        let mut result = Vec::with_capacity(evaluations.len());
        for evaluation in evaluations {
            let moves = self.moves_for(evaluation.id).await?;
            result.push((evaluation, moves));
        }
        Ok(result)
    }

    pub async fn count_for_position(&self, position_id: i64) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM game_position_evaluations WHERE position_id = ?",
        )
        .bind(position_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn moves_for(&self, evaluation_id: i64) -> Result<Vec<EvaluationMove>, StoreError> {
        Ok(sqlx::query_as::<_, EvaluationMove>(
            "SELECT * FROM game_position_evaluation_moves WHERE evaluation_id = ? ORDER BY id",
        )
        .bind(evaluation_id)
        .fetch_all(&self.pool)
        .await?)
    }
}
