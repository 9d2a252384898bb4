//! Row types for the persistent entities.

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Tournament {
    pub id: i64,
    pub lichess_id: String,
    pub name: String,
    pub is_finished: bool,
    pub is_hidden: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Game {
    pub id: i64,
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
    pub is_finished: bool,
    pub is_hidden: bool,
}

/// One half-move of a game; ply 0 is the starting position. The evaluation
/// columns always mirror the most recent bundle for this position.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GamePosition {
    pub id: i64,
    pub game_id: i64,
    pub ply_number: i64,
    pub fen: String,
    pub move_uci: Option<String>,
    pub move_san: Option<String>,
    pub white_clock: Option<i64>,
    pub black_clock: Option<i64>,
    pub nodes: Option<i64>,
    pub time: Option<i64>,
    pub depth: Option<i64>,
    pub seldepth: Option<i64>,
    pub q_score: Option<i64>,
    pub white_score: Option<i64>,
    pub draw_score: Option<i64>,
    pub black_score: Option<i64>,
    pub moves_left: Option<i64>,
}

/// One completed full-width info bundle from the engine.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Evaluation {
    pub id: i64,
    pub position_id: i64,
    pub nodes: i64,
    pub time: i64,
    pub depth: i64,
    pub seldepth: i64,
    pub moves_left: Option<i64>,
}

/// One principal variation persisted from a bundle.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EvaluationMove {
    pub id: i64,
    pub evaluation_id: i64,
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
