//! Typed WebSocket frames and their builders.
//!
//! One server-to-client message is a [`WsFrame`]; absent sections are
//! omitted from the JSON entirely. Field names are fixed wire vocabulary.

use serde::{Deserialize, Serialize};

use crate::persistence::{Evaluation, EvaluationMove, Game, GamePosition};

/// Client request: select a game and optionally a ply to follow.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsRequest {
    pub game_id: i64,
    #[serde(default)]
    pub ply: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WsFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub games: Option<Vec<GameData>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<PositionData>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluations: Option<Vec<EvaluationData>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub num_viewers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub js_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameData {
    pub game_id: i64,
    pub name: String,
    pub is_finished: bool,
    pub is_being_analyzed: bool,
    pub player1: PlayerData,
    pub player2: PlayerData,
    pub feed_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerData {
    pub name: String,
    pub rating: Option<i64>,
    pub fide_id: Option<i64>,
    pub fed: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionData {
    pub game_id: i64,
    /// 0 for the starting position.
    pub ply: i64,
    pub move_uci: Option<String>,
    pub move_san: Option<String>,
    pub fen: String,
    pub white_clock: Option<i64>,
    pub black_clock: Option<i64>,
    pub score_q: Option<i64>,
    pub score_w: Option<i64>,
    pub score_d: Option<i64>,
    pub score_b: Option<i64>,
    pub moves_left: Option<i64>,
    pub nodes: Option<i64>,
    pub time: Option<i64>,
    pub depth: Option<i64>,
    pub seldepth: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationData {
    pub game_id: i64,
    pub ply: i64,
    pub eval_id: i64,
    pub nodes: i64,
    pub time: i64,
    pub depth: i64,
    pub seldepth: i64,
    pub moves_left: Option<i64>,
    pub variations: Vec<VariationData>,
}

/// Historical bundles are thinned to node counts; only the latest bundle
/// carries full variation data.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationData {
    pub nodes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pv_san: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pv_uci: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_q: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_w: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_d: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_b: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mate_score: Option<i64>,
}

pub fn make_game_data(
    game: &Game,
    tournament_name: &str,
    is_being_analyzed: bool,
    feed_url: String,
) -> GameData {
    GameData {
        game_id: game.id,
        name: format!(
            "{} ({}) --- {}",
            game.game_name, game.round_name, tournament_name
        ),
        is_finished: game.is_finished,
        is_being_analyzed,
        player1: PlayerData {
            name: game.player1_name.clone(),
            rating: game.player1_rating,
            fide_id: game.player1_fide_id,
            fed: game.player1_fed.clone(),
        },
        player2: PlayerData {
            name: game.player2_name.clone(),
            rating: game.player2_rating,
            fide_id: game.player2_fide_id,
            fed: game.player2_fed.clone(),
        },
        feed_url,
    }
}

pub fn make_positions_update(game_id: i64, positions: &[GamePosition]) -> Vec<PositionData> {
    positions
        .iter()
        .map(|pos| PositionData {
            game_id,
            ply: pos.ply_number,
            move_uci: pos.move_uci.clone(),
            move_san: pos.move_san.clone(),
            fen: pos.fen.clone(),
            white_clock: pos.white_clock,
            black_clock: pos.black_clock,
            score_q: pos.q_score,
            score_w: pos.white_score,
            score_d: pos.draw_score,
            score_b: pos.black_score,
            moves_left: pos.moves_left,
            nodes: pos.nodes,
            time: pos.time,
            depth: pos.depth,
            seldepth: pos.seldepth,
        })
        .collect()
}

pub fn make_evaluations_update(
    game_id: i64,
    ply: i64,
    bundles: &[(Evaluation, Vec<EvaluationMove>)],
) -> Vec<EvaluationData> {
    let last = bundles.len().saturating_sub(1);
    bundles
        .iter()
        .enumerate()
        .map(|(i, (evaluation, moves))| EvaluationData {
            game_id,
            ply,
            eval_id: evaluation.id,
            nodes: evaluation.nodes,
            time: evaluation.time,
            depth: evaluation.depth,
            seldepth: evaluation.seldepth,
            moves_left: evaluation.moves_left,
            variations: moves
                .iter()
                .map(|mv| {
                    if i == last {
                        VariationData {
                            nodes: mv.nodes,
                            pv_san: Some(mv.pv_san.clone()),
                            pv_uci: Some(mv.pv_uci.clone()),
                            score_q: Some(mv.q_score),
                            score_w: mv.white_score,
                            score_d: mv.draw_score,
                            score_b: mv.black_score,
                            mate_score: mv.mate_score,
                        }
                    } else {
                        VariationData {
                            nodes: mv.nodes,
                            ..VariationData::default()
                        }
                    }
                })
                .collect(),
        })
        .collect()
}
