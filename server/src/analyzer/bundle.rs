//! Accumulation of engine info records into full-width bundles, and the
//! nodes-weighted aggregates persisted from them.

use engine::{InfoRecord, Score};

use crate::persistence::{EvaluationColumns, NewEvaluationMove};

/// Q-score magnitude used for forced mates.
pub const MATE_Q: i64 = 20_000;

/// Collects a contiguous `multipv = 1..N` run of info records. A record
/// arriving out of order discards the partial bundle and restarts
/// accumulation; only complete bundles are ever returned.
#[derive(Debug)]
pub struct BundleAccumulator {
    expected: u32,
    records: Vec<InfoRecord>,
}

impl BundleAccumulator {
    pub fn new(expected: u32) -> Self {
        Self {
            expected: expected.max(1),
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: InfoRecord) -> Option<Vec<InfoRecord>> {
        // Stats-only lines (upper-bound reports, `info string`, …) are not
        // part of any bundle.
        if record.score.is_none() && record.pv.is_empty() {
            return None;
        }

        let slot = record.multipv.unwrap_or(1);
        let next = self.records.len() as u32 + 1;
        if slot != next {
            tracing::warn!(
                got = slot,
                expected = next,
                "Engine multipv stream desync, dropping partial bundle"
            );
            self.records.clear();
            if slot != 1 {
                return None;
            }
        }
        self.records.push(record);

        if self.records.len() as u32 == self.expected {
            Some(std::mem::take(&mut self.records))
        } else {
            None
        }
    }
}

/// Evaluation from White's point of view, mate clamped to ±[`MATE_Q`].
pub fn score_q_white(record: &InfoRecord, white_to_move: bool) -> i64 {
    let q = match record.score {
        Some(Score::Centipawns(cp)) => i64::from(cp),
        // `mate 0` means the side to move is mated.
        Some(Score::Mate(m)) => {
            if m > 0 {
                MATE_Q
            } else {
                -MATE_Q
            }
        }
        None => 0,
    };
    if white_to_move {
        q
    } else {
        -q
    }
}

/// Signed mate distance from White's point of view, when the record is a
/// forced mate.
pub fn mate_score_white(record: &InfoRecord, white_to_move: bool) -> Option<i64> {
    match record.score {
        Some(Score::Mate(m)) => {
            let m = i64::from(m);
            Some(if white_to_move { m } else { -m })
        }
        _ => None,
    }
}

/// Win/draw/loss per-mille triple from White's point of view.
pub fn wdl_white(record: &InfoRecord, white_to_move: bool) -> Option<(i64, i64, i64)> {
    record.wdl.map(|wdl| {
        let (win, draw, loss) = (
            i64::from(wdl.win),
            i64::from(wdl.draw),
            i64::from(wdl.loss),
        );
        if white_to_move {
            (win, draw, loss)
        } else {
            (loss, draw, win)
        }
    })
}

/// The position-row aggregates of one complete bundle: everything is
/// weighted by each PV's node count; `time`/`depth`/`seldepth` come from
/// the first PV.
pub fn aggregate(records: &[InfoRecord], white_to_move: bool) -> EvaluationColumns {
    let nodes_total: i64 = records.iter().map(|r| r.nodes.unwrap_or(0) as i64).sum();

    // With no node counts at all, fall back to uniform weights.
    let uniform = nodes_total == 0;
    let weight_of = |r: &InfoRecord| -> f64 {
        if uniform {
            1.0
        } else {
            r.nodes.unwrap_or(0) as f64
        }
    };
    let denominator = if uniform {
        records.len() as f64
    } else {
        nodes_total as f64
    };

    let q_score = (records
        .iter()
        .map(|r| weight_of(r) * score_q_white(r, white_to_move) as f64)
        .sum::<f64>()
        / denominator)
        .round() as i64;

    let mut wdl_weight = 0.0;
    let mut win_sum = 0.0;
    let mut loss_sum = 0.0;
    let mut wdl_count = 0usize;
    for r in records {
        if let Some((win, _, loss)) = wdl_white(r, white_to_move) {
            let w = weight_of(r);
            wdl_weight += w;
            win_sum += w * win as f64;
            loss_sum += w * loss as f64;
            wdl_count += 1;
        }
    }
    let (white_score, draw_score, black_score) = if wdl_count == 0 {
        (None, None, None)
    } else {
        let d = if wdl_weight > 0.0 {
            wdl_weight
        } else {
            wdl_count as f64
        };
        let white = (win_sum / d).round() as i64;
        let black = (loss_sum / d).round() as i64;
        (Some(white), Some(1000 - white - black), Some(black))
    };

    let mut ml_weight = 0.0;
    let mut ml_sum = 0.0;
    let mut ml_count = 0usize;
    for r in records {
        if let Some(ml) = r.movesleft {
            let w = weight_of(r);
            ml_weight += w;
            ml_sum += w * f64::from(ml);
            ml_count += 1;
        }
    }
    let moves_left = if ml_count == 0 {
        None
    } else {
        let d = if ml_weight > 0.0 {
            ml_weight
        } else {
            ml_count as f64
        };
        Some((ml_sum / d).round() as i64)
    };

    let first = records.first();
    EvaluationColumns {
        nodes: nodes_total,
        time: first.and_then(|r| r.time_ms).unwrap_or(0) as i64,
        depth: first.and_then(|r| r.depth).unwrap_or(0) as i64,
        seldepth: first.and_then(|r| r.seldepth).unwrap_or(0) as i64,
        q_score,
        white_score,
        draw_score,
        black_score,
        moves_left,
    }
}

/// Turn one PV record into a persistable evaluation-move row, resolving the
/// PV against the analyzed position for SAN rendering. Returns `None` for
/// records whose PV does not replay from the position.
pub fn build_variation(
    record: &InfoRecord,
    fen: &str,
    white_to_move: bool,
) -> Option<NewEvaluationMove> {
    let mut board = chess::parse_fen(fen).ok()?;
    let mut san_line = Vec::new();
    let mut uci_line = Vec::new();
    for uci in &record.pv {
        let Ok(mv) = chess::parse_uci_move(&board, uci) else {
            break;
        };
        san_line.push(chess::format_san(&board, mv));
        uci_line.push(chess::format_uci_move(&board, mv));
        board.play_unchecked(mv);
    }
    let first_uci = uci_line.first()?.clone();
    let first_san = san_line.first()?.clone();

    let wdl = wdl_white(record, white_to_move);
    Some(NewEvaluationMove {
        nodes: record.nodes.unwrap_or(0) as i64,
        move_uci: first_uci,
        move_san: first_san,
        q_score: score_q_white(record, white_to_move),
        pv_san: san_line.join(" "),
        pv_uci: uci_line.join(" "),
        mate_score: mate_score_white(record, white_to_move),
        white_score: wdl.map(|(w, _, _)| w),
        draw_score: wdl.map(|(_, d, _)| d),
        black_score: wdl.map(|(_, _, l)| l),
        moves_left: record.movesleft.map(i64::from),
    })
}
