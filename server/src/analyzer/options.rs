//! Resolution of the UCI option set sent before each analysis.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::persistence::{Game, GamePosition};

type OptionMap = BTreeMap<String, String>;

/// The configured base options: either a fixed map, or a function of the
/// game and position being analyzed.
#[derive(Clone)]
pub enum UciOptions {
    Static(OptionMap),
    PerPosition(Arc<dyn Fn(&Game, &GamePosition) -> OptionMap + Send + Sync>),
}

impl UciOptions {
    pub fn resolve(&self, game: &Game, position: &GamePosition) -> OptionMap {
        match self {
            Self::Static(map) => map.clone(),
            Self::PerPosition(f) => f(game, position),
        }
    }
}

impl fmt::Debug for UciOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(map) => f.debug_tuple("Static").field(map).finish(),
            Self::PerPosition(_) => f.write_str("PerPosition(..)"),
        }
    }
}

/// The full option list for one analysis: the configured base options,
/// extended with rating-calibrated contempt when both ratings are known.
/// The result is sorted by option name (BTreeMap order), so the command
/// sequence sent to the engine is deterministic.
pub fn analysis_options(
    base: &UciOptions,
    game: &Game,
    position: &GamePosition,
) -> Vec<(String, String)> {
    let mut options = base.resolve(game, position);

    if let (Some(rating1), Some(rating2)) = (game.player1_rating, game.player2_rating) {
        options.insert("ClearTree".to_string(), "true".to_string());
        options.insert("WDLCalibrationElo".to_string(), rating1.to_string());
        options.insert("Contempt".to_string(), (rating1 - rating2).to_string());
        options.insert(
            "ContemptMode".to_string(),
            "white_side_analysis".to_string(),
        );
        options.insert("WDLDrawRateReference".to_string(), "0.64".to_string());
        options.insert("WDLEvalObjectivity".to_string(), "0.0".to_string());
    }

    options.into_iter().collect()
}
