//! Random-move engine.
//!
//! Selects uniformly from legal moves with a seeded generator and rates
//! positions by material. Used offline and for diagnostics when no UCI
//! executable is available.

use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::board::chess_types::{Color, PieceKind, ALL_PIECE_KINDS};
use crate::board::position::Position;
use crate::engine::engine_trait::{Evaluation, PositionEngine, Score};
use crate::errors::EngineError;
use crate::moves::chess_move::ChessMove;
use crate::moves::generator::{game_status, legal_moves, GameStatus};

pub struct RandomEngine {
    rng: StdRng,
}

impl RandomEngine {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl PositionEngine for RandomEngine {
    fn name(&self) -> &str {
        "Plum Random"
    }

    fn best_move(&mut self, position: &Position) -> Result<ChessMove, EngineError> {
        let legal_moves = legal_moves(position);
        legal_moves
            .as_slice()
            .choose(&mut self.rng)
            .copied()
            .ok_or(EngineError::NoMove)
    }

    fn evaluate(&mut self, position: &Position) -> Result<Evaluation, EngineError> {
        let score = match game_status(position) {
            GameStatus::Checkmate => Score::Mate(0),
            GameStatus::Stalemate => Score::Centipawns(0),
            GameStatus::Ongoing => Score::Centipawns(material_balance(position)),
        };
        Ok(Evaluation { score, wdl: None })
    }
}

fn piece_value(piece: PieceKind) -> i32 {
    match piece {
        PieceKind::Pawn => 100,
        PieceKind::Knight => 300,
        PieceKind::Bishop => 300,
        PieceKind::Rook => 500,
        PieceKind::Queen => 900,
        PieceKind::King => 0,
    }
}

/// White material minus Black material, in centipawns.
fn material_balance(position: &Position) -> i32 {
    ALL_PIECE_KINDS
        .iter()
        .map(|&piece| {
            let light = position.pieces[Color::Light.index()][piece.index()].count_ones() as i32;
            let dark = position.pieces[Color::Dark.index()][piece.index()].count_ones() as i32;
            (light - dark) * piece_value(piece)
        })
        .sum()
}
