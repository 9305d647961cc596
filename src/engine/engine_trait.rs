//! Position engine abstraction.
//!
//! A position engine answers two questions about a position: the move it
//! would play, and how it rates the position. Backends are owned values, so
//! every caller that needs one holds its own instance.

use std::fmt;
use std::sync::Arc;

use crate::board::chess_types::Color;
use crate::board::position::Position;
use crate::errors::EngineError;
use crate::moves::chess_move::ChessMove;

/// Engine score from White's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    /// Moves to mate; negative when White is getting mated.
    Mate(i32),
}

impl Score {
    /// Flip a score reported for the side to move into White's point of view.
    pub fn from_side_to_move(self, side: Color) -> Self {
        match (self, side) {
            (score, Color::Light) => score,
            (Score::Centipawns(cp), Color::Dark) => Score::Centipawns(-cp),
            (Score::Mate(n), Color::Dark) => Score::Mate(-n),
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Centipawns(cp) => write!(f, "{:+.2}", f64::from(*cp) / 100.0),
            Score::Mate(n) if *n < 0 => write!(f, "-M{}", n.unsigned_abs()),
            Score::Mate(n) => write!(f, "M{n}"),
        }
    }
}

/// Win/draw/loss expectation in permille, White's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wdl {
    pub win: u16,
    pub draw: u16,
    pub loss: u16,
}

impl Wdl {
    pub fn from_side_to_move(self, side: Color) -> Self {
        match side {
            Color::Light => self,
            Color::Dark => Wdl {
                win: self.loss,
                draw: self.draw,
                loss: self.win,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub score: Score,
    pub wdl: Option<Wdl>,
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.score)?;
        if let Some(wdl) = self.wdl {
            write!(f, " (W {} / D {} / L {})", wdl.win, wdl.draw, wdl.loss)?;
        }
        Ok(())
    }
}

pub trait PositionEngine: Send {
    fn name(&self) -> &str;

    /// Best move in `position`. The position is sent with every query.
    fn best_move(&mut self, position: &Position) -> Result<ChessMove, EngineError>;

    fn evaluate(&mut self, position: &Position) -> Result<Evaluation, EngineError>;
}

impl fmt::Debug for dyn PositionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PositionEngine").field("name", &self.name()).finish()
    }
}

/// Builds a fresh engine for each auto-play run.
pub type EngineFactory = Arc<dyn Fn() -> Result<Box<dyn PositionEngine>, EngineError> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::{Evaluation, Score, Wdl};
    use crate::board::chess_types::Color;

    #[test]
    fn scores_flip_for_black_to_move() {
        assert_eq!(Score::Centipawns(35).from_side_to_move(Color::Dark), Score::Centipawns(-35));
        assert_eq!(Score::Mate(3).from_side_to_move(Color::Dark), Score::Mate(-3));
        assert_eq!(Score::Mate(3).from_side_to_move(Color::Light), Score::Mate(3));

        let wdl = Wdl { win: 600, draw: 300, loss: 100 };
        assert_eq!(wdl.from_side_to_move(Color::Dark), Wdl { win: 100, draw: 300, loss: 600 });
    }

    #[test]
    fn evaluation_display() {
        let eval = Evaluation {
            score: Score::Centipawns(-120),
            wdl: Some(Wdl { win: 50, draw: 400, loss: 550 }),
        };
        assert_eq!(eval.to_string(), "-1.20 (W 50 / D 400 / L 550)");
        assert_eq!(Score::Mate(-2).to_string(), "-M2");
        assert_eq!(Score::Centipawns(0).to_string(), "+0.00");
    }
}
