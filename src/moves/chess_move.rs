//! Coordinate-notation moves.
//!
//! A `ChessMove` is what the engine process speaks (`e2e4`, `e7e8q`) and what
//! game-tree nodes store. Two moves are equal iff their from/to squares and
//! promotion piece are equal, which is the comparison the auto-play driver
//! relies on when checking the engine against the recorded line.

use std::fmt;
use std::str::FromStr;

use crate::board::algebraic::{algebraic_to_square, square_to_algebraic};
use crate::board::chess_types::{PieceKind, Square};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChessMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
}

impl ChessMove {
    #[inline]
    pub const fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    #[inline]
    pub const fn with_promotion(from: Square, to: Square, promotion: PieceKind) -> Self {
        Self {
            from,
            to,
            promotion: Some(promotion),
        }
    }

    /// Parse long algebraic (UCI) notation such as `g1f3` or `a7a8q`.
    pub fn from_uci(text: &str) -> Result<Self, String> {
        if !text.is_ascii() || (text.len() != 4 && text.len() != 5) {
            return Err(format!("Invalid long algebraic move: {text}"));
        }

        let from = algebraic_to_square(&text[0..2])?;
        let to = algebraic_to_square(&text[2..4])?;
        let promotion = match text[4..].chars().next() {
            None => None,
            Some(ch) => Some(char_to_promotion(ch)?),
        };

        Ok(Self {
            from,
            to,
            promotion,
        })
    }

    pub fn to_uci(&self) -> String {
        let mut out = String::with_capacity(5);
        // Squares built through `from_uci` or the generator are always on board.
        out.push_str(&square_to_algebraic(self.from).unwrap_or_else(|_| "??".to_owned()));
        out.push_str(&square_to_algebraic(self.to).unwrap_or_else(|_| "??".to_owned()));
        if let Some(piece) = self.promotion {
            out.push(promotion_to_char(piece));
        }
        out
    }
}

impl fmt::Display for ChessMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uci())
    }
}

impl FromStr for ChessMove {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_uci(s)
    }
}

fn promotion_to_char(piece_kind: PieceKind) -> char {
    match piece_kind {
        PieceKind::Knight => 'n',
        PieceKind::Bishop => 'b',
        PieceKind::Rook => 'r',
        _ => 'q',
    }
}

fn char_to_promotion(ch: char) -> Result<PieceKind, String> {
    match ch.to_ascii_lowercase() {
        'n' => Ok(PieceKind::Knight),
        'b' => Ok(PieceKind::Bishop),
        'r' => Ok(PieceKind::Rook),
        'q' => Ok(PieceKind::Queen),
        _ => Err(format!("Invalid promotion piece character: {ch}")),
    }
}
