//! Board configuration used by the rules engine and the game tree.
//!
//! `Position` stores piece bitboards, occupancy caches, side to move, castling
//! and en-passant state, and the two move clocks. Positions are plain values:
//! the game tree never stores them and recomputes them by replaying moves.

use crate::board::chess_types::*;
use crate::board::fen::{generate_fen, parse_fen};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    // [color][piece_kind]
    pub pieces: [[u64; 6]; 2],

    pub occupancy_by_color: [u64; 2],
    pub occupancy_all: u64,

    pub side_to_move: Color,
    pub castling_rights: CastlingRights,
    pub en_passant_square: Option<Square>,

    pub halfmove_clock: u16,
    pub fullmove_number: u16,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            pieces: [[0; 6]; 2],
            occupancy_by_color: [0; 2],
            occupancy_all: 0,

            side_to_move: Color::Light,
            castling_rights: 0,
            en_passant_square: None,

            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }
}

impl Position {
    #[inline]
    pub fn new_empty() -> Self {
        Self::default()
    }

    pub fn new_game() -> Self {
        let mut position = Self::new_empty();
        for (square, piece) in BACK_RANK.iter().enumerate() {
            position.pieces[Color::Light.index()][piece.index()] |= 1u64 << square;
            position.pieces[Color::Dark.index()][piece.index()] |= 1u64 << (56 + square);
        }
        position.pieces[Color::Light.index()][PieceKind::Pawn.index()] = 0x0000_0000_0000_FF00;
        position.pieces[Color::Dark.index()][PieceKind::Pawn.index()] = 0x00FF_0000_0000_0000;
        position.castling_rights = CASTLE_LIGHT_KINGSIDE
            | CASTLE_LIGHT_QUEENSIDE
            | CASTLE_DARK_KINGSIDE
            | CASTLE_DARK_QUEENSIDE;
        position.recalc_occupancy();
        position
    }

    #[inline]
    pub fn from_fen(fen: &str) -> Result<Self, String> {
        parse_fen(fen)
    }

    #[inline]
    pub fn to_fen(&self) -> String {
        generate_fen(self)
    }

    pub fn piece_on(&self, square: Square) -> Option<(Color, PieceKind)> {
        let mask = 1u64 << square;
        if self.occupancy_all & mask == 0 {
            return None;
        }
        for color in [Color::Light, Color::Dark] {
            for piece in ALL_PIECE_KINDS {
                if self.pieces[color.index()][piece.index()] & mask != 0 {
                    return Some((color, piece));
                }
            }
        }
        None
    }

    #[inline]
    pub fn piece_on_for_color(&self, color: Color, square: Square) -> Option<PieceKind> {
        match self.piece_on(square) {
            Some((owner, piece)) if owner == color => Some(piece),
            _ => None,
        }
    }

    #[inline]
    pub fn king_square(&self, color: Color) -> Option<Square> {
        let kings = self.pieces[color.index()][PieceKind::King.index()];
        if kings == 0 {
            None
        } else {
            Some(kings.trailing_zeros() as Square)
        }
    }

    pub fn recalc_occupancy(&mut self) {
        for color in [Color::Light, Color::Dark] {
            self.occupancy_by_color[color.index()] = self.pieces[color.index()]
                .iter()
                .copied()
                .fold(0u64, |acc, bb| acc | bb);
        }
        self.occupancy_all = self.occupancy_by_color[Color::Light.index()]
            | self.occupancy_by_color[Color::Dark.index()];
    }
}

const BACK_RANK: [PieceKind; 8] = [
    PieceKind::Rook,
    PieceKind::Knight,
    PieceKind::Bishop,
    PieceKind::Queen,
    PieceKind::King,
    PieceKind::Bishop,
    PieceKind::Knight,
    PieceKind::Rook,
];
