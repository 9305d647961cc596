//! Move application.
//!
//! `apply_move` derives captures, en passant, castling, and promotion from the
//! board itself, so a bare coordinate move is enough. It validates that the
//! move is physically possible (right side, own piece, well-formed promotion)
//! but not that it is legal; legality is `generator::is_legal`.

use crate::board::chess_types::*;
use crate::board::position::Position;
use crate::moves::chess_move::ChessMove;

pub fn apply_move(position: &Position, mv: ChessMove) -> Result<Position, String> {
    let from = mv.from;
    let to = mv.to;
    if from > 63 || to > 63 || from == to {
        return Err(format!("Malformed move {mv}"));
    }

    let moving_color = position.side_to_move;
    let enemy_color = moving_color.opposite();

    let moved_piece = match position.piece_on(from) {
        Some((color, piece)) if color == moving_color => piece,
        Some(_) => return Err(format!("Piece on {mv} does not belong to side to move")),
        None => return Err(format!("No piece on from-square of {mv}")),
    };

    let captured = match position.piece_on(to) {
        Some((color, _)) if color == moving_color => {
            return Err(format!("Move {mv} lands on an own piece"));
        }
        Some((_, piece)) => Some(piece),
        None => None,
    };

    let is_en_passant = moved_piece == PieceKind::Pawn
        && captured.is_none()
        && square_file(from) != square_file(to)
        && position.en_passant_square == Some(to);
    let is_castling = moved_piece == PieceKind::King && square_file(from).abs_diff(square_file(to)) == 2;

    let promotion_rank = match moving_color {
        Color::Light => 7,
        Color::Dark => 0,
    };
    match (moved_piece, mv.promotion) {
        (PieceKind::Pawn, None) if square_rank(to) == promotion_rank => {
            return Err(format!("Missing promotion piece in {mv}"));
        }
        (PieceKind::Pawn, Some(_)) if square_rank(to) != promotion_rank => {
            return Err(format!("Promotion move {mv} must end on back rank"));
        }
        (PieceKind::Pawn, Some(PieceKind::Pawn | PieceKind::King)) => {
            return Err(format!("Invalid promotion piece in {mv}"));
        }
        (piece, Some(_)) if piece != PieceKind::Pawn => {
            return Err(format!("Only pawns may promote ({mv})"));
        }
        _ => {}
    }

    let mut next = position.clone();
    let us = moving_color.index();
    let them = enemy_color.index();

    next.pieces[us][moved_piece.index()] &= !(1u64 << from);

    if let Some(piece) = captured {
        next.pieces[them][piece.index()] &= !(1u64 << to);
    } else if is_en_passant {
        let capture_sq = match moving_color {
            Color::Light => to - 8,
            Color::Dark => to + 8,
        };
        next.pieces[them][PieceKind::Pawn.index()] &= !(1u64 << capture_sq);
    }

    let placed = mv.promotion.unwrap_or(moved_piece);
    next.pieces[us][placed.index()] |= 1u64 << to;

    if is_castling {
        let (rook_from, rook_to) = match (moving_color, to) {
            (Color::Light, 6) => (7, 5),
            (Color::Light, 2) => (0, 3),
            (Color::Dark, 62) => (63, 61),
            (Color::Dark, 58) => (56, 59),
            _ => return Err(format!("Invalid castling move {mv}")),
        };
        next.pieces[us][PieceKind::Rook.index()] &= !(1u64 << rook_from);
        next.pieces[us][PieceKind::Rook.index()] |= 1u64 << rook_to;
    }

    update_castling_rights(&mut next, moving_color, from, to, moved_piece);

    next.en_passant_square =
        if moved_piece == PieceKind::Pawn && square_rank(from).abs_diff(square_rank(to)) == 2 {
            Some((from + to) / 2)
        } else {
            None
        };

    if moved_piece == PieceKind::Pawn || captured.is_some() || is_en_passant {
        next.halfmove_clock = 0;
    } else {
        next.halfmove_clock = next.halfmove_clock.saturating_add(1);
    }
    if moving_color == Color::Dark {
        next.fullmove_number = next.fullmove_number.saturating_add(1);
    }

    next.side_to_move = enemy_color;
    next.recalc_occupancy();

    Ok(next)
}

fn update_castling_rights(
    position: &mut Position,
    moving_color: Color,
    from: Square,
    to: Square,
    moved_piece: PieceKind,
) {
    if moved_piece == PieceKind::King {
        position.castling_rights &= match moving_color {
            Color::Light => !(CASTLE_LIGHT_KINGSIDE | CASTLE_LIGHT_QUEENSIDE),
            Color::Dark => !(CASTLE_DARK_KINGSIDE | CASTLE_DARK_QUEENSIDE),
        };
    }

    // Moving from or capturing on a rook home square drops that right.
    for square in [from, to] {
        position.castling_rights &= match square {
            0 => !CASTLE_LIGHT_QUEENSIDE,
            7 => !CASTLE_LIGHT_KINGSIDE,
            56 => !CASTLE_DARK_QUEENSIDE,
            63 => !CASTLE_DARK_KINGSIDE,
            _ => !0,
        };
    }
}
