//! Legal move generation.
//!
//! Generates pseudo-legal moves piece by piece, applies each candidate, and
//! drops those that leave the mover's own king in check. This is the rules
//! engine the game tree consults whenever it appends or replays a move.

use crate::board::chess_types::*;
use crate::board::position::Position;
use crate::moves::apply::apply_move;
use crate::moves::attacks::{is_king_in_check, is_square_attacked, piece_attacks};
use crate::moves::chess_move::ChessMove;

/// Outcome of the side to move having (or lacking) legal moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Ongoing,
    Checkmate,
    Stalemate,
}

pub fn legal_moves(position: &Position) -> Vec<ChessMove> {
    let mut pseudo = Vec::<ChessMove>::with_capacity(64);
    generate_pawn_moves(position, &mut pseudo);
    generate_piece_moves(position, &mut pseudo);
    generate_castling_moves(position, &mut pseudo);

    pseudo
        .into_iter()
        .filter(|mv| match apply_move(position, *mv) {
            Ok(next) => !is_king_in_check(&next, position.side_to_move),
            Err(_) => false,
        })
        .collect()
}

#[inline]
pub fn is_legal(position: &Position, mv: ChessMove) -> bool {
    legal_moves(position).contains(&mv)
}

pub fn game_status(position: &Position) -> GameStatus {
    if !legal_moves(position).is_empty() {
        GameStatus::Ongoing
    } else if is_king_in_check(position, position.side_to_move) {
        GameStatus::Checkmate
    } else {
        GameStatus::Stalemate
    }
}

fn generate_pawn_moves(position: &Position, out: &mut Vec<ChessMove>) {
    let side = position.side_to_move;
    let enemy_occ = position.occupancy_by_color[side.opposite().index()];
    let empty = !position.occupancy_all;
    let (forward, start_rank, promotion_rank): (i8, u8, u8) = match side {
        Color::Light => (8, 1, 7),
        Color::Dark => (-8, 6, 0),
    };

    let mut push = |from: Square, to: Square| {
        if square_rank(to) == promotion_rank {
            for promo in PROMOTION_PIECE_KINDS {
                out.push(ChessMove::with_promotion(from, to, promo));
            }
        } else {
            out.push(ChessMove::new(from, to));
        }
    };

    let mut pawns = position.pieces[side.index()][PieceKind::Pawn.index()];
    while pawns != 0 {
        let from = pawns.trailing_zeros() as Square;
        pawns &= pawns - 1;
        if square_rank(from) == promotion_rank {
            continue;
        }

        let one_step = (from as i8 + forward) as Square;
        if empty & (1u64 << one_step) != 0 {
            push(from, one_step);

            let two_step = (one_step as i8 + forward) as Square;
            if square_rank(from) == start_rank && empty & (1u64 << two_step) != 0 {
                push(from, two_step);
            }
        }

        let mut captures = piece_attacks(side, PieceKind::Pawn, from, 0) & enemy_occ;
        while captures != 0 {
            let to = captures.trailing_zeros() as Square;
            captures &= captures - 1;
            push(from, to);
        }

        if let Some(ep) = position.en_passant_square {
            if piece_attacks(side, PieceKind::Pawn, from, 0) & (1u64 << ep) != 0 {
                push(from, ep);
            }
        }
    }
}

fn generate_piece_moves(position: &Position, out: &mut Vec<ChessMove>) {
    let side = position.side_to_move;
    let own_occ = position.occupancy_by_color[side.index()];

    for piece in [
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Rook,
        PieceKind::Queen,
        PieceKind::King,
    ] {
        let mut movers = position.pieces[side.index()][piece.index()];
        while movers != 0 {
            let from = movers.trailing_zeros() as Square;
            movers &= movers - 1;

            let mut targets = piece_attacks(side, piece, from, position.occupancy_all) & !own_occ;
            while targets != 0 {
                let to = targets.trailing_zeros() as Square;
                targets &= targets - 1;
                out.push(ChessMove::new(from, to));
            }
        }
    }
}

fn generate_castling_moves(position: &Position, out: &mut Vec<ChessMove>) {
    let side = position.side_to_move;
    let enemy = side.opposite();
    let (king_home, kingside, queenside) = match side {
        Color::Light => (4u8, CASTLE_LIGHT_KINGSIDE, CASTLE_LIGHT_QUEENSIDE),
        Color::Dark => (60u8, CASTLE_DARK_KINGSIDE, CASTLE_DARK_QUEENSIDE),
    };

    if position.king_square(side) != Some(king_home)
        || is_square_attacked(position, king_home, enemy)
    {
        return;
    }

    let rooks = position.pieces[side.index()][PieceKind::Rook.index()];
    let sides: [(CastlingRights, Square, &[Square], [Square; 2]); 2] = [
        (kingside, king_home + 3, &[king_home + 1, king_home + 2], [king_home + 1, king_home + 2]),
        (
            queenside,
            king_home - 4,
            &[king_home - 1, king_home - 2, king_home - 3],
            [king_home - 1, king_home - 2],
        ),
    ];

    // `between` must be empty; `crossed` (ending on the king's target) must be safe.
    for (right, rook_sq, between, crossed) in sides {
        if position.castling_rights & right == 0 || rooks & (1u64 << rook_sq) == 0 {
            continue;
        }
        if between
            .iter()
            .any(|sq| position.occupancy_all & (1u64 << sq) != 0)
        {
            continue;
        }
        if crossed.iter().any(|sq| is_square_attacked(position, *sq, enemy)) {
            continue;
        }
        out.push(ChessMove::new(king_home, crossed[1]));
    }
}

#[cfg(test)]
mod tests {
    use super::{game_status, is_legal, legal_moves, GameStatus};
    use crate::board::position::Position;
    use crate::moves::apply::apply_move;
    use crate::moves::chess_move::ChessMove;

    fn perft(position: &Position, depth: u8) -> u64 {
        if depth == 0 {
            return 1;
        }
        legal_moves(position)
            .into_iter()
            .map(|mv| {
                let next = apply_move(position, mv).expect("legal move should apply");
                perft(&next, depth - 1)
            })
            .sum()
    }

    #[test]
    fn perft_start_position() {
        let position = Position::new_game();
        assert_eq!(perft(&position, 1), 20);
        assert_eq!(perft(&position, 2), 400);
        assert_eq!(perft(&position, 3), 8902);
    }

    #[test]
    fn perft_kiwipete() {
        let position = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .expect("FEN should parse");
        assert_eq!(perft(&position, 1), 48);
        assert_eq!(perft(&position, 2), 2039);
    }

    #[test]
    fn perft_rook_endgame() {
        let position =
            Position::from_fen("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1").expect("FEN should parse");
        assert_eq!(perft(&position, 1), 14);
        assert_eq!(perft(&position, 2), 191);
        assert_eq!(perft(&position, 3), 2812);
    }

    #[test]
    fn pinned_piece_cannot_move() {
        let position =
            Position::from_fen("4k3/4r3/8/8/8/8/4B3/4K3 w - - 0 1").expect("FEN should parse");
        assert!(!is_legal(&position, ChessMove::from_uci("e2d3").expect("parse")));
        assert!(is_legal(&position, ChessMove::from_uci("e1d1").expect("parse")));
    }

    #[test]
    fn detects_mate_and_stalemate() {
        let mate = Position::from_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3")
            .expect("FEN should parse");
        assert_eq!(game_status(&mate), GameStatus::Checkmate);

        let stalemate = Position::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").expect("FEN should parse");
        assert_eq!(game_status(&stalemate), GameStatus::Stalemate);

        assert_eq!(game_status(&Position::new_game()), GameStatus::Ongoing);
    }
}
