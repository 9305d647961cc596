//! Attack maps for every piece kind and square-attack queries.
//!
//! Leaper attacks (knight, king, pawn) are precomputed at compile time; slider
//! attacks trace rays against the current occupancy.

use crate::board::chess_types::*;
use crate::board::position::Position;

pub const KNIGHT_ATTACKS: [u64; 64] = generate_leaper_table(&KNIGHT_STEPS);
pub const KING_ATTACKS: [u64; 64] = generate_leaper_table(&KING_STEPS);
pub const LIGHT_PAWN_ATTACKS: [u64; 64] = generate_leaper_table(&[(-1, 1), (1, 1)]);
pub const DARK_PAWN_ATTACKS: [u64; 64] = generate_leaper_table(&[(-1, -1), (1, -1)]);

const KNIGHT_STEPS: [(i32, i32); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];

const KING_STEPS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

const BISHOP_DIRECTIONS: [(i32, i32); 4] = [(1, 1), (-1, 1), (1, -1), (-1, -1)];
const ROOK_DIRECTIONS: [(i32, i32); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];

const fn generate_leaper_table<const N: usize>(steps: &[(i32, i32); N]) -> [u64; 64] {
    let mut table = [0u64; 64];
    let mut sq = 0usize;

    while sq < 64 {
        let file = (sq % 8) as i32;
        let rank = (sq / 8) as i32;
        let mut attacks = 0u64;
        let mut i = 0usize;
        while i < N {
            let (df, dr) = steps[i];
            let (f, r) = (file + df, rank + dr);
            if f >= 0 && f < 8 && r >= 0 && r < 8 {
                attacks |= 1u64 << ((r * 8 + f) as u32);
            }
            i += 1;
        }
        table[sq] = attacks;
        sq += 1;
    }

    table
}

#[inline]
pub const fn knight_attacks(square: Square) -> u64 {
    KNIGHT_ATTACKS[square as usize]
}

#[inline]
pub const fn king_attacks(square: Square) -> u64 {
    KING_ATTACKS[square as usize]
}

#[inline]
pub const fn pawn_attacks(color: Color, square: Square) -> u64 {
    match color {
        Color::Light => LIGHT_PAWN_ATTACKS[square as usize],
        Color::Dark => DARK_PAWN_ATTACKS[square as usize],
    }
}

#[inline]
pub fn bishop_attacks(square: Square, occupancy: u64) -> u64 {
    BISHOP_DIRECTIONS
        .iter()
        .fold(0u64, |acc, &(df, dr)| acc | trace_ray(square, df, dr, occupancy))
}

#[inline]
pub fn rook_attacks(square: Square, occupancy: u64) -> u64 {
    ROOK_DIRECTIONS
        .iter()
        .fold(0u64, |acc, &(df, dr)| acc | trace_ray(square, df, dr, occupancy))
}

#[inline]
pub fn queen_attacks(square: Square, occupancy: u64) -> u64 {
    bishop_attacks(square, occupancy) | rook_attacks(square, occupancy)
}

/// Squares reached from `square` along one direction, including the first blocker.
fn trace_ray(square: Square, file_step: i32, rank_step: i32, occupancy: u64) -> u64 {
    let mut file = (square % 8) as i32 + file_step;
    let mut rank = (square / 8) as i32 + rank_step;
    let mut attacks = 0u64;

    while (0..8).contains(&file) && (0..8).contains(&rank) {
        let bit = 1u64 << ((rank * 8 + file) as u32);
        attacks |= bit;
        if occupancy & bit != 0 {
            break;
        }
        file += file_step;
        rank += rank_step;
    }

    attacks
}

/// Attack set of one piece standing on `square`.
pub fn piece_attacks(color: Color, piece: PieceKind, square: Square, occupancy: u64) -> u64 {
    match piece {
        PieceKind::Pawn => pawn_attacks(color, square),
        PieceKind::Knight => knight_attacks(square),
        PieceKind::Bishop => bishop_attacks(square, occupancy),
        PieceKind::Rook => rook_attacks(square, occupancy),
        PieceKind::Queen => queen_attacks(square, occupancy),
        PieceKind::King => king_attacks(square),
    }
}

pub fn is_square_attacked(position: &Position, square: Square, attacker_color: Color) -> bool {
    let theirs = &position.pieces[attacker_color.index()];
    let occupancy = position.occupancy_all;

    // A pawn of the attacker attacks `square` iff a pawn of ours on `square`
    // would attack the pawn's square.
    if pawn_attacks(attacker_color.opposite(), square) & theirs[PieceKind::Pawn.index()] != 0 {
        return true;
    }
    if knight_attacks(square) & theirs[PieceKind::Knight.index()] != 0 {
        return true;
    }
    if king_attacks(square) & theirs[PieceKind::King.index()] != 0 {
        return true;
    }

    let diagonal = theirs[PieceKind::Bishop.index()] | theirs[PieceKind::Queen.index()];
    if bishop_attacks(square, occupancy) & diagonal != 0 {
        return true;
    }

    let straight = theirs[PieceKind::Rook.index()] | theirs[PieceKind::Queen.index()];
    rook_attacks(square, occupancy) & straight != 0
}

#[inline]
pub fn is_king_in_check(position: &Position, color: Color) -> bool {
    let Some(king_sq) = position.king_square(color) else {
        return false;
    };
    is_square_attacked(position, king_sq, color.opposite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaper_tables_have_expected_counts() {
        let d4 = 27u8;
        assert_eq!(knight_attacks(d4).count_ones(), 8);
        assert_eq!(king_attacks(0).count_ones(), 3);
        assert_eq!(pawn_attacks(Color::Light, 12), (1u64 << 19) | (1u64 << 21));
        assert_eq!(pawn_attacks(Color::Dark, 52), (1u64 << 43) | (1u64 << 45));
        assert_eq!(pawn_attacks(Color::Light, 8), 1u64 << 17);
    }

    #[test]
    fn slider_rays_stop_at_blockers() {
        let c1 = 2u8;
        let bishop = bishop_attacks(c1, 1u64 << 20);
        assert_ne!(bishop & (1u64 << 20), 0);
        assert_eq!(bishop & (1u64 << 29), 0);

        let rook = rook_attacks(0, 1u64 << 24);
        assert_ne!(rook & (1u64 << 24), 0);
        assert_eq!(rook & (1u64 << 32), 0);

        assert_eq!(queen_attacks(27, 0).count_ones(), 27);
    }

    #[test]
    fn detects_check_from_slider() {
        let position =
            Position::from_fen("4k3/8/8/8/8/8/8/4R1K1 b - - 0 1").expect("FEN should parse");
        assert!(is_king_in_check(&position, Color::Dark));
        assert!(!is_king_in_check(&position, Color::Light));
    }
}
