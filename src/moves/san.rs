//! Standard algebraic notation (SAN).
//!
//! SAN is the label text of every node on the move sheet and the notation of
//! PGN movetext. Formatting requires the position before the move; parsing
//! resolves the text against that position's legal moves.

use crate::board::algebraic::{file_from_char, rank_from_char, square_to_algebraic};
use crate::board::chess_types::*;
use crate::board::position::Position;
use crate::moves::apply::apply_move;
use crate::moves::attacks::is_king_in_check;
use crate::moves::chess_move::ChessMove;
use crate::moves::generator::legal_moves;

pub fn move_to_san(position: &Position, mv: ChessMove) -> Result<String, String> {
    let legal = legal_moves(position);
    if !legal.contains(&mv) {
        return Err(format!("Move {mv} is not legal in {}", position.to_fen()));
    }

    let (_, piece) = position
        .piece_on(mv.from)
        .ok_or_else(|| format!("No piece on from-square of {mv}"))?;

    let mut out = String::new();
    if piece == PieceKind::King && square_file(mv.from).abs_diff(square_file(mv.to)) == 2 {
        out.push_str(if square_file(mv.to) == 6 { "O-O" } else { "O-O-O" });
    } else {
        let is_capture = position.piece_on(mv.to).is_some()
            || (piece == PieceKind::Pawn && square_file(mv.from) != square_file(mv.to));

        match piece.san_letter() {
            Some(letter) => {
                out.push(letter);
                out.push_str(&disambiguation(position, &legal, mv, piece));
            }
            None if is_capture => out.push(char::from(b'a' + square_file(mv.from))),
            None => {}
        }

        if is_capture {
            out.push('x');
        }
        out.push_str(&square_to_algebraic(mv.to)?);

        if let Some(promotion) = mv.promotion {
            out.push('=');
            out.push(promotion.san_letter().unwrap_or('Q'));
        }
    }

    let next = apply_move(position, mv)?;
    if is_king_in_check(&next, next.side_to_move) {
        out.push(if legal_moves(&next).is_empty() { '#' } else { '+' });
    }

    Ok(out)
}

fn disambiguation(position: &Position, legal: &[ChessMove], mv: ChessMove, piece: PieceKind) -> String {
    let rivals: Vec<Square> = legal
        .iter()
        .filter(|other| other.to == mv.to && other.from != mv.from)
        .filter(|other| {
            position
                .piece_on(other.from)
                .is_some_and(|(_, kind)| kind == piece)
        })
        .map(|other| other.from)
        .collect();

    if rivals.is_empty() {
        return String::new();
    }

    let file_char = char::from(b'a' + square_file(mv.from));
    let rank_char = char::from(b'1' + square_rank(mv.from));
    if rivals.iter().all(|sq| square_file(*sq) != square_file(mv.from)) {
        file_char.to_string()
    } else if rivals.iter().all(|sq| square_rank(*sq) != square_rank(mv.from)) {
        rank_char.to_string()
    } else {
        format!("{file_char}{rank_char}")
    }
}

/// Resolve SAN text (or, as a fallback, coordinate notation) to a legal move.
///
/// Accepts the usual variants seen in hand-written records: `0-0` castling,
/// promotions with or without `=`, redundant disambiguation, and trailing
/// check or annotation glyphs.
pub fn san_to_move(position: &Position, san: &str) -> Result<ChessMove, String> {
    let cleaned = san.trim_end_matches(|c: char| matches!(c, '+' | '#' | '!' | '?'));
    let legal = legal_moves(position);

    let castle_target = match cleaned {
        "O-O" | "0-0" => Some(6u8),
        "O-O-O" | "0-0-0" => Some(2u8),
        _ => None,
    };
    if let Some(target_file) = castle_target {
        let king_sq = position
            .king_square(position.side_to_move)
            .ok_or("No king for side to move")?;
        return legal
            .into_iter()
            .find(|mv| {
                mv.from == king_sq
                    && square_file(mv.from).abs_diff(square_file(mv.to)) == 2
                    && square_file(mv.to) == target_file
            })
            .ok_or_else(|| format!("Castling {san} is not legal here"));
    }

    match parse_san_parts(cleaned) {
        Ok(parts) => {
            let candidates: Vec<ChessMove> = legal
                .into_iter()
                .filter(|mv| parts.matches(position, *mv))
                .collect();
            match candidates.as_slice() {
                [only] => Ok(*only),
                [] => Err(format!("No legal move matches {san}")),
                _ => Err(format!("Ambiguous move {san}")),
            }
        }
        Err(err) => match ChessMove::from_uci(cleaned) {
            Ok(mv) if legal.contains(&mv) => Ok(mv),
            _ => Err(err),
        },
    }
}

struct SanParts {
    piece: PieceKind,
    from_file: Option<u8>,
    from_rank: Option<u8>,
    to: Square,
    promotion: Option<PieceKind>,
}

impl SanParts {
    fn matches(&self, position: &Position, mv: ChessMove) -> bool {
        mv.to == self.to
            && mv.promotion == self.promotion
            && self.from_file.is_none_or(|f| square_file(mv.from) == f)
            && self.from_rank.is_none_or(|r| square_rank(mv.from) == r)
            && position
                .piece_on(mv.from)
                .is_some_and(|(_, kind)| kind == self.piece)
    }
}

fn parse_san_parts(text: &str) -> Result<SanParts, String> {
    let mut chars: Vec<char> = text.chars().filter(|c| !matches!(c, 'x' | ':' | '-')).collect();
    if chars.is_empty() {
        return Err("Empty move text".to_owned());
    }

    let piece = match PieceKind::from_san_letter(chars[0]) {
        Some(piece) => {
            chars.remove(0);
            piece
        }
        None => PieceKind::Pawn,
    };

    let mut promotion = None;
    if piece == PieceKind::Pawn {
        if let Some(&last) = chars.last() {
            if let Some(promo) = PieceKind::from_san_letter(last.to_ascii_uppercase())
                .filter(|p| !matches!(p, PieceKind::King))
                .filter(|_| last.is_ascii_uppercase() || chars.len() > 2 && chars[chars.len() - 2] == '=')
            {
                promotion = Some(promo);
                chars.pop();
            }
        }
    }
    if chars.last() == Some(&'=') {
        chars.pop();
    }

    if chars.len() < 2 || chars.len() > 4 {
        return Err(format!("Invalid SAN move: {text}"));
    }

    let dest = &chars[chars.len() - 2..];
    let to = rank_from_char(dest[1])? * 8 + file_from_char(dest[0])?;

    let mut from_file = None;
    let mut from_rank = None;
    for hint in &chars[..chars.len() - 2] {
        if let Ok(file) = file_from_char(*hint) {
            from_file = Some(file);
        } else if let Ok(rank) = rank_from_char(*hint) {
            from_rank = Some(rank);
        } else {
            return Err(format!("Invalid disambiguation '{hint}' in {text}"));
        }
    }

    Ok(SanParts {
        piece,
        from_file,
        from_rank,
        to,
        promotion,
    })
}

#[cfg(test)]
mod tests {
    use super::{move_to_san, san_to_move};
    use crate::board::position::Position;
    use crate::moves::apply::apply_move;
    use crate::moves::chess_move::ChessMove;

    fn uci(text: &str) -> ChessMove {
        ChessMove::from_uci(text).expect("UCI move should parse")
    }

    fn fen(text: &str) -> Position {
        Position::from_fen(text).expect("FEN should parse")
    }

    #[test]
    fn formats_opening_moves() {
        let start = Position::new_game();
        assert_eq!(move_to_san(&start, uci("e2e4")).expect("san"), "e4");
        assert_eq!(move_to_san(&start, uci("g1f3")).expect("san"), "Nf3");
        assert!(move_to_san(&start, uci("e2e5")).is_err());
    }

    #[test]
    fn formats_captures_and_disambiguation() {
        let position = fen("4k3/8/8/3p4/4P3/5N2/8/RN2K2R w - - 0 1");
        assert_eq!(move_to_san(&position, uci("e4d5")).expect("san"), "exd5");
        assert_eq!(move_to_san(&position, uci("b1d2")).expect("san"), "Nbd2");

        let rooks = fen("4k3/8/8/R7/8/8/8/R3K3 w - - 0 1");
        assert_eq!(move_to_san(&rooks, uci("a1a3")).expect("san"), "R1a3");
    }

    #[test]
    fn formats_castling_promotion_and_mate() {
        let castle = fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1");
        assert_eq!(move_to_san(&castle, uci("e1g1")).expect("san"), "O-O");
        assert_eq!(move_to_san(&castle, uci("e1c1")).expect("san"), "O-O-O");

        let promo = fen("k7/4P3/8/8/8/8/8/7K w - - 0 1");
        assert_eq!(move_to_san(&promo, uci("e7e8q")).expect("san"), "e8=Q+");

        let mate = fen("rnbqkbnr/pppp1ppp/8/4p3/6P1/5P2/PPPPP2P/RNBQKBNR b KQkq - 0 2");
        assert_eq!(move_to_san(&mate, uci("d8h4")).expect("san"), "Qh4#");
    }

    #[test]
    fn parses_common_spellings() {
        let start = Position::new_game();
        assert_eq!(san_to_move(&start, "e4").expect("parse"), uci("e2e4"));
        assert_eq!(san_to_move(&start, "Nf3!?").expect("parse"), uci("g1f3"));
        assert_eq!(san_to_move(&start, "Ngf3").expect("parse"), uci("g1f3"));
        assert_eq!(san_to_move(&start, "g1f3").expect("parse"), uci("g1f3"));
        assert!(san_to_move(&start, "Nd4").is_err());

        let castle = fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1");
        assert_eq!(san_to_move(&castle, "0-0").expect("parse"), uci("e1g1"));
        assert_eq!(san_to_move(&castle, "O-O-O").expect("parse"), uci("e1c1"));

        let promo = fen("k7/4P3/8/8/8/8/8/7K w - - 0 1");
        assert_eq!(san_to_move(&promo, "e8=N").expect("parse"), uci("e7e8n"));
        assert_eq!(san_to_move(&promo, "e8Q").expect("parse"), uci("e7e8q"));
    }

    #[test]
    fn round_trips_a_short_game() {
        let mut position = Position::new_game();
        for san in ["e4", "e5", "Nf3", "Nc6", "Bb5", "a6", "Bxc6", "dxc6", "O-O"] {
            let mv = san_to_move(&position, san).expect("SAN should parse");
            assert_eq!(move_to_san(&position, mv).expect("SAN should format"), san);
            position = apply_move(&position, mv).expect("move should apply");
        }
    }
}
