//! Terminal-oriented Unicode board renderer used by the text front end.

use crate::board::chess_types::*;
use crate::board::position::Position;

/// Render the board to a Unicode string, White at the bottom.
pub fn render_position(position: &Position) -> String {
    let mut out = String::from("  a b c d e f g h\n");

    for rank in (0..8u8).rev() {
        let rank_char = char::from(b'1' + rank);
        out.push(rank_char);
        out.push(' ');

        for file in 0..8u8 {
            let glyph = position
                .piece_on(rank * 8 + file)
                .map(|(color, piece)| piece_to_unicode(color, piece))
                .unwrap_or('·');
            out.push(glyph);
            if file < 7 {
                out.push(' ');
            }
        }

        out.push(' ');
        out.push(rank_char);
        out.push('\n');
    }

    out.push_str("  a b c d e f g h");
    out
}

fn piece_to_unicode(color: Color, piece: PieceKind) -> char {
    match (color, piece) {
        (Color::Light, PieceKind::Pawn) => '♙',
        (Color::Light, PieceKind::Knight) => '♘',
        (Color::Light, PieceKind::Bishop) => '♗',
        (Color::Light, PieceKind::Rook) => '♖',
        (Color::Light, PieceKind::Queen) => '♕',
        (Color::Light, PieceKind::King) => '♔',
        (Color::Dark, PieceKind::Pawn) => '♟',
        (Color::Dark, PieceKind::Knight) => '♞',
        (Color::Dark, PieceKind::Bishop) => '♝',
        (Color::Dark, PieceKind::Rook) => '♜',
        (Color::Dark, PieceKind::Queen) => '♛',
        (Color::Dark, PieceKind::King) => '♚',
    }
}

#[cfg(test)]
mod tests {
    use super::render_position;
    use crate::board::position::Position;

    #[test]
    fn renders_start_position_with_borders() {
        let rendered = render_position(&Position::new_game());
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[1], "8 ♜ ♞ ♝ ♛ ♚ ♝ ♞ ♜ 8");
        assert_eq!(lines[5], "4 · · · · · · · · 4");
        assert_eq!(lines[8], "1 ♖ ♘ ♗ ♕ ♔ ♗ ♘ ♖ 1");
    }
}
