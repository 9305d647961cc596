//! Square conversions between coordinates such as `e4` and square indices.

use crate::board::chess_types::Square;

/// Convert a coordinate (for example: "e4") to a square index.
#[inline]
pub fn algebraic_to_square(square: &str) -> Result<Square, String> {
    let bytes = square.as_bytes();
    if bytes.len() != 2 {
        return Err(format!("Invalid algebraic square: {square}"));
    }

    let file = file_from_char(bytes[0] as char)?;
    let rank = rank_from_char(bytes[1] as char)?;
    Ok(rank * 8 + file)
}

/// Convert a square index (`0..=63`) to a coordinate (for example: "e4").
#[inline]
pub fn square_to_algebraic(square: Square) -> Result<String, String> {
    if square > 63 {
        return Err(format!("Square index out of bounds: {square}"));
    }

    let file_char = char::from(b'a' + square % 8);
    let rank_char = char::from(b'1' + square / 8);
    Ok(format!("{file_char}{rank_char}"))
}

#[inline]
pub fn file_from_char(ch: char) -> Result<u8, String> {
    if !('a'..='h').contains(&ch) {
        return Err(format!("Invalid algebraic file: {ch}"));
    }
    Ok(ch as u8 - b'a')
}

#[inline]
pub fn rank_from_char(ch: char) -> Result<u8, String> {
    if !('1'..='8').contains(&ch) {
        return Err(format!("Invalid algebraic rank: {ch}"));
    }
    Ok(ch as u8 - b'1')
}
