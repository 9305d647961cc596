//! PGN read/write for games with variations.
//!
//! Reading builds a `GameTree` from SAN movetext, following nested `( ... )`
//! variations, and keeps `{...}` comments and `$n` NAGs keyed by node.
//! Writing exports the whole tree with variations inline, the same shape the
//! reader accepts.

use std::collections::{BTreeMap, HashMap};

use chrono::Local;
use log::debug;

use crate::board::chess_types::{Color, STARTING_POSITION_FEN};
use crate::board::position::Position;
use crate::errors::{StudyError, StudyResult};
use crate::moves::apply::apply_move;
use crate::moves::san::{move_to_san, san_to_move};
use crate::tree::game_tree::{GameTree, NodeId};

const LINE_WIDTH: usize = 80;

#[derive(Debug, Clone)]
pub struct GameRecord {
    pub headers: BTreeMap<String, String>,
    pub tree: GameTree,
    pub comments: HashMap<NodeId, String>,
    pub nags: HashMap<NodeId, Vec<u16>>,
    pub result: String,
}

impl GameRecord {
    pub fn new(start: Position) -> Self {
        let mut headers = BTreeMap::new();
        let fen = start.to_fen();
        if fen != STARTING_POSITION_FEN {
            headers.insert("SetUp".to_owned(), "1".to_owned());
            headers.insert("FEN".to_owned(), fen);
        }
        Self {
            headers,
            tree: GameTree::new(start),
            comments: HashMap::new(),
            nags: HashMap::new(),
            result: "*".to_owned(),
        }
    }

    /// Position at the end of the mainline.
    pub fn final_position(&self) -> StudyResult<Position> {
        self.tree.position_at(self.tree.mainline_end())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Comment(String),
    Nag(u16),
    Open,
    Close,
}

pub fn read_pgn(pgn: &str) -> StudyResult<GameRecord> {
    let mut headers = BTreeMap::<String, String>::new();
    let mut movetext_lines = Vec::<&str>::new();

    for line in pgn.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }
        if trimmed.starts_with('[') && movetext_lines.is_empty() {
            let (k, v) = parse_header_line(trimmed).map_err(StudyError::Record)?;
            headers.insert(k, v);
        } else {
            movetext_lines.push(trimmed);
        }
    }

    let start = if headers.get("SetUp").map(|x| x.as_str()) == Some("1") || headers.contains_key("FEN") {
        let fen = headers
            .get("FEN")
            .ok_or_else(|| StudyError::Record("PGN SetUp=1 is present but FEN header is missing".to_owned()))?;
        Position::from_fen(fen).map_err(StudyError::Record)?
    } else {
        Position::new_game()
    };

    let mut record = GameRecord {
        headers,
        tree: GameTree::new(start.clone()),
        comments: HashMap::new(),
        nags: HashMap::new(),
        result: "*".to_owned(),
    };

    let tokens = tokenize(&movetext_lines.join("\n"))?;
    let mut current = record.tree.root();
    let mut position = start;
    let mut saved: Vec<(NodeId, Position)> = Vec::new();

    for token in tokens {
        match token {
            Token::Comment(text) => {
                let entry = record.comments.entry(current).or_default();
                if !entry.is_empty() {
                    entry.push(' ');
                }
                entry.push_str(&text);
            }
            Token::Nag(nag) => record.nags.entry(current).or_default().push(nag),
            Token::Open => {
                let parent = record
                    .tree
                    .parent_of(current)?
                    .ok_or_else(|| StudyError::Record("variation opened before any move".to_owned()))?;
                saved.push((current, position));
                position = record.tree.position_at(parent)?;
                current = parent;
            }
            Token::Close => {
                (current, position) = saved
                    .pop()
                    .ok_or_else(|| StudyError::Record("unbalanced ')' in movetext".to_owned()))?;
            }
            Token::Word(word) => {
                if is_result_token(&word) {
                    if saved.is_empty() {
                        record.result = word;
                        break;
                    }
                    continue;
                }
                let Some(san) = strip_move_number(&word) else {
                    continue;
                };

                let mv = san_to_move(&position, san)
                    .map_err(|err| StudyError::Record(format!("{san}: {err}")))?;
                let as_variation = !record.tree.children_of(current)?.is_empty();
                let node = record.tree.append_move(current, mv, as_variation)?;
                position = apply_move(&position, mv).map_err(StudyError::Record)?;
                current = node;
            }
        }
    }

    if !saved.is_empty() {
        return Err(StudyError::Record("unterminated variation in movetext".to_owned()));
    }
    if let Some(header_result) = record.headers.get("Result") {
        record.result = normalize_result(header_result).to_owned();
    }

    debug!(
        "loaded PGN with {} nodes, {} variations",
        record.tree.node_count(),
        record.tree.registry().branch_count()
    );
    Ok(record)
}

/// Export the record, variations included. Fills `Date` from the local clock
/// when the record has none.
pub fn write_pgn(record: &GameRecord) -> StudyResult<String> {
    let mut headers = record.headers.clone();
    headers
        .entry("Date".to_owned())
        .or_insert_with(|| Local::now().format("%Y.%m.%d").to_string());
    headers.insert("Result".to_owned(), normalize_result(&record.result).to_owned());

    let mut out = String::new();
    for (key, value) in &headers {
        out.push_str(&format!("[{} \"{}\"]\n", key, escape_pgn_value(value)));
    }
    out.push('\n');

    let tree = &record.tree;
    let mut writer = MovetextWriter {
        record,
        parts: Vec::new(),
    };
    if let Some(comment) = record.comments.get(&tree.root()) {
        writer.parts.push(format!("{{{comment}}}"));
    }
    writer.write_line(tree.root(), tree.starting_position(), true)?;
    writer.parts.push(normalize_result(&record.result).to_owned());

    out.push_str(&wrap(&writer.parts));
    out.push('\n');
    Ok(out)
}

struct MovetextWriter<'a> {
    record: &'a GameRecord,
    parts: Vec<String>,
}

impl MovetextWriter<'_> {
    /// Write `node`'s mainline continuation, then each sibling variation in
    /// parentheses, then recurse down the mainline.
    fn write_line(&mut self, node: NodeId, position: &Position, mut force_number: bool) -> StudyResult<()> {
        let record = self.record;
        let tree = &record.tree;
        let mut node = node;
        let mut position = position.clone();

        loop {
            let children = tree.children_of(node)?;
            let Some(&main) = children.first() else {
                return Ok(());
            };

            let after_main = self.write_move(main, &position, force_number)?;
            for &variation in &children[1..] {
                self.parts.push("(".to_owned());
                let after_variation = self.write_move(variation, &position, true)?;
                let had_comment = record.comments.contains_key(&variation);
                self.write_line(variation, &after_variation, had_comment)?;
                self.parts.push(")".to_owned());
            }

            force_number = children.len() > 1 || record.comments.contains_key(&main);
            node = main;
            position = after_main;
        }
    }

    fn write_move(&mut self, node: NodeId, position: &Position, force_number: bool) -> StudyResult<Position> {
        let record = self.record;
        let tree = &record.tree;
        let mv = tree.move_of(node)?.ok_or(StudyError::UnknownNode(node))?;
        let san = move_to_san(position, mv).map_err(|reason| StudyError::IllegalMove { at: node, mv, reason })?;

        let number = position.fullmove_number;
        let token = match position.side_to_move {
            Color::Light => format!("{number}. {san}"),
            Color::Dark if force_number => format!("{number}... {san}"),
            Color::Dark => san,
        };
        self.parts.push(token);

        if let Some(nags) = record.nags.get(&node) {
            self.parts.extend(nags.iter().map(|nag| format!("${nag}")));
        }
        if let Some(comment) = record.comments.get(&node) {
            self.parts.push(format!("{{{comment}}}"));
        }

        apply_move(position, mv).map_err(|reason| StudyError::IllegalMove { at: node, mv, reason })
    }
}

fn tokenize(text: &str) -> StudyResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut chars = text.chars().peekable();

    fn flush(word: &mut String, tokens: &mut Vec<Token>) {
        if !word.is_empty() {
            tokens.push(Token::Word(std::mem::take(word)));
        }
    }

    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                flush(&mut word, &mut tokens);
                let mut comment = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => comment.push(c),
                        None => return Err(StudyError::Record("unterminated comment".to_owned())),
                    }
                }
                tokens.push(Token::Comment(comment.split_whitespace().collect::<Vec<_>>().join(" ")));
            }
            ';' => {
                flush(&mut word, &mut tokens);
                let comment: String = chars.by_ref().take_while(|c| *c != '\n').collect();
                tokens.push(Token::Comment(comment.trim().to_owned()));
            }
            '$' => {
                flush(&mut word, &mut tokens);
                let mut digits = String::new();
                while let Some(d) = chars.next_if(|c| c.is_ascii_digit()) {
                    digits.push(d);
                }
                let nag = digits
                    .parse::<u16>()
                    .map_err(|_| StudyError::Record(format!("invalid NAG ${digits}")))?;
                tokens.push(Token::Nag(nag));
            }
            '(' => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Open);
            }
            ')' => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Close);
            }
            c if c.is_whitespace() => flush(&mut word, &mut tokens),
            c => word.push(c),
        }
    }
    flush(&mut word, &mut tokens);

    Ok(tokens)
}

/// Strip a leading move number (`12.`, `12...`, `12.e4`); `None` if nothing remains.
fn strip_move_number(token: &str) -> Option<&str> {
    let rest = token.trim_start_matches(|c: char| c.is_ascii_digit());
    let rest = if rest.len() < token.len() && rest.starts_with('.') {
        rest.trim_start_matches('.')
    } else {
        token
    };
    (!rest.is_empty()).then_some(rest)
}

fn parse_header_line(line: &str) -> Result<(String, String), String> {
    if !line.starts_with('[') || !line.ends_with(']') {
        return Err(format!("Invalid PGN header line: {line}"));
    }
    let inner = &line[1..line.len() - 1];
    let mut parts = inner.splitn(2, ' ');
    let key = parts
        .next()
        .ok_or_else(|| format!("Invalid PGN header key: {line}"))?
        .trim();
    let value_raw = parts
        .next()
        .ok_or_else(|| format!("Invalid PGN header value: {line}"))?
        .trim();

    if !value_raw.starts_with('"') || !value_raw.ends_with('"') || value_raw.len() < 2 {
        return Err(format!("Invalid quoted PGN header value: {line}"));
    }
    let value = value_raw[1..value_raw.len() - 1].replace("\\\"", "\"");
    Ok((key.to_owned(), value))
}

fn wrap(parts: &[String]) -> String {
    let mut out = String::new();
    let mut line_len = 0usize;
    for part in parts {
        let glue = if line_len == 0 || part == ")" || out.ends_with('(') { "" } else { " " };
        if !glue.is_empty() && line_len + glue.len() + part.len() > LINE_WIDTH {
            out.push('\n');
            line_len = 0;
        } else {
            out.push_str(glue);
            line_len += glue.len();
        }
        out.push_str(part);
        line_len += part.len();
    }
    out
}

fn is_result_token(token: &str) -> bool {
    matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*")
}

fn normalize_result(result: &str) -> &str {
    if is_result_token(result) {
        result
    } else {
        "*"
    }
}

fn escape_pgn_value(value: &str) -> String {
    value.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::{read_pgn, strip_move_number, write_pgn, GameRecord};
    use crate::board::position::Position;
    use crate::errors::StudyError;
    use crate::moves::chess_move::ChessMove;

    const RUY_LOPEZ: &str = r#"[Event "Casual"]
[White "A"]
[Black "B"]
[Result "1-0"]

1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 4. Ba4 Nf6 5. O-O Be7 1-0
"#;

    const WITH_VARIATIONS: &str = r#"[Event "Study"]
[Date "2024.01.02"]

1. e4 {King's pawn} e5 (1... c5 2. Nf3 (2. Nc3 Nc6) 2... d6) (1... e6 $2) 2. Nf3 $1 Nc6 *
"#;

    fn uci(text: &str) -> ChessMove {
        ChessMove::from_uci(text).expect("UCI move should parse")
    }

    #[test]
    fn reads_mainline_game() {
        let record = read_pgn(RUY_LOPEZ).expect("PGN should parse");
        assert_eq!(record.tree.mainline().count(), 10);
        assert_eq!(record.result, "1-0");
        assert_eq!(record.headers.get("White").map(String::as_str), Some("A"));
        assert_eq!(record.tree.registry().branch_count(), 0);
        assert_eq!(
            record.final_position().expect("replay").to_fen(),
            "r1bqk2r/1pppbppp/p1n2n2/4p3/B3P3/5N2/PPPP1PPP/RNBQ1RK1 w kq - 4 6"
        );
    }

    #[test]
    fn reads_nested_variations_in_order() {
        let record = read_pgn(WITH_VARIATIONS).expect("PGN should parse");
        let tree = &record.tree;
        let e4 = tree.children_of(tree.root()).expect("children")[0];
        let replies = tree.children_of(e4).expect("children");
        assert_eq!(replies.len(), 3);
        assert_eq!(tree.move_of(replies[0]).expect("move"), Some(uci("e7e5")));
        assert_eq!(tree.move_of(replies[1]).expect("move"), Some(uci("c7c5")));
        assert_eq!(tree.move_of(replies[2]).expect("move"), Some(uci("e7e6")));

        // 1...c5 is registered first, its nested 2.Nc3 second, 1...e6 third.
        assert_eq!(tree.id_of(replies[1]).expect("id"), 1);
        let nf3 = tree.children_of(replies[1]).expect("children")[0];
        let nc3 = tree.children_of(replies[1]).expect("children")[1];
        assert_eq!(tree.id_of(nf3).expect("id"), 1);
        assert_eq!(tree.id_of(nc3).expect("id"), 2);
        assert_eq!(tree.id_of(replies[2]).expect("id"), 3);

        assert_eq!(record.comments.get(&e4).map(String::as_str), Some("King's pawn"));
        assert_eq!(record.nags.get(&replies[2]), Some(&vec![2]));
        assert_eq!(record.result, "*");
        assert_eq!(tree.mainline().count(), 4);
    }

    #[test]
    fn export_round_trips_tree_shape() {
        let record = read_pgn(WITH_VARIATIONS).expect("PGN should parse");
        let text = write_pgn(&record).expect("PGN should write");
        assert!(text.contains("[Date \"2024.01.02\"]"));
        let movetext = text.lines().filter(|line| !line.starts_with('[')).collect::<Vec<_>>().join(" ");
        assert!(movetext.contains("1. e4 {King's pawn} 1... e5 (1... c5 2. Nf3 (2. Nc3 Nc6) 2... d6) (1... e6 $2) 2. Nf3 $1 Nc6 *"));

        let reparsed = read_pgn(&text).expect("exported PGN should parse");
        assert_eq!(reparsed.tree, record.tree);
        assert_eq!(reparsed.comments, record.comments);
        assert_eq!(reparsed.nags, record.nags);
    }

    #[test]
    fn export_fills_missing_date() {
        let record = GameRecord::new(Position::new_game());
        let text = write_pgn(&record).expect("PGN should write");
        let date_line = text.lines().find(|line| line.starts_with("[Date ")).expect("date header");
        assert_eq!(date_line.len(), "[Date \"2024.01.02\"]".len());
        assert!(text.trim_end().ends_with('*'));
    }

    #[test]
    fn custom_setup_and_black_to_move() {
        let pgn = "[SetUp \"1\"]\n[FEN \"4k3/8/8/8/8/8/4P3/4K3 b - - 0 30\"]\n\n30... Kd8 31. e4 *\n";
        let record = read_pgn(pgn).expect("PGN should parse");
        assert_eq!(record.tree.mainline().count(), 2);
        let text = write_pgn(&record).expect("PGN should write");
        assert!(text.contains("30... Kd8 31. e4 *"));
    }

    #[test]
    fn rejects_bad_movetext() {
        assert!(matches!(read_pgn("1. e5 *"), Err(StudyError::Record(_))));
        assert!(matches!(read_pgn("1. e4 (e5 *"), Err(StudyError::Record(_))));
        assert!(matches!(read_pgn("1. e4 {open"), Err(StudyError::Record(_))));
        assert!(matches!(read_pgn("(1. e4) *"), Err(StudyError::Record(_))));
    }

    #[test]
    fn strips_move_numbers() {
        assert_eq!(strip_move_number("12."), None);
        assert_eq!(strip_move_number("12..."), None);
        assert_eq!(strip_move_number("3.e4"), Some("e4"));
        assert_eq!(strip_move_number("Nf3"), Some("Nf3"));
    }
}
