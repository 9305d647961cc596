//! Cursor over a `GameTree`.
//!
//! Navigation never mutates the tree. Walking off an edge is not an error: the
//! cursor stays put and the caller gets a `Notice` to show the user.

use std::fmt;

use crate::errors::{StudyError, StudyResult};
use crate::tree::game_tree::{GameTree, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    EndOfLine,
    StartOfLine,
    NoSiblings,
    FirstVariation,
    LastVariation,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Notice::EndOfLine => "end of line",
            Notice::StartOfLine => "start of game",
            Notice::NoSiblings => "no other variations here",
            Notice::FirstVariation => "already at the first variation",
            Notice::LastVariation => "already at the last variation",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    Moved(NodeId),
    Stayed(Notice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigator {
    current: NodeId,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator {
    pub fn new() -> Self {
        Self {
            current: NodeId::ROOT,
        }
    }

    #[inline]
    pub fn current(&self) -> NodeId {
        self.current
    }

    pub fn jump_to(&mut self, tree: &GameTree, node: NodeId) -> StudyResult<()> {
        if !tree.contains(node) {
            return Err(StudyError::UnknownNode(node));
        }
        self.current = node;
        Ok(())
    }

    pub fn step_forward(&mut self, tree: &GameTree) -> StudyResult<NavOutcome> {
        match tree.children_of(self.current)?.first() {
            Some(&next) => Ok(self.moved(next)),
            None => Ok(NavOutcome::Stayed(Notice::EndOfLine)),
        }
    }

    pub fn step_backward(&mut self, tree: &GameTree) -> StudyResult<NavOutcome> {
        match tree.parent_of(self.current)? {
            Some(parent) => Ok(self.moved(parent)),
            None => Ok(NavOutcome::Stayed(Notice::StartOfLine)),
        }
    }

    pub fn sibling_next(&mut self, tree: &GameTree) -> StudyResult<NavOutcome> {
        self.sibling_step(tree, 1)
    }

    pub fn sibling_previous(&mut self, tree: &GameTree) -> StudyResult<NavOutcome> {
        self.sibling_step(tree, -1)
    }

    fn sibling_step(&mut self, tree: &GameTree, delta: isize) -> StudyResult<NavOutcome> {
        let Some(parent) = tree.parent_of(self.current)? else {
            return Ok(NavOutcome::Stayed(Notice::NoSiblings));
        };
        let siblings = tree.children_of(parent)?;
        if siblings.len() < 2 {
            return Ok(NavOutcome::Stayed(Notice::NoSiblings));
        }

        let index = siblings
            .iter()
            .position(|sibling| *sibling == self.current)
            .ok_or(StudyError::UnknownNode(self.current))?;
        match index.checked_add_signed(delta).and_then(|i| siblings.get(i)) {
            Some(&target) => Ok(self.moved(target)),
            None if delta < 0 => Ok(NavOutcome::Stayed(Notice::FirstVariation)),
            None => Ok(NavOutcome::Stayed(Notice::LastVariation)),
        }
    }

    fn moved(&mut self, target: NodeId) -> NavOutcome {
        self.current = target;
        NavOutcome::Moved(target)
    }
}

#[cfg(test)]
mod tests {
    use super::{NavOutcome, Navigator, Notice};
    use crate::board::position::Position;
    use crate::moves::chess_move::ChessMove;
    use crate::tree::game_tree::{GameTree, NodeId};

    fn uci(text: &str) -> ChessMove {
        ChessMove::from_uci(text).expect("UCI move should parse")
    }

    fn ten_ply_tree() -> GameTree {
        let mut tree = GameTree::new(Position::new_game());
        let moves = [
            "e2e4", "e7e5", "g1f3", "b8c6", "f1b5", "a7a6", "b5a4", "g8f6", "e1g1", "f8e7",
        ];
        tree.extend_mainline(tree.root(), moves.into_iter().map(uci))
            .expect("mainline should load");
        tree
    }

    #[test]
    fn advances_to_the_end_of_the_mainline() {
        let tree = ten_ply_tree();
        let mut nav = Navigator::new();
        for _ in 0..10 {
            assert!(matches!(nav.step_forward(&tree).expect("step"), NavOutcome::Moved(_)));
        }
        assert_eq!(tree.ply_of(nav.current()).expect("ply"), 10);
        assert_eq!(nav.current(), tree.mainline_end());

        let before = tree.clone();
        assert_eq!(
            nav.step_forward(&tree).expect("step"),
            NavOutcome::Stayed(Notice::EndOfLine)
        );
        assert_eq!(tree.ply_of(nav.current()).expect("ply"), 10);
        assert_eq!(tree, before);
    }

    #[test]
    fn retreat_stops_at_root() {
        let tree = ten_ply_tree();
        let mut nav = Navigator::new();
        nav.step_forward(&tree).expect("step");
        assert_eq!(nav.step_backward(&tree).expect("step"), NavOutcome::Moved(NodeId::ROOT));
        assert_eq!(
            nav.step_backward(&tree).expect("step"),
            NavOutcome::Stayed(Notice::StartOfLine)
        );
    }

    #[test]
    fn siblings_are_walked_in_creation_order() {
        let mut tree = ten_ply_tree();
        let n = tree.mainline().nth(1).expect("second ply");
        let mainline_child = tree.children_of(n).expect("children")[0];
        let variation = tree.append_move(n, uci("b1c3"), true).expect("variation");
        assert_eq!(tree.id_of(variation).expect("id"), 1);
        assert_eq!(tree.id_of(mainline_child).expect("id"), 0);

        let mut nav = Navigator::new();
        nav.jump_to(&tree, mainline_child).expect("jump");
        assert_eq!(
            nav.sibling_previous(&tree).expect("step"),
            NavOutcome::Stayed(Notice::FirstVariation)
        );
        assert_eq!(nav.sibling_next(&tree).expect("step"), NavOutcome::Moved(variation));
        assert_eq!(
            nav.sibling_next(&tree).expect("step"),
            NavOutcome::Stayed(Notice::LastVariation)
        );
        assert_eq!(nav.sibling_previous(&tree).expect("step"), NavOutcome::Moved(mainline_child));
    }

    #[test]
    fn sibling_moves_without_siblings_report_notice() {
        let tree = ten_ply_tree();
        let mut nav = Navigator::new();
        assert_eq!(
            nav.sibling_next(&tree).expect("step"),
            NavOutcome::Stayed(Notice::NoSiblings)
        );
        nav.step_forward(&tree).expect("step");
        assert_eq!(
            nav.sibling_previous(&tree).expect("step"),
            NavOutcome::Stayed(Notice::NoSiblings)
        );
        assert!(nav.jump_to(&tree, NodeId::from_index(500)).is_err());
    }
}
