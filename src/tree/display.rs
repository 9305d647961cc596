//! Read-only snapshot handed to the renderer.
//!
//! Every non-root node becomes a SAN label placed on the move sheet at
//! `(row, column, side)`: one row per full move, one column per branch id, and
//! a White or Black half of the cell. Labels that fall outside the sheet are
//! collected in `overflow` rather than placed.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::board::chess_types::Color;
use crate::board::position::Position;
use crate::errors::{StudyError, StudyResult};
use crate::moves::apply::apply_move;
use crate::moves::san::move_to_san;
use crate::tree::game_tree::{GameTree, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetBounds {
    pub rows: u32,
    pub columns: u32,
}

impl Default for SheetBounds {
    fn default() -> Self {
        Self {
            rows: 18,
            columns: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub row: u32,
    pub column: u32,
    pub side: Color,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLabel {
    pub node: NodeId,
    pub san: String,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySnapshot {
    pub position: Position,
    pub current: NodeId,
    pub labels: Vec<NodeLabel>,
    pub overflow: Vec<NodeLabel>,
    pub bounds: SheetBounds,
    /// Full-move number of row 0.
    pub first_move_number: u32,
}

impl DisplaySnapshot {
    /// Build a snapshot of `tree` with the cursor on `current`.
    pub fn capture(tree: &GameTree, current: NodeId, bounds: SheetBounds) -> StudyResult<Self> {
        let start = tree.starting_position();
        let ply_offset = match start.side_to_move {
            Color::Light => 0,
            Color::Dark => 1,
        };

        let mut labels = Vec::new();
        let mut overflow = Vec::new();
        let mut stack: Vec<(NodeId, Position)> = vec![(tree.root(), start.clone())];

        // Depth-first so each node's position is derived once from its parent.
        while let Some((node, position)) = stack.pop() {
            for &child in tree.children_of(node)?.iter().rev() {
                let Some(mv) = tree.move_of(child)? else {
                    continue;
                };
                let san = move_to_san(&position, mv).map_err(|reason| StudyError::IllegalMove {
                    at: node,
                    mv,
                    reason,
                })?;
                let ply = tree.ply_of(child)?;
                let label = NodeLabel {
                    node: child,
                    san,
                    placement: Placement {
                        row: (ply_offset + ply - 1) / 2,
                        column: tree.id_of(child)?,
                        side: position.side_to_move,
                    },
                };
                if label.placement.row < bounds.rows && label.placement.column < bounds.columns {
                    labels.push(label);
                } else {
                    overflow.push(label);
                }

                let next = apply_move(&position, mv).map_err(|reason| {
                    StudyError::IllegalMove {
                        at: node,
                        mv,
                        reason,
                    }
                })?;
                stack.push((child, next));
            }
        }

        labels.sort_by_key(|label| label.node);
        overflow.sort_by_key(|label| label.node);

        Ok(Self {
            position: tree.position_at(current)?,
            current,
            labels,
            overflow,
            bounds,
            first_move_number: u32::from(start.fullmove_number),
        })
    }

    pub fn label_of(&self, node: NodeId) -> Option<&NodeLabel> {
        self.labels
            .iter()
            .chain(self.overflow.iter())
            .find(|label| label.node == node)
    }

    /// Render the placed labels as a fixed-width text grid.
    ///
    /// Each column holds one branch; a cell shows the White and Black halves of
    /// one full move. The current node is marked with `*`.
    pub fn render_sheet(&self) -> String {
        const CELL: usize = 9;
        let rows = self
            .labels
            .iter()
            .map(|label| label.placement.row + 1)
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        for row in 0..rows {
            let _ = write!(out, "{:>3}. ", self.first_move_number + row);
            for column in 0..self.bounds.columns {
                for side in [Color::Light, Color::Dark] {
                    let text = self
                        .labels
                        .iter()
                        .find(|label| {
                            label.placement.row == row
                                && label.placement.column == column
                                && label.placement.side == side
                        })
                        .map(|label| {
                            if label.node == self.current {
                                format!("*{}", label.san)
                            } else {
                                label.san.clone()
                            }
                        })
                        .unwrap_or_default();
                    let _ = write!(out, "{text:<CELL$}");
                }
                out.push_str("| ");
            }
            out.push('\n');
        }
        if !self.overflow.is_empty() {
            let _ = writeln!(out, "({} moves off the sheet)", self.overflow.len());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{DisplaySnapshot, SheetBounds};
    use crate::board::chess_types::Color;
    use crate::board::position::Position;
    use crate::moves::chess_move::ChessMove;
    use crate::tree::game_tree::GameTree;

    fn uci(text: &str) -> ChessMove {
        ChessMove::from_uci(text).expect("UCI move should parse")
    }

    #[test]
    fn places_mainline_and_variation_labels() {
        let mut tree = GameTree::new(Position::new_game());
        let end = tree
            .extend_mainline(tree.root(), ["e2e4", "e7e5", "g1f3"].into_iter().map(uci))
            .expect("mainline");
        let e5 = tree.parent_of(end).expect("parent").expect("non-root");
        let variation = tree.append_move(e5, uci("f1c4"), true).expect("variation");

        let snapshot = DisplaySnapshot::capture(&tree, variation, SheetBounds::default()).expect("snapshot");
        assert_eq!(snapshot.current, variation);
        assert_eq!(snapshot.position, tree.position_at(variation).expect("replay"));
        assert!(snapshot.overflow.is_empty());

        let nf3 = snapshot.label_of(end).expect("label");
        assert_eq!(nf3.san, "Nf3");
        assert_eq!((nf3.placement.row, nf3.placement.column, nf3.placement.side), (1, 0, Color::Light));

        let e5_label = snapshot.label_of(e5).expect("label");
        assert_eq!((e5_label.placement.row, e5_label.placement.side), (0, Color::Dark));

        let bc4 = snapshot.label_of(variation).expect("label");
        assert_eq!(bc4.san, "Bc4");
        assert_eq!((bc4.placement.row, bc4.placement.column), (1, 1));

        let sheet = snapshot.render_sheet();
        assert!(sheet.contains("*Bc4"));
        assert!(sheet.starts_with("  1. e4"));
    }

    #[test]
    fn black_to_move_start_shifts_rows() {
        let start = Position::from_fen("4k3/8/8/8/8/8/4P3/4K3 b - - 0 12").expect("FEN should parse");
        let mut tree = GameTree::new(start);
        let first = tree.append_move(tree.root(), uci("e8d8"), false).expect("append");
        let second = tree.append_move(first, uci("e2e4"), false).expect("append");

        let snapshot = DisplaySnapshot::capture(&tree, second, SheetBounds::default()).expect("snapshot");
        let first_label = snapshot.label_of(first).expect("label");
        assert_eq!((first_label.placement.row, first_label.placement.side), (0, Color::Dark));
        let second_label = snapshot.label_of(second).expect("label");
        assert_eq!((second_label.placement.row, second_label.placement.side), (1, Color::Light));
        assert_eq!(snapshot.first_move_number, 12);
    }

    #[test]
    fn out_of_bounds_labels_overflow_instead_of_failing() {
        let mut tree = GameTree::new(Position::new_game());
        let e4 = tree.append_move(tree.root(), uci("e2e4"), false).expect("append");
        for reply in ["e7e5", "c7c5", "e7e6", "c7c6", "d7d5"] {
            tree.append_move(e4, uci(reply), true).expect("append");
        }

        let bounds = SheetBounds { rows: 18, columns: 4 };
        let snapshot = DisplaySnapshot::capture(&tree, e4, bounds).expect("snapshot");
        assert_eq!(snapshot.labels.len(), 5);
        assert_eq!(snapshot.overflow.len(), 1);
        assert_eq!(snapshot.overflow[0].placement.column, 4);
        assert_eq!(snapshot.overflow[0].san, "d5");
        assert!(snapshot.render_sheet().contains("1 moves off the sheet"));
    }
}
