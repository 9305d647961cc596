//! Arena game tree with variations.
//!
//! Nodes live in a `Vec` and are addressed by `NodeId`. Every node except the
//! root carries the move that leads to it; `children[0]` is the mainline
//! continuation and later children are variations in creation order. Nodes are
//! only ever appended, so handles stay valid for the lifetime of the tree.
//!
//! Positions are not stored. `position_at` replays the move path from the
//! starting position, re-validating each move against the rules engine.

use std::fmt;

use log::{debug, error};

use crate::board::position::Position;
use crate::errors::{StudyError, StudyResult};
use crate::moves::apply::apply_move;
use crate::moves::chess_move::ChessMove;
use crate::moves::generator::is_legal;
use crate::tree::variation_registry::VariationRegistry;

/// Opaque handle to a node of one `GameTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    #[inline]
    pub const fn from_index(index: usize) -> Self {
        NodeId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub mv: Option<ChessMove>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub ply: u32,
    on_mainline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameTree {
    start: Position,
    nodes: Vec<Node>,
    registry: VariationRegistry,
}

impl GameTree {
    pub fn new(start: Position) -> Self {
        Self {
            start,
            nodes: vec![Node {
                mv: None,
                parent: None,
                children: Vec::new(),
                ply: 0,
                on_mainline: true,
            }],
            registry: VariationRegistry::new(),
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    #[inline]
    pub fn starting_position(&self) -> &Position {
        &self.start
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn contains(&self, node: NodeId) -> bool {
        node.0 < self.nodes.len()
    }

    pub fn node(&self, node: NodeId) -> StudyResult<&Node> {
        self.nodes.get(node.0).ok_or(StudyError::UnknownNode(node))
    }

    pub fn children_of(&self, node: NodeId) -> StudyResult<&[NodeId]> {
        Ok(&self.node(node)?.children)
    }

    pub fn parent_of(&self, node: NodeId) -> StudyResult<Option<NodeId>> {
        Ok(self.node(node)?.parent)
    }

    pub fn move_of(&self, node: NodeId) -> StudyResult<Option<ChessMove>> {
        Ok(self.node(node)?.mv)
    }

    pub fn ply_of(&self, node: NodeId) -> StudyResult<u32> {
        Ok(self.node(node)?.ply)
    }

    /// True iff every step from the root to `node` took `children[0]`.
    pub fn is_on_mainline(&self, node: NodeId) -> StudyResult<bool> {
        Ok(self.node(node)?.on_mainline)
    }

    #[inline]
    pub fn registry(&self) -> &VariationRegistry {
        &self.registry
    }

    /// Display column of `node`: 0 on the mainline, else its branch id.
    pub fn id_of(&self, node: NodeId) -> StudyResult<u32> {
        if self.is_on_mainline(node)? {
            return Ok(0);
        }
        self.registry.get(node).ok_or_else(|| {
            error!("variation registry has no entry for off-mainline node {node}");
            StudyError::Lookup(node)
        })
    }

    /// Non-root mainline nodes in order.
    pub fn mainline(&self) -> Mainline<'_> {
        Mainline {
            tree: self,
            next: self.nodes[0].children.first().copied(),
        }
    }

    /// Last node of the mainline (the root for an empty game).
    pub fn mainline_end(&self) -> NodeId {
        self.mainline().last().unwrap_or(NodeId::ROOT)
    }

    /// The line of first children below `node`, as (node, move) pairs.
    pub fn continuation_of(&self, node: NodeId) -> StudyResult<Vec<(NodeId, ChessMove)>> {
        let mut line = Vec::new();
        let mut cursor = node;
        while let Some(&child) = self.children_of(cursor)?.first() {
            let mv = self.nodes[child.0].mv.ok_or(StudyError::UnknownNode(child))?;
            line.push((child, mv));
            cursor = child;
        }
        Ok(line)
    }

    /// Nodes from the root's first child down to `node`, inclusive.
    pub fn path_to(&self, node: NodeId) -> StudyResult<Vec<NodeId>> {
        let mut path = Vec::with_capacity(self.node(node)?.ply as usize);
        let mut cursor = node;
        while let Some(parent) = self.node(cursor)?.parent {
            path.push(cursor);
            cursor = parent;
        }
        path.reverse();
        Ok(path)
    }

    /// Replay the path to `node` from the starting position.
    pub fn position_at(&self, node: NodeId) -> StudyResult<Position> {
        let mut position = self.start.clone();
        for step in self.path_to(node)? {
            let Some(mv) = self.nodes[step.0].mv else {
                continue;
            };
            position = play(&position, step, mv)?;
        }
        Ok(position)
    }

    /// Append `mv` below `at`, returning the new (or already present) child.
    ///
    /// With `as_variation == false` the move becomes `at`'s mainline
    /// continuation; a different existing mainline move is a `Conflict`.
    /// With `as_variation == true` it is added as a trailing child. Either way
    /// an existing child carrying the same move is returned unchanged. On any
    /// error the tree and its registry are left untouched.
    pub fn append_move(&mut self, at: NodeId, mv: ChessMove, as_variation: bool) -> StudyResult<NodeId> {
        let position = self.position_at(at)?;
        if !is_legal(&position, mv) {
            return Err(StudyError::IllegalMove {
                at,
                mv,
                reason: format!("not legal in {}", position.to_fen()),
            });
        }

        let parent = &self.nodes[at.0];
        if let Some(existing) = parent.children.iter().copied().find(|c| self.nodes[c.0].mv == Some(mv)) {
            if as_variation || parent.children.first() == Some(&existing) {
                return Ok(existing);
            }
        }
        if !as_variation {
            if let Some(&first) = parent.children.first() {
                let existing = self.nodes[first.0].mv.ok_or(StudyError::UnknownNode(first))?;
                return Err(StudyError::Conflict {
                    at,
                    existing,
                    attempted: mv,
                });
            }
        }

        let starts_branch = !parent.children.is_empty();
        let inherited = if starts_branch || parent.on_mainline {
            None
        } else {
            Some(self.id_of(at)?)
        };

        let id = NodeId(self.nodes.len());
        let parent = &self.nodes[at.0];
        let node = Node {
            mv: Some(mv),
            parent: Some(at),
            children: Vec::new(),
            ply: parent.ply + 1,
            on_mainline: parent.on_mainline && !starts_branch,
        };
        self.nodes.push(node);
        self.nodes[at.0].children.push(id);

        if starts_branch {
            let branch = self.registry.register(id);
            debug!("appended {mv} at {at} as {id}, new variation {branch}");
        } else if let Some(branch) = inherited {
            self.registry.register_continuation(id, branch);
            debug!("appended {mv} at {at} as {id}, continuing variation {branch}");
        } else {
            debug!("appended {mv} at {at} as {id} on the mainline");
        }

        Ok(id)
    }

    /// Append a sequence of mainline moves starting at `at`.
    pub fn extend_mainline<I>(&mut self, at: NodeId, moves: I) -> StudyResult<NodeId>
    where
        I: IntoIterator<Item = ChessMove>,
    {
        moves
            .into_iter()
            .try_fold(at, |node, mv| self.append_move(node, mv, false))
    }

    /// All handles in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }
}

fn play(position: &Position, at: NodeId, mv: ChessMove) -> StudyResult<Position> {
    if !is_legal(position, mv) {
        return Err(StudyError::IllegalMove {
            at,
            mv,
            reason: format!("not legal in {}", position.to_fen()),
        });
    }
    apply_move(position, mv).map_err(|reason| StudyError::IllegalMove { at, mv, reason })
}

pub struct Mainline<'a> {
    tree: &'a GameTree,
    next: Option<NodeId>,
}

impl Iterator for Mainline<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.nodes[current.0].children.first().copied();
        Some(current)
    }
}
