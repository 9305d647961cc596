//! Engine-driven extension of the game tree.
//!
//! A run starts at the cursor. It first walks the recorded mainline for as
//! long as the engine agrees with it; where the engine disagrees, its move is
//! added as a new variation, and at the end of the line it is added as the
//! mainline continuation. After that the run plays `depth * 2 - 1` further
//! plies. Each of those follows the same rule: an existing continuation the
//! engine agrees with is walked, a disagreement branches off as a variation,
//! and an empty line is extended. Cancellation is checked before every query.
//!
//! The driver never touches the tree directly. It works from an
//! [`AutoplayPlan`] captured by the tree's owner and sends every append
//! through an [`AutoplaySink`], so it can run on a worker thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use crate::board::position::Position;
use crate::engine::engine_trait::{EngineFactory, PositionEngine};
use crate::errors::{StudyError, StudyResult};
use crate::moves::apply::apply_move;
use crate::moves::chess_move::ChessMove;
use crate::moves::generator::legal_moves;
use crate::session::commands::{ControlMessage, WorkerMessage};
use crate::tree::game_tree::{GameTree, NodeId};

/// What the worker needs to know about the tree before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoplayPlan {
    pub start: NodeId,
    pub start_position: Position,
    /// Recorded mainline continuation below `start`, as (node, move) pairs.
    pub mainline: Vec<(NodeId, ChessMove)>,
}

impl AutoplayPlan {
    pub fn capture(tree: &GameTree, start: NodeId) -> StudyResult<Self> {
        Ok(Self {
            start,
            start_position: tree.position_at(start)?,
            mainline: tree.continuation_of(start)?,
        })
    }
}

/// Result of one append as seen by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    pub node: NodeId,
    /// False when the move was already in the tree and its node was reused.
    pub created: bool,
    /// First-child line already recorded below `node`.
    pub continuation: Vec<(NodeId, ChessMove)>,
}

impl Appended {
    /// Apply an append to `tree` and describe what happened.
    pub fn apply(tree: &mut GameTree, at: NodeId, mv: ChessMove, as_variation: bool) -> StudyResult<Self> {
        let before = tree.node_count();
        let node = tree.append_move(at, mv, as_variation)?;
        Ok(Self {
            node,
            created: tree.node_count() > before,
            continuation: tree.continuation_of(node)?,
        })
    }
}

/// Receiver of the run's mutations.
pub trait AutoplaySink {
    /// Append `mv` below `at` and publish the new state.
    fn append(&mut self, at: NodeId, mv: ChessMove, as_variation: bool) -> StudyResult<Appended>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoplayReport {
    pub queries: u32,
    /// Nodes created by the run; reused nodes are not counted.
    pub appended: u32,
    /// Last node the run moved to after leaving the recorded mainline, or the
    /// start if it never left it.
    pub last_node: NodeId,
    pub cancelled: bool,
    /// The run stopped because the side to move had no legal move.
    pub game_over: bool,
}

impl AutoplayReport {
    pub fn empty(start: NodeId) -> Self {
        Self {
            queries: 0,
            appended: 0,
            last_node: start,
            cancelled: false,
            game_over: false,
        }
    }
}

/// A run that stopped on an error; `report` holds the progress made before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoplayAbort {
    pub error: StudyError,
    pub report: AutoplayReport,
}

struct Run<'a> {
    engine: &'a mut dyn PositionEngine,
    sink: &'a mut dyn AutoplaySink,
    cancel: &'a AtomicBool,
    report: AutoplayReport,
    node: NodeId,
    position: Position,
    /// Recorded continuation below `node`.
    line: std::vec::IntoIter<(NodeId, ChessMove)>,
}

enum Query {
    Move(ChessMove),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Walked,
    Appended,
}

impl Run<'_> {
    fn query(&mut self) -> StudyResult<Query> {
        if self.cancel.load(Ordering::Relaxed) {
            self.report.cancelled = true;
            return Ok(Query::Stop);
        }
        if legal_moves(&self.position).is_empty() {
            self.report.game_over = true;
            return Ok(Query::Stop);
        }
        self.report.queries += 1;
        let mv = self.engine.best_move(&self.position)?;
        debug!("engine suggests {mv} at {}", self.node);
        Ok(Query::Move(mv))
    }

    fn advance(&mut self, node: NodeId, mv: ChessMove) -> StudyResult<()> {
        self.position = apply_move(&self.position, mv).map_err(|reason| StudyError::IllegalMove {
            at: self.node,
            mv,
            reason,
        })?;
        self.node = node;
        Ok(())
    }

    /// Walk the recorded move if it matches `mv`, otherwise add `mv`: as a
    /// variation when a different move is recorded, as the continuation
    /// when nothing is.
    fn step(&mut self, mv: ChessMove) -> StudyResult<Step> {
        let recorded = self.line.next();
        if let Some((child, expected)) = recorded {
            if expected == mv {
                self.advance(child, mv)?;
                return Ok(Step::Walked);
            }
        }

        let appended = self.sink.append(self.node, mv, recorded.is_some())?;
        self.advance(appended.node, mv)?;
        if appended.created {
            self.report.appended += 1;
        } else {
            debug!("{mv} already recorded as {}", appended.node);
        }
        self.line = appended.continuation.into_iter();
        Ok(Step::Appended)
    }

    fn play(&mut self, depth: u32) -> StudyResult<()> {
        loop {
            let Query::Move(mv) = self.query()? else {
                return Ok(());
            };
            if self.step(mv)? == Step::Appended {
                break;
            }
        }
        self.report.last_node = self.node;

        for _ in 0..depth.saturating_mul(2).saturating_sub(1) {
            let Query::Move(mv) = self.query()? else {
                return Ok(());
            };
            self.step(mv)?;
            self.report.last_node = self.node;
        }
        Ok(())
    }
}

pub fn run_autoplay(
    plan: &AutoplayPlan,
    depth: u32,
    engine: &mut dyn PositionEngine,
    sink: &mut dyn AutoplaySink,
    cancel: &AtomicBool,
) -> Result<AutoplayReport, AutoplayAbort> {
    info!("auto-play from {} with depth {depth} using '{}'", plan.start, engine.name());
    let mut run = Run {
        engine,
        sink,
        cancel,
        report: AutoplayReport::empty(plan.start),
        node: plan.start,
        position: plan.start_position.clone(),
        line: plan.mainline.clone().into_iter(),
    };

    match run.play(depth) {
        Ok(()) => {
            info!(
                "auto-play done: {} queries, {} new moves{}",
                run.report.queries,
                run.report.appended,
                if run.report.cancelled { " (cancelled)" } else { "" }
            );
            Ok(run.report)
        }
        Err(error) => {
            warn!("auto-play aborted after {} new moves: {error}", run.report.appended);
            Err(AutoplayAbort {
                error,
                report: run.report,
            })
        }
    }
}

/// Sink used by the worker thread: each append is a round trip to the
/// control thread, which owns the tree.
pub struct ChannelSink {
    tx: Sender<ControlMessage>,
}

impl ChannelSink {
    pub fn new(tx: Sender<ControlMessage>) -> Self {
        Self { tx }
    }
}

impl AutoplaySink for ChannelSink {
    fn append(&mut self, at: NodeId, mv: ChessMove, as_variation: bool) -> StudyResult<Appended> {
        let (reply, reply_rx) = mpsc::channel();
        self.tx
            .send(ControlMessage::Worker(WorkerMessage::Append {
                at,
                mv,
                as_variation,
                reply,
            }))
            .map_err(|_| StudyError::Io("control thread has stopped".to_owned()))?;
        reply_rx
            .recv()
            .map_err(|_| StudyError::Io("control thread dropped the reply".to_owned()))?
    }
}

/// Text of a panic payload, for logs and error reports.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Start a run on its own thread with a fresh engine from `factory`. The
/// outcome always arrives on `tx` as `WorkerMessage::Finished`, including
/// when the engine or the run panics.
pub fn spawn_worker(
    plan: AutoplayPlan,
    depth: u32,
    factory: EngineFactory,
    tx: Sender<ControlMessage>,
    cancel: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new().name("autoplay".to_string()).spawn(move || {
        let start = plan.start;
        let sink_tx = tx.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || match factory() {
            Ok(mut engine) => {
                let mut sink = ChannelSink::new(sink_tx);
                run_autoplay(&plan, depth, engine.as_mut(), &mut sink, &cancel)
            }
            Err(error) => Err(AutoplayAbort {
                error: error.into(),
                report: AutoplayReport::empty(plan.start),
            }),
        }))
        .unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!("auto-play worker panicked: {message}");
            Err(AutoplayAbort {
                error: StudyError::WorkerPanicked("autoplay".to_owned(), message),
                report: AutoplayReport::empty(start),
            })
        });
        let _ = tx.send(ControlMessage::Worker(WorkerMessage::Finished(outcome)));
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;

    use super::{run_autoplay, Appended, AutoplayPlan, AutoplaySink};
    use crate::board::position::Position;
    use crate::engine::engine_trait::{Evaluation, PositionEngine, Score};
    use crate::errors::{EngineError, StudyError, StudyResult};
    use crate::moves::chess_move::ChessMove;
    use crate::tree::game_tree::{GameTree, NodeId};

    fn uci(text: &str) -> ChessMove {
        ChessMove::from_uci(text).expect("UCI move should parse")
    }

    /// Answers from a fixed script and counts queries.
    struct ScriptedEngine {
        replies: VecDeque<Result<ChessMove, EngineError>>,
        queries: u32,
    }

    impl ScriptedEngine {
        fn new(moves: &[&str]) -> Self {
            Self {
                replies: moves.iter().map(|m| Ok(uci(m))).collect(),
                queries: 0,
            }
        }
    }

    impl PositionEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        fn best_move(&mut self, _position: &Position) -> Result<ChessMove, EngineError> {
            self.queries += 1;
            self.replies.pop_front().unwrap_or(Err(EngineError::NoMove))
        }

        fn evaluate(&mut self, _position: &Position) -> Result<Evaluation, EngineError> {
            Ok(Evaluation {
                score: Score::Centipawns(0),
                wdl: None,
            })
        }
    }

    /// Applies appends to a tree and counts display updates.
    struct TreeSink<'a> {
        tree: &'a mut GameTree,
        displays: u32,
    }

    impl AutoplaySink for TreeSink<'_> {
        fn append(&mut self, at: NodeId, mv: ChessMove, as_variation: bool) -> StudyResult<Appended> {
            let appended = Appended::apply(self.tree, at, mv, as_variation)?;
            if appended.created {
                self.displays += 1;
            }
            Ok(appended)
        }
    }

    fn tree_with(moves: &[&str]) -> GameTree {
        let mut tree = GameTree::new(Position::new_game());
        tree.extend_mainline(tree.root(), moves.iter().map(|m| uci(m)))
            .expect("mainline should load");
        tree
    }

    #[test]
    fn depth_three_from_leaf_queries_and_appends_six_times() {
        let mut tree = tree_with(&["e2e4", "e7e5"]);
        let leaf = tree.mainline_end();
        let plan = AutoplayPlan::capture(&tree, leaf).expect("plan");
        assert!(plan.mainline.is_empty());

        let mut engine = ScriptedEngine::new(&["g1f3", "b8c6", "f1b5", "a7a6", "b5a4", "g8f6"]);
        let mut sink = TreeSink {
            tree: &mut tree,
            displays: 0,
        };
        let report = run_autoplay(&plan, 3, &mut engine, &mut sink, &AtomicBool::new(false)).expect("run");
        let displays = sink.displays;

        assert_eq!(engine.queries, 6);
        assert_eq!(report.queries, 6);
        assert_eq!(report.appended, 6);
        assert_eq!(displays, 6);
        assert!(!report.cancelled);
        assert_eq!(tree.mainline().count(), 8);
        assert_eq!(report.last_node, tree.mainline_end());
        assert_eq!(tree.registry().branch_count(), 0);
    }

    #[test]
    fn agreeing_mainline_is_walked_without_mutation() {
        let mut tree = tree_with(&["e2e4", "e7e5", "g1f3"]);
        let plan = AutoplayPlan::capture(&tree, tree.root()).expect("plan");
        let recorded: Vec<NodeId> = tree.mainline().collect();

        // Agrees with e4 and e5, then prefers Nc3 over Nf3.
        let mut engine = ScriptedEngine::new(&["e2e4", "e7e5", "b1c3", "g8f6"]);
        let mut sink = TreeSink {
            tree: &mut tree,
            displays: 0,
        };
        let report = run_autoplay(&plan, 1, &mut engine, &mut sink, &AtomicBool::new(false)).expect("run");

        assert_eq!(report.queries, 4);
        assert_eq!(report.appended, 2);
        let e5 = recorded[1];
        let children = tree.children_of(e5).expect("children");
        assert_eq!(children.len(), 2);
        assert_eq!(children[0], recorded[2]);
        let nc3 = children[1];
        assert_eq!(tree.id_of(nc3).expect("id"), 1);

        // The extension ply continues the new variation, in its column.
        let nf6 = tree.children_of(nc3).expect("children")[0];
        assert_eq!(tree.move_of(nf6).expect("move"), Some(uci("g8f6")));
        assert_eq!(tree.id_of(nf6).expect("id"), 1);
        assert_eq!(report.last_node, nf6);
    }

    #[test]
    fn walk_to_end_of_agreeing_line_then_extends_mainline() {
        let mut tree = tree_with(&["e2e4"]);
        let plan = AutoplayPlan::capture(&tree, tree.root()).expect("plan");
        let mut engine = ScriptedEngine::new(&["e2e4", "c7c5", "g1f3"]);
        let mut sink = TreeSink {
            tree: &mut tree,
            displays: 0,
        };
        let report = run_autoplay(&plan, 1, &mut engine, &mut sink, &AtomicBool::new(false)).expect("run");
        assert_eq!(report.queries, 3);
        assert_eq!(report.appended, 2);
        assert_eq!(tree.mainline().count(), 3);
    }

    #[test]
    fn cancellation_is_checked_before_each_query() {
        let mut tree = tree_with(&[]);
        let plan = AutoplayPlan::capture(&tree, tree.root()).expect("plan");
        let mut engine = ScriptedEngine::new(&["e2e4"]);
        let mut sink = TreeSink {
            tree: &mut tree,
            displays: 0,
        };
        let report = run_autoplay(&plan, 5, &mut engine, &mut sink, &AtomicBool::new(true)).expect("run");
        assert!(report.cancelled);
        assert_eq!(report.queries, 0);
        assert_eq!(engine.queries, 0);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn engine_failure_keeps_progress_so_far() {
        let mut tree = tree_with(&[]);
        let plan = AutoplayPlan::capture(&tree, tree.root()).expect("plan");
        let mut engine = ScriptedEngine::new(&["d2d4", "d7d5"]);
        engine.replies.push_back(Err(EngineError::Timeout(50)));
        let mut sink = TreeSink {
            tree: &mut tree,
            displays: 0,
        };
        let abort = run_autoplay(&plan, 4, &mut engine, &mut sink, &AtomicBool::new(false)).unwrap_err();
        assert_eq!(abort.error, StudyError::EngineTimeout(50));
        assert_eq!(abort.report.appended, 2);
        assert_eq!(abort.report.last_node, tree.mainline_end());
        assert_eq!(tree.mainline().count(), 2);
    }

    #[test]
    fn illegal_engine_move_aborts_without_appending() {
        let mut tree = tree_with(&[]);
        let plan = AutoplayPlan::capture(&tree, tree.root()).expect("plan");
        let mut engine = ScriptedEngine::new(&["e2e5"]);
        let mut sink = TreeSink {
            tree: &mut tree,
            displays: 0,
        };
        let abort = run_autoplay(&plan, 1, &mut engine, &mut sink, &AtomicBool::new(false)).unwrap_err();
        assert!(matches!(abort.error, StudyError::IllegalMove { .. }));
        assert_eq!(abort.report.appended, 0);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn stops_quietly_at_checkmate() {
        let start = Position::from_fen("rnbqkbnr/pppp1ppp/8/4p3/6P1/5P2/PPPPP2P/RNBQKBNR b KQkq - 0 2")
            .expect("FEN should parse");
        let mut tree = GameTree::new(start);
        let plan = AutoplayPlan::capture(&tree, tree.root()).expect("plan");
        let mut engine = ScriptedEngine::new(&["d8h4"]);
        let mut sink = TreeSink {
            tree: &mut tree,
            displays: 0,
        };
        let report = run_autoplay(&plan, 3, &mut engine, &mut sink, &AtomicBool::new(false)).expect("run");
        assert!(report.game_over);
        assert_eq!(report.queries, 1);
        assert_eq!(report.appended, 1);
    }

    #[test]
    fn huge_depth_does_not_overflow() {
        let mut tree = tree_with(&["e2e4", "e7e5"]);
        let plan = AutoplayPlan::capture(&tree, tree.mainline_end()).expect("plan");
        let mut engine = ScriptedEngine::new(&["g1f3", "b8c6"]);
        let mut sink = TreeSink {
            tree: &mut tree,
            displays: 0,
        };
        let abort = run_autoplay(&plan, u32::MAX, &mut engine, &mut sink, &AtomicBool::new(false)).unwrap_err();
        // The script runs dry long before the ply budget does.
        assert!(matches!(abort.error, StudyError::EngineUnavailable(_)));
        assert_eq!(abort.report.queries, 3);
        assert_eq!(abort.report.appended, 2);
        assert_eq!(tree.mainline().count(), 4);
    }

    /// 1. e4 e5 (1... c5 2. Nf3), with the handle of e4, c5 and Nf3.
    fn tree_with_sicilian_variation() -> (GameTree, NodeId, NodeId, NodeId) {
        let mut tree = tree_with(&["e2e4", "e7e5"]);
        let e4 = tree.mainline().next().expect("e4");
        let c5 = tree.append_move(e4, uci("c7c5"), true).expect("variation");
        let nf3 = tree.append_move(c5, uci("g1f3"), false).expect("continuation");
        (tree, e4, c5, nf3)
    }

    #[test]
    fn divergence_into_existing_variation_reuses_it_and_branches_off() {
        let (mut tree, e4, c5, nf3) = tree_with_sicilian_variation();
        let plan = AutoplayPlan::capture(&tree, e4).expect("plan");
        let mut engine = ScriptedEngine::new(&["c7c5", "b1c3"]);
        let mut sink = TreeSink {
            tree: &mut tree,
            displays: 0,
        };
        let report = run_autoplay(&plan, 1, &mut engine, &mut sink, &AtomicBool::new(false)).expect("run");
        let displays = sink.displays;

        assert_eq!(report.queries, 2);
        assert_eq!(report.appended, 1);
        assert_eq!(displays, 1);
        assert_eq!(tree.node_count(), 6);
        let children = tree.children_of(c5).expect("children");
        assert_eq!(children.len(), 2);
        assert_eq!(children[0], nf3);
        let nc3 = children[1];
        assert_eq!(tree.move_of(nc3).expect("move"), Some(uci("b1c3")));
        assert_eq!(tree.id_of(nc3).expect("id"), 2);
        assert_eq!(report.last_node, nc3);
    }

    #[test]
    fn agreeing_variation_is_walked_then_extended() {
        let (mut tree, e4, _, nf3) = tree_with_sicilian_variation();
        let plan = AutoplayPlan::capture(&tree, e4).expect("plan");
        let mut engine = ScriptedEngine::new(&["c7c5", "g1f3", "b8c6", "d2d4"]);
        let mut sink = TreeSink {
            tree: &mut tree,
            displays: 0,
        };
        let report = run_autoplay(&plan, 2, &mut engine, &mut sink, &AtomicBool::new(false)).expect("run");

        assert_eq!(report.queries, 4);
        assert_eq!(report.appended, 2);
        let nc6 = tree.children_of(nf3).expect("children")[0];
        let d4 = tree.children_of(nc6).expect("children")[0];
        assert_eq!(tree.move_of(d4).expect("move"), Some(uci("d2d4")));
        assert_eq!(tree.id_of(d4).expect("id"), 1);
        assert_eq!(report.last_node, d4);
    }
}
