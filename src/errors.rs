//! Error types shared by the game tree, the engine clients and the session.

use thiserror::Error;

use crate::moves::chess_move::ChessMove;
use crate::tree::game_tree::NodeId;

/// Every failure the study core can report to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StudyError {
    /// A mainline append met a different, existing mainline move.
    #[error("node {at} already continues with {existing}; cannot append {attempted} as mainline")]
    Conflict {
        at: NodeId,
        existing: ChessMove,
        attempted: ChessMove,
    },

    /// A variation id was requested for a node the registry never saw.
    #[error("no variation id registered for off-mainline node {0}")]
    Lookup(NodeId),

    #[error("illegal move {mv} at node {at}: {reason}")]
    IllegalMove {
        at: NodeId,
        mv: ChessMove,
        reason: String,
    },

    #[error("unknown node handle {0}")]
    UnknownNode(NodeId),

    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("engine did not answer within {0} ms")]
    EngineTimeout(u64),

    #[error("auto-play is already running")]
    Busy,

    /// A background thread panicked before reporting its outcome.
    #[error("{0} thread panicked: {1}")]
    WorkerPanicked(String, String),

    /// Game record or FEN could not be parsed.
    #[error("record error: {0}")]
    Record(String),

    #[error("i/o error: {0}")]
    Io(String),
}

/// Failures of a position engine backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("failed to start engine: {0}")]
    Spawn(String),

    #[error("engine process closed its output")]
    Disconnected,

    #[error("engine timed out after {0} ms")]
    Timeout(u64),

    /// Engine answered but had no move (`bestmove (none)` or `0000`).
    #[error("engine returned no move")]
    NoMove,

    #[error("engine protocol error: {0}")]
    Protocol(String),
}

impl From<EngineError> for StudyError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Timeout(ms) => StudyError::EngineTimeout(ms),
            other => StudyError::EngineUnavailable(other.to_string()),
        }
    }
}

impl From<std::io::Error> for StudyError {
    fn from(err: std::io::Error) -> Self {
        StudyError::Io(err.to_string())
    }
}

pub type StudyResult<T> = Result<T, StudyError>;

#[cfg(test)]
mod tests {
    use super::{EngineError, StudyError};

    #[test]
    fn engine_errors_map_to_recoverable_study_errors() {
        assert_eq!(
            StudyError::from(EngineError::Timeout(250)),
            StudyError::EngineTimeout(250)
        );
        assert!(matches!(
            StudyError::from(EngineError::NoMove),
            StudyError::EngineUnavailable(_)
        ));
    }
}
