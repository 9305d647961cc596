//! Messages between the front end, the control thread and the auto-play worker.
//!
//! ```text
//! front end --Command--> control thread <--WorkerMessage-- auto-play worker
//!     ^                       |                             evaluation thread
//!     +-------StudyEvent------+
//! ```

use std::sync::mpsc::Sender;

use crate::engine::engine_trait::{Evaluation, PositionEngine};
use crate::errors::StudyError;
use crate::moves::chess_move::ChessMove;
use crate::session::autoplay::{Appended, AutoplayAbort, AutoplayReport};
use crate::tree::display::DisplaySnapshot;
use crate::tree::game_tree::NodeId;
use crate::tree::navigator::Notice;

/// User intent, as produced by the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Advance,
    Retreat,
    NextVariation,
    PreviousVariation,
    /// `None` uses the configured depth.
    StartAutoplay { depth: Option<u32> },
    CancelAutoplay,
    PrintTree,
    EvaluateCurrent,
    Quit,
}

impl Command {
    /// Parse one line of the text front end.
    pub fn parse(line: &str) -> Option<Command> {
        let mut words = line.split_whitespace();
        let command = match words.next()? {
            "n" | "next" => Command::Advance,
            "b" | "back" => Command::Retreat,
            "]" => Command::NextVariation,
            "[" => Command::PreviousVariation,
            "auto" | "a" => Command::StartAutoplay {
                depth: match words.next() {
                    Some(depth) => Some(depth.parse().ok().filter(|d| *d > 0)?),
                    None => None,
                },
            },
            "stop" | "s" => Command::CancelAutoplay,
            "p" | "print" => Command::PrintTree,
            "e" | "eval" => Command::EvaluateCurrent,
            "q" | "quit" => Command::Quit,
            _ => return None,
        };
        Some(command)
    }
}

/// Informational status that is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    Navigation(Notice),
    Busy,
    AutoplayIdle,
    AutoplayStarted { depth: u32 },
    CancelRequested,
    /// An evaluation is still running; the new request was dropped.
    EvaluationPending,
}

/// Output of the control thread.
#[derive(Debug, Clone, PartialEq)]
pub enum StudyEvent {
    Display(Box<DisplaySnapshot>),
    Notice(SessionNotice),
    Evaluation { node: NodeId, evaluation: Evaluation },
    TreeDump(String),
    AutoplayFinished(AutoplayReport),
    AutoplayFailed(AutoplayAbort),
    Error(StudyError),
}

/// Messages from background threads to the owner of the tree.
#[derive(Debug)]
pub enum WorkerMessage {
    Append {
        at: NodeId,
        mv: ChessMove,
        as_variation: bool,
        reply: Sender<Result<Appended, StudyError>>,
    },
    Finished(Result<AutoplayReport, AutoplayAbort>),
    /// The interactive engine coming back from an evaluation; `None` if it
    /// panicked.
    Evaluated {
        node: NodeId,
        engine: Option<Box<dyn PositionEngine>>,
        result: Result<Evaluation, StudyError>,
    },
}

/// Everything the control thread's inbox carries.
#[derive(Debug)]
pub enum ControlMessage {
    Command(Command),
    Worker(WorkerMessage),
}

impl From<Command> for ControlMessage {
    fn from(command: Command) -> Self {
        ControlMessage::Command(command)
    }
}

#[cfg(test)]
mod tests {
    use super::Command;

    #[test]
    fn parses_front_end_lines() {
        assert_eq!(Command::parse("n"), Some(Command::Advance));
        assert_eq!(Command::parse("  b "), Some(Command::Retreat));
        assert_eq!(Command::parse("]"), Some(Command::NextVariation));
        assert_eq!(Command::parse("["), Some(Command::PreviousVariation));
        assert_eq!(Command::parse("auto"), Some(Command::StartAutoplay { depth: None }));
        assert_eq!(Command::parse("auto 3"), Some(Command::StartAutoplay { depth: Some(3) }));
        assert_eq!(Command::parse("auto 0"), None);
        assert_eq!(Command::parse("auto x"), None);
        assert_eq!(Command::parse("stop"), Some(Command::CancelAutoplay));
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("jump"), None);
    }
}
