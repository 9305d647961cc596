//! Control thread: owner of the game tree.
//!
//! `StudyController` holds the record, the navigator and the interactive
//! engine. It processes one `ControlMessage` at a time from its inbox, so every
//! mutation of the tree happens here, whether it comes from a user command or
//! from the auto-play worker. Engine work never runs on this thread: auto-play
//! has its worker, and evaluations borrow the interactive engine on a
//! short-lived thread that hands it back. Results go out as `StudyEvent`s.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use crate::engine::engine_trait::{EngineFactory, Evaluation, PositionEngine};
use crate::errors::{StudyError, StudyResult};
use crate::record::pgn::{write_pgn, GameRecord};
use crate::session::autoplay::{panic_message, spawn_worker, Appended, AutoplayAbort, AutoplayPlan, AutoplayReport};
use crate::session::commands::{Command, ControlMessage, SessionNotice, StudyEvent, WorkerMessage};
use crate::tree::display::{DisplaySnapshot, SheetBounds};
use crate::tree::game_tree::{GameTree, NodeId};
use crate::tree::navigator::{NavOutcome, Navigator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub bounds: SheetBounds,
    pub autoplay_depth: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            bounds: SheetBounds::default(),
            autoplay_depth: 10,
        }
    }
}

struct ActiveRun {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct StudyController {
    record: GameRecord,
    navigator: Navigator,
    settings: ControllerSettings,
    interactive: Option<Box<dyn PositionEngine>>,
    /// The interactive engine is out on an evaluation thread.
    evaluating: bool,
    factory: EngineFactory,
    inbox: Receiver<ControlMessage>,
    inbox_tx: Sender<ControlMessage>,
    events: Sender<StudyEvent>,
    active: Option<ActiveRun>,
    quitting: bool,
}

impl StudyController {
    pub fn new(
        record: GameRecord,
        settings: ControllerSettings,
        interactive: Option<Box<dyn PositionEngine>>,
        factory: EngineFactory,
        events: Sender<StudyEvent>,
    ) -> Self {
        let (inbox_tx, inbox) = mpsc::channel();
        Self {
            record,
            navigator: Navigator::new(),
            settings,
            interactive,
            evaluating: false,
            factory,
            inbox,
            inbox_tx,
            events,
            active: None,
            quitting: false,
        }
    }

    /// Handle for sending commands to this controller.
    pub fn sender(&self) -> Sender<ControlMessage> {
        self.inbox_tx.clone()
    }

    #[inline]
    pub fn tree(&self) -> &GameTree {
        &self.record.tree
    }

    #[inline]
    pub fn current(&self) -> NodeId {
        self.navigator.current()
    }

    #[inline]
    pub fn is_autoplay_running(&self) -> bool {
        self.active.is_some()
    }

    /// Run the control loop on a named thread. The thread hands the record
    /// back when the loop ends.
    pub fn spawn(self) -> std::io::Result<JoinHandle<GameRecord>> {
        thread::Builder::new()
            .name("control".to_string())
            .spawn(move || self.run())
    }

    /// Process messages until `Quit` has been handled and any running
    /// auto-play has finished.
    pub fn run(mut self) -> GameRecord {
        info!("control loop started with {} nodes", self.record.tree.node_count());
        self.emit_display();

        while let Ok(message) = self.inbox.recv() {
            self.handle(message);
            if self.quitting && self.active.is_none() {
                break;
            }
        }

        info!("control loop stopped");
        self.record
    }

    pub fn handle(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Command(command) => self.handle_command(command),
            ControlMessage::Worker(message) => self.handle_worker(message),
        }
    }

    fn handle_command(&mut self, command: Command) {
        debug!("command {command:?} at {}", self.navigator.current());
        match command {
            Command::Advance => self.navigate(Navigator::step_forward),
            Command::Retreat => self.navigate(Navigator::step_backward),
            Command::NextVariation => self.navigate(Navigator::sibling_next),
            Command::PreviousVariation => self.navigate(Navigator::sibling_previous),
            Command::StartAutoplay { depth } => {
                let depth = depth.unwrap_or(self.settings.autoplay_depth);
                if let Err(err) = self.start_autoplay(depth) {
                    self.emit_error(err);
                }
            }
            Command::CancelAutoplay => match &self.active {
                Some(run) => {
                    run.cancel.store(true, Ordering::Relaxed);
                    self.emit(StudyEvent::Notice(SessionNotice::CancelRequested));
                }
                None => self.emit(StudyEvent::Notice(SessionNotice::AutoplayIdle)),
            },
            Command::PrintTree => match write_pgn(&self.record) {
                Ok(text) => self.emit(StudyEvent::TreeDump(text)),
                Err(err) => self.emit_error(err),
            },
            Command::EvaluateCurrent => {
                if let Err(err) = self.start_evaluation() {
                    self.emit_error(err);
                }
            }
            Command::Quit => {
                self.quitting = true;
                if let Some(run) = &self.active {
                    run.cancel.store(true, Ordering::Relaxed);
                }
            }
        }
    }

    fn navigate(&mut self, step: fn(&mut Navigator, &GameTree) -> StudyResult<NavOutcome>) {
        match step(&mut self.navigator, &self.record.tree) {
            Ok(NavOutcome::Moved(_)) => self.emit_display(),
            Ok(NavOutcome::Stayed(notice)) => self.emit(StudyEvent::Notice(SessionNotice::Navigation(notice))),
            Err(err) => self.emit_error(err),
        }
    }

    fn start_autoplay(&mut self, depth: u32) -> StudyResult<()> {
        if self.active.is_some() {
            self.emit(StudyEvent::Notice(SessionNotice::Busy));
            return Ok(());
        }

        let plan = AutoplayPlan::capture(&self.record.tree, self.navigator.current())?;
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = spawn_worker(
            plan,
            depth,
            Arc::clone(&self.factory),
            self.inbox_tx.clone(),
            Arc::clone(&cancel),
        )?;
        self.active = Some(ActiveRun { cancel, handle });
        self.emit(StudyEvent::Notice(SessionNotice::AutoplayStarted { depth }));
        Ok(())
    }

    fn start_evaluation(&mut self) -> StudyResult<()> {
        if self.evaluating {
            self.emit(StudyEvent::Notice(SessionNotice::EvaluationPending));
            return Ok(());
        }
        let node = self.navigator.current();
        let position = self.record.tree.position_at(node)?;
        let mut engine = self
            .interactive
            .take()
            .ok_or_else(|| StudyError::EngineUnavailable("no interactive engine configured".to_owned()))?;

        let tx = self.inbox_tx.clone();
        thread::Builder::new().name("evaluate".to_string()).spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| engine.evaluate(&position)));
            let (engine, result) = match outcome {
                Ok(result) => (Some(engine), result.map_err(StudyError::from)),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    (None, Err(StudyError::WorkerPanicked("evaluate".to_owned(), message)))
                }
            };
            let _ = tx.send(ControlMessage::Worker(WorkerMessage::Evaluated { node, engine, result }));
        })?;
        self.evaluating = true;
        Ok(())
    }

    fn finish_evaluation(
        &mut self,
        node: NodeId,
        engine: Option<Box<dyn PositionEngine>>,
        result: StudyResult<Evaluation>,
    ) {
        self.evaluating = false;
        if engine.is_none() {
            error!("interactive engine lost after a panic; evaluation is disabled");
        }
        self.interactive = engine;
        match result {
            Ok(evaluation) => self.emit(StudyEvent::Evaluation { node, evaluation }),
            Err(err) => self.emit_error(err),
        }
    }

    fn handle_worker(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Append {
                at,
                mv,
                as_variation,
                reply,
            } => {
                let result = Appended::apply(&mut self.record.tree, at, mv, as_variation);
                if let Ok(appended) = &result {
                    self.follow(appended.node);
                    if appended.created {
                        self.emit_display();
                    }
                }
                if reply.send(result).is_err() {
                    warn!("auto-play worker went away before its append was acknowledged");
                }
            }
            WorkerMessage::Finished(outcome) => {
                if let Some(run) = self.active.take() {
                    if run.handle.join().is_err() {
                        error!("auto-play worker panicked");
                    }
                }
                match outcome {
                    Ok(report) => self.finish_autoplay(report),
                    Err(abort) => self.fail_autoplay(abort),
                }
            }
            WorkerMessage::Evaluated { node, engine, result } => self.finish_evaluation(node, engine, result),
        }
    }

    fn finish_autoplay(&mut self, report: AutoplayReport) {
        if self.follow(report.last_node) {
            self.emit_display();
        }
        self.emit(StudyEvent::AutoplayFinished(report));
    }

    fn fail_autoplay(&mut self, abort: AutoplayAbort) {
        if self.follow(abort.report.last_node) {
            self.emit_display();
        }
        self.emit(StudyEvent::AutoplayFailed(abort));
    }

    /// Move the cursor to `node`; true if it moved.
    fn follow(&mut self, node: NodeId) -> bool {
        let before = self.navigator.current();
        match self.navigator.jump_to(&self.record.tree, node) {
            Ok(_) => self.navigator.current() != before,
            Err(err) => {
                self.emit_error(err);
                false
            }
        }
    }

    fn emit_display(&self) {
        match DisplaySnapshot::capture(&self.record.tree, self.navigator.current(), self.settings.bounds) {
            Ok(snapshot) => self.emit(StudyEvent::Display(Box::new(snapshot))),
            Err(err) => self.emit_error(err),
        }
    }

    fn emit_error(&self, err: StudyError) {
        match &err {
            StudyError::Lookup(_) | StudyError::IllegalMove { .. } | StudyError::UnknownNode(_) => {
                error!("{err}")
            }
            _ => warn!("{err}"),
        }
        self.emit(StudyEvent::Error(err));
    }

    fn emit(&self, event: StudyEvent) {
        if self.events.send(event).is_err() {
            debug!("event dropped, front end has gone away");
        }
    }
}
