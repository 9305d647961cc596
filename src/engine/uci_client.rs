//! UCI engine process client.
//!
//! Spawns the configured executable, performs the `uci`/`isready` handshake,
//! and answers each query with `position fen ...` followed by `go depth N`.
//! A reader thread forwards stdout lines over a channel so every wait can be
//! bounded by the configured timeout. Every query starts with an
//! `isready`/`readyok` round trip, so output left over from an earlier query
//! (a late `bestmove` after a timeout) is never taken as the new answer.

use std::collections::HashSet;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::board::position::Position;
use crate::config::EngineConfig;
use crate::engine::engine_trait::{Evaluation, PositionEngine, Score, Wdl};
use crate::errors::EngineError;
use crate::moves::chess_move::ChessMove;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const STOP_GRACE: Duration = Duration::from_millis(500);

pub struct UciEngine {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    rx: Receiver<String>,
    option_names: HashSet<String>,
    name: String,
    depth: u32,
    timeout: Duration,
}

/// What one `go` produced: the final `bestmove` and the last score seen.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SearchReply {
    best_move: Result<ChessMove, EngineError>,
    score: Option<(Score, Option<Wdl>)>,
}

impl UciEngine {
    pub fn spawn(config: &EngineConfig) -> Result<Self, EngineError> {
        let mut child = Command::new(&config.path)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{}: {e}", config.path.display())))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Spawn("engine has no stdin".to_owned()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Spawn("engine has no stdout".to_owned()))?;

        let (tx, rx) = mpsc::channel::<String>();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let mut engine = Self {
            child,
            stdin: BufWriter::new(stdin),
            rx,
            option_names: HashSet::new(),
            name: config.path.display().to_string(),
            depth: config.depth.max(1),
            timeout: Duration::from_millis(config.timeout_ms.max(1)),
        };
        engine.initialize(config)?;
        info!("engine '{}' ready (depth {})", engine.name, engine.depth);
        Ok(engine)
    }

    fn initialize(&mut self, config: &EngineConfig) -> Result<(), EngineError> {
        self.write_line("uci")?;
        loop {
            let line = self.recv_line(HANDSHAKE_TIMEOUT)?;
            if let Some(name) = line.strip_prefix("id name ") {
                self.name = name.trim().to_owned();
            } else if let Some(rest) = line.strip_prefix("option ") {
                if let Some(name) = parse_option_name(rest) {
                    self.option_names.insert(name);
                }
            } else if line == "uciok" {
                break;
            }
        }

        self.set_option_if_available("Threads", &config.threads.max(1).to_string())?;
        self.set_option_if_available("Hash", &config.hash_mb.to_string())?;
        if config.show_wdl {
            self.set_option_if_available("UCI_ShowWDL", "true")?;
        }
        self.sync_ready()?;
        self.write_line("ucinewgame")
    }

    fn search(&mut self, position: &Position) -> Result<SearchReply, EngineError> {
        self.resync()?;
        self.write_line(&format!("position fen {}", position.to_fen()))?;
        self.write_line(&format!("go depth {}", self.depth))?;

        let start = Instant::now();
        let mut score = None;
        loop {
            let remaining = self.timeout.saturating_sub(start.elapsed());
            match self.rx.recv_timeout(remaining) {
                Ok(line) => {
                    if let Some(parsed) = parse_info_score(&line) {
                        score = Some(parsed);
                    } else if let Some(best_move) = parse_bestmove(&line) {
                        debug!("engine '{}' answered {line} after {:?}", self.name, start.elapsed());
                        return Ok(SearchReply { best_move, score });
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let ms = self.timeout.as_millis() as u64;
                    warn!("engine '{}' exceeded {ms} ms, sending stop", self.name);
                    self.write_line("stop")?;
                    self.drain_until_bestmove(STOP_GRACE);
                    return Err(EngineError::Timeout(ms));
                }
                Err(RecvTimeoutError::Disconnected) => return Err(EngineError::Disconnected),
            }
        }
    }

    fn drain_until_bestmove(&self, grace: Duration) {
        let deadline = Instant::now() + grace;
        while let Ok(line) = self.rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            if line.starts_with("bestmove") {
                break;
            }
        }
    }

    /// Drop lines an earlier query left behind and wait until the engine is idle.
    fn resync(&mut self) -> Result<(), EngineError> {
        let stale = self.rx.try_iter().count();
        if stale > 0 {
            debug!("dropped {stale} stale lines from '{}'", self.name);
        }
        self.sync_ready()
    }

    /// Lines before `readyok` belong to earlier commands and are skipped.
    fn sync_ready(&mut self) -> Result<(), EngineError> {
        self.write_line("isready")?;
        loop {
            let line = self.recv_line(HANDSHAKE_TIMEOUT)?;
            if line == "readyok" {
                return Ok(());
            }
            debug!("skipping '{line}' while waiting for readyok");
        }
    }

    fn recv_line(&self, timeout: Duration) -> Result<String, EngineError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => EngineError::Timeout(timeout.as_millis() as u64),
            RecvTimeoutError::Disconnected => EngineError::Disconnected,
        })
    }

    fn set_option_if_available(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        if self.option_names.is_empty() || self.option_names.contains(name) {
            self.write_line(&format!("setoption name {name} value {value}"))?;
        }
        Ok(())
    }

    fn write_line(&mut self, msg: &str) -> Result<(), EngineError> {
        debug!(">> {msg}");
        let io = |e: std::io::Error| EngineError::Protocol(format!("write to engine failed: {e}"));
        self.stdin.write_all(msg.as_bytes()).map_err(io)?;
        self.stdin.write_all(b"\n").map_err(io)?;
        self.stdin.flush().map_err(io)
    }
}

impl PositionEngine for UciEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn best_move(&mut self, position: &Position) -> Result<ChessMove, EngineError> {
        self.search(position)?.best_move
    }

    fn evaluate(&mut self, position: &Position) -> Result<Evaluation, EngineError> {
        let reply = self.search(position)?;
        let (score, wdl) = reply
            .score
            .ok_or_else(|| EngineError::Protocol("search finished without a score".to_owned()))?;
        let side = position.side_to_move;
        Ok(Evaluation {
            score: score.from_side_to_move(side),
            wdl: wdl.map(|w| w.from_side_to_move(side)),
        })
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        let _ = self.write_line("quit");
        let deadline = Instant::now() + Duration::from_millis(300);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// `Some` for a `bestmove` line; `Err(NoMove)` when the engine has none.
fn parse_bestmove(line: &str) -> Option<Result<ChessMove, EngineError>> {
    let rest = line.strip_prefix("bestmove")?;
    let token = rest.split_whitespace().next().unwrap_or("(none)");
    Some(match token {
        "(none)" | "0000" => Err(EngineError::NoMove),
        text => ChessMove::from_uci(text).map_err(EngineError::Protocol),
    })
}

/// Score and optional WDL from an `info` line, side-to-move point of view.
fn parse_info_score(line: &str) -> Option<(Score, Option<Wdl>)> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "info" {
        return None;
    }

    let mut score = None;
    let mut wdl = None;
    let mut bound = false;
    while let Some(token) = tokens.next() {
        match token {
            "score" => {
                let kind = tokens.next()?;
                let value: i32 = tokens.next()?.parse().ok()?;
                score = match kind {
                    "cp" => Some(Score::Centipawns(value)),
                    "mate" => Some(Score::Mate(value)),
                    _ => None,
                };
            }
            "lowerbound" | "upperbound" => bound = true,
            "wdl" => {
                let mut next = || tokens.next().and_then(|t| t.parse::<u16>().ok());
                wdl = Some(Wdl {
                    win: next()?,
                    draw: next()?,
                    loss: next()?,
                });
            }
            // Everything after `pv` is moves.
            "pv" | "string" => break,
            _ => {}
        }
    }

    if bound {
        return None;
    }
    score.map(|s| (s, wdl))
}

fn parse_option_name(rest: &str) -> Option<String> {
    let rest = rest.strip_prefix("name ")?;
    let end = rest.find(" type ").unwrap_or(rest.len());
    let name = rest[..end].trim();
    (!name.is_empty()).then(|| name.to_owned())
}
