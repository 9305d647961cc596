use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use plum_study::board::render::render_position;
use plum_study::config::StudyConfig;
use plum_study::engine::engine_random::RandomEngine;
use plum_study::engine::engine_trait::{EngineFactory, PositionEngine};
use plum_study::engine::uci_client::UciEngine;
use plum_study::record::pgn::read_pgn;
use plum_study::session::commands::{Command, ControlMessage, SessionNotice, StudyEvent};
use plum_study::session::controller::{ControllerSettings, StudyController};

const HELP: &str = "commands: n (next)  b (back)  ] / [ (variations)  auto [depth]  stop  p (print)  e (eval)  q (quit)";

#[derive(Parser)]
#[command(name = "plum-study", about = "Step through a PGN game and extend it with engine analysis")]
struct Cli {
    /// Game record to load
    pgn: PathBuf,

    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// UCI engine executable (overrides the config file)
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Use the built-in random engine with this seed instead of a UCI engine
    #[arg(long, value_name = "SEED")]
    random_engine: Option<u64>,

    /// Full moves added by each auto-play run
    #[arg(long)]
    autoplay_depth: Option<u32>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => StudyConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => StudyConfig::default(),
    };
    if let Some(path) = cli.engine {
        config.engine.path = path;
    }
    if let Some(depth) = cli.autoplay_depth {
        config.autoplay.depth = depth;
    }

    let text = std::fs::read_to_string(&cli.pgn).with_context(|| format!("reading {}", cli.pgn.display()))?;
    let record = read_pgn(&text).with_context(|| format!("parsing {}", cli.pgn.display()))?;
    info!(
        "loaded {} ({} plies on the mainline)",
        cli.pgn.display(),
        record.tree.mainline().count()
    );

    let (factory, interactive) = build_engines(&config, cli.random_engine);
    let settings = ControllerSettings {
        bounds: config.sheet,
        autoplay_depth: config.autoplay.depth,
    };

    let (event_tx, event_rx) = channel::<StudyEvent>();
    let controller = StudyController::new(record, settings, interactive, factory, event_tx);
    let command_tx = controller.sender();
    let control = controller.spawn().context("failed to spawn control thread")?;

    let printer = thread::Builder::new()
        .name("printer".to_string())
        .spawn(move || {
            for event in event_rx {
                print_event(&event);
                io::stdout().flush().ok();
            }
        })
        .context("failed to spawn printer thread")?;

    eprintln!("{HELP}");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = Command::parse(&line) else {
            eprintln!("{HELP}");
            continue;
        };
        let quit = command == Command::Quit;
        if command_tx.send(ControlMessage::Command(command)).is_err() || quit {
            break;
        }
    }
    let _ = command_tx.send(ControlMessage::Command(Command::Quit));
    drop(command_tx);

    control
        .join()
        .map_err(|_| anyhow::anyhow!("control thread panicked"))?;
    printer
        .join()
        .map_err(|_| anyhow::anyhow!("printer thread panicked"))?;
    Ok(())
}

fn build_engines(config: &StudyConfig, random_seed: Option<u64>) -> (EngineFactory, Option<Box<dyn PositionEngine>>) {
    match random_seed {
        Some(seed) => {
            let runs = Arc::new(AtomicU64::new(0));
            let factory: EngineFactory = Arc::new(move || {
                let run = runs.fetch_add(1, Ordering::Relaxed);
                Ok(Box::new(RandomEngine::new(seed.wrapping_add(run))) as Box<dyn PositionEngine>)
            });
            (factory, Some(Box::new(RandomEngine::new(seed))))
        }
        None => {
            let engine_config = config.engine.clone();
            let factory: EngineFactory = Arc::new(move || {
                UciEngine::spawn(&engine_config).map(|engine| Box::new(engine) as Box<dyn PositionEngine>)
            });
            let interactive = match UciEngine::spawn(&config.engine) {
                Ok(engine) => Some(Box::new(engine) as Box<dyn PositionEngine>),
                Err(err) => {
                    warn!("interactive engine unavailable: {err}");
                    None
                }
            };
            (factory, interactive)
        }
    }
}

fn print_event(event: &StudyEvent) {
    match event {
        StudyEvent::Display(snapshot) => {
            println!("{}", render_position(&snapshot.position));
            print!("{}", snapshot.render_sheet());
        }
        StudyEvent::Notice(SessionNotice::Navigation(notice)) => println!("({notice})"),
        StudyEvent::Notice(SessionNotice::Busy) => println!("(auto-play is already running)"),
        StudyEvent::Notice(SessionNotice::AutoplayIdle) => println!("(no auto-play to stop)"),
        StudyEvent::Notice(SessionNotice::AutoplayStarted { depth }) => {
            println!("(auto-play started, depth {depth})")
        }
        StudyEvent::Notice(SessionNotice::CancelRequested) => println!("(stopping auto-play)"),
        StudyEvent::Notice(SessionNotice::EvaluationPending) => println!("(evaluation already running)"),
        StudyEvent::Evaluation { evaluation, .. } => println!("eval: {evaluation}"),
        StudyEvent::TreeDump(text) => println!("{text}"),
        StudyEvent::AutoplayFinished(report) => println!(
            "auto-play finished: {} engine queries, {} new moves{}",
            report.queries,
            report.appended,
            if report.cancelled { " (cancelled)" } else { "" }
        ),
        StudyEvent::AutoplayFailed(abort) => println!(
            "auto-play stopped after {} new moves: {}",
            abort.report.appended, abort.error
        ),
        StudyEvent::Error(err) => println!("error: {err}"),
    }
}
