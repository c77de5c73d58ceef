mod app;
mod client;
mod config;
mod core;
mod export;
mod fingerprint;
mod form;
mod log_view;
mod logging;
mod pipeline;
mod selection;
mod ui;

use crate::app::{App, AppEvent, Command, DirOutcome, ExportOrigin};
use crate::client::MinimaxClient;
use crate::config::{ConfigError, Credentials, Paths};
use crate::export::ResultRecord;
use crate::logging::LoggingError;
use crossterm::event::{self, Event};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc::{self as tokio_mpsc, UnboundedSender};
use tracing::{debug, info};

const TICK_INTERVAL: Duration = Duration::from_millis(120);

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error("terminal error: {0}")]
    Terminal(#[from] io::Error),
}

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, cursor::Show);
    }
}

fn spawn_input(tx: UnboundedSender<AppEvent>) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        match event::read() {
            Ok(event) => {
                if tx.send(AppEvent::Input(event)).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    })
}

fn spawn_ticker(tx: UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            if tx.send(AppEvent::Tick).is_err() {
                break;
            }
        }
    });
}

fn spawn_dir_listing(
    tx: UnboundedSender<AppEvent>,
    id: u64,
    path: PathBuf,
    unless_modified: Option<SystemTime>,
) {
    tokio::spawn(async move {
        let outcome = match core::reload_if_modified(&path, unless_modified).await {
            Ok(Some(listing)) => DirOutcome::Loaded(listing),
            Ok(None) => {
                debug!(dir = %path.display(), "listing unchanged");
                DirOutcome::Unchanged
            }
            Err(err) => DirOutcome::Failed(err),
        };
        let _ = tx.send(AppEvent::DirListed { id, outcome });
    });
}

fn spawn_job(tx: UnboundedSender<AppEvent>, client: Arc<MinimaxClient>, path: PathBuf) {
    tokio::spawn(async move {
        let report = pipeline::run_job(client.as_ref(), path).await;
        let _ = tx.send(AppEvent::JobFinished(report));
    });
}

fn spawn_export(
    tx: UnboundedSender<AppEvent>,
    origin: ExportOrigin,
    records: Vec<ResultRecord>,
    dir: PathBuf,
) {
    tokio::task::spawn_blocking(move || {
        let result = export::export_csv(&records, &dir);
        let _ = tx.send(AppEvent::ExportFinished { origin, result });
    });
}

fn dispatch(command: Command, tx: &UnboundedSender<AppEvent>) {
    match command {
        Command::LoadDir {
            id,
            path,
            unless_modified,
        } => spawn_dir_listing(tx.clone(), id, path, unless_modified),
        Command::RunJob { client, path } => spawn_job(tx.clone(), client, path),
        Command::Export {
            origin,
            records,
            dir,
        } => spawn_export(tx.clone(), origin, records, dir),
        Command::Quit => {}
    }
}

async fn run() -> Result<(), StartupError> {
    let paths = Paths::resolve()?;
    paths.ensure_dirs()?;
    logging::init(&paths.log_file)?;
    let credentials = Credentials::load(&paths.config_file)?;
    let start_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    info!(
        data_root = %paths.root.display(),
        start_dir = %start_dir.display(),
        "starting"
    );

    let mut app = App::new(credentials, paths, start_dir);

    let _guard = TerminalGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    terminal.clear()?;
    let area = terminal.size()?;
    app.handle(AppEvent::Input(Event::Resize(area.width, area.height)));

    let (tx, mut rx) = tokio_mpsc::unbounded_channel();
    let _input_handle = spawn_input(tx.clone());
    spawn_ticker(tx.clone());

    if let Some(command) = app.init() {
        dispatch(command, &tx);
    }
    terminal.draw(|frame| ui::render(frame, app.ui_state()))?;

    while let Some(event) = rx.recv().await {
        let redraw = !matches!(event, AppEvent::Tick) || app.is_busy();
        match app.handle(event) {
            Some(Command::Quit) => break,
            Some(command) => dispatch(command, &tx),
            None => {}
        }
        if redraw {
            terminal.draw(|frame| ui::render(frame, app.ui_state()))?;
        }
    }

    info!(state = app.screen().name(), "exiting");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("minimax-voice: {err}");
            ExitCode::FAILURE
        }
    }
}
