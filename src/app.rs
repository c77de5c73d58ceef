use crate::client::{ClientError, MinimaxClient};
use crate::config::{Credentials, Paths};
use crate::core::{DirListing, DirectoryEntry, ListError};
use crate::export::{self, ExportError, ResultRecord};
use crate::form::ConfigForm;
use crate::log_view::LogBuffer;
use crate::pipeline::{CloneRun, JobReport, RunCounters, RunStep};
use crate::selection::{SelectionSet, Toggle};
use crate::ui;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::mem;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info, warn};

pub const BROWSER_HELP: &str =
    "c clone · C credentials · space/x select · enter open · e export · q quit";

/// Assumed terminal size until the first measurement arrives.
const FALLBACK_SIZE: (u16, u16) = (80, 24);
/// Rows taken by the header, status lines and panel borders.
const CHROME_ROWS: u16 = 8;

/// Everything the event loop feeds into [`App::handle`].
#[derive(Debug)]
pub enum AppEvent {
    Input(Event),
    Tick,
    DirListed { id: u64, outcome: DirOutcome },
    JobFinished(JobReport),
    ExportFinished {
        origin: ExportOrigin,
        result: Result<PathBuf, ExportError>,
    },
}

#[derive(Debug)]
pub enum DirOutcome {
    Loaded(DirListing),
    Unchanged,
    Failed(ListError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOrigin {
    Automatic,
    Manual,
}

/// Work the dispatcher asks for. Each command answers with exactly one event.
#[derive(Debug)]
pub enum Command {
    LoadDir {
        id: u64,
        path: PathBuf,
        unless_modified: Option<SystemTime>,
    },
    RunJob {
        client: Arc<MinimaxClient>,
        path: PathBuf,
    },
    Export {
        origin: ExportOrigin,
        records: Vec<ResultRecord>,
        dir: PathBuf,
    },
    Quit,
}

#[derive(Debug)]
pub struct RunSummary {
    pub counters: RunCounters,
    pub total: usize,
    pub log: LogBuffer,
    pub export: Result<PathBuf, String>,
}

/// The active view, carrying only the data that view needs.
#[derive(Debug)]
pub enum Screen {
    Config(ConfigForm),
    Browser,
    Confirm { paths: Vec<PathBuf> },
    Cloning(CloneRun),
    Summary(RunSummary),
    Exporting,
}

impl Screen {
    pub fn name(&self) -> &'static str {
        match self {
            Screen::Config(_) => "config",
            Screen::Browser => "browser",
            Screen::Confirm { .. } => "confirm",
            Screen::Cloning(_) => "cloning",
            Screen::Summary(_) => "summary",
            Screen::Exporting => "exporting",
        }
    }
}

#[derive(Debug, Default)]
pub struct BrowserState {
    pub dir: PathBuf,
    pub entries: Vec<DirectoryEntry>,
    pub cursor: usize,
    pub modified: Option<SystemTime>,
    listing_id: u64,
    loading: bool,
    pending_selection: Option<PathBuf>,
}

impl BrowserState {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            ..Self::default()
        }
    }

    pub fn selected_entry(&self) -> Option<&DirectoryEntry> {
        self.entries.get(self.cursor)
    }

    /// True while the newest listing request has not answered yet.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    fn request(&mut self, path: PathBuf, unless_modified: Option<SystemTime>) -> Command {
        self.listing_id = self.listing_id.wrapping_add(1);
        self.loading = true;
        Command::LoadDir {
            id: self.listing_id,
            path,
            unless_modified,
        }
    }

    fn apply(&mut self, listing: DirListing) {
        let previous = mem::replace(&mut self.dir, listing.path);
        let keep_cursor = previous == self.dir;
        self.entries = listing.entries;
        self.modified = listing.modified;
        if let Some(path) = self.pending_selection.take() {
            self.cursor = self
                .entries
                .iter()
                .position(|entry| !entry.is_parent && entry.path == path)
                .unwrap_or(0);
        } else if !keep_cursor {
            self.cursor = 0;
        }
        self.clamp();
    }

    fn clamp(&mut self) {
        if self.entries.is_empty() {
            self.cursor = 0;
        } else if self.cursor >= self.entries.len() {
            self.cursor = self.entries.len() - 1;
        }
    }

    fn move_by(&mut self, delta: isize) {
        if self.entries.is_empty() {
            return;
        }
        let last = self.entries.len() - 1;
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
    }
}

pub struct App {
    paths: Paths,
    credentials: Credentials,
    client: Option<Arc<MinimaxClient>>,
    home: Option<PathBuf>,
    screen: Screen,
    browser: BrowserState,
    selection: SelectionSet,
    results: Vec<ResultRecord>,
    status: String,
    error: Option<String>,
    last_export: Option<PathBuf>,
    spinner: usize,
    size: (u16, u16),
}

impl App {
    pub fn new(credentials: Credentials, paths: Paths, start_dir: PathBuf) -> Self {
        let mut app = Self {
            paths,
            client: None,
            home: dirs::home_dir(),
            screen: Screen::Browser,
            browser: BrowserState::new(start_dir),
            selection: SelectionSet::new(),
            results: Vec::new(),
            status: BROWSER_HELP.to_string(),
            error: None,
            last_export: None,
            spinner: 0,
            size: FALLBACK_SIZE,
            credentials: Credentials::default(),
        };
        match app.install_credentials(credentials.clone()) {
            Ok(()) => {}
            Err(err) => {
                warn!(error = %err, "could not build the MiniMax client");
                app.credentials = credentials;
                app.error = Some(format!("could not build the MiniMax client: {err}"));
            }
        }
        if app.client.is_none() {
            app.screen = Screen::Config(ConfigForm::new(&app.credentials));
        }
        app
    }

    /// Commands to issue before the first event arrives.
    pub fn init(&mut self) -> Option<Command> {
        match self.screen {
            Screen::Browser => Some(self.load_current(None)),
            _ => None,
        }
    }

    fn install_credentials(&mut self, credentials: Credentials) -> Result<(), ClientError> {
        if credentials.is_complete() {
            self.client = Some(Arc::new(MinimaxClient::new(credentials.clone())?));
        } else {
            self.client = None;
        }
        self.credentials = credentials;
        Ok(())
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn is_busy(&self) -> bool {
        self.browser.loading || matches!(self.screen, Screen::Cloning(_) | Screen::Exporting)
    }

    pub fn ui_state(&self) -> ui::UiState<'_> {
        ui::UiState {
            screen: &self.screen,
            browser: &self.browser,
            selection: &self.selection,
            status: &self.status,
            error: self.error.as_deref(),
            home: self.home.as_deref(),
            spinner: self.spinner,
            last_export: self.last_export.as_deref(),
            result_count: self.results.len(),
        }
    }

    /// Single point of mutation: applies one event and names the follow-up work.
    pub fn handle(&mut self, event: AppEvent) -> Option<Command> {
        match event {
            AppEvent::Input(Event::Key(key)) => self.handle_key(key),
            AppEvent::Input(Event::Resize(width, height)) => {
                self.size = (width, height);
                None
            }
            AppEvent::Input(_) => None,
            AppEvent::Tick => {
                if self.is_busy() {
                    self.spinner = self.spinner.wrapping_add(1);
                }
                None
            }
            AppEvent::DirListed { id, outcome } => {
                self.apply_listing(id, outcome);
                None
            }
            AppEvent::JobFinished(report) => self.absorb_job(report),
            AppEvent::ExportFinished { origin, result } => {
                self.finish_export(origin, result);
                None
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<Command> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            info!(state = self.screen.name(), "quit requested");
            return Some(Command::Quit);
        }
        match self.screen {
            Screen::Config(_) => self.config_key(key),
            Screen::Browser => self.browser_key(key),
            Screen::Confirm { .. } => self.confirm_key(key),
            Screen::Summary(_) => self.summary_key(key),
            Screen::Cloning(_) | Screen::Exporting => None,
        }
    }

    fn config_key(&mut self, key: KeyEvent) -> Option<Command> {
        let Screen::Config(form) = &mut self.screen else {
            return None;
        };
        match key.code {
            KeyCode::Esc => {
                if !self.credentials.is_complete() || self.client.is_none() {
                    form.error = Some("enter both the API key and the group id first".to_string());
                    return None;
                }
                self.screen = Screen::Browser;
                Some(self.load_current(None))
            }
            KeyCode::Tab | KeyCode::Down => {
                form.focus_next();
                None
            }
            KeyCode::BackTab | KeyCode::Up => {
                form.focus_prev();
                None
            }
            KeyCode::Enter if form.on_last_field() => self.save_config(),
            KeyCode::Enter => {
                form.focus_next();
                None
            }
            KeyCode::Backspace => {
                form.focused_mut().pop();
                None
            }
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                form.focused_mut().push(ch);
                None
            }
            _ => None,
        }
    }

    fn save_config(&mut self) -> Option<Command> {
        let Screen::Config(form) = &mut self.screen else {
            return None;
        };
        let credentials = form.credentials();
        if !credentials.is_complete() {
            form.error = Some("enter both the API key and the group id".to_string());
            return None;
        }
        if let Err(err) = credentials.save(&self.paths.config_file) {
            error!(error = %err, "saving credentials failed");
            form.error = Some(format!("could not save credentials: {err}"));
            return None;
        }
        if let Err(err) = self.install_credentials(credentials) {
            error!(error = %err, "building the MiniMax client failed");
            if let Screen::Config(form) = &mut self.screen {
                form.error = Some(format!("could not build the MiniMax client: {err}"));
            }
            return None;
        }
        info!("credentials updated");
        self.screen = Screen::Browser;
        self.status = "credentials saved".to_string();
        self.error = None;
        Some(self.load_current(None))
    }

    fn browser_key(&mut self, key: KeyEvent) -> Option<Command> {
        let page = self.page_size() as isize;
        match key.code {
            KeyCode::Char('q') => return Some(Command::Quit),
            KeyCode::Char('c') => self.open_confirm(),
            KeyCode::Char('C') => {
                self.error = None;
                self.screen = Screen::Config(ConfigForm::new(&self.credentials));
            }
            KeyCode::Char('e') => return self.start_manual_export(),
            KeyCode::Char(' ') | KeyCode::Char('x') => self.toggle_selected(),
            KeyCode::Up | KeyCode::Char('k') => self.browser.move_by(-1),
            KeyCode::Down | KeyCode::Char('j') => self.browser.move_by(1),
            KeyCode::PageUp => self.browser.move_by(-page),
            KeyCode::PageDown => self.browser.move_by(page),
            KeyCode::Home | KeyCode::Char('g') => self.browser.cursor = 0,
            KeyCode::End | KeyCode::Char('G') => self.browser.move_by(isize::MAX),
            KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => return self.enter_selected(),
            KeyCode::Left | KeyCode::Char('h') | KeyCode::Backspace => return self.go_parent(),
            _ => {}
        }
        None
    }

    fn page_size(&self) -> usize {
        usize::from(self.size.1.saturating_sub(CHROME_ROWS)).max(1)
    }

    fn open_confirm(&mut self) {
        if self.selection.is_empty() {
            self.error = Some("select at least one file first".to_string());
            return;
        }
        let mut paths = self.selection.ordered_paths();
        paths.sort();
        self.error = None;
        self.screen = Screen::Confirm { paths };
    }

    fn toggle_selected(&mut self) {
        let Some(entry) = self.browser.selected_entry() else {
            return;
        };
        match self.selection.toggle(entry) {
            Ok(Toggle::Added) | Ok(Toggle::Removed) => self.error = None,
            Ok(Toggle::Ignored) => {}
            Err(err) => self.error = Some(err.to_string()),
        }
    }

    fn enter_selected(&mut self) -> Option<Command> {
        let entry = self.browser.selected_entry()?;
        if !entry.is_dir {
            return None;
        }
        let path = entry.path.clone();
        if entry.is_parent {
            self.browser.pending_selection = Some(self.browser.dir.clone());
        }
        Some(self.browser.request(path, None))
    }

    fn go_parent(&mut self) -> Option<Command> {
        let parent = self.browser.dir.parent()?.to_path_buf();
        if parent == self.browser.dir {
            return None;
        }
        self.browser.pending_selection = Some(self.browser.dir.clone());
        Some(self.browser.request(parent, None))
    }

    fn load_current(&mut self, unless_modified: Option<SystemTime>) -> Command {
        let dir = self.browser.dir.clone();
        self.browser.request(dir, unless_modified)
    }

    fn apply_listing(&mut self, id: u64, outcome: DirOutcome) {
        if id != self.browser.listing_id {
            return;
        }
        self.browser.loading = false;
        match outcome {
            DirOutcome::Loaded(listing) => {
                self.browser.apply(listing);
                self.error = None;
            }
            DirOutcome::Unchanged => {
                self.browser.pending_selection = None;
            }
            DirOutcome::Failed(err) => {
                warn!(error = %err, "directory listing failed");
                self.browser.pending_selection = None;
                self.error = Some(err.to_string());
            }
        }
    }

    fn confirm_key(&mut self, key: KeyEvent) -> Option<Command> {
        match key.code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => self.start_run(),
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.screen = Screen::Browser;
                None
            }
            _ => None,
        }
    }

    fn start_run(&mut self) -> Option<Command> {
        let Some(client) = self.client.clone() else {
            self.screen = Screen::Config(ConfigForm::new(&self.credentials));
            return None;
        };
        let queue = self.selection.ordered_paths();
        info!(jobs = queue.len(), "clone run started");
        self.results.clear();
        self.last_export = None;
        self.error = None;
        self.status = "cloning...".to_string();

        let mut run = CloneRun::new(queue);
        let step = run.start();
        self.screen = Screen::Cloning(run);
        Some(self.next_step(client, step))
    }

    fn next_step(&mut self, client: Arc<MinimaxClient>, step: RunStep) -> Command {
        match step {
            RunStep::Next(path) => Command::RunJob { client, path },
            RunStep::Finished(counters) => {
                info!(
                    succeeded = counters.succeeded,
                    failed = counters.failed,
                    "clone run finished"
                );
                self.status = "exporting results...".to_string();
                Command::Export {
                    origin: ExportOrigin::Automatic,
                    records: self.results.clone(),
                    dir: self.paths.exports_dir.clone(),
                }
            }
        }
    }

    fn absorb_job(&mut self, report: JobReport) -> Option<Command> {
        let Screen::Cloning(run) = &mut self.screen else {
            warn!(file = %report.path.display(), "job finished outside of a run");
            return None;
        };
        let (record, step) = run.absorb(report)?;
        self.results.push(record);
        let client = self.client.clone()?;
        Some(self.next_step(client, step))
    }

    fn finish_export(&mut self, origin: ExportOrigin, result: Result<PathBuf, ExportError>) {
        match origin {
            ExportOrigin::Automatic => self.finish_run(result),
            ExportOrigin::Manual => {
                if matches!(self.screen, Screen::Exporting) {
                    self.screen = Screen::Browser;
                }
                match result {
                    Ok(path) => {
                        info!(path = %path.display(), "results exported");
                        self.status = format!("exported to {}", path.display());
                        self.error = None;
                        self.last_export = Some(path);
                    }
                    Err(err) => {
                        error!(error = %err, "manual export failed");
                        self.status = BROWSER_HELP.to_string();
                        self.error = Some(format!("export failed: {err}"));
                    }
                }
            }
        }
    }

    fn finish_run(&mut self, result: Result<PathBuf, ExportError>) {
        if !matches!(self.screen, Screen::Cloning(_)) {
            warn!("automatic export finished outside of a run");
            return;
        }
        let Screen::Cloning(run) = mem::replace(&mut self.screen, Screen::Browser) else {
            return;
        };
        let counters = run.counters();
        let total = run.total();
        let mut log = run.into_log();
        let at = export::now();
        let export = match result {
            Ok(path) => {
                log.push(at, &format!("✓ results exported to {}", path.display()));
                self.status = format!(
                    "done: {} succeeded · {} failed · csv: {} (q to return)",
                    counters.succeeded,
                    counters.failed,
                    path.display()
                );
                self.last_export = Some(path.clone());
                Ok(path)
            }
            Err(err) => {
                error!(error = %err, "automatic export failed");
                log.push(at, &format!("✗ automatic export failed: {err}"));
                self.status = format!(
                    "done: {} succeeded · {} failed · export failed (q to return)",
                    counters.succeeded, counters.failed
                );
                Err(err.to_string())
            }
        };
        self.selection.clear();
        self.error = None;
        self.screen = Screen::Summary(RunSummary {
            counters,
            total,
            log,
            export,
        });
    }

    fn summary_key(&mut self, key: KeyEvent) -> Option<Command> {
        let page = self.page_size();
        let Screen::Summary(summary) = &mut self.screen else {
            return None;
        };
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc | KeyCode::Enter => {
                self.screen = Screen::Browser;
                self.status = BROWSER_HELP.to_string();
                self.error = None;
                let since = self.browser.modified;
                Some(self.load_current(since))
            }
            KeyCode::Up | KeyCode::Char('k') => {
                summary.log.scroll_up(1);
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                summary.log.scroll_down(1);
                None
            }
            KeyCode::PageUp => {
                summary.log.scroll_up(page);
                None
            }
            KeyCode::PageDown => {
                summary.log.scroll_down(page);
                None
            }
            _ => None,
        }
    }

    fn start_manual_export(&mut self) -> Option<Command> {
        if self.results.is_empty() {
            self.error = Some("no clone results to export yet".to_string());
            return None;
        }
        self.screen = Screen::Exporting;
        self.error = None;
        Some(Command::Export {
            origin: ExportOrigin::Manual,
            records: self.results.clone(),
            dir: self.paths.exports_dir.clone(),
        })
    }
}
