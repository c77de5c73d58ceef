use crate::app::{BrowserState, RunSummary, Screen};
use crate::core::DirectoryEntry;
use crate::form::{ConfigForm, InputField};
use crate::log_view::LogBuffer;
use crate::pipeline::CloneRun;
use crate::selection::{self, SelectionSet};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use std::path::{Path, PathBuf};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub struct UiState<'a> {
    pub screen: &'a Screen,
    pub browser: &'a BrowserState,
    pub selection: &'a SelectionSet,
    pub status: &'a str,
    pub error: Option<&'a str>,
    pub home: Option<&'a Path>,
    pub spinner: usize,
    pub last_export: Option<&'a Path>,
    pub result_count: usize,
}

struct Theme {
    base: Style,
    accent: Style,
    muted: Style,
    selection: Style,
    success: Style,
    warning: Style,
}

impl Theme {
    fn new() -> Self {
        Self {
            base: Style::default().fg(Color::Gray),
            accent: Style::default().fg(Color::Cyan),
            muted: Style::default().fg(Color::DarkGray),
            selection: Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            success: Style::default().fg(Color::Green),
            warning: Style::default().fg(Color::Red),
        }
    }

    fn block<'a>(&self, title: impl Into<Line<'a>>) -> Block<'a> {
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .style(self.base)
            .border_style(self.accent)
            .title_style(self.accent)
    }
}

pub fn render(frame: &mut Frame, state: UiState<'_>) {
    let theme = Theme::new();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let mut header = vec![
        Span::styled(" minimax-voice ", theme.selection),
        Span::styled(format!(" {}", state.screen.name()), theme.muted),
    ];
    if matches!(state.screen, Screen::Browser | Screen::Confirm { .. }) {
        header.push(Span::styled(
            format!("  {}", selection::requirements()),
            theme.muted,
        ));
    }
    let header = Line::from(header);
    frame.render_widget(Paragraph::new(header), layout[0]);

    match state.screen {
        Screen::Config(form) => render_config(frame, layout[1], &theme, form),
        Screen::Browser => render_browser(frame, layout[1], &theme, &state),
        Screen::Confirm { paths } => {
            render_browser(frame, layout[1], &theme, &state);
            render_confirm(frame, layout[1], &theme, &state, paths);
        }
        Screen::Cloning(run) => render_cloning(frame, layout[1], &theme, &state, run),
        Screen::Summary(summary) => render_summary(frame, layout[1], &theme, &state, summary),
        Screen::Exporting => {
            render_browser(frame, layout[1], &theme, &state);
            let area = centered(layout[1], 50, 3);
            frame.render_widget(Clear, area);
            let text = format!(
                "{} exporting {} results...",
                spinner(state.spinner),
                state.result_count
            );
            frame.render_widget(Paragraph::new(text).block(theme.block("Export")), area);
        }
    }

    let width = usize::from(layout[2].width);
    frame.render_widget(
        Paragraph::new(truncate_left(state.status, width)).style(theme.muted),
        layout[2],
    );
    if let Some(error) = state.error {
        frame.render_widget(
            Paragraph::new(truncate_left(error, width)).style(theme.warning),
            layout[3],
        );
    } else if let Some(path) = state.last_export {
        let text = format!("last export: {}", display_path(path, state.home));
        frame.render_widget(
            Paragraph::new(truncate_left(&text, width)).style(theme.muted),
            layout[3],
        );
    }
}

fn render_config(frame: &mut Frame, area: Rect, theme: &Theme, form: &ConfigForm) {
    let area = centered(area, 64, 12);
    frame.render_widget(Clear, area);
    let outer = theme.block("MiniMax credentials");
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(inner);

    for (index, field) in form.fields.iter().enumerate() {
        let focused = index == form.focus;
        render_field(frame, rows[index], theme, field, focused);
    }

    if let Some(error) = &form.error {
        frame.render_widget(Paragraph::new(error.as_str()).style(theme.warning), rows[2]);
    }
    frame.render_widget(
        Paragraph::new("tab switch field · enter next/save · esc cancel").style(theme.muted),
        rows[3],
    );
}

fn render_field(frame: &mut Frame, area: Rect, theme: &Theme, field: &InputField, focused: bool) {
    let border = if focused { theme.accent } else { theme.muted };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(field.label)
        .border_style(border)
        .title_style(border);
    let inner = block.inner(area);
    let shown = field.display();
    let width = usize::from(inner.width.saturating_sub(1));
    let visible = truncate_left(&shown, width);
    if focused {
        let x = inner.x + visible.width().min(width) as u16;
        frame.set_cursor_position((x, inner.y));
    }
    frame.render_widget(Paragraph::new(visible).block(block), area);
}

fn render_browser(frame: &mut Frame, area: Rect, theme: &Theme, state: &UiState<'_>) {
    let areas = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(area);

    let title_width = usize::from(areas[0].width.saturating_sub(4));
    let mut title = truncate_left(&display_path(&state.browser.dir, state.home), title_width);
    if state.browser.is_loading() {
        title = format!("{} {title}", spinner(state.spinner));
    }
    let items: Vec<ListItem> = state
        .browser
        .entries
        .iter()
        .map(|entry| entry_item(theme, entry, state.selection))
        .collect();
    let list = List::new(items)
        .block(theme.block(title))
        .highlight_style(theme.selection)
        .highlight_symbol("> ");
    let mut list_state = ListState::default();
    if !state.browser.entries.is_empty() {
        list_state.select(Some(state.browser.cursor));
    }
    frame.render_stateful_widget(list, areas[0], &mut list_state);

    let width = usize::from(areas[1].width.saturating_sub(2));
    let selected: Vec<ListItem> = state
        .selection
        .iter()
        .map(|path| ListItem::new(truncate_left(&display_path(path, state.home), width)))
        .collect();
    let panel = List::new(selected).block(theme.block(format!("Selected ({})", state.selection.len())));
    frame.render_widget(panel, areas[1]);
}

fn entry_item(theme: &Theme, entry: &DirectoryEntry, selection: &SelectionSet) -> ListItem<'static> {
    if entry.is_dir {
        return ListItem::new(format!("    {}", entry.label())).style(theme.accent);
    }
    if selection.is_selected(&entry.path) {
        return ListItem::new(format!("[x] {}", entry.label())).style(theme.success);
    }
    if selection::is_allowed(&entry.path) {
        ListItem::new(format!("[ ] {}", entry.label()))
    } else {
        ListItem::new(format!("    {}", entry.label())).style(theme.muted)
    }
}

fn render_confirm(
    frame: &mut Frame,
    area: Rect,
    theme: &Theme,
    state: &UiState<'_>,
    paths: &[PathBuf],
) {
    let height = (paths.len() as u16).saturating_add(4).min(area.height);
    let area = centered(area, 70, height);
    frame.render_widget(Clear, area);
    let width = usize::from(area.width.saturating_sub(4));
    let mut lines: Vec<Line> = paths
        .iter()
        .map(|path| Line::from(format!("  {}", truncate_left(&display_path(path, state.home), width))))
        .collect();
    lines.push(Line::default());
    lines.push(Line::styled("enter/y start · esc/n back", theme.muted));
    let title = format!("Clone {} file(s)?", paths.len());
    frame.render_widget(Paragraph::new(lines).block(theme.block(title)), area);
}

fn render_cloning(
    frame: &mut Frame,
    area: Rect,
    theme: &Theme,
    state: &UiState<'_>,
    run: &CloneRun,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(area);

    let counters = run.counters();
    let total = run.total().max(1);
    let ratio = counters.completed() as f64 / total as f64;
    let label = match run.in_flight() {
        Some(path) => format!(
            "{} {}/{} {}",
            spinner(state.spinner),
            counters.completed() + 1,
            run.total(),
            path.file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default()
        ),
        None => format!("{} exporting results...", spinner(state.spinner)),
    };
    let gauge = Gauge::default()
        .block(theme.block(format!(
            "Cloning · {} ok · {} failed",
            counters.succeeded, counters.failed
        )))
        .gauge_style(theme.accent)
        .ratio(ratio.clamp(0.0, 1.0))
        .label(label);
    frame.render_widget(gauge, rows[0]);

    render_log(frame, rows[1], theme, "Log", run.log());
}

fn render_summary(
    frame: &mut Frame,
    area: Rect,
    theme: &Theme,
    state: &UiState<'_>,
    summary: &RunSummary,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(3)])
        .split(area);

    let export = match &summary.export {
        Ok(path) => Line::styled(
            format!("csv: {}", display_path(path, state.home)),
            theme.success,
        ),
        Err(err) => Line::styled(format!("export failed: {err}"), theme.warning),
    };
    let lines = vec![
        Line::from(vec![
            Span::styled(format!("{} succeeded", summary.counters.succeeded), theme.success),
            Span::raw(" · "),
            Span::styled(format!("{} failed", summary.counters.failed), theme.warning),
            Span::raw(format!(" · {} total", summary.total)),
        ]),
        export,
        Line::styled("q/esc/enter return · ↑/↓ scroll log", theme.muted),
    ];
    frame.render_widget(
        Paragraph::new(lines)
            .block(theme.block("Summary"))
            .wrap(Wrap { trim: false }),
        rows[0],
    );

    render_log(frame, rows[1], theme, "Log", &summary.log);
}

fn render_log(frame: &mut Frame, area: Rect, theme: &Theme, title: &str, log: &LogBuffer) {
    let mut title = format!("{title} ({})", log.len());
    if !log.is_following() {
        title.push_str(" · scrolled");
    }
    let block = theme.block(title);
    let height = usize::from(block.inner(area).height);
    if log.is_empty() {
        let waiting = Paragraph::new("waiting for the first job...").style(theme.muted);
        frame.render_widget(waiting.block(block), area);
        return;
    }
    let lines: Vec<Line> = log
        .visible(height)
        .iter()
        .map(|line| {
            let style = if line.contains('✗') {
                theme.warning
            } else if line.contains('✓') {
                theme.success
            } else {
                theme.base
            };
            Line::styled(line.clone(), style)
        })
        .collect();
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn spinner(frame: usize) -> &'static str {
    SPINNER[frame % SPINNER.len()]
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    }
}

/// Shows `path` with the home directory abbreviated to `~`.
pub fn display_path(path: &Path, home: Option<&Path>) -> String {
    if let Some(home) = home {
        if let Ok(rest) = path.strip_prefix(home) {
            if rest.as_os_str().is_empty() {
                return "~".to_string();
            }
            return format!("~/{}", rest.display());
        }
    }
    path.display().to_string()
}

/// Keeps the tail of `text` within `width` columns, marking the cut with `…`.
pub fn truncate_left(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let budget = width - 1;
    let mut used = 0;
    let mut tail = Vec::new();
    for ch in text.chars().rev() {
        let ch_width = ch.width().unwrap_or(0);
        if used + ch_width > budget {
            break;
        }
        used += ch_width;
        tail.push(ch);
    }
    let mut out = String::from("…");
    out.extend(tail.into_iter().rev());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_is_abbreviated() {
        let home = PathBuf::from("/home/ana");
        assert_eq!(
            display_path(Path::new("/home/ana/music/a.mp3"), Some(&home)),
            "~/music/a.mp3"
        );
        assert_eq!(display_path(Path::new("/home/ana"), Some(&home)), "~");
        assert_eq!(display_path(Path::new("/srv/a.mp3"), Some(&home)), "/srv/a.mp3");
        assert_eq!(display_path(Path::new("/srv"), None), "/srv");
    }

    #[test]
    fn long_text_keeps_its_tail() {
        assert_eq!(truncate_left("/a/b/c.mp3", 20), "/a/b/c.mp3");
        assert_eq!(truncate_left("/a/b/c.mp3", 6), "…c.mp3");
        assert_eq!(truncate_left("abc", 0), "");
    }

    #[test]
    fn wide_characters_count_as_two_columns() {
        let cut = truncate_left("录音/声音.wav", 7);
        assert!(cut.width() <= 7);
        assert!(cut.ends_with(".wav"));
    }

    #[test]
    fn centered_rect_fits_inside_area() {
        let area = Rect::new(0, 0, 20, 10);
        let inner = centered(area, 64, 4);
        assert_eq!(inner.width, 20);
        assert_eq!(inner.y, 3);
    }
}
