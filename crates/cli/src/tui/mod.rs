//! Interactive pipeline grid.
//!
//! Cursor over a grid of cells; committing an edit (Enter) regenerates the
//! cell's direct dependents, which chain onward depth-first. Chains run on
//! a worker thread and stream cell transitions back over a channel, so the
//! interface keeps accepting input while a generation is in flight.
//!
//! There is no guard against re-triggering a cell whose generation is
//! already running: last write wins.

use std::io::stdout;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame, Terminal,
};

use promptgrid_config::settings::{Provider, Settings};
use promptgrid_engine::cell::CellStatus;
use promptgrid_engine::column::ColumnId;
use promptgrid_engine::executor::{CellUpdate, ChainExecutor, ChainReport, Generator};
use promptgrid_engine::grid::{Grid, GridError, RowId};

use crate::run::build_generator;
use crate::util;

const CELL_WIDTH: usize = 18;
const GUTTER_WIDTH: usize = 4;

/// Messages streamed back from a chain worker.
enum WorkerMsg {
    Update(CellUpdate),
    Done(ChainReport),
}

struct SettingsForm {
    draft: Settings,
    /// 0 provider, 1 local endpoint, 2 local model, 3 hosted model
    field: usize,
}

impl SettingsForm {
    const FIELDS: usize = 4;

    fn new(settings: &Settings) -> Self {
        Self {
            draft: settings.clone(),
            field: 0,
        }
    }

    fn buffer_mut(&mut self) -> Option<&mut String> {
        match self.field {
            1 => Some(self.draft.local_endpoint.get_or_insert_with(String::new)),
            2 => Some(&mut self.draft.local_model),
            3 => Some(&mut self.draft.hosted_model),
            _ => None,
        }
    }

    fn toggle_provider(&mut self) {
        self.draft.provider = match self.draft.provider {
            Provider::Local => Provider::Hosted,
            Provider::Hosted => Provider::Local,
        };
    }
}

enum Mode {
    Normal,
    EditCell { buffer: String },
    EditPrompt { col: ColumnId, buffer: String },
    Settings(SettingsForm),
    Help,
}

struct TuiApp {
    grid: Grid,
    settings: Settings,
    generator: Option<Arc<dyn Generator + Send + Sync>>,
    workers: Vec<Receiver<WorkerMsg>>,
    mode: Mode,
    cursor_row: usize,
    cursor_col: usize,
    scroll_row: usize,
    scroll_col: usize,
    title: String,
    status_message: Option<String>,
    last_report: Option<String>,
    should_quit: bool,
}

impl TuiApp {
    fn new(grid: Grid, settings: Settings, title: String) -> Self {
        let mut status_message = None;
        let generator = match build_generator(&settings) {
            Ok(boxed) => Some(Arc::from(boxed)),
            Err(err) => {
                status_message = Some(format!("{} — press s for settings", err.message));
                None
            }
        };
        Self {
            grid,
            settings,
            generator,
            workers: Vec::new(),
            mode: Mode::Normal,
            cursor_row: 0,
            cursor_col: 0,
            scroll_row: 0,
            scroll_col: 0,
            title,
            status_message,
            last_report: None,
            should_quit: false,
        }
    }

    fn rebuild_generator(&mut self) {
        match build_generator(&self.settings) {
            Ok(boxed) => {
                self.generator = Some(Arc::from(boxed));
            }
            Err(err) => {
                self.generator = None;
                self.status_message = Some(err.message);
            }
        }
    }

    /// Row and column ids under the cursor, if the grid has any rows.
    fn cursor_ids(&self) -> Option<(RowId, ColumnId)> {
        let row = self.grid.rows().get(self.cursor_row)?.id;
        let col = self.grid.columns().get(self.cursor_col)?.id;
        Some((row, col))
    }

    // ── Chain workers ───────────────────────────────────────────────

    /// Run `targets` for one row on a worker thread, sequentially, feeding
    /// updates back through a channel.
    fn spawn_chain(&mut self, row: RowId, targets: Vec<ColumnId>, direct_input: Option<String>) {
        if targets.is_empty() {
            return;
        }
        let Some(generator) = self.generator.clone() else {
            self.status_message =
                Some("provider not configured — press s for settings".to_string());
            return;
        };
        let Some(ctx) = self.grid.chain_context(row) else {
            return;
        };

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let executor = ChainExecutor::new(generator.as_ref());
            let mut report = ChainReport::new();
            for target in targets {
                let run = executor.run(&ctx, target, direct_input.as_deref(), &mut |update| {
                    let _ = tx.send(WorkerMsg::Update(update));
                });
                report.merge(run);
            }
            let _ = tx.send(WorkerMsg::Done(report));
        });
        self.workers.push(rx);
    }

    /// Apply everything the workers have produced so far.
    fn drain_workers(&mut self) {
        let mut workers = std::mem::take(&mut self.workers);
        workers.retain(|rx| loop {
            match rx.try_recv() {
                Ok(WorkerMsg::Update(update)) => self.grid.apply_update(&update),
                Ok(WorkerMsg::Done(report)) => self.last_report = Some(report.log_line()),
                Err(TryRecvError::Empty) => break true,
                Err(TryRecvError::Disconnected) => break false,
            }
        });
        self.workers = workers;
    }

    // ── Cell actions ────────────────────────────────────────────────

    fn begin_edit(&mut self) {
        let Some((row, col)) = self.cursor_ids() else {
            self.status_message = Some("no rows — press r to add one".to_string());
            return;
        };
        let buffer = self
            .grid
            .cell(row, col)
            .map(|c| c.value.clone())
            .unwrap_or_default();
        self.mode = Mode::EditCell { buffer };
    }

    /// Commit point: the edit lands, then each direct dependent regenerates
    /// from the committed text.
    fn commit_cell(&mut self, text: String) {
        let Some((row, col)) = self.cursor_ids() else {
            return;
        };
        if self.grid.edit_cell(row, col, &text).is_err() {
            return;
        }
        let targets = self.grid.dependents_of(col);
        self.spawn_chain(row, targets, Some(text));
    }

    fn regenerate_cell(&mut self) {
        let Some((row, col)) = self.cursor_ids() else {
            return;
        };
        self.spawn_chain(row, vec![col], None);
    }

    // ── Structural actions ──────────────────────────────────────────

    fn add_row(&mut self) {
        self.grid.add_row();
        self.cursor_row = self.grid.rows().len() - 1;
    }

    fn remove_row(&mut self) {
        let Some((row, _)) = self.cursor_ids() else {
            return;
        };
        let _ = self.grid.remove_row(row);
        self.clamp_cursor();
    }

    fn add_column(&mut self) {
        let label = format!("Step {}", self.grid.columns().len() + 1);
        let id = self.grid.add_column(label, "");
        self.cursor_col = self.grid.columns().len() - 1;
        // A column without a prompt can't generate; edit it right away
        self.mode = Mode::EditPrompt {
            col: id,
            buffer: String::new(),
        };
    }

    fn remove_column(&mut self) {
        let Some(header) = self.grid.columns().get(self.cursor_col) else {
            return;
        };
        let id = header.id;
        let label = header.label.clone();
        let dependents = self.grid.dependent_count(id);
        match self.grid.remove_column(id) {
            Ok(()) => {
                self.status_message = Some(if dependents > 0 {
                    format!(
                        "removed \"{}\" — {} dependent column(s) now dangling",
                        label, dependents
                    )
                } else {
                    format!("removed \"{}\"", label)
                });
                self.clamp_cursor();
            }
            Err(GridError::EntryColumn) => {
                self.status_message = Some("the entry column cannot be removed".to_string());
            }
            Err(err) => {
                self.status_message = Some(err.to_string());
            }
        }
    }

    fn edit_prompt(&mut self) {
        let Some(header) = self.grid.columns().get(self.cursor_col) else {
            return;
        };
        if header.is_entry {
            self.status_message = Some("the entry column has no prompt".to_string());
            return;
        }
        self.mode = Mode::EditPrompt {
            col: header.id,
            buffer: header.prompt.clone(),
        };
    }

    fn clamp_cursor(&mut self) {
        if self.cursor_row >= self.grid.rows().len() {
            self.cursor_row = self.grid.rows().len().saturating_sub(1);
        }
        if self.cursor_col >= self.grid.columns().len() {
            self.cursor_col = self.grid.columns().len().saturating_sub(1);
        }
    }

    // ── Key handling ────────────────────────────────────────────────

    fn handle_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }
        match self.mode {
            Mode::Help => {
                // Any key dismisses help
                self.mode = Mode::Normal;
            }
            Mode::Normal => self.handle_key_normal(key),
            Mode::EditCell { .. } => self.handle_key_edit_cell(key),
            Mode::EditPrompt { .. } => self.handle_key_edit_prompt(key),
            Mode::Settings(_) => self.handle_key_settings(key),
        }
    }

    fn handle_key_normal(&mut self, key: KeyEvent) {
        self.status_message = None;
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('?') => self.mode = Mode::Help,
            KeyCode::Up | KeyCode::Char('k') => self.move_cursor(-1, 0),
            KeyCode::Down | KeyCode::Char('j') => self.move_cursor(1, 0),
            KeyCode::Left | KeyCode::Char('h') => self.move_cursor(0, -1),
            KeyCode::Right | KeyCode::Char('l') => self.move_cursor(0, 1),
            KeyCode::Tab => self.move_cursor(0, 1),
            KeyCode::BackTab => self.move_cursor(0, -1),
            KeyCode::Home => self.cursor_col = 0,
            KeyCode::End => {
                self.cursor_col = self.grid.columns().len().saturating_sub(1);
            }
            KeyCode::Enter | KeyCode::Char('i') => self.begin_edit(),
            KeyCode::Char('g') => self.regenerate_cell(),
            KeyCode::Char('r') => self.add_row(),
            KeyCode::Char('x') => self.remove_row(),
            KeyCode::Char('a') => self.add_column(),
            KeyCode::Char('D') => self.remove_column(),
            KeyCode::Char('p') => self.edit_prompt(),
            KeyCode::Char('s') => self.mode = Mode::Settings(SettingsForm::new(&self.settings)),
            _ => {}
        }
    }

    fn handle_key_edit_cell(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.mode = Mode::Normal,
            KeyCode::Enter => {
                if let Mode::EditCell { buffer } = std::mem::replace(&mut self.mode, Mode::Normal)
                {
                    self.commit_cell(buffer);
                }
            }
            KeyCode::Backspace => {
                if let Mode::EditCell { buffer } = &mut self.mode {
                    buffer.pop();
                }
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                if let Mode::EditCell { buffer } = &mut self.mode {
                    buffer.push(c);
                }
            }
            _ => {}
        }
    }

    fn handle_key_edit_prompt(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.mode = Mode::Normal,
            KeyCode::Enter => {
                if let Mode::EditPrompt { col, buffer } =
                    std::mem::replace(&mut self.mode, Mode::Normal)
                {
                    let _ = self.grid.set_column_prompt(col, buffer);
                }
            }
            KeyCode::Backspace => {
                if let Mode::EditPrompt { buffer, .. } = &mut self.mode {
                    buffer.pop();
                }
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                if let Mode::EditPrompt { buffer, .. } = &mut self.mode {
                    buffer.push(c);
                }
            }
            _ => {}
        }
    }

    fn handle_key_settings(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.mode = Mode::Normal;
                return;
            }
            KeyCode::Enter => {
                if let Mode::Settings(form) = std::mem::replace(&mut self.mode, Mode::Normal) {
                    // One atomic replace of the settings object
                    self.settings = form.draft;
                    match self.settings.save() {
                        Ok(()) => {
                            self.status_message = Some("settings saved".to_string());
                        }
                        Err(err) => {
                            self.status_message = Some(format!("settings not saved: {}", err));
                        }
                    }
                    self.rebuild_generator();
                }
                return;
            }
            _ => {}
        }

        let Mode::Settings(form) = &mut self.mode else {
            return;
        };
        match key.code {
            KeyCode::Tab | KeyCode::Down => form.field = (form.field + 1) % SettingsForm::FIELDS,
            KeyCode::BackTab | KeyCode::Up => {
                form.field = (form.field + SettingsForm::FIELDS - 1) % SettingsForm::FIELDS
            }
            KeyCode::Left | KeyCode::Right | KeyCode::Char(' ') if form.field == 0 => {
                form.toggle_provider()
            }
            KeyCode::Backspace => {
                if let Some(buffer) = form.buffer_mut() {
                    buffer.pop();
                }
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                if let Some(buffer) = form.buffer_mut() {
                    buffer.push(c);
                }
            }
            _ => {}
        }
    }

    fn move_cursor(&mut self, drow: i32, dcol: i32) {
        let rows = self.grid.rows().len();
        let cols = self.grid.columns().len();
        if rows == 0 || cols == 0 {
            return;
        }
        self.cursor_row = (self.cursor_row as i32 + drow).max(0).min(rows as i32 - 1) as usize;
        self.cursor_col = (self.cursor_col as i32 + dcol).max(0).min(cols as i32 - 1) as usize;
    }

    fn ensure_visible(&mut self, visible_rows: usize, area_width: u16) {
        if self.cursor_row < self.scroll_row {
            self.scroll_row = self.cursor_row;
        }
        if visible_rows > 0 && self.cursor_row >= self.scroll_row + visible_rows {
            self.scroll_row = self.cursor_row - visible_rows + 1;
        }

        let visible_cols = Self::visible_col_count(area_width);
        if self.cursor_col < self.scroll_col {
            self.scroll_col = self.cursor_col;
        }
        if visible_cols > 0 && self.cursor_col >= self.scroll_col + visible_cols {
            self.scroll_col = self.cursor_col - visible_cols + 1;
        }
    }

    fn visible_col_count(area_width: u16) -> usize {
        (area_width as usize)
            .saturating_sub(GUTTER_WIDTH + 1)
            .checked_div(CELL_WIDTH + 1)
            .unwrap_or(0)
            .max(1)
    }

    // ── Drawing ─────────────────────────────────────────────────────

    fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        let chunks = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(area);

        self.draw_title(frame, chunks[0]);
        self.draw_grid(frame, chunks[1]);
        self.draw_status(frame, chunks[2]);
        self.draw_hints(frame, chunks[3]);

        match &self.mode {
            Mode::Help => self.draw_help(frame, area),
            Mode::EditPrompt { col, buffer } => self.draw_prompt_editor(frame, area, *col, buffer),
            Mode::Settings(form) => self.draw_settings(frame, area, form),
            _ => {}
        }
    }

    fn draw_title(&self, frame: &mut Frame, area: Rect) {
        let running = if self.workers.is_empty() {
            String::new()
        } else {
            format!(" | {} chain(s) running", self.workers.len())
        };
        let title = format!(
            " pgrid: {} | {} rows x {} cols | provider: {}{} ",
            self.title,
            self.grid.rows().len(),
            self.grid.columns().len(),
            self.settings.provider.name(),
            running,
        );
        let para = Paragraph::new(Line::from(vec![Span::styled(
            title,
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )]))
        .style(Style::default().bg(Color::Cyan));
        frame.render_widget(para, area);
    }

    fn status_style(status: CellStatus) -> Style {
        match status {
            CellStatus::Idle => Style::default().fg(Color::Gray),
            CellStatus::Pending => Style::default().fg(Color::Yellow),
            CellStatus::Succeeded => Style::default().fg(Color::Green),
            CellStatus::Failed => Style::default().fg(Color::Red),
        }
    }

    fn draw_grid(&self, frame: &mut Frame, area: Rect) {
        let columns = self.grid.columns();
        let rows = self.grid.rows();

        let visible_cols = Self::visible_col_count(area.width);
        let col_end = (self.scroll_col + visible_cols).min(columns.len());
        let vis_cols = self.scroll_col..col_end;

        // Header line
        let gutter_blank = " ".repeat(GUTTER_WIDTH);
        let mut header_spans = vec![Span::styled(
            format!("{} ", gutter_blank),
            Style::default().fg(Color::DarkGray),
        )];
        for c in vis_cols.clone() {
            let header = &columns[c];
            let name = if header.is_entry {
                format!("{} *", header.label)
            } else {
                header.label.clone()
            };
            let display = util::pad_right(&util::truncate_display(&name, CELL_WIDTH), CELL_WIDTH);
            let style = if c == self.cursor_col {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            };
            header_spans.push(Span::styled(format!("{} ", display), style));
        }

        let data_height = area.height.saturating_sub(1) as usize;
        let end_row = (self.scroll_row + data_height).min(rows.len());

        let mut lines: Vec<Line> = Vec::with_capacity(data_height + 1);
        lines.push(Line::from(header_spans));

        if rows.is_empty() {
            lines.push(Line::from(Span::styled(
                "  (no rows — press r to add one)",
                Style::default().fg(Color::DarkGray),
            )));
        }

        for r in self.scroll_row..end_row {
            let row = &rows[r];
            let is_cursor_row = r == self.cursor_row;

            let row_num_style = if is_cursor_row {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            let mut spans = vec![Span::styled(
                format!("{:>width$} ", r + 1, width = GUTTER_WIDTH),
                row_num_style,
            )];

            for c in vis_cols.clone() {
                let cell = &row.cells[c];
                let is_cursor = is_cursor_row && c == self.cursor_col;

                // Show the live edit buffer in place
                let shown = if is_cursor {
                    if let Mode::EditCell { buffer } = &self.mode {
                        format!("{}_", buffer)
                    } else {
                        cell.value.clone()
                    }
                } else {
                    cell.value.clone()
                };
                let display =
                    util::pad_right(&util::truncate_display(&shown, CELL_WIDTH), CELL_WIDTH);

                let style = if is_cursor {
                    let bg = match cell.status {
                        CellStatus::Pending => Color::Yellow,
                        CellStatus::Succeeded => Color::Green,
                        CellStatus::Failed => Color::Red,
                        CellStatus::Idle => Color::White,
                    };
                    Style::default()
                        .fg(Color::Black)
                        .bg(bg)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Self::status_style(cell.status)
                };

                spans.push(Span::styled(format!("{} ", display), style));
            }

            lines.push(Line::from(spans));
        }

        let para = Paragraph::new(lines);
        frame.render_widget(para, area);
    }

    fn draw_status(&self, frame: &mut Frame, area: Rect) {
        let left = match &self.mode {
            Mode::EditCell { buffer } => {
                let label = self
                    .grid
                    .columns()
                    .get(self.cursor_col)
                    .map(|h| h.label.as_str())
                    .unwrap_or("?");
                format!(" editing {}: {}", label, buffer)
            }
            _ => {
                if let Some(msg) = &self.status_message {
                    format!(" {}", msg)
                } else if let Some((row, col)) = self.cursor_ids() {
                    let header = self.grid.column(col);
                    let cell = self.grid.cell(row, col);
                    match (header, cell) {
                        (Some(header), Some(cell)) => match (&cell.status, &cell.error) {
                            (CellStatus::Failed, Some(error)) => {
                                format!(" {} ✗ {}", header.label, error)
                            }
                            _ => format!(
                                " {} [{}] = {:?}",
                                header.label,
                                cell.status.as_str(),
                                cell.value
                            ),
                        },
                        _ => String::new(),
                    }
                } else {
                    String::new()
                }
            }
        };

        let right = format!(
            "{}  ?: help ",
            self.last_report.as_deref().unwrap_or("")
        );
        let padding = (area.width as usize)
            .saturating_sub(left.chars().count() + right.chars().count());
        let status = format!("{}{:pad$}{}", left, "", right, pad = padding);

        let para = Paragraph::new(Line::from(vec![Span::styled(
            status,
            Style::default().fg(Color::Black).bg(Color::DarkGray),
        )]))
        .style(Style::default().bg(Color::DarkGray));
        frame.render_widget(para, area);
    }

    fn draw_hints(&self, frame: &mut Frame, area: Rect) {
        let hints = match &self.mode {
            Mode::EditCell { .. } => " Enter: commit (regenerates dependents)   Esc: cancel",
            Mode::EditPrompt { .. } => " Enter: save prompt   Esc: cancel",
            Mode::Settings(_) => {
                " Tab: next field   Space: toggle provider   Enter: save   Esc: cancel"
            }
            _ => " i:edit  g:regenerate  r/x:row  a/D:column  p:prompt  s:settings  q:quit",
        };
        let para = Paragraph::new(Line::from(Span::styled(
            hints,
            Style::default().fg(Color::DarkGray),
        )));
        frame.render_widget(para, area);
    }

    fn draw_help(&self, frame: &mut Frame, area: Rect) {
        let help_lines = vec![
            "",
            "  Navigation",
            "  ----------",
            "  arrows / hjkl     Move cursor",
            "  Tab / Shift+Tab   Next/prev column",
            "  Home / End        First/last column",
            "",
            "  Cells",
            "  -----",
            "  Enter / i         Edit cell (Enter commits,",
            "                    regenerating dependents)",
            "  g                 Regenerate from source cell",
            "",
            "  Structure",
            "  ---------",
            "  r / x             Add / remove row",
            "  a / D             Add / remove column",
            "  p                 Edit column prompt",
            "",
            "  General",
            "  -------",
            "  s                 Settings",
            "  q / Esc           Quit",
            "  ?                 Toggle this help",
            "",
        ];
        let help_width: u16 = 52;
        let help_height: u16 = help_lines.len() as u16;

        let x = area.width.saturating_sub(help_width) / 2;
        let y = area.height.saturating_sub(help_height) / 2;
        let popup = Rect::new(
            area.x + x,
            area.y + y,
            help_width.min(area.width),
            help_height.min(area.height),
        );

        let lines: Vec<Line> = help_lines
            .iter()
            .map(|s| Line::from(Span::styled(*s, Style::default().fg(Color::White))))
            .collect();

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Keybindings ")
            .title_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .style(Style::default().bg(Color::Black));

        frame.render_widget(Clear, popup);
        let para = Paragraph::new(lines).block(block);
        frame.render_widget(para, popup);
    }

    fn draw_prompt_editor(&self, frame: &mut Frame, area: Rect, col: ColumnId, buffer: &str) {
        let label = self
            .grid
            .column(col)
            .map(|h| h.label.as_str())
            .unwrap_or("?");
        let width: u16 = 64.min(area.width);
        let height: u16 = 6;
        let x = area.width.saturating_sub(width) / 2;
        let y = area.height.saturating_sub(height) / 2;
        let popup = Rect::new(area.x + x, area.y + y, width, height.min(area.height));

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(format!(" Prompt for {} ", label))
            .style(Style::default().bg(Color::Black));

        let text = format!("{}_", buffer);
        frame.render_widget(Clear, popup);
        let para = Paragraph::new(text)
            .block(block)
            .wrap(ratatui::widgets::Wrap { trim: false });
        frame.render_widget(para, popup);
    }

    fn draw_settings(&self, frame: &mut Frame, area: Rect, form: &SettingsForm) {
        let width: u16 = 60.min(area.width);
        let height: u16 = 9;
        let x = area.width.saturating_sub(width) / 2;
        let y = area.height.saturating_sub(height) / 2;
        let popup = Rect::new(area.x + x, area.y + y, width, height.min(area.height));

        let field_style = |idx: usize| {
            if idx == form.field {
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::White)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            }
        };

        let endpoint = form
            .draft
            .local_endpoint
            .clone()
            .unwrap_or_default();
        let lines = vec![
            Line::from(""),
            Line::from(vec![
                Span::raw("  provider:        "),
                Span::styled(format!("< {} >", form.draft.provider.name()), field_style(0)),
            ]),
            Line::from(vec![
                Span::raw("  local.endpoint:  "),
                Span::styled(
                    if endpoint.is_empty() {
                        format!("(default: {})", form.draft.effective_local_endpoint())
                    } else {
                        endpoint
                    },
                    field_style(1),
                ),
            ]),
            Line::from(vec![
                Span::raw("  local.model:     "),
                Span::styled(
                    if form.draft.local_model.is_empty() {
                        format!("(default: {})", Provider::Local.default_model())
                    } else {
                        form.draft.local_model.clone()
                    },
                    field_style(2),
                ),
            ]),
            Line::from(vec![
                Span::raw("  hosted.model:    "),
                Span::styled(
                    if form.draft.hosted_model.is_empty() {
                        format!("(default: {})", Provider::Hosted.default_model())
                    } else {
                        form.draft.hosted_model.clone()
                    },
                    field_style(3),
                ),
            ]),
            Line::from(""),
            Line::from(Span::styled(
                "  API keys live in the keychain: `pgrid key set`",
                Style::default().fg(Color::DarkGray),
            )),
        ];

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Settings ")
            .style(Style::default().bg(Color::Black));

        frame.render_widget(Clear, popup);
        let para = Paragraph::new(lines).block(block);
        frame.render_widget(para, popup);
    }
}

/// Run the interactive grid over a prepared pipeline.
pub fn run(grid: Grid, settings: Settings, title: String) -> Result<(), String> {
    let app = TuiApp::new(grid, settings, title);
    run_app(app)
}

fn run_app(mut app: TuiApp) -> Result<(), String> {
    terminal::enable_raw_mode().map_err(|e| format!("failed to enable raw mode: {}", e))?;
    stdout()
        .execute(EnterAlternateScreen)
        .map_err(|e| format!("failed to enter alternate screen: {}", e))?;

    struct Cleanup;
    impl Drop for Cleanup {
        fn drop(&mut self) {
            let _ = stdout().execute(LeaveAlternateScreen);
            let _ = terminal::disable_raw_mode();
        }
    }
    let _cleanup = Cleanup;

    let backend = CrosstermBackend::new(stdout());
    let mut terminal =
        Terminal::new(backend).map_err(|e| format!("failed to create terminal: {}", e))?;

    loop {
        app.drain_workers();

        let term_size = terminal
            .size()
            .map(|s| Rect::new(0, 0, s.width, s.height))
            .unwrap_or_default();
        // title + header + status + hints
        let visible_rows = term_size.height.saturating_sub(4) as usize;
        app.ensure_visible(visible_rows, term_size.width);

        terminal
            .draw(|frame| app.draw(frame))
            .map_err(|e| format!("draw error: {}", e))?;

        if event::poll(Duration::from_millis(50)).map_err(|e| format!("event poll error: {}", e))?
        {
            if let Event::Key(key) = event::read().map_err(|e| format!("event read error: {}", e))?
            {
                app.handle_key(key);
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
