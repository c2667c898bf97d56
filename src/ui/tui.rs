use anyhow::{anyhow, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Row, Table, Tabs, Wrap},
    Frame, Terminal,
};
use std::{io, path::PathBuf, time::Duration};

use crate::database::{Database, OpenOptions};
use crate::paged::{PagedCache, MAX_PAGES_CACHED};
use crate::provider::TableProvider;

const COLUMN_WIDTH: u16 = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppMode {
    Tables,
    Schema,
}

pub struct App<'db> {
    database: &'db Database,
    pub mode: AppMode,
    pub tables: Vec<String>,
    pub table_list_state: ListState,
    pub selected_table: Option<String>,
    pub indexes: Vec<String>,
    /// Position in `indexes` of the ordering index; `None` is rowid order.
    pub index_choice: Option<usize>,
    pub cache: Option<PagedCache<TableProvider<'db>>>,
    pub row_total: usize,
    pub vertical_scroll: usize,
    pub horizontal_scroll: usize,
    pub show_help: bool,
    pub status_message: String,
    pub status_style: Style,
    pub schema_content: String,
    pub schema_scroll: usize,
}

impl<'db> App<'db> {
    pub fn new(database: &'db Database) -> Result<Self> {
        let tables = database.table_names()?;

        let mut app = App {
            database,
            mode: AppMode::Tables,
            tables,
            table_list_state: ListState::default(),
            selected_table: None,
            indexes: Vec::new(),
            index_choice: None,
            cache: None,
            row_total: 0,
            vertical_scroll: 0,
            horizontal_scroll: 0,
            show_help: false,
            status_message: "Use Tab to switch views, i to change index, ? for help".to_string(),
            status_style: Style::default().fg(Color::Green),
            schema_content: String::new(),
            schema_scroll: 0,
        };

        if !app.tables.is_empty() {
            app.table_list_state.select(Some(0));
            app.selected_table = app.tables.first().cloned();
            app.load_table();
        }
        Ok(app)
    }

    pub fn next_mode(&mut self) {
        self.mode = match self.mode {
            AppMode::Tables => AppMode::Schema,
            AppMode::Schema => AppMode::Tables,
        };
        if self.mode == AppMode::Schema {
            self.load_schema_content();
        }
    }

    pub fn next_table(&mut self) {
        if self.tables.is_empty() {
            return;
        }
        let selected = self.table_list_state.selected().unwrap_or(0);
        self.select((selected + 1) % self.tables.len());
    }

    pub fn previous_table(&mut self) {
        if self.tables.is_empty() {
            return;
        }
        let selected = self.table_list_state.selected().unwrap_or(0);
        self.select(selected.checked_sub(1).unwrap_or(self.tables.len() - 1));
    }

    fn select(&mut self, position: usize) {
        self.table_list_state.select(Some(position));
        self.selected_table = self.tables.get(position).cloned();
        self.index_choice = None;
        self.load_table();
        if self.mode == AppMode::Schema {
            self.load_schema_content();
        }
    }

    /// Step through rowid order and then each index of the table.
    pub fn cycle_index(&mut self) {
        if self.indexes.is_empty() {
            self.set_status("Table has no indexes", Style::default().fg(Color::Yellow));
            return;
        }
        self.index_choice = match self.index_choice {
            None => Some(0),
            Some(i) if i + 1 < self.indexes.len() => Some(i + 1),
            Some(_) => None,
        };
        self.load_table();
    }

    pub fn current_index(&self) -> Option<&str> {
        self.index_choice
            .and_then(|i| self.indexes.get(i))
            .map(String::as_str)
    }

    /// Rebuild the paged cache for the selected table and index.
    pub fn load_table(&mut self) {
        self.cache = None;
        self.row_total = 0;
        self.vertical_scroll = 0;
        self.horizontal_scroll = 0;
        let Some(table) = self.selected_table.clone() else {
            return;
        };

        if self.index_choice.is_none() {
            self.indexes = match self.database.index_names(&table) {
                Ok(indexes) => indexes,
                Err(e) => {
                    self.set_status(&format!("Error listing indexes of {}: {}", table, e), error_style());
                    Vec::new()
                }
            };
        }

        let index = self.current_index().map(str::to_string);
        let opened = TableProvider::new(self.database, &table, index.as_deref())
            .map(PagedCache::new)
            .and_then(|mut cache| cache.len().map(|total| (cache, total)));
        match opened {
            Ok((cache, total)) => {
                self.cache = Some(cache);
                self.row_total = total;
                let order = index.map_or("rowid order".to_string(), |i| format!("index {}", i));
                self.set_status(&format!("Loaded {} in {}", table, order), Style::default().fg(Color::Green));
            }
            Err(e) => {
                self.set_status(&format!("Error loading table {}: {}", table, e), error_style());
            }
        }
    }

    pub fn load_schema_content(&mut self) {
        self.schema_scroll = 0;
        let Some(table) = self.selected_table.clone() else {
            self.schema_content = "No table selected".to_string();
            return;
        };
        self.schema_content = match self.describe(&table) {
            Ok(content) => content,
            Err(e) => format!("Error loading schema: {}", e),
        };
    }

    fn describe(&self, table: &str) -> crate::Result<String> {
        let mut content = format!("-- TABLE: {}\n", table);
        let columns = self.database.column_set(table)?;
        for (descriptor, info) in columns.iter().zip(self.database.columns(table)?) {
            content.push_str(&format!(
                "{:<24} {:<16} {:<22} {}\n",
                descriptor.name,
                info.declared_type,
                descriptor.column_type.to_string(),
                descriptor.semantic_type
            ));
        }

        let indexes = self.database.index_info(table)?;
        if !indexes.is_empty() {
            content.push_str("\n-- INDEXES\n");
        }
        for index in indexes {
            content.push_str(&format!(
                "{} ({}) entries={} keys={} code_page={}{}{}{}\n",
                index.name,
                index.columns.join(", "),
                index.entries,
                index.unique_keys,
                index.code_page,
                if index.unique { " unique" } else { "" },
                if index.partial { " partial" } else { "" },
                if index.automatic { " automatic" } else { "" },
            ));
        }
        Ok(content)
    }

    pub fn scroll_up(&mut self, by: usize) {
        match self.mode {
            AppMode::Tables => self.vertical_scroll = self.vertical_scroll.saturating_sub(by),
            AppMode::Schema => self.schema_scroll = self.schema_scroll.saturating_sub(by),
        }
    }

    pub fn scroll_down(&mut self, by: usize) {
        match self.mode {
            AppMode::Tables => {
                let max_scroll = self.row_total.saturating_sub(1);
                self.vertical_scroll = (self.vertical_scroll + by).min(max_scroll);
            }
            AppMode::Schema => self.schema_scroll += by,
        }
    }

    pub fn scroll_left(&mut self) {
        self.horizontal_scroll = self.horizontal_scroll.saturating_sub(1);
    }

    pub fn scroll_right(&mut self) {
        let columns = self.cache.as_ref().map_or(0, |c| c.provider().columns().len());
        if self.horizontal_scroll + 1 < columns {
            self.horizontal_scroll += 1;
        }
    }

    pub fn scroll_to_bottom(&mut self) {
        self.vertical_scroll = self.row_total.saturating_sub(1);
    }

    pub fn set_status(&mut self, message: &str, style: Style) {
        self.status_message = message.to_string();
        self.status_style = style;
    }
}

fn error_style() -> Style {
    Style::default().fg(Color::Red)
}

pub fn run_tui(database_path: PathBuf, options: OpenOptions) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = open_and_run(&mut terminal, database_path, options);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

fn open_and_run<B: Backend>(
    terminal: &mut Terminal<B>,
    database_path: PathBuf,
    options: OpenOptions,
) -> Result<()> {
    let handle = Database::open_in_background(database_path.clone(), options);
    let message = format!("Opening {}...", database_path.display());
    while !handle.is_finished() {
        terminal.draw(|f| render_opening(f, &message))?;
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if is_quit(&key) {
                    return Ok(());
                }
            }
        }
    }

    let database = handle
        .join()
        .map_err(|_| anyhow!("database open thread panicked"))??;
    let mut app = App::new(&database)?;
    run_app(terminal, &mut app)
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if handle_key_event(app, key) {
                    return Ok(());
                }
            }
        }
    }
}

fn is_quit(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char('q'))
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
}

fn handle_key_event(app: &mut App, key: KeyEvent) -> bool {
    if app.show_help {
        if matches!(key.code, KeyCode::Char('?') | KeyCode::Esc) {
            app.show_help = false;
        }
        return false;
    }

    match key.code {
        _ if is_quit(&key) => return true,
        KeyCode::Char('?') => app.show_help = true,
        KeyCode::Tab | KeyCode::BackTab => app.next_mode(),
        KeyCode::Up | KeyCode::Char('k') => app.previous_table(),
        KeyCode::Down | KeyCode::Char('j') => app.next_table(),
        KeyCode::Char('i') => {
            app.cycle_index();
            if app.mode == AppMode::Schema {
                app.load_schema_content();
            }
        }
        KeyCode::Char('w') => app.scroll_up(1),
        KeyCode::Char('s') => app.scroll_down(1),
        KeyCode::PageUp | KeyCode::Char('W') => app.scroll_up(10),
        KeyCode::PageDown | KeyCode::Char('S') => app.scroll_down(10),
        KeyCode::Left | KeyCode::Char('a') => app.scroll_left(),
        KeyCode::Right | KeyCode::Char('d') => app.scroll_right(),
        KeyCode::Home | KeyCode::Char('g') => app.vertical_scroll = 0,
        KeyCode::End | KeyCode::Char('G') => app.scroll_to_bottom(),
        _ => {}
    }
    false
}

fn ui(f: &mut Frame, app: &mut App) {
    if app.show_help {
        render_help(f);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Main content
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);
    match app.mode {
        AppMode::Tables => render_tables_view(f, chunks[1], app),
        AppMode::Schema => render_schema_view(f, chunks[1], app),
    }
    render_status_bar(f, chunks[2], app);
}

fn render_opening(f: &mut Frame, message: &str) {
    let area = centered_rect(60, 20, f.size());
    let paragraph = Paragraph::new(message.to_string())
        .block(Block::default().borders(Borders::ALL).title("dbpeek"))
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center);
    f.render_widget(paragraph, area);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let tabs = Tabs::new(vec!["Tables", "Schema"])
        .block(Block::default().borders(Borders::ALL).title("dbpeek"))
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .select(match app.mode {
            AppMode::Tables => 0,
            AppMode::Schema => 1,
        });
    f.render_widget(tabs, area);
}

fn render_tables_view(f: &mut Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25), Constraint::Percentage(75)])
        .split(area);

    let table_items: Vec<ListItem> = app
        .tables
        .iter()
        .map(|table| ListItem::new(table.as_str()).style(Style::default().fg(Color::White)))
        .collect();

    let tables_list = List::new(table_items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Tables")
                .title_style(Style::default().fg(Color::Cyan)),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol(">> ");

    f.render_stateful_widget(tables_list, chunks[0], &mut app.table_list_state);

    render_table_data(f, chunks[1], app);
}

fn truncate_cell(text: String) -> String {
    if text.chars().count() > COLUMN_WIDTH as usize {
        let mut short: String = text.chars().take(COLUMN_WIDTH as usize - 3).collect();
        short.push_str("...");
        short
    } else {
        text
    }
}

/// Only the rows on screen are requested from the cache.
fn render_table_data(f: &mut Frame, area: Rect, app: &mut App) {
    let title = format!(
        "Table Data: {} [{}]",
        app.selected_table.as_deref().unwrap_or("None"),
        app.current_index().unwrap_or("rowid")
    );
    let row_total = app.row_total;
    let Some(cache) = app.cache.as_mut() else {
        let paragraph = Paragraph::new("Select a table to view its data")
            .block(Block::default().borders(Borders::ALL).title("Table Data"))
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center);
        f.render_widget(paragraph, area);
        return;
    };

    if row_total == 0 {
        let paragraph = Paragraph::new("No data in table")
            .block(Block::default().borders(Borders::ALL).title(title))
            .style(Style::default().fg(Color::Yellow))
            .alignment(Alignment::Center);
        f.render_widget(paragraph, area);
        return;
    }

    let columns = cache.provider().columns().clone();
    let total_columns = columns.len();
    let visible_columns_count = ((area.width.saturating_sub(4)) / (COLUMN_WIDTH + 2)).max(1) as usize;
    let start_col = app.horizontal_scroll.min(total_columns.saturating_sub(1));
    let end_col = (start_col + visible_columns_count).min(total_columns);

    let visible_height = area.height.saturating_sub(4) as usize; // borders, header and its margin
    let max_vertical_scroll = row_total.saturating_sub(visible_height);
    let first_row = app.vertical_scroll.min(max_vertical_scroll);
    let last_row = (first_row + visible_height).min(row_total);

    let mut visible_rows = Vec::with_capacity(visible_height);
    let mut fetch_error = None;
    for index in first_row..last_row {
        match cache.get(index) {
            Ok(row) => {
                let cells: Vec<String> = row.values()[start_col..end_col]
                    .iter()
                    .map(|value| match value {
                        Some(value) => truncate_cell(value.to_string()),
                        None => "NULL".to_string(),
                    })
                    .collect();
                visible_rows.push(Row::new(cells));
            }
            Err(e) => {
                fetch_error = Some(e);
                break;
            }
        }
    }

    let headers: Vec<&str> = columns
        .iter()
        .skip(start_col)
        .take(end_col - start_col)
        .map(|col| col.name.as_str())
        .collect();
    let widths = vec![Constraint::Length(COLUMN_WIDTH); headers.len()];

    let scroll_info = format!(
        " │ Rows: {}-{}/{} │ Cols: {}-{}/{}",
        first_row + 1,
        first_row + visible_rows.len(),
        row_total,
        start_col + 1,
        end_col,
        total_columns
    );

    let table = Table::new(visible_rows, widths)
        .header(
            Row::new(headers)
                .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
                .bottom_margin(1),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{}{}", title, scroll_info))
                .title_style(Style::default().fg(Color::Green)),
        );
    f.render_widget(table, area);

    if let Some(e) = fetch_error {
        app.set_status(&format!("Error reading rows: {}", e), error_style());
    }
}

fn render_schema_view(f: &mut Frame, area: Rect, app: &App) {
    let schema_lines: Vec<Line> = app
        .schema_content
        .lines()
        .map(|line| {
            if line.starts_with("--") {
                Line::from(Span::styled(
                    line.to_string(),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ))
            } else {
                Line::from(Span::styled(line.to_string(), Style::default().fg(Color::White)))
            }
        })
        .collect();

    let total_lines = schema_lines.len();
    let visible_area_height = area.height.saturating_sub(2) as usize;
    let scroll_pos = app.schema_scroll.min(total_lines.saturating_sub(visible_area_height));

    let paragraph = Paragraph::new(schema_lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Columns and Indexes")
                .title_style(Style::default().fg(Color::Magenta)),
        )
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: false })
        .scroll((scroll_pos as u16, 0));

    f.render_widget(paragraph, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let counts = format!(
        "{} tables. {} rows in current table.",
        app.tables.len(),
        app.row_total
    );
    let cache_info = match &app.cache {
        Some(cache) => {
            let stats = cache.stats();
            format!(
                "cache {}/{} pages, {} hits, {} misses",
                cache.resident_pages().len(),
                MAX_PAGES_CACHED,
                stats.hits,
                stats.misses
            )
        }
        None => "cache empty".to_string(),
    };

    let status_text = vec![Line::from(vec![
        Span::styled(counts, Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
        Span::styled(cache_info, Style::default().fg(Color::Cyan)),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.status_message.clone(), app.status_style),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
        Span::styled("Tab: Switch | q: Quit | ?: Help", Style::default().fg(Color::DarkGray)),
    ])];

    let paragraph = Paragraph::new(status_text).block(Block::default().borders(Borders::ALL));
    f.render_widget(paragraph, area);
}

fn render_help(f: &mut Frame) {
    let area = centered_rect(80, 80, f.size());

    f.render_widget(Clear, area);

    let heading = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let help_text = vec![
        Line::from(vec![Span::styled(
            "dbpeek - Help",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )]),
        Line::from(""),
        Line::from(vec![Span::styled("Global Keys:", heading)]),
        Line::from("  Tab / Shift+Tab    - Switch between views"),
        Line::from("  q / Ctrl+C         - Quit application"),
        Line::from("  ?                  - Toggle this help"),
        Line::from("  ↑/↓ or k/j         - Select table"),
        Line::from("  i                  - Cycle row order: rowid, then each index"),
        Line::from(""),
        Line::from(vec![Span::styled("Tables View:", heading)]),
        Line::from("  w/s                - Scroll rows up/down"),
        Line::from("  a/d or ←/→         - Scroll columns left/right"),
        Line::from("  Page Up/Down       - Fast scroll (10 rows)"),
        Line::from("  g/G or Home/End    - Jump to top/bottom"),
        Line::from(""),
        Line::from(vec![Span::styled("Schema View:", heading)]),
        Line::from("  w/s                - Scroll vertically"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Press ? or Esc to close help",
            Style::default().fg(Color::Yellow),
        )]),
    ];

    let paragraph = Paragraph::new(help_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Help")
                .title_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        )
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: true });

    f.render_widget(paragraph, area);
}

/// The middle `percent_x` by `percent_y` part of `area`.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let scale = |len: u16, percent: u16| (u32::from(len) * u32::from(percent.min(100)) / 100) as u16;
    let width = scale(area.width, percent_x);
    let height = scale(area.height, percent_y);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_cells_are_shortened_on_char_boundaries() {
        let text = "é".repeat(30);
        let short = truncate_cell(text);
        assert_eq!(short.chars().count(), COLUMN_WIDTH as usize);
        assert!(short.ends_with("..."));
        assert_eq!(truncate_cell("short".into()), "short");
    }

    #[test]
    fn popup_sits_in_the_middle() {
        let popup = centered_rect(80, 50, Rect::new(0, 0, 100, 40));
        assert_eq!(popup, Rect::new(10, 10, 80, 20));
    }
}
