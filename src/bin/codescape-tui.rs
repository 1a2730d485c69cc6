use clap::Parser;
use codescape::activity::{watch_event_log, EventLog};
use codescape::config::AppConfig;
use codescape::logging::init_logging;
use codescape::radial_layout::GridCell;
use codescape::scanner::{ScanProgress, ScanStats, Scanner};
use codescape::snapshot::{CellView, Session};
use codescape::tree::Entry;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use notify::RecommendedWatcher;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Style};
use ratatui::symbols::Marker;
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Points};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{Frame, Terminal};
use std::io::{self, stdout};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "codescape-tui", version, about = "Live radial view of a codebase")]
struct Args {
    /// Base directory to scan
    #[arg(default_value = ".")]
    root: PathBuf,
    /// Newline-delimited JSON activity feed to follow
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    config: Option<PathBuf>,
}

enum ScanEvent {
    Progress(ScanProgress),
    Completed(Result<ScanResult, String>),
}

struct ScanResult {
    entries: Vec<Entry>,
    stats: ScanStats,
}

struct EventFeed {
    log: EventLog,
    changes: Receiver<()>,
    _watcher: RecommendedWatcher,
}

struct App {
    root: PathBuf,
    config: AppConfig,
    status: String,
    is_scanning: bool,
    scan_progress: Option<ScanProgress>,
    scan_rx: Option<Receiver<ScanEvent>>,
    last_scan_finished_at: Option<Instant>,

    session: Session,
    feed: Option<EventFeed>,
    view_root: Option<PathBuf>,
    view_layout: Vec<GridCell>,
    view_cells: Vec<CellView>,
    selected: usize,

    should_quit: bool,
}

impl App {
    fn new(root: PathBuf, config: AppConfig, feed: Option<EventFeed>) -> Self {
        let session = Session::new(config.layout.clone(), config.large_directory_threshold);
        Self {
            root,
            config,
            status: String::from("Starting scan"),
            is_scanning: false,
            scan_progress: None,
            scan_rx: None,
            last_scan_finished_at: None,
            session,
            feed,
            view_root: None,
            view_layout: Vec::new(),
            view_cells: Vec::new(),
            selected: 0,
            should_quit: false,
        }
    }

    fn start_scan(&mut self) {
        if self.is_scanning {
            return;
        }

        self.status = format!("Scanning {} ...", self.root.display());
        self.is_scanning = true;
        self.scan_progress = None;

        let (tx, rx) = mpsc::channel::<ScanEvent>();
        self.scan_rx = Some(rx);
        let path = self.root.clone();
        let scan_config = self.config.scan.clone();

        thread::spawn(move || {
            let progress_tx = tx.clone();
            let reporter = Arc::new(move |progress: ScanProgress| {
                let _ = progress_tx.send(ScanEvent::Progress(progress));
            });

            let result = Scanner::new()
                .scan_with_progress(&path, &scan_config, Some(reporter))
                .map(|(entries, stats)| ScanResult { entries, stats })
                .map_err(|e| e.to_string());
            let _ = tx.send(ScanEvent::Completed(result));
        });
    }

    fn poll_scan_updates(&mut self) {
        let mut done: Option<Result<ScanResult, String>> = None;
        let mut disconnected = false;

        if let Some(rx) = self.scan_rx.as_ref() {
            loop {
                match rx.try_recv() {
                    Ok(ScanEvent::Progress(progress)) => self.scan_progress = Some(progress),
                    Ok(ScanEvent::Completed(result)) => done = Some(result),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }

        if disconnected {
            self.scan_rx = None;
            self.is_scanning = false;
            if done.is_none() {
                self.status = "Scan channel disconnected".to_string();
            }
        }

        if let Some(result) = done {
            self.scan_rx = None;
            self.is_scanning = false;
            self.scan_progress = None;

            match result {
                Ok(scan) => {
                    self.session.load(&scan.entries, &self.root);
                    self.view_root = None;
                    self.selected = 0;
                    self.last_scan_finished_at = Some(Instant::now());
                    // A fresh snapshot starts unexplored; replay the whole feed into it
                    if let Some(feed) = self.feed.as_mut() {
                        feed.log = EventLog::new(feed.log.path());
                    }
                    let matched = self.drain_events();
                    self.refresh_view();
                    self.status = format!(
                        "Scan complete: {} files, {} dirs in {} ms, {} events replayed",
                        scan.stats.total_files, scan.stats.total_dirs, scan.stats.duration_ms, matched,
                    );
                }
                Err(err) => {
                    tracing::error!(error = %err, "scan failed");
                    self.status = format!("Scan failed: {}", err);
                }
            }
        }
    }

    fn poll_activity(&mut self) {
        let Some(feed) = self.feed.as_ref() else {
            return;
        };
        let mut changed = false;
        loop {
            match feed.changes.try_recv() {
                Ok(()) => changed = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if changed && self.drain_events() > 0 {
            self.refresh_cell_views();
        }
    }

    /// Apply everything appended to the feed; returns how many events hit a node.
    fn drain_events(&mut self) -> usize {
        let Some(feed) = self.feed.as_mut() else {
            return 0;
        };
        let batch = match feed.log.read_new() {
            Ok(batch) => batch,
            Err(e) => {
                self.status = format!("Event feed error: {}", e);
                return 0;
            }
        };
        batch
            .iter()
            .filter(|event| self.session.apply_event(event).is_some())
            .count()
    }

    fn refresh_view(&mut self) {
        self.view_layout = match self.session.snapshot() {
            Some(snapshot) => {
                let root = self.current_view_root().to_path_buf();
                snapshot.layout_for_root(&root).into_owned()
            }
            None => Vec::new(),
        };
        if self.selected >= self.view_layout.len() {
            self.selected = 0;
        }
        self.refresh_cell_views();
    }

    fn refresh_cell_views(&mut self) {
        self.view_cells = self
            .session
            .snapshot()
            .map(|snapshot| snapshot.cell_views(&self.view_layout))
            .unwrap_or_default();
    }

    fn current_view_root(&self) -> &Path {
        match (self.view_root.as_deref(), self.session.snapshot()) {
            (Some(view), _) => view,
            (None, Some(snapshot)) => snapshot.base_path(),
            (None, None) => &self.root,
        }
    }

    fn selected_cell(&self) -> Option<&CellView> {
        self.view_cells.get(self.selected)
    }

    fn select_next(&mut self) {
        if !self.view_cells.is_empty() {
            self.selected = (self.selected + 1) % self.view_cells.len();
        }
    }

    fn select_prev(&mut self) {
        if !self.view_cells.is_empty() {
            self.selected = (self.selected + self.view_cells.len() - 1) % self.view_cells.len();
        }
    }

    fn zoom_into_selected(&mut self) {
        let Some(cell) = self.selected_cell() else {
            return;
        };
        if !cell.kind.is_dir() || cell.depth == 0 {
            return;
        }
        self.view_root = Some(cell.path.clone());
        self.selected = 0;
        self.refresh_view();
    }

    fn zoom_out_one_level(&mut self) {
        let Some(current) = self.view_root.take() else {
            return;
        };
        let base = self.current_view_root().to_path_buf();
        self.view_root = current
            .parent()
            .filter(|parent| parent.starts_with(&base) && *parent != base.as_path())
            .map(Path::to_path_buf);
        self.selected = 0;
        self.refresh_view();
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
            self.should_quit = true;
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('r') => self.start_scan(),
            KeyCode::Tab | KeyCode::Right | KeyCode::Down => self.select_next(),
            KeyCode::BackTab | KeyCode::Left | KeyCode::Up => self.select_prev(),
            KeyCode::Enter => self.zoom_into_selected(),
            KeyCode::Backspace | KeyCode::Char('u') => self.zoom_out_one_level(),
            _ => {}
        }
    }
}

fn cell_color(cell: &CellView, selected: bool) -> Color {
    if selected {
        return Color::Rgb(246, 211, 101);
    }
    match (cell.kind.is_dir(), cell.explored) {
        (true, true) => Color::Rgb(100, 190, 230),
        (true, false) => Color::Rgb(35, 95, 145),
        (false, true) => Color::Rgb(175, 180, 165),
        (false, false) => Color::Rgb(85, 85, 95),
    }
}

fn draw_ui(frame: &mut Frame, app: &App) {
    let split = Layout::horizontal([Constraint::Length(42), Constraint::Min(30)]).split(frame.area());
    let left = split[0];
    let right = split[1];

    let left_block = Block::default().title(" Codescape ").borders(Borders::ALL);
    let left_inner = left_block.inner(left);
    frame.render_widget(left_block, left);

    let left_rows = Layout::vertical([
        Constraint::Length(5),
        Constraint::Min(8),
        Constraint::Length(5),
    ])
    .split(left_inner);

    let status = if app.is_scanning {
        app.scan_progress
            .map(|p| format!("Scanning... {} entries", p.discovered_entries))
            .unwrap_or_else(|| "Scanning...".to_string())
    } else {
        app.status.clone()
    };
    frame.render_widget(
        Paragraph::new(status).block(Block::default().title(" Status ").borders(Borders::ALL)),
        left_rows[0],
    );

    let mut lines = vec![Line::from(vec![
        Span::styled("View: ", Style::default().fg(Color::Gray)),
        Span::raw(app.current_view_root().display().to_string()),
    ])];
    match app.selected_cell() {
        Some(cell) => {
            lines.push(Line::from(vec![
                Span::styled("Selected: ", Style::default().fg(Color::Gray)),
                Span::raw(cell.path.display().to_string()),
            ]));
            lines.push(Line::from(vec![
                Span::styled("Depth: ", Style::default().fg(Color::Gray)),
                Span::raw(cell.depth.to_string()),
                Span::raw("  "),
                Span::styled("Accesses: ", Style::default().fg(Color::Gray)),
                Span::raw(cell.access_count.to_string()),
            ]));
            if let Some(at) = cell.last_accessed_at {
                lines.push(Line::from(format!("Last access: {}", at)));
            }
        }
        None => lines.push(Line::from("Selected: (none)")),
    }
    let explored = app.view_cells.iter().filter(|c| c.explored).count();
    lines.push(Line::from(format!(
        "Explored: {}/{}",
        explored,
        app.view_cells.len()
    )));
    if let Some(instant) = app.last_scan_finished_at {
        lines.push(Line::from(format!(
            "Last scan: {}s ago",
            instant.elapsed().as_secs()
        )));
    }
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().title(" Selection ").borders(Borders::ALL)),
        left_rows[1],
    );

    let help_lines = vec![
        Line::from("Tab/arrows: select"),
        Line::from("Enter: zoom in   Backspace: up"),
        Line::from("r: rescan   q: quit"),
    ];
    frame.render_widget(
        Paragraph::new(help_lines).block(Block::default().title(" Controls ").borders(Borders::ALL)),
        left_rows[2],
    );

    let map_block = Block::default().title(" Layout ").borders(Borders::ALL);
    if app.view_cells.is_empty() {
        let inner = map_block.inner(right);
        frame.render_widget(map_block, right);
        frame.render_widget(
            Paragraph::new("Nothing to show yet.").style(Style::default().fg(Color::Gray)),
            inner,
        );
        return;
    }

    let extent = app
        .view_cells
        .iter()
        .map(|c| c.x.abs().max(c.y.abs()))
        .fold(1.0_f32, f32::max) as f64
        * 1.1;
    let canvas = Canvas::default()
        .block(map_block)
        .marker(Marker::Braille)
        .x_bounds([-extent, extent])
        .y_bounds([-extent, extent])
        .paint(|ctx| {
            for (i, cell) in app.view_cells.iter().enumerate() {
                let coords = [(cell.x as f64, cell.y as f64)];
                ctx.draw(&Points {
                    coords: &coords,
                    color: cell_color(cell, i == app.selected),
                });
            }
            if let Some(cell) = app.selected_cell() {
                ctx.print(
                    cell.x as f64,
                    cell.y as f64,
                    Line::styled(cell.name.clone(), Style::default().fg(Color::White)),
                );
            }
        });
    frame.render_widget(canvas, right);
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App) -> io::Result<()> {
    app.start_scan();

    loop {
        app.poll_scan_updates();
        app.poll_activity();

        terminal.draw(|frame| draw_ui(frame, &app))?;

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                app.on_key(key);
            }
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::load_or_default(args.config.as_deref())?;
    // The terminal owns stdout and stderr; only file logging is usable here
    if config.logging.file.is_some() {
        init_logging(&config.logging)?;
    }

    let root = args.root.canonicalize()?;
    let feed = match args.events {
        Some(path) => {
            let (watcher, changes) = watch_event_log(&path)?;
            Some(EventFeed {
                log: EventLog::new(path),
                changes,
                _watcher: watcher,
            })
        }
        None => None,
    };
    let app = App::new(root, config, feed);

    enable_raw_mode()?;
    crossterm::execute!(stdout(), EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let app_result = run_app(&mut terminal, app);

    disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    Ok(app_result?)
}
