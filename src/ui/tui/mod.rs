//! 终端界面。
//!
//! `App` 只属于界面线程，也只有界面线程调用 `Terminal::draw`。
//! 详情、翻页、下载、封面都在后台线程完成，结果以 `WorkerMsg` 经 mpsc 送回，
//! 每轮循环用 `try_recv` 取完后再绘制。

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::prelude::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, ListState, Paragraph, Wrap};
use tracing::{debug, info, warn};

mod cover;
mod detail;
mod list;
mod page_picker;

use crate::base_system::context::Config;
use crate::base_system::logging::take_broadcast_rx;
use crate::book_parser::book::BookRecord;
use crate::download::models::{DownloadOutcome, DownloadProgress, DownloadTask};
use crate::download::pipeline::{ListingPage, PageCache, load_page, run_download, validate_page};
use crate::repo::error::RepoError;
use crate::repo::query::SearchQuery;
use crate::repo::{Repository, RowRecord};

const SPINNER_FRAMES: &[char] = &['|', '/', '-', '\\'];
const LOG_HEIGHT: u16 = 6;
const MAX_LOG_LINES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    List,
    Detail,
    PagePicker,
    Cover,
}

#[derive(Debug)]
enum WorkerMsg {
    DetailReady {
        generation: u64,
        result: Result<(RowRecord, BookRecord), RepoError>,
    },
    PageReady {
        generation: u64,
        page: u32,
        result: Result<ListingPage, RepoError>,
    },
    DownloadProgress {
        id: u64,
        progress: DownloadProgress,
    },
    DownloadDone {
        id: u64,
        result: Result<DownloadOutcome, RepoError>,
    },
    CoverReady {
        generation: u64,
        result: Result<Vec<String>, String>,
    },
}

/// 详情弹窗的数据与选中状态。
struct DetailView {
    row: RowRecord,
    book: BookRecord,
    mirrors: Vec<String>,
    mirror_idx: usize,
    scroll: u16,
}

impl DetailView {
    fn new(row: RowRecord, book: BookRecord) -> Self {
        let mirrors = book.mirror_names();
        Self {
            row,
            book,
            mirrors,
            mirror_idx: 0,
            scroll: 0,
        }
    }

    fn selected_mirror(&self) -> Option<&str> {
        self.mirrors.get(self.mirror_idx).map(String::as_str)
    }

    fn cycle_mirror(&mut self, forward: bool) {
        let n = self.mirrors.len();
        if n == 0 {
            return;
        }
        self.mirror_idx = if forward {
            (self.mirror_idx + 1) % n
        } else {
            (self.mirror_idx + n - 1) % n
        };
    }
}

/// 状态栏右侧的下载计数：进行中 🔽 / 已完成 ✅。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct DownloadCounters {
    active: usize,
    finished: usize,
    percent: u8,
}

impl DownloadCounters {
    fn on_download(&mut self) {
        self.active += 1;
        self.percent = 0;
    }

    fn on_progress(&mut self, progress: DownloadProgress) {
        if let Some(p) = progress.percent() {
            self.percent = self.percent.max(p);
        }
    }

    fn on_finished(&mut self) {
        self.active = self.active.saturating_sub(1);
        self.finished += 1;
        self.percent = 0;
    }

    fn on_error(&mut self) {
        self.active = self.active.saturating_sub(1);
        self.percent = 0;
    }

    fn text(&self) -> String {
        let mut parts = Vec::new();
        if self.finished > 0 {
            parts.push(format!("✅ {}", self.finished));
        }
        if self.active > 0 {
            parts.push(format!("🔽 {} {}%", self.active, self.percent));
        }
        parts.join(" ")
    }
}

pub(super) struct App {
    repo: Arc<dyn Repository>,
    config: Arc<Config>,
    query: SearchQuery,
    mode: Mode,
    status: String,
    logs: Vec<String>,
    log_rx: Option<crossbeam_channel::Receiver<String>>,
    should_quit: bool,

    // list
    cache: PageCache,
    listing: Arc<ListingPage>,
    list_state: ListState,
    list_height: usize,
    pending_g: bool,
    digit_chord: Option<usize>,

    // detail
    detail: Option<DetailView>,
    detail_generation: u64,
    detail_inflight: bool,

    // page picker
    page_input: String,
    page_generation: u64,
    page_inflight: Option<u32>,

    // cover
    cover_lines: Vec<String>,
    cover_generation: u64,

    // download
    counters: DownloadCounters,
    download_inflight: Option<u64>,
    next_download_id: u64,

    // worker
    worker_tx: Sender<WorkerMsg>,
    worker_rx: Receiver<WorkerMsg>,

    // spinner
    spinner_active: bool,
    spinner_text: String,
    spinner_idx: usize,
    spinner_last: Instant,
}

impl App {
    fn new(
        repo: Arc<dyn Repository>,
        config: Arc<Config>,
        query: SearchQuery,
        first: ListingPage,
        worker_tx: Sender<WorkerMsg>,
        worker_rx: Receiver<WorkerMsg>,
    ) -> Self {
        let mut cache = PageCache::new();
        let listing = cache.insert(first);
        let mut list_state = ListState::default();
        list_state.select((!listing.rows.is_empty()).then_some(0));

        Self {
            repo,
            config,
            query,
            mode: Mode::List,
            status: "j/k 移动，Enter 查看详情，p 跳页，n/N 翻页，q 退出".to_string(),
            logs: Vec::new(),
            log_rx: take_broadcast_rx(),
            should_quit: false,
            cache,
            listing,
            list_state,
            list_height: 20,
            pending_g: false,
            digit_chord: None,
            detail: None,
            detail_generation: 0,
            detail_inflight: false,
            page_input: String::new(),
            page_generation: 0,
            page_inflight: None,
            cover_lines: Vec::new(),
            cover_generation: 0,
            counters: DownloadCounters::default(),
            download_inflight: None,
            next_download_id: 1,
            worker_tx,
            worker_rx,
            spinner_active: false,
            spinner_text: String::new(),
            spinner_idx: 0,
            spinner_last: Instant::now(),
        }
    }

    fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push(msg.into());
        if self.logs.len() > MAX_LOG_LINES {
            let overflow = self.logs.len() - MAX_LOG_LINES;
            self.logs.drain(0..overflow);
        }
    }

    fn selected_row(&self) -> Option<&RowRecord> {
        self.list_state
            .selected()
            .and_then(|idx| self.listing.rows.get(idx))
    }

    fn show_listing(&mut self, listing: Arc<ListingPage>) {
        self.list_state
            .select((!listing.rows.is_empty()).then_some(0));
        self.status = format!("第 {} 页，共 {} 条", listing.page, listing.rows.len());
        self.listing = listing;
    }
}

pub fn run(
    repo: Arc<dyn Repository>,
    config: Arc<Config>,
    query: SearchQuery,
    first: ListingPage,
) -> Result<()> {
    let (worker_tx, worker_rx) = mpsc::channel();
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("init terminal")?;

    let app = App::new(repo, config, query, first, worker_tx, worker_rx);
    let result = run_loop(&mut terminal, app);

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    result
}

fn run_loop(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>, mut app: App) -> Result<()> {
    info!(target: "ui", "终端界面启动");
    loop {
        tick_spinner(&mut app);
        poll_worker(&mut app);
        drain_log_channel(&mut app);

        terminal.draw(|f| draw_ui(f, &mut app))?;

        if !event::poll(Duration::from_millis(200)).context("poll event")? {
            continue;
        }
        match event::read().context("read event")? {
            Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(&mut app, key),
            // 布局每帧重新计算，Resize 只需触发下一次绘制
            Event::Resize(_, _) => {}
            _ => {}
        }
        if app.should_quit {
            break;
        }
    }
    info!(target: "ui", "终端界面退出");
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return;
    }
    match app.mode {
        Mode::List => list::handle_key_list(app, key),
        Mode::Detail => detail::handle_key_detail(app, key),
        Mode::PagePicker => page_picker::handle_key_page_picker(app, key),
        Mode::Cover => cover::handle_key_cover(app, key),
    }
}

fn draw_ui(frame: &mut ratatui::Frame, app: &mut App) {
    let area = frame.size();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(LOG_HEIGHT),
        ])
        .split(area);

    draw_status_bar(frame, rows[0], app);
    list::draw_list(frame, rows[1], app);
    draw_page_indicator(frame, rows[2], app);
    render_log_box(frame, rows[3], app);

    match app.mode {
        Mode::List => {}
        Mode::Detail => detail::draw_detail(frame, app),
        Mode::PagePicker => page_picker::draw_page_picker(frame, app),
        Mode::Cover => cover::draw_cover(frame, app),
    }
}

fn draw_status_bar(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let counters = app.counters.text();
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(counters.chars().count() as u16 + 2),
        ])
        .split(area);
    let left = Paragraph::new(Line::from(vec![
        Span::styled(
            format!(" {} ", app.repo.name()),
            Style::default().fg(Color::Black).bg(Color::Cyan),
        ),
        Span::raw(" "),
        Span::raw(app.status.clone()),
    ]));
    frame.render_widget(left, cols[0]);
    frame.render_widget(
        Paragraph::new(counters).alignment(Alignment::Right),
        cols[1],
    );
}

fn draw_page_indicator(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let listing = &app.listing;
    let mut text = format!("第 {} / {} 页", listing.page, listing.max_page);
    if !listing.pagination_known {
        text.push_str("（未找到分页信息）");
    }
    if let Some(page) = app.page_inflight {
        text.push_str(&format!("  正在加载第 {page} 页"));
    }
    frame.render_widget(
        Paragraph::new(text)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Gray)),
        area,
    );
}

fn render_log_box(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let visible = area.height.saturating_sub(2).max(1) as usize;
    let lines: Vec<Line> = if app.logs.is_empty() {
        vec![Line::from("日志: 暂无")]
    } else {
        app.logs
            .iter()
            .rev()
            .take(visible)
            .rev()
            .map(|l| style_log_line(l))
            .collect()
    };
    let log = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("日志"));
    frame.render_widget(log, area);
}

fn style_log_line(line: &str) -> Line<'static> {
    let (level, rest) = line.trim_start().split_once(' ').unwrap_or((line, ""));
    let color = match level {
        "ERROR" => Color::Red,
        "WARN" => Color::Yellow,
        "INFO" => Color::Cyan,
        "DEBUG" | "TRACE" => Color::Gray,
        _ => return Line::from(line.to_string()),
    };
    Line::from(vec![
        Span::styled(
            level.to_string(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::raw(rest.trim_start().to_string()),
    ])
}

/// 居中的弹窗区域（按百分比）。
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let w = area.width.saturating_mul(percent_x) / 100;
    let h = area.height.saturating_mul(percent_y) / 100;
    Rect {
        x: area.x + (area.width.saturating_sub(w)) / 2,
        y: area.y + (area.height.saturating_sub(h)) / 2,
        width: w.max(1),
        height: h.max(1),
    }
}

fn start_spinner(app: &mut App, text: impl Into<String>) {
    app.spinner_active = true;
    app.spinner_text = text.into();
    app.spinner_idx = 0;
    app.spinner_last = Instant::now();
    app.status = format!("{} {}", app.spinner_text, SPINNER_FRAMES[app.spinner_idx]);
}

fn stop_spinner(app: &mut App) {
    app.spinner_active = false;
    app.spinner_text.clear();
}

fn tick_spinner(app: &mut App) {
    if !app.spinner_active || app.spinner_last.elapsed() < Duration::from_millis(140) {
        return;
    }
    app.spinner_idx = (app.spinner_idx + 1) % SPINNER_FRAMES.len();
    app.spinner_last = Instant::now();
    app.status = format!("{} {}", app.spinner_text, SPINNER_FRAMES[app.spinner_idx]);
}

fn drain_log_channel(app: &mut App) {
    if let Some(rx) = app.log_rx.clone() {
        for line in rx.try_iter() {
            app.push_log(line);
        }
    }
}

// ── 后台任务 ──────────────────────────────────────────────────

fn start_detail_task(app: &mut App) {
    if app.detail_inflight {
        app.status = "详情加载中，请稍候".to_string();
        return;
    }
    let Some(row) = app.selected_row().cloned() else {
        return;
    };
    app.detail_generation += 1;
    app.detail_inflight = true;
    start_spinner(app, "加载详情");

    let generation = app.detail_generation;
    let repo = Arc::clone(&app.repo);
    let tx = app.worker_tx.clone();
    thread::spawn(move || {
        let result = repo.book_info(&row).map(|book| (row, book));
        let _ = tx.send(WorkerMsg::DetailReady { generation, result });
    });
}

/// 翻到 `page`：越界直接拒绝；命中缓存立即切换；否则后台抓取，新请求覆盖旧请求。
fn request_page(app: &mut App, page: u32) -> bool {
    if let Err(err) = validate_page(page, app.listing.max_page) {
        app.status = format!("页码超出范围: {err}");
        return false;
    }
    if let Some(listing) = app.cache.get(page) {
        app.page_generation += 1;
        app.page_inflight = None;
        app.show_listing(listing);
        return true;
    }

    app.page_generation += 1;
    app.page_inflight = Some(page);
    start_spinner(app, format!("加载第 {page} 页"));

    let generation = app.page_generation;
    let max = app.listing.max_page;
    let query = app.query.clone();
    let repo = Arc::clone(&app.repo);
    let tx = app.worker_tx.clone();
    thread::spawn(move || {
        let result = load_page(repo.as_ref(), &query, page, max);
        let _ = tx.send(WorkerMsg::PageReady {
            generation,
            page,
            result,
        });
    });
    true
}

fn start_download_task(app: &mut App) {
    if app.download_inflight.is_some() {
        app.status = "已有下载进行中，请等待完成".to_string();
        return;
    }
    let Some(view) = app.detail.as_ref() else {
        return;
    };
    let Some(mirror) = view.selected_mirror() else {
        app.status = "没有可用的镜像".to_string();
        return;
    };
    let task = match DownloadTask::for_mirror(&view.book, mirror, &app.config.out_dir()) {
        Ok(task) => task,
        Err(err) => {
            app.status = format!("无法下载: {err}");
            return;
        }
    };

    let id = app.next_download_id;
    app.next_download_id += 1;
    app.download_inflight = Some(id);
    app.counters.on_download();
    app.mode = Mode::List;
    app.status = format!("开始下载《{}》 ({})", task.book.title, task.mirror);
    info!(target: "ui", id, mirror = %task.mirror, title = %task.book.title, "提交下载");

    let repo = Arc::clone(&app.repo);
    let config = Arc::clone(&app.config);
    let tx = app.worker_tx.clone();
    thread::spawn(move || {
        let progress_tx = tx.clone();
        let mut report = move |progress: DownloadProgress| {
            let _ = progress_tx.send(WorkerMsg::DownloadProgress { id, progress });
        };
        let result = run_download(repo.as_ref(), &task, &config, &mut report);
        let _ = tx.send(WorkerMsg::DownloadDone { id, result });
    });
}

fn poll_worker(app: &mut App) {
    while let Ok(msg) = app.worker_rx.try_recv() {
        handle_worker_msg(app, msg);
    }
}

fn handle_worker_msg(app: &mut App, msg: WorkerMsg) {
    match msg {
        WorkerMsg::DetailReady { generation, result } => {
            if generation != app.detail_generation || !app.detail_inflight {
                return;
            }
            app.detail_inflight = false;
            stop_spinner(app);
            match result {
                Ok((row, book)) => {
                    app.status = format!("《{}》 d 下载，Tab 切换镜像，Esc 返回", book.title);
                    app.detail = Some(DetailView::new(row, book));
                    if app.mode == Mode::List {
                        app.mode = Mode::Detail;
                    }
                }
                Err(err) => {
                    app.status = format!("加载详情失败: {err}");
                    warn!(target: "ui", "加载详情失败: {err}");
                }
            }
        }
        WorkerMsg::PageReady {
            generation,
            page,
            result,
        } => {
            if generation != app.page_generation {
                return;
            }
            app.page_inflight = None;
            stop_spinner(app);
            match result {
                Ok(listing) => {
                    let listing = app.cache.insert(listing);
                    debug!(target: "ui", page, cached = app.cache.len(), "列表页已缓存");
                    app.show_listing(listing);
                }
                Err(err) => {
                    app.status = format!("加载第 {page} 页失败: {err}");
                    warn!(target: "ui", page, "翻页失败: {err}");
                }
            }
        }
        WorkerMsg::DownloadProgress { id, progress } => {
            if app.download_inflight == Some(id) {
                app.counters.on_progress(progress);
            }
        }
        WorkerMsg::DownloadDone { id, result } => {
            if app.download_inflight == Some(id) {
                app.download_inflight = None;
            }
            match result {
                Ok(outcome) => {
                    app.counters.on_finished();
                    app.status = format!(
                        "已保存 {}（引用 {}）",
                        outcome.file.display(),
                        outcome.citation.display()
                    );
                    info!(target: "ui", file = %outcome.file.display(), bytes = outcome.bytes, "下载完成");
                }
                Err(err) => {
                    app.counters.on_error();
                    app.status = format!("下载失败: {err}");
                    warn!(target: "ui", "下载失败: {err}");
                }
            }
        }
        WorkerMsg::CoverReady { generation, result } => {
            if generation != app.cover_generation {
                return;
            }
            stop_spinner(app);
            app.cover_lines = match result {
                Ok(lines) if lines.is_empty() => vec!["封面太小，无法显示".to_string()],
                Ok(lines) => lines,
                Err(err) => vec![format!("封面加载失败: {err}")],
            };
            if app.mode == Mode::Cover {
                app.status = "封面 (Esc/q 返回)".to_string();
            }
        }
    }
}
