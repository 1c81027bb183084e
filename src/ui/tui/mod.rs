//! 终端阅读界面。
//!
//! 事件层只负责把按键/滚轮翻译成 `Intent`，所有状态变更集中在
//! `dispatch` 一处；内容抓取在工作线程完成，结果通过通道回传，
//! 由渲染序号决定是否采纳（期间发生过新导航的结果直接丢弃）。

use std::sync::{
    Arc,
    mpsc::{self, Receiver, Sender},
};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
    MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::style::{Color, Style};
use ratatui::widgets::ListState;
use tracing::{debug, info};

mod modal;
mod reading;
mod toc_drawer;

use modal::ModalContent;

use crate::base_system::logging::take_broadcast_rx;
use crate::base_system::prefs::Theme;
use crate::cache::gateway::{CacheGateway, Destination, FetchedResponse, ResponseSource};
use crate::reader::route::{Route, format_route};
use crate::reader::router::{RenderPlan, RenderedPage, Router};

/// 用户操作意图。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    NavPrev,
    NavNext,
    OpenToc,
    CloseOverlay,
    TocUp,
    TocDown,
    TocSelect,
    OpenAnnotation(usize),
    ToggleTheme,
    CycleFontSize,
    ToggleLogs,
    ScrollUp(u16),
    ScrollDown(u16),
    ScrollTop,
    ScrollBottom,
    Quit,
}

enum WorkerMsg {
    PageReady {
        seq: u64,
        route: Route,
        resp: FetchedResponse,
    },
}

pub(super) struct App {
    router: Router,
    gateway: Arc<CacheGateway>,
    current: Option<RenderedPage>,
    status: String,
    theme: Theme,
    font_size: u16,

    // 目录抽屉
    toc_open: bool,
    toc_state: ListState,

    // 注释模态框
    modal: Option<ModalContent>,

    // 正文滚动
    scroll: u16,
    scroll_max: u16,

    // 日志面板
    show_logs: bool,
    logs: Vec<String>,
    log_rx: Option<crossbeam_channel::Receiver<String>>,

    worker_tx: Sender<WorkerMsg>,
    worker_rx: Receiver<WorkerMsg>,
    should_quit: bool,
}

impl App {
    fn new(
        router: Router,
        gateway: Arc<CacheGateway>,
        worker_tx: Sender<WorkerMsg>,
        worker_rx: Receiver<WorkerMsg>,
    ) -> Self {
        let theme = router.prefs().theme();
        let font_size = router.prefs().font_size();
        Self {
            router,
            gateway,
            current: None,
            status: "←/→ 翻页 · t 目录 · 1-9 注释 · q 退出".to_string(),
            theme,
            font_size,
            toc_open: false,
            toc_state: ListState::default(),
            modal: None,
            scroll: 0,
            scroll_max: 0,
            show_logs: false,
            logs: Vec::new(),
            log_rx: take_broadcast_rx(),
            worker_tx,
            worker_rx,
            should_quit: false,
        }
    }

    fn push_log(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        let trimmed = msg.trim_end_matches(['\r', '\n']);
        self.logs.push(trimmed.to_string());
        if self.logs.len() > 200 {
            let overflow = self.logs.len() - 200;
            self.logs.drain(0..overflow);
        }
    }

    /// 触发一次导航渲染：重定向在本地立即收敛，抓取交给工作线程。
    fn trigger_route(&mut self, requested: Route) {
        let mut next = requested;
        loop {
            match self.router.begin_render(&next) {
                RenderPlan::Redirect(corrected) => {
                    debug!("路由重定向到 {}", format_route(&corrected));
                    next = corrected;
                }
                RenderPlan::Fetch { seq, route, path } => {
                    self.status = format!("加载 {path} …");
                    let gateway = Arc::clone(&self.gateway);
                    let tx = self.worker_tx.clone();
                    thread::spawn(move || {
                        let resp = gateway.fetch_path(&path, Destination::Other);
                        let _ = tx.send(WorkerMsg::PageReady { seq, route, resp });
                    });
                    return;
                }
            }
        }
    }
}

pub fn run(router: Router, gateway: Arc<CacheGateway>, open: Option<String>) -> Result<()> {
    let (worker_tx, worker_rx) = mpsc::channel();
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("init terminal")?;

    let result = run_loop(&mut terminal, router, gateway, open, worker_tx, worker_rx);

    disable_raw_mode().ok();
    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        LeaveAlternateScreen
    )
    .ok();
    terminal.show_cursor().ok();

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    router: Router,
    gateway: Arc<CacheGateway>,
    open: Option<String>,
    worker_tx: Sender<WorkerMsg>,
    worker_rx: Receiver<WorkerMsg>,
) -> Result<()> {
    let mut app = App::new(router, gateway, worker_tx, worker_rx);

    // 启动路由：深链接 > 上次阅读位置 > 第一章第 1 页
    let initial = app.router.initial_route(open.as_deref());
    info!("初始路由 {}", format_route(&initial));
    app.trigger_route(initial);

    loop {
        poll_worker(&mut app);
        drain_log_channel(&mut app);

        terminal.draw(|f| draw_ui(f, &mut app))?;

        if !handle_event(&mut app)? {
            break;
        }
    }

    Ok(())
}

fn draw_ui(frame: &mut ratatui::Frame, app: &mut App) {
    reading::draw_reading(frame, app);
    if app.toc_open {
        toc_drawer::draw_toc(frame, app);
    }
    if app.modal.is_some() {
        modal::draw_modal(frame, app);
    }
}

fn poll_worker(app: &mut App) {
    while let Ok(msg) = app.worker_rx.try_recv() {
        match msg {
            WorkerMsg::PageReady { seq, route, resp } => {
                let ok = resp.is_ok();
                if !ok {
                    info!(
                        "内容抓取失败 {} (状态 {})",
                        format_route(&route),
                        resp.status
                    );
                }
                let fetched = ok.then(|| resp.text());
                if let Some(page) = app.router.complete_render(seq, route, fetched) {
                    app.scroll = 0;
                    app.status = if page.placeholder {
                        if resp.source == ResponseSource::Synthetic {
                            resp.text()
                        } else {
                            format!("内容加载失败（状态 {}）", resp.status)
                        }
                    } else if resp.source == ResponseSource::Cache {
                        format!("{}（离线缓存）", page.fragment)
                    } else {
                        page.fragment.clone()
                    };
                    app.current = Some(page);
                }
            }
        }
    }
}

fn drain_log_channel(app: &mut App) {
    let Some(rx) = app.log_rx.clone() else {
        return;
    };
    while let Ok(line) = rx.try_recv() {
        app.push_log(line);
    }
}

fn handle_event(app: &mut App) -> Result<bool> {
    if !event::poll(Duration::from_millis(200)).context("poll event")? {
        return Ok(true);
    }

    match event::read().context("read event")? {
        Event::Key(key) => {
            if let Some(intent) = translate_key(app, key) {
                dispatch(app, intent);
            }
        }
        Event::Mouse(me) => match me.kind {
            MouseEventKind::ScrollUp => dispatch(app, Intent::ScrollUp(3)),
            MouseEventKind::ScrollDown => dispatch(app, Intent::ScrollDown(3)),
            _ => {}
        },
        _ => {}
    }

    Ok(!app.should_quit)
}

fn translate_key(app: &App, key: event::KeyEvent) -> Option<Intent> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Intent::Quit);
    }

    if app.modal.is_some() {
        return match key.code {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => Some(Intent::CloseOverlay),
            _ => None,
        };
    }

    if app.toc_open {
        return match key.code {
            KeyCode::Esc | KeyCode::Char('t') | KeyCode::Char('q') => Some(Intent::CloseOverlay),
            KeyCode::Up | KeyCode::Char('k') => Some(Intent::TocUp),
            KeyCode::Down | KeyCode::Char('j') => Some(Intent::TocDown),
            KeyCode::Enter => Some(Intent::TocSelect),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Left | KeyCode::Char('h') => Some(Intent::NavPrev),
        KeyCode::Right | KeyCode::Char('l') | KeyCode::Char(' ') => Some(Intent::NavNext),
        KeyCode::Char('t') => Some(Intent::OpenToc),
        KeyCode::Char('d') => Some(Intent::ToggleTheme),
        KeyCode::Char('f') => Some(Intent::CycleFontSize),
        KeyCode::Char('g') => Some(Intent::ToggleLogs),
        KeyCode::Up | KeyCode::Char('k') => Some(Intent::ScrollUp(1)),
        KeyCode::Down | KeyCode::Char('j') => Some(Intent::ScrollDown(1)),
        KeyCode::PageUp => Some(Intent::ScrollUp(5)),
        KeyCode::PageDown => Some(Intent::ScrollDown(5)),
        KeyCode::Home => Some(Intent::ScrollTop),
        KeyCode::End => Some(Intent::ScrollBottom),
        KeyCode::Esc | KeyCode::Char('q') => Some(Intent::Quit),
        KeyCode::Char(c @ '1'..='9') => Some(Intent::OpenAnnotation(c as usize - '1' as usize)),
        _ => None,
    }
}

fn dispatch(app: &mut App, intent: Intent) {
    match intent {
        Intent::Quit => app.should_quit = true,
        Intent::NavPrev => match app.router.navigate(-1) {
            Some(route) => app.trigger_route(route),
            None => app.status = "已在全书第一页".to_string(),
        },
        Intent::NavNext => match app.router.navigate(1) {
            Some(route) => app.trigger_route(route),
            None => app.status = "已在全书最后一页".to_string(),
        },
        Intent::OpenToc => {
            app.toc_open = true;
            let idx = app
                .router
                .toc()
                .chapter_index(&app.router.route().chapter_id);
            app.toc_state.select(idx.or(Some(0)));
        }
        Intent::CloseOverlay => {
            if app.modal.is_some() {
                app.modal = None;
            } else {
                app.toc_open = false;
            }
        }
        Intent::TocUp => {
            let len = app.router.toc().chapters.len();
            let prev = match app.toc_state.selected() {
                Some(0) | None => len.saturating_sub(1),
                Some(idx) => idx - 1,
            };
            app.toc_state.select(Some(prev));
        }
        Intent::TocDown => {
            let len = app.router.toc().chapters.len();
            let next = match app.toc_state.selected() {
                Some(idx) if idx + 1 < len => idx + 1,
                _ => 0,
            };
            app.toc_state.select(Some(next));
        }
        Intent::TocSelect => {
            let route = app
                .toc_state
                .selected()
                .and_then(|idx| app.router.toc().chapters.get(idx))
                .map(|ch| Route {
                    chapter_id: ch.id.clone(),
                    page: 1,
                });
            if let Some(route) = route {
                app.toc_open = false;
                app.trigger_route(route);
            }
        }
        Intent::OpenAnnotation(n) => {
            let content = app
                .current
                .as_ref()
                .and_then(|page| page.document.annotations.get(n))
                .map(|ann| ModalContent::from_annotation(ann, app.router.refs()));
            match content {
                Some(content) => app.modal = Some(content),
                None => app.status = format!("本页没有注释 [{}]", n + 1),
            }
        }
        Intent::ToggleTheme => {
            app.theme = app.router.prefs_mut().toggle_theme();
        }
        Intent::CycleFontSize => {
            app.font_size = app.router.prefs_mut().cycle_font_size();
            app.status = format!("字号 {}", app.font_size);
        }
        Intent::ToggleLogs => app.show_logs = !app.show_logs,
        Intent::ScrollUp(n) => app.scroll = app.scroll.saturating_sub(n),
        Intent::ScrollDown(n) => app.scroll = app.scroll.saturating_add(n).min(app.scroll_max),
        Intent::ScrollTop => app.scroll = 0,
        Intent::ScrollBottom => app.scroll = app.scroll_max,
    }
}

fn theme_base(theme: Theme) -> Style {
    match theme {
        Theme::Light => Style::default().fg(Color::Black).bg(Color::White),
        Theme::Dark => Style::default().fg(Color::Gray).bg(Color::Black),
    }
}

fn theme_accent(theme: Theme) -> Style {
    match theme {
        Theme::Light => Style::default().fg(Color::Blue),
        Theme::Dark => Style::default().fg(Color::Cyan),
    }
}
