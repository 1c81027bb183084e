//! 阅读主视图：章节头、正文、日志面板与状态栏。

use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::Modifier;
use ratatui::text::Line;
use ratatui::widgets::{
    Block, Borders, Gauge, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
};

use crate::reader::fragment::{Annotation, Block as TextBlock};

use super::{App, theme_accent, theme_base};

pub(super) fn draw_reading(frame: &mut ratatui::Frame, app: &mut App) {
    let base = theme_base(app.theme);
    let area = frame.size();
    frame.render_widget(Block::default().style(base), area);

    let log_height: u16 = if app.show_logs { 8 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(log_height),
            Constraint::Length(3),
        ])
        .split(area);

    draw_header(frame, app, chunks[0]);
    draw_body(frame, app, chunks[1]);
    if app.show_logs {
        draw_logs(frame, app, chunks[2]);
    }
    draw_status(frame, app, chunks[3]);
}

fn draw_header(frame: &mut ratatui::Frame, app: &App, area: Rect) {
    let base = theme_base(app.theme);
    let text = match app.current.as_ref() {
        Some(page) => format!(
            "{}  ·  第 {}/{} 页  ·  {}",
            page.chapter_title, page.route.page, page.chapter_pages, page.fragment
        ),
        None => "加载中…".to_string(),
    };
    let header = Paragraph::new(text)
        .style(base.add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).style(base));
    frame.render_widget(header, area);
}

fn draw_body(frame: &mut ratatui::Frame, app: &mut App, area: Rect) {
    let base = theme_base(app.theme);
    let accent = theme_accent(app.theme);

    let block = Block::default().borders(Borders::ALL).style(base);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(page) = app.current.as_ref() else {
        frame.render_widget(Paragraph::new("加载中…").style(base), inner);
        return;
    };

    // 字号档位映射为排版列宽；列宽小于窗口时正文水平居中
    let text_width = (app.font_size as usize * 4)
        .min(inner.width.max(1) as usize)
        .max(16);

    let mut lines: Vec<Line> = Vec::new();
    for b in &page.document.blocks {
        match b {
            TextBlock::Heading(text) => {
                for wrapped in textwrap::wrap(text, text_width) {
                    lines.push(Line::styled(
                        wrapped.into_owned(),
                        accent.add_modifier(Modifier::BOLD),
                    ));
                }
            }
            TextBlock::Paragraph(text) => {
                for wrapped in textwrap::wrap(text, text_width) {
                    lines.push(Line::raw(wrapped.into_owned()));
                }
            }
        }
        lines.push(Line::raw(""));
    }

    if !page.document.annotations.is_empty() {
        lines.push(Line::styled("— 注释 —".to_string(), accent));
        for (i, ann) in page.document.annotations.iter().enumerate() {
            let label = match ann {
                Annotation::Reference { id } => format!("[{}] 引用 {id}", i + 1),
                Annotation::Figure { alt, .. } => format!("[{}] 图：{alt}", i + 1),
                Annotation::Timeline { year, title, .. } => {
                    format!("[{}] 时间线：{year} {title}", i + 1)
                }
            };
            for wrapped in textwrap::wrap(&label, text_width) {
                lines.push(Line::raw(wrapped.into_owned()));
            }
        }
    }

    let total = lines.len();
    let visible = inner.height as usize;
    app.scroll_max = total.saturating_sub(visible).min(u16::MAX as usize) as u16;
    app.scroll = app.scroll.min(app.scroll_max);

    let margin = (inner.width as usize).saturating_sub(text_width) / 2;
    let text_area = Rect {
        x: inner.x.saturating_add(margin as u16),
        y: inner.y,
        width: text_width as u16,
        height: inner.height,
    };

    let para = Paragraph::new(lines)
        .style(base)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));
    frame.render_widget(para, text_area);

    if app.scroll_max > 0 {
        let sb_area = Rect {
            x: inner.x.saturating_add(inner.width.saturating_sub(1)),
            y: inner.y,
            width: 1,
            height: inner.height,
        };
        let mut state = ScrollbarState::new(total).position(app.scroll as usize);
        let sb = Scrollbar::default().orientation(ScrollbarOrientation::VerticalRight);
        frame.render_stateful_widget(sb, sb_area, &mut state);
    }
}

fn draw_logs(frame: &mut ratatui::Frame, app: &App, area: Rect) {
    let base = theme_base(app.theme);
    let visible = area.height.saturating_sub(2) as usize;
    let start = app.logs.len().saturating_sub(visible);
    let lines: Vec<Line> = app.logs[start..]
        .iter()
        .map(|l| Line::raw(l.clone()))
        .collect();
    let para = Paragraph::new(lines)
        .style(base)
        .block(Block::default().borders(Borders::ALL).title("日志 (g 关闭)"));
    frame.render_widget(para, area);
}

fn draw_status(frame: &mut ratatui::Frame, app: &App, area: Rect) {
    let base = theme_base(app.theme);
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(26)])
        .split(area);

    let status = Paragraph::new(app.status.clone()).style(base).block(
        Block::default()
            .borders(Borders::ALL)
            .style(base)
            .title("←/→ 翻页 · t 目录 · 1-9 注释 · d 主题 · f 字号"),
    );
    frame.render_widget(status, chunks[0]);

    let percent = app
        .current
        .as_ref()
        .map(|p| p.progress_percent)
        .unwrap_or(0);
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("全书进度"))
        .gauge_style(theme_accent(app.theme).add_modifier(Modifier::BOLD))
        .percent(percent as u16);
    frame.render_widget(gauge, chunks[1]);
}
