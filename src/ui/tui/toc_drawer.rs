//! 目录抽屉：左侧覆盖层，带各章阅读进度标记。

use ratatui::layout::Rect;
use ratatui::style::Modifier;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem};

use super::{App, theme_accent, theme_base};

pub(super) fn draw_toc(frame: &mut ratatui::Frame, app: &mut App) {
    let area = frame.size();
    let width = (area.width / 3).max(30).min(area.width);
    let drawer = Rect {
        x: area.x,
        y: area.y,
        width,
        height: area.height,
    };

    let items: Vec<ListItem> = app
        .router
        .toc()
        .chapters
        .iter()
        .map(|ch| {
            let read = app.router.prefs().read_progress(&ch.id);
            // ✓ 读完 / · 读过 / 空 未读
            let marker = if read >= ch.pages {
                "✓"
            } else if read > 0 {
                "·"
            } else {
                " "
            };
            ListItem::new(format!("{marker} {}（{} 页）", ch.title, ch.pages))
        })
        .collect();

    let list = List::new(items)
        .style(theme_base(app.theme))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("目录 (Enter 跳转, Esc 关闭)"),
        )
        .highlight_style(theme_accent(app.theme).add_modifier(Modifier::BOLD))
        .highlight_symbol("▶ ");

    frame.render_widget(Clear, drawer);
    frame.render_stateful_widget(list, drawer, &mut app.toc_state);
}
