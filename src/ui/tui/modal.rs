//! 注释模态框：引用、插图与时间线事件。

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::Modifier;
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use crate::reader::fragment::Annotation;
use crate::reader::references::ReferenceTable;

use super::{App, theme_accent, theme_base};

const MISSING_REF: &str = "未在 refs.json 中找到该引用。";

/// 模态框内容在打开时就解析完毕（引用编号 → 原文），
/// 渲染阶段不再访问引用表。
#[derive(Debug, Clone)]
pub(super) enum ModalContent {
    Reference {
        id: String,
        text: Option<String>,
    },
    Figure {
        src: String,
        alt: String,
    },
    Timeline {
        year: String,
        title: String,
        img: Option<String>,
        desc: String,
        refs: Vec<(String, Option<String>)>,
    },
}

impl ModalContent {
    pub(super) fn from_annotation(ann: &Annotation, refs: &ReferenceTable) -> Self {
        match ann {
            Annotation::Reference { id } => Self::Reference {
                id: id.clone(),
                text: refs.lookup(id).map(str::to_string),
            },
            Annotation::Figure { src, alt } => Self::Figure {
                src: src.clone(),
                alt: alt.clone(),
            },
            Annotation::Timeline {
                year,
                title,
                img,
                desc,
                refs: ids,
            } => Self::Timeline {
                year: year.clone(),
                title: title.clone(),
                img: img.clone(),
                desc: desc.clone(),
                refs: ids
                    .iter()
                    .map(|id| (id.clone(), refs.lookup(id).map(str::to_string)))
                    .collect(),
            },
        }
    }
}

pub(super) fn draw_modal(frame: &mut ratatui::Frame, app: &mut App) {
    let Some(content) = app.modal.as_ref() else {
        return;
    };
    let base = theme_base(app.theme);
    let accent = theme_accent(app.theme);
    let modal = centered_rect(frame.size(), 60, 50);

    let (title, lines) = match content {
        ModalContent::Reference { id, text } => {
            let body = text.as_deref().unwrap_or(MISSING_REF).to_string();
            (format!("引用 [{id}]"), vec![Line::raw(body)])
        }
        ModalContent::Figure { src, alt } => (
            "图".to_string(),
            vec![
                Line::styled(alt.clone(), accent.add_modifier(Modifier::BOLD)),
                Line::raw(""),
                Line::raw(format!("图片地址: {src}")),
            ],
        ),
        ModalContent::Timeline {
            year,
            title,
            img,
            desc,
            refs,
        } => {
            let mut lines = vec![Line::raw(desc.clone())];
            if let Some(img) = img {
                lines.push(Line::raw(""));
                lines.push(Line::raw(format!("图片地址: {img}")));
            }
            if !refs.is_empty() {
                lines.push(Line::raw(""));
                lines.push(Line::styled("相关引用:".to_string(), accent));
                for (id, text) in refs {
                    let body = text.as_deref().unwrap_or(MISSING_REF);
                    lines.push(Line::raw(format!("[{id}] {body}")));
                }
            }
            (format!("{year} · {title}"), lines)
        }
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .style(base)
        .title(format!("{title} (Esc 关闭)"));
    let inner = block.inner(modal);

    frame.render_widget(Clear, modal);
    frame.render_widget(block, modal);
    frame.render_widget(
        Paragraph::new(lines).style(base).wrap(Wrap { trim: true }),
        inner,
    );
}

fn centered_rect(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);
    horizontal[1]
}
