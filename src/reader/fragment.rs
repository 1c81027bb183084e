//! 页面片段（HTML）到终端可读文档的转换。
//!
//! 提取正文段落，并收集页面里以 data-* 属性标注的注释元素：
//! 引用（data-ref）、可放大图片（data-zoom）、时间线事件（data-timeline）。

use regex::Regex;
use std::sync::OnceLock;

// 编译一次复用的正则缓存
fn re_block_token() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(r"(?is)(<h[1-6]\b[^>]*?>.*?</h[1-6]>)|(<p\b[^>]*?>.*?</p>)").unwrap()
    })
}

fn re_img_tag() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?is)<img\b[^>]*?>").unwrap())
}

fn re_ref_tag() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r#"(?is)<[a-z][a-z0-9]*\b[^>]*?\bdata-ref\s*=[^>]*?>"#).unwrap())
}

fn re_timeline_tag() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(r#"(?is)<[a-z][a-z0-9]*\b[^>]*?\bdata-timeline\s*=[^>]*?>"#).unwrap()
    })
}

fn re_all_tags() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?is)<[^>]+>").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading(String),
    Paragraph(String),
}

/// 页面里可打开模态框的注释元素。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    Reference {
        id: String,
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
        refs: Vec<String>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct PageDocument {
    pub blocks: Vec<Block>,
    pub annotations: Vec<Annotation>,
}

impl PageDocument {
    pub fn from_html(html: &str) -> Self {
        let mut blocks = Vec::new();
        for cap in re_block_token().captures_iter(html) {
            if let Some(h) = cap.get(1).map(|m| m.as_str()) {
                let text = tag_inner_text(h);
                if !text.is_empty() {
                    blocks.push(Block::Heading(text));
                }
                continue;
            }
            if let Some(p) = cap.get(2).map(|m| m.as_str()) {
                let text = tag_inner_text(p);
                if !text.is_empty() {
                    blocks.push(Block::Paragraph(text));
                }
            }
        }

        // 没有任何 <p>/<h*> 结构时退化为整体去标签
        if blocks.is_empty() {
            let plain = re_all_tags().replace_all(html, " ");
            let plain = unescape_basic_entities(plain.as_ref());
            let text = plain.split_whitespace().collect::<Vec<_>>().join(" ");
            if !text.is_empty() {
                blocks.push(Block::Paragraph(text));
            }
        }

        Self {
            blocks,
            annotations: collect_annotations(html),
        }
    }

    /// 提示占位文档：章节标题 + 错误说明（内容抓取失败永不致命）。
    pub fn placeholder(chapter_title: &str, message: &str) -> Self {
        Self {
            blocks: vec![
                Block::Heading(chapter_title.to_string()),
                Block::Paragraph(message.to_string()),
            ],
            annotations: Vec::new(),
        }
    }
}

fn collect_annotations(html: &str) -> Vec<Annotation> {
    let mut out = Vec::new();

    for tag in re_ref_tag().find_iter(html).map(|m| m.as_str()) {
        if let Some(id) = attr_value(tag, "data-ref") {
            if !id.is_empty() {
                out.push(Annotation::Reference { id });
            }
        }
    }

    for tag in re_img_tag().find_iter(html).map(|m| m.as_str()) {
        if attr_value(tag, "data-zoom").as_deref() != Some("1") {
            continue;
        }
        let Some(src) = attr_value(tag, "src") else {
            continue;
        };
        let alt = attr_value(tag, "alt").unwrap_or_else(|| "图".to_string());
        out.push(Annotation::Figure { src, alt });
    }

    for tag in re_timeline_tag().find_iter(html).map(|m| m.as_str()) {
        if attr_value(tag, "data-timeline").as_deref() != Some("1") {
            continue;
        }
        let refs = attr_value(tag, "data-refs")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        out.push(Annotation::Timeline {
            year: attr_value(tag, "data-year").unwrap_or_default(),
            title: attr_value(tag, "data-title").unwrap_or_else(|| "事件".to_string()),
            img: attr_value(tag, "data-img").filter(|s| !s.is_empty()),
            desc: attr_value(tag, "data-desc").unwrap_or_default(),
            refs,
        });
    }

    out
}

/// 取出单个标签内的属性值（单/双引号皆可）。
fn attr_value(tag: &str, name: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let mut search = 0usize;
    loop {
        let pos = lower[search..].find(name)? + search;
        // 属性名必须是完整单词（前面是空白，后面是 =）
        let before_ok = pos == 0
            || lower[..pos]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_whitespace());
        let rest = &tag[pos + name.len()..];
        let rest_trim = rest.trim_start();
        if before_ok && rest_trim.starts_with('=') {
            let after_eq = rest_trim[1..].trim_start();
            let quote = after_eq.chars().next()?;
            if quote == '"' || quote == '\'' {
                let body = &after_eq[1..];
                let end = body.find(quote)?;
                return Some(unescape_basic_entities(&body[..end]).into_owned());
            }
            return None;
        }
        search = pos + name.len();
    }
}

fn tag_inner_text(block: &str) -> String {
    let inner = re_all_tags().replace_all(block, " ");
    let inner = unescape_basic_entities(inner.as_ref());
    inner.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn unescape_basic_entities(s: &str) -> std::borrow::Cow<'_, str> {
    if !(s.contains("&amp;")
        || s.contains("&lt;")
        || s.contains("&gt;")
        || s.contains("&quot;")
        || s.contains("&#39;")
        || s.contains("&nbsp;"))
    {
        return std::borrow::Cow::Borrowed(s);
    }

    std::borrow::Cow::Owned(
        s.replace("&nbsp;", " ")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_headings_and_paragraphs() {
        let doc = PageDocument::from_html(
            "<h1>Capítulo</h1><h2>T&amp;C</h2><p>First <em>para</em>.</p><p> </p><p>Second.</p>",
        );
        assert_eq!(
            doc.blocks,
            vec![
                Block::Heading("Capítulo".to_string()),
                Block::Heading("T&C".to_string()),
                Block::Paragraph("First para .".to_string()),
                Block::Paragraph("Second.".to_string()),
            ]
        );
    }

    #[test]
    fn falls_back_to_stripped_text() {
        let doc = PageDocument::from_html("<div>loose <b>text</b> only</div>");
        assert_eq!(doc.blocks, vec![Block::Paragraph("loose text only".into())]);
    }

    #[test]
    fn collects_reference_annotations() {
        let doc = PageDocument::from_html(
            r##"<p>See<sup class="ref"><a href="#ref-3" data-ref="3">3</a></sup> and
               <a data-ref='12'>12</a>.</p>"##,
        );
        assert_eq!(
            doc.annotations,
            vec![
                Annotation::Reference { id: "3".into() },
                Annotation::Reference { id: "12".into() },
            ]
        );
    }

    #[test]
    fn collects_zoomable_figures_only() {
        let doc = PageDocument::from_html(
            r#"<img src="a.png" alt="plain"/>
               <img data-zoom="1" src="img/fig1.png" alt="Figura 1"/>"#,
        );
        assert_eq!(
            doc.annotations,
            vec![Annotation::Figure {
                src: "img/fig1.png".into(),
                alt: "Figura 1".into(),
            }]
        );
    }

    #[test]
    fn collects_timeline_event_with_refs() {
        let doc = PageDocument::from_html(
            r#"<button data-timeline="1" data-year="1969" data-title="Moon"
                 data-img="img/moon.jpg" data-desc="Landing" data-refs="1, 2,">go</button>"#,
        );
        assert_eq!(
            doc.annotations,
            vec![Annotation::Timeline {
                year: "1969".into(),
                title: "Moon".into(),
                img: Some("img/moon.jpg".into()),
                desc: "Landing".into(),
                refs: vec!["1".into(), "2".into()],
            }]
        );
    }

    #[test]
    fn placeholder_has_title_and_message() {
        let doc = PageDocument::placeholder("Capítulo 1", "页面文件加载失败: content/c1/p99.html");
        assert_eq!(doc.blocks.len(), 2);
        assert!(doc.annotations.is_empty());
    }
}
