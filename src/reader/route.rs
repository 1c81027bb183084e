//! 阅读路由：`#/<chapterId>/<page>` 片段与内容文件路径的互转。

use serde::{Deserialize, Serialize};

use super::toc::TableOfContents;

/// 当前阅读位置。chapter_id 在导航稳定后总是指向目录中存在的章节，
/// page 总是落在 `[1, chapter.pages]` 内（越界值由 redirect 修正，不会被渲染）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub chapter_id: String,
    pub page: u32,
}

/// 解析分享片段。缺失章节回落到目录第一章；缺失或非数字页码回落到 1。
///
/// 这里只做下限保护（page >= 1），不做上限截断：对章节实际页数的
/// 截断放在 render 阶段，以便用 redirect 修正而不是悄悄替换。
pub fn parse_route(fragment: &str, toc: &TableOfContents) -> Route {
    let raw = fragment.trim_start_matches('#');
    let mut parts = raw.split('/').filter(|s| !s.is_empty());

    let chapter_id = parts
        .next()
        .map(str::to_string)
        .unwrap_or_else(|| toc.first().id.clone());
    let page = parts
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(1)
        .max(1);

    Route { chapter_id, page }
}

pub fn format_route(route: &Route) -> String {
    format!("#/{}/{}", route.chapter_id, route.page)
}

/// 页面内容文件路径。文件路径的形状只在这里决定，
/// 内容镜像/搬迁只需要改这一个函数。
pub fn resolve_content_path(chapter_id: &str, page: u32) -> String {
    format!("content/{}/p{:02}.html", chapter_id, page)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toc() -> TableOfContents {
        TableOfContents::from_json(
            r#"{"chapters":[
                {"id":"c1","title":"One","pages":2},
                {"id":"c2","title":"Two","pages":3}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn parse_format_roundtrip_for_in_range_routes() {
        let toc = toc();
        for ch in &toc.chapters {
            for page in 1..=ch.pages {
                let route = Route {
                    chapter_id: ch.id.clone(),
                    page,
                };
                assert_eq!(parse_route(&format_route(&route), &toc), route);
            }
        }
    }

    #[test]
    fn parse_defaults() {
        let toc = toc();
        // 空片段 → 第一章第 1 页
        let r = parse_route("", &toc);
        assert_eq!(r.chapter_id, "c1");
        assert_eq!(r.page, 1);
        // 只有章节
        let r = parse_route("#/c2", &toc);
        assert_eq!(r.chapter_id, "c2");
        assert_eq!(r.page, 1);
        // 非数字页码
        let r = parse_route("#/c2/abc", &toc);
        assert_eq!(r.page, 1);
        // 0 页被抬到 1
        let r = parse_route("#/c2/0", &toc);
        assert_eq!(r.page, 1);
    }

    #[test]
    fn parse_keeps_out_of_range_page_for_redirect() {
        // 上限截断是 render 的职责，解析阶段保留原始值
        let r = parse_route("#/c1/99", &toc());
        assert_eq!(r.page, 99);
    }

    #[test]
    fn content_path_is_zero_padded() {
        assert_eq!(resolve_content_path("c1", 3), "content/c1/p03.html");
        assert_eq!(resolve_content_path("c1", 12), "content/c1/p12.html");
    }
}
