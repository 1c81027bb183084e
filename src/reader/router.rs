//! 路由/分页状态机。
//!
//! Router 是唯一持有导航状态的容器：当前路由、渲染阶段、渲染序号。
//! 所有变更都通过它的操作进行，没有游离的全局状态。
//!
//! 渲染流程（严格顺序）：
//! `begin_render` 做章节查找与页码截断 —— 截断值与请求值不同时不渲染，
//! 而是改写路由并要求调用方重新触发（redirect-before-render，越界页码
//! 永远不会被展示，也不会重复累计阅读进度）；否则给出待抓取的内容路径。
//! 抓取完成后 `complete_render` 校验渲染序号（丢弃过期的渲染结果），
//! 更新导航可用性/进度/书签并持久化路由。

use tracing::{debug, info};

use crate::base_system::prefs::PrefStore;

use super::fragment::PageDocument;
use super::references::ReferenceTable;
use super::route::{Route, format_route, parse_route, resolve_content_path};
use super::toc::TableOfContents;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Idle,
    Loading,
    Redirecting,
    Rendered,
}

/// 渲染后派生的导航可用性。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavState {
    pub prev_enabled: bool,
    pub next_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub route: Route,
    pub fragment: String,
    pub chapter_title: String,
    pub chapter_pages: u32,
    pub document: PageDocument,
    pub placeholder: bool,
    pub nav: NavState,
    pub progress_percent: u8,
}

/// `begin_render` 的结果：要么重定向（调用方重新触发），要么去抓内容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderPlan {
    Redirect(Route),
    Fetch { seq: u64, route: Route, path: String },
}

pub struct Router {
    toc: TableOfContents,
    refs: ReferenceTable,
    prefs: PrefStore,
    route: Route,
    phase: RenderPhase,
    render_seq: u64,
}

impl Router {
    pub fn new(toc: TableOfContents, refs: ReferenceTable, prefs: PrefStore) -> Self {
        let route = Route {
            chapter_id: toc.first().id.clone(),
            page: 1,
        };
        Self {
            toc,
            refs,
            prefs,
            route,
            phase: RenderPhase::Idle,
            render_seq: 0,
        }
    }

    pub fn toc(&self) -> &TableOfContents {
        &self.toc
    }

    pub fn refs(&self) -> &ReferenceTable {
        &self.refs
    }

    pub fn prefs(&self) -> &PrefStore {
        &self.prefs
    }

    pub fn prefs_mut(&mut self) -> &mut PrefStore {
        &mut self.prefs
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    /// 启动路由策略：深链接 > 持久化的上次路由 > 第一章第 1 页。
    /// 返回值即当前路由，调用方应立刻据此触发渲染（路由与展示保持同步）。
    pub fn initial_route(&mut self, deep_link: Option<&str>) -> Route {
        let route = if let Some(fragment) = deep_link.filter(|f| f.trim_start_matches('#').len() > 1)
        {
            parse_route(fragment, &self.toc)
        } else if let Some(saved) = self.prefs.last_route() {
            if self.toc.chapter(&saved.chapter_id).is_some() {
                saved
            } else {
                debug!("持久化路由指向未知章节 {}，回落默认", saved.chapter_id);
                Route {
                    chapter_id: self.toc.first().id.clone(),
                    page: 1,
                }
            }
        } else {
            Route {
                chapter_id: self.toc.first().id.clone(),
                page: 1,
            }
        };
        self.route = route.clone();
        route
    }

    /// 校验并规划一次渲染。越界（页码或未知章节）→ Redirect，不发起抓取。
    pub fn begin_render(&mut self, requested: &Route) -> RenderPlan {
        self.phase = RenderPhase::Loading;

        // 未知章节按恢复策略处理：重定向到第一章（页码对第一章截断）
        let Some(chapter) = self.toc.chapter(&requested.chapter_id) else {
            let first = self.toc.first();
            let corrected = Route {
                chapter_id: first.id.clone(),
                page: requested.page.clamp(1, first.pages),
            };
            info!(
                "未知章节 {}，重定向到 {}",
                requested.chapter_id,
                format_route(&corrected)
            );
            self.phase = RenderPhase::Redirecting;
            self.route = corrected.clone();
            return RenderPlan::Redirect(corrected);
        };

        let clamped = requested.page.clamp(1, chapter.pages);
        if clamped != requested.page {
            let corrected = Route {
                chapter_id: requested.chapter_id.clone(),
                page: clamped,
            };
            info!(
                "页码越界 {} → 重定向到 {}",
                requested.page,
                format_route(&corrected)
            );
            self.phase = RenderPhase::Redirecting;
            self.route = corrected.clone();
            return RenderPlan::Redirect(corrected);
        }

        self.route = requested.clone();
        self.render_seq += 1;
        RenderPlan::Fetch {
            seq: self.render_seq,
            route: requested.clone(),
            path: resolve_content_path(&requested.chapter_id, requested.page),
        }
    }

    /// 抓取完成。过期序号（期间又发生了新导航）直接丢弃，返回 None。
    ///
    /// `fetched` 为 None 表示内容抓取失败 —— 渲染确定性的占位文档，
    /// 阅读会话继续（内容抓取失败永不致命）。
    pub fn complete_render(
        &mut self,
        seq: u64,
        route: Route,
        fetched: Option<String>,
    ) -> Option<RenderedPage> {
        if seq != self.render_seq {
            debug!("丢弃过期渲染结果 seq={seq} (当前 {})", self.render_seq);
            return None;
        }

        let chapter = self.toc.chapter(&route.chapter_id)?.clone();
        let path = resolve_content_path(&route.chapter_id, route.page);

        let (document, placeholder) = match fetched {
            Some(html) => (PageDocument::from_html(&html), false),
            None => (
                PageDocument::placeholder(&chapter.title, &format!("页面文件加载失败: {path}")),
                true,
            ),
        };

        let nav = NavState {
            prev_enabled: !self.is_at_start(&route),
            next_enabled: !self.is_at_end(&route),
        };
        let progress_percent = self.progress_percent(&route);

        // 书签单调不减；路由在每次成功（或占位）渲染后持久化
        self.prefs.mark_read(&route.chapter_id, route.page);
        self.prefs.set_last_route(&route);

        self.phase = RenderPhase::Rendered;
        self.route = route.clone();

        Some(RenderedPage {
            fragment: format_route(&route),
            chapter_title: chapter.title,
            chapter_pages: chapter.pages,
            document,
            placeholder,
            nav,
            progress_percent,
            route,
        })
    }

    /// 章内翻页；越过章边界时进入相邻章的末页/首页。
    /// 书首往前、书尾往后都是 no-op（无环绕），返回 None。
    pub fn navigate(&self, direction: i32) -> Option<Route> {
        let chapters = &self.toc.chapters;
        let ch_index = self.toc.chapter_index(&self.route.chapter_id)?;
        let chapter = &chapters[ch_index];

        let next_page = self.route.page as i64 + direction as i64;
        if next_page >= 1 && next_page <= chapter.pages as i64 {
            return Some(Route {
                chapter_id: self.route.chapter_id.clone(),
                page: next_page as u32,
            });
        }

        let next_index = ch_index as i64 + if direction > 0 { 1 } else { -1 };
        if next_index < 0 || next_index as usize >= chapters.len() {
            return None;
        }

        let next_ch = &chapters[next_index as usize];
        Some(Route {
            chapter_id: next_ch.id.clone(),
            page: if direction > 0 { 1 } else { next_ch.pages },
        })
    }

    fn is_at_start(&self, route: &Route) -> bool {
        self.toc.chapter_index(&route.chapter_id) == Some(0) && route.page == 1
    }

    fn is_at_end(&self, route: &Route) -> bool {
        let last = self.toc.chapters.len().saturating_sub(1);
        self.toc.chapter_index(&route.chapter_id) == Some(last)
            && route.page == self.toc.last().pages
    }

    fn progress_percent(&self, route: &Route) -> u8 {
        let total = self.toc.total_pages();
        let Some(linear) = self.toc.linear_index(&route.chapter_id, route.page) else {
            return 0;
        };
        (100.0 * linear as f64 / total as f64).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_router() -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let toc = TableOfContents::from_json(
            r#"{"chapters":[
                {"id":"c1","title":"One","pages":2},
                {"id":"c2","title":"Two","pages":3}
            ]}"#,
        )
        .unwrap();
        let prefs = PrefStore::load(dir.path().join("prefs.json"));
        (
            Router::new(toc, ReferenceTable::empty(), prefs),
            dir,
        )
    }

    fn render(router: &mut Router, route: Route, html: Option<&str>) -> RenderedPage {
        match router.begin_render(&route) {
            RenderPlan::Fetch { seq, route, .. } => router
                .complete_render(seq, route, html.map(str::to_string))
                .expect("fresh seq"),
            RenderPlan::Redirect(r) => panic!("unexpected redirect to {r:?}"),
        }
    }

    #[test]
    fn out_of_range_page_redirects_before_any_fetch() {
        let (mut router, _dir) = make_router();
        let plan = router.begin_render(&Route {
            chapter_id: "c1".into(),
            page: 99,
        });
        assert_eq!(
            plan,
            RenderPlan::Redirect(Route {
                chapter_id: "c1".into(),
                page: 2,
            })
        );
        assert_eq!(router.phase(), RenderPhase::Redirecting);

        // 修正后的路由才会产生抓取
        let plan = router.begin_render(&Route {
            chapter_id: "c1".into(),
            page: 2,
        });
        assert!(matches!(plan, RenderPlan::Fetch { .. }));
    }

    #[test]
    fn unknown_chapter_redirects_to_first() {
        let (mut router, _dir) = make_router();
        let plan = router.begin_render(&Route {
            chapter_id: "nope".into(),
            page: 7,
        });
        assert_eq!(
            plan,
            RenderPlan::Redirect(Route {
                chapter_id: "c1".into(),
                page: 2,
            })
        );
    }

    #[test]
    fn render_updates_nav_progress_and_bookmark() {
        let (mut router, _dir) = make_router();
        let page = render(
            &mut router,
            Route {
                chapter_id: "c1".into(),
                page: 2,
            },
            Some("<p>hello</p>"),
        );
        assert!(!page.placeholder);
        assert!(page.nav.prev_enabled);
        assert!(page.nav.next_enabled);
        // linear 2 / total 5 → 40%
        assert_eq!(page.progress_percent, 40);
        assert_eq!(router.prefs().read_progress("c1"), 2);
        assert_eq!(
            router.prefs().last_route(),
            Some(Route {
                chapter_id: "c1".into(),
                page: 2,
            })
        );
        assert_eq!(router.phase(), RenderPhase::Rendered);
    }

    #[test]
    fn fetch_failure_renders_placeholder_and_session_continues() {
        let (mut router, _dir) = make_router();
        let page = render(
            &mut router,
            Route {
                chapter_id: "c2".into(),
                page: 1,
            },
            None,
        );
        assert!(page.placeholder);
        assert_eq!(page.chapter_title, "Two");
        // 占位渲染依然推进状态机与书签
        assert_eq!(router.phase(), RenderPhase::Rendered);
        assert_eq!(router.prefs().read_progress("c2"), 1);
    }

    #[test]
    fn stale_render_results_are_discarded() {
        let (mut router, _dir) = make_router();
        let first = router.begin_render(&Route {
            chapter_id: "c1".into(),
            page: 1,
        });
        let RenderPlan::Fetch { seq: old_seq, route: old_route, .. } = first else {
            panic!("expected fetch");
        };
        // 第二次导航在第一次抓取完成前发生
        let second = router.begin_render(&Route {
            chapter_id: "c2".into(),
            page: 1,
        });
        let RenderPlan::Fetch { seq, route, .. } = second else {
            panic!("expected fetch");
        };

        assert!(
            router
                .complete_render(old_seq, old_route, Some("<p>old</p>".into()))
                .is_none()
        );
        let page = router
            .complete_render(seq, route, Some("<p>new</p>".into()))
            .unwrap();
        assert_eq!(page.route.chapter_id, "c2");
    }

    #[test]
    fn navigate_crosses_chapter_boundaries() {
        let (mut router, _dir) = make_router();
        render(
            &mut router,
            Route {
                chapter_id: "c1".into(),
                page: 2,
            },
            Some("<p>x</p>"),
        );
        // {c1,2} + 1 → {c2,1}
        assert_eq!(
            router.navigate(1),
            Some(Route {
                chapter_id: "c2".into(),
                page: 1,
            })
        );
        // {c1,2} - 1 → {c1,1}
        assert_eq!(
            router.navigate(-1),
            Some(Route {
                chapter_id: "c1".into(),
                page: 1,
            })
        );

        render(
            &mut router,
            Route {
                chapter_id: "c2".into(),
                page: 1,
            },
            Some("<p>x</p>"),
        );
        // 退回上一章落在末页
        assert_eq!(
            router.navigate(-1),
            Some(Route {
                chapter_id: "c1".into(),
                page: 2,
            })
        );
    }

    #[test]
    fn navigate_is_noop_at_book_edges() {
        let (mut router, _dir) = make_router();
        render(
            &mut router,
            Route {
                chapter_id: "c1".into(),
                page: 1,
            },
            Some("<p>x</p>"),
        );
        assert_eq!(router.navigate(-1), None);

        render(
            &mut router,
            Route {
                chapter_id: "c2".into(),
                page: 3,
            },
            Some("<p>x</p>"),
        );
        assert_eq!(router.navigate(1), None);
    }

    #[test]
    fn progress_scenario_from_contract() {
        let (mut router, _dir) = make_router();
        let page = render(
            &mut router,
            Route {
                chapter_id: "c1".into(),
                page: 2,
            },
            Some("<p>x</p>"),
        );
        assert_eq!(page.progress_percent, 40);

        let next = router.navigate(1).unwrap();
        let page = render(&mut router, next, Some("<p>x</p>"));
        assert_eq!(page.route, Route { chapter_id: "c2".into(), page: 1 });
        assert_eq!(page.progress_percent, 60);
    }

    #[test]
    fn bookmark_never_decreases() {
        let (mut router, _dir) = make_router();
        for page in [2u32, 1, 2, 1] {
            render(
                &mut router,
                Route {
                    chapter_id: "c1".into(),
                    page,
                },
                Some("<p>x</p>"),
            );
        }
        assert_eq!(router.prefs().read_progress("c1"), 2);
    }

    #[test]
    fn initial_route_policy() {
        let (mut router, _dir) = make_router();
        // 深链接优先
        let r = router.initial_route(Some("#/c2/2"));
        assert_eq!(r, Route { chapter_id: "c2".into(), page: 2 });

        // 无深链接时恢复持久化路由
        router.prefs_mut().set_last_route(&Route {
            chapter_id: "c2".into(),
            page: 3,
        });
        let r = router.initial_route(None);
        assert_eq!(r, Route { chapter_id: "c2".into(), page: 3 });

        // 持久化路由指向未知章节 → 默认
        router.prefs_mut().set_last_route(&Route {
            chapter_id: "gone".into(),
            page: 3,
        });
        let r = router.initial_route(None);
        assert_eq!(r, Route { chapter_id: "c1".into(), page: 1 });
    }

    #[test]
    fn boundary_nav_state() {
        let (mut router, _dir) = make_router();
        let page = render(
            &mut router,
            Route {
                chapter_id: "c1".into(),
                page: 1,
            },
            Some("<p>x</p>"),
        );
        assert!(!page.nav.prev_enabled);
        assert!(page.nav.next_enabled);

        let page = render(
            &mut router,
            Route {
                chapter_id: "c2".into(),
                page: 3,
            },
            Some("<p>x</p>"),
        );
        assert!(page.nav.prev_enabled);
        assert!(!page.nav.next_enabled);
        assert_eq!(page.progress_percent, 100);
    }
}
