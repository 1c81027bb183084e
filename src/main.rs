//! Ebook Fragment Reader（分片电子书终端阅读器）。
//!
//! 阅读以 HTTP 目录形式发布的分页电子书（`content/<章节>/pNN.html`
//! 片段 + `toc.json` 目录 + `refs.json` 引用表），离线优先。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/本地偏好等基础设施
//! - `cache`：版本化磁盘缓存与 network-first / cache-first 策略网关
//! - `reader`：目录、路由/分页状态机、页面片段解析
//! - `ui`：ratatui 终端界面

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use clap::Parser;
use tracing::{info, warn};

mod base_system;
mod cache;
mod reader;
mod ui;

use base_system::config::{Config, load_or_create};
use base_system::logging::{LogOptions, LogSystem};
use base_system::prefs::PrefStore;
use cache::gateway::{CacheGateway, Destination, ReqwestTransport};
use cache::store::CacheStore;
use reader::references::ReferenceTable;
use reader::router::Router;
use reader::toc::TableOfContents;

/// 启动时预缓存的核心资产：离线阅读的最小集合。
const CORE_ASSETS: &[&str] = &["content/toc.json", "content/refs.json"];

#[derive(Debug, Parser)]
#[command(name = "ebook-fragment-reader")]
#[command(about = "离线优先的分片电子书终端阅读器", version)]
struct Cli {
    /// 书源基础 URL（省略时读取配置文件中的 book_url）
    book: Option<String>,

    /// 启动时跳转到的路由，如 '#/c2/3'
    #[arg(long)]
    open: Option<String>,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（存放 config.yml、缓存、偏好与日志）
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let _log = init_logging(cli.debug, &data_dir)?;

    let config: Config = load_or_create(Some(&data_dir)).map_err(|e| anyhow!(e.to_string()))?;

    let book_url = cli
        .book
        .clone()
        .or_else(|| (!config.book_url.trim().is_empty()).then(|| config.book_url.clone()));
    let Some(mut book_url) = book_url else {
        bail!("未指定书源：请传入 URL 参数或在 config.yml 填写 book_url");
    };
    // 相对路径解析依赖目录型 URL
    if !book_url.ends_with('/') {
        book_url.push('/');
    }
    info!(target: "startup", "书源: {book_url}");

    let transport = ReqwestTransport::new(
        Duration::from_secs(config.request_timeout),
        &config.user_agent,
    )?;
    let store = CacheStore::open(&data_dir.join("cache"), &config.cache_version)?;
    let gateway = CacheGateway::new(Box::new(transport), store, &book_url)?;

    // 预缓存失败不致命：本次会话在线阅读，下次启动再试
    if let Err(err) = gateway.install(CORE_ASSETS) {
        warn!(target: "startup", "核心资产预缓存失败（继续在线阅读）: {err:#}");
    }

    let toc_resp = gateway.fetch_path("content/toc.json", Destination::Other);
    if !toc_resp.is_ok() {
        bail!("目录加载失败（状态 {}），无法开始阅读", toc_resp.status);
    }
    let toc = TableOfContents::from_json(&toc_resp.text())?;
    info!(
        target: "startup",
        "目录加载完成: {} 章 / {} 页",
        toc.chapters.len(),
        toc.total_pages()
    );

    let refs_resp = gateway.fetch_path("content/refs.json", Destination::Other);
    let refs = if refs_resp.is_ok() {
        ReferenceTable::from_json_lossy(&refs_resp.text())
    } else {
        warn!("引用表加载失败（状态 {}），按空表处理", refs_resp.status);
        ReferenceTable::empty()
    };

    let prefs = PrefStore::load(data_dir.join("prefs.json"));
    let router = Router::new(toc, refs, prefs);

    ui::tui::run(router, Arc::new(gateway), cli.open)
}

fn init_logging(debug: bool, base_dir: &std::path::Path) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: false,
        broadcast_to_ui: true,
    };
    LogSystem::init_with_base(opts, Some(base_dir)).map_err(|e| anyhow!(e))
}
