//! 缓存策略网关：阅读器所有网络请求的必经之路。
//!
//! 请求分两类：
//! - 内容类（文档导航或路径含 `/content/`）走 network-first —— 在线时
//!   永远拿最新内容并顺手更新缓存，离线时回落缓存，连缓存都没有时
//!   合成一个 503 离线响应（绝不抛错）。
//! - 资源类（脚本/样式/清单等静态文件）走 cache-first —— 命中缓存直接
//!   返回，不发起网络请求；未命中才走网络并写入缓存。
//!
//! 跨源请求不拦截：直接透传，不缓存也不代理。

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

use super::store::{CacheStore, StoredResponse};

pub const OFFLINE_STATUS: u16 = 503;
const OFFLINE_MESSAGE: &str = "离线，且该内容尚未缓存。";

/// 请求目的地，对应浏览器的 request.destination 分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Script,
    Style,
    Manifest,
    Other,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub destination: Destination,
}

impl FetchRequest {
    pub fn content(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            destination: Destination::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    Synthetic,
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl FetchedResponse {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// 传输层接口。Err 表示网络层失败（连不上/超时），
/// HTTP 错误状态码不是 Err —— 照常返回并进入缓存，由上层判断。
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<TransportResponse>;
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<TransportResponse> {
        let resp = self.client.get(url).send()?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes()?.to_vec();
        Ok(TransportResponse {
            status,
            content_type,
            body,
        })
    }
}

pub struct CacheGateway {
    transport: Box<dyn Transport>,
    store: CacheStore,
    base: Url,
}

impl CacheGateway {
    pub fn new(transport: Box<dyn Transport>, store: CacheStore, base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("invalid base url {base_url}"))?;
        Ok(Self {
            transport,
            store,
            base,
        })
    }

    /// 相对路径 → 书源下的绝对 URL。
    pub fn absolutize(&self, path: &str) -> String {
        self.base
            .join(path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{}", self.base, path))
    }

    /// 安装：预抓取核心资产清单。任何一个失败都会回滚已写入的条目
    /// 并返回错误 —— 不允许留下不完整的离线资产集合。
    pub fn install(&self, core_assets: &[&str]) -> Result<()> {
        for path in core_assets {
            let url = self.absolutize(path);
            let fetched = match self.transport.get(&url) {
                Ok(r) if (200..300).contains(&r.status) => r,
                Ok(r) => {
                    self.store.clear().ok();
                    anyhow::bail!("预缓存 {url} 返回状态 {}", r.status);
                }
                Err(err) => {
                    self.store.clear().ok();
                    return Err(err.context(format!("预缓存 {url} 失败")));
                }
            };
            self.put_snapshot(&url, &fetched);
        }
        debug!("核心资产预缓存完成 ({} 项)", core_assets.len());
        Ok(())
    }

    /// 请求处理入口。永不失败：最坏情况返回合成的离线响应。
    pub fn fetch(&self, req: &FetchRequest) -> FetchedResponse {
        // 跨源透传，不缓存
        if !self.same_origin(&req.url) {
            return match self.transport.get(&req.url) {
                Ok(r) => from_network(r),
                Err(err) => {
                    warn!("跨源请求失败 {}: {err}", req.url);
                    synthetic_offline()
                }
            };
        }

        if is_content_class(req) {
            self.network_first(&req.url)
        } else {
            self.cache_first(&req.url)
        }
    }

    /// 便捷入口：按书源相对路径抓取内容。
    pub fn fetch_path(&self, path: &str, destination: Destination) -> FetchedResponse {
        self.fetch(&FetchRequest {
            url: self.absolutize(path),
            destination,
        })
    }

    fn network_first(&self, url: &str) -> FetchedResponse {
        match self.transport.get(url) {
            Ok(fetched) => {
                self.put_snapshot(url, &fetched);
                from_network(fetched)
            }
            Err(err) => {
                debug!("网络抓取失败，尝试缓存回落 {url}: {err}");
                match self.store.get(url) {
                    Some(cached) => from_cache(cached),
                    None => synthetic_offline(),
                }
            }
        }
    }

    fn cache_first(&self, url: &str) -> FetchedResponse {
        if let Some(cached) = self.store.get(url) {
            return from_cache(cached);
        }
        match self.transport.get(url) {
            Ok(fetched) => {
                self.put_snapshot(url, &fetched);
                from_network(fetched)
            }
            Err(err) => {
                warn!("资源抓取失败且无缓存 {url}: {err}");
                synthetic_offline()
            }
        }
    }

    fn put_snapshot(&self, url: &str, fetched: &TransportResponse) {
        let snapshot = StoredResponse {
            url: url.to_string(),
            status: fetched.status,
            content_type: fetched.content_type.clone(),
            body: fetched.body.clone(),
        };
        if let Err(err) = self.store.put(&snapshot) {
            warn!("缓存写入失败 {url}: {err}");
        }
    }

    fn same_origin(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        parsed.scheme() == self.base.scheme()
            && parsed.host_str() == self.base.host_str()
            && parsed.port_or_known_default() == self.base.port_or_known_default()
    }
}

fn is_content_class(req: &FetchRequest) -> bool {
    if req.destination == Destination::Document {
        return true;
    }
    Url::parse(&req.url)
        .map(|u| u.path().contains("/content/"))
        .unwrap_or(false)
}

fn from_network(r: TransportResponse) -> FetchedResponse {
    FetchedResponse {
        status: r.status,
        content_type: r.content_type,
        body: r.body,
        source: ResponseSource::Network,
    }
}

fn from_cache(r: StoredResponse) -> FetchedResponse {
    FetchedResponse {
        status: r.status,
        content_type: r.content_type,
        body: r.body,
        source: ResponseSource::Cache,
    }
}

fn synthetic_offline() -> FetchedResponse {
    FetchedResponse {
        status: OFFLINE_STATUS,
        content_type: Some("text/plain; charset=utf-8".to_string()),
        body: OFFLINE_MESSAGE.as_bytes().to_vec(),
        source: ResponseSource::Synthetic,
    }
}
