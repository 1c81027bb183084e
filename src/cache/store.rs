//! 版本化的磁盘缓存仓库。
//!
//! 仓库名内嵌版本号（`ebook-cache-<token>`）。打开仓库即“激活”：
//! 缓存根目录下所有名字不同的旧仓库被整体删除（无逐条迁移）。
//! 条目按请求 URL 定位（sha256 文件名），正文与元信息分文件存放；
//! 并发写同一 key 按 last-writer-wins 处理，条目之间互不影响。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("cache metadata encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 缓存的响应快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    status: u16,
    content_type: Option<String>,
}

pub struct CacheStore {
    dir: PathBuf,
    name: String,
}

pub fn store_name(version: &str) -> String {
    format!("ebook-cache-{version}")
}

impl CacheStore {
    /// 打开（并激活）当前版本的仓库：创建目录并清掉所有旧版本仓库。
    pub fn open(cache_root: &Path, version: &str) -> Result<Self, CacheError> {
        let name = store_name(version);
        let dir = cache_root.join(&name);
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;

        sweep_old_stores(cache_root, &name);

        Ok(Self { dir, name })
    }

    pub fn put(&self, resp: &StoredResponse) -> Result<(), CacheError> {
        let stem = entry_stem(&resp.url);
        let meta = EntryMeta {
            url: resp.url.clone(),
            status: resp.status,
            content_type: resp.content_type.clone(),
        };

        // 先写临时文件再 rename，避免读到半截条目
        write_atomic(&self.dir.join(format!("{stem}.body")), &resp.body)?;
        write_atomic(
            &self.dir.join(format!("{stem}.meta.json")),
            serde_json::to_string(&meta)?.as_bytes(),
        )?;
        debug!("缓存写入: {} ({})", resp.url, self.name);
        Ok(())
    }

    /// 缺失或损坏的条目一律当作未缓存。
    pub fn get(&self, url: &str) -> Option<StoredResponse> {
        let stem = entry_stem(url);
        let meta_raw = fs::read_to_string(self.dir.join(format!("{stem}.meta.json"))).ok()?;
        let meta: EntryMeta = match serde_json::from_str(&meta_raw) {
            Ok(m) => m,
            Err(err) => {
                warn!("缓存元信息损坏，按未缓存处理: {url}: {err}");
                return None;
            }
        };
        let body = fs::read(self.dir.join(format!("{stem}.body"))).ok()?;
        Some(StoredResponse {
            url: meta.url,
            status: meta.status,
            content_type: meta.content_type,
            body,
        })
    }

    pub fn contains(&self, url: &str) -> bool {
        self.dir
            .join(format!("{}.meta.json", entry_stem(url)))
            .exists()
    }

    /// 清空当前仓库的全部条目（安装预缓存失败时回滚用，
    /// 不允许留下不完整的离线资产集合）。
    pub fn clear(&self) -> Result<(), CacheError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;
        for ent in entries.flatten() {
            let _ = fs::remove_file(ent.path());
        }
        Ok(())
    }
}

fn sweep_old_stores(cache_root: &Path, keep: &str) {
    let Ok(read_dir) = fs::read_dir(cache_root) else {
        return;
    };
    for ent in read_dir.flatten() {
        let path = ent.path();
        if !path.is_dir() {
            continue;
        }
        let Some(dir_name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if dir_name == keep {
            continue;
        }
        match fs::remove_dir_all(&path) {
            Ok(()) => info!("删除旧缓存仓库: {dir_name}"),
            Err(err) => warn!("删除旧缓存仓库失败 {dir_name}: {err}"),
        }
    }
}

fn entry_stem(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data).map_err(|source| CacheError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resp(url: &str, body: &str) -> StoredResponse {
        StoredResponse {
            url: url.to_string(),
            status: 200,
            content_type: Some("text/html".to_string()),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn put_then_get_roundtrip() {
        let root = TempDir::new().unwrap();
        let store = CacheStore::open(root.path(), "v1").unwrap();
        let r = resp("https://example.com/content/c1/p01.html", "<p>hi</p>");
        store.put(&r).unwrap();
        assert_eq!(store.get(&r.url), Some(r.clone()));
        assert!(store.contains(&r.url));
        assert!(!store.contains("https://example.com/other"));
    }

    #[test]
    fn last_writer_wins_per_key() {
        let root = TempDir::new().unwrap();
        let store = CacheStore::open(root.path(), "v1").unwrap();
        let url = "https://example.com/a";
        store.put(&resp(url, "old")).unwrap();
        store.put(&resp(url, "new")).unwrap();
        assert_eq!(store.get(url).unwrap().body, b"new");
    }

    #[test]
    fn opening_new_version_deletes_old_stores_in_full() {
        let root = TempDir::new().unwrap();
        let old = CacheStore::open(root.path(), "v1").unwrap();
        old.put(&resp("https://example.com/a", "x")).unwrap();

        let fresh = CacheStore::open(root.path(), "v2").unwrap();
        assert!(fresh.get("https://example.com/a").is_none());
        assert!(!root.path().join(store_name("v1")).exists());
        assert!(root.path().join(store_name("v2")).exists());
    }

    #[test]
    fn corrupt_meta_is_treated_as_missing() {
        let root = TempDir::new().unwrap();
        let store = CacheStore::open(root.path(), "v1").unwrap();
        let url = "https://example.com/a";
        store.put(&resp(url, "x")).unwrap();
        let meta_path = root
            .path()
            .join(store_name("v1"))
            .join(format!("{}.meta.json", entry_stem(url)));
        fs::write(&meta_path, "{broken").unwrap();
        assert!(store.get(url).is_none());
    }

    #[test]
    fn clear_removes_every_entry() {
        let root = TempDir::new().unwrap();
        let store = CacheStore::open(root.path(), "v1").unwrap();
        store.put(&resp("https://example.com/a", "x")).unwrap();
        store.put(&resp("https://example.com/b", "y")).unwrap();
        store.clear().unwrap();
        assert!(store.get("https://example.com/a").is_none());
        assert!(store.get("https://example.com/b").is_none());
    }
}
