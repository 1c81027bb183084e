//! 本地偏好持久化（prefs.json）。
//!
//! 保存上次阅读路由、字号、主题和每章的阅读进度书签。
//! 读取容错：文件缺失、读不动或 JSON 损坏都按“没有偏好”处理，
//! 绝不让损坏的持久化数据弄崩应用。写入尽力而为（失败只记日志）。

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::reader::route::Route;

pub const FONT_SIZES: &[u16] = &[17, 18, 19, 20];
pub const DEFAULT_FONT_SIZE: u16 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Prefs {
    #[serde(default)]
    last_route: Option<Route>,
    #[serde(default)]
    font_size: Option<u16>,
    #[serde(default)]
    theme: Option<Theme>,
    /// 章节 id → 到过的最大页码（单调不减）
    #[serde(default)]
    read: HashMap<String, u32>,
}

pub struct PrefStore {
    path: PathBuf,
    prefs: Prefs,
}

impl PrefStore {
    pub fn load(path: PathBuf) -> Self {
        let prefs = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(prefs) => prefs,
                Err(err) => {
                    warn!("偏好文件损坏，使用默认值: {err}");
                    Prefs::default()
                }
            },
            Err(_) => Prefs::default(),
        };
        Self { path, prefs }
    }

    pub fn last_route(&self) -> Option<Route> {
        self.prefs.last_route.clone()
    }

    pub fn set_last_route(&mut self, route: &Route) {
        self.prefs.last_route = Some(route.clone());
        self.save();
    }

    pub fn font_size(&self) -> u16 {
        self.prefs.font_size.unwrap_or(DEFAULT_FONT_SIZE)
    }

    /// 字号在固定档位里循环（17→18→19→20→17）。
    pub fn cycle_font_size(&mut self) -> u16 {
        let current = self.font_size();
        let idx = FONT_SIZES.iter().position(|&s| s == current).unwrap_or(1);
        let next = FONT_SIZES[(idx + 1) % FONT_SIZES.len()];
        self.prefs.font_size = Some(next);
        self.save();
        next
    }

    pub fn theme(&self) -> Theme {
        self.prefs.theme.unwrap_or_default()
    }

    pub fn toggle_theme(&mut self) -> Theme {
        let next = match self.theme() {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        };
        self.prefs.theme = Some(next);
        self.save();
        next
    }

    pub fn read_progress(&self, chapter_id: &str) -> u32 {
        self.prefs.read.get(chapter_id).copied().unwrap_or(0)
    }

    /// 书签只增不减：重访早前的页不会回退进度。
    pub fn mark_read(&mut self, chapter_id: &str, page: u32) {
        let entry = self.prefs.read.entry(chapter_id.to_string()).or_insert(0);
        if page > *entry {
            *entry = page;
            self.save();
        }
    }

    fn save(&self) {
        let raw = match serde_json::to_string_pretty(&self.prefs) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("偏好序列化失败: {err}");
                return;
            }
        };
        let tmp = self.path.with_extension("json.tmp");
        let result = fs::write(&tmp, raw).and_then(|_| fs::rename(&tmp, &self.path));
        if let Err(err) = result {
            warn!("偏好写入失败 {}: {err}", self.path.display());
        }
    }
}
