//! 配置文件（config.yml）读写与带注释生成。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid yaml at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    pub description: &'static str,
}

pub trait ConfigSpec: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;
    fn fields() -> &'static [FieldMeta];
}

/// 阅读器配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 书源基础 URL（content/、toc.json 都相对它解析）
    #[serde(default)]
    pub book_url: String,

    // 网络配置
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // 缓存配置
    #[serde(default = "default_cache_version")]
    pub cache_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            book_url: String::new(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            cache_version: default_cache_version(),
        }
    }
}

fn default_request_timeout() -> u64 {
    15
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; ebook-fragment-reader)".to_string()
}

fn default_cache_version() -> String {
    "v1".to_string()
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        &[
            FieldMeta {
                name: "book_url",
                description: "书源基础 URL，例如 https://books.example.com/mybook/",
            },
            FieldMeta {
                name: "request_timeout",
                description: "单次请求超时（秒）",
            },
            FieldMeta {
                name: "user_agent",
                description: "请求使用的 User-Agent",
            },
            FieldMeta {
                name: "cache_version",
                description: "缓存仓库版本号；改动后下次启动整仓替换旧缓存",
            },
        ]
    }
}

/// 加载或创建配置文件。文件不存在时写出带注释的默认配置；
/// 存在时把用户值合并到默认值上（缺字段会被补写回文件）。
pub fn load_or_create<T: ConfigSpec>(base_dir: Option<&Path>) -> Result<T, ConfigError> {
    let path = base_dir
        .map(|d| d.join(T::FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(T::FILE_NAME));
    ensure_parent(&path)?;

    if !path.exists() {
        let default_config = T::default();
        write_with_comments(&default_config, &path)?;
        return Ok(default_config);
    }

    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let user_yaml: Value = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;

    let mut merged = serde_yaml::to_value(T::default())
        .map_err(|err| ConfigError::Validation(err.to_string()))?;
    let missing = merge_values(&mut merged, user_yaml);

    let config: T =
        serde_yaml::from_value(merged).map_err(|err| ConfigError::Validation(err.to_string()))?;

    if missing {
        write_with_comments(&config, &path)?;
    }

    Ok(config)
}

pub fn write_with_comments<T: ConfigSpec>(config: &T, path: &Path) -> Result<(), ConfigError> {
    ensure_parent(path)?;
    let yaml = generate_yaml_with_comments(config)?;
    fs::write(path, yaml).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn generate_yaml_with_comments<T: ConfigSpec>(config: &T) -> Result<String, ConfigError> {
    let value =
        serde_yaml::to_value(config).map_err(|err| ConfigError::Validation(err.to_string()))?;
    let Value::Mapping(mapping) = value else {
        return Err(ConfigError::Validation(
            "config must serialize to a mapping".to_string(),
        ));
    };

    let mut lines = Vec::new();
    for field in T::fields() {
        if !field.description.is_empty() {
            lines.push(format!("# {}", field.description.replace('\n', "\n# ")));
        }
        let key = Value::String(field.name.to_string());
        let val = mapping.get(&key).cloned().unwrap_or(Value::Null);
        let yaml_line = serde_yaml::to_string(&serde_yaml::Mapping::from_iter([(key, val)]))
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        lines.push(yaml_line.trim().to_string());
    }
    lines.push(String::new());

    Ok(lines.join("\n"))
}

/// 把用户值合并进默认映射；返回“用户文件是否缺少默认字段”。
fn merge_values(default: &mut Value, user: Value) -> bool {
    match (default, user) {
        (Value::Mapping(dest), Value::Mapping(src)) => {
            let mut missing = false;
            for (key, _) in dest.iter() {
                if !src.contains_key(key) {
                    missing = true;
                }
            }
            for (key, user_val) in src {
                if let Some(dest_val) = dest.get_mut(&key) {
                    merge_values(dest_val, user_val);
                } else {
                    dest.insert(key, user_val);
                }
            }
            missing
        }
        (dest, other) => {
            *dest = other;
            false
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_commented_default_file() {
        let dir = TempDir::new().unwrap();
        let config: Config = load_or_create(Some(dir.path())).unwrap();
        assert_eq!(config.request_timeout, 15);

        let raw = fs::read_to_string(dir.path().join(Config::FILE_NAME)).unwrap();
        assert!(raw.contains("# 书源基础 URL"));
        assert!(raw.contains("request_timeout: 15"));
    }

    #[test]
    fn user_values_override_defaults_and_missing_fields_are_added() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(Config::FILE_NAME);
        fs::write(&path, "book_url: https://books.example.com/x/\n").unwrap();

        let config: Config = load_or_create(Some(dir.path())).unwrap();
        assert_eq!(config.book_url, "https://books.example.com/x/");
        assert_eq!(config.cache_version, "v1");

        // 缺失字段被补写回文件
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("cache_version"));
        assert!(raw.contains("https://books.example.com/x/"));
    }
}
