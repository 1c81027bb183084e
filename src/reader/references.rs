//! 引用表（refs.json）：引用编号 → 引用原文。
//!
//! 引用表是可选的：文件缺失或解析失败都按空表处理，绝不阻塞阅读。

use std::collections::HashMap;

use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: HashMap<String, String>,
}

impl ReferenceTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 容错解析：任何错误都退化为空表。
    pub fn from_json_lossy(raw: &str) -> Self {
        match serde_json::from_str::<HashMap<String, String>>(raw) {
            Ok(entries) => Self { entries },
            Err(err) => {
                warn!("refs.json 解析失败，按空引用表处理: {err}");
                Self::default()
            }
        }
    }

    pub fn lookup(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mapping() {
        let refs = ReferenceTable::from_json_lossy(r#"{"1":"Doe, J. (1999)","2":"RFC 2616"}"#);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs.lookup("1"), Some("Doe, J. (1999)"));
        assert_eq!(refs.lookup("9"), None);
    }

    #[test]
    fn malformed_json_becomes_empty_table() {
        let refs = ReferenceTable::from_json_lossy("{not json");
        assert!(refs.is_empty());
        assert_eq!(refs.lookup("1"), None);
    }
}
