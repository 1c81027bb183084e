//! 目录（toc.json）模型与全书线性页号计算。
//!
//! 目录在启动时加载一次，之后不可变；它定义了整本书可寻址的页空间。

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TocError {
    #[error("invalid toc json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("toc has no chapters")]
    Empty,
    #[error("duplicate chapter id: {0}")]
    DuplicateId(String),
    #[error("chapter {0} has zero pages")]
    ZeroPages(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableOfContents {
    pub chapters: Vec<Chapter>,
}

impl TableOfContents {
    pub fn from_json(raw: &str) -> Result<Self, TocError> {
        let toc: TableOfContents = serde_json::from_str(raw)?;
        if toc.chapters.is_empty() {
            return Err(TocError::Empty);
        }
        let mut seen = std::collections::HashSet::new();
        for ch in &toc.chapters {
            if ch.pages == 0 {
                return Err(TocError::ZeroPages(ch.id.clone()));
            }
            if !seen.insert(ch.id.as_str()) {
                return Err(TocError::DuplicateId(ch.id.clone()));
            }
        }
        Ok(toc)
    }

    pub fn chapter(&self, id: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == id)
    }

    pub fn chapter_index(&self, id: &str) -> Option<usize> {
        self.chapters.iter().position(|c| c.id == id)
    }

    pub fn first(&self) -> &Chapter {
        &self.chapters[0]
    }

    pub fn last(&self) -> &Chapter {
        self.chapters.last().expect("toc is never empty")
    }

    pub fn total_pages(&self) -> u64 {
        self.chapters.iter().map(|c| c.pages as u64).sum()
    }

    /// 全书线性页号：当前章之前所有章的页数之和 + 当前页。
    ///
    /// 未知章节返回 None（调用方应先通过 redirect 修正路由）。
    pub fn linear_index(&self, chapter_id: &str, page: u32) -> Option<u64> {
        let mut idx = 0u64;
        for ch in &self.chapters {
            if ch.id == chapter_id {
                return Some(idx + page as u64);
            }
            idx += ch.pages as u64;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TableOfContents {
        TableOfContents::from_json(
            r#"{"chapters":[
                {"id":"c1","title":"One","pages":2},
                {"id":"c2","title":"Two","pages":3}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn parses_and_validates() {
        let toc = sample();
        assert_eq!(toc.chapters.len(), 2);
        assert_eq!(toc.total_pages(), 5);
        assert_eq!(toc.first().id, "c1");
        assert_eq!(toc.last().id, "c2");
    }

    #[test]
    fn rejects_empty_and_duplicates() {
        assert!(matches!(
            TableOfContents::from_json(r#"{"chapters":[]}"#),
            Err(TocError::Empty)
        ));
        let dup = r#"{"chapters":[
            {"id":"c1","title":"a","pages":1},
            {"id":"c1","title":"b","pages":1}
        ]}"#;
        assert!(matches!(
            TableOfContents::from_json(dup),
            Err(TocError::DuplicateId(_))
        ));
        let zero = r#"{"chapters":[{"id":"c1","title":"a","pages":0}]}"#;
        assert!(matches!(
            TableOfContents::from_json(zero),
            Err(TocError::ZeroPages(_))
        ));
    }

    #[test]
    fn linear_index_counts_preceding_chapters() {
        let toc = sample();
        assert_eq!(toc.linear_index("c1", 1), Some(1));
        assert_eq!(toc.linear_index("c1", 2), Some(2));
        assert_eq!(toc.linear_index("c2", 1), Some(3));
        assert_eq!(toc.linear_index("c2", 3), Some(5));
        assert_eq!(toc.linear_index("missing", 1), None);
    }

    #[test]
    fn linear_index_strictly_increases_forward() {
        let toc = sample();
        let mut last = 0u64;
        for ch in &toc.chapters {
            for page in 1..=ch.pages {
                let idx = toc.linear_index(&ch.id, page).unwrap();
                assert!(idx > last);
                last = idx;
            }
        }
        assert_eq!(last, toc.total_pages());
    }
}
