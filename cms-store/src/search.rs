//! Search parameters and paged results.

use std::cmp::Ordering;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cms_core::{Asset, AssetId, CmsError, CmsResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Id,
    Size,
    Name,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Pagination {
    Offset { offset: usize, limit: usize },
    Cursor { after: Option<String>, first: usize },
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination::Offset {
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Filter, sort and page parameters shared by every asset listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSearch {
    /// Case-insensitive substring of the file name.
    pub keyword: Option<String>,
    /// Keep assets whose content type is one of these; empty keeps all.
    pub content_types: Vec<String>,
    pub sort: SortKey,
    pub direction: SortDirection,
    pub pagination: Pagination,
    /// Keep assets whose URL contains this host; assets without URL always match.
    pub host: Option<String>,
}

impl AssetSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn with_content_types<I, S>(mut self, content_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_types = content_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sort(mut self, sort: SortKey, direction: SortDirection) -> Self {
        self.sort = sort;
        self.direction = direction;
        self
    }

    pub fn with_offset(mut self, offset: usize, limit: usize) -> Self {
        self.pagination = Pagination::Offset { offset, limit };
        self
    }

    pub fn with_cursor(mut self, after: Option<String>, first: usize) -> Self {
        self.pagination = Pagination::Cursor { after, first };
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub(crate) fn matches(&self, asset: &Asset) -> bool {
        if let Some(keyword) = self.keyword.as_deref().filter(|k| !k.is_empty()) {
            if !asset.file_name().to_lowercase().contains(&keyword.to_lowercase()) {
                return false;
            }
        }
        if !self.content_types.is_empty() && !self.content_types.iter().any(|ct| ct == asset.content_type()) {
            return false;
        }
        match (self.host.as_deref(), asset.url()) {
            (Some(host), Some(url)) => url.contains(host),
            _ => true,
        }
    }

    fn compare(&self, a: &Asset, b: &Asset) -> Ordering {
        let ord = match self.sort {
            SortKey::Id => a.id().cmp(&b.id()),
            SortKey::Size => a.size().cmp(&b.size()).then_with(|| a.id().cmp(&b.id())),
            SortKey::Name => a
                .file_name()
                .to_lowercase()
                .cmp(&b.file_name().to_lowercase())
                .then_with(|| a.id().cmp(&b.id())),
        };
        match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }

    /// Filter, sort and cut one page out of `assets`.
    pub(crate) fn apply(&self, assets: impl IntoIterator<Item = Asset>) -> CmsResult<Page<Asset>> {
        let mut matched: Vec<Asset> = assets.into_iter().filter(|a| self.matches(a)).collect();
        matched.sort_by(|a, b| self.compare(a, b));
        let total = matched.len();

        let (start, limit) = match &self.pagination {
            Pagination::Offset { offset, limit } => (*offset, *limit),
            Pagination::Cursor { after, first } => {
                let start = match after.as_deref() {
                    None | Some("") => 0,
                    Some(cursor) => {
                        let after = decode_cursor(cursor)?;
                        matched
                            .iter()
                            .position(|a| a.id() == after)
                            .map(|i| i + 1)
                            .ok_or_else(|| CmsError::invalid_input(format!("unknown cursor {}", cursor)))?
                    }
                };
                (start, *first)
            }
        };

        let items: Vec<Asset> = matched.into_iter().skip(start).take(limit).collect();
        let has_next = start + items.len() < total;
        let end_cursor = items.last().map(|a| encode_cursor(a.id()));
        Ok(Page {
            items,
            total,
            has_next,
            end_cursor,
        })
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub has_next: bool,
    pub end_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            has_next: false,
            end_cursor: None,
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty()
    }
}

pub fn encode_cursor(id: AssetId) -> String {
    URL_SAFE_NO_PAD.encode(id.to_string())
}

pub fn decode_cursor(cursor: &str) -> CmsResult<AssetId> {
    let raw = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|e| CmsError::invalid_input(format!("malformed cursor {}", cursor)).with_source(e))?;
    let text = String::from_utf8(raw)
        .map_err(|e| CmsError::invalid_input(format!("malformed cursor {}", cursor)).with_source(e))?;
    AssetId::parse(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cms_core::{ProjectId, WorkspaceId};

    fn asset(name: &str, size: u64, content_type: &str) -> Asset {
        Asset::builder()
            .new_id()
            .project(ProjectId::new())
            .workspace(WorkspaceId::new())
            .created_by_machine()
            .file_name(name)
            .size(size)
            .content_type(content_type)
            .uuid(format!("uuid-{}", name))
            .build()
            .unwrap()
    }

    #[test]
    fn keyword_is_case_insensitive() {
        let search = AssetSearch::new().with_keyword("PHOTO");
        assert!(search.matches(&asset("my-photo.jpg", 1, "image/jpeg")));
        assert!(!search.matches(&asset("bundle.zip", 1, "application/zip")));
    }

    #[test]
    fn sorts_and_pages_by_size() {
        let assets = vec![asset("a", 30, "x"), asset("b", 10, "x"), asset("c", 20, "x")];
        let page = AssetSearch::new()
            .with_sort(SortKey::Size, SortDirection::Desc)
            .with_offset(0, 2)
            .apply(assets)
            .unwrap();
        let sizes: Vec<u64> = page.items.iter().map(|a| a.size()).collect();
        assert_eq!(sizes, [30, 20]);
        assert_eq!(page.total, 3);
        assert!(page.has_next);
    }

    #[test]
    fn cursor_walks_forward() {
        let assets = vec![asset("a", 1, "x"), asset("b", 2, "x"), asset("c", 3, "x")];
        let first = AssetSearch::new().with_cursor(None, 2).apply(assets.clone()).unwrap();
        assert_eq!(first.items.len(), 2);

        let second = AssetSearch::new()
            .with_cursor(first.end_cursor.clone(), 2)
            .apply(assets)
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].file_name(), "c");
        assert!(!second.has_next);
    }

    #[test]
    fn malformed_cursor_is_invalid_input() {
        let err = AssetSearch::new()
            .with_cursor(Some("!!".into()), 2)
            .apply(Vec::new())
            .unwrap_err();
        assert_eq!(err.kind(), cms_core::ErrorKind::InvalidInput);
    }
}
