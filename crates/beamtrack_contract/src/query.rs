use serde::{Deserialize, Serialize};

use crate::model::{BeamId, UserId};

/// Selects which beams a list query returns. Only one criterion is ever sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum BeamCriteria {
    #[default]
    All,
    Tag(String),
    Email(String),
    Uid(UserId),
    Pinned,
}

impl BeamCriteria {
    /// Resolves competing filters with precedence tag, email, uid, then all.
    pub fn from_filters(tag: Option<&str>, email: Option<&str>, uid: Option<UserId>) -> Self {
        if let Some(tag) = tag.filter(|value| !value.is_empty()) {
            return Self::Tag(tag.to_string());
        }
        if let Some(email) = email.filter(|value| !value.is_empty()) {
            return Self::Email(email.to_string());
        }
        match uid {
            Some(uid) => Self::Uid(uid),
            None => Self::All,
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::All => Vec::new(),
            Self::Tag(tag) => vec![("tag", tag.clone())],
            Self::Email(email) => vec![("email", email.clone())],
            Self::Uid(uid) => vec![("uid", uid.to_string())],
            Self::Pinned => vec![("pinned", "true".to_string())],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileQuery {
    pub beam_id: BeamId,
    pub filter: Option<String>,
    pub offset: u64,
    pub limit: u32,
}

impl FileQuery {
    pub fn page(beam_id: BeamId, filter: Option<String>, request: PageRequest) -> Self {
        Self {
            beam_id,
            filter: filter.filter(|value| !value.is_empty()),
            offset: request.offset(),
            limit: request.per_page,
        }
    }
}

/// Paging metadata; backends report either an item total or a page total.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageMeta {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

impl PageMeta {
    pub fn page_count(&self, per_page: u32) -> u32 {
        if let Some(pages) = self.total_pages {
            return pages;
        }
        match self.total {
            Some(total) => {
                let per_page = u64::from(per_page.max(1));
                u32::try_from(total.div_ceil(per_page)).unwrap_or(u32::MAX)
            }
            None => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
    pub request: PageRequest,
}

#[cfg(test)]
mod tests {
    use super::{BeamCriteria, FileQuery, PageMeta, PageRequest};

    #[test]
    fn criteria_precedence_is_tag_email_uid() {
        assert_eq!(
            BeamCriteria::from_filters(Some("infra"), Some("a@b.c"), Some(3)),
            BeamCriteria::Tag("infra".to_string())
        );
        assert_eq!(
            BeamCriteria::from_filters(Some(""), Some("a@b.c"), Some(3)),
            BeamCriteria::Email("a@b.c".to_string())
        );
        assert_eq!(
            BeamCriteria::from_filters(None, None, Some(3)),
            BeamCriteria::Uid(3)
        );
        assert_eq!(BeamCriteria::from_filters(None, None, None), BeamCriteria::All);
    }

    #[test]
    fn page_count_prefers_reported_pages_then_total() {
        let reported = PageMeta {
            total: Some(1000),
            total_pages: Some(2),
        };
        assert_eq!(reported.page_count(20), 2);

        let derived = PageMeta {
            total: Some(41),
            total_pages: None,
        };
        assert_eq!(derived.page_count(20), 3);
        assert_eq!(PageMeta::default().page_count(20), 0);
    }

    #[test]
    fn file_query_translates_page_to_offset() {
        let query = FileQuery::page(9, Some(String::new()), PageRequest::new(3, 20));
        assert_eq!(query.offset, 40);
        assert_eq!(query.limit, 20);
        assert_eq!(query.filter, None);
    }
}
