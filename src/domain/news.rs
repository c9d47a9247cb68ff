use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{DeletedState, ReadState};

/// A news row as held by the stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: i64,
    pub feed_id: i64,
    /// Identity key within the feed: the entry guid, or its link when the
    /// entry carries no guid. Survives scrubbing.
    pub guid: String,
    pub title: Option<String>,
    pub link_href: Option<String>,
    pub link_alternate: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_uri: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub received: Option<DateTime<Utc>>,
    pub content: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub is_new: bool,
    pub read: ReadState,
    pub starred: bool,
    pub deleted: DeletedState,
}

impl NewsItem {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(Untitled)")
    }

    /// Timestamp used for ordering and age checks: receipt time, falling back
    /// to the published time for rows imported without one.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.received.or(self.published)
    }

    pub fn link(&self) -> Option<&str> {
        self.link_href.as_deref().or(self.link_alternate.as_deref())
    }
}

/// One entry extracted from a fetched document, before merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedItem {
    pub guid: Option<String>,
    pub title: Option<String>,
    pub link_href: Option<String>,
    pub link_alternate: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_uri: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub content: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

impl ParsedItem {
    /// Stable identity of the entry within its feed: guid, else link, else
    /// alternate link. `None` when the entry cannot be identified at all.
    pub fn identity_key(&self) -> Option<&str> {
        [&self.guid, &self.link_href, &self.link_alternate]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }
}
