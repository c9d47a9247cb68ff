use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    /// Display text shown in the feed list.
    pub text: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub xml_url: String,
    pub html_url: Option<String>,
    /// Last build time reported by the server, used for conditional fetches.
    pub last_build_date: Option<DateTime<Utc>>,
    pub unread: i64,
    pub new_count: i64,
    pub current_news: Option<i64>,
    pub image: Option<Vec<u8>>,
}

impl Feed {
    pub fn display_title(&self) -> &str {
        if !self.text.is_empty() {
            return &self.text;
        }
        self.title.as_deref().unwrap_or(&self.xml_url)
    }
}

/// Values needed to create a feed row.
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub text: String,
    pub xml_url: String,
}

impl NewFeed {
    pub fn new(xml_url: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            xml_url: xml_url.into(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

/// Partial update of feed metadata. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct FeedUpdate {
    pub text: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub html_url: Option<String>,
    pub last_build_date: Option<DateTime<Utc>>,
}

impl FeedUpdate {
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.html_url.is_none()
            && self.last_build_date.is_none()
    }
}

/// Cached aggregates of a feed's live news rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCounts {
    pub unread: i64,
    pub new_count: i64,
}
