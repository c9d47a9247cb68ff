//! Insert-or-update merge of parsed items into a feed's news rows.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::app::Result;
use crate::domain::{Feed, FeedCounts, FeedUpdate, ParsedItem};
use crate::normalizer::FeedMeta;
use crate::store::Store;

/// Result of merging one document into one feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Entries dropped because they carry no guid and no link.
    pub skipped: usize,
    pub counts: FeedCounts,
    /// The feed's cached `new_count` before this merge.
    pub previous_new_count: i64,
}

impl MergeOutcome {
    /// Increase of the feed's new-item count caused by this merge.
    pub fn new_delta(&self) -> i64 {
        (self.counts.new_count - self.previous_new_count).max(0)
    }
}

#[derive(Clone, Default)]
pub struct Merger;

impl Merger {
    pub fn new() -> Self {
        Self
    }

    /// Merge `items` into `feed`.
    ///
    /// Unknown identities are inserted as new and unread, in reverse
    /// document order. Known identities
    /// get their content refreshed while `read`, `starred`, `deleted` and
    /// `new` are left alone; scrubbed or pending rows are not refilled.
    pub fn merge<S: Store + ?Sized>(
        &self,
        store: &S,
        feed: &Feed,
        meta: &FeedMeta,
        items: &[ParsedItem],
        build_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome> {
        let mut outcome = MergeOutcome {
            previous_new_count: feed.new_count,
            ..Default::default()
        };

        // Documents list newest first; insert oldest first so ids follow age
        for item in items.iter().rev() {
            let Some(key) = item.identity_key() else {
                outcome.skipped += 1;
                continue;
            };

            match store.find_news(feed.id, key)? {
                None => {
                    store.insert_news(feed.id, key, item, now)?;
                    outcome.inserted += 1;
                }
                Some(existing) if existing.deleted.is_live() => {
                    store.update_news_content(existing.id, item)?;
                    outcome.updated += 1;
                }
                Some(_) => {}
            }
        }

        store.update_feed(feed.id, &Self::feed_update(feed, meta, build_time))?;
        outcome.counts = store.refresh_counts(feed.id)?;

        debug!(
            feed_id = feed.id,
            inserted = outcome.inserted,
            updated = outcome.updated,
            skipped = outcome.skipped,
            unread = outcome.counts.unread,
            new_count = outcome.counts.new_count,
            "merged"
        );

        Ok(outcome)
    }

    fn feed_update(feed: &Feed, meta: &FeedMeta, build_time: Option<DateTime<Utc>>) -> FeedUpdate {
        let text = if feed.text.is_empty() {
            meta.title.clone()
        } else {
            None
        };

        FeedUpdate {
            text,
            title: meta.title.clone(),
            description: meta.description.clone(),
            html_url: meta.html_url.clone(),
            last_build_date: build_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeletedState, NewFeed, ReadState};
    use crate::store::SqliteStore;

    const FEED_URL: &str = "https://example.com/feed.xml";

    fn item(guid: &str, title: &str) -> ParsedItem {
        ParsedItem {
            guid: Some(guid.into()),
            title: Some(title.into()),
            description: Some(format!("{title} body")),
            ..Default::default()
        }
    }

    fn setup() -> (SqliteStore, Feed) {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.add_feed(&NewFeed::new(FEED_URL)).unwrap();
        let feed = store.get_feed(id).unwrap().unwrap();
        (store, feed)
    }

    fn meta() -> FeedMeta {
        FeedMeta {
            title: Some("Example".into()),
            description: Some("Example feed".into()),
            html_url: Some("https://example.com/".into()),
        }
    }

    #[test]
    fn test_merge_inserts_new_items() {
        let (store, feed) = setup();
        let items = vec![item("a", "A"), item("b", "B")];

        let outcome = Merger::new()
            .merge(&store, &feed, &meta(), &items, None, Utc::now())
            .unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.counts, FeedCounts { unread: 2, new_count: 2 });
        assert_eq!(outcome.new_delta(), 2);

        let feed = store.get_feed(feed.id).unwrap().unwrap();
        assert_eq!(feed.unread, 2);
        assert_eq!(feed.new_count, 2);
        assert_eq!(feed.text, "Example");
        assert_eq!(feed.html_url, Some("https://example.com/".into()));
    }

    #[test]
    fn test_remerge_is_idempotent() {
        let (store, feed) = setup();
        let items = vec![item("a", "A"), item("b", "B")];
        let merger = Merger::new();
        merger
            .merge(&store, &feed, &meta(), &items, None, Utc::now())
            .unwrap();

        let a = store.find_news(feed.id, "a").unwrap().unwrap();
        store.set_read(a.id, ReadState::ReadAcked).unwrap();
        store.set_new(a.id, false).unwrap();
        store.set_starred(a.id, true).unwrap();
        let before = store.get_news_by_feed(feed.id).unwrap();

        let feed = store.get_feed(feed.id).unwrap().unwrap();
        let outcome = merger
            .merge(&store, &feed, &meta(), &items, None, Utc::now())
            .unwrap();

        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.updated, 2);
        assert_eq!(outcome.new_delta(), 0);
        let after = store.get_news_by_feed(feed.id).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_merge_refreshes_content_only() {
        let (store, feed) = setup();
        let merger = Merger::new();
        merger
            .merge(&store, &feed, &meta(), &[item("a", "A")], None, Utc::now())
            .unwrap();
        let a = store.find_news(feed.id, "a").unwrap().unwrap();
        store.set_read(a.id, ReadState::ReadPendingAck).unwrap();

        merger
            .merge(&store, &feed, &meta(), &[item("a", "A v2")], None, Utc::now())
            .unwrap();

        let a = store.get_news(a.id).unwrap().unwrap();
        assert_eq!(a.title, Some("A v2".into()));
        assert_eq!(a.read, ReadState::ReadPendingAck);
        assert!(a.received.is_some());
    }

    #[test]
    fn test_scrubbed_row_is_not_recreated() {
        let (store, feed) = setup();
        let merger = Merger::new();
        merger
            .merge(&store, &feed, &meta(), &[item("a", "A")], None, Utc::now())
            .unwrap();
        let a = store.find_news(feed.id, "a").unwrap().unwrap();
        store.mark_deleted(&[a.id]).unwrap();
        store.scrub_deleted(feed.id).unwrap();

        let outcome = merger
            .merge(&store, &feed, &meta(), &[item("a", "A")], None, Utc::now())
            .unwrap();

        assert_eq!(outcome.inserted, 0);
        let rows = store.get_news_by_feed(feed.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].deleted, DeletedState::Scrubbed);
        assert_eq!(rows[0].title, None);
    }

    #[test]
    fn test_link_is_identity_without_guid() {
        let (store, feed) = setup();
        let entry = ParsedItem {
            link_href: Some("https://example.com/post".into()),
            title: Some("Post".into()),
            ..Default::default()
        };
        let merger = Merger::new();
        merger
            .merge(&store, &feed, &meta(), &[entry.clone()], None, Utc::now())
            .unwrap();
        let outcome = merger
            .merge(&store, &feed, &meta(), &[entry], None, Utc::now())
            .unwrap();

        assert_eq!(outcome.inserted, 0);
        assert!(store
            .find_news(feed.id, "https://example.com/post")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_unidentifiable_entries_are_skipped() {
        let (store, feed) = setup();
        let entry = ParsedItem {
            title: Some("No id".into()),
            ..Default::default()
        };

        let outcome = Merger::new()
            .merge(&store, &feed, &meta(), &[entry], None, Utc::now())
            .unwrap();

        assert_eq!(outcome.skipped, 1);
        assert!(store.get_news_by_feed(feed.id).unwrap().is_empty());
    }

    #[test]
    fn test_last_entry_is_oldest_row() {
        let (store, feed) = setup();
        let items = vec![item("newest", "N"), item("oldest", "O")];

        Merger::new()
            .merge(&store, &feed, &meta(), &items, None, Utc::now())
            .unwrap();

        let rows = store.get_news_by_feed(feed.id).unwrap();
        assert_eq!(rows[0].guid, "oldest");
        assert_eq!(rows[1].guid, "newest");
    }

    #[test]
    fn test_build_time_persisted() {
        let (store, feed) = setup();
        let built = "2024-05-05T05:05:05Z".parse::<DateTime<Utc>>().unwrap();

        Merger::new()
            .merge(&store, &feed, &FeedMeta::default(), &[], Some(built), Utc::now())
            .unwrap();

        let feed = store.get_feed(feed.id).unwrap().unwrap();
        assert_eq!(feed.last_build_date, Some(built));
        assert_eq!(feed.text, "");
    }
}
