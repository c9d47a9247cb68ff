use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::backup::Backup;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{EstuaryError, Result};
use crate::domain::{
    DeletedState, Feed, FeedCounts, FeedUpdate, NewFeed, NewsItem, ParsedItem, ReadState,
};
use crate::store::Store;

const FEED_COLUMNS: &str = "id, text, title, description, xml_url, html_url, last_build_date, \
     unread, new_count, current_news, image";

const NEWS_COLUMNS: &str = "id, feed_id, guid, title, link_href, link_alternate, author_name, \
     author_email, author_uri, published, received, content, description, category, \
     is_new, read, starred, deleted";

const BACKUP_PAGES_PER_STEP: i32 = 256;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;

        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| EstuaryError::Migration(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            EstuaryError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    /// Replace the whole content of `target` with this database, using the
    /// SQLite online backup API. `target` must be a different store.
    pub fn copy_into(&self, target: &SqliteStore) -> Result<()> {
        let src = self.conn()?;
        let mut dst = target.conn()?;
        let backup = Backup::new(&src, &mut dst)?;
        backup.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::ZERO, None)?;
        Ok(())
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    // Fixed-width UTC so that text ordering matches time ordering.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn feed_from_row(row: &Row<'_>) -> rusqlite::Result<Feed> {
        Ok(Feed {
            id: row.get(0)?,
            text: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            xml_url: row.get(4)?,
            html_url: row.get(5)?,
            last_build_date: row
                .get::<_, Option<String>>(6)?
                .and_then(|s| Self::parse_datetime(&s)),
            unread: row.get(7)?,
            new_count: row.get(8)?,
            current_news: row.get(9)?,
            image: row.get(10)?,
        })
    }

    fn news_from_row(row: &Row<'_>) -> rusqlite::Result<NewsItem> {
        Ok(NewsItem {
            id: row.get(0)?,
            feed_id: row.get(1)?,
            guid: row.get(2)?,
            title: row.get(3)?,
            link_href: row.get(4)?,
            link_alternate: row.get(5)?,
            author_name: row.get(6)?,
            author_email: row.get(7)?,
            author_uri: row.get(8)?,
            published: row
                .get::<_, Option<String>>(9)?
                .and_then(|s| Self::parse_datetime(&s)),
            received: row
                .get::<_, Option<String>>(10)?
                .and_then(|s| Self::parse_datetime(&s)),
            content: row.get(11)?,
            description: row.get(12)?,
            category: row.get(13)?,
            is_new: row.get::<_, i64>(14)? != 0,
            read: ReadState::from_i64(row.get(15)?),
            starred: row.get::<_, i64>(16)? != 0,
            deleted: DeletedState::from_i64(row.get(17)?),
        })
    }

    fn expect_news_row(changed: usize, id: i64) -> Result<()> {
        if changed == 0 {
            return Err(EstuaryError::NewsNotFound(id));
        }
        Ok(())
    }
}

impl Store for SqliteStore {
    fn add_feed(&self, feed: &NewFeed) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO feeds (text, xml_url) VALUES (?1, ?2)",
            params![feed.text, feed.xml_url],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn get_feed(&self, id: i64) -> Result<Option<Feed>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?1"),
                params![id],
                Self::feed_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE xml_url = ?1"),
                params![url],
                Self::feed_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn get_all_feeds(&self) -> Result<Vec<Feed>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY id"
        ))?;

        let feeds = stmt
            .query_map([], Self::feed_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(feeds)
    }

    fn update_feed(&self, id: i64, update: &FeedUpdate) -> Result<()> {
        let conn = self.conn()?;

        if let Some(ref text) = update.text {
            conn.execute(
                "UPDATE feeds SET text = ?1 WHERE id = ?2",
                params![text, id],
            )?;
        }
        if let Some(ref title) = update.title {
            conn.execute(
                "UPDATE feeds SET title = ?1 WHERE id = ?2",
                params![title, id],
            )?;
        }
        if let Some(ref description) = update.description {
            conn.execute(
                "UPDATE feeds SET description = ?1 WHERE id = ?2",
                params![description, id],
            )?;
        }
        if let Some(ref html_url) = update.html_url {
            conn.execute(
                "UPDATE feeds SET html_url = ?1 WHERE id = ?2",
                params![html_url, id],
            )?;
        }
        if let Some(ref last_build_date) = update.last_build_date {
            conn.execute(
                "UPDATE feeds SET last_build_date = ?1 WHERE id = ?2",
                params![Self::format_datetime(last_build_date), id],
            )?;
        }

        Ok(())
    }

    fn delete_feed(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;

        let changed = conn.execute("DELETE FROM feeds WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(EstuaryError::FeedNotFound(id.to_string()));
        }
        Ok(())
    }

    fn set_current_news(&self, feed_id: i64, news_id: Option<i64>) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "UPDATE feeds SET current_news = ?1 WHERE id = ?2",
            params![news_id, feed_id],
        )?;
        Ok(())
    }

    fn refresh_counts(&self, feed_id: i64) -> Result<FeedCounts> {
        let conn = self.conn()?;

        let (unread, new_count): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(read = 0), 0), COALESCE(SUM(is_new = 1), 0)
             FROM news WHERE feed_id = ?1 AND deleted = 0",
            params![feed_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        conn.execute(
            "UPDATE feeds SET unread = ?1, new_count = ?2 WHERE id = ?3",
            params![unread, new_count, feed_id],
        )?;

        Ok(FeedCounts { unread, new_count })
    }

    fn reset_new_counts(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("UPDATE feeds SET new_count = 0", [])?;
        Ok(())
    }

    fn find_news(&self, feed_id: i64, key: &str) -> Result<Option<NewsItem>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {NEWS_COLUMNS} FROM news WHERE feed_id = ?1 AND guid = ?2"),
                params![feed_id, key],
                Self::news_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn insert_news(
        &self,
        feed_id: i64,
        key: &str,
        item: &ParsedItem,
        received: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO news (feed_id, guid, title, link_href, link_alternate, author_name,
                               author_email, author_uri, published, received, content,
                               description, category, is_new, read, starred, deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1, 0, 0, 0)",
            params![
                feed_id,
                key,
                item.title,
                item.link_href,
                item.link_alternate,
                item.author_name,
                item.author_email,
                item.author_uri,
                item.published.as_ref().map(Self::format_datetime),
                Self::format_datetime(&received),
                item.content,
                item.description,
                item.category
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn update_news_content(&self, id: i64, item: &ParsedItem) -> Result<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE news SET title = ?1, link_href = ?2, link_alternate = ?3, author_name = ?4,
                             author_email = ?5, author_uri = ?6, published = ?7, content = ?8,
                             description = ?9, category = ?10
             WHERE id = ?11",
            params![
                item.title,
                item.link_href,
                item.link_alternate,
                item.author_name,
                item.author_email,
                item.author_uri,
                item.published.as_ref().map(Self::format_datetime),
                item.content,
                item.description,
                item.category,
                id
            ],
        )?;

        Self::expect_news_row(changed, id)
    }

    fn get_news(&self, id: i64) -> Result<Option<NewsItem>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {NEWS_COLUMNS} FROM news WHERE id = ?1"),
                params![id],
                Self::news_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn get_news_by_feed(&self, feed_id: i64) -> Result<Vec<NewsItem>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {NEWS_COLUMNS} FROM news WHERE feed_id = ?1 ORDER BY received, id"
        ))?;

        let news = stmt
            .query_map(params![feed_id], Self::news_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(news)
    }

    fn get_all_news(&self) -> Result<Vec<NewsItem>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {NEWS_COLUMNS} FROM news ORDER BY feed_id, received, id"
        ))?;

        let news = stmt
            .query_map([], Self::news_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(news)
    }

    fn set_read(&self, id: i64, read: ReadState) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE news SET read = ?1 WHERE id = ?2",
            params![read.as_i64(), id],
        )?;
        Self::expect_news_row(changed, id)
    }

    fn set_new(&self, id: i64, is_new: bool) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE news SET is_new = ?1 WHERE id = ?2",
            params![is_new as i64, id],
        )?;
        Self::expect_news_row(changed, id)
    }

    fn set_starred(&self, id: i64, starred: bool) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE news SET starred = ?1 WHERE id = ?2",
            params![starred as i64, id],
        )?;
        Self::expect_news_row(changed, id)
    }

    fn set_deleted(&self, id: i64, deleted: DeletedState) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE news SET deleted = ?1 WHERE id = ?2",
            params![deleted.as_i64(), id],
        )?;
        Self::expect_news_row(changed, id)
    }

    fn mark_feed_read(&self, feed_id: i64) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE news SET read = 1 WHERE feed_id = ?1 AND read = 0",
            params![feed_id],
        )?;
        tx.execute(
            "UPDATE news SET is_new = 0 WHERE feed_id = ?1 AND is_new = 1",
            params![feed_id],
        )?;
        tx.commit()?;
        Ok(changed)
    }

    fn clear_new(&self, feed_id: Option<i64>) -> Result<usize> {
        let conn = self.conn()?;
        let changed = match feed_id {
            Some(feed_id) => conn.execute(
                "UPDATE news SET is_new = 0 WHERE feed_id = ?1 AND is_new = 1",
                params![feed_id],
            )?,
            None => conn.execute("UPDATE news SET is_new = 0 WHERE is_new = 1", [])?,
        };
        Ok(changed)
    }

    fn acknowledge_read(&self, feed_id: Option<i64>) -> Result<usize> {
        let conn = self.conn()?;
        let changed = match feed_id {
            Some(feed_id) => conn.execute(
                "UPDATE news SET read = 2 WHERE feed_id = ?1 AND read = 1",
                params![feed_id],
            )?,
            None => conn.execute("UPDATE news SET read = 2 WHERE read = 1", [])?,
        };
        Ok(changed)
    }

    fn set_all_read(&self) -> Result<usize> {
        let conn = self.conn()?;
        let changed = conn.execute("UPDATE news SET read = 2 WHERE read != 2", [])?;
        Ok(changed)
    }

    fn mark_deleted(&self, ids: &[i64]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut count = 0;

        for id in ids {
            count += tx.execute(
                "UPDATE news SET deleted = 1 WHERE id = ?1 AND deleted = 0",
                params![id],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }

    fn scrub_deleted(&self, feed_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE news SET title = NULL, link_href = NULL, link_alternate = NULL,
                             author_name = NULL, author_email = NULL, author_uri = NULL,
                             published = NULL, content = NULL, description = NULL,
                             category = NULL, deleted = 2
             WHERE feed_id = ?1 AND deleted = 1",
            params![feed_id],
        )?;
        Ok(changed)
    }

    fn vacuum(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch("VACUUM")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED_URL: &str = "https://example.com/feed.xml";

    fn parsed(guid: &str, title: &str) -> ParsedItem {
        ParsedItem {
            guid: Some(guid.into()),
            title: Some(title.into()),
            link_href: Some(format!("https://example.com/{guid}")),
            description: Some(format!("About {title}")),
            ..Default::default()
        }
    }

    fn store_with_feed() -> (SqliteStore, i64) {
        let store = SqliteStore::in_memory().unwrap();
        let feed_id = store.add_feed(&NewFeed::new(FEED_URL)).unwrap();
        (store, feed_id)
    }

    #[test]
    fn test_add_and_get_feed() {
        let (store, id) = store_with_feed();

        let retrieved = store.get_feed(id).unwrap().unwrap();
        assert_eq!(retrieved.xml_url, FEED_URL);
        assert_eq!(retrieved.unread, 0);
        assert_eq!(retrieved.new_count, 0);
    }

    #[test]
    fn test_duplicate_feed_url_rejected() {
        let (store, _) = store_with_feed();
        assert!(store.add_feed(&NewFeed::new(FEED_URL)).is_err());
    }

    #[test]
    fn test_get_feed_by_url() {
        let (store, _) = store_with_feed();

        let found = store.get_feed_by_url(FEED_URL).unwrap();
        assert!(found.is_some());

        let missing = store
            .get_feed_by_url("https://example.com/nonexistent.xml")
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_update_feed_partial() {
        let (store, id) = store_with_feed();
        let built = "2024-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let update = FeedUpdate {
            title: Some("New Title".into()),
            last_build_date: Some(built),
            ..Default::default()
        };
        store.update_feed(id, &update).unwrap();

        let retrieved = store.get_feed(id).unwrap().unwrap();
        assert_eq!(retrieved.title, Some("New Title".into()));
        assert_eq!(retrieved.last_build_date, Some(built));
        assert_eq!(retrieved.description, None);
        assert_eq!(retrieved.text, "");
    }

    #[test]
    fn test_insert_and_find_news() {
        let (store, feed_id) = store_with_feed();

        let id = store
            .insert_news(feed_id, "g1", &parsed("g1", "First"), Utc::now())
            .unwrap();

        let found = store.find_news(feed_id, "g1").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.title, Some("First".into()));
        assert!(found.is_new);
        assert_eq!(found.read, ReadState::Unread);
        assert!(!found.starred);
        assert_eq!(found.deleted, DeletedState::Live);
    }

    #[test]
    fn test_find_news_is_scoped_by_feed() {
        let (store, feed_id) = store_with_feed();
        let other = store
            .add_feed(&NewFeed::new("https://other.example.com/rss"))
            .unwrap();

        store
            .insert_news(feed_id, "shared", &parsed("shared", "A"), Utc::now())
            .unwrap();

        assert!(store.find_news(other, "shared").unwrap().is_none());
        store
            .insert_news(other, "shared", &parsed("shared", "B"), Utc::now())
            .unwrap();
        assert_eq!(
            store.find_news(other, "shared").unwrap().unwrap().title,
            Some("B".into())
        );
    }

    #[test]
    fn test_update_news_content_keeps_flags() {
        let (store, feed_id) = store_with_feed();
        let id = store
            .insert_news(feed_id, "g1", &parsed("g1", "First"), Utc::now())
            .unwrap();
        store.set_read(id, ReadState::ReadAcked).unwrap();
        store.set_starred(id, true).unwrap();

        store
            .update_news_content(id, &parsed("g1", "First (edited)"))
            .unwrap();

        let news = store.get_news(id).unwrap().unwrap();
        assert_eq!(news.title, Some("First (edited)".into()));
        assert_eq!(news.read, ReadState::ReadAcked);
        assert!(news.starred);
    }

    #[test]
    fn test_setters_report_missing_rows() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(matches!(
            store.set_read(42, ReadState::ReadPendingAck),
            Err(EstuaryError::NewsNotFound(42))
        ));
        assert!(store.set_starred(42, true).is_err());
        assert!(store.get_news(42).unwrap().is_none());
    }

    #[test]
    fn test_refresh_counts_ignores_deleted_rows() {
        let (store, feed_id) = store_with_feed();
        let now = Utc::now();
        let a = store.insert_news(feed_id, "a", &parsed("a", "A"), now).unwrap();
        let b = store.insert_news(feed_id, "b", &parsed("b", "B"), now).unwrap();
        store.insert_news(feed_id, "c", &parsed("c", "C"), now).unwrap();

        store.set_read(a, ReadState::ReadPendingAck).unwrap();
        store.set_new(a, false).unwrap();
        store.set_deleted(b, DeletedState::PendingScrub).unwrap();

        let counts = store.refresh_counts(feed_id).unwrap();
        assert_eq!(counts, FeedCounts { unread: 1, new_count: 1 });

        let feed = store.get_feed(feed_id).unwrap().unwrap();
        assert_eq!(feed.unread, 1);
        assert_eq!(feed.new_count, 1);
    }

    #[test]
    fn test_news_by_feed_oldest_first() {
        let (store, feed_id) = store_with_feed();
        let now = Utc::now();
        store
            .insert_news(feed_id, "late", &parsed("late", "Late"), now)
            .unwrap();
        store
            .insert_news(
                feed_id,
                "early",
                &parsed("early", "Early"),
                now - chrono::Duration::days(3),
            )
            .unwrap();

        let news = store.get_news_by_feed(feed_id).unwrap();
        assert_eq!(news[0].guid, "early");
        assert_eq!(news[1].guid, "late");
    }

    #[test]
    fn test_acknowledge_and_clear_new() {
        let (store, feed_id) = store_with_feed();
        let now = Utc::now();
        let a = store.insert_news(feed_id, "a", &parsed("a", "A"), now).unwrap();
        let b = store.insert_news(feed_id, "b", &parsed("b", "B"), now).unwrap();
        store.set_read(a, ReadState::ReadPendingAck).unwrap();

        assert_eq!(store.clear_new(Some(feed_id)).unwrap(), 2);
        assert_eq!(store.acknowledge_read(Some(feed_id)).unwrap(), 1);

        assert_eq!(store.get_news(a).unwrap().unwrap().read, ReadState::ReadAcked);
        assert_eq!(store.get_news(b).unwrap().unwrap().read, ReadState::Unread);
        assert!(!store.get_news(b).unwrap().unwrap().is_new);
    }

    #[test]
    fn test_mark_feed_read() {
        let (store, feed_id) = store_with_feed();
        let now = Utc::now();
        for key in ["a", "b", "c"] {
            store.insert_news(feed_id, key, &parsed(key, key), now).unwrap();
        }

        assert_eq!(store.mark_feed_read(feed_id).unwrap(), 3);
        let counts = store.refresh_counts(feed_id).unwrap();
        assert_eq!(counts, FeedCounts::default());
        assert!(store
            .get_news_by_feed(feed_id)
            .unwrap()
            .iter()
            .all(|n| n.read == ReadState::ReadPendingAck));
    }

    #[test]
    fn test_scrub_keeps_identity() {
        let (store, feed_id) = store_with_feed();
        let id = store
            .insert_news(feed_id, "g1", &parsed("g1", "First"), Utc::now())
            .unwrap();

        assert_eq!(store.mark_deleted(&[id]).unwrap(), 1);
        assert_eq!(store.scrub_deleted(feed_id).unwrap(), 1);

        let news = store.find_news(feed_id, "g1").unwrap().unwrap();
        assert_eq!(news.id, id);
        assert_eq!(news.deleted, DeletedState::Scrubbed);
        assert_eq!(news.title, None);
        assert_eq!(news.link_href, None);
        assert_eq!(news.description, None);
        assert_eq!(news.published, None);
    }

    #[test]
    fn test_scrub_only_touches_pending_rows() {
        let (store, feed_id) = store_with_feed();
        let now = Utc::now();
        let live = store.insert_news(feed_id, "a", &parsed("a", "A"), now).unwrap();

        assert_eq!(store.scrub_deleted(feed_id).unwrap(), 0);
        let news = store.get_news(live).unwrap().unwrap();
        assert_eq!(news.deleted, DeletedState::Live);
        assert_eq!(news.title, Some("A".into()));
    }

    #[test]
    fn test_delete_feed_cascades_news() {
        let (store, feed_id) = store_with_feed();
        let id = store
            .insert_news(feed_id, "g1", &parsed("g1", "First"), Utc::now())
            .unwrap();

        store.delete_feed(feed_id).unwrap();

        assert!(store.get_feed(feed_id).unwrap().is_none());
        assert!(store.get_news(id).unwrap().is_none());
        assert!(matches!(
            store.delete_feed(feed_id),
            Err(EstuaryError::FeedNotFound(_))
        ));
    }

    #[test]
    fn test_copy_into_mirrors_everything() {
        let (source, feed_id) = store_with_feed();
        source
            .insert_news(feed_id, "g1", &parsed("g1", "First"), Utc::now())
            .unwrap();

        let target = SqliteStore::in_memory().unwrap();
        target
            .add_feed(&NewFeed::new("https://stale.example.com/feed"))
            .unwrap();

        source.copy_into(&target).unwrap();

        let feeds = target.get_all_feeds().unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].xml_url, FEED_URL);
        assert!(target.find_news(feed_id, "g1").unwrap().is_some());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("estuary.db");

        let working = SqliteStore::in_memory().unwrap();
        let feed_id = working.add_feed(&NewFeed::new(FEED_URL)).unwrap();
        working
            .insert_news(feed_id, "g1", &parsed("g1", "First"), Utc::now())
            .unwrap();

        {
            let durable = SqliteStore::new(&path).unwrap();
            working.copy_into(&durable).unwrap();
        }

        let reopened = SqliteStore::new(&path).unwrap();
        assert_eq!(reopened.get_all_feeds().unwrap().len(), 1);
        assert_eq!(reopened.get_news_by_feed(feed_id).unwrap().len(), 1);
    }
}
