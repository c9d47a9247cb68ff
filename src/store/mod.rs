pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{
    DeletedState, Feed, FeedCounts, FeedUpdate, NewFeed, NewsItem, ParsedItem, ReadState,
};

pub use sqlite::SqliteStore;

/// Storage operations shared by the durable and the working store.
///
/// Every mutation that can change a feed's aggregates is followed by a call
/// to [`Store::refresh_counts`] from the caller; the store itself never
/// recomputes counts implicitly.
pub trait Store {
    // Feed operations
    fn add_feed(&self, feed: &NewFeed) -> Result<i64>;
    fn get_feed(&self, id: i64) -> Result<Option<Feed>>;
    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>>;
    fn get_all_feeds(&self) -> Result<Vec<Feed>>;
    fn update_feed(&self, id: i64, update: &FeedUpdate) -> Result<()>;
    fn delete_feed(&self, id: i64) -> Result<()>;
    fn set_current_news(&self, feed_id: i64, news_id: Option<i64>) -> Result<()>;

    // Aggregates
    fn refresh_counts(&self, feed_id: i64) -> Result<FeedCounts>;
    fn reset_new_counts(&self) -> Result<()>;

    // News operations
    fn find_news(&self, feed_id: i64, key: &str) -> Result<Option<NewsItem>>;
    fn insert_news(
        &self,
        feed_id: i64,
        key: &str,
        item: &ParsedItem,
        received: DateTime<Utc>,
    ) -> Result<i64>;
    fn update_news_content(&self, id: i64, item: &ParsedItem) -> Result<()>;
    fn get_news(&self, id: i64) -> Result<Option<NewsItem>>;
    /// All rows of a feed, oldest receipt first.
    fn get_news_by_feed(&self, feed_id: i64) -> Result<Vec<NewsItem>>;
    fn get_all_news(&self) -> Result<Vec<NewsItem>>;

    // State operations
    fn set_read(&self, id: i64, read: ReadState) -> Result<()>;
    fn set_new(&self, id: i64, is_new: bool) -> Result<()>;
    fn set_starred(&self, id: i64, starred: bool) -> Result<()>;
    fn set_deleted(&self, id: i64, deleted: DeletedState) -> Result<()>;

    // Bulk state operations; `None` applies to every feed
    fn mark_feed_read(&self, feed_id: i64) -> Result<usize>;
    fn clear_new(&self, feed_id: Option<i64>) -> Result<usize>;
    fn acknowledge_read(&self, feed_id: Option<i64>) -> Result<usize>;
    fn set_all_read(&self) -> Result<usize>;
    fn mark_deleted(&self, ids: &[i64]) -> Result<usize>;
    fn scrub_deleted(&self, feed_id: i64) -> Result<usize>;
    fn vacuum(&self) -> Result<()>;
}
