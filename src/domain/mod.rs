pub mod feed;
pub mod news;
pub mod state;

pub use feed::{Feed, FeedCounts, FeedUpdate, NewFeed};
pub use news::{NewsItem, ParsedItem};
pub use state::{DeletedState, ReadState};
