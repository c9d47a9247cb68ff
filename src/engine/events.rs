use crate::domain::FeedCounts;
use crate::mirror::FlushReport;

pub const EVENT_CAPACITY: usize = 256;

/// Notifications broadcast to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A feed row changed; carries its refreshed aggregates.
    FeedChanged { feed_id: i64, counts: FeedCounts },
    FeedDeleted { feed_id: i64 },
    NewsChanged { feed_id: i64, news_id: i64 },
    /// The feed open in the interactive view was updated by a merge.
    Redisplay { feed_id: i64 },
    Progress { outstanding: usize, total: usize },
    /// The fetch queue drained and every fetched document was merged.
    UpdateDone,
    /// New items arrived during the last update cycle.
    NewContent { delta: i64 },
    /// Sums over all feeds.
    Totals { new: i64, unread: i64 },
    Flushed(FlushReport),
}
