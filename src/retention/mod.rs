//! Retention policy applied to each feed during a flush.
//!
//! Selection is computed from a snapshot of the feed's rows before anything
//! is marked, so the result does not depend on concurrent merges or on the
//! order in which rows are visited.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::Result;
use crate::domain::NewsItem;
use crate::store::Store;

/// Retention thresholds and toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Items older than this many days are pruned when `day_clean_up_on`.
    pub max_day_clean_up: i64,
    /// Live items kept per feed when `news_clean_up_on`.
    pub max_news_clean_up: usize,
    pub day_clean_up_on: bool,
    pub news_clean_up_on: bool,
    /// Prune every read item.
    pub read_clean_up: bool,
    pub never_unread_clean_up: bool,
    pub never_star_clean_up: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_day_clean_up: 30,
            max_news_clean_up: 200,
            day_clean_up_on: true,
            news_clean_up_on: true,
            read_clean_up: false,
            never_unread_clean_up: true,
            never_star_clean_up: true,
        }
    }
}

/// Why an item was selected for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneReason {
    Count,
    Age,
    Read,
}

impl RetentionPolicy {
    /// Ids to mark `deleted=1`, each with the first rule that selected it.
    ///
    /// `items` must hold every row of a single feed.
    pub fn select(&self, items: &[NewsItem], now: DateTime<Utc>) -> Vec<(i64, PruneReason)> {
        let live_count = items.iter().filter(|n| n.deleted.is_live()).count();

        let mut candidates: Vec<&NewsItem> =
            items.iter().filter(|n| self.is_candidate(n)).collect();
        candidates.sort_by_key(|n| (n.timestamp(), n.id));

        let mut excess = if self.news_clean_up_on {
            live_count.saturating_sub(self.max_news_clean_up)
        } else {
            0
        };

        let mut selected = Vec::new();
        for item in candidates {
            if excess > 0 {
                selected.push((item.id, PruneReason::Count));
                excess -= 1;
                continue;
            }

            if self.day_clean_up_on && self.is_expired(item, now) {
                selected.push((item.id, PruneReason::Age));
                continue;
            }

            if self.read_clean_up && item.read.is_read() {
                selected.push((item.id, PruneReason::Read));
            }
        }

        selected
    }

    fn is_candidate(&self, item: &NewsItem) -> bool {
        if !item.deleted.is_live() {
            return false;
        }
        if self.never_unread_clean_up && !item.read.is_read() {
            return false;
        }
        if self.never_star_clean_up && item.starred {
            return false;
        }
        true
    }

    fn is_expired(&self, item: &NewsItem, now: DateTime<Utc>) -> bool {
        item.timestamp()
            .map(|ts| now.signed_duration_since(ts).num_days() > self.max_day_clean_up)
            .unwrap_or(false)
    }
}

/// Run the policy over one feed of `store`, marking the selection
/// `deleted=1`. Returns the number of rows marked.
pub fn apply<S: Store + ?Sized>(
    store: &S,
    feed_id: i64,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<usize> {
    let snapshot = store.get_news_by_feed(feed_id)?;
    let selected = policy.select(&snapshot, now);
    if selected.is_empty() {
        return Ok(0);
    }

    let ids: Vec<i64> = selected
        .iter()
        .map(|(id, _)| *id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let marked = store.mark_deleted(&ids)?;

    tracing::debug!(
        feed_id,
        marked,
        by_count = selected.iter().filter(|(_, r)| *r == PruneReason::Count).count(),
        by_age = selected.iter().filter(|(_, r)| *r == PruneReason::Age).count(),
        by_read = selected.iter().filter(|(_, r)| *r == PruneReason::Read).count(),
        "retention pass"
    );

    Ok(marked)
}
