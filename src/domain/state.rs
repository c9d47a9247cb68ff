use serde::{Deserialize, Serialize};

/// Read state of a news item.
///
/// `ReadPendingAck` keeps a just-read item visible to "unread" filters until
/// the next acknowledgment; only a flush or an explicit feed acknowledgment
/// moves it to `ReadAcked`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadState {
    #[default]
    Unread,
    ReadPendingAck,
    ReadAcked,
}

impl ReadState {
    pub fn as_i64(self) -> i64 {
        match self {
            ReadState::Unread => 0,
            ReadState::ReadPendingAck => 1,
            ReadState::ReadAcked => 2,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            i64::MIN..=0 => ReadState::Unread,
            1 => ReadState::ReadPendingAck,
            _ => ReadState::ReadAcked,
        }
    }

    pub fn is_read(self) -> bool {
        self != ReadState::Unread
    }
}

/// Soft-delete marker of a news item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletedState {
    #[default]
    Live,
    /// Waiting for the next flush to empty its content.
    PendingScrub,
    /// Content emptied; the row only survives for dedup.
    Scrubbed,
}

impl DeletedState {
    pub fn as_i64(self) -> i64 {
        match self {
            DeletedState::Live => 0,
            DeletedState::PendingScrub => 1,
            DeletedState::Scrubbed => 2,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            i64::MIN..=0 => DeletedState::Live,
            1 => DeletedState::PendingScrub,
            _ => DeletedState::Scrubbed,
        }
    }

    pub fn is_live(self) -> bool {
        self == DeletedState::Live
    }
}
