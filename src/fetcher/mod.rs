pub mod http_fetcher;
pub mod scheduler;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::Result;

#[derive(Debug)]
pub enum FetchResult {
    /// New content fetched successfully
    Content {
        body: Vec<u8>,
        /// Server-reported build time (`Last-Modified`), if any
        build_time: Option<DateTime<Utc>>,
    },
    /// Content not modified since the supplied build time (HTTP 304)
    NotModified,
}

#[async_trait]
pub trait Fetcher {
    /// Retrieve `url`. When `since` is set, only content newer than it is
    /// requested where the transport supports conditional requests.
    async fn fetch(&self, url: &str, since: Option<DateTime<Utc>>) -> Result<FetchResult>;
}
