use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::{Client, Proxy, StatusCode};

use crate::app::Result;
use crate::config::{FetchConfig, ProxyConfig, ProxyKind};
use crate::fetcher::{FetchResult, Fetcher};

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(fetch: &FetchConfig, proxy: &ProxyConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(fetch.timeout_secs))
            .gzip(true)
            .brotli(true)
            .user_agent(fetch.user_agent.clone());

        builder = match proxy.kind {
            ProxyKind::System => builder,
            ProxyKind::None => builder.no_proxy(),
            ProxyKind::Http | ProxyKind::Socks5 => {
                let mut p = Proxy::all(proxy.url().unwrap_or_default())?;
                if proxy.has_credentials() {
                    p = p.basic_auth(&proxy.user, &proxy.password);
                }
                builder.no_proxy().proxy(p)
            }
        };

        Ok(Self {
            client: builder.build()?,
        })
    }

    fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc2822(value)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, since: Option<DateTime<Utc>>) -> Result<FetchResult> {
        let mut headers = HeaderMap::new();

        if let Some(since) = since {
            let formatted = since.format(HTTP_DATE_FORMAT).to_string();
            if let Ok(value) = HeaderValue::from_str(&formatted) {
                headers.insert(IF_MODIFIED_SINCE, value);
            }
        }

        let response = self.client.get(url).headers(headers).send().await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(FetchResult::NotModified);
        }

        response.error_for_status_ref()?;

        let build_time = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse_http_date);

        let body = response.bytes().await?.to_vec();

        Ok(FetchResult::Content { body, build_time })
    }
}
