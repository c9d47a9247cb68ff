//! Network proxy settings for the fetch transport.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    /// Direct connections only.
    None,
    /// Use the environment (`HTTP_PROXY`, `HTTPS_PROXY`, ...).
    #[default]
    System,
    Http,
    Socks5,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl ProxyConfig {
    pub fn direct() -> Self {
        Self {
            kind: ProxyKind::None,
            ..Default::default()
        }
    }

    /// Proxy URL for explicit proxy kinds, `None` for `None`/`System`.
    pub fn url(&self) -> Option<String> {
        let scheme = match self.kind {
            ProxyKind::None | ProxyKind::System => return None,
            ProxyKind::Http => "http",
            ProxyKind::Socks5 => "socks5",
        };
        if self.port == 0 {
            Some(format!("{}://{}", scheme, self.host))
        } else {
            Some(format!("{}://{}:{}", scheme, self.host, self.port))
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.user.is_empty()
    }
}
