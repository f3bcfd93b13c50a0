use serde::{Deserialize, Serialize};
use std::env;

/// Runtime configuration, shared through the application context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub http: HttpConfig,
    pub session: SessionConfig,
    /// Page id of the trash parent; pages under it count as trashed.
    pub trash_page_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub https: bool,
    /// URL prefix from the server document root, e.g. "/" or "/site/".
    pub root_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Require a challenge cookie matching the stored session challenge.
    pub challenge: bool,
    /// Require the client fingerprint (addr + user agent) to match.
    pub fingerprint: bool,
    /// Challenge cookie lifetime in seconds; 0 = session cookie.
    pub expire_seconds: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            http: HttpConfig {
                host: env::var("WIRE_HTTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
                https: env::var("WIRE_HTTPS").map(|v| v == "1").unwrap_or(false),
                root_url: env::var("WIRE_ROOT_URL").unwrap_or_else(|_| "/".to_string()),
            },
            session: SessionConfig {
                challenge: env::var("WIRE_SESSION_CHALLENGE")
                    .map(|v| v != "0")
                    .unwrap_or(true),
                fingerprint: env::var("WIRE_SESSION_FINGERPRINT")
                    .map(|v| v != "0")
                    .unwrap_or(true),
                expire_seconds: env::var("WIRE_SESSION_EXPIRE_SECONDS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .unwrap_or(86400),
            },
            trash_page_id: env::var("WIRE_TRASH_PAGE_ID")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .unwrap_or(7),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                host: "localhost".to_string(),
                https: false,
                root_url: "/".to_string(),
            },
            session: SessionConfig {
                challenge: true,
                fingerprint: true,
                expire_seconds: 86400,
            },
            trash_page_id: 7,
        }
    }
}
