//! # WeChat push sinks (`wxpush` feature).
//!
//! - [`WxPushSink`]: self-hosted WXPush worker, `POST <WXPUSH_URL>/wxsend`
//!   with the token in `Authorization`. Any 2xx status is success.
//! - [`WxPusherSink`]: the public WxPusher API. Success is JSON `code == 1000`.
//!
//! Both are built from the environment and return `None` when unconfigured,
//! which leaves the dispatcher silent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::NotifyError, notify::NotificationSink};

/// Per-request timeout for both sinks.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Public WxPusher endpoint.
pub const WXPUSHER_ENDPOINT: &str = "https://wxpusher.zjiecode.com/api/send/message";

/// WxPusher `contentType` for markdown.
const CONTENT_MARKDOWN: u8 = 3;

/// WxPusher success code.
const WXPUSHER_OK: i64 = 1000;

fn client() -> Result<reqwest::Client, NotifyError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| NotifyError::Transport(e.to_string()))
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Sink for a WXPush worker.
pub struct WxPushSink {
    client: reqwest::Client,
    url: String,
    token: String,
    userid: Option<String>,
}

#[derive(Serialize)]
struct WxPushPayload<'a> {
    title: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    userid: Option<&'a str>,
}

impl WxPushSink {
    /// Creates a sink posting to `<base_url>/wxsend`.
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        userid: Option<String>,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            client: client()?,
            url: format!("{}/wxsend", base_url.trim_end_matches('/')),
            token: token.into(),
            userid,
        })
    }

    /// Reads `WXPUSH_URL`, `WXPUSH_TOKEN` and optional `WXPUSH_USERID`.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = non_empty(lookup("WXPUSH_URL"))?;
        let token = non_empty(lookup("WXPUSH_TOKEN"))?;
        Self::new(&url, token, non_empty(lookup("WXPUSH_USERID"))).ok()
    }

    /// Full endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationSink for WxPushSink {
    fn name(&self) -> &str {
        "wxpush"
    }

    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let payload = WxPushPayload {
            title,
            content: body,
            userid: self.userid.as_deref(),
        };
        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", self.token.as_str())
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(NotifyError::Rejected(format!("{status} {text}")))
    }
}

/// Sink for the public WxPusher service.
pub struct WxPusherSink {
    client: reqwest::Client,
    endpoint: String,
    app_token: String,
    uids: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WxPusherPayload<'a> {
    app_token: &'a str,
    content: String,
    summary: &'a str,
    content_type: u8,
    uids: &'a [String],
    verify_pay: bool,
}

#[derive(Deserialize)]
struct WxPusherResponse {
    code: i64,
    #[serde(default)]
    msg: String,
}

impl WxPusherSink {
    /// Creates a sink for `app_token` delivering to `uids`.
    pub fn new(app_token: impl Into<String>, uids: Vec<String>) -> Result<Self, NotifyError> {
        Ok(Self {
            client: client()?,
            endpoint: WXPUSHER_ENDPOINT.to_string(),
            app_token: app_token.into(),
            uids,
        })
    }

    /// Posts to `endpoint` instead of the public service.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Reads `WXPUSHER_APP_TOKEN` and `WXPUSHER_UID` (comma-separated).
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = non_empty(lookup("WXPUSHER_APP_TOKEN"))?;
        let uids: Vec<String> = non_empty(lookup("WXPUSHER_UID"))?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if uids.is_empty() {
            return None;
        }
        Self::new(token, uids).ok()
    }

    fn payload<'a>(&'a self, title: &'a str, body: &str) -> WxPusherPayload<'a> {
        WxPusherPayload {
            app_token: &self.app_token,
            content: format!("# {title}\n\n{body}"),
            summary: title,
            content_type: CONTENT_MARKDOWN,
            uids: &self.uids,
            verify_pay: false,
        }
    }
}

#[async_trait]
impl NotificationSink for WxPusherSink {
    fn name(&self) -> &str {
        "wxpusher"
    }

    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&self.payload(title, body))
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let reply: WxPusherResponse = resp
            .json()
            .await
            .map_err(|e| NotifyError::Decode(e.to_string()))?;
        if reply.code == WXPUSHER_OK {
            Ok(())
        } else {
            Err(NotifyError::Rejected(format!("code {}: {}", reply.code, reply.msg)))
        }
    }
}

/// Picks the first configured sink: WXPush, then WxPusher.
pub fn sink_from_env() -> Option<Arc<dyn NotificationSink>> {
    if let Some(s) = WxPushSink::from_env() {
        return Some(Arc::new(s) as Arc<dyn NotificationSink>);
    }
    WxPusherSink::from_env().map(|s| Arc::new(s) as Arc<dyn NotificationSink>)
}
