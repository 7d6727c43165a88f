use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{SynthesisError, TransportError};
use crate::rules::Rule;

pub const APPLICATION_JSON: &str = "application/json";

/// Response handed back to the caller in place of the real one.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl SyntheticResponse {
    pub fn ok_json(body: impl Into<Bytes>) -> Self {
        Self::with_status(StatusCode::OK, body)
    }

    /// 500 with `{"error": message}`.
    pub fn error(message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, body)
    }

    fn with_status(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Body parses as json. A non-json body is still returned, as opaque text.
    pub fn is_json(&self) -> bool {
        serde_json::from_slice::<serde::de::IgnoredAny>(&self.body).is_ok()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// `name: value` lines, CRLF terminated, names lower-case.
    pub fn header_lines(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.headers {
            if let Ok(v) = value.to_str() {
                out.push_str(name.as_str());
                out.push_str(": ");
                out.push_str(v);
                out.push_str("\r\n");
            }
        }
        out
    }

    pub fn into_http(self) -> Result<http::Response<Bytes>, http::Error> {
        let mut builder = http::Response::builder().status(self.status);
        if let Some(h) = builder.headers_mut() {
            h.extend(self.headers);
        }
        builder.body(self.body)
    }
}

/// Pure transform: status 200, json content type, the rule's response verbatim
/// (empty when the rule has none).
pub fn synthesize(rule: &Rule) -> SyntheticResponse {
    let body = rule.response.clone().unwrap_or_default();
    SyntheticResponse::ok_json(body)
}

/// Loads mock content kept behind a rule's `mock_response_url`.
#[async_trait]
pub trait MockContentFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, TransportError>;
}

/// Builds the response for a matched rule, fetching remote mock content when
/// the rule points at some.
#[derive(Clone)]
pub struct Synthesizer {
    fetcher: Option<Arc<dyn MockContentFetcher>>,
    timeout: Duration,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Synthesizer {
    pub fn new() -> Self {
        Self {
            fetcher: None,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_fetcher(fetcher: Arc<dyn MockContentFetcher>, timeout: Duration) -> Self {
        Self {
            fetcher: Some(fetcher),
            timeout,
        }
    }

    pub async fn resolve(&self, rule: &Rule) -> Result<SyntheticResponse, SynthesisError> {
        let Some(url) = rule.mock_response_url.as_deref() else {
            return Ok(synthesize(rule));
        };

        let remote_err = match self.fetch_remote(url).await {
            Ok(text) => return Ok(SyntheticResponse::ok_json(text)),
            Err(reason) => reason,
        };

        if rule.response.is_some() {
            tracing::warn!(rule_id = %rule.id, url, reason = %remote_err, "mock content unavailable, using inline response");
            return Ok(synthesize(rule));
        }

        Err(SynthesisError::RemoteContent {
            rule_id: rule.id.clone(),
            url: url.to_string(),
            reason: remote_err,
        })
    }

    async fn fetch_remote(&self, url: &str) -> Result<String, String> {
        let fetcher = self
            .fetcher
            .as_ref()
            .ok_or_else(|| "no mock content fetcher configured".to_string())?;

        match tokio::time::timeout(self.timeout, fetcher.fetch_text(url)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(TransportError::Timeout(self.timeout.as_millis() as u64).to_string()),
        }
    }
}
