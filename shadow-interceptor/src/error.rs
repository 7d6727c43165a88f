use thiserror::Error;

/// Failure to obtain a rule list from a [`crate::source::RuleSource`].
///
/// Callers treat every variant the same way: keep the previous snapshot and
/// let traffic pass through.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("read rules from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse rules from {origin}: {reason}")]
    Parse { origin: String, reason: String },

    #[error("rule service {url} answered {status}")]
    Status { url: String, status: u16 },

    #[error("rule service {url} refused: {message}")]
    Service { url: String, message: String },

    #[error("rule service {url} unreachable: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },
}

/// Failure of the real network primitive.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("connect/send failed: {0}")]
    Send(String),

    #[error("read body failed: {0}")]
    Body(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("timed out after {0} ms")]
    Timeout(u64),
}

/// Failure while building the response for an already matched rule.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("rule {rule_id}: mock content {url} unavailable: {reason}")]
    RemoteContent {
        rule_id: String,
        url: String,
        reason: String,
    },

    #[error("build response: {0}")]
    Build(#[source] http::Error),
}

/// Per-rule evaluation failure. Never leaves the matcher.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("body is not json: {0}")]
    BodyNotJson(#[from] serde_json::Error),

    #[error("body is not utf-8")]
    BodyNotUtf8,
}

/// Error returned by the promise-style adapter.
#[derive(Debug, Error)]
pub enum FetchError<E>
where
    E: std::error::Error + 'static,
{
    /// The real call failed; carried unchanged.
    #[error(transparent)]
    Transport(E),

    /// A rule matched but no response could be built, and the configured
    /// policy is to reject instead of passing through.
    #[error("mock rejected: {0}")]
    Rejected(#[source] SynthesisError),

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] http::Error),
}
