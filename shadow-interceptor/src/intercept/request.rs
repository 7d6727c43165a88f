use std::borrow::Cow;

use bytes::Bytes;
use http::Method;
use serde_json::Value;

use crate::error::MatchError;

/// What the matcher sees of an in-flight call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: Method,
    pub body: Option<RequestBody>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Body, ignoring empty ones.
    pub fn present_body(&self) -> Option<&RequestBody> {
        self.body.as_ref().filter(|b| !b.is_empty())
    }
}

/// Request payload as handed to the host call.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Text(String),
    /// Already structured; used as-is.
    Json(Value),
    Bytes(Bytes),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        match self {
            RequestBody::Text(s) => s.is_empty(),
            RequestBody::Json(Value::Null) => true,
            RequestBody::Json(_) => false,
            RequestBody::Bytes(b) => b.is_empty(),
        }
    }

    pub fn parse_json(&self) -> Result<Cow<'_, Value>, MatchError> {
        match self {
            RequestBody::Json(v) => Ok(Cow::Borrowed(v)),
            RequestBody::Text(s) => Ok(Cow::Owned(serde_json::from_str(s)?)),
            RequestBody::Bytes(b) => {
                let s = std::str::from_utf8(b).map_err(|_| MatchError::BodyNotUtf8)?;
                Ok(Cow::Owned(serde_json::from_str(s)?))
            }
        }
    }

    /// Wire form for the real call.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            RequestBody::Text(s) => Bytes::from(s.clone()),
            RequestBody::Json(v) => Bytes::from(v.to_string()),
            RequestBody::Bytes(b) => b.clone(),
        }
    }
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        RequestBody::Text(s.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Text(s)
    }
}

impl From<Value> for RequestBody {
    fn from(v: Value) -> Self {
        RequestBody::Json(v)
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        RequestBody::Bytes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_bodies_are_absent() {
        let req = RequestDescriptor::new(Method::POST, "u").with_body("");
        assert!(req.present_body().is_none());
        let req = RequestDescriptor::new(Method::POST, "u").with_body(Bytes::new());
        assert!(req.present_body().is_none());
        let req = RequestDescriptor::new(Method::POST, "u").with_body(json!({}));
        assert!(req.present_body().is_some());
    }

    #[test]
    fn parse_variants() {
        let text = RequestBody::from(r#"{"a":1}"#);
        assert_eq!(text.parse_json().unwrap().into_owned(), json!({"a": 1}));

        let bytes = RequestBody::from(Bytes::from_static(br#"{"a":1}"#));
        assert_eq!(bytes.parse_json().unwrap().into_owned(), json!({"a": 1}));

        let invalid = RequestBody::from(Bytes::from_static(&[0xff, 0xfe]));
        assert!(matches!(invalid.parse_json(), Err(MatchError::BodyNotUtf8)));

        assert!(RequestBody::from("not json").parse_json().is_err());
    }
}
