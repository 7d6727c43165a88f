use std::fmt;
use std::str::FromStr;

use http::Method;
use serde::Deserialize;
use serde_json::Value;

/// Loose wire shape of a rule as the rule service stores it.
///
/// Every field is optional here; [`super::compiler`] decides what is usable.
/// Unknown fields (`createdBy`, timestamps, ...) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRule {
    pub id: Option<Value>,
    pub rule_id: Option<Value>,
    #[serde(rename = "_id")]
    pub object_id: Option<Value>,

    pub name: Option<String>,
    pub description: Option<String>,

    pub url: Option<String>,
    pub method: Option<String>,
    pub match_mode: Option<String>,
    /// Persistence spelling of `matchMode`; used when `matchMode` is absent.
    #[serde(rename = "match")]
    pub match_alias: Option<String>,

    /// List of `{key, matcher, value}`. Kept as raw json so one bad entry
    /// doesn't reject the whole rule.
    pub payload_matchers: Option<Value>,
    /// Persistence spelling of `payloadMatchers`.
    #[serde(rename = "payload")]
    pub payload_alias: Option<Value>,
    pub has_payload: Option<bool>,

    /// Usually a string holding json; objects are accepted and serialized.
    pub response: Option<Value>,
    pub mock_response_url: Option<String>,

    pub is_active: Option<bool>,
    pub deleted: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPayloadMatcher {
    pub key: String,
    pub matcher: String,
    #[serde(default)]
    pub value: Value,
}

/// URL comparison mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Request URL must equal the rule URL.
    Exact,
    /// Request URL must contain the rule URL.
    #[default]
    Partial,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Exact => "EXACT_MATCH",
            MatchMode::Partial => "PARTIAL_MATCH",
        }
    }
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EXACT_MATCH" | "EXACT" => Ok(MatchMode::Exact),
            "PARTIAL_MATCH" | "PARTIAL" => Ok(MatchMode::Partial),
            other => Err(format!("unknown match mode {other:?}")),
        }
    }
}

/// Body predicate operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatcherKind {
    Equals,
    NotEquals,
    Contains,
    /// Anything else. Always evaluates to false.
    Unknown(String),
}

impl From<&str> for MatcherKind {
    fn from(s: &str) -> Self {
        let norm: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();
        match norm.as_str() {
            "equals" => MatcherKind::Equals,
            "notequals" => MatcherKind::NotEquals,
            "contains" => MatcherKind::Contains,
            _ => MatcherKind::Unknown(s.to_string()),
        }
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatcherKind::Equals => f.write_str("Equals"),
            MatcherKind::NotEquals => f.write_str("Not Equals"),
            MatcherKind::Contains => f.write_str("Contains"),
            MatcherKind::Unknown(s) => write!(f, "Unknown({s})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadMatcher {
    pub key: String,
    pub kind: MatcherKind,
    pub value: Value,
}

impl PayloadMatcher {
    pub fn new(key: impl Into<String>, kind: MatcherKind, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            kind,
            value: value.into(),
        }
    }
}

/// A validated interception rule. Immutable once inside a [`super::compiler::RuleSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: String,
    pub name: Option<String>,
    pub url: String,
    /// `None` matches any method. Always upper-case.
    pub method: Option<Method>,
    pub match_mode: MatchMode,
    pub payload_matchers: Vec<PayloadMatcher>,
    pub has_payload: bool,
    pub response: Option<String>,
    pub mock_response_url: Option<String>,
}

impl Rule {
    /// Partial-match rule for any method with no body predicates.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            url: url.into(),
            method: None,
            match_mode: MatchMode::Partial,
            payload_matchers: Vec::new(),
            has_payload: false,
            response: None,
            mock_response_url: None,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    pub fn with_payload(mut self, matchers: Vec<PayloadMatcher>) -> Self {
        self.has_payload = !matchers.is_empty();
        self.payload_matchers = matchers;
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn with_mock_response_url(mut self, url: impl Into<String>) -> Self {
        self.mock_response_url = Some(url.into());
        self
    }
}

/// Case-insensitive parse restricted to the methods a rule may name.
pub fn parse_rule_method(s: &str) -> Option<Method> {
    match s.trim().to_ascii_uppercase().as_str() {
        "GET" => Some(Method::GET),
        "POST" => Some(Method::POST),
        "PUT" => Some(Method::PUT),
        "PATCH" => Some(Method::PATCH),
        "DELETE" => Some(Method::DELETE),
        "HEAD" => Some(Method::HEAD),
        "OPTIONS" => Some(Method::OPTIONS),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matcher_kind_spellings() {
        assert_eq!(MatcherKind::from("Equals"), MatcherKind::Equals);
        assert_eq!(MatcherKind::from("Not Equals"), MatcherKind::NotEquals);
        assert_eq!(MatcherKind::from("not_equals"), MatcherKind::NotEquals);
        assert_eq!(MatcherKind::from("NotEquals"), MatcherKind::NotEquals);
        assert_eq!(MatcherKind::from("contains"), MatcherKind::Contains);
        assert_eq!(
            MatcherKind::from("Regex"),
            MatcherKind::Unknown("Regex".to_string())
        );
    }

    #[test]
    fn match_mode_parse() {
        assert_eq!("EXACT_MATCH".parse::<MatchMode>(), Ok(MatchMode::Exact));
        assert_eq!("partial_match".parse::<MatchMode>(), Ok(MatchMode::Partial));
        assert!("FUZZY".parse::<MatchMode>().is_err());
    }

    #[test]
    fn rule_methods_are_case_insensitive() {
        assert_eq!(parse_rule_method("post"), Some(Method::POST));
        assert_eq!(parse_rule_method(" Delete "), Some(Method::DELETE));
        assert_eq!(parse_rule_method("TRACE"), None);
    }

    #[test]
    fn raw_rule_accepts_persistence_field_names() {
        let v = serde_json::json!({
            "_id": {"$oid": "685f9c0fd1caaab9bc7c2881"},
            "ruleId": 7,
            "name": "posts mock",
            "url": "api/posts",
            "method": "POST",
            "match": "PARTIAL_MATCH",
            "payload": [{"key": "userId", "matcher": "Equals", "value": "1"}],
            "response": {"mocked": true},
            "isActive": true,
            "createdBy": "someone"
        });
        let raw: RawRule = serde_json::from_value(v).unwrap();
        assert_eq!(raw.rule_id, Some(serde_json::json!(7)));
        assert_eq!(raw.match_mode.as_deref(), Some("PARTIAL_MATCH"));
        assert!(raw.payload_matchers.unwrap().is_array());
    }
}
