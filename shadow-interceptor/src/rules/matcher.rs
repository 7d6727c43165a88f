use http::Method;
use serde_json::Value;

use super::rule::{MatchMode, MatcherKind, PayloadMatcher, Rule};
use crate::error::MatchError;
use crate::intercept::request::RequestDescriptor;
use crate::metrics;

/// Does `rule` apply to `request`?
///
/// Never fails: an evaluation error is logged and counts as "no match".
pub fn matches(request: &RequestDescriptor, rule: &Rule) -> bool {
    match try_matches(request, rule) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(rule_id = %rule.id, url = %request.url, error = %e, "rule evaluation failed");
            metrics::counters::inc_eval_error(&rule.id);
            false
        }
    }
}

/// First rule in list order that applies.
pub fn first_match<'a>(rules: &'a [Rule], request: &RequestDescriptor) -> Option<&'a Rule> {
    rules.iter().find(|r| matches(request, r))
}

pub fn try_matches(request: &RequestDescriptor, rule: &Rule) -> Result<bool, MatchError> {
    if !url_matches(&request.url, rule) || !method_matches(&request.method, rule) {
        return Ok(false);
    }
    body_matches(request, rule)
}

/// Empty rule url under partial mode matches every request.
pub fn url_matches(url: &str, rule: &Rule) -> bool {
    match rule.match_mode {
        MatchMode::Partial => url.contains(rule.url.as_str()),
        MatchMode::Exact => url == rule.url,
    }
}

pub fn method_matches(method: &Method, rule: &Rule) -> bool {
    match &rule.method {
        None => true,
        Some(m) => m.as_str().eq_ignore_ascii_case(method.as_str()),
    }
}

pub fn body_matches(request: &RequestDescriptor, rule: &Rule) -> Result<bool, MatchError> {
    if is_body_agnostic(&request.method) || rule.payload_matchers.is_empty() || !rule.has_payload {
        return Ok(true);
    }

    let Some(body) = request.present_body() else {
        return Ok(false);
    };
    let parsed = body.parse_json()?;

    Ok(rule
        .payload_matchers
        .iter()
        .all(|m| eval_predicate(&parsed, m)))
}

fn is_body_agnostic(method: &Method) -> bool {
    let m = method.as_str();
    m.eq_ignore_ascii_case("GET") || m.eq_ignore_ascii_case("DELETE")
}

/// Evaluate one `{key, matcher, value}` against a parsed body.
pub fn eval_predicate(body: &Value, m: &PayloadMatcher) -> bool {
    // Non-object bodies have no keys.
    let field = body.as_object().and_then(|o| o.get(&m.key));

    match &m.kind {
        MatcherKind::Equals => field.is_some_and(|f| strict_eq(f, &m.value)),
        MatcherKind::NotEquals => !field.is_some_and(|f| strict_eq(f, &m.value)),
        MatcherKind::Contains => match field {
            None | Some(Value::Null) => false,
            Some(f) => text_of(f).contains(text_of(&m.value).as_ref()),
        },
        MatcherKind::Unknown(_) => false,
    }
}

/// Type-sensitive equality: `1` never equals `"1"`, but `1` equals `1.0`.
fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x == y || matches!((x.as_f64(), y.as_f64()), (Some(p), Some(q)) if p == q)
        }
        _ => a == b,
    }
}

fn text_of(v: &Value) -> std::borrow::Cow<'_, str> {
    match v {
        Value::String(s) => std::borrow::Cow::Borrowed(s.as_str()),
        other => std::borrow::Cow::Owned(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::rule::MatchMode;
    use serde_json::json;
    use test_case::test_case;

    fn payload_rule(matchers: Vec<PayloadMatcher>) -> Rule {
        Rule::new("r", "api")
            .with_method(Method::POST)
            .with_payload(matchers)
            .with_response("{}")
    }

    fn post(body: &str) -> RequestDescriptor {
        RequestDescriptor::new(Method::POST, "https://x/api").with_body(body)
    }

    #[test_case("https://x/foo/bar", true ; "contains")]
    #[test_case("https://x/fo", false ; "prefix only")]
    #[test_case("foo", true ; "equal")]
    fn partial_url(url: &str, expected: bool) {
        let rule = Rule::new("r", "foo");
        assert_eq!(url_matches(url, &rule), expected);
    }

    #[test_case("https://x/foo", true ; "literal")]
    #[test_case("https://x/foo/", false ; "trailing slash")]
    #[test_case("https://x/foo?a=1", false ; "query")]
    fn exact_url(url: &str, expected: bool) {
        let rule = Rule::new("r", "https://x/foo").with_match_mode(MatchMode::Exact);
        assert_eq!(url_matches(url, &rule), expected);
    }

    #[test]
    fn empty_partial_url_matches_everything() {
        let rule = Rule::new("r", "");
        assert!(url_matches("https://anything", &rule));
        assert!(url_matches("", &rule));
    }

    #[test]
    fn method_is_case_insensitive() {
        let rule = Rule::new("r", "").with_method(Method::POST);
        let lower = Method::from_bytes(b"post").unwrap();
        assert!(method_matches(&lower, &rule));
        assert!(method_matches(&Method::POST, &rule));
        assert!(!method_matches(&Method::GET, &rule));
        assert!(method_matches(&Method::PUT, &Rule::new("any", "")));
    }

    #[test]
    fn get_and_delete_ignore_body() {
        let rule = Rule::new("r", "api")
            .with_method(Method::GET)
            .with_payload(vec![PayloadMatcher::new("a", MatcherKind::Equals, "1")]);
        let get = RequestDescriptor::new(Method::GET, "https://x/api");
        assert!(matches(&get, &rule));
        assert!(matches(&get.clone().with_body("garbage"), &rule));

        let rule = Rule::new("r", "api")
            .with_payload(vec![PayloadMatcher::new("a", MatcherKind::Equals, "1")]);
        assert!(matches(&RequestDescriptor::new(Method::DELETE, "https://x/api"), &rule));
    }

    #[test]
    fn has_payload_false_skips_body() {
        let mut rule = payload_rule(vec![PayloadMatcher::new("a", MatcherKind::Equals, "1")]);
        rule.has_payload = false;
        assert!(matches(&RequestDescriptor::new(Method::POST, "https://x/api"), &rule));
    }

    #[test]
    fn missing_body_fails_payload_rule() {
        let rule = payload_rule(vec![PayloadMatcher::new("a", MatcherKind::Equals, "1")]);
        assert!(!matches(&RequestDescriptor::new(Method::POST, "https://x/api"), &rule));
        assert!(!matches(&post(""), &rule));
    }

    #[test]
    fn payload_predicates_are_anded() {
        let rule = payload_rule(vec![
            PayloadMatcher::new("a", MatcherKind::Equals, "1"),
            PayloadMatcher::new("b", MatcherKind::Contains, "x"),
        ]);
        assert!(matches(&post(r#"{"a":"1","b":"xyz"}"#), &rule));
        assert!(!matches(&post(r#"{"a":"1","b":"yz"}"#), &rule));
        assert!(!matches(&post(r#"{"a":"2","b":"xyz"}"#), &rule));
    }

    #[test]
    fn more_than_three_predicates_all_evaluated() {
        let rule = payload_rule(
            (0..5)
                .map(|i| PayloadMatcher::new(format!("k{i}"), MatcherKind::Equals, i))
                .collect(),
        );
        assert!(matches(&post(r#"{"k0":0,"k1":1,"k2":2,"k3":3,"k4":4}"#), &rule));
        assert!(!matches(&post(r#"{"k0":0,"k1":1,"k2":2,"k3":3,"k4":5}"#), &rule));
    }

    #[test]
    fn malformed_body_is_no_match() {
        let rule = payload_rule(vec![PayloadMatcher::new("a", MatcherKind::Equals, "1")]);
        assert!(!matches(&post("not json"), &rule));
        assert!(try_matches(&post("not json"), &rule).is_err());
    }

    #[test]
    fn structured_body_used_as_is() {
        let rule = payload_rule(vec![PayloadMatcher::new("a", MatcherKind::Equals, true)]);
        let req = RequestDescriptor::new(Method::POST, "https://x/api").with_body(json!({"a": true}));
        assert!(matches(&req, &rule));
    }

    #[test_case(json!({"a": "1"}), MatcherKind::Equals, json!("1"), true ; "equals string")]
    #[test_case(json!({"a": 1}), MatcherKind::Equals, json!("1"), false ; "equals is type sensitive")]
    #[test_case(json!({"a": 1}), MatcherKind::Equals, json!(1.0), true ; "equals numeric value")]
    #[test_case(json!({}), MatcherKind::Equals, json!("1"), false ; "equals missing")]
    #[test_case(json!({"a": "2"}), MatcherKind::NotEquals, json!("1"), true ; "not equals differs")]
    #[test_case(json!({"a": "1"}), MatcherKind::NotEquals, json!("1"), false ; "not equals same")]
    #[test_case(json!({}), MatcherKind::NotEquals, json!("1"), true ; "not equals missing")]
    #[test_case(json!({"a": "practice"}), MatcherKind::Contains, json!("act"), true ; "contains substring")]
    #[test_case(json!({"a": 12345}), MatcherKind::Contains, json!("234"), true ; "contains number text")]
    #[test_case(json!({"a": null}), MatcherKind::Contains, json!(""), false ; "contains null")]
    #[test_case(json!({}), MatcherKind::Contains, json!("a"), false ; "contains missing")]
    #[test_case(json!([1, 2]), MatcherKind::NotEquals, json!(1), true ; "array body has no keys")]
    #[test_case(json!({"a": "1"}), MatcherKind::Unknown("Regex".into()), json!("1"), false ; "unknown fails closed")]
    fn predicate(body: Value, kind: MatcherKind, value: Value, expected: bool) {
        let m = PayloadMatcher::new("a", kind, value);
        assert_eq!(eval_predicate(&body, &m), expected);
    }

    #[test]
    fn matching_is_idempotent() {
        let rule = payload_rule(vec![PayloadMatcher::new("a", MatcherKind::Contains, "x")]);
        let req = post(r#"{"a":"xx"}"#);
        let first = matches(&req, &rule);
        let second = matches(&req, &rule);
        assert_eq!(first, second);
        assert!(first);
    }

    #[test]
    fn first_match_wins_in_list_order() {
        let rules = vec![
            Rule::new("broad", "api").with_response("1"),
            Rule::new("specific", "api/posts").with_response("2"),
        ];
        let req = RequestDescriptor::new(Method::GET, "https://x/api/posts");
        assert_eq!(first_match(&rules, &req).map(|r| r.id.as_str()), Some("broad"));

        let req = RequestDescriptor::new(Method::GET, "https://x/other");
        assert!(first_match(&rules, &req).is_none());
    }

    #[test]
    fn numeric_body_does_not_equal_string_rule_value() {
        let rule = Rule::new("1", "api/posts")
            .with_method(Method::POST)
            .with_payload(vec![PayloadMatcher::new("userId", MatcherKind::Equals, "1")])
            .with_response(r#"{"mocked":true}"#);
        let req = RequestDescriptor::new(Method::POST, "https://jsonplaceholder.typicode.com/posts")
            .with_body(r#"{"userId":1,"title":"t"}"#);
        assert!(!matches(&req, &rule));

        // Same request with a url that does match: the body still decides.
        let rule = Rule { url: "typicode.com/posts".into(), ..rule };
        assert!(!matches(&req, &rule));
        let req = req.with_body(r#"{"userId":"1","title":"t"}"#);
        assert!(matches(&req, &rule));
    }
}
