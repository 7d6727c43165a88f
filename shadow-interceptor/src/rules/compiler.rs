use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::rule::{
    parse_rule_method, MatchMode, MatcherKind, PayloadMatcher, RawPayloadMatcher, RawRule, Rule,
};
use crate::metrics;

/// Immutable snapshot of the active rules, in evaluation order.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub version: Option<String>,
    pub rules: Vec<Rule>,
    /// Rules that were present upstream but not usable.
    pub dropped: Vec<DroppedRule>,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedRule {
    pub index: usize,
    pub id: Option<String>,
    pub reason: String,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl RuleSet {
    pub fn empty() -> Self {
        Self {
            version: None,
            rules: Vec::new(),
            dropped: Vec::new(),
            loaded_at: Utc::now(),
        }
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            ..Self::empty()
        }
    }

    /// Sanitize loosely typed rules. Inactive and deleted rules are skipped,
    /// unusable ones are recorded in `dropped`; neither stops the others.
    pub fn from_values(values: Vec<Value>) -> Self {
        let mut rules = Vec::with_capacity(values.len());
        let mut dropped = Vec::new();
        let mut seen = HashSet::new();

        for (index, v) in values.into_iter().enumerate() {
            let raw: RawRule = match serde_json::from_value(v) {
                Ok(r) => r,
                Err(e) => {
                    dropped.push(DroppedRule {
                        index,
                        id: None,
                        reason: format!("malformed rule: {e}"),
                    });
                    continue;
                }
            };

            if raw.is_active == Some(false) || raw.deleted == Some(true) {
                tracing::debug!(index, "skip inactive rule");
                continue;
            }

            match compile_rule(raw, index) {
                Ok(rule) => {
                    if !seen.insert(rule.id.clone()) {
                        dropped.push(DroppedRule {
                            index,
                            id: Some(rule.id),
                            reason: "duplicate id".into(),
                        });
                        continue;
                    }
                    rules.push(rule);
                }
                Err(d) => dropped.push(d),
            }
        }

        for d in &dropped {
            tracing::warn!(index = d.index, rule_id = ?d.id, reason = %d.reason, "rule dropped");
        }
        metrics::counters::inc_rules_dropped(dropped.len() as u64);

        Self {
            version: None,
            rules,
            dropped,
            loaded_at: Utc::now(),
        }
    }

    /// Parse a rules document: a bare list, `{rules: [...]}` or the rule
    /// service envelope `{data: [...]}`. Accepts json or yaml.
    pub fn parse_document(text: &str) -> Result<Self> {
        let doc: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => serde_yaml::from_str(text).context("parse rules document")?,
        };
        let (version, list) = split_document(doc)?;
        let mut rs = Self::from_values(list);
        rs.version = version;
        Ok(rs)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Pull the rule list (and an optional version tag) out of a document.
pub(crate) fn split_document(doc: Value) -> Result<(Option<String>, Vec<Value>)> {
    match doc {
        Value::Array(list) => Ok((None, list)),
        Value::Object(mut map) => {
            let version = map.get("version").map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            for key in ["rules", "data"] {
                match map.remove(key) {
                    Some(Value::Array(list)) => return Ok((version, list)),
                    // `{data: {rules: [...]}}`
                    Some(inner @ Value::Object(_)) => return split_document(inner),
                    Some(Value::Null) | None => continue,
                    Some(other) => anyhow::bail!("`{key}` is not a list: {other}"),
                }
            }
            anyhow::bail!("no `rules` or `data` list in document")
        }
        Value::Null => Ok((None, Vec::new())),
        other => anyhow::bail!("rules document must be a list or object, got {other}"),
    }
}

fn compile_rule(raw: RawRule, index: usize) -> Result<Rule, DroppedRule> {
    let id = raw
        .id
        .as_ref()
        .or(raw.rule_id.as_ref())
        .or(raw.object_id.as_ref())
        .and_then(id_text)
        .unwrap_or_else(|| format!("#{index}"));

    let reject = |reason: String| DroppedRule {
        index,
        id: Some(id.clone()),
        reason,
    };

    let url = match raw.url {
        Some(u) => u.trim().to_string(),
        None => return Err(reject("missing url".into())),
    };

    let method = match raw.method.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(m) => match parse_rule_method(m) {
            Some(m) => Some(m),
            None => return Err(reject(format!("unsupported method {m:?}"))),
        },
    };

    let match_mode = raw
        .match_mode
        .filter(|m| !m.is_empty())
        .or(raw.match_alias);
    let match_mode = match match_mode.as_deref() {
        None | Some("") => MatchMode::default(),
        Some(m) => m.parse::<MatchMode>().map_err(reject)?,
    };

    let payload_matchers = raw
        .payload_matchers
        .filter(|v| !v.is_null())
        .or(raw.payload_alias);
    let payload_matchers = match payload_matchers {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.into_iter().map(compile_payload_matcher).collect(),
        Some(other) => return Err(reject(format!("payload matchers must be a list, got {other}"))),
    };

    let response = match raw.response {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    };
    let mock_response_url = raw
        .mock_response_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());

    if response.is_none() && mock_response_url.is_none() {
        return Err(reject("no response configured".into()));
    }

    Ok(Rule {
        has_payload: raw.has_payload.unwrap_or(!payload_matchers.is_empty()),
        id,
        name: raw.name,
        url,
        method,
        match_mode,
        payload_matchers,
        response,
        mock_response_url,
    })
}

/// A malformed entry becomes a predicate that can never hold.
fn compile_payload_matcher(v: Value) -> PayloadMatcher {
    match serde_json::from_value::<RawPayloadMatcher>(v.clone()) {
        Ok(p) => PayloadMatcher {
            kind: MatcherKind::from(p.matcher.as_str()),
            key: p.key,
            value: p.value,
        },
        Err(_) => PayloadMatcher {
            key: String::new(),
            kind: MatcherKind::Unknown(v.to_string()),
            value: Value::Null,
        },
    }
}

fn id_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        // mongo extended json: {"$oid": "..."}
        Value::Object(map) => map.get("$oid").and_then(id_text),
        _ => None,
    }
}
