use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;

use super::decision::{Decision, Outcome};
use super::request::RequestDescriptor;
use crate::metrics;
use crate::obs::{InterceptEvent, ObsSink};
use crate::rules::matcher::first_match;
use crate::rules::RuleSet;

/// Shared by every adapter. Holds the current rule snapshot; each evaluation
/// works on one snapshot even if a refresh swaps in a new one meanwhile.
#[derive(Clone)]
pub struct InterceptEngine {
    rules: Arc<ArcSwap<RuleSet>>,
    enabled: Arc<AtomicBool>,
    obs: Option<ObsSink>,
}

impl Default for InterceptEngine {
    fn default() -> Self {
        Self::new(RuleSet::empty())
    }
}

impl InterceptEngine {
    pub fn new(initial: RuleSet) -> Self {
        metrics::counters::set_rules_active(initial.len());
        Self {
            rules: Arc::new(ArcSwap::from_pointee(initial)),
            enabled: Arc::new(AtomicBool::new(true)),
            obs: None,
        }
    }

    pub fn with_obs(mut self, obs: ObsSink) -> Self {
        self.obs = Some(obs);
        self
    }

    /// Replace the rule list; returns the snapshot now in effect.
    pub fn swap_rules(&self, new_rules: RuleSet) -> Arc<RuleSet> {
        metrics::counters::set_rules_active(new_rules.len());
        let snapshot = Arc::new(new_rules);
        let previous = self.rules.swap(snapshot.clone());

        let live: HashSet<&str> = snapshot.rules.iter().map(|r| r.id.as_str()).collect();
        metrics::counters::forget_rules(
            previous
                .rules
                .iter()
                .map(|r| r.id.as_str())
                .filter(|id| !live.contains(id)),
        );
        snapshot
    }

    pub fn rules_snapshot(&self) -> Arc<RuleSet> {
        self.rules.load_full()
    }

    /// Master switch. Disabled means every call passes through.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled, "interception toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn evaluate(&self, request: &RequestDescriptor) -> Decision {
        if !self.is_enabled() {
            return Decision::passthrough();
        }
        let rs = self.rules_snapshot();
        match first_match(&rs.rules, request) {
            Some(rule) => {
                tracing::debug!(rule_id = %rule.id, method = %request.method, url = %request.url, "rule matched");
                Decision::mock(rule.clone())
            }
            None => Decision::passthrough(),
        }
    }

    /// Count and log how a call ended.
    pub fn record(
        &self,
        adapter: &'static str,
        request: &RequestDescriptor,
        outcome: Outcome,
        rule_id: Option<&str>,
        status: Option<u16>,
        error: Option<String>,
    ) {
        metrics::counters::inc_decision(adapter, outcome.as_str());

        match outcome {
            Outcome::Mock => {
                tracing::info!(adapter, rule_id = ?rule_id, method = %request.method, url = %request.url, "request mocked")
            }
            Outcome::Passthrough => {
                tracing::trace!(adapter, method = %request.method, url = %request.url, "request passed through")
            }
            _ => {
                tracing::warn!(adapter, outcome = outcome.as_str(), rule_id = ?rule_id, url = %request.url, error = ?error, "mock synthesis failed")
            }
        }

        if let Some(obs) = &self.obs {
            obs.write_event(&InterceptEvent {
                ts: Utc::now(),
                adapter,
                outcome: outcome.as_str(),
                rule_id: rule_id.map(str::to_string),
                method: request.method.to_string(),
                url: request.url.clone(),
                status,
                error,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rule;
    use http::Method;

    fn engine() -> InterceptEngine {
        InterceptEngine::new(RuleSet::from_rules(vec![
            Rule::new("a", "api/a").with_response("1"),
            Rule::new("b", "api").with_response("2"),
        ]))
    }

    #[test]
    fn evaluate_first_match() {
        let e = engine();
        let d = e.evaluate(&RequestDescriptor::new(Method::GET, "https://x/api/a"));
        assert_eq!(d.rule().map(|r| r.id.as_str()), Some("a"));

        let d = e.evaluate(&RequestDescriptor::new(Method::GET, "https://x/nothing"));
        assert_eq!(d, Decision::Passthrough);
    }

    #[test]
    fn swap_forgets_eval_errors_of_removed_rules() {
        use crate::metrics::registry::gather_as_text;
        use crate::rules::{MatcherKind, PayloadMatcher};

        let payload = || vec![PayloadMatcher::new("userId", MatcherKind::Equals, 1)];
        let e = InterceptEngine::new(RuleSet::from_rules(vec![
            Rule::new("swap-retired", "api/retired")
                .with_method(Method::POST)
                .with_payload(payload()),
            Rule::new("swap-kept", "api/kept")
                .with_method(Method::POST)
                .with_payload(payload()),
        ]));
        for url in ["https://x/api/retired", "https://x/api/kept"] {
            let req = RequestDescriptor::new(Method::POST, url).with_body("not json");
            assert!(!e.evaluate(&req).is_mock());
        }
        let text = gather_as_text();
        assert!(text.contains(r#"rule_id="swap-retired""#));
        assert!(text.contains(r#"rule_id="swap-kept""#));

        e.swap_rules(RuleSet::from_rules(vec![Rule::new("swap-kept", "api/kept")]));

        let text = gather_as_text();
        assert!(!text.contains(r#"rule_id="swap-retired""#));
        assert!(text.contains(r#"rule_id="swap-kept""#));
    }

    #[test]
    fn empty_rules_pass_through() {
        let e = InterceptEngine::default();
        let d = e.evaluate(&RequestDescriptor::new(Method::GET, "https://x/api"));
        assert!(!d.is_mock());
    }

    #[test]
    fn disabled_passes_through() {
        let e = engine();
        e.set_enabled(false);
        assert!(!e.evaluate(&RequestDescriptor::new(Method::GET, "https://x/api")).is_mock());
        e.set_enabled(true);
        assert!(e.evaluate(&RequestDescriptor::new(Method::GET, "https://x/api")).is_mock());
    }

    #[test]
    fn held_snapshot_survives_swap() {
        let e = engine();
        let before = e.rules_snapshot();
        let after = e.swap_rules(RuleSet::empty());
        assert_eq!(before.len(), 2);
        assert!(after.is_empty());
        assert!(e.rules_snapshot().is_empty());
        // the clone shares state
        let e2 = e.clone();
        e2.swap_rules(RuleSet::from_rules(vec![Rule::new("z", "").with_response("{}")]));
        assert_eq!(e.rules_snapshot().len(), 1);
    }
}
