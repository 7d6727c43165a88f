use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

pub static DECISIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "shadow_intercept_decisions_total",
        "Interception decisions by adapter and outcome",
        &["adapter", "outcome"]
    )
        .expect("register shadow_intercept_decisions_total")
});

pub static EVAL_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "shadow_rule_eval_errors_total",
        "Rule evaluations that failed and were treated as no match",
        &["rule_id"]
    )
        .expect("register shadow_rule_eval_errors_total")
});

pub static RELOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "shadow_rule_reloads_total",
        "Rule source refresh attempts",
        &["result"]
    )
        .expect("register shadow_rule_reloads_total")
});

pub static RULES_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "shadow_rules_dropped_total",
        "Rules rejected while sanitizing a rule list"
    )
        .expect("register shadow_rules_dropped_total")
});

pub static RULES_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("shadow_rules_active", "Rules in the current snapshot")
        .expect("register shadow_rules_active")
});

#[inline]
pub fn inc_decision(adapter: &str, outcome: &str) {
    DECISIONS_TOTAL.with_label_values(&[adapter, outcome]).inc();
}

#[inline]
pub fn inc_eval_error(rule_id: &str) {
    EVAL_ERRORS_TOTAL.with_label_values(&[rule_id]).inc();
}

/// Drop the eval error series of rules no longer in the active set, so the
/// `rule_id` label only spans rules that can still be evaluated.
pub fn forget_rules<'a>(rule_ids: impl IntoIterator<Item = &'a str>) {
    for id in rule_ids {
        // absent when the rule never failed
        let _ = EVAL_ERRORS_TOTAL.remove_label_values(&[id]);
    }
}

#[inline]
pub fn inc_reload(result: &str) {
    RELOADS_TOTAL.with_label_values(&[result]).inc();
}

#[inline]
pub fn inc_rules_dropped(n: u64) {
    RULES_DROPPED_TOTAL.inc_by(n);
}

#[inline]
pub fn set_rules_active(n: usize) {
    RULES_ACTIVE.set(n as i64);
}
