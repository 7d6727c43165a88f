use crate::rules::Rule;

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// No rule applies; the real call proceeds untouched.
    Passthrough,

    /// `rule` applies; the caller gets a synthetic response.
    Mock { rule: Rule },
}

impl Decision {
    pub fn passthrough() -> Self {
        Self::Passthrough
    }

    pub fn mock(rule: Rule) -> Self {
        Self::Mock { rule }
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, Decision::Mock { .. })
    }

    pub fn rule(&self) -> Option<&Rule> {
        match self {
            Decision::Passthrough => None,
            Decision::Mock { rule } => Some(rule),
        }
    }
}

/// How one intercepted call ended, for logs and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Mock,
    Passthrough,
    /// Matched, synthesis failed, real call used instead.
    Fallback,
    /// Matched, synthesis failed, call failed.
    Rejected,
    /// Matched, synthesis failed, synthetic 500 delivered.
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Mock => "mock",
            Outcome::Passthrough => "passthrough",
            Outcome::Fallback => "fallback",
            Outcome::Rejected => "rejected",
            Outcome::Error => "error",
        }
    }
}

/// What to do when a rule matched but no response could be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisFailurePolicy {
    /// Use the real network as if nothing matched.
    #[default]
    Passthrough,
    /// Fail the call.
    Reject,
}
