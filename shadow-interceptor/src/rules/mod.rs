pub mod compiler;
pub mod matcher;
pub mod rule;

pub use compiler::{DroppedRule, RuleSet};
pub use rule::{MatchMode, MatcherKind, PayloadMatcher, Rule};
