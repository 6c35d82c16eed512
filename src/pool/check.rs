//! Status-code classification
//!
//! A small rule engine deciding what to do with a fetched response: drop
//! the node for this workload, retry it later, or keep going.

use serde::{Deserialize, Serialize};

/// Verdict for one fetched response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageCheck {
    /// Give up on this node for the current evaluation
    Skip,
    /// The node failed but is worth trying again later
    Repeat,
    /// Check passed, continue with the remaining logic
    Success,
}

impl PageCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageCheck::Skip => "skip",
            PageCheck::Repeat => "repeat",
            PageCheck::Success => "success",
        }
    }
}

impl std::fmt::Display for PageCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Comparison applied between the observed status and a rule's codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOp {
    Equal,
    GreaterThan,
    LessThan,
}

impl RuleOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleOp::Equal => "==",
            RuleOp::GreaterThan => ">",
            RuleOp::LessThan => "<",
        }
    }
}

impl std::fmt::Display for RuleOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One classification rule; rules are evaluated in declaration order and
/// the first match wins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRule {
    pub codes: Vec<u16>,
    pub op: RuleOp,
    pub outcome: PageCheck,
    /// Whether a match should put the node on cooldown
    #[serde(default)]
    pub penalize: bool,
}

impl StatusRule {
    fn matches(&self, status: u16) -> bool {
        match self.op {
            RuleOp::Equal => self.codes.iter().any(|&code| status == code),
            RuleOp::GreaterThan => self.codes.iter().any(|&code| status > code),
            RuleOp::LessThan => self.codes.iter().any(|&code| status < code),
        }
    }
}

/// Classify an observed response against an ordered rule list
///
/// `None` stands for "no response event was seen": without one the page
/// body and elements cannot be read at all, so the node must be retried,
/// but the absence is most often a transport artifact, never a penalty.
/// No matching rule means the response is acceptable.
pub fn classify(status: Option<u16>, rules: &[StatusRule]) -> (PageCheck, bool) {
    let status = match status {
        Some(code) => code,
        None => return (PageCheck::Repeat, false),
    };

    for rule in rules {
        if rule.matches(status) {
            return (rule.outcome, rule.penalize);
        }
    }

    (PageCheck::Success, false)
}

/// The rule set verification sweeps run with: hard 404s and server errors
/// disqualify a node outright, a 403 means the node tripped bot detection
/// and deserves a cooldown before retrying.
pub fn default_filter_rules() -> Vec<StatusRule> {
    vec![
        StatusRule {
            codes: vec![404],
            op: RuleOp::Equal,
            outcome: PageCheck::Skip,
            penalize: false,
        },
        StatusRule {
            codes: vec![499],
            op: RuleOp::GreaterThan,
            outcome: PageCheck::Skip,
            penalize: false,
        },
        StatusRule {
            codes: vec![403],
            op: RuleOp::Equal,
            outcome: PageCheck::Repeat,
            penalize: true,
        },
    ]
}
