//! Prerequisite evaluation results.

use super::node::Prerequisite;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A satisfied prerequisite and how many times it was satisfied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessEntry {
    pub prereq: Prerequisite,
    pub count: usize,
}

/// An unmet prerequisite. `fail: false` entries are informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub fail: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FailureEntry>,
}

impl FailureEntry {
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail: true,
            message: message.into(),
            children: Vec::new(),
        }
    }

    pub fn informational(message: impl Into<String>) -> Self {
        Self {
            fail: false,
            message: message.into(),
            children: Vec::new(),
        }
    }

    pub fn wrapping(message: impl Into<String>, children: Vec<FailureEntry>) -> Self {
        Self {
            fail: children.iter().any(|c| c.fail),
            message: message.into(),
            children,
        }
    }
}

/// The outcome of `meets_prerequisites`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteResult {
    pub does_fail: bool,
    pub success_list: Vec<SuccessEntry>,
    pub failure_list: Vec<FailureEntry>,
}

impl PrerequisiteResult {
    /// A passing result with nothing to report.
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::from_outcome(Outcome {
            successes: Vec::new(),
            failures: vec![FailureEntry::failing(message)],
        })
    }

    pub fn passes(&self) -> bool {
        !self.does_fail
    }

    pub(crate) fn from_outcome(outcome: Outcome) -> Self {
        Self {
            does_fail: outcome.fails(),
            success_list: outcome.successes,
            failure_list: outcome.failures,
        }
    }

    /// Every failure message, depth first, indented by nesting.
    pub fn failure_messages(&self) -> Vec<String> {
        fn walk(entries: &[FailureEntry], depth: usize, out: &mut Vec<String>) {
            for entry in entries {
                out.push(format!("{}{}", "  ".repeat(depth), entry.message));
                walk(&entry.children, depth + 1, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.failure_list, 0, &mut out);
        out
    }
}

/// Success and failure lists of one node while the tree is evaluated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub(crate) successes: Vec<SuccessEntry>,
    pub(crate) failures: Vec<FailureEntry>,
}

impl Outcome {
    pub(crate) fn success(prereq: &Prerequisite, count: usize) -> Self {
        Self {
            successes: vec![SuccessEntry {
                prereq: prereq.clone(),
                count,
            }],
            failures: Vec::new(),
        }
    }

    pub(crate) fn failure(message: impl Into<String>) -> Self {
        Self {
            successes: Vec::new(),
            failures: vec![FailureEntry::failing(message)],
        }
    }

    pub(crate) fn fails(&self) -> bool {
        self.failures.iter().any(|f| f.fail)
    }

    pub(crate) fn success_count(&self) -> usize {
        self.successes.iter().map(|s| s.count).sum()
    }
}

/// Errors raised by individual leaf checks. They are logged and fail closed.
#[derive(Debug, Error)]
pub enum PrerequisiteError {
    #[error("Malformed {kind} requirement '{requirement}': {reason}")]
    Malformed {
        kind: String,
        requirement: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_does_fail_tracks_failing_entries() {
        let informational = PrerequisiteResult::from_outcome(Outcome {
            successes: Vec::new(),
            failures: vec![FailureEntry::informational("may qualify")],
        });
        assert!(!informational.does_fail);
        assert!(PrerequisiteResult::fail("nope").does_fail);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(PrerequisiteResult::fail("nope")).unwrap();
        assert_eq!(json["doesFail"], true);
        assert_eq!(json["failureList"][0]["message"], "nope");
        assert!(json["failureList"][0].get("children").is_none());
    }

    #[test]
    fn test_failure_messages_nest() {
        let result = PrerequisiteResult::from_outcome(Outcome {
            successes: Vec::new(),
            failures: vec![FailureEntry::wrapping(
                "all of:",
                vec![FailureEntry::failing("Feat: A"), FailureEntry::failing("Feat: B")],
            )],
        });
        assert_eq!(
            result.failure_messages(),
            vec!["all of:", "  Feat: A", "  Feat: B"]
        );
    }
}
