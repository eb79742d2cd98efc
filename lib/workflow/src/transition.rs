//! Transitions: the control-flow edges of a workflow graph.

use crate::activity::ActivityId;
use serde::{Deserialize, Serialize};

/// A directed edge between two activities.
///
/// A transition without a condition is the default path out of its source.
/// A conditional transition is only taken when the source completes with a
/// matching condition label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    /// The source activity.
    pub from: ActivityId,
    /// The target activity.
    pub to: ActivityId,
    /// Condition label guarding this transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Transition {
    /// Creates an unconditional transition.
    #[must_use]
    pub fn new(from: impl Into<ActivityId>, to: impl Into<ActivityId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    /// Creates a transition taken only on the given condition.
    #[must_use]
    pub fn when(
        from: impl Into<ActivityId>,
        to: impl Into<ActivityId>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: Some(condition.into()),
        }
    }

    /// Returns true if this transition has no condition.
    #[must_use]
    pub fn is_unconditional(&self) -> bool {
        self.condition.is_none()
    }

    /// Returns true if this transition is guarded by `condition`.
    #[must_use]
    pub fn matches(&self, condition: &str) -> bool {
        self.condition.as_deref() == Some(condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconditional_transition() {
        let transition = Transition::new("a", "b");
        assert!(transition.is_unconditional());
        assert!(!transition.matches("anything"));
    }

    #[test]
    fn conditional_transition_matches_label() {
        let transition = Transition::when("fork", "a", "branch");
        assert!(!transition.is_unconditional());
        assert!(transition.matches("branch"));
        assert!(!transition.matches("other"));
    }

    #[test]
    fn condition_omitted_from_json_when_absent() {
        let json = serde_json::to_value(Transition::new("a", "b")).expect("serialize");
        assert!(json.get("condition").is_none());

        let parsed: Transition =
            serde_json::from_str(r#"{"from":"a","to":"b"}"#).expect("deserialize");
        assert_eq!(parsed, Transition::new("a", "b"));
    }
}
