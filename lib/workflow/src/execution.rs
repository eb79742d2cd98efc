//! Execution data: activity outputs, history entries and notifications.

use crate::activity::{Activity, ActivityId};
use crate::definition::WorkflowDefinition;
use crate::error::RuntimeError;
use crate::transition::Transition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use waypoint_core::InstanceId;

/// The untyped result of completing an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityOutput {
    /// Whether the activity succeeded. A failed activity is a dead end.
    pub successful: bool,
    /// Condition label selecting the outbound transitions to take.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// The encoded output record.
    #[serde(default)]
    pub data: JsonValue,
}

impl ActivityOutput {
    /// Creates a successful output.
    #[must_use]
    pub fn success(data: JsonValue) -> Self {
        Self {
            successful: true,
            condition: None,
            data,
        }
    }

    /// Creates a failed output.
    #[must_use]
    pub fn failure(data: JsonValue) -> Self {
        Self {
            successful: false,
            condition: None,
            data,
        }
    }

    /// Sets the condition label.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Returns one field of the output record.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        self.data.get(name)
    }

    /// Resolves the transitions selected by this output's condition.
    ///
    /// Returns `None` when no condition is set, deferring to the activity's
    /// unconditional transitions.
    ///
    /// # Errors
    ///
    /// - `NoMatchingTransition` if no outbound transition carries the condition
    /// - `AmbiguousFork` if several match and `activity` is not a fork
    pub fn next_transitions<'d>(
        &self,
        activity: &dyn Activity,
        definition: &'d WorkflowDefinition,
    ) -> Result<Option<Vec<&'d Transition>>, RuntimeError> {
        let Some(condition) = self.condition.as_deref() else {
            return Ok(None);
        };

        let selected: Vec<_> = definition
            .outbound_transitions(activity.id())
            .into_iter()
            .filter(|t| t.matches(condition))
            .collect();

        if selected.is_empty() {
            return Err(RuntimeError::NoMatchingTransition {
                activity_id: activity.id().clone(),
                condition: condition.to_string(),
            });
        }
        if selected.len() > 1 && !activity.is_fork() {
            return Err(RuntimeError::AmbiguousFork {
                activity_id: activity.id().clone(),
                targets: selected.iter().map(|t| t.to.clone()).collect(),
            });
        }

        Ok(Some(selected))
    }
}

/// A typed activity result, encoded into an [`ActivityOutput`] by the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion<O> {
    /// Whether the activity succeeded.
    pub successful: bool,
    /// Condition label selecting the outbound transitions to take.
    pub condition: Option<String>,
    /// The output record.
    pub output: O,
}

impl<O> Completion<O> {
    /// Creates a successful completion.
    #[must_use]
    pub fn success(output: O) -> Self {
        Self {
            successful: true,
            condition: None,
            output,
        }
    }

    /// Creates a failed completion.
    #[must_use]
    pub fn failure(output: O) -> Self {
        Self {
            successful: false,
            condition: None,
            output,
        }
    }

    /// Sets the condition label.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// The recorded output of a completed activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityData {
    /// The activity that produced the output.
    pub activity_id: ActivityId,
    /// What it produced.
    pub output: ActivityOutput,
    /// When it completed.
    pub completed_at: DateTime<Utc>,
}

impl ActivityData {
    /// Records an output completed now.
    #[must_use]
    pub fn new(activity_id: ActivityId, output: ActivityOutput) -> Self {
        Self {
            activity_id,
            output,
            completed_at: Utc::now(),
        }
    }
}

/// Where an activity stands within one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    /// Not reached yet.
    Pending,
    /// Awaiting an external completion.
    Active,
    /// Completed at least once and not active again.
    Completed,
}

/// Published whenever an instance's active set changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSetChanged {
    /// The instance whose active set changed.
    pub instance_id: InstanceId,
    /// The active set before the change.
    pub previous: Vec<ActivityId>,
    /// The active set after the change.
    pub current: Vec<ActivityId>,
}

impl ActiveSetChanged {
    /// Returns true if the instance has no active activities left.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.current.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_builders() {
        let output = ActivityOutput::success(json!({ "total": 42 })).with_condition("approved");
        assert!(output.successful);
        assert_eq!(output.condition.as_deref(), Some("approved"));
        assert_eq!(output.field("total"), Some(&json!(42)));
        assert!(output.field("missing").is_none());

        let failed = ActivityOutput::failure(JsonValue::Null);
        assert!(!failed.successful);
    }

    #[test]
    fn completion_builders() {
        let completion = Completion::failure(7).with_condition("retry");
        assert!(!completion.successful);
        assert_eq!(completion.condition.as_deref(), Some("retry"));
        assert_eq!(completion.output, 7);
    }

    #[test]
    fn activity_data_serde_roundtrip() {
        let data = ActivityData::new(
            ActivityId::new("y"),
            ActivityOutput::success(json!({ "total": 42 })),
        );
        let json = serde_json::to_string(&data).expect("serialize");
        let parsed: ActivityData = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(data, parsed);
    }

    #[test]
    fn output_without_condition_omits_field() {
        let json = serde_json::to_value(ActivityOutput::success(json!({}))).expect("serialize");
        assert!(json.get("condition").is_none());
    }

    #[test]
    fn active_set_changed_terminal() {
        let event = ActiveSetChanged {
            instance_id: InstanceId::new(),
            previous: vec![ActivityId::new("end")],
            current: vec![],
        };
        assert!(event.is_terminal());
    }
}
