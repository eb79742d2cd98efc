//! Mutable state of one workflow instance.
//!
//! - `InstanceState`: what the engine mutates, staged and swapped in whole
//! - `InstanceSnapshot`: its serializable form, for persistence and restore

use crate::activity::ActivityId;
use crate::envelope::Envelope;
use crate::error::DocumentError;
use crate::execution::ActivityData;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use waypoint_core::InstanceId;

/// Active set, history and per-activity data of an instance.
///
/// The active set keeps activation order and never holds an ID twice. The
/// history holds at most one entry per activity, ordered by most recent
/// completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct InstanceState {
    active: Vec<ActivityId>,
    history: Vec<ActivityData>,
    activity_state: BTreeMap<ActivityId, JsonValue>,
}

impl InstanceState {
    pub(crate) fn starting_at(start: ActivityId) -> Self {
        Self {
            active: vec![start],
            ..Self::default()
        }
    }

    pub(crate) fn active(&self) -> &[ActivityId] {
        &self.active
    }

    pub(crate) fn is_active(&self, id: &str) -> bool {
        self.active.iter().any(|a| a.as_str() == id)
    }

    /// Returns false if `id` was already active.
    pub(crate) fn activate(&mut self, id: ActivityId) -> bool {
        if self.is_active(id.as_str()) {
            return false;
        }
        self.active.push(id);
        true
    }

    pub(crate) fn deactivate(&mut self, id: &str) {
        self.active.retain(|a| a.as_str() != id);
    }

    pub(crate) fn history(&self) -> &[ActivityData] {
        &self.history
    }

    pub(crate) fn data(&self, id: &str) -> Option<&ActivityData> {
        self.history.iter().find(|d| d.activity_id.as_str() == id)
    }

    /// Replaces any earlier entry for the same activity and appends.
    pub(crate) fn record(&mut self, data: ActivityData) {
        self.history.retain(|d| d.activity_id != data.activity_id);
        self.history.push(data);
    }

    pub(crate) fn take_activity_state(&mut self, id: &str) -> Option<JsonValue> {
        self.activity_state.remove(id)
    }

    pub(crate) fn put_activity_state(&mut self, id: ActivityId, value: Option<JsonValue>) {
        match value {
            Some(value) => {
                self.activity_state.insert(id, value);
            }
            None => {
                self.activity_state.remove(&id);
            }
        }
    }

    pub(crate) fn to_snapshot(&self, instance_id: InstanceId) -> InstanceSnapshot {
        InstanceSnapshot {
            instance_id,
            active: self.active.clone(),
            history: self.history.clone(),
            activity_state: self.activity_state.clone(),
        }
    }

    /// Rebuilds state from a snapshot, dropping duplicate IDs.
    pub(crate) fn from_snapshot(snapshot: InstanceSnapshot) -> Self {
        let mut state = Self {
            activity_state: snapshot.activity_state,
            ..Self::default()
        };
        for id in snapshot.active {
            state.activate(id);
        }
        for data in snapshot.history {
            state.record(data);
        }
        state
    }
}

/// Serializable state of an instance.
///
/// A snapshot restored against the same definition resumes exactly where
/// the instance left off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    /// The instance this state belongs to, kept across restores.
    pub instance_id: InstanceId,
    /// Activities awaiting completion, in activation order.
    pub active: Vec<ActivityId>,
    /// Latest output of each completed activity.
    #[serde(default)]
    pub history: Vec<ActivityData>,
    /// Data activities keep between activations, such as join arrivals.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub activity_state: BTreeMap<ActivityId, JsonValue>,
}

impl InstanceSnapshot {
    /// Serializes the snapshot inside a versioned envelope.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if encoding fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, DocumentError> {
        Envelope::new(self).to_json_bytes()
    }

    /// Parses a snapshot written by [`Self::to_json_bytes`].
    ///
    /// # Errors
    ///
    /// Returns `Malformed` or `UnsupportedVersion`.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        Ok(Envelope::<Self>::from_json_bytes(bytes)?.into_payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ActivityOutput;
    use serde_json::json;

    fn data(id: &str, value: i64) -> ActivityData {
        ActivityData::new(
            ActivityId::new(id),
            ActivityOutput::success(json!({ "value": value })),
        )
    }

    #[test]
    fn activate_is_idempotent() {
        let mut state = InstanceState::starting_at(ActivityId::new("a"));
        assert!(!state.activate(ActivityId::new("a")));
        assert!(state.activate(ActivityId::new("b")));
        assert_eq!(state.active(), &[ActivityId::new("a"), ActivityId::new("b")]);

        state.deactivate("a");
        assert_eq!(state.active(), &[ActivityId::new("b")]);
    }

    #[test]
    fn record_replaces_and_moves_to_end() {
        let mut state = InstanceState::default();
        state.record(data("a", 1));
        state.record(data("b", 2));
        state.record(data("a", 3));

        let order: Vec<_> = state.history().iter().map(|d| d.activity_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
        assert_eq!(
            state.data("a").and_then(|d| d.output.field("value")),
            Some(&json!(3))
        );
    }

    #[test]
    fn activity_state_take_and_put() {
        let mut state = InstanceState::default();
        state.put_activity_state(ActivityId::new("join"), Some(json!(["a"])));
        assert_eq!(state.take_activity_state("join"), Some(json!(["a"])));
        assert_eq!(state.take_activity_state("join"), None);

        state.put_activity_state(ActivityId::new("join"), Some(json!(["a"])));
        state.put_activity_state(ActivityId::new("join"), None);
        assert_eq!(state.take_activity_state("join"), None);
    }

    #[test]
    fn snapshot_bytes_roundtrip() {
        let mut state = InstanceState::starting_at(ActivityId::new("b"));
        state.record(data("a", 1));
        state.put_activity_state(ActivityId::new("join"), Some(json!(["a"])));

        let snapshot = state.to_snapshot(InstanceId::new());
        let bytes = snapshot.to_json_bytes().expect("serialize");
        let parsed = InstanceSnapshot::from_json_bytes(&bytes).expect("deserialize");
        assert_eq!(parsed, snapshot);
        assert_eq!(InstanceState::from_snapshot(parsed), state);
    }

    #[test]
    fn from_snapshot_drops_duplicates() {
        let snapshot = InstanceSnapshot {
            instance_id: InstanceId::new(),
            active: vec![ActivityId::new("a"), ActivityId::new("a")],
            history: vec![data("x", 1), data("x", 2)],
            activity_state: BTreeMap::new(),
        };
        let state = InstanceState::from_snapshot(snapshot);
        assert_eq!(state.active().len(), 1);
        assert_eq!(state.history().len(), 1);
    }
}
