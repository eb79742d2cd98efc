//! The workflow engine.
//!
//! A [`WorkflowInstance`] tracks one run through a definition. Drivers call
//! [`WorkflowInstance::complete`] for an active activity; the engine then:
//! 1. Resolves the activity's input from routes and the supplied record
//! 2. Runs the activity
//! 3. Records its output and removes it from the active set
//! 4. Takes the selected transitions, preparing each newly activated target
//! 5. Completes automatic targets from a FIFO work list
//!
//! All of this happens on a staged copy of the instance state. The copy
//! replaces the live state only when every step succeeded, so a failed call
//! leaves the instance untouched.

use crate::activity::{Activity, ActivityId, Preparation, PrepareContext};
use crate::config::EngineConfig;
use crate::definition::WorkflowDefinition;
use crate::error::{DefinitionError, RuntimeError};
use crate::execution::{ActiveSetChanged, ActivityData, ActivityOutput, ActivityStatus};
use crate::state::{InstanceSnapshot, InstanceState};
use crate::transition::Transition;
use serde_json::Value as JsonValue;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use waypoint_core::InstanceId;

/// One run of a workflow definition.
#[derive(Debug)]
pub struct WorkflowInstance {
    id: InstanceId,
    definition: Arc<WorkflowDefinition>,
    config: EngineConfig,
    state: InstanceState,
    notifier: broadcast::Sender<ActiveSetChanged>,
}

impl WorkflowInstance {
    pub(crate) fn new(definition: Arc<WorkflowDefinition>, config: EngineConfig) -> Self {
        let state = InstanceState::starting_at(definition.start().clone());
        Self::with_state(InstanceId::new(), definition, config, state)
    }

    fn with_state(
        id: InstanceId,
        definition: Arc<WorkflowDefinition>,
        config: EngineConfig,
        state: InstanceState,
    ) -> Self {
        let (notifier, _) = broadcast::channel(config.notification_capacity.max(1));
        Self {
            id,
            definition,
            config,
            state,
            notifier,
        }
    }

    /// Resumes an instance from a snapshot taken against `definition`.
    ///
    /// The restored instance keeps the ID recorded in the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition is invalid or the snapshot names an
    /// activity the definition does not contain.
    pub fn restore(
        definition: Arc<WorkflowDefinition>,
        snapshot: InstanceSnapshot,
        config: EngineConfig,
    ) -> Result<Self, DefinitionError> {
        definition.validate()?;

        let referenced = snapshot
            .active
            .iter()
            .chain(snapshot.history.iter().map(|d| &d.activity_id))
            .chain(snapshot.activity_state.keys());
        for id in referenced {
            definition.activity(id)?;
        }

        let id = snapshot.instance_id;
        let state = InstanceState::from_snapshot(snapshot);
        Ok(Self::with_state(id, definition, config, state))
    }

    /// Returns this instance's ID.
    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Returns the definition this instance runs.
    #[must_use]
    pub fn definition(&self) -> &Arc<WorkflowDefinition> {
        &self.definition
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the activities awaiting completion, in activation order.
    #[must_use]
    pub fn current_activities(&self) -> &[ActivityId] {
        self.state.active()
    }

    /// Returns the earliest activated activity still awaiting completion.
    #[must_use]
    pub fn next_activity(&self) -> Option<&ActivityId> {
        self.state.active().first()
    }

    /// Returns true if `id` is awaiting completion.
    #[must_use]
    pub fn is_active(&self, id: impl AsRef<str>) -> bool {
        self.state.is_active(id.as_ref())
    }

    /// Returns where `id` stands in this instance.
    #[must_use]
    pub fn status(&self, id: impl AsRef<str>) -> ActivityStatus {
        let id = id.as_ref();
        if self.state.is_active(id) {
            ActivityStatus::Active
        } else if self.state.data(id).is_some() {
            ActivityStatus::Completed
        } else {
            ActivityStatus::Pending
        }
    }

    /// Returns the latest output of each completed activity, most recent last.
    #[must_use]
    pub fn history(&self) -> &[ActivityData] {
        self.state.history()
    }

    /// Returns the latest recorded output of `id`.
    #[must_use]
    pub fn activity_data(&self, id: impl AsRef<str>) -> Option<&ActivityData> {
        self.state.data(id.as_ref())
    }

    /// Returns true once no activity is awaiting completion.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.active().is_empty()
    }

    /// Subscribes to active-set changes.
    ///
    /// One event is published per successful `complete` call that changed
    /// the active set.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ActiveSetChanged> {
        self.notifier.subscribe()
    }

    /// Captures the instance's state.
    #[must_use]
    pub fn snapshot(&self) -> InstanceSnapshot {
        self.state.to_snapshot(self.id)
    }

    /// Completes an active activity with optional external input.
    ///
    /// # Errors
    ///
    /// Returns an error if the activity is not active, its input cannot be
    /// resolved, it or an automatically completed successor fails, or the
    /// transitions it selects are invalid. The instance is unchanged on error.
    pub async fn complete(
        &mut self,
        activity_id: impl AsRef<str>,
        input: Option<JsonValue>,
    ) -> Result<ActivityOutput, RuntimeError> {
        self.complete_with_token(activity_id, input, &CancellationToken::new())
            .await
    }

    /// Like [`Self::complete`], forwarding `cancel` to every activity run
    /// during the call.
    ///
    /// # Errors
    ///
    /// See [`Self::complete`].
    pub async fn complete_with_token(
        &mut self,
        activity_id: impl AsRef<str>,
        input: Option<JsonValue>,
        cancel: &CancellationToken,
    ) -> Result<ActivityOutput, RuntimeError> {
        let activity_id = ActivityId::new(activity_id.as_ref());
        self.run_completion(activity_id, input, cancel).await
    }

    #[instrument(skip(self, activity_id, input, cancel), fields(instance = %self.id, activity = %activity_id))]
    async fn run_completion(
        &mut self,
        activity_id: ActivityId,
        input: Option<JsonValue>,
        cancel: &CancellationToken,
    ) -> Result<ActivityOutput, RuntimeError> {
        if !self.state.is_active(activity_id.as_str()) {
            return Err(RuntimeError::ActivityNotActive { activity_id });
        }

        let definition = Arc::clone(&self.definition);
        let mut staged = self.state.clone();
        let mut pending = VecDeque::new();

        let output = execute(
            &definition,
            &mut staged,
            &activity_id,
            input,
            cancel,
            &mut pending,
        )
        .await?;

        let limit = self.config.max_automatic_steps;
        let mut steps = 0;
        while let Some(next) = pending.pop_front() {
            steps += 1;
            if steps > limit {
                warn!(limit, "Automatic completions exceeded the step limit");
                return Err(RuntimeError::AutomaticStepLimit { limit });
            }
            debug!(activity = %next, "Completing automatic activity");
            execute(&definition, &mut staged, &next, None, cancel, &mut pending).await?;
        }

        let previous = std::mem::replace(&mut self.state, staged);
        self.publish_if_changed(&previous);
        Ok(output)
    }

    fn publish_if_changed(&self, previous: &InstanceState) {
        let before: HashSet<&ActivityId> = previous.active().iter().collect();
        let after: HashSet<&ActivityId> = self.state.active().iter().collect();
        if before == after {
            return;
        }

        debug!(
            instance = %self.id,
            previous = ?previous.active(),
            current = ?self.state.active(),
            "Active set changed"
        );
        if self.is_terminal() {
            info!(instance = %self.id, "Instance reached a terminal state");
        }

        // Sending only fails when nobody is subscribed.
        let _ = self.notifier.send(ActiveSetChanged {
            instance_id: self.id,
            previous: previous.active().to_vec(),
            current: self.state.active().to_vec(),
        });
    }
}

/// Runs one activity against the staged state and takes its transitions.
///
/// Targets that ask to be completed automatically are queued on `pending`.
async fn execute(
    definition: &WorkflowDefinition,
    staged: &mut InstanceState,
    activity_id: &ActivityId,
    input: Option<JsonValue>,
    cancel: &CancellationToken,
    pending: &mut VecDeque<ActivityId>,
) -> Result<ActivityOutput, RuntimeError> {
    let activity = definition.activity(activity_id)?;
    let input = resolve_input(activity, staged, input)?;

    let output = activity
        .complete(input, cancel)
        .await
        .map_err(|source| RuntimeError::ActivityExecution {
            activity_id: activity_id.clone(),
            source,
        })?;

    staged.deactivate(activity_id.as_str());
    if !output.successful {
        info!(activity = %activity_id, "Activity completed unsuccessfully");
        return Ok(output);
    }
    staged.record(ActivityData::new(activity_id.clone(), output.clone()));

    for transition in select_transitions(&output, activity, definition)? {
        activate(definition, staged, transition, pending).await?;
    }

    Ok(output)
}

fn select_transitions<'d>(
    output: &ActivityOutput,
    activity: &dyn Activity,
    definition: &'d WorkflowDefinition,
) -> Result<Vec<&'d Transition>, RuntimeError> {
    match output.next_transitions(activity, definition)? {
        Some(transitions) => Ok(transitions),
        None => definition.default_transitions(activity),
    }
}

async fn activate(
    definition: &WorkflowDefinition,
    staged: &mut InstanceState,
    transition: &Transition,
    pending: &mut VecDeque<ActivityId>,
) -> Result<(), RuntimeError> {
    let target_id = &transition.to;
    if !staged.activate(target_id.clone()) {
        if pending.contains(target_id) {
            warn!(
                activity = %target_id,
                arrived_from = %transition.from,
                "Target already queued for automatic completion, arrival not prepared"
            );
        } else {
            debug!(activity = %target_id, "Target already active");
        }
        return Ok(());
    }

    let target = definition.activity(target_id)?;
    let input = resolve_input(target, staged, None)?;

    let mut slot = staged.take_activity_state(target_id.as_str());
    let preparation = {
        let mut ctx = PrepareContext::new(definition, target_id, &transition.from, &mut slot);
        target.prepare(&input, &mut ctx).await
    };
    staged.put_activity_state(target_id.clone(), slot);

    match preparation.map_err(|source| RuntimeError::ActivityExecution {
        activity_id: target_id.clone(),
        source,
    })? {
        Preparation::AwaitCompletion => {}
        Preparation::AutoComplete => pending.push_back(target_id.clone()),
        Preparation::Hold => {
            debug!(activity = %target_id, arrived_from = %transition.from, "Activity holding");
            staged.deactivate(target_id.as_str());
        }
    }
    Ok(())
}

/// Builds an activity's input record.
///
/// Routed fields override fields of the supplied record. A routed field the
/// source did not produce resolves to `null`.
fn resolve_input(
    activity: &dyn Activity,
    state: &InstanceState,
    supplied: Option<JsonValue>,
) -> Result<JsonValue, RuntimeError> {
    let mut fields = match supplied {
        None | Some(JsonValue::Null) => serde_json::Map::new(),
        Some(JsonValue::Object(fields)) => fields,
        Some(other) => {
            return Err(RuntimeError::InvalidInput {
                activity_id: activity.id().clone(),
                reason: format!("expected a JSON object, got {other}"),
            });
        }
    };

    for route in activity.routes() {
        let data = state.data(route.output_activity.as_str()).ok_or_else(|| {
            RuntimeError::RouteDataMissing {
                activity_id: activity.id().clone(),
                output_activity: route.output_activity.clone(),
            }
        })?;
        let value = data
            .output
            .field(&route.output_field)
            .cloned()
            .unwrap_or(JsonValue::Null);
        fields.insert(route.input_field.clone(), value);
    }

    Ok(JsonValue::Object(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityNode;
    use crate::builtin::{Automatic, Empty};
    use crate::transition::Transition;
    use serde_json::json;

    fn chain(ids: &[&str]) -> Arc<WorkflowDefinition> {
        let mut definition = WorkflowDefinition::new(ids[0]);
        for id in ids {
            definition
                .add_activity(ActivityNode::new(*id, Empty::default()))
                .expect("add");
        }
        for pair in ids.windows(2) {
            definition.add_transition(Transition::new(pair[0], pair[1]));
        }
        Arc::new(definition)
    }

    #[tokio::test]
    async fn complete_advances_along_chain() {
        let definition = chain(&["a", "b"]);
        let mut instance = definition.create_instance().expect("instance");

        assert_eq!(instance.status("a"), ActivityStatus::Active);
        assert_eq!(instance.status("b"), ActivityStatus::Pending);

        instance.complete("a", None).await.expect("complete a");
        assert_eq!(instance.current_activities(), &[ActivityId::new("b")]);
        assert_eq!(instance.status("a"), ActivityStatus::Completed);

        instance.complete("b", None).await.expect("complete b");
        assert!(instance.is_terminal());
        assert!(instance.next_activity().is_none());
    }

    #[tokio::test]
    async fn inactive_activity_rejected() {
        let definition = chain(&["a", "b"]);
        let mut instance = definition.create_instance().expect("instance");
        let err = instance.complete("b", None).await.unwrap_err();
        assert_eq!(
            err,
            RuntimeError::ActivityNotActive {
                activity_id: ActivityId::new("b")
            }
        );
        assert_eq!(instance.current_activities(), &[ActivityId::new("a")]);
    }

    #[tokio::test]
    async fn non_object_input_rejected() {
        let definition = chain(&["a"]);
        let mut instance = definition.create_instance().expect("instance");
        let err = instance.complete("a", Some(json!(5))).await.unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidInput { .. }));
        assert!(instance.is_active("a"));
    }

    #[tokio::test]
    async fn automatic_targets_complete_in_same_call() {
        let mut definition = WorkflowDefinition::new("a");
        definition
            .add_activity(ActivityNode::new("a", Empty::default()))
            .expect("add a");
        definition
            .add_activity(ActivityNode::new("auto", Automatic::default()))
            .expect("add auto");
        definition
            .add_activity(ActivityNode::new("c", Empty::default()))
            .expect("add c");
        definition.add_transition(Transition::new("a", "auto"));
        definition.add_transition(Transition::new("auto", "c"));
        let mut instance = Arc::new(definition).create_instance().expect("instance");

        instance.complete("a", None).await.expect("complete a");
        assert_eq!(instance.current_activities(), &[ActivityId::new("c")]);
        assert_eq!(instance.status("auto"), ActivityStatus::Completed);
    }

    #[tokio::test]
    async fn subscribers_see_each_change() {
        let definition = chain(&["a", "b"]);
        let mut instance = definition.create_instance().expect("instance");
        let mut events = instance.subscribe();

        instance.complete("a", None).await.expect("complete a");
        let event = events.try_recv().expect("event");
        assert_eq!(event.instance_id, instance.id());
        assert_eq!(event.previous, vec![ActivityId::new("a")]);
        assert_eq!(event.current, vec![ActivityId::new("b")]);

        instance.complete("b", None).await.expect("complete b");
        assert!(events.try_recv().expect("terminal event").is_terminal());
    }

    #[tokio::test]
    async fn snapshot_restores_position() {
        let definition = chain(&["a", "b", "c"]);
        let mut instance = definition.create_instance().expect("instance");
        instance.complete("a", None).await.expect("complete a");

        let snapshot = instance.snapshot();
        let mut restored =
            WorkflowInstance::restore(Arc::clone(&definition), snapshot, EngineConfig::default())
                .expect("restore");
        assert_eq!(restored.id(), instance.id());
        assert_eq!(restored.current_activities(), instance.current_activities());
        assert_eq!(restored.history(), instance.history());

        restored.complete("b", None).await.expect("complete b");
        assert_eq!(restored.current_activities(), &[ActivityId::new("c")]);
    }

    #[test]
    fn restore_rejects_unknown_activity() {
        let definition = chain(&["a"]);
        let snapshot = InstanceSnapshot {
            instance_id: InstanceId::new(),
            active: vec![ActivityId::new("ghost")],
            history: Vec::new(),
            activity_state: Default::default(),
        };
        let err = WorkflowInstance::restore(definition, snapshot, EngineConfig::default())
            .unwrap_err();
        assert!(matches!(err, DefinitionError::ActivityNotFound { .. }));
    }
}
