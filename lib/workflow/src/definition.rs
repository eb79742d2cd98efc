//! Workflow definitions.
//!
//! A definition is the immutable graph shared by every instance created from
//! it:
//! - a designated start activity
//! - activities, looked up by ID
//! - transitions, kept in insertion order
//!
//! Definitions are built mutably, validated once, and then frozen behind an
//! `Arc` by [`WorkflowDefinition::create_instance`].

use crate::activity::{Activity, ActivityId};
use crate::config::EngineConfig;
use crate::error::{DefinitionError, RuntimeError};
use crate::graph::TransitionGraph;
use crate::instance::WorkflowInstance;
use crate::port::PortDirection;
use crate::transition::Transition;
use std::collections::HashMap;
use std::sync::Arc;

/// A directed graph of activities connected by transitions.
#[derive(Debug)]
pub struct WorkflowDefinition {
    start: ActivityId,
    activities: Vec<Arc<dyn Activity>>,
    index: HashMap<ActivityId, usize>,
    transitions: Vec<Transition>,
}

impl WorkflowDefinition {
    /// Creates an empty definition that will start at `start`.
    #[must_use]
    pub fn new(start: impl Into<ActivityId>) -> Self {
        Self {
            start: start.into(),
            activities: Vec::new(),
            index: HashMap::new(),
            transitions: Vec::new(),
        }
    }

    /// Returns the start activity's ID.
    #[must_use]
    pub fn start(&self) -> &ActivityId {
        &self.start
    }

    /// Adds an activity.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateActivity` if an activity with the same ID exists.
    pub fn add_activity<A: Activity + 'static>(&mut self, activity: A) -> Result<(), DefinitionError> {
        self.add_shared_activity(Arc::new(activity))
    }

    /// Adds an already shared activity.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateActivity` if an activity with the same ID exists.
    pub fn add_shared_activity(&mut self, activity: Arc<dyn Activity>) -> Result<(), DefinitionError> {
        let id = activity.id().clone();
        if self.index.contains_key(&id) {
            return Err(DefinitionError::DuplicateActivity { activity_id: id });
        }
        self.index.insert(id, self.activities.len());
        self.activities.push(activity);
        Ok(())
    }

    /// Adds a transition. Endpoints are checked by [`Self::validate`].
    pub fn add_transition(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    /// Looks up an activity by ID.
    ///
    /// # Errors
    ///
    /// Returns `ActivityNotFound` if no activity has this ID.
    pub fn activity(&self, id: impl AsRef<str>) -> Result<&dyn Activity, DefinitionError> {
        let id = id.as_ref();
        self.index
            .get(id)
            .and_then(|&i| self.activities.get(i))
            .map(|activity| &**activity)
            .ok_or_else(|| DefinitionError::ActivityNotFound {
                activity_id: ActivityId::new(id),
            })
    }

    /// Returns true if the definition contains an activity with this ID.
    #[must_use]
    pub fn contains(&self, id: impl AsRef<str>) -> bool {
        self.index.contains_key(id.as_ref())
    }

    /// Returns all activities in insertion order.
    pub fn activities(&self) -> impl Iterator<Item = &dyn Activity> {
        self.activities.iter().map(|activity| &**activity)
    }

    /// Returns the number of activities.
    #[must_use]
    pub fn activity_count(&self) -> usize {
        self.activities.len()
    }

    /// Returns all transitions in insertion order.
    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Returns the transitions leaving `id`, in insertion order.
    #[must_use]
    pub fn outbound_transitions(&self, id: impl AsRef<str>) -> Vec<&Transition> {
        let id = id.as_ref();
        self.transitions
            .iter()
            .filter(|t| t.from.as_str() == id)
            .collect()
    }

    /// Returns the transitions entering `id`, in insertion order.
    #[must_use]
    pub fn inbound_transitions(&self, id: impl AsRef<str>) -> Vec<&Transition> {
        let id = id.as_ref();
        self.transitions
            .iter()
            .filter(|t| t.to.as_str() == id)
            .collect()
    }

    /// Returns the transitions taken when `activity` completes without a
    /// condition.
    ///
    /// # Errors
    ///
    /// - `ConditionalDefaultTransition` if any outbound transition is conditional
    /// - `AmbiguousFork` if several are unconditional and `activity` is not a fork
    pub fn default_transitions(
        &self,
        activity: &dyn Activity,
    ) -> Result<Vec<&Transition>, RuntimeError> {
        let outbound = self.outbound_transitions(activity.id());
        if outbound.iter().any(|t| !t.is_unconditional()) {
            return Err(RuntimeError::ConditionalDefaultTransition {
                activity_id: activity.id().clone(),
            });
        }
        if outbound.len() > 1 && !activity.is_fork() {
            return Err(RuntimeError::AmbiguousFork {
                activity_id: activity.id().clone(),
                targets: outbound.iter().map(|t| t.to.clone()).collect(),
            });
        }
        Ok(outbound)
    }

    /// Builds the reachability graph of this definition.
    #[must_use]
    pub fn graph(&self) -> TransitionGraph {
        TransitionGraph::from_definition(self)
    }

    /// Validates the definition.
    ///
    /// Unreachable activities are allowed but logged.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The start activity doesn't exist
    /// - A transition references an unknown activity
    /// - A route reads from an unknown activity or port
    /// - A route connects ports of different types
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if !self.contains(&self.start) {
            return Err(DefinitionError::StartActivityNotFound {
                activity_id: self.start.clone(),
            });
        }

        for transition in &self.transitions {
            for endpoint in [&transition.from, &transition.to] {
                if !self.contains(endpoint) {
                    return Err(DefinitionError::TransitionActivityNotFound {
                        from: transition.from.clone(),
                        to: transition.to.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
        }

        for activity in &self.activities {
            self.validate_routes(&**activity)?;
        }

        let unreachable = self.graph().unreachable_from(&self.start);
        if !unreachable.is_empty() {
            tracing::warn!(
                start = %self.start,
                unreachable = ?unreachable,
                "Definition contains activities unreachable from the start activity"
            );
        }

        Ok(())
    }

    fn validate_routes(&self, activity: &dyn Activity) -> Result<(), DefinitionError> {
        for route in activity.routes() {
            let source = self.activity(&route.output_activity).map_err(|_| {
                DefinitionError::RouteActivityNotFound {
                    activity_id: activity.id().clone(),
                    output_activity: route.output_activity.clone(),
                }
            })?;

            let output_type = source.output_ports().get(&route.output_field).ok_or_else(|| {
                DefinitionError::RoutePropertyNotFound {
                    activity_id: source.id().clone(),
                    direction: PortDirection::Output,
                    property: route.output_field.clone(),
                }
            })?;

            let input_type = activity.input_ports().get(&route.input_field).ok_or_else(|| {
                DefinitionError::RoutePropertyNotFound {
                    activity_id: activity.id().clone(),
                    direction: PortDirection::Input,
                    property: route.input_field.clone(),
                }
            })?;

            if !output_type.matches(input_type) {
                return Err(DefinitionError::RouteTypeMismatch {
                    output_activity: route.output_activity.clone(),
                    output_field: route.output_field.clone(),
                    output_type: output_type.to_string(),
                    activity_id: activity.id().clone(),
                    input_field: route.input_field.clone(),
                    input_type: input_type.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Validates the definition and creates an instance positioned at the
    /// start activity, using the default engine configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn create_instance(self: &Arc<Self>) -> Result<WorkflowInstance, DefinitionError> {
        self.create_instance_with(EngineConfig::default())
    }

    /// Validates the definition and creates an instance with `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn create_instance_with(
        self: &Arc<Self>,
        config: EngineConfig,
    ) -> Result<WorkflowInstance, DefinitionError> {
        self.validate()?;
        Ok(WorkflowInstance::new(Arc::clone(self), config))
    }
}
