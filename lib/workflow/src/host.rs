//! Instance registry for hosts that run many instances side by side.

use crate::instance::WorkflowInstance;
use std::collections::HashMap;
use waypoint_core::InstanceId;

/// Owns workflow instances by ID.
///
/// Instances are independent: completing one never touches another, so a
/// host may drive any number of them from one registry.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: HashMap<InstanceId, WorkflowInstance>,
}

impl InstanceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `instance`, returning its ID.
    pub fn insert(&mut self, instance: WorkflowInstance) -> InstanceId {
        let id = instance.id();
        self.instances.insert(id, instance);
        id
    }

    /// Returns the instance with `id`, if held.
    #[must_use]
    pub fn get(&self, id: InstanceId) -> Option<&WorkflowInstance> {
        self.instances.get(&id)
    }

    /// Returns the instance with `id` for completing its activities.
    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut WorkflowInstance> {
        self.instances.get_mut(&id)
    }

    /// Releases the instance with `id` back to the caller.
    pub fn remove(&mut self, id: InstanceId) -> Option<WorkflowInstance> {
        self.instances.remove(&id)
    }

    /// Returns the number of held instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns true if no instances are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Returns the IDs of all held instances, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<InstanceId> {
        let mut ids: Vec<_> = self.instances.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Drops every instance with no activity left to complete and returns
    /// their IDs, sorted.
    pub fn reap_terminal(&mut self) -> Vec<InstanceId> {
        let mut reaped: Vec<_> = self
            .instances
            .iter()
            .filter(|(_, instance)| instance.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        for id in &reaped {
            self.instances.remove(id);
        }
        reaped.sort();
        if !reaped.is_empty() {
            tracing::debug!(count = reaped.len(), "Reaped terminal instances");
        }
        reaped
    }
}
