//! Transition graph analysis using petgraph.
//!
//! The engine itself walks transitions directly on the definition. This
//! module builds a petgraph view of the same graph for structural queries
//! that do not depend on run-time conditions: reachability, terminal
//! activities and cycles.

use crate::activity::ActivityId;
use crate::definition::WorkflowDefinition;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::HashMap;

/// A directed graph of activity IDs, one edge per transition.
///
/// Edge weights carry the transition's condition, if any.
#[derive(Debug, Clone)]
pub struct TransitionGraph {
    graph: DiGraph<ActivityId, Option<String>>,
    index: HashMap<ActivityId, NodeIndex>,
}

impl TransitionGraph {
    /// Builds the graph of `definition`.
    ///
    /// Transitions whose endpoints are not activities of the definition are
    /// skipped.
    #[must_use]
    pub fn from_definition(definition: &WorkflowDefinition) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for activity in definition.activities() {
            let id = activity.id().clone();
            let node = graph.add_node(id.clone());
            index.insert(id, node);
        }

        for transition in definition.transitions() {
            if let (Some(&from), Some(&to)) = (index.get(&transition.from), index.get(&transition.to))
            {
                graph.add_edge(from, to, transition.condition.clone());
            }
        }

        Self { graph, index }
    }

    /// Returns the number of activities.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of transitions.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns every activity reachable from `start`, including `start`.
    #[must_use]
    pub fn reachable_from(&self, start: &ActivityId) -> Vec<ActivityId> {
        let Some(&root) = self.index.get(start) else {
            return Vec::new();
        };
        let mut dfs = Dfs::new(&self.graph, root);
        let mut reachable = Vec::new();
        while let Some(node) = dfs.next(&self.graph) {
            reachable.push(self.graph[node].clone());
        }
        reachable
    }

    /// Returns the activities that no path from `start` reaches, in
    /// insertion order.
    #[must_use]
    pub fn unreachable_from(&self, start: &ActivityId) -> Vec<ActivityId> {
        let reachable = self.reachable_from(start);
        self.graph
            .node_weights()
            .filter(|id| !reachable.contains(id))
            .cloned()
            .collect()
    }

    /// Returns activities without outgoing transitions.
    #[must_use]
    pub fn terminal_activities(&self) -> Vec<ActivityId> {
        self.graph
            .node_indices()
            .filter(|&i| {
                self.graph
                    .neighbors_directed(i, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .map(|i| self.graph[i].clone())
            .collect()
    }

    /// Returns true if some sequence of transitions leads back to where it
    /// started.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }
}
