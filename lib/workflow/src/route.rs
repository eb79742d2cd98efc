//! Routes: declarative data dependencies between activities.
//!
//! A route copies one field of a completed activity's output into one field
//! of the consuming activity's input, just before the consumer runs.

use crate::activity::ActivityId;
use serde::{Deserialize, Serialize};

/// A data dependency declared by the consuming activity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    /// The activity whose output is read.
    pub output_activity: ActivityId,
    /// The output field copied from that activity.
    pub output_field: String,
    /// The input field it is copied into.
    pub input_field: String,
}

impl Route {
    /// Creates a route from `output_activity.output_field` to `input_field`.
    #[must_use]
    pub fn new(
        output_activity: impl Into<ActivityId>,
        output_field: impl Into<String>,
        input_field: impl Into<String>,
    ) -> Self {
        Self {
            output_activity: output_activity.into(),
            output_field: output_field.into(),
            input_field: input_field.into(),
        }
    }

    /// Creates a route between fields sharing the same name.
    #[must_use]
    pub fn same_field(output_activity: impl Into<ActivityId>, field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(output_activity, field.clone(), field)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} -> {}",
            self.output_activity, self.output_field, self.input_field
        )
    }
}
