//! Error types for the workflow crate.
//!
//! Errors are layered by phase:
//! - `DefinitionError`: building, querying and validating a definition
//! - `RuntimeError`: completing activities on an instance
//! - `ActivityError`: raised by activity implementations themselves
//! - `DocumentError`: converting definitions to and from documents
//!
//! Hosts add their own context by wrapping these in a rootcause `Report`.

use crate::activity::ActivityId;
use crate::port::PortDirection;
use std::fmt;

/// Errors from definition construction, lookup and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// No activity with this ID exists in the definition.
    ActivityNotFound { activity_id: ActivityId },
    /// An activity with this ID was already added.
    DuplicateActivity { activity_id: ActivityId },
    /// The start activity is not part of the definition.
    StartActivityNotFound { activity_id: ActivityId },
    /// A transition references an unknown activity.
    TransitionActivityNotFound {
        from: ActivityId,
        to: ActivityId,
        missing: ActivityId,
    },
    /// A route reads from an activity that does not exist.
    RouteActivityNotFound {
        activity_id: ActivityId,
        output_activity: ActivityId,
    },
    /// A route names a port that the activity does not have.
    RoutePropertyNotFound {
        activity_id: ActivityId,
        direction: PortDirection,
        property: String,
    },
    /// A route connects ports of different types.
    RouteTypeMismatch {
        output_activity: ActivityId,
        output_field: String,
        output_type: String,
        activity_id: ActivityId,
        input_field: String,
        input_type: String,
    },
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActivityNotFound { activity_id } => {
                write!(f, "activity not found: {activity_id}")
            }
            Self::DuplicateActivity { activity_id } => {
                write!(f, "duplicate activity: {activity_id}")
            }
            Self::StartActivityNotFound { activity_id } => {
                write!(f, "start activity not found: {activity_id}")
            }
            Self::TransitionActivityNotFound { from, to, missing } => {
                write!(
                    f,
                    "transition {from} -> {to} references unknown activity {missing}"
                )
            }
            Self::RouteActivityNotFound {
                activity_id,
                output_activity,
            } => {
                write!(
                    f,
                    "route on activity {activity_id} reads from unknown activity {output_activity}"
                )
            }
            Self::RoutePropertyNotFound {
                activity_id,
                direction,
                property,
            } => {
                write!(
                    f,
                    "{direction} port '{property}' not found on activity {activity_id}"
                )
            }
            Self::RouteTypeMismatch {
                output_activity,
                output_field,
                output_type,
                activity_id,
                input_field,
                input_type,
            } => {
                write!(
                    f,
                    "route type mismatch: {output_activity}.{output_field} ({output_type}) -> {activity_id}.{input_field} ({input_type})"
                )
            }
        }
    }
}

impl std::error::Error for DefinitionError {}

/// Errors raised by activity implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityError {
    /// The input could not be decoded into the activity's input type.
    InvalidInput { message: String },
    /// The output could not be encoded.
    InvalidOutput { message: String },
    /// The activity's own logic failed.
    Failed { message: String },
    /// The activity observed cancellation and stopped.
    Cancelled,
}

impl ActivityError {
    /// Creates a `Failed` error with the given message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

impl fmt::Display for ActivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { message } => write!(f, "invalid input: {message}"),
            Self::InvalidOutput { message } => write!(f, "invalid output: {message}"),
            Self::Failed { message } => write!(f, "activity failed: {message}"),
            Self::Cancelled => write!(f, "activity cancelled"),
        }
    }
}

impl std::error::Error for ActivityError {}

/// Errors from completing activities on an instance.
///
/// Every variant leaves the instance exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The activity is not in the active set.
    ActivityNotActive { activity_id: ActivityId },
    /// A route reads from an activity that has not completed yet.
    RouteDataMissing {
        activity_id: ActivityId,
        output_activity: ActivityId,
    },
    /// No outbound transition carries the requested condition.
    NoMatchingTransition {
        activity_id: ActivityId,
        condition: String,
    },
    /// Several transitions were selected out of an activity that is not a fork.
    AmbiguousFork {
        activity_id: ActivityId,
        targets: Vec<ActivityId>,
    },
    /// No condition was given but the activity has conditional transitions.
    ConditionalDefaultTransition { activity_id: ActivityId },
    /// The supplied input is not a JSON object.
    InvalidInput {
        activity_id: ActivityId,
        reason: String,
    },
    /// The activity's own prepare or complete step failed.
    ActivityExecution {
        activity_id: ActivityId,
        source: ActivityError,
    },
    /// Automatic activities kept completing past the configured limit.
    AutomaticStepLimit { limit: usize },
    /// The definition was queried for something it does not contain.
    Definition(DefinitionError),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActivityNotActive { activity_id } => {
                write!(f, "activity {activity_id} is not active")
            }
            Self::RouteDataMissing {
                activity_id,
                output_activity,
            } => {
                write!(
                    f,
                    "activity {activity_id} needs data from {output_activity}, which has not completed"
                )
            }
            Self::NoMatchingTransition {
                activity_id,
                condition,
            } => {
                write!(
                    f,
                    "no transition out of {activity_id} matches condition '{condition}'"
                )
            }
            Self::AmbiguousFork {
                activity_id,
                targets,
            } => {
                let targets = targets
                    .iter()
                    .map(ActivityId::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "activity {activity_id} is not a fork but selected several transitions: {targets}"
                )
            }
            Self::ConditionalDefaultTransition { activity_id } => {
                write!(
                    f,
                    "activity {activity_id} completed without a condition but has conditional transitions"
                )
            }
            Self::InvalidInput {
                activity_id,
                reason,
            } => {
                write!(f, "invalid input for activity {activity_id}: {reason}")
            }
            Self::ActivityExecution {
                activity_id,
                source,
            } => {
                write!(f, "activity {activity_id} failed to execute: {source}")
            }
            Self::AutomaticStepLimit { limit } => {
                write!(f, "automatic execution exceeded {limit} steps")
            }
            Self::Definition(e) => write!(f, "definition error: {e}"),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ActivityExecution { source, .. } => Some(source),
            Self::Definition(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DefinitionError> for RuntimeError {
    fn from(e: DefinitionError) -> Self {
        Self::Definition(e)
    }
}

/// Errors from reading or writing definition and instance documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The document is not valid JSON or does not have the expected shape.
    Malformed { message: String },
    /// The document envelope has a version this build does not understand.
    UnsupportedVersion { version: u32 },
    /// No decoder is registered for this activity kind.
    UnknownKind { kind: String },
    /// An activity's configuration could not be encoded or decoded.
    InvalidConfig {
        kind: String,
        activity_id: ActivityId,
        message: String,
    },
    /// The decoded graph is not a valid definition.
    Definition(DefinitionError),
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { message } => write!(f, "malformed document: {message}"),
            Self::UnsupportedVersion { version } => {
                write!(f, "unsupported document version: {version}")
            }
            Self::UnknownKind { kind } => write!(f, "unknown activity kind: {kind}"),
            Self::InvalidConfig {
                kind,
                activity_id,
                message,
            } => {
                write!(
                    f,
                    "invalid configuration for {kind} activity {activity_id}: {message}"
                )
            }
            Self::Definition(e) => write!(f, "invalid definition: {e}"),
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Definition(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DefinitionError> for DocumentError {
    fn from(e: DefinitionError) -> Self {
        Self::Definition(e)
    }
}

impl From<serde_json::Error> for DocumentError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn definition_error_display() {
        let err = DefinitionError::ActivityNotFound {
            activity_id: ActivityId::new("review"),
        };
        assert_eq!(err.to_string(), "activity not found: review");
    }

    #[test]
    fn route_property_error_names_direction() {
        let err = DefinitionError::RoutePropertyNotFound {
            activity_id: ActivityId::new("x"),
            direction: PortDirection::Output,
            property: "Total".to_string(),
        };
        assert!(err.to_string().contains("output port 'Total'"));
    }

    #[test]
    fn ambiguous_fork_lists_targets() {
        let err = RuntimeError::AmbiguousFork {
            activity_id: ActivityId::new("decide"),
            targets: vec![ActivityId::new("a"), ActivityId::new("b")],
        };
        assert!(err.to_string().ends_with("a, b"));
    }

    #[test]
    fn activity_execution_exposes_source() {
        let err = RuntimeError::ActivityExecution {
            activity_id: ActivityId::new("charge"),
            source: ActivityError::failed("card declined"),
        };
        assert!(err.to_string().contains("card declined"));
        assert!(err.source().is_some());
    }

    #[test]
    fn serde_errors_become_malformed_documents() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let doc_err = DocumentError::from(err);
        assert!(matches!(doc_err, DocumentError::Malformed { .. }));
    }
}
