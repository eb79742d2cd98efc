//! Definition documents.
//!
//! A definition is persisted as a [`DefinitionDocument`]: plain data with one
//! [`ActivityRecord`] per activity. Each record carries a `kind`
//! discriminator and the activity's serialized configuration. Reading a
//! document back requires an [`ActivityRegistry`] that maps every kind to a
//! decoder.

use crate::activity::{Activity, ActivityId, ActivityNode, TypedActivity};
use crate::builtin::{Automatic, Empty, Fork, Join};
use crate::definition::WorkflowDefinition;
use crate::envelope::Envelope;
use crate::error::DocumentError;
use crate::route::Route;
use crate::transition::Transition;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The serialized form of one activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Selects the decoder.
    pub kind: String,
    pub id: ActivityId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    /// The activity's configuration, decoded by the kind's decoder.
    #[serde(default)]
    pub config: JsonValue,
}

/// The serialized form of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionDocument {
    pub start: ActivityId,
    pub activities: Vec<ActivityRecord>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

type DecodeFn = fn(ActivityRecord) -> Result<Arc<dyn Activity>, DocumentError>;

/// Maps activity kinds to decoders.
#[derive(Clone, Default)]
pub struct ActivityRegistry {
    decoders: HashMap<String, DecodeFn>,
}

impl ActivityRegistry {
    /// Creates a registry that knows no kinds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that knows the built-in kinds.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register::<Empty>()
            .register::<Automatic>()
            .register::<Fork>()
            .register::<Join>();
        registry
    }

    /// Registers `T` under `T::KIND`, replacing any earlier decoder.
    pub fn register<T: TypedActivity>(&mut self) -> &mut Self {
        self.decoders.insert(T::KIND.to_string(), decode_typed::<T>);
        self
    }

    /// Returns true if a decoder is registered for `kind`.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    /// Decodes one record.
    ///
    /// # Errors
    ///
    /// - `UnknownKind` if no decoder is registered for the record's kind
    /// - `InvalidConfig` if the configuration does not decode
    pub fn decode(&self, record: ActivityRecord) -> Result<Arc<dyn Activity>, DocumentError> {
        let decode = self
            .decoders
            .get(&record.kind)
            .ok_or_else(|| DocumentError::UnknownKind {
                kind: record.kind.clone(),
            })?;
        decode(record)
    }
}

impl fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.decoders.keys().collect();
        kinds.sort();
        f.debug_struct("ActivityRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

fn decode_typed<T: TypedActivity>(record: ActivityRecord) -> Result<Arc<dyn Activity>, DocumentError> {
    // Field-less configurations may be written as null or left out.
    let config = match record.config {
        JsonValue::Null => JsonValue::Object(serde_json::Map::new()),
        config => config,
    };
    let behavior: T = serde_json::from_value(config).map_err(|e| DocumentError::InvalidConfig {
        kind: record.kind.clone(),
        activity_id: record.id.clone(),
        message: e.to_string(),
    })?;
    Ok(Arc::new(
        ActivityNode::new(record.id, behavior).with_routes(record.routes),
    ))
}

impl WorkflowDefinition {
    /// Converts the definition into a document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if an activity's configuration cannot be encoded.
    pub fn to_document(&self) -> Result<DefinitionDocument, DocumentError> {
        Ok(DefinitionDocument {
            start: self.start().clone(),
            activities: self
                .activities()
                .map(|activity| activity.to_record())
                .collect::<Result<_, _>>()?,
            transitions: self.transitions().to_vec(),
        })
    }

    /// Rebuilds and validates a definition from a document.
    ///
    /// # Errors
    ///
    /// Returns an error if a record does not decode or the resulting graph
    /// does not validate.
    pub fn from_document(
        document: DefinitionDocument,
        registry: &ActivityRegistry,
    ) -> Result<Self, DocumentError> {
        let mut definition = Self::new(document.start);
        for record in document.activities {
            definition.add_shared_activity(registry.decode(record)?)?;
        }
        for transition in document.transitions {
            definition.add_transition(transition);
        }
        definition.validate()?;
        Ok(definition)
    }

    /// Serializes the definition as a versioned JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if an activity's configuration cannot be encoded.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, DocumentError> {
        Envelope::new(self.to_document()?).to_json_bytes()
    }

    /// Parses a versioned JSON document.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedVersion` for documents from another format
    /// version, and any error of [`Self::from_document`].
    pub fn from_json_bytes(bytes: &[u8], registry: &ActivityRegistry) -> Result<Self, DocumentError> {
        let document = Envelope::<DefinitionDocument>::from_json_bytes(bytes)?.into_payload();
        Self::from_document(document, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DefinitionError;
    use serde_json::json;

    fn document(activities: JsonValue) -> DefinitionDocument {
        serde_json::from_value(json!({
            "start": "a",
            "activities": activities,
            "transitions": [{ "from": "a", "to": "b" }]
        }))
        .expect("document")
    }

    #[test]
    fn builtins_registered() {
        let registry = ActivityRegistry::with_builtins();
        for kind in ["empty", "automatic", "fork", "join"] {
            assert!(registry.contains(kind), "{kind} missing");
        }
        assert!(!ActivityRegistry::new().contains("empty"));
    }

    #[test]
    fn config_may_be_omitted() {
        let doc = document(json!([
            { "kind": "empty", "id": "a" },
            { "kind": "fork", "id": "b", "config": null }
        ]));
        let definition =
            WorkflowDefinition::from_document(doc, &ActivityRegistry::with_builtins())
                .expect("decode");
        assert!(definition.activity("b").expect("b").is_fork());
    }

    #[test]
    fn unknown_kind_rejected() {
        let doc = document(json!([
            { "kind": "empty", "id": "a" },
            { "kind": "teleport", "id": "b" }
        ]));
        let err = WorkflowDefinition::from_document(doc, &ActivityRegistry::with_builtins())
            .unwrap_err();
        assert_eq!(
            err,
            DocumentError::UnknownKind {
                kind: "teleport".to_string()
            }
        );
    }

    #[test]
    fn bad_config_rejected() {
        let doc = document(json!([
            { "kind": "empty", "id": "a" },
            { "kind": "fork", "id": "b", "config": { "automatic": "yes" } }
        ]));
        let err = WorkflowDefinition::from_document(doc, &ActivityRegistry::with_builtins())
            .unwrap_err();
        assert!(matches!(err, DocumentError::InvalidConfig { .. }));
    }

    #[test]
    fn invalid_graph_rejected() {
        let doc = document(json!([{ "kind": "empty", "id": "a" }]));
        let err = WorkflowDefinition::from_document(doc, &ActivityRegistry::with_builtins())
            .unwrap_err();
        assert!(matches!(
            err,
            DocumentError::Definition(DefinitionError::TransitionActivityNotFound { .. })
        ));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let doc = document(json!([
            { "kind": "empty", "id": "a" },
            { "kind": "empty", "id": "a" }
        ]));
        let err = WorkflowDefinition::from_document(doc, &ActivityRegistry::with_builtins())
            .unwrap_err();
        assert!(matches!(
            err,
            DocumentError::Definition(DefinitionError::DuplicateActivity { .. })
        ));
    }

    #[test]
    fn document_roundtrip_preserves_graph() {
        let doc = document(json!([
            { "kind": "empty", "id": "a" },
            { "kind": "fork", "id": "b", "config": { "condition": "left", "automatic": true } }
        ]));
        let registry = ActivityRegistry::with_builtins();
        let definition = WorkflowDefinition::from_document(doc.clone(), &registry).expect("decode");

        let bytes = definition.to_json_bytes().expect("encode");
        let reread = WorkflowDefinition::from_json_bytes(&bytes, &registry).expect("reread");
        assert_eq!(
            reread.to_document().expect("document"),
            definition.to_document().expect("document")
        );
        assert_eq!(reread.transitions(), doc.transitions.as_slice());
        assert_eq!(
            reread.activity("b").expect("b").to_record().expect("record").config,
            json!({ "condition": "left", "automatic": true })
        );
    }
}
