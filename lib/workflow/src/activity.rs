//! The activity contract.
//!
//! Activities are the nodes of a workflow graph. The engine drives every
//! activity through the object-safe [`Activity`] trait, which works on JSON
//! values. Authors implement the strongly typed [`TypedActivity`] instead and
//! wrap it in an [`ActivityNode`], which bridges the two:
//!
//! - input JSON is decoded into `TypedActivity::Input`
//! - `Completion<TypedActivity::Output>` is encoded back into an [`ActivityOutput`]
//! - ports are derived from the input and output types once, at construction
//!
//! Activities are shared read-only by every instance of a definition. Any
//! per-instance bookkeeping goes through [`PrepareContext`].

use crate::definition::WorkflowDefinition;
use crate::document::ActivityRecord;
use crate::error::{ActivityError, DocumentError};
use crate::execution::{ActivityOutput, Completion};
use crate::port::Ports;
use crate::route::Route;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Borrow;
use std::fmt;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

/// Identifier of an activity, unique within its definition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(String);

impl ActivityId {
    /// Creates an activity ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a new random activity ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("act_{}", Ulid::new()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActivityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ActivityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&ActivityId> for ActivityId {
    fn from(id: &ActivityId) -> Self {
        id.clone()
    }
}

impl AsRef<str> for ActivityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ActivityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// What the engine should do with an activity that was just activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preparation {
    /// Stay active until a driver completes the activity.
    AwaitCompletion,
    /// Complete the activity immediately, without external input.
    AutoComplete,
    /// Leave the active set without completing; a later arrival may activate
    /// the activity again.
    Hold,
}

/// Per-activation context handed to [`Activity::prepare`].
pub struct PrepareContext<'a> {
    definition: &'a WorkflowDefinition,
    activity_id: &'a ActivityId,
    arrived_from: &'a ActivityId,
    state: &'a mut Option<JsonValue>,
}

impl<'a> PrepareContext<'a> {
    pub(crate) fn new(
        definition: &'a WorkflowDefinition,
        activity_id: &'a ActivityId,
        arrived_from: &'a ActivityId,
        state: &'a mut Option<JsonValue>,
    ) -> Self {
        Self {
            definition,
            activity_id,
            arrived_from,
            state,
        }
    }

    /// The definition the instance was created from.
    #[must_use]
    pub fn definition(&self) -> &'a WorkflowDefinition {
        self.definition
    }

    /// The activity being prepared.
    #[must_use]
    pub fn activity_id(&self) -> &'a ActivityId {
        self.activity_id
    }

    /// The activity whose completion activated this one.
    #[must_use]
    pub fn arrived_from(&self) -> &'a ActivityId {
        self.arrived_from
    }

    /// The per-instance data this activity stored on an earlier activation.
    #[must_use]
    pub fn state(&self) -> Option<&JsonValue> {
        self.state.as_ref()
    }

    /// Decodes the stored per-instance data.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the stored value does not decode into `T`.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<T>, ActivityError> {
        self.state
            .as_ref()
            .map(|value| T::deserialize(value))
            .transpose()
            .map_err(|e| ActivityError::InvalidInput {
                message: e.to_string(),
            })
    }

    /// Replaces the stored per-instance data.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOutput` if `value` cannot be encoded.
    pub fn store<T: Serialize>(&mut self, value: &T) -> Result<(), ActivityError> {
        let value = serde_json::to_value(value).map_err(|e| ActivityError::InvalidOutput {
            message: e.to_string(),
        })?;
        *self.state = Some(value);
        Ok(())
    }

    /// Removes the stored per-instance data.
    pub fn clear(&mut self) {
        *self.state = None;
    }
}

/// The uniform contract the engine executes.
#[async_trait]
pub trait Activity: Send + Sync + fmt::Debug {
    /// The activity's ID.
    fn id(&self) -> &ActivityId;

    /// The discriminator used when serializing this activity.
    fn kind(&self) -> &str;

    /// The fields of the input record.
    fn input_ports(&self) -> &Ports;

    /// The fields of the output record.
    fn output_ports(&self) -> &Ports;

    /// Data dependencies resolved before the activity runs.
    fn routes(&self) -> &[Route];

    /// Whether several outbound transitions may be taken at once.
    fn is_fork(&self) -> bool {
        false
    }

    /// Called when a transition activates this activity.
    async fn prepare(
        &self,
        _input: &JsonValue,
        _ctx: &mut PrepareContext<'_>,
    ) -> Result<Preparation, ActivityError> {
        Ok(Preparation::AwaitCompletion)
    }

    /// Runs the activity. This is the only place the engine suspends.
    async fn complete(
        &self,
        _input: JsonValue,
        _cancel: &CancellationToken,
    ) -> Result<ActivityOutput, ActivityError> {
        Ok(ActivityOutput::success(JsonValue::Object(
            serde_json::Map::new(),
        )))
    }

    /// Encodes the activity for a definition document.
    fn to_record(&self) -> Result<ActivityRecord, DocumentError>;
}

/// A strongly typed activity.
///
/// The implementing type is the activity's configuration: it is what gets
/// serialized into definition documents and decoded by the registry.
#[async_trait]
pub trait TypedActivity: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    /// The input record. Fields not supplied by routes or the driver must
    /// have serde defaults.
    type Input: DeserializeOwned + JsonSchema + Send + Sync;
    /// The output record.
    type Output: Serialize + JsonSchema + Default + Send;

    /// Discriminator stored in definition documents.
    const KIND: &'static str;
    /// Whether this activity may take several outbound transitions.
    const FORK: bool = false;

    /// Called on activation. `input` is `None` while fields that only the
    /// driver supplies at completion are still missing.
    async fn prepare(
        &self,
        _input: Option<&Self::Input>,
        _ctx: &mut PrepareContext<'_>,
    ) -> Result<Preparation, ActivityError> {
        Ok(Preparation::AwaitCompletion)
    }

    async fn complete(
        &self,
        _input: Self::Input,
        _cancel: &CancellationToken,
    ) -> Result<Completion<Self::Output>, ActivityError> {
        Ok(Completion::success(Self::Output::default()))
    }
}

/// Bridges a [`TypedActivity`] to the engine's [`Activity`] contract.
#[derive(Debug)]
pub struct ActivityNode<T: TypedActivity> {
    id: ActivityId,
    routes: Vec<Route>,
    behavior: T,
    input_ports: Ports,
    output_ports: Ports,
}

impl<T: TypedActivity> ActivityNode<T> {
    /// Creates an activity with the given ID and behavior.
    #[must_use]
    pub fn new(id: impl Into<ActivityId>, behavior: T) -> Self {
        Self {
            id: id.into(),
            routes: Vec::new(),
            behavior,
            input_ports: Ports::of::<T::Input>(),
            output_ports: Ports::of::<T::Output>(),
        }
    }

    /// Adds a route feeding this activity's input.
    #[must_use]
    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Adds several routes.
    #[must_use]
    pub fn with_routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes.extend(routes);
        self
    }

    /// Returns the typed behavior.
    #[must_use]
    pub fn behavior(&self) -> &T {
        &self.behavior
    }

    fn decode_input(input: &JsonValue) -> Result<T::Input, ActivityError> {
        T::Input::deserialize(input).map_err(|e| ActivityError::InvalidInput {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl<T: TypedActivity> Activity for ActivityNode<T> {
    fn id(&self) -> &ActivityId {
        &self.id
    }

    fn kind(&self) -> &str {
        T::KIND
    }

    fn input_ports(&self) -> &Ports {
        &self.input_ports
    }

    fn output_ports(&self) -> &Ports {
        &self.output_ports
    }

    fn routes(&self) -> &[Route] {
        &self.routes
    }

    fn is_fork(&self) -> bool {
        T::FORK
    }

    async fn prepare(
        &self,
        input: &JsonValue,
        ctx: &mut PrepareContext<'_>,
    ) -> Result<Preparation, ActivityError> {
        let input = T::Input::deserialize(input).ok();
        self.behavior.prepare(input.as_ref(), ctx).await
    }

    async fn complete(
        &self,
        input: JsonValue,
        cancel: &CancellationToken,
    ) -> Result<ActivityOutput, ActivityError> {
        let input = Self::decode_input(&input)?;
        let completion = self.behavior.complete(input, cancel).await?;
        let data =
            serde_json::to_value(&completion.output).map_err(|e| ActivityError::InvalidOutput {
                message: e.to_string(),
            })?;
        Ok(ActivityOutput {
            successful: completion.successful,
            condition: completion.condition,
            data,
        })
    }

    fn to_record(&self) -> Result<ActivityRecord, DocumentError> {
        let config =
            serde_json::to_value(&self.behavior).map_err(|e| DocumentError::InvalidConfig {
                kind: T::KIND.to_string(),
                activity_id: self.id.clone(),
                message: e.to_string(),
            })?;
        Ok(ActivityRecord {
            kind: T::KIND.to_string(),
            id: self.id.clone(),
            routes: self.routes.clone(),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Double {
        factor: i64,
    }

    #[derive(Deserialize, JsonSchema)]
    struct DoubleInput {
        value: i64,
    }

    #[derive(Default, Serialize, JsonSchema)]
    struct DoubleOutput {
        value: i64,
    }

    #[async_trait]
    impl TypedActivity for Double {
        type Input = DoubleInput;
        type Output = DoubleOutput;
        const KIND: &'static str = "double";

        async fn complete(
            &self,
            input: DoubleInput,
            _cancel: &CancellationToken,
        ) -> Result<Completion<DoubleOutput>, ActivityError> {
            Ok(Completion::success(DoubleOutput {
                value: input.value * self.factor,
            })
            .with_condition("doubled"))
        }
    }

    #[test]
    fn activity_id_display_and_borrow() {
        let id = ActivityId::new("review");
        assert_eq!(id.to_string(), "review");
        let borrowed: &str = id.borrow();
        assert_eq!(borrowed, "review");
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = ActivityId::generate();
        let b = ActivityId::generate();
        assert!(a.as_str().starts_with("act_"));
        assert_ne!(a, b);
    }

    #[test]
    fn node_derives_ports_from_types() {
        let node = ActivityNode::new("double", Double { factor: 2 });
        assert_eq!(node.kind(), "double");
        assert!(node.input_ports().get("value").is_some());
        assert!(node.output_ports().get("value").is_some());
        assert!(!node.is_fork());
    }

    #[tokio::test]
    async fn node_bridges_typed_completion() {
        let node = ActivityNode::new("double", Double { factor: 3 });
        let output = node
            .complete(json!({ "value": 7 }), &CancellationToken::new())
            .await
            .expect("complete");
        assert!(output.successful);
        assert_eq!(output.condition.as_deref(), Some("doubled"));
        assert_eq!(output.data, json!({ "value": 21 }));
    }

    #[tokio::test]
    async fn node_rejects_undecodable_input() {
        let node = ActivityNode::new("double", Double { factor: 3 });
        let err = node
            .complete(json!({ "value": "seven" }), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ActivityError::InvalidInput { .. }));
    }

    #[test]
    fn node_record_carries_config_and_routes() {
        let node = ActivityNode::new("double", Double { factor: 4 })
            .with_route(Route::new("source", "total", "value"));
        let record = node.to_record().expect("record");
        assert_eq!(record.kind, "double");
        assert_eq!(record.config, json!({ "factor": 4 }));
        assert_eq!(record.routes.len(), 1);
    }
}
