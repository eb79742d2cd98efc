//! Built-in activity kinds.
//!
//! | Kind        | Behavior                                                  |
//! |-------------|-----------------------------------------------------------|
//! | `empty`     | Waits for a driver, then follows its one transition       |
//! | `automatic` | Completes as soon as it is activated                      |
//! | `fork`      | Takes every transition matching its condition             |
//! | `join`      | Completes once every inbound branch has arrived           |

use crate::activity::{ActivityId, Preparation, PrepareContext, TypedActivity};
use crate::error::ActivityError;
use crate::execution::Completion;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;

/// A record without fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NoData {}

/// An activity that does nothing but wait for a driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

impl TypedActivity for Empty {
    type Input = NoData;
    type Output = NoData;
    const KIND: &'static str = "empty";
}

/// An activity that completes as soon as it is activated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Automatic {}

#[async_trait]
impl TypedActivity for Automatic {
    type Input = NoData;
    type Output = NoData;
    const KIND: &'static str = "automatic";

    async fn prepare(
        &self,
        _input: Option<&NoData>,
        _ctx: &mut PrepareContext<'_>,
    ) -> Result<Preparation, ActivityError> {
        Ok(Preparation::AutoComplete)
    }
}

/// Input of a [`Fork`]: the branch label to take, overriding the configured one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ForkInput {
    #[serde(default)]
    pub condition: Option<String>,
}

/// An activity that may take several outbound transitions at once.
///
/// With no condition from either the input or the configuration, every
/// unconditional outbound transition is taken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fork {
    /// Branch label used when the input carries none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Complete on activation instead of waiting for a driver.
    #[serde(default)]
    pub automatic: bool,
}

impl Fork {
    /// A fork that takes the branches labelled `condition`.
    #[must_use]
    pub fn on(condition: impl Into<String>) -> Self {
        Self {
            condition: Some(condition.into()),
            automatic: false,
        }
    }

    /// Makes the fork complete on activation.
    #[must_use]
    pub fn automatic(mut self) -> Self {
        self.automatic = true;
        self
    }
}

#[async_trait]
impl TypedActivity for Fork {
    type Input = ForkInput;
    type Output = NoData;
    const KIND: &'static str = "fork";
    const FORK: bool = true;

    async fn prepare(
        &self,
        _input: Option<&ForkInput>,
        _ctx: &mut PrepareContext<'_>,
    ) -> Result<Preparation, ActivityError> {
        if self.automatic {
            Ok(Preparation::AutoComplete)
        } else {
            Ok(Preparation::AwaitCompletion)
        }
    }

    async fn complete(
        &self,
        input: ForkInput,
        _cancel: &CancellationToken,
    ) -> Result<Completion<NoData>, ActivityError> {
        let completion = Completion::success(NoData {});
        Ok(match input.condition.or_else(|| self.condition.clone()) {
            Some(condition) => completion.with_condition(condition),
            None => completion,
        })
    }
}

/// An activity that waits for all of its inbound branches.
///
/// Each arrival is remembered in the instance. The join holds until every
/// distinct source of an inbound transition has arrived, then completes
/// automatically and forgets the arrivals, so it can fire again in a loop.
///
/// An arrival while the join is still queued to fire is not recorded: the
/// engine never prepares an activity that is already active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {}

#[async_trait]
impl TypedActivity for Join {
    type Input = NoData;
    type Output = NoData;
    const KIND: &'static str = "join";

    async fn prepare(
        &self,
        _input: Option<&NoData>,
        ctx: &mut PrepareContext<'_>,
    ) -> Result<Preparation, ActivityError> {
        let mut arrived: BTreeSet<ActivityId> = ctx.load()?.unwrap_or_default();
        arrived.insert(ctx.arrived_from().clone());

        let expected: BTreeSet<&ActivityId> = ctx
            .definition()
            .inbound_transitions(ctx.activity_id())
            .into_iter()
            .map(|t| &t.from)
            .collect();

        if expected.iter().all(|id| arrived.contains(*id)) {
            ctx.clear();
            Ok(Preparation::AutoComplete)
        } else {
            ctx.store(&arrived)?;
            Ok(Preparation::Hold)
        }
    }
}
