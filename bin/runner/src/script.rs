//! Completion scripts.
//!
//! A script is a JSON array of steps, run in order against one instance:
//!
//! ```json
//! [
//!   { "activity": "start" },
//!   { "activity": "fork", "input": { "condition": "branch" } },
//!   { "activity": null }
//! ]
//! ```
//!
//! A step without an activity completes whichever activity is next.

use crate::error::RunnerError;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::Path;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use waypoint_core::Result;
use waypoint_workflow::{
    ActiveSetChanged, ActivityId, ActivityRegistry, WorkflowDefinition, WorkflowInstance,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptStep {
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub input: Option<JsonValue>,
}

/// Reads a file, attaching the path to any failure.
pub fn read(path: &Path) -> Result<Vec<u8>, RunnerError> {
    std::fs::read(path).map_err(|e| {
        RunnerError::ReadFile {
            path: path.to_path_buf(),
            details: e.to_string(),
        }
        .into()
    })
}

pub fn load_definition(
    path: &Path,
    registry: &ActivityRegistry,
) -> Result<WorkflowDefinition, RunnerError> {
    let bytes = read(path)?;
    let definition = WorkflowDefinition::from_json_bytes(&bytes, registry).map_err(|e| {
        RunnerError::Definition {
            details: e.to_string(),
        }
    })?;
    Ok(definition)
}

pub fn load_script(path: &Path) -> Result<Vec<ScriptStep>, RunnerError> {
    let bytes = read(path)?;
    let steps = serde_json::from_slice(&bytes).map_err(|e| RunnerError::Script {
        details: e.to_string(),
    })?;
    Ok(steps)
}

/// Runs `steps` against `instance`, stopping at the first failure.
pub async fn run(
    instance: &mut WorkflowInstance,
    steps: &[ScriptStep],
    cancel: &CancellationToken,
) -> Result<(), RunnerError> {
    for (index, step) in steps.iter().enumerate() {
        let number = index + 1;
        if cancel.is_cancelled() {
            return Err(RunnerError::Interrupted { step: number }.into());
        }

        let activity = match &step.activity {
            Some(activity) => ActivityId::new(activity.as_str()),
            None => instance
                .next_activity()
                .cloned()
                .ok_or(RunnerError::NothingActive { step: number })?,
        };

        let output = instance
            .complete_with_token(&activity, step.input.clone(), cancel)
            .await
            .map_err(|e| RunnerError::Step {
                step: number,
                activity: activity.to_string(),
                details: e.to_string(),
            })?;

        info!(
            step = number,
            activity = %activity,
            successful = output.successful,
            condition = ?output.condition,
            data = %output.data,
            "Completed activity"
        );
    }
    Ok(())
}

/// Logs every active-set change until the instance is dropped.
pub async fn log_changes(mut events: broadcast::Receiver<ActiveSetChanged>) {
    loop {
        match events.recv().await {
            Ok(change) => info!(
                instance = %change.instance_id,
                previous = ?change.previous,
                current = ?change.current,
                terminal = change.is_terminal(),
                "Active set changed"
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Dropped active set notifications");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
