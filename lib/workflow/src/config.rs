//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default cap on automatic completions triggered by one `complete` call.
pub const DEFAULT_MAX_AUTOMATIC_STEPS: usize = 1024;

/// Default buffer of the active-set notification channel.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;

/// Tunables for workflow instances.
///
/// Missing fields fall back to their defaults, so a partial configuration
/// section is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How many automatic completions a single `complete` call may chain
    /// before it fails with `AutomaticStepLimit`.
    #[serde(default = "default_max_automatic_steps")]
    pub max_automatic_steps: usize,
    /// Buffer size of each instance's active-set broadcast channel.
    /// Slow subscribers lag rather than block the engine.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

fn default_max_automatic_steps() -> usize {
    DEFAULT_MAX_AUTOMATIC_STEPS
}

fn default_notification_capacity() -> usize {
    DEFAULT_NOTIFICATION_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_automatic_steps: default_max_automatic_steps(),
            notification_capacity: default_notification_capacity(),
        }
    }
}
