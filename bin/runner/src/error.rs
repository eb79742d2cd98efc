//! Error context for the runner.
//!
//! Library errors are flattened into these variants at the binary boundary
//! and carried in a rootcause `Report`.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum RunnerError {
    /// Configuration could not be loaded from the environment.
    Config { details: String },
    /// A file could not be read.
    ReadFile { path: PathBuf, details: String },
    /// The definition document is invalid.
    Definition { details: String },
    /// The script document is invalid.
    Script { details: String },
    /// The script asked for the next activity but none is active.
    NothingActive { step: usize },
    /// A completion failed.
    Step {
        step: usize,
        activity: String,
        details: String,
    },
    /// The run was interrupted before the script finished.
    Interrupted { step: usize },
    /// The final snapshot could not be written.
    Output { details: String },
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {details}"),
            Self::ReadFile { path, details } => {
                write!(f, "failed to read {}: {details}", path.display())
            }
            Self::Definition { details } => write!(f, "invalid definition: {details}"),
            Self::Script { details } => write!(f, "invalid script: {details}"),
            Self::NothingActive { step } => {
                write!(f, "step {step}: no activity is active")
            }
            Self::Step {
                step,
                activity,
                details,
            } => write!(f, "step {step}: completing '{activity}' failed: {details}"),
            Self::Interrupted { step } => write!(f, "interrupted before step {step}"),
            Self::Output { details } => write!(f, "failed to write snapshot: {details}"),
        }
    }
}

impl std::error::Error for RunnerError {}
