//! Activity-graph workflow engine.
//!
//! This crate provides:
//!
//! - **Definitions**: activities with typed input and output ports, connected
//!   by conditional transitions and fed by data routes
//! - **Instances**: an async engine that tracks the active set, takes
//!   transitions, completes automatic activities and records history
//! - **Built-ins**: fork, join and automatic control-flow activities
//! - **Documents**: versioned JSON for definitions and instance snapshots
//! - **Hosting**: a registry for running many instances side by side

pub mod activity;
pub mod builtin;
pub mod config;
pub mod definition;
pub mod document;
pub mod envelope;
pub mod error;
pub mod execution;
pub mod graph;
pub mod host;
pub mod instance;
pub mod port;
pub mod route;
pub mod state;
pub mod transition;

pub use activity::{Activity, ActivityId, ActivityNode, Preparation, PrepareContext, TypedActivity};
pub use builtin::{Automatic, Empty, Fork, ForkInput, Join, NoData};
pub use config::EngineConfig;
pub use definition::WorkflowDefinition;
pub use document::{ActivityRecord, ActivityRegistry, DefinitionDocument};
pub use envelope::{CURRENT_VERSION, Envelope};
pub use error::{ActivityError, DefinitionError, DocumentError, RuntimeError};
pub use execution::{ActiveSetChanged, ActivityData, ActivityOutput, ActivityStatus, Completion};
pub use graph::TransitionGraph;
pub use host::InstanceRegistry;
pub use instance::WorkflowInstance;
pub use port::{PortDirection, PortSchema, Ports};
pub use route::Route;
pub use state::InstanceSnapshot;
pub use transition::Transition;
