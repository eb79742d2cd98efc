//! Core types shared by the waypoint crates.
//!
//! This crate provides the error-handling foundation and the strongly typed
//! identifiers used by the workflow engine and its hosts.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{InstanceId, ParseIdError};
