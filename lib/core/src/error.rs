//! Error handling foundation for waypoint.
//!
//! Library crates define their own error enums. Hosts and binaries wrap them
//! in a rootcause `Report` carrying a host-level context as they propagate.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
