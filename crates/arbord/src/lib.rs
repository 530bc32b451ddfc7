//! arbord: the arbor daemon.
//!
//! Split into a library so the assembled router and the configuration
//! loader can be exercised from integration tests.

pub mod config;
pub mod standalone;
