//! arbor-state: embedded state store for arbor.
//!
//! Backed by [redb](https://docs.rs/redb). One `StateStore` implements every
//! collaborator trait of the engine (resource store, artifact store, staging
//! pipeline recorder, workload primitive), which makes it the backend of the
//! standalone daemon and the default fixture of the engine's tests.
//!
//! # Architecture
//!
//! Domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{namespace}/{name}`, `{namespace}/{app}/{route}`) enable
//! prefix scans for related records. Every read-modify-write happens inside
//! a single write transaction, so redb serializes conflicting writers.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

mod artifacts;
mod pipeline;
mod resources;
mod workloads;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::WorkloadRecord;
