//! A cross-process shared-state coordinator.
//!
//! A single coordinator subprocess owns the authoritative state of a set of
//! named objects. Every other process - the one that started it, and any
//! `suitkaise-worker` children spawned afterward - holds a
//! [`SharedStateProxy`] that routes reads and writes through it rather than
//! touching any state directly. Per-attribute pending/completed counters
//! give every proxy read-after-write consistency across process boundaries
//! without the coordinator needing to be anything more than a
//! single-writer, serially-applied command log.

mod coordinator;
mod counters;
mod dependency;
mod error;
mod handle;
mod object;
mod protocol;
mod proxy;

pub use dependency::{DependencyMap, DependencyMapBuilder};
pub use error::SharedStateError;
pub use handle::{SharedState, SharedStateBuilder};
pub use object::SharedObject;
pub use proxy::SharedStateProxy;
