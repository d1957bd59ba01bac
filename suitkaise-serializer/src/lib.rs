//! Byte-level encode/decode of in-process values across a process boundary.
//!
//! This is the leaf dependency of the `suitkaise` processing core: every
//! other component (channel, worker, pool, shared-state) moves bytes
//! produced here across `UnixStream` pipes to subprocesses. It provides:
//!
//! - a default [`encode`]/[`decode`] path for any `Serialize`/
//!   `DeserializeOwned` value, behind a versioned envelope;
//! - a [`HandlerRegistry`] extension point for types that need custom
//!   byte-level treatment;
//! - [`Reconnector`]/[`Reconnectable`] for live external resources that
//!   cannot themselves cross a process boundary;
//! - an index-based [`Arena`] for graphs with shared references or cycles.

mod arena;
mod envelope;
mod error;
mod handler;
mod reconnect;

pub use arena::{Arena, ArenaBuilder, ArenaRef};
pub use envelope::{decode, encode, FORMAT_VERSION};
pub use error::{DeserializationError, SerializationError};
pub use handler::HandlerRegistry;
pub use reconnect::{Reconnect, Reconnectable, Reconnector};
