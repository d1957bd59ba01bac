//! Deterministic subprocess lifecycle execution with retries, timeouts, and
//! graceful stop.
//!
//! A [`WorkerSpec`] describes a unit of lifecycle work: `pre_run -> run ->
//! post_run`, repeated, then `on_finish -> result` (or `error` on exhausted
//! retries). [`Worker::start`] forks a child to run it under the state
//! machine in [`child`]; [`Worker`] itself is the parent-side handle -
//! `start`/`stop`/`kill`/`wait`/`result`/`run`/`tell`/`listen` plus
//! introspection.

mod child;
mod config;
mod context;
mod envelope;
mod error;
mod parent;
mod shared_mem;
mod spec;
mod timeout;

pub use config::{Bound, Config, ConfigBuilder, Timeouts};
pub use context::WorkerContext;
pub use envelope::ResultEnvelope;
pub use error::{WorkerError, WorkerFailure};
pub use parent::Worker;
pub use spec::WorkerSpec;
