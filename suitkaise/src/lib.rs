//! The `suitkaise` processing core, assembled: re-exports the five
//! component crates (serializer, timing, channel, worker, pool) plus
//! shared-state, and layers the call-site modifier framework and scoped
//! resource helpers over them.
//!
//! The component crates never reimplement `.timeout()`/`.background()`/
//! `.asynced()` themselves beyond the synchronous `.timeout(d)` `Pool`
//! already exposes - everything async-shaped lives here in [`modifiers`],
//! wrapping their plain synchronous operations rather than the other way
//! around.

pub mod modifiers;
pub mod resource;

pub use suitkaise_channel::{
    close_inherited_fd, Anchor, CanRecv, CanSend, Channel, ChannelError, Full, Point, RecvOnly,
    SendOnly,
};
pub use suitkaise_pool::{Pool, PoolError, StarApply};
pub use suitkaise_serializer::{
    decode, encode, Arena, ArenaBuilder, ArenaRef, DeserializationError, HandlerRegistry,
    Reconnect, Reconnectable, Reconnector, SerializationError, FORMAT_VERSION,
};
pub use suitkaise_shared_state::{
    DependencyMap, DependencyMapBuilder, SharedObject, SharedState, SharedStateBuilder,
    SharedStateError, SharedStateProxy,
};
pub use suitkaise_timing::{Recorder, Section};
pub use suitkaise_worker::{
    Bound, Config, ConfigBuilder, ResultEnvelope, Timeouts, Worker, WorkerContext, WorkerError,
    WorkerFailure, WorkerSpec,
};

pub use modifiers::{BackgroundHandle, Modifier, ModifierError};
pub use resource::{with_coordinator, with_pool, CoordinatorGuard, PoolGuard};
