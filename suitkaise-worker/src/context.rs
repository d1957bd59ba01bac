use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use suitkaise_channel::{ChannelError, Point, RecvOnly, SendOnly};

/// Handle passed to every `WorkerSpec` hook so it can use `tell`/`listen`
/// and read the current run index without reaching into module-level
/// mutable state - an explicit context object in place of a global.
pub struct WorkerContext<'a> {
    pub(crate) tell: &'a Point<SendOnly>,
    pub(crate) listen: &'a Point<RecvOnly>,
    pub(crate) current_run: u64,
}

impl<'a> WorkerContext<'a> {
    /// Build a context from its parts.
    ///
    /// Public so a host that runs a spec's lifecycle without going through
    /// `Worker::start` - `suitkaise-pool`'s inline `WorkerSpec` execution is
    /// the one example today - can still hand hooks a real context instead
    /// of a parallel type.
    pub fn new(tell: &'a Point<SendOnly>, listen: &'a Point<RecvOnly>, current_run: u64) -> Self {
        Self {
            tell,
            listen,
            current_run,
        }
    }

    /// Send a value to the parent's `listen`.
    pub fn tell(&self, value: &impl Serialize) -> Result<(), ChannelError> {
        self.tell.send(value)
    }

    /// Receive a value sent by the parent's `tell`, blocking indefinitely.
    pub fn listen<T: DeserializeOwned>(&self) -> Result<T, ChannelError> {
        self.listen.recv()
    }

    /// Receive a value sent by the parent's `tell`, returning `None` if
    /// nothing arrives within `timeout`.
    pub fn listen_timeout<T: DeserializeOwned>(
        &self,
        timeout: Duration,
    ) -> Result<Option<T>, ChannelError> {
        self.listen.recv_timeout(timeout)
    }

    /// The 0-indexed iteration currently executing.
    pub fn current_run(&self) -> u64 {
        self.current_run
    }
}
