use std::time::Duration;

use serde::{Deserialize, Serialize};
use suitkaise_timing::Section;
use thiserror::Error;

/// The error taxon produced *inside* the child's lifecycle loop, carried
/// back to the parent as the `error` variant of a `ResultEnvelope`.
///
/// `on_finish`, `result`, and `error` each get their own variant rather
/// than sharing `PreRunError`/`RunError`/
/// `PostRunError` - those three are retried on `lives`, these three are not,
/// and keeping them as distinct types makes that asymmetry visible at the
/// type level instead of only in a doc comment. Unlike [`WorkerError`],
/// every variant here is plain data so it can cross the process boundary
/// through `suitkaise-serializer`.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum WorkerFailure<E> {
    #[error("pre_run failed on run {current_run}: {source}")]
    PreRunError { current_run: u64, source: E },
    #[error("run failed on run {current_run}: {source}")]
    RunError { current_run: u64, source: E },
    #[error("post_run failed on run {current_run}: {source}")]
    PostRunError { current_run: u64, source: E },
    #[error("on_finish failed on run {current_run}: {source}")]
    OnFinishError { current_run: u64, source: E },
    #[error("result failed on run {current_run}: {source}")]
    ResultError { current_run: u64, source: E },
    #[error("error hook itself failed on run {current_run}: {source}")]
    ErrorHandlerError { current_run: u64, source: E },
    #[error("section {section:?} timed out after {timeout:?} on run {current_run}")]
    Timeout {
        section: Section,
        timeout: Duration,
        current_run: u64,
    },
}

impl<E> WorkerFailure<E> {
    pub fn current_run(&self) -> u64 {
        match self {
            WorkerFailure::PreRunError { current_run, .. }
            | WorkerFailure::RunError { current_run, .. }
            | WorkerFailure::PostRunError { current_run, .. }
            | WorkerFailure::OnFinishError { current_run, .. }
            | WorkerFailure::ResultError { current_run, .. }
            | WorkerFailure::ErrorHandlerError { current_run, .. }
            | WorkerFailure::Timeout { current_run, .. } => *current_run,
        }
    }

    /// Whether this failure kind participates in the `lives` retry budget.
    /// `on_finish`/`result`/`error` are deliberately excluded -
    /// each gets exactly one attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkerFailure::PreRunError { .. }
                | WorkerFailure::RunError { .. }
                | WorkerFailure::PostRunError { .. }
                | WorkerFailure::Timeout { .. }
        )
    }
}

/// Public, parent-side error for all `Worker<S>` operations.
///
/// Wraps a [`WorkerFailure`] that actually came from the worker's own hooks
/// alongside the failure modes that are specific to driving the subprocess
/// itself (serialization at spawn time, channel disconnects, API misuse).
#[derive(Error, Debug)]
pub enum WorkerError<E> {
    #[error(transparent)]
    Failure(#[from] WorkerFailure<E>),
    #[error("serializer failed at spawn time: {0}")]
    Serialization(#[from] suitkaise_serializer::SerializationError),
    #[error("deserializer failed: {0}")]
    Deserialization(#[from] suitkaise_serializer::DeserializationError),
    #[error("channel error: {0}")]
    Channel(#[from] suitkaise_channel::ChannelError),
    #[error("worker was killed before producing a result")]
    Killed,
    #[error("start() called on a worker that is already running")]
    AlreadyStarted,
    #[error("wait(..) timed out before the child exited")]
    WaitTimedOut,
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
}
