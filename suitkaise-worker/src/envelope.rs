use serde::{Deserialize, Serialize};
use suitkaise_timing::Recorder;

use crate::error::WorkerFailure;

/// The single message a child sends back before exiting: either the
/// `result` hook's output or the failure that ended the run,
/// paired with the final timing recorder so the parent's introspection
/// reflects the whole run, not just what happened before the crossing.
#[derive(Debug, Serialize, Deserialize)]
pub enum ResultEnvelope<O, E> {
    Result { payload: O, timings: Recorder },
    Error { payload: WorkerFailure<E>, timings: Recorder },
}
