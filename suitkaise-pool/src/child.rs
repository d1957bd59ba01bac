//! The forked child side of item dispatch: read one or more `(index, item)`
//! frames, apply the target function, write back the outcome. Shared by the
//! fast path (loops until `Shutdown`) and the slow path (handles exactly one
//! item, since the parent kills the process either way once it answers).

use std::panic::{self, AssertUnwindSafe};

use serde::de::DeserializeOwned;
use serde::Serialize;
use suitkaise_channel::{Point, RecvOnly, SendOnly};

use crate::message::{ItemOutcome, PoolMessage, PoolResponse};

pub(crate) fn run_pool_child<F, T, O>(f: F, inbox: Point<RecvOnly>, outbox: Point<SendOnly>) -> !
where
    F: Fn(T) -> O,
    T: DeserializeOwned,
    O: Serialize,
{
    loop {
        let message: PoolMessage = match inbox.recv() {
            Ok(message) => message,
            Err(_) => break,
        };
        match message {
            PoolMessage::Shutdown => break,
            PoolMessage::Item { index, payload } => {
                let outcome = apply_one(&f, &payload);
                if outbox.send(&PoolResponse { index, outcome }).is_err() {
                    break;
                }
            }
        }
    }
    drop(inbox);
    drop(outbox);
    std::process::exit(0);
}

fn apply_one<F, T, O>(f: &F, payload: &[u8]) -> ItemOutcome
where
    F: Fn(T) -> O,
    T: DeserializeOwned,
    O: Serialize,
{
    let item: T = match suitkaise_serializer::decode(payload) {
        Ok(item) => item,
        Err(err) => return ItemOutcome::Panicked(format!("failed to decode item: {err}")),
    };
    match panic::catch_unwind(AssertUnwindSafe(|| f(item))) {
        Ok(output) => match suitkaise_serializer::encode(&output) {
            Ok(bytes) => ItemOutcome::Ok(bytes),
            Err(err) => ItemOutcome::Panicked(format!("failed to encode result: {err}")),
        },
        Err(panic) => ItemOutcome::Panicked(panic_message(panic)),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "pool worker panicked with a non-string payload".to_string()
    }
}
