//! Slow path: one process per item, used whenever `.timeout(d)` is set. A
//! slow item is killed on its own without disturbing any other item's
//! worker, which the fast path's shared reusable children cannot offer.
//!
//! Every fork happens on this module's single controlling thread - `fork()`
//! is only sound from a single-threaded caller, so unlike the fast path
//! (which forks everything up front, before spawning any dispatch threads)
//! the slow path never spawns OS threads at all. Concurrency across up to
//! `workers` in-flight items comes from the forked child *processes*
//! themselves running in parallel; this thread just round-robin polls each
//! one's outbox with a short timeout until one answers or misses its
//! deadline.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, Pid};
use serde::de::DeserializeOwned;
use serde::Serialize;
use suitkaise_channel::{Anchor, Channel, RecvOnly};

use crate::child::run_pool_child;
use crate::error::PoolError;
use crate::message::{ItemOutcome, PoolMessage, PoolResponse};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

struct InFlight {
    index: usize,
    pid: Pid,
    outbox: Anchor<RecvOnly>,
    deadline: Instant,
}

enum Verdict {
    Responded(PoolResponse),
    TimedOut,
    Closed,
}

fn spawn_one<F, T, O>(f: &F, index: usize, item: T, timeout: Duration) -> Result<InFlight, PoolError>
where
    F: Fn(T) -> O + Clone,
    T: Serialize,
    O: Serialize,
{
    let (mut inbox_anchor, inbox_point) = Channel::one_way_pair()?;
    let (outbox_anchor, outbox_point) = Channel::one_way_pair_reversed()?;
    let f = f.clone();

    // SAFETY: called only from `run`'s single controlling thread.
    let fork_result = unsafe { nix::unistd::fork() }
        .map_err(|errno| PoolError::Spawn(format!("fork failed: {errno}")))?;

    match fork_result {
        ForkResult::Child => {
            drop(inbox_anchor);
            drop(outbox_anchor);
            run_pool_child(f, inbox_point, outbox_point);
        }
        ForkResult::Parent { child } => {
            drop(inbox_point);
            drop(outbox_point);
            let payload = suitkaise_serializer::encode(&item)?;
            inbox_anchor.send(&PoolMessage::Item {
                index: index as u64,
                payload,
            })?;
            drop(inbox_anchor);
            Ok(InFlight {
                index,
                pid: child,
                outbox: outbox_anchor,
                deadline: Instant::now() + timeout,
            })
        }
    }
}

/// Runs every `(index, item)` pair, at most `workers` concurrently, aborting
/// the whole batch on the first timeout or worker error.
pub(crate) fn run<F, T, O>(
    workers: usize,
    timeout: Duration,
    f: F,
    work: Vec<(usize, T)>,
) -> Result<Vec<(usize, O)>, PoolError>
where
    F: Fn(T) -> O + Clone,
    T: Serialize,
    O: Serialize + DeserializeOwned,
{
    let mut pending: VecDeque<(usize, T)> = work.into_iter().collect();
    let mut in_flight: Vec<InFlight> = Vec::with_capacity(workers);
    let mut collected = Vec::with_capacity(pending.len());

    loop {
        while in_flight.len() < workers {
            let Some((index, item)) = pending.pop_front() else {
                break;
            };
            in_flight.push(spawn_one(&f, index, item, timeout)?);
        }
        if in_flight.is_empty() {
            break;
        }

        let (slot, verdict) = loop {
            let mut found = None;
            for (slot, handle) in in_flight.iter_mut().enumerate() {
                if Instant::now() >= handle.deadline {
                    found = Some((slot, Verdict::TimedOut));
                    break;
                }
                match handle.outbox.recv_timeout::<PoolResponse>(POLL_INTERVAL) {
                    Ok(Some(response)) => {
                        found = Some((slot, Verdict::Responded(response)));
                        break;
                    }
                    Ok(None) => continue,
                    Err(_) => {
                        found = Some((slot, Verdict::Closed));
                        break;
                    }
                }
            }
            if let Some(found) = found {
                break found;
            }
        };

        let handle = in_flight.remove(slot);
        let _ = signal::kill(handle.pid, Signal::SIGKILL);
        let _ = waitpid(handle.pid, None);

        match verdict {
            Verdict::Responded(response) => match response.outcome {
                ItemOutcome::Ok(bytes) => {
                    collected.push((handle.index, suitkaise_serializer::decode(&bytes)?));
                }
                ItemOutcome::Panicked(message) => {
                    return Err(PoolError::Worker {
                        index: handle.index,
                        source: message,
                    });
                }
            },
            Verdict::TimedOut | Verdict::Closed => {
                return Err(PoolError::Timeout { index: handle.index });
            }
        }
    }

    Ok(collected)
}
