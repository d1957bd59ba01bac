//! Fast path: fork `workers` children once, round-robin-feed them every item
//! of the batch through a `crossbeam-channel` queue, tear them down when the
//! batch drains.

use std::thread;

use nix::unistd::{ForkResult, Pid};
use serde::de::DeserializeOwned;
use serde::Serialize;
use suitkaise_channel::{Anchor, Channel, RecvOnly, SendOnly};

use crate::child::run_pool_child;
use crate::error::PoolError;
use crate::message::{ItemOutcome, PoolMessage, PoolResponse};

struct ChildHandle {
    pid: Pid,
    inbox: Anchor<SendOnly>,
    outbox: Anchor<RecvOnly>,
}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        let _ = self.inbox.send(&PoolMessage::Shutdown);
        let _ = nix::sys::wait::waitpid(self.pid, None);
    }
}

/// Forks `workers` children that each loop on `f` until told to stop.
///
/// # Safety / ordering
/// All forks happen here, sequentially, before any thread in this process
/// is spawned - `fork()` is only sound from a single-threaded process.
fn spawn_children<F, T, O>(workers: usize, f: &F) -> Result<Vec<ChildHandle>, PoolError>
where
    F: Fn(T) -> O + Clone,
    T: DeserializeOwned,
    O: Serialize,
{
    let mut children = Vec::with_capacity(workers);
    for _ in 0..workers {
        let (inbox_anchor, inbox_point) = Channel::one_way_pair()?;
        let (outbox_anchor, outbox_point) = Channel::one_way_pair_reversed()?;
        let f = f.clone();
        // SAFETY: called before any other thread in this process exists.
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
                children.push(ChildHandle {
                    pid: child,
                    inbox: inbox_anchor,
                    outbox: outbox_anchor,
                });
            }
        }
    }
    Ok(children)
}

fn dispatch_one<T, O>(child: &mut ChildHandle, index: usize, item: T) -> Result<O, PoolError>
where
    T: Serialize,
    O: DeserializeOwned,
{
    let payload = suitkaise_serializer::encode(&item)?;
    child.inbox.send(&PoolMessage::Item {
        index: index as u64,
        payload,
    })?;
    let response: PoolResponse = child.outbox.recv()?;
    match response.outcome {
        ItemOutcome::Ok(bytes) => Ok(suitkaise_serializer::decode(&bytes)?),
        ItemOutcome::Panicked(message) => Err(PoolError::Worker {
            index,
            source: message,
        }),
    }
}

/// Runs every `(index, item)` pair in `work` through the pool, returning
/// `(index, outcome)` pairs in completion order. Aborts (drops the
/// remaining work queue, which tears down every child through `Drop`) on the
/// first error, per the "no silent skipping" contract.
pub(crate) fn run<F, T, O>(
    workers: usize,
    f: F,
    work: Vec<(usize, T)>,
) -> Result<Vec<(usize, O)>, PoolError>
where
    F: Fn(T) -> O + Clone + Send + Sync + 'static,
    T: Serialize + Send + 'static,
    O: Serialize + DeserializeOwned + Send + 'static,
{
    let children = spawn_children(workers, &f)?;
    let (work_tx, work_rx) = crossbeam_channel::unbounded::<(usize, T)>();
    let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, Result<O, PoolError>)>();

    for (index, item) in work {
        let _ = work_tx.send((index, item));
    }
    drop(work_tx);

    let expected = work_rx.len();
    thread::scope(|scope| {
        for mut child in children {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                while let Ok((index, item)) = work_rx.recv() {
                    let outcome = dispatch_one(&mut child, index, item);
                    if result_tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let mut collected = Vec::with_capacity(expected);
        let mut aborted = None;
        for _ in 0..expected {
            match result_rx.recv() {
                Ok((index, Ok(value))) => collected.push((index, value)),
                Ok((index, Err(err))) => {
                    aborted = Some((index, err));
                    break;
                }
                Err(_) => break,
            }
        }
        if let Some((_, err)) = aborted {
            return Err(err);
        }
        Ok(collected)
    })
}
