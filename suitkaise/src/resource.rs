//! Scoped resource helpers: guarantee a `Pool` or shared-state coordinator
//! is released on every exit path out of a scope, panics included.

use std::ops::Deref;
use std::time::Duration;

use suitkaise_pool::Pool;
use suitkaise_shared_state::{SharedState, SharedStateBuilder, SharedStateError};

/// Owns a [`Pool`] for a scope. `Pool` holds no live resources between
/// calls on its own, but this gives callers the same RAII shape as
/// [`CoordinatorGuard`] and a natural home for [`with_pool`].
pub struct PoolGuard {
    pool: Pool,
}

impl PoolGuard {
    pub fn new(workers: usize) -> Self {
        Self { pool: Pool::new(workers) }
    }
}

impl Deref for PoolGuard {
    type Target = Pool;
    fn deref(&self) -> &Pool {
        &self.pool
    }
}

/// Run `body` with a freshly built [`Pool`] of `workers` workers.
pub fn with_pool<R>(workers: usize, body: impl FnOnce(&Pool) -> R) -> R {
    let guard = PoolGuard::new(workers);
    body(&guard)
}

/// Owns a running shared-state coordinator for a scope, stopping it on
/// drop - a best-effort `stop` with a fixed grace period, since `Drop`
/// cannot propagate the [`SharedStateError`] a deliberate
/// [`SharedState::stop`] call could return.
pub struct CoordinatorGuard {
    state: Option<SharedState>,
    stop_timeout: Duration,
}

impl CoordinatorGuard {
    pub fn new(builder: SharedStateBuilder, stop_timeout: Duration) -> Result<Self, SharedStateError> {
        Ok(Self {
            state: Some(builder.start()?),
            stop_timeout,
        })
    }
}

impl Deref for CoordinatorGuard {
    type Target = SharedState;
    fn deref(&self) -> &SharedState {
        self.state.as_ref().expect("CoordinatorGuard used after drop")
    }
}

impl Drop for CoordinatorGuard {
    fn drop(&mut self) {
        if let Some(mut state) = self.state.take() {
            let _ = state.stop(self.stop_timeout);
        }
    }
}

/// Build and run a coordinator for the lifetime of `body`, guaranteeing
/// `stop(stop_timeout)` runs on every exit path out of `body`, including a
/// panic.
pub fn with_coordinator<R>(
    builder: SharedStateBuilder,
    stop_timeout: Duration,
    body: impl FnOnce(&SharedState) -> R,
) -> Result<R, SharedStateError> {
    let guard = CoordinatorGuard::new(builder, stop_timeout)?;
    Ok(body(&guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_pool_runs_a_map_over_the_scoped_pool() {
        let result = with_pool(2, |pool| pool.map(|x: i32| x * 2, vec![1, 2, 3]).unwrap());
        assert_eq!(result, vec![2, 4, 6]);
    }
}
