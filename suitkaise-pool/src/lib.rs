//! Bounded parallel execution of a plain function or a `WorkerSpec` over an
//! iterable, dispatching to child processes rather than threads.
//!
//! A [`Pool`] spins up `workers` forked children for the lifetime of one
//! `map`/`unordered_map`/`imap`/`unordered_imap` call, dispatches
//! `(item_index, encoded_item)` to them, and collects `(index, outcome)`
//! pairs back. `.star()` unpacks tuple items as positional arguments;
//! `.timeout(d)` switches from the reusable-pool fast path to a
//! one-process-per-item slow path that kills a child that misses its
//! deadline. `.background()`/`.asynced()` are not part of this crate - they
//! are call-site adapters over these synchronous operations, implemented in
//! the `suitkaise` facade crate.

mod child;
mod engine;
mod error;
mod fast;
mod message;
mod slow;
mod spec_runner;
mod star;

pub use error::PoolError;
pub use star::StarApply;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use suitkaise_worker::{ResultEnvelope, WorkerSpec};

use engine::Sequencing;

/// A bounded set of worker subprocesses, reused for the duration of one
/// dispatch.
///
/// `Pool` itself holds no live child processes between calls - see
/// [`PoolOp`] for why a pool's "reusability" is scoped to the items of a
/// single call rather than to the `Pool` value's whole lifetime.
pub struct Pool {
    workers: usize,
}

impl Pool {
    /// `workers` must be at least 1.
    pub fn new(workers: usize) -> Self {
        assert!(workers >= 1, "a pool needs at least one worker");
        Self { workers }
    }

    /// A pool sized to the host's available parallelism, the usual default
    /// for a CPU-bound `map` when the caller has no specific worker count in
    /// mind.
    pub fn new_default() -> Self {
        Self::new(num_cpus::get().max(1))
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Treat each item as a tuple, unpacked as positional arguments to the
    /// target function. Composes with `.timeout(d)` in either order.
    pub fn star(&self) -> StarredPoolOp<'_> {
        StarredPoolOp::new(self)
    }

    /// Per-operation deadline. Switches dispatch to the one-process-per-item
    /// path so a slow item can be killed without disturbing the others.
    pub fn timeout(&self, timeout: Duration) -> PoolOp<'_> {
        PoolOp::new(self).timeout(timeout)
    }

    pub fn map<F, T, O>(&self, f: F, items: Vec<T>) -> Result<Vec<O>, PoolError>
    where
        F: Fn(T) -> O + Clone + Send + Sync + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        PoolOp::new(self).map(f, items)
    }

    pub fn unordered_map<F, T, O>(&self, f: F, items: Vec<T>) -> Result<Vec<O>, PoolError>
    where
        F: Fn(T) -> O + Clone + Send + Sync + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        PoolOp::new(self).unordered_map(f, items)
    }

    pub fn imap<F, T, O>(&self, f: F, items: Vec<T>) -> Result<std::vec::IntoIter<O>, PoolError>
    where
        F: Fn(T) -> O + Clone + Send + Sync + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        PoolOp::new(self).imap(f, items)
    }

    pub fn unordered_imap<F, T, O>(
        &self,
        f: F,
        items: Vec<T>,
    ) -> Result<std::vec::IntoIter<O>, PoolError>
    where
        F: Fn(T) -> O + Clone + Send + Sync + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        PoolOp::new(self).unordered_imap(f, items)
    }

    /// `map`, but the target is instantiated per item as a `WorkerSpec` and
    /// run through its full lifecycle (`pre_run`/`run`/`post_run` under
    /// `lives`, then `on_finish`/`result` or `error`) inline in the child
    /// that already provides the process boundary - no grandchild is
    /// spawned per item.
    pub fn map_spec<S, F, T>(
        &self,
        make_spec: F,
        items: Vec<T>,
    ) -> Result<Vec<ResultEnvelope<S::Output, S::Err>>, PoolError>
    where
        S: WorkerSpec,
        F: Fn(T) -> S + Clone + Send + Sync + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        PoolOp::new(self).map_spec(make_spec, items)
    }

    pub fn unordered_map_spec<S, F, T>(
        &self,
        make_spec: F,
        items: Vec<T>,
    ) -> Result<Vec<ResultEnvelope<S::Output, S::Err>>, PoolError>
    where
        S: WorkerSpec,
        F: Fn(T) -> S + Clone + Send + Sync + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        PoolOp::new(self).unordered_map_spec(make_spec, items)
    }
}

/// A `Pool` operation under construction, accumulating a `.timeout(d)`
/// modifier before a terminal `map`/`unordered_map`/`imap`/`unordered_imap`
/// call. `.star()` switches to [`StarredPoolOp`] instead, since unpacking
/// changes the shape of the function `map` accepts.
///
/// A true "reusable pool of child processes" persisting across separate
/// `map` calls is not possible here: a forked child's memory image is fixed
/// at fork time, and each call's target function is a distinct, differently
/// typed closure. What *is* reusable, and what the fast path actually
/// reuses, is the pool of children *within* one call - they are forked once
/// and handle every item of that call's batch before exiting.
pub struct PoolOp<'p> {
    pool: &'p Pool,
    timeout: Option<Duration>,
}

impl<'p> PoolOp<'p> {
    fn new(pool: &'p Pool) -> Self {
        Self {
            pool,
            timeout: None,
        }
    }

    pub fn star(self) -> StarredPoolOp<'p> {
        StarredPoolOp {
            pool: self.pool,
            timeout: self.timeout,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn map<F, T, O>(self, f: F, items: Vec<T>) -> Result<Vec<O>, PoolError>
    where
        F: Fn(T) -> O + Clone + Send + Sync + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        engine::run_batch(self.pool.workers, self.timeout, f, items, Sequencing::Ordered)
    }

    pub fn unordered_map<F, T, O>(self, f: F, items: Vec<T>) -> Result<Vec<O>, PoolError>
    where
        F: Fn(T) -> O + Clone + Send + Sync + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        engine::run_batch(self.pool.workers, self.timeout, f, items, Sequencing::Unordered)
    }

    /// Resolves eagerly and returns the `Vec`'s iterator. A lazily streaming
    /// `imap` would need to keep dispatcher threads and children alive
    /// across `.next()` calls; this pool tears both down at the end of one
    /// `map`-shaped call, so the eager collection's input-order guarantee is
    /// all `imap` adds over `map` here.
    pub fn imap<F, T, O>(self, f: F, items: Vec<T>) -> Result<std::vec::IntoIter<O>, PoolError>
    where
        F: Fn(T) -> O + Clone + Send + Sync + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        Ok(self.map(f, items)?.into_iter())
    }

    pub fn unordered_imap<F, T, O>(
        self,
        f: F,
        items: Vec<T>,
    ) -> Result<std::vec::IntoIter<O>, PoolError>
    where
        F: Fn(T) -> O + Clone + Send + Sync + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        Ok(self.unordered_map(f, items)?.into_iter())
    }

    pub fn map_spec<S, F, T>(
        self,
        make_spec: F,
        items: Vec<T>,
    ) -> Result<Vec<ResultEnvelope<S::Output, S::Err>>, PoolError>
    where
        S: WorkerSpec,
        F: Fn(T) -> S + Clone + Send + Sync + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let run_one = move |item: T| spec_runner::run_spec_inline(make_spec(item));
        self.map(run_one, items)
    }

    pub fn unordered_map_spec<S, F, T>(
        self,
        make_spec: F,
        items: Vec<T>,
    ) -> Result<Vec<ResultEnvelope<S::Output, S::Err>>, PoolError>
    where
        S: WorkerSpec,
        F: Fn(T) -> S + Clone + Send + Sync + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let run_one = move |item: T| spec_runner::run_spec_inline(make_spec(item));
        self.unordered_map(run_one, items)
    }
}

/// Same as [`PoolOp`], but `map`/`unordered_map`/`imap`/`unordered_imap`
/// take an item that unpacks into `f`'s positional arguments instead of a
/// single value - `pool.star().map(f, items)` is exactly `pool.map(|t|
/// f(*t), items)` for any pure `f`, realized here by wrapping `f` in a
/// closure that calls [`StarApply::star_apply`] before handing it to the
/// same dispatch engine [`PoolOp`] uses.
pub struct StarredPoolOp<'p> {
    pool: &'p Pool,
    timeout: Option<Duration>,
}

impl<'p> StarredPoolOp<'p> {
    fn new(pool: &'p Pool) -> Self {
        Self {
            pool,
            timeout: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn unstarred(self) -> PoolOp<'p> {
        PoolOp {
            pool: self.pool,
            timeout: self.timeout,
        }
    }

    pub fn map<F, Args, O>(self, f: F, items: Vec<Args>) -> Result<Vec<O>, PoolError>
    where
        F: Clone + Send + Sync + 'static,
        Args: StarApply<F, O> + Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        self.unstarred()
            .map(move |item: Args| item.star_apply(&f), items)
    }

    pub fn unordered_map<F, Args, O>(self, f: F, items: Vec<Args>) -> Result<Vec<O>, PoolError>
    where
        F: Clone + Send + Sync + 'static,
        Args: StarApply<F, O> + Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        self.unstarred()
            .unordered_map(move |item: Args| item.star_apply(&f), items)
    }

    pub fn imap<F, Args, O>(
        self,
        f: F,
        items: Vec<Args>,
    ) -> Result<std::vec::IntoIter<O>, PoolError>
    where
        F: Clone + Send + Sync + 'static,
        Args: StarApply<F, O> + Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        Ok(self.map(f, items)?.into_iter())
    }

    pub fn unordered_imap<F, Args, O>(
        self,
        f: F,
        items: Vec<Args>,
    ) -> Result<std::vec::IntoIter<O>, PoolError>
    where
        F: Clone + Send + Sync + 'static,
        Args: StarApply<F, O> + Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        Ok(self.unordered_map(f, items)?.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_default_sizes_to_available_parallelism() {
        let pool = Pool::new_default();
        assert_eq!(pool.workers(), num_cpus::get().max(1));
    }

    #[test]
    fn map_preserves_input_order() {
        let pool = Pool::new(4);
        let items: Vec<i32> = (1..=10).collect();
        let result = pool.map(|x| x * x, items).unwrap();
        assert_eq!(result, vec![1, 4, 9, 16, 25, 36, 49, 64, 81, 100]);
    }

    #[test]
    fn map_runs_with_a_single_worker_too() {
        let pool = Pool::new(1);
        let items: Vec<i32> = (1..=5).collect();
        let result = pool.map(|x| x * 2, items).unwrap();
        assert_eq!(result, vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn unordered_map_returns_every_item_regardless_of_order() {
        let pool = Pool::new(4);
        let items: Vec<i32> = (1..=10).collect();
        let mut result = pool.unordered_map(|x| x * x, items).unwrap();
        result.sort_unstable();
        assert_eq!(result, vec![1, 4, 9, 16, 25, 36, 49, 64, 81, 100]);
    }

    #[test]
    fn imap_yields_in_input_order() {
        let pool = Pool::new(2);
        let items: Vec<i32> = vec![3, 1, 2];
        let result: Vec<i32> = pool.imap(|x| x * 10, items).unwrap().collect();
        assert_eq!(result, vec![30, 10, 20]);
    }

    #[test]
    fn a_panicking_item_surfaces_as_a_worker_error_with_its_index() {
        let pool = Pool::new(2);
        let items: Vec<i32> = vec![1, 2, 3];
        let err = pool
            .map(
                |x| {
                    if x == 2 {
                        panic!("boom");
                    }
                    x
                },
                items,
            )
            .unwrap_err();
        assert!(matches!(err, PoolError::Worker { index: 1, .. }));
    }

    #[test]
    fn timeout_kills_the_slow_item_and_reports_its_index() {
        let pool = Pool::new(2);
        let items: Vec<u64> = vec![0, 50, 0];
        let err = pool
            .timeout(Duration::from_millis(100))
            .map(
                |millis| {
                    std::thread::sleep(Duration::from_millis(millis));
                    millis
                },
                items,
            )
            .unwrap_err();
        assert!(matches!(err, PoolError::Timeout { index: 1 }));
    }

    #[test]
    fn star_unpacks_tuples_as_positional_args() {
        let pool = Pool::new(2);
        let items: Vec<(i32, i32)> = vec![(1, 2), (3, 4)];
        let result = pool.star().map(|a: i32, b: i32| a + b, items).unwrap();
        assert_eq!(result, vec![3, 7]);
    }

    #[test]
    fn star_composes_with_timeout() {
        let pool = Pool::new(2);
        let items: Vec<(u64, u64)> = vec![(0, 0), (0, 1), (5, 5)];
        let err = pool
            .star()
            .timeout(Duration::from_millis(200))
            .map(
                |a: u64, b: u64| {
                    std::thread::sleep(Duration::from_millis(a + b));
                    a + b
                },
                items,
            )
            .unwrap_err();
        assert!(matches!(err, PoolError::Timeout { index: 2 }));
    }
}
