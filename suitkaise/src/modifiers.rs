//! Call-site modifier framework: `.timeout(d)`,
//! `.background()`, `.asynced()` compose over any eligible plain
//! synchronous operation - a `Worker`'s `wait`/`result`/`run`/`listen`, a
//! `Pool` map call, anything shaped as a plain closure. The core crates
//! expose operations with ordinary blocking signatures; this module is the
//! only place that reaches for a thread or an `async fn`.
//!
//! `.timeout(d)` may be set any number of times before the terminal
//! `.background()`/`.asynced()` call - the most recent value wins, which is
//! what makes the three modifiers chainable in any order the contract
//! calls for. There is no portable way to preempt an arbitrary `FnOnce`
//! mid-execution from outside its thread, so a timed-out operation keeps
//! running to completion in the background; only the caller stops waiting
//! on it.

use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModifierError {
    #[error("operation did not complete within the configured timeout")]
    TimedOut,
    #[error("the background thread panicked before producing a result")]
    Panicked,
}

/// Wraps a plain synchronous operation (`FnOnce() -> T`) so `.timeout()`,
/// `.background()`, and `.asynced()` can be composed over it.
pub struct Modifier<F> {
    op: F,
    timeout: Option<Duration>,
}

impl<F, T> Modifier<F>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    pub fn new(op: F) -> Self {
        Self { op, timeout: None }
    }

    /// Bound how long `.background()`'s `join` or `.asynced()`'s `await`
    /// will wait for `op` to finish.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run `op` on a dedicated OS thread, returning a handle the caller can
    /// block on with [`BackgroundHandle::join`] - the `background() ->
    /// Future<T>` modifier, realized as a `std::thread`-backed handle
    /// rather than a real `Future` (nothing here drives an executor).
    pub fn background(self) -> BackgroundHandle<T> {
        BackgroundHandle {
            handle: std::thread::spawn(self.op),
            timeout: self.timeout,
        }
    }

    /// Run `op` via `tokio::task::spawn_blocking`, returning a real
    /// `impl Future` - the `asynced() -> Awaitable<T>` modifier.
    pub async fn asynced(self) -> Result<T, ModifierError> {
        let task = tokio::task::spawn_blocking(self.op);
        match self.timeout {
            Some(d) => match tokio::time::timeout(d, task).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(_)) => Err(ModifierError::Panicked),
                Err(_) => Err(ModifierError::TimedOut),
            },
            None => task.await.map_err(|_| ModifierError::Panicked),
        }
    }
}

/// A [`Modifier::background`] run in flight.
pub struct BackgroundHandle<T> {
    handle: JoinHandle<T>,
    timeout: Option<Duration>,
}

impl<T: Send + 'static> BackgroundHandle<T> {
    /// Apply (or override) a timeout on an already-backgrounded operation,
    /// for the `.background().timeout(d)` ordering.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Block until the thread finishes, or until the configured timeout (if
    /// any) elapses first.
    pub fn join(self) -> Result<T, ModifierError> {
        match self.timeout {
            None => self.handle.join().map_err(|_| ModifierError::Panicked),
            Some(d) => join_with_timeout(self.handle, d),
        }
    }
}

fn join_with_timeout<T: Send + 'static>(
    handle: JoinHandle<T>,
    timeout: Duration,
) -> Result<T, ModifierError> {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(handle.join());
    });
    match rx.recv_timeout(timeout) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(ModifierError::Panicked),
        Err(_) => Err(ModifierError::TimedOut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_join_returns_the_computed_value() {
        let handle = Modifier::new(|| 2 + 2).background();
        assert_eq!(handle.join().unwrap(), 4);
    }

    #[test]
    fn background_timeout_reports_timed_out_while_the_thread_keeps_running() {
        let handle = Modifier::new(|| {
            std::thread::sleep(Duration::from_millis(200));
            1
        })
        .timeout(Duration::from_millis(20))
        .background();
        assert!(matches!(handle.join(), Err(ModifierError::TimedOut)));
    }

    #[test]
    fn timeout_set_after_background_is_still_honored() {
        let handle = Modifier::new(|| {
            std::thread::sleep(Duration::from_millis(200));
            1
        })
        .background()
        .timeout(Duration::from_millis(20));
        assert!(matches!(handle.join(), Err(ModifierError::TimedOut)));
    }

    #[tokio::test]
    async fn asynced_returns_the_computed_value() {
        let value = Modifier::new(|| 6 * 7).asynced().await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn asynced_with_timeout_reports_timed_out() {
        let result = Modifier::new(|| {
            std::thread::sleep(Duration::from_millis(200));
            1
        })
        .timeout(Duration::from_millis(20))
        .asynced()
        .await;
        assert!(matches!(result, Err(ModifierError::TimedOut)));
    }
}
