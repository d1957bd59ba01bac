//! Parent-side `Worker<S>` handle.
//!
//! `start`/`stop`/`kill`/`wait`/`result`/`run`/`tell`/
//! `listen`, plus introspection. The child is spawned with `fork()` rather
//! than a spawn-a-fresh-interpreter-and-decode model,
//! because `suitkaise_serializer` cannot turn an arbitrary
//! `WorkerSpec` trait implementation's code into bytes the way a dynamic
//! language's pickler can - see `crate::child` for the full rationale.

use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{ForkResult, Pid};
use serde::de::DeserializeOwned;
use serde::Serialize;

use suitkaise_channel::{Anchor, Channel, ChannelError, RecvOnly, SendOnly};
use suitkaise_timing::Recorder;

use crate::child::run_child;
use crate::envelope::ResultEnvelope;
use crate::error::WorkerError;
use crate::shared_mem::SharedProgress;
use crate::spec::WorkerSpec;

/// Parent-side handles left over once `start()` has forked a child.
struct Running<S: WorkerSpec> {
    pid: Pid,
    control: Anchor<RecvOnly>,
    tell: Anchor<SendOnly>,
    listen: Anchor<RecvOnly>,
    shared: SharedProgress,
    reaped: bool,
    envelope: Option<ResultEnvelope<S::Output, S::Err>>,
}

/// Executes one [`WorkerSpec`] in a subprocess under the lifecycle state
/// machine described in `crate::child`.
///
/// # Safety obligation
///
/// [`Worker::start`] calls `fork()` without `exec`. Per that call's own
/// safety contract, the calling process must be single-threaded at the
/// moment `start()` runs - a lock held by some other thread at fork time
/// (allocator internals, a mutex) stays locked forever in the child and can
/// deadlock it. Call `start()` before spinning up unrelated worker threads,
/// mirroring the reference corpus's own fork call site, which carries the
/// identical obligation.
pub struct Worker<S: WorkerSpec> {
    spec: Option<S>,
    running: Option<Running<S>>,
    timings: Recorder,
}

impl<S: WorkerSpec> Worker<S> {
    /// Build a worker around `spec`. Nothing runs until [`Worker::start`].
    pub fn new(spec: S) -> Self {
        Self {
            spec: Some(spec),
            running: None,
            timings: Recorder::new(),
        }
    }

    /// Fork the child and return immediately. Idempotent guard: fails with
    /// [`WorkerError::AlreadyStarted`] if this worker has already been
    /// started (or already consumed its spec via a prior `start`/`run`).
    #[tracing::instrument(skip(self))]
    pub fn start(&mut self) -> Result<(), WorkerError<S::Err>> {
        if self.running.is_some() {
            return Err(WorkerError::AlreadyStarted);
        }
        let spec = self.spec.take().ok_or(WorkerError::AlreadyStarted)?;

        let (control_anchor, control_point) = Channel::one_way_pair_reversed()?;
        let (tell_anchor, tell_point) = Channel::one_way_pair()?;
        let (listen_anchor, listen_point) = Channel::one_way_pair_reversed()?;
        let shared = SharedProgress::new()
            .map_err(|errno| WorkerError::Spawn(format!("mmap_anonymous failed: {errno}")))?;

        tracing::debug!("forking worker child");
        // SAFETY: caller contract documented on `Worker` above - `start()`
        // must run in a single-threaded process.
        let fork_result = unsafe { nix::unistd::fork() }
            .map_err(|errno| WorkerError::Spawn(format!("fork failed: {errno}")))?;

        match fork_result {
            ForkResult::Child => {
                drop(control_anchor);
                drop(tell_anchor);
                drop(listen_anchor);
                run_child(spec, control_point, tell_point, listen_point, shared);
            }
            ForkResult::Parent { child } => {
                drop(control_point);
                drop(tell_point);
                drop(listen_point);
                tracing::debug!(pid = child.as_raw(), "worker child spawned");
                self.running = Some(Running {
                    pid: child,
                    control: control_anchor,
                    tell: tell_anchor,
                    listen: listen_anchor,
                    shared,
                    reaped: false,
                    envelope: None,
                });
                Ok(())
            }
        }
    }

    /// Request graceful shutdown. Cooperative: the child finishes whatever
    /// section is already in flight, then proceeds straight to the finish
    /// sequence (`on_finish` -> `result`) rather than starting another
    /// iteration. A `stop` that arrives while `on_finish` itself is running
    /// is never honored mid-section - the
    /// child only ever checks the stop flag between sections and at the top
    /// of the loop.
    ///
    /// No-op if the worker was never started.
    pub fn stop(&self) {
        if let Some(running) = &self.running {
            running.shared.request_stop();
        }
    }

    /// Forceful termination via `SIGKILL`. No finish sequence runs and no
    /// result is ever produced; a subsequent [`Worker::result`] call fails
    /// with [`WorkerError::Killed`]. No-op if the worker was never started.
    pub fn kill(&mut self) -> Result<(), WorkerError<S::Err>> {
        let Some(running) = self.running.as_mut() else {
            return Ok(());
        };
        if running.reaped {
            return Ok(());
        }
        signal::kill(running.pid, Signal::SIGKILL)
            .map_err(|errno| WorkerError::Spawn(format!("kill failed: {errno}")))?;
        let _ = waitpid(running.pid, None);
        running.reaped = true;
        Ok(())
    }

    /// Block until the child exits, or until `timeout` elapses.
    /// `timeout = None` blocks indefinitely.
    ///
    /// Unlike [`Worker::result`], this does not drain the control channel
    /// first - calling `wait` directly on a worker whose `result` hook
    /// produced a payload larger than the pipe buffer can deadlock the same
    /// way a raw, undrained `join()` would.
    /// Prefer [`Worker::result`] (or [`Worker::run`]) unless the worker's
    /// output is known to be small and unread.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<(), WorkerError<S::Err>> {
        let Some(running) = self.running.as_mut() else {
            return Ok(());
        };
        if running.reaped {
            return Ok(());
        }
        let deadline = timeout.map(|d| Instant::now() + d);
        loop {
            match waitpid(running.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {
                    if let Some(deadline) = deadline {
                        if Instant::now() >= deadline {
                            return Err(WorkerError::WaitTimedOut);
                        }
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Ok(_) => {
                    running.reaped = true;
                    return Ok(());
                }
                Err(nix::errno::Errno::ECHILD) => {
                    running.reaped = true;
                    return Ok(());
                }
                Err(errno) => {
                    return Err(WorkerError::Spawn(format!("waitpid failed: {errno}")))
                }
            }
        }
    }

    /// Drain the one-shot result envelope (non-blocking probe, then a short
    /// blocking poll loop) without joining the child. Caches the envelope
    /// once received so a later call to [`Worker::result`] does not block
    /// again.
    fn drain_result(&mut self) -> Result<ResultEnvelope<S::Output, S::Err>, WorkerError<S::Err>> {
        let running = self.running.as_mut().ok_or(WorkerError::Killed)?;
        if let Some(envelope) = running.envelope.take() {
            return Ok(envelope);
        }
        loop {
            match running.control.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(envelope)) => return Ok(envelope),
                Ok(None) => continue,
                Err(ChannelError::Closed) => return Err(WorkerError::Killed),
                Err(e) => return Err(WorkerError::Channel(e)),
            }
        }
    }

    /// Return the value produced by the `result` hook, or the error taxon
    /// that ended the run.
    ///
    /// Policy: drain the result channel, then join the
    /// child, then drain once more. Draining before joining is what avoids
    /// the well-known multiprocessing flush-deadlock - if the child wrote a
    /// message larger than the pipe buffer and the parent joined first
    /// without reading, the child would block forever inside its own write
    /// while the parent blocks forever inside `wait`.
    #[tracing::instrument(skip(self))]
    pub fn result(&mut self) -> Result<S::Output, WorkerError<S::Err>> {
        let envelope = self.drain_result()?;
        self.wait(None)?;
        // Nothing more is ever sent after the one-shot envelope, but
        // draining again keeps the implementation honest against the
        // documented drain -> join -> drain policy.
        let _ = self.drain_result();

        let (outcome, timings) = match envelope {
            ResultEnvelope::Result { payload, timings } => (Ok(payload), timings),
            ResultEnvelope::Error { payload, timings } => {
                (Err(WorkerError::Failure(payload)), timings)
            }
        };
        self.timings = timings;
        outcome
    }

    /// Convenience: `start()` then `result()`.
    pub fn run(&mut self) -> Result<S::Output, WorkerError<S::Err>> {
        self.start()?;
        self.result()
    }

    /// Send `value` to the child; the child receives it via
    /// `WorkerContext::listen`.
    pub fn tell(&mut self, value: &impl Serialize) -> Result<(), WorkerError<S::Err>> {
        let running = self.running.as_mut().ok_or(WorkerError::Killed)?;
        running.tell.send(value).map_err(WorkerError::Channel)
    }

    /// Receive a value the child sent via `WorkerContext::tell`, blocking
    /// indefinitely.
    pub fn listen<T: DeserializeOwned>(&mut self) -> Result<T, WorkerError<S::Err>> {
        let running = self.running.as_mut().ok_or(WorkerError::Killed)?;
        running.listen.recv().map_err(WorkerError::Channel)
    }

    /// Receive a value the child sent via `WorkerContext::tell`, returning
    /// `None` if nothing arrives within `timeout`.
    pub fn listen_timeout<T: DeserializeOwned>(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<T>, WorkerError<S::Err>> {
        let running = self.running.as_mut().ok_or(WorkerError::Killed)?;
        running.listen.recv_timeout(timeout).map_err(WorkerError::Channel)
    }

    /// The final timing recorder, populated once [`Worker::result`] has
    /// returned. Empty before then.
    pub fn timings(&self) -> &Recorder {
        &self.timings
    }

    /// The 0-indexed iteration the child is currently executing (or most
    /// recently committed), read from the shared progress mapping without a
    /// round-trip through the channel. `0` if the worker has not started.
    pub fn current_run(&self) -> u64 {
        self.running.as_ref().map(|r| r.shared.current_run()).unwrap_or(0)
    }

    /// Whether the child process is still running. Reaps the child if it
    /// has already exited.
    pub fn is_alive(&mut self) -> bool {
        let Some(running) = self.running.as_mut() else {
            return false;
        };
        if running.reaped {
            return false;
        }
        match waitpid(running.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => true,
            Ok(_) => {
                running.reaped = true;
                false
            }
            Err(_) => false,
        }
    }
}

impl<S: WorkerSpec> Drop for Worker<S> {
    /// Best-effort zombie reap. Does not block - a worker whose child is
    /// still running when dropped leaves that child to finish on its own;
    /// callers that need guaranteed cleanup should `kill()` or `wait()`
    /// first.
    fn drop(&mut self) {
        if let Some(running) = self.running.as_mut() {
            if !running.reaped {
                let _ = waitpid(running.pid, Some(WaitPidFlag::WNOHANG));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Bound, Config};
    use crate::context::WorkerContext;
    use std::convert::Infallible;

    /// runs=10, `run` increments a counter,
    /// `result` returns it.
    struct Counter {
        count: u64,
    }

    impl WorkerSpec for Counter {
        type Output = u64;
        type Err = Infallible;

        fn config(&self) -> Config {
            Config::builder().runs(Bound::limit(10)).build()
        }

        fn run(&mut self, _ctx: &WorkerContext) -> Result<(), Infallible> {
            self.count += 1;
            Ok(())
        }

        fn result(&mut self, _ctx: &WorkerContext) -> Result<Self::Output, Infallible> {
            Ok(self.count)
        }
    }

    /// `lives=3`, fails twice, succeeds on the
    /// third attempt.
    struct FlakyThenCounts {
        attempts: u64,
    }

    #[derive(Debug, Clone, thiserror::Error, serde::Serialize, serde::Deserialize)]
    #[error("transient failure on attempt {0}")]
    struct Transient(u64);

    impl WorkerSpec for FlakyThenCounts {
        type Output = u64;
        type Err = Transient;

        fn config(&self) -> Config {
            Config::builder().runs(Bound::limit(1)).lives(3).build()
        }

        fn run(&mut self, _ctx: &WorkerContext) -> Result<(), Transient> {
            self.attempts += 1;
            if self.attempts < 3 {
                Err(Transient(self.attempts))
            } else {
                Ok(())
            }
        }

        fn result(&mut self, _ctx: &WorkerContext) -> Result<Self::Output, Transient> {
            Ok(self.attempts)
        }
    }

    // These tests fork a real child process; they must run single-threaded
    // (`cargo test -- --test-threads=1`) per `Worker::start`'s safety
    // obligation - forking from a multi-threaded test harness process is
    // the exact hazard that contract warns about.

    #[test]
    fn counter_runs_ten_times_and_returns_ten() {
        let mut worker = Worker::new(Counter { count: 0 });
        let result = worker.run().unwrap();
        assert_eq!(result, 10);
        assert_eq!(worker.timings().count(suitkaise_timing::Section::Run), 10);
    }

    #[test]
    fn retried_run_recovers_within_lives_budget() {
        let mut worker = Worker::new(FlakyThenCounts { attempts: 0 });
        let result = worker.run().unwrap();
        assert_eq!(result, 3);
        assert_eq!(worker.timings().count(suitkaise_timing::Section::Error), 0);
    }

    #[test]
    fn starting_twice_fails_with_already_started() {
        let mut worker = Worker::new(Counter { count: 0 });
        worker.start().unwrap();
        let err = worker.start().unwrap_err();
        assert!(matches!(err, WorkerError::AlreadyStarted));
        worker.kill().unwrap();
    }

    #[test]
    fn kill_before_result_surfaces_killed() {
        struct Forever;
        impl WorkerSpec for Forever {
            type Output = ();
            type Err = Infallible;
            fn run(&mut self, _ctx: &WorkerContext) -> Result<(), Infallible> {
                std::thread::sleep(Duration::from_secs(3600));
                Ok(())
            }
            fn result(&mut self, _ctx: &WorkerContext) -> Result<(), Infallible> {
                Ok(())
            }
        }

        let mut worker = Worker::new(Forever);
        worker.start().unwrap();
        worker.kill().unwrap();
        let err = worker.result().unwrap_err();
        assert!(matches!(err, WorkerError::Killed));
    }

    #[test]
    fn tell_and_listen_round_trip_between_parent_and_child() {
        struct Echo;
        impl WorkerSpec for Echo {
            type Output = ();
            type Err = Infallible;
            fn config(&self) -> Config {
                Config::builder().runs(Bound::limit(1)).build()
            }
            fn run(&mut self, ctx: &WorkerContext) -> Result<(), Infallible> {
                let received: u32 = ctx.listen().unwrap();
                ctx.tell(&(received * 2)).unwrap();
                Ok(())
            }
            fn result(&mut self, _ctx: &WorkerContext) -> Result<(), Infallible> {
                Ok(())
            }
        }

        let mut worker = Worker::new(Echo);
        worker.start().unwrap();
        worker.tell(&21u32).unwrap();
        let doubled: u32 = worker.listen().unwrap();
        assert_eq!(doubled, 42);
        worker.result().unwrap();
    }
}
