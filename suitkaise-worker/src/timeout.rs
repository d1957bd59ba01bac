//! Two platform timeout strategies, selected at compile time by the
//! `signals` feature (on by default on unix).
//!
//! Neither strategy can truly preempt a tight CPU-bound loop in the section
//! closure - that would need stack unwinding from a signal handler, which
//! this crate does not attempt. What they do guarantee: the caller always
//! gets a verdict (completed or timed out) by the deadline, even if the
//! section itself is still running in the background afterward.

use std::time::Duration;

use crate::config::Bound;

/// The outcome of running a section under a deadline.
pub enum TimedOutcome<T, E> {
    Completed(Result<T, E>),
    TimedOut,
}

#[cfg(feature = "signals")]
mod strategy {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use nix::sys::signal::{self, SigHandler, Signal};
    use nix::unistd::alarm;

    static ALARM_FIRED: AtomicBool = AtomicBool::new(false);

    extern "C" fn handle_alarm(_: i32) {
        ALARM_FIRED.store(true, Ordering::SeqCst);
    }

    /// Arms `SIGALRM` for `⌈timeout⌉ + 1` seconds, runs `f` inline, then reports whether
    /// the alarm fired. A fired alarm interrupts blocking syscalls inside
    /// `f` with `EINTR`; it does not interrupt a CPU-bound loop that never
    /// calls into the kernel.
    pub fn run_with_alarm<F, T>(timeout: Duration, f: F) -> (T, bool)
    where
        F: FnOnce() -> T,
    {
        ALARM_FIRED.store(false, Ordering::SeqCst);
        let seconds = timeout.as_secs_f64().ceil() as u32 + 1;
        // SAFETY: the handler only performs an atomic store, which is
        // async-signal-safe.
        unsafe {
            signal::signal(Signal::SIGALRM, SigHandler::Handler(handle_alarm))
                .expect("failed to install SIGALRM handler");
        }
        alarm::set(seconds);
        let result = f();
        alarm::cancel();
        (result, ALARM_FIRED.swap(false, Ordering::SeqCst))
    }
}

#[cfg(feature = "signals")]
pub fn run_section<F, T, E>(timeout: Bound<Duration>, f: F) -> TimedOutcome<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    match timeout {
        Bound::Unbounded => TimedOutcome::Completed(f()),
        Bound::Limit(duration) => {
            let (result, timed_out) = strategy::run_with_alarm(duration, f);
            if timed_out {
                TimedOutcome::TimedOut
            } else {
                TimedOutcome::Completed(result)
            }
        }
    }
}

/// Portable fallback: run the section on a helper thread, wait on a
/// completion channel with a timeout. Cannot interrupt blocking I/O inside
/// `f` - the helper keeps running, detached, even after this function
/// returns `TimedOut`. This is a known limitation of non-signal hosts.
///
/// `F: 'static` is required, not just `Send`: a detached thread that outlives
/// this call must not hold a borrow into the caller's stack frame (the
/// caller, e.g. `crate::child::run_timed`, keeps using its own state - the
/// spec hook, the recorder - immediately after observing `TimedOut`, which a
/// borrowed, still-running helper thread could otherwise race with). Callers
/// on a non-signal host therefore need an owned section closure here, unlike
/// the signal strategy above which runs `f` inline and never detaches
/// anything.
#[cfg(not(feature = "signals"))]
pub fn run_section<F, T, E>(timeout: Bound<Duration>, f: F) -> TimedOutcome<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    match timeout {
        Bound::Unbounded => TimedOutcome::Completed(f()),
        Bound::Limit(duration) => {
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = tx.send(f());
            });
            match rx.recv_timeout(duration) {
                Ok(result) => TimedOutcome::Completed(result),
                Err(_) => TimedOutcome::TimedOut,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_runs_immediately() {
        let outcome: TimedOutcome<i32, ()> = run_section(Bound::Unbounded, || Ok(7));
        match outcome {
            TimedOutcome::Completed(Ok(v)) => assert_eq!(v, 7),
            _ => panic!("expected a completed Ok"),
        }
    }

    #[test]
    fn bounded_section_that_finishes_in_time_completes() {
        let outcome: TimedOutcome<i32, ()> =
            run_section(Bound::limit(Duration::from_millis(500)), || Ok(3));
        match outcome {
            TimedOutcome::Completed(Ok(v)) => assert_eq!(v, 3),
            _ => panic!("expected a completed Ok"),
        }
    }

    #[test]
    #[cfg(not(feature = "signals"))]
    fn bounded_section_that_overruns_times_out() {
        let outcome: TimedOutcome<(), ()> = run_section(Bound::limit(Duration::from_millis(20)), || {
            std::thread::sleep(Duration::from_secs(2));
            Ok(())
        });
        assert!(matches!(outcome, TimedOutcome::TimedOut));
    }
}
