//! The child-side state machine: `Starting -> Looping -> Finishing ->
//! Done(result) | Erroring -> Done(error)`.
//!
//! Runs entirely inside the forked child; never returns (it always ends the
//! process itself) so the parent's stack frame at the `fork()` call site is
//! never resumed twice.

use std::time::{Duration, Instant};

use suitkaise_channel::{Point, RecvOnly, SendOnly};
use suitkaise_timing::{Recorder, Section};

use crate::config::{Bound, Config};
use crate::context::WorkerContext;
use crate::envelope::ResultEnvelope;
use crate::error::WorkerFailure;
use crate::shared_mem::SharedProgress;
use crate::spec::WorkerSpec;
use crate::timeout::{run_section, TimedOutcome};

/// Outcome of attempting one `{pre_run, run, post_run}` iteration.
enum IterationOutcome<E> {
    /// All three sections completed; the caller advances `current_run`.
    Completed,
    /// A stop was observed between two sections. Per `stop()`'s contract,
    /// the section already in flight was allowed to
    /// finish, but no further sections in this iteration ran - it does not
    /// count as a completed run and is not retried.
    Interrupted,
    /// A section failed or timed out.
    Failed(WorkerFailure<E>),
}

/// Runs `spec`'s lifecycle to completion and exits the process. Never
/// returns to the caller.
pub fn run_child<S: WorkerSpec>(
    mut spec: S,
    control: Point<SendOnly>,
    tell: Point<RecvOnly>,
    listen: Point<SendOnly>,
    shared: SharedProgress,
) -> ! {
    let config = spec.config();
    let mut recorder = Recorder::new();
    let start = Instant::now();
    let mut current_run: u64 = 0;
    let mut last_error: Option<WorkerFailure<S::Err>> = None;

    'outer: loop {
        if !continuation_allows(&config, current_run, start.elapsed(), &shared) {
            break 'outer;
        }

        let mut lives_remaining = config.lives;
        loop {
            if shared.stop_requested() {
                break 'outer;
            }
            let ctx = WorkerContext {
                tell: &listen,
                listen: &tell,
                current_run,
            };

            match run_iteration(&mut spec, &ctx, &config, &mut recorder, current_run, &shared) {
                IterationOutcome::Completed => {
                    recorder.commit_full_run();
                    current_run += 1;
                    shared.set_current_run(current_run);
                    break;
                }
                IterationOutcome::Interrupted => break 'outer,
                IterationOutcome::Failed(failure) => {
                    lives_remaining = lives_remaining.saturating_sub(1);
                    if lives_remaining > 0 {
                        continue;
                    }
                    last_error = Some(failure);
                    break 'outer;
                }
            }
        }
    }

    let envelope = match last_error {
        Some(failure) => {
            run_erroring(&mut spec, &config, &tell, &listen, current_run, &mut recorder, failure)
        }
        None => run_finishing(&mut spec, &config, &tell, &listen, current_run, &mut recorder),
    };

    // `control` carries the one-shot result envelope back to the parent;
    // the parent drains it before joining to avoid the multiprocessing
    // flush-deadlock.
    let _ = control.send(&envelope);
    drop(control);
    drop(tell);
    drop(listen);
    std::process::exit(0);
}

fn continuation_allows(
    config: &Config,
    current_run: u64,
    elapsed: Duration,
    shared: &SharedProgress,
) -> bool {
    // Order matters: stop, then run cap, then wall clock.
    !shared.stop_requested() && config.runs.allows(current_run) && config.join_in.allows(elapsed)
}

fn run_iteration<S: WorkerSpec>(
    spec: &mut S,
    ctx: &WorkerContext,
    config: &Config,
    recorder: &mut Recorder,
    current_run: u64,
    shared: &SharedProgress,
) -> IterationOutcome<S::Err> {
    match run_timed::<S, _, _>(
        recorder,
        Section::PreRun,
        config.timeouts.pre_run,
        current_run,
        || spec.pre_run(ctx),
    ) {
        Ok(()) => {}
        Err(failure) => return IterationOutcome::Failed(failure),
    }

    if shared.stop_requested() {
        return IterationOutcome::Interrupted;
    }

    match run_timed::<S, _, _>(
        recorder,
        Section::Run,
        config.timeouts.run,
        current_run,
        || spec.run(ctx),
    ) {
        Ok(()) => {}
        Err(failure) => return IterationOutcome::Failed(failure),
    }

    if shared.stop_requested() {
        return IterationOutcome::Interrupted;
    }

    match run_timed::<S, _, _>(
        recorder,
        Section::PostRun,
        config.timeouts.post_run,
        current_run,
        || spec.post_run(ctx),
    ) {
        Ok(()) => IterationOutcome::Completed,
        Err(failure) => IterationOutcome::Failed(failure),
    }
}

fn run_timed<S, F, T>(
    recorder: &mut Recorder,
    section: Section,
    timeout: Bound<Duration>,
    current_run: u64,
    f: F,
) -> Result<T, WorkerFailure<S::Err>>
where
    S: WorkerSpec,
    F: FnOnce() -> Result<T, S::Err>,
{
    recorder.start(section);
    match run_section(timeout, f) {
        TimedOutcome::Completed(Ok(value)) => {
            recorder.stop(section);
            Ok(value)
        }
        TimedOutcome::Completed(Err(source)) => {
            recorder.discard(section);
            Err(section_failure::<S>(section, current_run, source))
        }
        TimedOutcome::TimedOut => {
            recorder.discard(section);
            let timeout = match timeout {
                Bound::Limit(d) => d,
                Bound::Unbounded => unreachable!("a timed-out section always had a limit"),
            };
            Err(WorkerFailure::Timeout {
                section,
                timeout,
                current_run,
            })
        }
    }
}

fn section_failure<S: WorkerSpec>(
    section: Section,
    current_run: u64,
    source: S::Err,
) -> WorkerFailure<S::Err> {
    match section {
        Section::PreRun => WorkerFailure::PreRunError { current_run, source },
        Section::Run => WorkerFailure::RunError { current_run, source },
        Section::PostRun => WorkerFailure::PostRunError { current_run, source },
        Section::OnFinish => WorkerFailure::OnFinishError { current_run, source },
        Section::Result => WorkerFailure::ResultError { current_run, source },
        Section::Error => WorkerFailure::ErrorHandlerError { current_run, source },
        Section::FullRun => unreachable!("full_run is an aggregate, never an executed section"),
    }
}

fn run_finishing<S: WorkerSpec>(
    spec: &mut S,
    config: &Config,
    tell: &Point<RecvOnly>,
    listen: &Point<SendOnly>,
    current_run: u64,
    recorder: &mut Recorder,
) -> ResultEnvelope<S::Output, S::Err> {
    let ctx = WorkerContext {
        tell: listen,
        listen: tell,
        current_run,
    };

    // `on_finish`/`result` get a single attempt each at their own configured
    // timeout - neither participates in the `lives` budget
    // the three loop sections share.
    let on_finish = run_timed::<S, _, _>(
        recorder,
        Section::OnFinish,
        config.timeouts.on_finish,
        current_run,
        || spec.on_finish(&ctx),
    );
    if let Err(failure) = on_finish {
        return ResultEnvelope::Error {
            payload: failure,
            timings: recorder.clone(),
        };
    }

    let result = run_timed::<S, _, _>(
        recorder,
        Section::Result,
        config.timeouts.result,
        current_run,
        || spec.result(&ctx),
    );
    match result {
        Ok(payload) => ResultEnvelope::Result {
            payload,
            timings: recorder.clone(),
        },
        Err(failure) => ResultEnvelope::Error {
            payload: failure,
            timings: recorder.clone(),
        },
    }
}

fn run_erroring<S: WorkerSpec>(
    spec: &mut S,
    config: &Config,
    tell: &Point<RecvOnly>,
    listen: &Point<SendOnly>,
    current_run: u64,
    recorder: &mut Recorder,
    failure: WorkerFailure<S::Err>,
) -> ResultEnvelope<S::Output, S::Err> {
    let ctx = WorkerContext {
        tell: listen,
        listen: tell,
        current_run,
    };

    // The `error` hook's own failure falls back to the original failure
    // rather than replacing it - whatever went wrong
    // first is what the parent should see.
    let _ = run_timed::<S, _, _>(
        recorder,
        Section::Error,
        config.timeouts.error,
        current_run,
        || spec.error(&ctx, &failure),
    );

    ResultEnvelope::Error {
        payload: failure,
        timings: recorder.clone(),
    }
}
