//! Runs a `WorkerSpec`'s full lifecycle inline inside a pool child, instead
//! of forking a further subprocess for it - `suitkaise-worker`'s own child
//! state machine always assumes it owns the whole process, so this is a
//! parallel, pool-specific driver rather than a reuse of that one, built the
//! same way from the same hooks.
//!
//! Per-section timeouts (`Config::timeouts`) are not enforced here: a
//! `Pool`'s own `.timeout(d)` already wraps the whole item (fatal, killed
//! from outside the process per `PoolError::Timeout`), and layering a
//! second, finer timeout underneath it would need the signal/helper-thread
//! machinery `suitkaise-worker::timeout` keeps private to that crate.
//! `lives`-bounded retries over `pre_run`/`run`/`post_run`, and the
//! single-attempt `on_finish`/`result`/`error` ordering, are both honored.

use suitkaise_channel::Channel;
use suitkaise_timing::{Recorder, Section};
use suitkaise_worker::{ResultEnvelope, WorkerContext, WorkerFailure, WorkerSpec};

enum IterationOutcome<E> {
    Completed,
    Failed(WorkerFailure<E>),
}

pub(crate) fn run_spec_inline<S: WorkerSpec>(mut spec: S) -> ResultEnvelope<S::Output, S::Err> {
    let config = spec.config();
    let mut recorder = Recorder::new();
    let mut current_run: u64 = 0;
    let mut last_error: Option<WorkerFailure<S::Err>> = None;

    // Nobody outside this item reads `listen_point` or writes `tell_point`'s
    // peer - `Pool`'s public API has no per-item tell/listen surface, so a
    // spec that calls `ctx.tell`/`ctx.listen` from inside a pool item is
    // talking to a channel with no listener on the other end.
    let (_listen_anchor, listen_point) =
        Channel::one_way_pair().expect("failed to create inline listen channel");
    let (_tell_anchor, tell_point) =
        Channel::one_way_pair_reversed().expect("failed to create inline tell channel");

    'outer: loop {
        if !config.runs.allows(current_run) {
            break 'outer;
        }
        let mut lives_remaining = config.lives;
        loop {
            let ctx = WorkerContext::new(&tell_point, &listen_point, current_run);
            match run_iteration(&mut spec, &ctx, &mut recorder, current_run) {
                IterationOutcome::Completed => {
                    recorder.commit_full_run();
                    current_run += 1;
                    break;
                }
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

    let ctx = WorkerContext::new(&tell_point, &listen_point, current_run);
    match last_error {
        Some(failure) => {
            let _ = run_timed::<S, _, _>(Section::Error, &mut recorder, current_run, || {
                spec.error(&ctx, &failure)
            });
            ResultEnvelope::Error {
                payload: failure,
                timings: recorder,
            }
        }
        None => {
            let on_finish = run_timed::<S, _, _>(Section::OnFinish, &mut recorder, current_run, || {
                spec.on_finish(&ctx)
            });
            if let Err(failure) = on_finish {
                return ResultEnvelope::Error {
                    payload: failure,
                    timings: recorder,
                };
            }
            match run_timed::<S, _, _>(Section::Result, &mut recorder, current_run, || {
                spec.result(&ctx)
            }) {
                Ok(payload) => ResultEnvelope::Result {
                    payload,
                    timings: recorder,
                },
                Err(failure) => ResultEnvelope::Error {
                    payload: failure,
                    timings: recorder,
                },
            }
        }
    }
}

fn run_iteration<S: WorkerSpec>(
    spec: &mut S,
    ctx: &WorkerContext,
    recorder: &mut Recorder,
    current_run: u64,
) -> IterationOutcome<S::Err> {
    if let Err(failure) = run_timed::<S, _, _>(Section::PreRun, recorder, current_run, || spec.pre_run(ctx)) {
        return IterationOutcome::Failed(failure);
    }
    if let Err(failure) = run_timed::<S, _, _>(Section::Run, recorder, current_run, || spec.run(ctx)) {
        return IterationOutcome::Failed(failure);
    }
    match run_timed::<S, _, _>(Section::PostRun, recorder, current_run, || spec.post_run(ctx)) {
        Ok(()) => IterationOutcome::Completed,
        Err(failure) => IterationOutcome::Failed(failure),
    }
}

fn run_timed<S, F, T>(
    section: Section,
    recorder: &mut Recorder,
    current_run: u64,
    f: F,
) -> Result<T, WorkerFailure<S::Err>>
where
    S: WorkerSpec,
    F: FnOnce() -> Result<T, S::Err>,
{
    recorder.start(section);
    match f() {
        Ok(value) => {
            recorder.stop(section);
            Ok(value)
        }
        Err(source) => {
            recorder.discard(section);
            Err(section_failure::<S>(section, current_run, source))
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

#[cfg(test)]
mod tests {
    use super::*;
    use suitkaise_worker::Config;
    use thiserror::Error;

    #[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
    #[error("counting failed")]
    struct NeverFails;

    struct CountToThree {
        seen: u64,
    }

    impl WorkerSpec for CountToThree {
        type Output = u64;
        type Err = NeverFails;

        fn config(&self) -> Config {
            Config::builder().runs(suitkaise_worker::Bound::limit(3)).build()
        }

        fn run(&mut self, _ctx: &WorkerContext) -> Result<(), Self::Err> {
            self.seen += 1;
            Ok(())
        }

        fn result(&mut self, _ctx: &WorkerContext) -> Result<Self::Output, Self::Err> {
            Ok(self.seen)
        }
    }

    #[test]
    fn runs_a_spec_to_completion_inline_and_returns_its_result() {
        let envelope = run_spec_inline(CountToThree { seen: 0 });
        match envelope {
            ResultEnvelope::Result { payload, .. } => assert_eq!(payload, 3),
            ResultEnvelope::Error { payload, .. } => panic!("unexpected failure: {payload}"),
        }
    }
}
