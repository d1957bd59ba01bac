use crate::config::Config;
use crate::context::WorkerContext;

/// A user-authored description of work to run inside one [`crate::Worker`]
/// subprocess.
///
/// Every lifecycle hook is an explicit trait method rather than something
/// discovered by inspecting the implementor at definition time - no hidden
/// code rewriting. All hooks except
/// [`result`][WorkerSpec::result] have a no-op default - an implementor only
/// needs to override the ones it cares about.
///
/// `Output` and `Err` must be `Send + 'static` so a spawned child can own
/// them across the fork, and `Serialize`/`DeserializeOwned` + `Clone` so the
/// final value can be shipped back to the parent inside a `ResultEnvelope`
/// and `WorkerFailure<Err>` can be cloned when falling back to the original
/// error if the `error` hook itself fails.
pub trait WorkerSpec: Send + 'static {
    type Output: serde::Serialize + serde::de::DeserializeOwned + Send + 'static;
    type Err: std::error::Error
        + serde::Serialize
        + serde::de::DeserializeOwned
        + Clone
        + Send
        + 'static;

    /// Configuration for this spec's run. Called once, in the child, right
    /// after the fork.
    fn config(&self) -> Config {
        Config::default()
    }

    /// Runs before [`run`][WorkerSpec::run] each iteration.
    fn pre_run(&mut self, _ctx: &WorkerContext) -> Result<(), Self::Err> {
        Ok(())
    }

    /// The unit of work repeated `config().runs` times.
    fn run(&mut self, _ctx: &WorkerContext) -> Result<(), Self::Err> {
        Ok(())
    }

    /// Runs after [`run`][WorkerSpec::run] each iteration.
    fn post_run(&mut self, _ctx: &WorkerContext) -> Result<(), Self::Err> {
        Ok(())
    }

    /// Runs exactly once, after the loop exits cleanly. Not retried.
    fn on_finish(&mut self, _ctx: &WorkerContext) -> Result<(), Self::Err> {
        Ok(())
    }

    /// Produces the value delivered to the parent's `Worker::result()`.
    /// Not retried.
    fn result(&mut self, ctx: &WorkerContext) -> Result<Self::Output, Self::Err>;

    /// Runs exactly once if the loop exhausted its `lives` without
    /// recovering. Receives the failure that exhausted the budget; its own
    /// failure is swallowed and the original failure is surfaced instead.
    /// Not retried.
    fn error(
        &mut self,
        _ctx: &WorkerContext,
        _failure: &crate::error::WorkerFailure<Self::Err>,
    ) -> Result<(), Self::Err> {
        Ok(())
    }
}
