//! CLI demo exercising each piece of the processing core end to end.

use std::convert::Infallible;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use suitkaise::{
    Bound, Config, DependencyMap, Pool, SharedObject, SharedStateBuilder, SharedStateProxy,
    Worker, WorkerContext, WorkerFailure, WorkerSpec,
};

#[derive(Parser)]
#[command(name = "suitkaise-demo")]
#[command(about = "Exercises the serializer/timing/channel/worker/pool/shared-state core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a worker 10 times and print its count (scenario 1).
    Counter,
    /// Run a worker that fails twice then recovers within a 3-life budget
    /// (scenario 2).
    Retry,
    /// Run a worker whose `run` section times out twice before succeeding
    /// (scenario 3).
    Timeout,
    /// Square 10 numbers across a 4-worker pool (scenario 4).
    PoolMap,
    /// Apply a starred pool op with a per-item timeout that kills the slow
    /// item (scenario 5).
    PoolStarTimeout,
    /// Increment a shared counter 20 times from two separate workers and
    /// read the converged total (scenario 6).
    SharedCounter,
    /// Run every scenario above in sequence.
    All,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Counter => counter()?,
        Commands::Retry => retry()?,
        Commands::Timeout => timeout()?,
        Commands::PoolMap => pool_map(),
        Commands::PoolStarTimeout => pool_star_timeout(),
        Commands::SharedCounter => shared_counter()?,
        Commands::All => {
            counter()?;
            retry()?;
            timeout()?;
            pool_map();
            pool_star_timeout();
            shared_counter()?;
        }
    }
    Ok(())
}

struct CountToTen {
    count: u64,
}

impl WorkerSpec for CountToTen {
    type Output = u64;
    type Err = Infallible;

    fn config(&self) -> Config {
        Config::builder().runs(Bound::limit(10)).build()
    }

    fn run(&mut self, _ctx: &WorkerContext) -> Result<(), Infallible> {
        self.count += 1;
        Ok(())
    }

    fn result(&mut self, _ctx: &WorkerContext) -> Result<u64, Infallible> {
        Ok(self.count)
    }
}

fn counter() -> anyhow::Result<()> {
    let mut worker = Worker::new(CountToTen { count: 0 });
    let count = worker.run()?;
    println!("counter: ran 10 times, count = {count}");
    Ok(())
}

#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("transient failure on attempt {0}")]
struct Transient(u64);

struct FlakyThenSucceeds {
    attempts: u64,
}

impl WorkerSpec for FlakyThenSucceeds {
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

    fn result(&mut self, _ctx: &WorkerContext) -> Result<u64, Transient> {
        Ok(self.attempts)
    }
}

fn retry() -> anyhow::Result<()> {
    let mut worker = Worker::new(FlakyThenSucceeds { attempts: 0 });
    let attempts = worker.run()?;
    println!("retry: recovered after {attempts} attempts (lives=3)");
    Ok(())
}

struct OneSlowIteration {
    current_run: u64,
}

impl WorkerSpec for OneSlowIteration {
    type Output = u64;
    type Err = Infallible;

    fn config(&self) -> Config {
        use suitkaise::Timeouts;
        Config::builder()
            .runs(Bound::limit(5))
            .timeouts(Timeouts {
                run: Bound::limit(Duration::from_millis(200)),
                ..Timeouts::default()
            })
            .build()
    }

    fn run(&mut self, ctx: &WorkerContext) -> Result<(), Infallible> {
        self.current_run = ctx.current_run();
        if self.current_run == 2 {
            std::thread::sleep(Duration::from_millis(400));
        }
        Ok(())
    }

    fn result(&mut self, _ctx: &WorkerContext) -> Result<u64, Infallible> {
        Ok(self.current_run)
    }
}

fn timeout() -> anyhow::Result<()> {
    // Default `lives = 1`: the third iteration's timeout exhausts the
    // retry budget on first failure and surfaces directly.
    let mut worker = Worker::new(OneSlowIteration { current_run: 0 });
    match worker.run() {
        Ok(current_run) => println!("timeout: completed all runs, last was {current_run}"),
        Err(suitkaise::WorkerError::Failure(WorkerFailure::Timeout { current_run, .. })) => {
            println!("timeout: run section timed out on iteration {current_run}");
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

fn pool_map() {
    let pool = Pool::new(4);
    let items: Vec<i32> = (1..=10).collect();
    let squares = pool.map(|x| x * x, items).expect("pool map failed");
    println!("pool-map: squares = {squares:?}");
}

fn pool_star_timeout() {
    let pool = Pool::new(2);
    let items: Vec<(u64, u64)> = vec![(0, 0), (0, 1), (500, 500)];
    match pool
        .star()
        .timeout(Duration::from_millis(200))
        .map(
            |a: u64, b: u64| {
                std::thread::sleep(Duration::from_millis(a + b));
                a + b
            },
            items,
        ) {
        Ok(sums) => println!("pool-star-timeout: sums = {sums:?}"),
        Err(suitkaise::PoolError::Timeout { index }) => {
            println!("pool-star-timeout: item {index} missed its deadline and was killed");
        }
        Err(err) => println!("pool-star-timeout: unexpected error: {err}"),
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct SharedCounter {
    count: u64,
}

impl SharedObject for SharedCounter {
    fn dependency_map() -> DependencyMap {
        DependencyMap::builder()
            .writes("increment", &["count"])
            .reads("count", &["count"])
            .build()
    }

    fn invoke(&mut self, method: &str, args: &[u8]) -> Result<(), suitkaise::SharedStateError> {
        match method {
            "increment" => {
                let by: u64 = suitkaise_serializer::decode(args)?;
                self.count += by;
                Ok(())
            }
            other => Err(suitkaise::SharedStateError::UnknownMethod(
                "shared-counter".to_string(),
                other.to_string(),
            )),
        }
    }

    fn read(&self, property: &str) -> Result<Vec<u8>, suitkaise::SharedStateError> {
        match property {
            "count" => Ok(suitkaise_serializer::encode(&self.count)?),
            other => Err(suitkaise::SharedStateError::UnknownProperty(
                "shared-counter".to_string(),
                other.to_string(),
            )),
        }
    }
}

struct Increment10 {
    socket: std::path::PathBuf,
}

impl WorkerSpec for Increment10 {
    type Output = ();
    type Err = Infallible;

    fn config(&self) -> Config {
        Config::builder().runs(Bound::limit(1)).build()
    }

    fn run(&mut self, _ctx: &WorkerContext) -> Result<(), Infallible> {
        let proxy: SharedStateProxy<SharedCounter> = SharedStateProxy::connect(&self.socket, "counter")
            .expect("connect to shared-state coordinator");
        for _ in 0..10 {
            proxy.invoke("increment", &1u64).expect("increment failed");
        }
        Ok(())
    }

    fn result(&mut self, _ctx: &WorkerContext) -> Result<(), Infallible> {
        Ok(())
    }
}

fn shared_counter() -> anyhow::Result<()> {
    let state = SharedStateBuilder::new()
        .register("counter", SharedCounter::default())
        .start()?;

    let mut first = Worker::new(Increment10 { socket: state.socket_path().to_path_buf() });
    let mut second = Worker::new(Increment10 { socket: state.socket_path().to_path_buf() });
    first.run()?;
    second.run()?;

    let proxy: SharedStateProxy<SharedCounter> = state.proxy("counter")?;
    let count: u64 = proxy.read("count")?;
    println!("shared-counter: two workers incremented 10 times each, total = {count}");
    Ok(())
}
