//! Parent-side `SharedStateBuilder`/`SharedState` handles: coordinator
//! lifecycle (start/stop/clear/reconnect) and object registration.

use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{ForkResult, Pid};
use serde::Serialize;

use crate::coordinator::{self, ObjectEntry, Registry};
use crate::dependency::DependencyMap;
use crate::error::SharedStateError;
use crate::object::{ErasedObject, SharedObject};
use crate::protocol::{Request, Response};
use crate::proxy::SharedStateProxy;

/// Accumulates objects before the coordinator process exists.
///
/// Objects must be registered here, before [`SharedStateBuilder::start`],
/// not afterward - the coordinator gets its dispatch code (each object's
/// `invoke`/`read` vtable) for free via `fork()`'s copy-on-write, the same
/// reason `suitkaise-worker`'s `Worker::start` takes a whole `WorkerSpec`
/// rather than letting one be attached to an already-running child (see
/// that crate's `parent.rs`). There is no channel that could carry an
/// arbitrary new `SharedObject` implementation's code into an
/// already-running coordinator.
#[derive(Default)]
pub struct SharedStateBuilder {
    objects: Vec<(String, Box<dyn ErasedObject>, DependencyMap)>,
}

impl SharedStateBuilder {
    pub fn new() -> Self {
        Self { objects: Vec::new() }
    }

    /// Register `value` under `name`. Its
    /// [`SharedObject::dependency_map`] is captured once, here.
    pub fn register<T: SharedObject>(mut self, name: impl Into<String>, value: T) -> Self {
        let dependency_map = T::dependency_map();
        self.objects.push((name.into(), Box::new(value), dependency_map));
        self
    }

    /// Fork the coordinator process and return a handle to it.
    ///
    /// # Safety obligation
    /// Like [`suitkaise_worker::Worker::start`], this calls `fork()` without
    /// `exec` and must run from a single-threaded process.
    pub fn start(self) -> Result<SharedState, SharedStateError> {
        let socket_path = unique_socket_path();
        let listener =
            UnixListener::bind(&socket_path).map_err(|e| SharedStateError::Spawn(format!("bind failed: {e}")))?;

        tracing::debug!(path = %socket_path.display(), "forking shared-state coordinator");
        // SAFETY: caller contract documented above.
        let fork_result = unsafe { nix::unistd::fork() }
            .map_err(|errno| SharedStateError::Spawn(format!("fork failed: {errno}")))?;

        match fork_result {
            ForkResult::Child => {
                let registry: Registry = DashMap::new();
                for (name, inner, dependency_map) in self.objects {
                    registry.insert(name, Arc::new(ObjectEntry::new(inner, dependency_map)));
                }
                coordinator::run(listener, registry);
            }
            ForkResult::Parent { child } => {
                drop(listener);
                tracing::debug!(pid = child.as_raw(), "shared-state coordinator spawned");
                Ok(SharedState {
                    pid: child,
                    socket_path,
                    reaped: false,
                })
            }
        }
    }
}

fn unique_socket_path() -> PathBuf {
    std::env::temp_dir().join(format!("suitkaise-shared-state-{}.sock", uuid::Uuid::new_v4()))
}

/// Parent-side handle to a running coordinator process.
pub struct SharedState {
    pid: Pid,
    socket_path: PathBuf,
    reaped: bool,
}

impl SharedState {
    /// The coordinator's socket path: plain, serializable data. Any process
    /// that knows it - including a `suitkaise-worker` child spawned after
    /// this call returns, carrying the path in its own `WorkerSpec` state -
    /// can dial it and build a [`SharedStateProxy`]. Unlike
    /// `suitkaise_channel::Point`, there is no one-shot fd handoff to manage.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Build a proxy for the object registered under `name`.
    pub fn proxy<T: SharedObject>(&self, name: impl Into<String>) -> Result<SharedStateProxy<T>, SharedStateError> {
        SharedStateProxy::connect(&self.socket_path, name)
    }

    /// The latest authoritative encoded state for `object`, re-encoded after
    /// its most recent successfully applied write.
    pub fn snapshot(&self, object: &str) -> Result<Vec<u8>, SharedStateError> {
        match self.admin(&Request::Snapshot { object: object.to_string() })? {
            Response::Value(bytes) => Ok(bytes),
            Response::Err(e) => Err(e.into_error(object)),
            _ => Err(SharedStateError::Unavailable),
        }
    }

    /// Remove `object` from the registry.
    pub fn remove(&self, object: &str) -> Result<(), SharedStateError> {
        match self.admin(&Request::Remove { object: object.to_string() })? {
            Response::Ack => Ok(()),
            Response::Err(e) => Err(e.into_error(object)),
            _ => Err(SharedStateError::Unavailable),
        }
    }

    /// Empty the registry entirely.
    pub fn clear(&self) -> Result<(), SharedStateError> {
        match self.admin(&Request::Clear)? {
            Response::Ack => Ok(()),
            Response::Err(e) => Err(e.into_error("*")),
            _ => Err(SharedStateError::Unavailable),
        }
    }

    /// Walk `object`'s state for `Reconnector` placeholders and rehydrate
    /// them with `auth`. Runs inside the coordinator
    /// process, where the live object lives - see
    /// [`SharedObject::reconnect_all`].
    pub fn reconnect_all(&self, object: &str, auth: &impl Serialize) -> Result<(), SharedStateError> {
        let auth_bytes = suitkaise_serializer::encode(auth)?;
        match self.admin(&Request::ReconnectAll {
            object: object.to_string(),
            auth: auth_bytes,
        })? {
            Response::Ack => Ok(()),
            Response::Err(e) => Err(e.into_error(object)),
            _ => Err(SharedStateError::Unavailable),
        }
    }

    /// Current `(pending, completed)` for one fully-qualified attribute.
    /// Mainly useful for tests asserting on write-count invariants.
    pub fn counters(&self, object: &str, attr: &str) -> Result<(u64, u64), SharedStateError> {
        match self.admin(&Request::Counters {
            object: object.to_string(),
            attr: attr.to_string(),
        })? {
            Response::Counters { pending, completed } => Ok((pending, completed)),
            Response::Err(e) => Err(e.into_error(object)),
            _ => Err(SharedStateError::Unavailable),
        }
    }

    /// Drain outstanding writes, then terminate the coordinator process.
    /// Falls back to `SIGKILL` if it has not exited within `timeout`.
    pub fn stop(&mut self, timeout: Duration) -> Result<(), SharedStateError> {
        if self.reaped {
            return Ok(());
        }
        let _ = self.admin(&Request::Shutdown);
        let deadline = Instant::now() + timeout;
        loop {
            match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {
                    if Instant::now() >= deadline {
                        signal::kill(self.pid, Signal::SIGKILL)
                            .map_err(|errno| SharedStateError::Spawn(format!("kill failed: {errno}")))?;
                        let _ = waitpid(self.pid, None);
                        self.reaped = true;
                        return Ok(());
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Ok(_) => {
                    self.reaped = true;
                    return Ok(());
                }
                Err(nix::errno::Errno::ECHILD) => {
                    self.reaped = true;
                    return Ok(());
                }
                Err(errno) => return Err(SharedStateError::Spawn(format!("waitpid failed: {errno}"))),
            }
        }
    }

    fn admin(&self, request: &Request) -> Result<Response, SharedStateError> {
        let mut stream =
            UnixStream::connect(&self.socket_path).map_err(|_| SharedStateError::Unavailable)?;
        crate::protocol::send(&mut stream, request).map_err(|_| SharedStateError::Unavailable)?;
        crate::protocol::recv(&mut stream).map_err(|_| SharedStateError::Unavailable)
    }
}

impl Drop for SharedState {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = waitpid(self.pid, Some(WaitPidFlag::WNOHANG));
        }
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

// These tests fork a real coordinator process; they must run single-threaded
// (`cargo test -- --test-threads=1`) per `SharedStateBuilder::start`'s safety
// obligation, the same contract `suitkaise-worker`'s `Worker::start` carries.
#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Counter {
        count: u64,
        name: String,
    }

    impl SharedObject for Counter {
        fn dependency_map() -> DependencyMap {
            DependencyMap::builder()
                .writes("increment", &["count"])
                .writes("rename", &["name"])
                .reads("count", &["count"])
                .reads("name", &["name"])
                .build()
        }

        fn invoke(&mut self, method: &str, args: &[u8]) -> Result<(), SharedStateError> {
            match method {
                "increment" => {
                    let by: u64 = suitkaise_serializer::decode(args)?;
                    self.count += by;
                    Ok(())
                }
                "rename" => {
                    let name: String = suitkaise_serializer::decode(args)?;
                    self.name = name;
                    Ok(())
                }
                other => Err(SharedStateError::UnknownMethod(
                    "counter".to_string(),
                    other.to_string(),
                )),
            }
        }

        fn read(&self, property: &str) -> Result<Vec<u8>, SharedStateError> {
            match property {
                "count" => Ok(suitkaise_serializer::encode(&self.count)?),
                "name" => Ok(suitkaise_serializer::encode(&self.name)?),
                other => Err(SharedStateError::UnknownProperty(
                    "counter".to_string(),
                    other.to_string(),
                )),
            }
        }
    }

    fn counter_state() -> SharedState {
        SharedStateBuilder::new()
            .register(
                "counter",
                Counter {
                    count: 0,
                    name: "initial".to_string(),
                },
            )
            .start()
            .unwrap()
    }

    #[test]
    fn invoke_then_read_observes_the_write() {
        let state = counter_state();
        let proxy: SharedStateProxy<Counter> = state.proxy("counter").unwrap();
        proxy.invoke("increment", &5u64).unwrap();
        proxy.invoke("increment", &3u64).unwrap();
        let count: u64 = proxy.read("count").unwrap();
        assert_eq!(count, 8);
    }

    #[test]
    fn unknown_object_surfaces_as_error() {
        let state = counter_state();
        let proxy: SharedStateProxy<Counter> = state.proxy("missing").unwrap();
        let err = proxy.invoke("increment", &1u64).unwrap_err();
        assert!(matches!(err, SharedStateError::UnknownObject(_)));
    }

    #[test]
    fn unknown_method_surfaces_as_error() {
        let state = counter_state();
        let proxy: SharedStateProxy<Counter> = state.proxy("counter").unwrap();
        // `"count"` is a declared read, not a write, so it has no write keys
        // and the coordinator rejects it as a method name.
        let err = proxy.invoke("count", &1u64).unwrap_err();
        assert!(matches!(err, SharedStateError::UnknownMethod(_, _)));
    }

    #[test]
    fn counters_reflect_pending_and_completed_writes() {
        let state = counter_state();
        let proxy: SharedStateProxy<Counter> = state.proxy("counter").unwrap();
        for _ in 0..20 {
            proxy.invoke("increment", &1u64).unwrap();
        }
        // Reading blocks until completed catches up with the target
        // snapshotted at the time of this call.
        let count: u64 = proxy.read("count").unwrap();
        assert_eq!(count, 20);
        let (pending, completed) = state.counters("counter", "count").unwrap();
        assert_eq!(pending, 20);
        assert_eq!(completed, 20);
    }

    #[test]
    fn snapshot_reflects_the_most_recent_applied_write() {
        let state = counter_state();
        let proxy: SharedStateProxy<Counter> = state.proxy("counter").unwrap();
        proxy.invoke("increment", &42u64).unwrap();
        let _: u64 = proxy.read("count").unwrap();
        let bytes = state.snapshot("counter").unwrap();
        let decoded: Counter = suitkaise_serializer::decode(&bytes).unwrap();
        assert_eq!(decoded.count, 42);
    }

    #[test]
    fn reconnect_all_default_is_a_no_op() {
        let state = counter_state();
        state.reconnect_all("counter", &()).unwrap();
    }

    #[test]
    fn clear_empties_the_registry() {
        let state = counter_state();
        state.clear().unwrap();
        let proxy: SharedStateProxy<Counter> = state.proxy("counter").unwrap();
        let err = proxy.invoke("increment", &1u64).unwrap_err();
        assert!(matches!(err, SharedStateError::UnknownObject(_)));
    }

    #[test]
    fn stop_terminates_the_coordinator_process() {
        let mut state = counter_state();
        state.stop(Duration::from_secs(2)).unwrap();
    }
}
