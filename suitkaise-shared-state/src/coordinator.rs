//! The coordinator's accept loop and command application.
//!
//! Runs entirely inside the forked coordinator process. A single apply
//! thread drains a queue of invocations in receipt order - a single writer,
//! serialized command log - while any
//! number of connection-handling threads accept proxy requests concurrently.

use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::counters::{self, CounterTable};
use crate::dependency::DependencyMap;
use crate::error::WireError;
use crate::object::ErasedObject;
use crate::protocol::{self, Request, Response};

pub(crate) struct ObjectEntry {
    pub(crate) dependency_map: DependencyMap,
    inner: Mutex<Box<dyn ErasedObject>>,
    mirror: RwLock<Vec<u8>>,
    last_error: Mutex<Option<String>>,
}

impl ObjectEntry {
    pub(crate) fn new(inner: Box<dyn ErasedObject>, dependency_map: DependencyMap) -> Self {
        let mirror = inner.snapshot().unwrap_or_default();
        Self {
            dependency_map,
            inner: Mutex::new(inner),
            mirror: RwLock::new(mirror),
            last_error: Mutex::new(None),
        }
    }
}

pub(crate) type Registry = DashMap<String, Arc<ObjectEntry>>;

struct ApplyJob {
    object: String,
    method: String,
    args: Vec<u8>,
    keys: Vec<String>,
}

/// Runs the coordinator. Never returns - the process exits directly from
/// within a connection handler once a `Shutdown` request has drained the
/// apply queue, matching `stop(timeout)`'s drain-then-terminate contract.
pub(crate) fn run(listener: UnixListener, registry: Registry) -> ! {
    let registry = Arc::new(registry);
    let counters: Arc<CounterTable> = Arc::new(DashMap::new());
    let (apply_tx, apply_rx) = crossbeam_channel::unbounded::<ApplyJob>();

    {
        let registry = Arc::clone(&registry);
        let counters = Arc::clone(&counters);
        thread::spawn(move || apply_loop(apply_rx, registry, counters));
    }

    for incoming in listener.incoming() {
        let Ok(stream) = incoming else { continue };
        let registry = Arc::clone(&registry);
        let counters = Arc::clone(&counters);
        let apply_tx = apply_tx.clone();
        thread::spawn(move || handle_connection(stream, registry, counters, apply_tx));
    }
    std::process::exit(0);
}

fn apply_loop(rx: crossbeam_channel::Receiver<ApplyJob>, registry: Arc<Registry>, counters: Arc<CounterTable>) {
    for job in rx.iter() {
        if let Some(entry) = registry.get(&job.object) {
            match entry.inner.lock().invoke(&job.method, &job.args) {
                Ok(()) => {
                    if let Ok(bytes) = entry.inner.lock().snapshot() {
                        *entry.mirror.write() = bytes;
                    }
                    *entry.last_error.lock() = None;
                }
                Err(err) => {
                    // Swallow and advance: a failing write still unblocks
                    // readers waiting on its keys, it just
                    // leaves the mirror untouched and remembers the failure
                    // for the next operation on this object to surface.
                    tracing::error!(
                        object = %job.object,
                        method = %job.method,
                        error = %err,
                        "shared-state method failed; mirror left unchanged"
                    );
                    *entry.last_error.lock() = Some(err.to_string());
                }
            }
        }
        for key in &job.keys {
            counters::bump_completed(&counters, key);
        }
    }
}

fn handle_connection(
    mut stream: UnixStream,
    registry: Arc<Registry>,
    counters: Arc<CounterTable>,
    apply_tx: crossbeam_channel::Sender<ApplyJob>,
) {
    loop {
        let request: Request = match protocol::recv(&mut stream) {
            Ok(r) => r,
            Err(_) => return,
        };
        let response = match request {
            Request::Invoke { object, method, args, keys } => {
                handle_invoke(&registry, &counters, &apply_tx, object, method, args, keys)
            }
            Request::Read { object, property, keys, deadline_millis } => {
                handle_read(&registry, &counters, object, property, keys, deadline_millis)
            }
            Request::Snapshot { object } => handle_snapshot(&registry, object),
            Request::ReconnectAll { object, auth } => handle_reconnect(&registry, object, auth),
            Request::Remove { object } => {
                registry.remove(&object);
                Response::Ack
            }
            Request::Clear => {
                registry.clear();
                counters.clear();
                Response::Ack
            }
            Request::Counters { object, attr } => {
                let key = format!("{object}.{attr}");
                let (pending, completed) = counters::snapshot(&counters, &key);
                Response::Counters { pending, completed }
            }
            Request::Shutdown => {
                let _ = protocol::send(&mut stream, &Response::Ack);
                while !apply_tx.is_empty() {
                    thread::sleep(Duration::from_millis(5));
                }
                std::process::exit(0);
            }
        };
        if protocol::send(&mut stream, &response).is_err() {
            return;
        }
    }
}

fn handle_invoke(
    registry: &Registry,
    counters: &CounterTable,
    apply_tx: &crossbeam_channel::Sender<ApplyJob>,
    object: String,
    method: String,
    args: Vec<u8>,
    keys: Vec<String>,
) -> Response {
    let Some(entry) = registry.get(&object) else {
        return Response::Err(WireError::UnknownObject(object));
    };
    if !entry.dependency_map.has_write(&method) {
        return Response::Err(WireError::UnknownMethod(method));
    }
    debug_assert!(
        !entry.dependency_map.writes_of(&method).is_empty(),
        "write method {method:?} on {object:?} declared no written keys in its dependency map"
    );
    for key in &keys {
        counters::bump_pending(counters, key);
    }
    let _ = apply_tx.send(ApplyJob { object, method, args, keys });
    Response::Ack
}

fn handle_read(
    registry: &Registry,
    counters: &CounterTable,
    object: String,
    property: String,
    keys: Vec<String>,
    deadline_millis: u64,
) -> Response {
    let Some(entry) = registry.get(&object) else {
        return Response::Err(WireError::UnknownObject(object));
    };
    if !entry.dependency_map.has_read(&property) {
        return Response::Err(WireError::UnknownProperty(property));
    }

    // Snapshot the target once, then wait for completed to catch up: the
    // bounded-wait read path that gives read-after-write across processes.
    let targets: Vec<u64> = keys.iter().map(|k| counters::read_pending(counters, k)).collect();
    let deadline = Instant::now() + Duration::from_millis(deadline_millis);
    loop {
        let satisfied = keys
            .iter()
            .zip(&targets)
            .all(|(k, &target)| counters::read_completed(counters, k) >= target);
        if satisfied {
            break;
        }
        if Instant::now() >= deadline {
            return Response::Err(WireError::ReadTimedOut);
        }
        thread::sleep(Duration::from_millis(2));
    }

    match entry.inner.lock().read(&property) {
        Ok(bytes) => Response::Value(bytes),
        Err(err) => Response::Err(WireError::MethodFailed(err.to_string())),
    }
}

fn handle_snapshot(registry: &Registry, object: String) -> Response {
    match registry.get(&object) {
        Some(entry) => Response::Value(entry.mirror.read().clone()),
        None => Response::Err(WireError::UnknownObject(object)),
    }
}

fn handle_reconnect(registry: &Registry, object: String, auth: Vec<u8>) -> Response {
    let Some(entry) = registry.get(&object) else {
        return Response::Err(WireError::UnknownObject(object));
    };
    let mut guard = entry.inner.lock();
    match guard.reconnect_all(&auth) {
        Ok(()) => {
            if let Ok(bytes) = guard.snapshot() {
                drop(guard);
                *entry.mirror.write() = bytes;
            }
            Response::Ack
        }
        Err(err) => Response::Err(WireError::MethodFailed(err.to_string())),
    }
}
