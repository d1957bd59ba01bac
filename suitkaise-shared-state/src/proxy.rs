//! The client-side facade every process other than the coordinator talks
//! through.

use std::marker::PhantomData;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::dependency::DependencyMap;
use crate::error::SharedStateError;
use crate::object::SharedObject;
use crate::protocol::{self, Request, Response};

const DEFAULT_READ_DEADLINE: Duration = Duration::from_secs(5);

/// A lightweight handle to one named object living on a coordinator.
/// Cheap to construct; holds one `UnixStream` for its lifetime.
pub struct SharedStateProxy<T> {
    stream: Mutex<UnixStream>,
    object: String,
    dependency_map: DependencyMap,
    read_deadline: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T: SharedObject> SharedStateProxy<T> {
    /// Dial a coordinator directly by socket path. Any process that knows
    /// the path - not only the one holding the [`SharedState`][crate::SharedState]
    /// handle that started it, e.g. a `suitkaise-worker` child spawned with
    /// the path passed into its `WorkerSpec` - can build a proxy this way.
    pub fn connect(socket_path: &Path, object: impl Into<String>) -> Result<Self, SharedStateError> {
        let stream = UnixStream::connect(socket_path)?;
        Ok(Self {
            stream: Mutex::new(stream),
            object: object.into(),
            dependency_map: T::dependency_map(),
            read_deadline: DEFAULT_READ_DEADLINE,
            _marker: PhantomData,
        })
    }

    /// Override the bound used by [`SharedStateProxy::read`]'s
    /// completed-counter wait.
    pub fn with_read_deadline(mut self, deadline: Duration) -> Self {
        self.read_deadline = deadline;
        self
    }

    /// Invoke a mutating method.
    ///
    /// Returns once the coordinator has recorded the pending increments for
    /// `method`'s declared write keys - not once the method itself has run.
    /// That part happens on the coordinator's apply thread, fire-and-forget.
    pub fn invoke<A: Serialize>(&self, method: &str, args: &A) -> Result<(), SharedStateError> {
        let keys = self.qualify(self.dependency_map.writes_of(method));
        let args_bytes = suitkaise_serializer::encode(args)?;
        let request = Request::Invoke {
            object: self.object.clone(),
            method: method.to_string(),
            args: args_bytes,
            keys,
        };
        match self.roundtrip(&request)? {
            Response::Ack => Ok(()),
            Response::Err(e) => Err(e.into_error(&self.object)),
            _ => Err(SharedStateError::Unavailable),
        }
    }

    /// Read a property, blocking until every write enqueued on its declared
    /// dependencies before this call started has been applied.
    pub fn read<P: DeserializeOwned>(&self, property: &str) -> Result<P, SharedStateError> {
        let keys = self.qualify(self.dependency_map.reads_of(property));
        let request = Request::Read {
            object: self.object.clone(),
            property: property.to_string(),
            keys,
            deadline_millis: self.read_deadline.as_millis() as u64,
        };
        match self.roundtrip(&request)? {
            Response::Value(bytes) => Ok(suitkaise_serializer::decode(&bytes)?),
            Response::Err(e) => Err(e.into_error(&self.object)),
            _ => Err(SharedStateError::Unavailable),
        }
    }

    fn qualify(&self, attrs: &[String]) -> Vec<String> {
        attrs.iter().map(|a| format!("{}.{}", self.object, a)).collect()
    }

    fn roundtrip(&self, request: &Request) -> Result<Response, SharedStateError> {
        let mut stream = self.stream.lock();
        protocol::send(&mut stream, request).map_err(|_| SharedStateError::Unavailable)?;
        protocol::recv(&mut stream).map_err(|_| SharedStateError::Unavailable)
    }
}
