//! The per-type contract a value must satisfy to live inside the
//! coordinator.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::dependency::DependencyMap;
use crate::error::SharedStateError;

/// A value that can be registered into a [`SharedState`][crate::SharedState]
/// container.
///
/// `dependency_map` is static metadata, not per-instance state - it is
/// consulted by every [`SharedStateProxy`][crate::SharedStateProxy] built
/// against this type, before any particular instance exists on the
/// coordinator side.
pub trait SharedObject: Serialize + DeserializeOwned + Send + 'static {
    /// Declares which attributes each mutating method writes and which
    /// attributes each read-only property depends on.
    fn dependency_map() -> DependencyMap
    where
        Self: Sized;

    /// Apply a mutating call. `args` is the caller's arguments, encoded via
    /// `suitkaise_serializer`. Runs on the coordinator's single apply
    /// thread - never concurrently with another `invoke`/`read` on the same
    /// object.
    fn invoke(&mut self, method: &str, args: &[u8]) -> Result<(), SharedStateError>;

    /// Produce the encoded value of a read-only property. Runs after the
    /// coordinator has confirmed every write this property depends on has
    /// completed.
    fn read(&self, property: &str) -> Result<Vec<u8>, SharedStateError>;

    /// Rehydrate any `Reconnector` placeholders this value holds, using
    /// `auth_bytes` (encoded by the caller via `suitkaise_serializer`).
    /// Implementations typically decode `auth_bytes` into their
    /// `Reconnectable::Auth` and delegate to
    /// `suitkaise_serializer::Reconnect::reconnect_all`. The default is a
    /// no-op, for objects with nothing to reconnect.
    fn reconnect_all(&mut self, _auth_bytes: &[u8]) -> Result<(), SharedStateError> {
        Ok(())
    }
}

/// Object-safe erasure of [`SharedObject`], so the coordinator's registry
/// can hold many distinct concrete types behind one `Box<dyn ErasedObject>`.
pub(crate) trait ErasedObject: Send {
    fn invoke(&mut self, method: &str, args: &[u8]) -> Result<(), SharedStateError>;
    fn read(&self, property: &str) -> Result<Vec<u8>, SharedStateError>;
    fn reconnect_all(&mut self, auth_bytes: &[u8]) -> Result<(), SharedStateError>;
    fn snapshot(&self) -> Result<Vec<u8>, SharedStateError>;
}

impl<T: SharedObject> ErasedObject for T {
    fn invoke(&mut self, method: &str, args: &[u8]) -> Result<(), SharedStateError> {
        SharedObject::invoke(self, method, args)
    }

    fn read(&self, property: &str) -> Result<Vec<u8>, SharedStateError> {
        SharedObject::read(self, property)
    }

    fn reconnect_all(&mut self, auth_bytes: &[u8]) -> Result<(), SharedStateError> {
        SharedObject::reconnect_all(self, auth_bytes)
    }

    fn snapshot(&self) -> Result<Vec<u8>, SharedStateError> {
        Ok(suitkaise_serializer::encode(self)?)
    }
}
