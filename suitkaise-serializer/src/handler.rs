//! Extension point for user types that need custom byte-level encoding
//! instead of going through the default bincode envelope.

use std::any::Any;
use std::collections::HashMap;

use crate::error::{DeserializationError, SerializationError};

type EncodeFn = Box<dyn Fn(&dyn Any) -> Result<Vec<u8>, SerializationError> + Send + Sync>;
type DecodeFn =
    Box<dyn Fn(&[u8]) -> Result<Box<dyn Any + Send>, DeserializationError> + Send + Sync>;

/// A registry of custom encode/decode pairs keyed by a user-chosen type key.
///
/// Unlike the default path (`envelope::encode`/`decode`, which works for any
/// `Serialize`/`DeserializeOwned` type), handlers let a caller intercept
/// specific type keys - e.g. to version a type independently, or to encode a
/// type that can't derive `Serialize` directly.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, (EncodeFn, DecodeFn)>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for `type_key`. Overwrites any existing handler
    /// registered under the same key.
    pub fn register_handler<T>(
        &mut self,
        type_key: &'static str,
        encode: impl Fn(&T) -> Result<Vec<u8>, SerializationError> + Send + Sync + 'static,
        decode: impl Fn(&[u8]) -> Result<T, DeserializationError> + Send + Sync + 'static,
    ) where
        T: Any + Send + 'static,
    {
        let encode_any: EncodeFn = Box::new(move |value: &dyn Any| {
            let typed = value
                .downcast_ref::<T>()
                .ok_or(SerializationError::HandlerRejected)?;
            encode(typed)
        });
        let decode_any: DecodeFn = Box::new(move |bytes: &[u8]| {
            let value = decode(bytes)?;
            Ok(Box::new(value) as Box<dyn Any + Send>)
        });
        self.handlers.insert(type_key, (encode_any, decode_any));
    }

    pub fn is_registered(&self, type_key: &str) -> bool {
        self.handlers.contains_key(type_key)
    }

    pub fn encode_with(
        &self,
        type_key: &str,
        value: &dyn Any,
    ) -> Result<Vec<u8>, SerializationError> {
        let (encode, _) = self
            .handlers
            .get(type_key)
            .ok_or(SerializationError::HandlerRejected)?;
        encode(value)
    }

    pub fn decode_with<T: 'static>(
        &self,
        type_key: &str,
        bytes: &[u8],
    ) -> Result<T, DeserializationError> {
        let (_, decode) = self
            .handlers
            .get(type_key)
            .ok_or_else(|| DeserializationError::HandlerFailed(type_key.to_string()))?;
        let boxed = decode(bytes)?;
        *boxed
            .downcast::<T>()
            .map_err(|_| DeserializationError::HandlerFailed(type_key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_registered_handler() {
        let mut registry = HandlerRegistry::new();
        registry.register_handler::<String>(
            "upper",
            |s: &String| Ok(s.to_uppercase().into_bytes()),
            |bytes: &[u8]| {
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| DeserializationError::HandlerFailed(e.to_string()))
            },
        );

        let encoded = registry
            .encode_with("upper", &"hello".to_string() as &dyn Any)
            .unwrap();
        assert_eq!(encoded, b"HELLO");

        let decoded: String = registry.decode_with("upper", &encoded).unwrap();
        assert_eq!(decoded, "HELLO");
    }

    #[test]
    fn unregistered_key_rejects_encode() {
        let registry = HandlerRegistry::new();
        let err = registry
            .encode_with("missing", &42i32 as &dyn Any)
            .unwrap_err();
        assert!(matches!(err, SerializationError::HandlerRejected));
    }

    #[test]
    fn mismatched_type_rejects_encode() {
        let mut registry = HandlerRegistry::new();
        registry.register_handler::<String>(
            "strings-only",
            |s: &String| Ok(s.as_bytes().to_vec()),
            |bytes: &[u8]| {
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| DeserializationError::HandlerFailed(e.to_string()))
            },
        );
        let err = registry
            .encode_with("strings-only", &42i32 as &dyn Any)
            .unwrap_err();
        assert!(matches!(err, SerializationError::HandlerRejected));
    }
}
