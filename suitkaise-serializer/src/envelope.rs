use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{DeserializationError, SerializationError};

/// Current wire format version. Bumped whenever the envelope shape changes;
/// `decode` refuses to read a mismatched version rather than guessing.
pub const FORMAT_VERSION: u16 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope {
    format_version: u16,
    body: Vec<u8>,
}

/// Encode `value` into a versioned byte envelope.
///
/// Fails only if bincode itself cannot represent the value (it practically
/// never does for owned, non-trait-object data).
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, SerializationError> {
    let body = bincode::serialize(value)?;
    let envelope = Envelope {
        format_version: FORMAT_VERSION,
        body,
    };
    Ok(bincode::serialize(&envelope)?)
}

/// Decode bytes previously produced by [`encode`].
///
/// Fails loudly on truncation or a version mismatch rather than silently
/// dropping fields.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DeserializationError> {
    if bytes.is_empty() {
        return Err(DeserializationError::Truncated);
    }
    let envelope: Envelope = bincode::deserialize(bytes).map_err(|e| match *e {
        bincode::ErrorKind::Io(_) => DeserializationError::Truncated,
        _ => DeserializationError::Codec(e),
    })?;
    if envelope.format_version != FORMAT_VERSION {
        return Err(DeserializationError::VersionSkew {
            expected: FORMAT_VERSION,
            found: envelope.format_version,
        });
    }
    bincode::deserialize(&envelope.body).map_err(|e| match *e {
        bincode::ErrorKind::Io(_) => DeserializationError::Truncated,
        _ => DeserializationError::Codec(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn round_trips_a_struct() {
        let p = Point { x: 3, y: -7 };
        let bytes = encode(&p).unwrap();
        let back: Point = decode(&bytes).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn equal_values_encode_to_equal_bytes() {
        let a = encode(&Point { x: 1, y: 2 }).unwrap();
        let b = encode(&Point { x: 1, y: 2 }).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn truncated_input_fails_loudly() {
        let err = decode::<Point>(&[]).unwrap_err();
        assert!(matches!(err, DeserializationError::Truncated));
    }

    #[test]
    fn version_skew_is_rejected() {
        #[derive(Serialize)]
        struct OldEnvelope {
            format_version: u16,
            body: Vec<u8>,
        }
        let bad = OldEnvelope {
            format_version: FORMAT_VERSION + 1,
            body: bincode::serialize(&Point { x: 0, y: 0 }).unwrap(),
        };
        let bytes = bincode::serialize(&bad).unwrap();
        let err = decode::<Point>(&bytes).unwrap_err();
        assert!(matches!(err, DeserializationError::VersionSkew { .. }));
    }
}
