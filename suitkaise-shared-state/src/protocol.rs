//! Wire protocol between a [`SharedStateProxy`][crate::SharedStateProxy] and
//! the coordinator.
//!
//! Framing mirrors `suitkaise-channel`'s length-prefixed scheme over a
//! `UnixStream`, but is not built on its `Anchor`/`Point` - those model a
//! single forked pair, while a coordinator's socket is dialed by an
//! unbounded number of proxies over its lifetime, so it is a plain
//! `UnixListener` at a well-known path instead.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::WireError;

#[derive(Serialize, Deserialize)]
pub(crate) enum Request {
    Invoke {
        object: String,
        method: String,
        args: Vec<u8>,
        keys: Vec<String>,
    },
    Read {
        object: String,
        property: String,
        keys: Vec<String>,
        deadline_millis: u64,
    },
    Snapshot {
        object: String,
    },
    ReconnectAll {
        object: String,
        auth: Vec<u8>,
    },
    Remove {
        object: String,
    },
    Clear,
    Counters {
        object: String,
        attr: String,
    },
    Shutdown,
}

#[derive(Serialize, Deserialize)]
pub(crate) enum Response {
    Ack,
    Value(Vec<u8>),
    Counters { pending: u64, completed: u64 },
    Err(WireError),
}

pub(crate) fn send<T: Serialize>(stream: &mut UnixStream, value: &T) -> io::Result<()> {
    let bytes =
        suitkaise_serializer::encode(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = bytes.len() as u32;
    stream.write_all(&len.to_le_bytes())?;
    stream.write_all(&bytes)?;
    stream.flush()
}

pub(crate) fn recv<T: DeserializeOwned>(stream: &mut UnixStream) -> io::Result<T> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    suitkaise_serializer::decode(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
