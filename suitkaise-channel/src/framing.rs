//! Length-prefixed message framing over a `UnixStream`.
//!
//! Every `send` writes exactly one frame: a 4-byte little-endian length
//! prefix followed by that many bytes of payload. `recv` reads exactly one
//! frame back. This is the same shape used by production subprocess-worker
//! code for host/worker IPC (length-prefixed blocking send/recv over a
//! `UnixStream`), adapted here to carry `suitkaise-serializer`-encoded
//! payloads instead of a domain-specific codec.

use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// Outcome of attempting to read one frame.
pub enum Frame {
    /// A complete message was read.
    Message(Vec<u8>),
    /// The peer closed the stream cleanly (at a frame boundary).
    Closed,
    /// No message arrived within the requested timeout; the peer is still
    /// open.
    NoMessage,
}

/// Write one framed message. Blocks until the whole frame is written.
pub fn framed_send_blocking(stream: &mut UnixStream, payload: &[u8]) -> io::Result<()> {
    let len = payload.len() as u32;
    stream.write_all(&len.to_le_bytes())?;
    stream.write_all(payload)?;
    stream.flush()
}

/// Read one framed message, blocking indefinitely until a message arrives
/// or the peer closes.
pub fn framed_recv_blocking(stream: &mut UnixStream) -> io::Result<Frame> {
    stream.set_read_timeout(None)?;
    read_frame(stream)
}

/// Read one framed message, returning `Frame::NoMessage` if nothing arrives
/// within `timeout`.
pub fn framed_recv_timeout(stream: &mut UnixStream, timeout: Duration) -> io::Result<Frame> {
    stream.set_read_timeout(Some(timeout))?;
    match read_frame(stream) {
        Ok(frame) => Ok(frame),
        Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
            Ok(Frame::NoMessage)
        }
        Err(e) => Err(e),
    }
}

fn read_frame(stream: &mut UnixStream) -> io::Result<Frame> {
    let mut len_bytes = [0u8; 4];
    if !read_exact_or_eof(stream, &mut len_bytes)? {
        return Ok(Frame::Closed);
    }
    let len = u32::from_le_bytes(len_bytes) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    Ok(Frame::Message(payload))
}

/// Like `read_exact`, but returns `Ok(false)` instead of an `UnexpectedEof`
/// error when zero bytes could be read at all (a clean, frame-aligned EOF).
fn read_exact_or_eof(stream: &mut UnixStream, buf: &mut [u8]) -> io::Result<bool> {
    let mut read = 0;
    while read < buf.len() {
        match stream.read(&mut buf[read..]) {
            Ok(0) if read == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "peer closed mid-frame",
                ))
            }
            Ok(n) => read += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}
